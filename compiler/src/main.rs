use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;

use tlc::bufferize::{self, LegalityTarget};
use tlc::diag::{DiagLevel, Diagnostic};
use tlc::printer;

#[derive(Debug, Clone, clap::ValueEnum)]
enum EmitStage {
    /// Lowered textual IR
    Tir,
    /// JSON conversion report
    Report,
}

#[derive(Parser, Debug)]
#[command(
    name = "tlc",
    version,
    about = "Tensor Lowering Compiler — bufferizes .tir tensor programs to buffer-level loops"
)]
struct Cli {
    /// Input .tir source file
    source: PathBuf,

    /// Output stage
    #[arg(long, value_enum, default_value_t = EmitStage::Tir)]
    emit: EmitStage,

    /// Print compiler phases and timing
    #[arg(long)]
    verbose: bool,
}

#[derive(Serialize)]
struct FuncReport {
    name: String,
    status: &'static str,
    diagnostics: Vec<Diagnostic>,
}

#[derive(Serialize)]
struct Report {
    module_fingerprint: String,
    functions: Vec<FuncReport>,
}

fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        eprintln!("tlc: source = {}", cli.source.display());
        eprintln!("tlc: emit   = {:?}", cli.emit);
    }

    // ── Read and parse source ──
    let source = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("tlc: error: {}: {}", cli.source.display(), e);
            std::process::exit(2);
        }
    };

    let parse_result = tlc::parser::parse(&source);
    if !parse_result.diagnostics.is_empty() {
        for diag in &parse_result.diagnostics {
            eprintln!("tlc: {}", diag);
        }
    }
    let mut module = match parse_result.module {
        Some(m) => m,
        None => {
            eprintln!("tlc: parse failed with no output");
            std::process::exit(1);
        }
    };

    if cli.verbose {
        eprintln!("tlc: parsed {} functions", module.funcs.len());
    }

    // ── Bufferize ──
    let target = LegalityTarget::buffer_level();
    let per_func = bufferize::bufferize_module(&mut module, &target);

    let mut failed = false;
    let mut functions = Vec::with_capacity(per_func.len());
    for (name, result) in per_func {
        let status = if result.has_errors() { "error" } else { "ok" };
        if result.has_errors() {
            failed = true;
        }
        for diag in &result.diagnostics {
            if cli.verbose || diag.level == DiagLevel::Error {
                eprintln!("tlc: @{}: {}", name, diag);
            }
        }
        functions.push(FuncReport {
            name,
            status,
            diagnostics: result.diagnostics,
        });
    }

    // ── Emit ──
    match cli.emit {
        EmitStage::Tir => {
            print!("{}", printer::print_module(&module));
        }
        EmitStage::Report => {
            let report = Report {
                module_fingerprint: printer::fingerprint(&module),
                functions,
            };
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    eprintln!("tlc: error: {}", e);
                    std::process::exit(2);
                }
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
}
