// printer.rs — Deterministic textual form of the IR.
//
// Values are named in print order (`%arg0` for function arguments, `%0`,
// `%1`, ... for results and induction variables), so two structurally equal
// functions print identically. The printed form round-trips through the
// parser.
//
// Preconditions: every operand is defined before use in region order.
// Postconditions: none (read-only).
// Failure modes: none.
// Side effects: none.

use std::collections::HashMap;
use std::fmt::Write;

use sha2::{Digest, Sha256};

use crate::id::{OpId, ValueId};
use crate::ir::{Attr, FuncBody, Module, OpKind, RegionRef};

/// Print a whole module.
pub fn print_module(module: &Module) -> String {
    let mut out = String::new();
    for (i, func) in module.funcs.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&print_func(func));
    }
    out
}

/// Print one function body.
pub fn print_func(func: &FuncBody) -> String {
    let mut printer = Printer {
        func,
        names: HashMap::new(),
        next: 0,
        out: String::new(),
    };
    printer.print();
    printer.out
}

/// SHA-256 of the printed module, as a 64-character hex string. Stable
/// across runs for structurally equal modules.
pub fn fingerprint(module: &Module) -> String {
    let mut hasher = Sha256::new();
    hasher.update(print_module(module).as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for byte in digest {
        let _ = write!(hex, "{:02x}", byte);
    }
    hex
}

struct Printer<'f> {
    func: &'f FuncBody,
    names: HashMap<ValueId, String>,
    next: u32,
    out: String,
}

impl<'f> Printer<'f> {
    fn print(&mut self) {
        for (i, &arg) in self.func.args.iter().enumerate() {
            self.names.insert(arg, format!("%arg{}", i));
        }
        let _ = write!(self.out, "func @{}(", self.func.name);
        for (i, &arg) in self.func.args.iter().enumerate() {
            if i > 0 {
                self.out.push_str(", ");
            }
            let _ = write!(self.out, "%arg{}: {}", i, self.func.value_ty(arg));
        }
        self.out.push_str(") {\n");
        for &op in self.func.region(RegionRef::Top) {
            self.print_op(op, 1);
        }
        self.out.push_str("}\n");
    }

    fn fresh_name(&mut self, value: ValueId) -> String {
        let name = format!("%{}", self.next);
        self.next += 1;
        self.names.insert(value, name.clone());
        name
    }

    fn name(&self, value: ValueId) -> &str {
        self.names
            .get(&value)
            .map(|s| s.as_str())
            .unwrap_or("%?")
    }

    fn operand_list(&self, operands: &[ValueId]) -> String {
        operands
            .iter()
            .map(|&v| self.name(v).to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn print_op(&mut self, op: OpId, depth: usize) {
        let indent = "  ".repeat(depth);
        let operation = self.func.op(op);

        if operation.kind == OpKind::For {
            let iv_name = match operation.body_arg {
                Some(iv) => self.fresh_name(iv),
                None => "%?".to_string(),
            };
            let lower = self.name(operation.operands[0]).to_string();
            let upper = self.name(operation.operands[1]).to_string();
            let step = self.name(operation.operands[2]).to_string();
            let _ = writeln!(
                self.out,
                "{}for {} = {} to {} step {} {{",
                indent, iv_name, lower, upper, step,
            );
            for &child in &operation.body {
                self.print_op(child, depth + 1);
            }
            let _ = writeln!(self.out, "{}}}", indent);
            return;
        }

        let mut line = String::new();
        if let Some(&result) = operation.results.first() {
            let name = self.fresh_name(result);
            let _ = write!(line, "{} = ", name);
        }
        let _ = write!(line, "{}", operation.kind);

        match operation.kind {
            OpKind::ConstIndex => {
                if let Some(Attr::Index(n)) = operation.attr {
                    let _ = write!(line, " {}", n);
                }
            }
            OpKind::ConstScalar => {
                if let Some(Attr::Scalar(x)) = operation.attr {
                    let _ = write!(line, " {}", x);
                }
            }
            OpKind::Dim => {
                let _ = write!(line, " {}", self.operand_list(&operation.operands));
                if let Some(Attr::Index(n)) = operation.attr {
                    let _ = write!(line, ", {}", n);
                }
            }
            _ => {
                if !operation.operands.is_empty() {
                    let _ = write!(line, " {}", self.operand_list(&operation.operands));
                }
            }
        }

        // Kinds whose result type is not inferable carry a type suffix.
        match operation.kind {
            OpKind::BroadcastTo | OpKind::Matmul | OpKind::AllocBuffer => {
                let result_ty = self.func.value_ty(operation.results[0]);
                let _ = write!(line, " : {}", result_ty);
            }
            OpKind::ConstScalar => {
                let result_ty = self.func.value_ty(operation.results[0]);
                let _ = write!(line, " : {}", result_ty);
            }
            _ => {}
        }

        let _ = writeln!(self.out, "{}{}", indent, line);
    }
}
