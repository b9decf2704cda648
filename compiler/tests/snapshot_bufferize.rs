// Snapshot tests: lock lowered textual IR to detect unintended changes.
//
// Uses the library API (parse → bufferize → print) directly. The printer
// names values in print order, so the snapshots are deterministic. Snapshots
// are managed by `insta` and stored under `compiler/tests/snapshots/`.
//
// Run `cargo insta review` after intentional output changes to update baselines.

use tlc::bufferize::{self, LegalityTarget};
use tlc::{parser, printer};

/// Run parse → bufferize → print and return the lowered textual IR.
fn lowered(source: &str) -> String {
    let result = parser::parse(source);
    assert!(
        result.diagnostics.is_empty(),
        "parse diagnostics: {:?}",
        result.diagnostics
    );
    let mut module = result.module.expect("scenario must parse");
    let target = LegalityTarget::buffer_level();
    for (name, result) in bufferize::bufferize_module(&mut module, &target) {
        assert!(
            !result.has_errors(),
            "bufferize failed for @{}: {:?}",
            name,
            result.diagnostics
        );
    }
    printer::print_module(&module)
}

#[test]
fn snapshot_broadcast_lowering() {
    let output = lowered(
        r#"
func @bcast(%arg0: buffer<1x3xf32>, %arg1: shape<2>) {
  %0 = broadcast_to %arg0, %arg1 : tensor<2x3xf32>
  return %0
}
"#,
    );
    insta::assert_snapshot!("bufferize_broadcast", output);
}

#[test]
fn snapshot_matmul_lowering() {
    let output = lowered(
        r#"
func @mm(%arg0: buffer<2x3xf32>, %arg1: buffer<3x4xf32>) {
  %0 = matmul %arg0, %arg1 : tensor<2x4xf32>
  return %0
}
"#,
    );
    insta::assert_snapshot!("bufferize_matmul", output);
}

#[test]
fn snapshot_chained_lowering() {
    let output = lowered(
        r#"
func @mixed(%arg0: buffer<1x8xf32>, %arg1: shape<2>, %arg2: buffer<8x4xf32>) {
  %0 = broadcast_to %arg0, %arg1 : tensor<8x8xf32>
  %1 = matmul %0, %arg2 : tensor<8x4xf32>
  return %1
}
"#,
    );
    insta::assert_snapshot!("bufferize_chained", output);
}
