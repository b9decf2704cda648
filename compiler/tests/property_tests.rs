// Property-based tests for bufferization invariants.
//
// Three categories:
// 1. Broadcast semantics: lowered programs agree with a direct index-rule
//    reference over generated shapes and data
// 2. Matmul semantics: lowered programs agree with a naive triple loop
// 3. Structural invariants: legality after conversion, deterministic output
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use proptest::prelude::*;
use tlc::bufferize::{self, LegalityTarget};
use tlc::interp::{eval_func, RtValue};
use tlc::ir::{Module, OpKind};
use tlc::{parser, printer};

// ── Test helpers ────────────────────────────────────────────────────────────

fn parse_and_bufferize(source: &str) -> Module {
    let result = parser::parse(source);
    assert!(
        result.diagnostics.is_empty(),
        "parse diagnostics: {:?}",
        result.diagnostics
    );
    let mut module = result.module.expect("generated program must parse");
    let target = LegalityTarget::buffer_level();
    for (name, result) in bufferize::bufferize_module(&mut module, &target) {
        assert!(
            !result.has_errors(),
            "bufferize failed for @{}: {:?}",
            name,
            result.diagnostics
        );
    }
    module
}

fn eval_to_buffer(module: &Module, args: Vec<RtValue>) -> (Vec<i64>, Vec<f64>) {
    let outputs = eval_func(&module.funcs[0], args).expect("evaluation must succeed");
    let RtValue::Buffer(buf) = &outputs[0] else {
        panic!("expected a buffer result");
    };
    let buf = buf.borrow();
    (buf.dims.clone(), buf.data.clone())
}

// ── Generators ──────────────────────────────────────────────────────────────

/// A 2-d broadcast case: output extents, per-dimension broadcast flags, and
/// input data sized to the (possibly collapsed) input extents.
#[derive(Debug, Clone)]
struct BroadcastCase {
    rows: usize,
    cols: usize,
    bcast_rows: bool,
    bcast_cols: bool,
    data: Vec<f64>,
}

impl BroadcastCase {
    fn in_rows(&self) -> usize {
        if self.bcast_rows {
            1
        } else {
            self.rows
        }
    }

    fn in_cols(&self) -> usize {
        if self.bcast_cols {
            1
        } else {
            self.cols
        }
    }
}

fn arb_broadcast_case() -> impl Strategy<Value = BroadcastCase> {
    (1usize..=4, 1usize..=4, any::<bool>(), any::<bool>()).prop_flat_map(
        |(rows, cols, bcast_rows, bcast_cols)| {
            let in_rows = if bcast_rows { 1 } else { rows };
            let in_cols = if bcast_cols { 1 } else { cols };
            prop::collection::vec(-100.0f64..100.0, in_rows * in_cols).prop_map(
                move |data| BroadcastCase {
                    rows,
                    cols,
                    bcast_rows,
                    bcast_cols,
                    data,
                },
            )
        },
    )
}

/// A matmul case: (m x k) times (k x n) with generated data.
#[derive(Debug, Clone)]
struct MatmulCase {
    m: usize,
    k: usize,
    n: usize,
    lhs: Vec<f64>,
    rhs: Vec<f64>,
}

fn arb_matmul_case() -> impl Strategy<Value = MatmulCase> {
    (1usize..=4, 1usize..=4, 1usize..=4).prop_flat_map(|(m, k, n)| {
        (
            prop::collection::vec(-10.0f64..10.0, m * k),
            prop::collection::vec(-10.0f64..10.0, k * n),
        )
            .prop_map(move |(lhs, rhs)| MatmulCase { m, k, n, lhs, rhs })
    })
}

// ── Properties ──────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn broadcast_matches_index_rule(case in arb_broadcast_case()) {
        let source = format!(
            "func @b(%arg0: buffer<{}x{}xf32>, %arg1: shape<2>) {{\n  \
             %0 = broadcast_to %arg0, %arg1 : tensor<?x?xf32>\n  \
             return %0\n}}\n",
            case.in_rows(),
            case.in_cols(),
        );
        let module = parse_and_bufferize(&source);

        let args = vec![
            RtValue::buffer(
                vec![case.in_rows() as i64, case.in_cols() as i64],
                case.data.clone(),
            ),
            RtValue::Shape(vec![case.rows as i64, case.cols as i64]),
        ];
        let (dims, data) = eval_to_buffer(&module, args);

        prop_assert_eq!(dims, vec![case.rows as i64, case.cols as i64]);
        for i in 0..case.rows {
            for j in 0..case.cols {
                let src_i = if case.bcast_rows { 0 } else { i };
                let src_j = if case.bcast_cols { 0 } else { j };
                let expected = case.data[src_i * case.in_cols() + src_j];
                prop_assert_eq!(data[i * case.cols + j], expected);
            }
        }
    }

    #[test]
    fn matmul_matches_naive_reference(case in arb_matmul_case()) {
        let source = format!(
            "func @mm(%arg0: buffer<{m}x{k}xf32>, %arg1: buffer<{k}x{n}xf32>) {{\n  \
             %0 = matmul %arg0, %arg1 : tensor<{m}x{n}xf32>\n  \
             return %0\n}}\n",
            m = case.m,
            k = case.k,
            n = case.n,
        );
        let module = parse_and_bufferize(&source);

        let args = vec![
            RtValue::buffer(vec![case.m as i64, case.k as i64], case.lhs.clone()),
            RtValue::buffer(vec![case.k as i64, case.n as i64], case.rhs.clone()),
        ];
        let (dims, data) = eval_to_buffer(&module, args);

        prop_assert_eq!(dims, vec![case.m as i64, case.n as i64]);
        for i in 0..case.m {
            for j in 0..case.n {
                let mut acc = 0.0;
                for l in 0..case.k {
                    acc += case.lhs[i * case.k + l] * case.rhs[l * case.n + j];
                }
                prop_assert_eq!(data[i * case.n + j], acc);
            }
        }
    }

    #[test]
    fn no_tensor_level_ops_survive(case in arb_broadcast_case()) {
        let source = format!(
            "func @b(%arg0: buffer<{}x{}xf32>, %arg1: shape<2>) {{\n  \
             %0 = broadcast_to %arg0, %arg1 : tensor<{}x{}xf32>\n  \
             return %0\n}}\n",
            case.in_rows(),
            case.in_cols(),
            case.rows,
            case.cols,
        );
        let module = parse_and_bufferize(&source);
        let func = &module.funcs[0];
        for op in func.walk() {
            let kind = func.op(op).kind;
            prop_assert_ne!(kind, OpKind::BroadcastTo);
            prop_assert_ne!(kind, OpKind::Matmul);
        }
    }

    #[test]
    fn lowering_is_deterministic(case in arb_matmul_case()) {
        let source = format!(
            "func @mm(%arg0: buffer<{m}x{k}xf32>, %arg1: buffer<{k}x{n}xf32>) {{\n  \
             %0 = matmul %arg0, %arg1 : tensor<{m}x{n}xf32>\n  \
             return %0\n}}\n",
            m = case.m,
            k = case.k,
            n = case.n,
        );
        let first = printer::print_module(&parse_and_bufferize(&source));
        let second = printer::print_module(&parse_and_bufferize(&source));
        prop_assert_eq!(first, second);
    }
}
