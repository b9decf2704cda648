// bufferize.rs — Conversion driver: pattern dispatch and legality check.
//
// Scans every operation of a function body in pre-order (loop bodies
// included), invokes the registered lowering pattern for each operation kind
// that has one, then verifies that every surviving operation belongs to the
// legality target. One scan suffices: only broadcast_to and matmul are
// targeted, and neither pattern emits a new instance of either kind.
//
// Rewriting is destructive and non-transactional: if legality fails after
// some operations were already rewritten, the function is left in a mixed,
// partially lowered state. The caller must treat it as unusable on failure.
//
// Preconditions: none beyond a structurally valid function body.
// Postconditions: on success every operation's kind is in the target.
// Failure modes: LegalityFailure (illegal op survives); a pattern-level
//   PatternFailure only downgrades to a warning and leaves the op alone.
// Side effects: mutates the function body.

use std::collections::HashSet;

use crate::diag::{codes, DiagLevel, Diagnostic};
use crate::ir::{FuncBody, Module, OpKind, BUFFER_LEVEL_KINDS};
use crate::{broadcast, matmul};

// ── Legality target ─────────────────────────────────────────────────────────

/// The set of operation kinds accepted in the final, lowered program.
#[derive(Debug, Clone)]
pub struct LegalityTarget {
    legal: HashSet<OpKind>,
}

impl LegalityTarget {
    /// No kind is legal.
    pub fn empty() -> Self {
        Self {
            legal: HashSet::new(),
        }
    }

    /// The standard target: every buffer-level kind is legal, the two
    /// tensor-level kinds are not.
    pub fn buffer_level() -> Self {
        Self {
            legal: BUFFER_LEVEL_KINDS.into_iter().collect(),
        }
    }

    pub fn with_legal(mut self, kind: OpKind) -> Self {
        self.legal.insert(kind);
        self
    }

    pub fn is_legal(&self, kind: OpKind) -> bool {
        self.legal.contains(&kind)
    }
}

// ── Pattern plumbing ────────────────────────────────────────────────────────

/// A pattern declined to rewrite its operation; the op stays unconverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternFailure {
    /// No result shape resolved (allocation cannot proceed).
    UnresolvedShape,
    /// The input's rank exceeds the output's; not a broadcast.
    RankMismatch,
}

/// The conversion left at least one illegal operation behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegalityFailure;

impl std::fmt::Display for LegalityFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "illegal operations remain after bufferization")
    }
}

impl std::error::Error for LegalityFailure {}

// ── Driver ──────────────────────────────────────────────────────────────────

/// Result of bufferizing one function.
pub struct BufferizeResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl BufferizeResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.level == DiagLevel::Error)
    }
}

/// Bufferize one function body against a legality target.
///
/// Deterministic for a fixed operation order; running on an already-legal
/// function changes nothing and reports success.
pub fn bufferize(func: &mut FuncBody, target: &LegalityTarget) -> BufferizeResult {
    let mut diagnostics = Vec::new();

    // Scan/apply: kind-keyed closed dispatch over the pre-order snapshot,
    // loop bodies included. Ids stay valid across splicing.
    for op_id in func.walk() {
        let kind = func.op(op_id).kind;
        let outcome = match kind {
            OpKind::BroadcastTo => Some(broadcast::lower_broadcast(func, op_id)),
            OpKind::Matmul => Some(matmul::lower_matmul(func, op_id)),
            _ => None,
        };
        if let Some(Err(failure)) = outcome {
            let span = func.op(op_id).span;
            let message = match failure {
                PatternFailure::UnresolvedShape => {
                    format!("no result shape resolved for '{}'; left unconverted", kind)
                }
                PatternFailure::RankMismatch => {
                    format!(
                        "input rank exceeds output rank for '{}'; left unconverted",
                        kind
                    )
                }
            };
            diagnostics.push(
                Diagnostic::new(DiagLevel::Warning, span, message)
                    .with_code(codes::UNSUPPORTED_SHAPE_TRANSFER),
            );
        }
    }

    // Finalize: every surviving operation, loop bodies included, must be in
    // the target.
    for op_id in func.walk() {
        let op = func.op(op_id);
        if !target.is_legal(op.kind) {
            diagnostics.push(
                Diagnostic::new(
                    DiagLevel::Error,
                    op.span,
                    format!(
                        "operation '{}' is outside the legality target after bufferization",
                        op.kind
                    ),
                )
                .with_code(codes::ILLEGAL_OPERATION),
            );
        }
    }

    BufferizeResult { diagnostics }
}

/// Pass-level entry point: success or failure, no finer payload.
pub fn run(func: &mut FuncBody, target: &LegalityTarget) -> Result<(), LegalityFailure> {
    if bufferize(func, target).has_errors() {
        Err(LegalityFailure)
    } else {
        Ok(())
    }
}

/// Bufferize every function of a module; returns per-function results in
/// declaration order.
pub fn bufferize_module(
    module: &mut Module,
    target: &LegalityTarget,
) -> Vec<(String, BufferizeResult)> {
    module
        .funcs
        .iter_mut()
        .map(|func| {
            let result = bufferize(func, target);
            (func.name.clone(), result)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Span;
    use crate::ir::{Builder, DimSize, ElemType, RegionRef, Type};

    fn span() -> Span {
        Span::synthetic()
    }

    fn legal_func() -> FuncBody {
        let mut f = FuncBody::new("legal");
        let op = f.new_op(
            OpKind::ConstIndex,
            Vec::new(),
            vec![Type::Index],
            Some(crate::ir::Attr::Index(3)),
            span(),
        );
        f.push_op(RegionRef::Top, op);
        let ret = f.new_op(OpKind::Return, Vec::new(), Vec::new(), None, span());
        f.push_op(RegionRef::Top, ret);
        f
    }

    #[test]
    fn already_legal_function_is_a_no_op() {
        let mut f = legal_func();
        let before: Vec<OpKind> = f.walk().iter().map(|&o| f.op(o).kind).collect();
        let result = bufferize(&mut f, &LegalityTarget::buffer_level());
        assert!(!result.has_errors());
        assert!(result.diagnostics.is_empty());
        let after: Vec<OpKind> = f.walk().iter().map(|&o| f.op(o).kind).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn illegal_kind_outside_target_fails() {
        let mut f = legal_func();
        // A target that accepts only `return` rejects the const_index.
        let target = LegalityTarget::empty().with_legal(OpKind::Return);
        let result = bufferize(&mut f, &target);
        assert!(result.has_errors());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.code == Some(codes::ILLEGAL_OPERATION)));
        assert_eq!(run(&mut f, &target), Err(LegalityFailure));
    }

    #[test]
    fn broadcast_function_converts_and_passes() {
        let mut f = FuncBody::new("bcast");
        let input = f.add_arg(Type::buffer(vec![DimSize::Fixed(1)], ElemType::F32));
        let shape = f.add_arg(Type::Shape { rank: 1 });
        let op = f.new_op(
            OpKind::BroadcastTo,
            vec![input, shape],
            vec![Type::tensor(vec![DimSize::Fixed(4)], ElemType::F32)],
            None,
            span(),
        );
        f.push_op(RegionRef::Top, op);
        let result = f.op(op).results[0];
        let ret = f.new_op(OpKind::Return, vec![result], Vec::new(), None, span());
        f.push_op(RegionRef::Top, ret);

        assert_eq!(run(&mut f, &LegalityTarget::buffer_level()), Ok(()));
        assert!(f.walk().iter().all(|&o| f.op(o).kind != OpKind::BroadcastTo));
    }

    #[test]
    fn broadcast_inside_a_loop_body_converts() {
        let mut f = FuncBody::new("nested");
        let input = f.add_arg(Type::buffer(vec![DimSize::Fixed(1)], ElemType::F32));
        let shape = f.add_arg(Type::Shape { rank: 1 });
        let mut b = Builder::at_top_end(&mut f);
        let c0 = b.const_index(0, span());
        let c2 = b.const_index(2, span());
        let c1 = b.const_index(1, span());
        let (loop_op, _iv) = b.for_loop(c0, c2, c1, span());
        b.enter_body(loop_op);
        b.create(
            OpKind::BroadcastTo,
            vec![input, shape],
            vec![Type::tensor(vec![DimSize::Fixed(4)], ElemType::F32)],
            None,
            span(),
        );

        assert_eq!(run(&mut f, &LegalityTarget::buffer_level()), Ok(()));
        assert!(f.walk().iter().all(|&o| f.op(o).kind != OpKind::BroadcastTo));
        // The rewrite really happened: the copy loop's store is in the tree.
        assert!(f.walk().iter().any(|&o| f.op(o).kind == OpKind::Store));
    }

    #[test]
    fn declined_rank_shrinking_broadcast_warns_about_the_rank() {
        let mut f = FuncBody::new("shrink");
        let input = f.add_arg(Type::buffer(
            vec![DimSize::Fixed(2), DimSize::Fixed(3)],
            ElemType::F32,
        ));
        let shape = f.add_arg(Type::Shape { rank: 1 });
        let op = f.new_op(
            OpKind::BroadcastTo,
            vec![input, shape],
            vec![Type::tensor(vec![DimSize::Fixed(3)], ElemType::F32)],
            None,
            span(),
        );
        f.push_op(RegionRef::Top, op);

        let result = bufferize(&mut f, &LegalityTarget::buffer_level());
        assert!(result.has_errors());
        let warning = result
            .diagnostics
            .iter()
            .find(|d| d.level == DiagLevel::Warning)
            .unwrap();
        assert_eq!(warning.code, Some(codes::UNSUPPORTED_SHAPE_TRANSFER));
        assert!(warning.message.contains("input rank exceeds output rank"));
    }

    #[test]
    fn rerunning_on_converted_function_is_idempotent() {
        let mut f = FuncBody::new("bcast");
        let input = f.add_arg(Type::buffer(vec![DimSize::Fixed(1)], ElemType::F32));
        let shape = f.add_arg(Type::Shape { rank: 1 });
        let op = f.new_op(
            OpKind::BroadcastTo,
            vec![input, shape],
            vec![Type::tensor(vec![DimSize::Fixed(4)], ElemType::F32)],
            None,
            span(),
        );
        f.push_op(RegionRef::Top, op);

        let target = LegalityTarget::buffer_level();
        assert!(run(&mut f, &target).is_ok());
        let first: Vec<OpKind> = f.walk().iter().map(|&o| f.op(o).kind).collect();
        assert!(run(&mut f, &target).is_ok());
        let second: Vec<OpKind> = f.walk().iter().map(|&o| f.op(o).kind).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn partial_rewrite_survives_legality_failure() {
        // A convertible matmul next to an op the target rejects: the matmul
        // is rewritten anyway, then legality fails. Non-transactional by
        // contract.
        let mut f = FuncBody::new("mixed");
        let lhs = f.add_arg(Type::buffer(
            vec![DimSize::Fixed(2), DimSize::Fixed(2)],
            ElemType::F32,
        ));
        let rhs = f.add_arg(Type::buffer(
            vec![DimSize::Fixed(2), DimSize::Fixed(2)],
            ElemType::F32,
        ));
        let mm = f.new_op(
            OpKind::Matmul,
            vec![lhs, rhs],
            vec![Type::tensor(
                vec![DimSize::Fixed(2), DimSize::Fixed(2)],
                ElemType::F32,
            )],
            None,
            span(),
        );
        f.push_op(RegionRef::Top, mm);
        let result = f.op(mm).results[0];
        let ret = f.new_op(OpKind::Return, vec![result], Vec::new(), None, span());
        f.push_op(RegionRef::Top, ret);

        // Reject `return` to force a legality failure.
        let mut target = LegalityTarget::empty();
        for kind in BUFFER_LEVEL_KINDS {
            if kind != OpKind::Return {
                target = target.with_legal(kind);
            }
        }

        assert_eq!(run(&mut f, &target), Err(LegalityFailure));
        // The matmul was still rewritten.
        assert!(f.walk().iter().any(|&o| f.op(o).kind == OpKind::MatmulAcc));
        assert!(f.walk().iter().all(|&o| f.op(o).kind != OpKind::Matmul));
    }
}
