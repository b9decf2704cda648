// shape.rs — Shape transfer resolver.
//
// Maps an operation to a symbolic description of each result's shape. Pure:
// the resolver only describes shapes; the allocator materializes them as IR.
// The rule table is closed — kinds without an entry return an empty list,
// which is the single way a result ends up unallocated.
//
// Preconditions: `op` is a placed operation of the function.
// Postconditions: none (no mutation).
// Failure modes: none — an unsupported kind yields an empty list.
// Side effects: none.

use crate::id::{OpId, ValueId};
use crate::ir::{FuncBody, OpKind};

/// A per-dimension extent that must be read from an existing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtentExpr {
    /// Extent of dimension `dim` of `value`.
    DimOf { value: ValueId, dim: u64 },
}

/// Symbolic shape of one operation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeSpec {
    /// The shape is an existing shape value (e.g. `broadcast_to`'s explicit
    /// shape operand).
    Existing(ValueId),
    /// The shape is packed from computed extents (e.g. `matmul`'s
    /// rows-of-lhs × cols-of-rhs).
    Pack(Vec<ExtentExpr>),
}

/// Resolve the symbolic result shapes of `op`.
///
/// Returns one entry per result for supported kinds, positionally from the
/// front; an empty list means no shape transfer function is known.
pub fn result_shapes(func: &FuncBody, op: OpId) -> Vec<ShapeSpec> {
    let operation = func.op(op);
    match operation.kind {
        OpKind::BroadcastTo => {
            // Result shape is the explicit shape operand, verbatim.
            vec![ShapeSpec::Existing(operation.operands[1])]
        }
        OpKind::Matmul => {
            // Rank-2 operands: result is (rows of lhs, cols of rhs).
            let lhs = operation.operands[0];
            let rhs = operation.operands[1];
            vec![ShapeSpec::Pack(vec![
                ExtentExpr::DimOf { value: lhs, dim: 0 },
                ExtentExpr::DimOf { value: rhs, dim: 1 },
            ])]
        }
        // No shape transfer function.
        _ => Vec::new(),
    }
}
