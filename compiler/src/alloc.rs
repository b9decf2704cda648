// alloc.rs — Buffer allocation for lowering patterns.
//
// Materializes resolved shape specs as IR values and inserts one
// `alloc_buffer` per positionally zipped (result, shape) pair, immediately
// before the operation being lowered. If the spec list is shorter than the
// result list, trailing results are skipped — documented policy, not an
// error (the driver's final legality check catches any op left with an
// unconverted tensor result).
//
// Preconditions: builder cursor sits before the operation being lowered;
//   every zipped result has tensor type.
// Postconditions: one alloc_buffer op per returned entry, placed before the
//   lowered op, each with its shape operand materialized.
// Failure modes: none here — absence of a shape is the only way a result
//   goes unallocated, and that is the caller's AllocationFailure.
// Side effects: inserts operations through the builder.

use crate::diag::Span;
use crate::id::{OpId, ValueId};
use crate::ir::Builder;
use crate::shape::{ExtentExpr, ShapeSpec};

/// One allocated result: the buffer value and the shape value it was sized
/// from.
#[derive(Debug, Clone, Copy)]
pub struct Allocated {
    pub buffer: ValueId,
    pub shape: ValueId,
}

/// Allocate one buffer per (result, shape) pair, front-aligned.
pub fn allocate_results(b: &mut Builder, op: OpId, specs: &[ShapeSpec]) -> Vec<Allocated> {
    let span = b.func().op(op).span;
    let result_ids = b.func().op(op).results.clone();
    let mut results = Vec::with_capacity(result_ids.len());
    for r in result_ids {
        let ty = b.func().value_ty(r).clone();
        results.push((r, ty));
    }

    let mut allocated = Vec::new();
    for ((_result, result_ty), spec) in results.iter().zip(specs.iter()) {
        let Some(buffer_ty) = result_ty.buffer_for() else {
            continue;
        };
        let shape = materialize(b, spec, span);
        let buffer = b.alloc_buffer(shape, buffer_ty, span);
        allocated.push(Allocated { buffer, shape });
    }
    allocated
}

/// Turn a shape spec into a shape value at the cursor.
fn materialize(b: &mut Builder, spec: &ShapeSpec, span: Span) -> ValueId {
    match spec {
        ShapeSpec::Existing(v) => *v,
        ShapeSpec::Pack(extents) => {
            let mut parts = Vec::with_capacity(extents.len());
            for extent in extents {
                match extent {
                    ExtentExpr::DimOf { value, dim } => {
                        parts.push(b.dim(*value, *dim, span));
                    }
                }
            }
            b.pack_shape(parts, span)
        }
    }
}
