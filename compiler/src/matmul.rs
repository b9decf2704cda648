// matmul.rs — Matmul lowering pattern.
//
// Rewrites `matmul` into an allocation, a zero-fill of the whole output
// buffer, and an accumulating dense product kernel. The kernel itself is an
// opaque buffer-level op (`matmul_acc`); this pattern only wires it up.
//
// Preconditions: op has kind matmul; operands are rank-2 (lhs, rhs).
// Postconditions: op is erased; consumers read the filled buffer; the fill
//   precedes the accumulate.
// Failure modes: PatternFailure::UnresolvedShape when no result shape
//   resolves.
// Side effects: mutates the function body through the builder.

use crate::bufferize::PatternFailure;
use crate::id::OpId;
use crate::ir::{Builder, ElemType, FuncBody};
use crate::{alloc, shape};

/// Lower one `matmul` operation to fill + accumulate over an allocated
/// buffer.
pub fn lower_matmul(func: &mut FuncBody, op: OpId) -> Result<(), PatternFailure> {
    let operation = func.op(op);
    let span = operation.span;
    let lhs = operation.operands[0];
    let rhs = operation.operands[1];
    let result = operation.results[0];
    let elem = func.value_ty(result).elem().unwrap_or(ElemType::F32);

    let specs = shape::result_shapes(func, op);
    if specs.is_empty() {
        return Err(PatternFailure::UnresolvedShape);
    }

    let mut b = Builder::before(func, op).ok_or(PatternFailure::UnresolvedShape)?;
    let allocated = alloc::allocate_results(&mut b, op, &specs);
    let Some(out) = allocated.first().copied() else {
        return Err(PatternFailure::UnresolvedShape);
    };

    let zero = b.const_scalar(0.0, elem, span);
    b.fill(out.buffer, zero, span);
    b.matmul_acc(lhs, rhs, out.buffer, span);

    func.replace_all_uses(result, out.buffer);
    func.erase_op(op);
    Ok(())
}
