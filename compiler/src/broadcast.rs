// broadcast.rs — Broadcast lowering pattern.
//
// Rewrites `broadcast_to` into an allocation plus an explicit nested-loop
// copy. Broadcast detection is per input dimension and happens at run time:
// an input extent that differs from the right-aligned output extent reads
// index 0 instead of the loop induction variable.
//
// Preconditions: op has kind broadcast_to; operands are (input, shape);
//   input rank ≤ output rank.
// Postconditions: op is erased, its result's consumers read the new buffer,
//   the loop nest is perfectly nested with one loop per output dimension.
// Failure modes: PatternFailure::UnresolvedShape when no result shape
//   resolves, PatternFailure::RankMismatch when the input outranks the
//   output; the op is left unconverted either way.
// Side effects: mutates the function body through the builder.

use crate::bufferize::PatternFailure;
use crate::id::OpId;
use crate::ir::{Builder, FuncBody};
use crate::{alloc, shape};

/// Lower one `broadcast_to` operation to a loop nest over an allocated
/// buffer.
pub fn lower_broadcast(func: &mut FuncBody, op: OpId) -> Result<(), PatternFailure> {
    let operation = func.op(op);
    let span = operation.span;
    let input = operation.operands[0];
    let result = operation.results[0];

    let out_rank = func
        .value_ty(result)
        .rank()
        .ok_or(PatternFailure::UnresolvedShape)?;
    let in_rank = func
        .value_ty(input)
        .rank()
        .ok_or(PatternFailure::UnresolvedShape)?;
    if in_rank > out_rank {
        return Err(PatternFailure::RankMismatch);
    }
    let rank_diff = out_rank - in_rank;

    let specs = shape::result_shapes(func, op);
    if specs.is_empty() {
        return Err(PatternFailure::UnresolvedShape);
    }

    let mut b = Builder::before(func, op).ok_or(PatternFailure::UnresolvedShape)?;
    let allocated = alloc::allocate_results(&mut b, op, &specs);
    let Some(out) = allocated.first().copied() else {
        return Err(PatternFailure::UnresolvedShape);
    };

    // Materialize the output extents, one read per output dimension.
    let mut extents = Vec::with_capacity(out_rank);
    for k in 0..out_rank {
        let ck = b.const_index(k as u64, span);
        extents.push(b.get_extent(out.shape, ck, span));
    }

    // Per input dimension: does it broadcast? Extents may be dynamic, so the
    // comparison is a run-time instruction.
    let mut broadcasts = Vec::with_capacity(in_rank);
    for i in 0..in_rank {
        let input_extent = b.dim(input, i as u64, span);
        broadcasts.push(b.cmp_ne(input_extent, extents[rank_diff + i], span));
    }

    // The perfectly nested loops. Loop invariant: at the start of iteration
    // `k` the cursor sits inside `k` nested loop bodies.
    let c0 = b.const_index(0, span);
    let c1 = b.const_index(1, span);
    let mut induction_vars = Vec::with_capacity(out_rank);
    for k in 0..out_rank {
        let (loop_op, iv) = b.for_loop(c0, extents[k], c1, span);
        induction_vars.push(iv);
        b.enter_body(loop_op);
    }

    // Inner body: clamp broadcast dimensions to index 0 when reading the
    // input, write at the full induction-variable tuple.
    let mut input_indices = Vec::with_capacity(in_rank);
    for i in 0..in_rank {
        let zero = b.const_index(0, span);
        input_indices.push(b.select(broadcasts[i], zero, induction_vars[rank_diff + i], span));
    }
    let element = b.load(input, input_indices, span);
    b.store(element, out.buffer, induction_vars, span);

    func.replace_all_uses(result, out.buffer);
    func.erase_op(op);
    Ok(())
}
