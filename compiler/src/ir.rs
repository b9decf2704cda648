// ir.rs — Arena-based buffer/tensor IR.
//
// A function body owns two arenas (operations, values) addressed by stable
// OpId/ValueId indices. Region lists (the top-level list and `for` bodies)
// define execution order and liveness; erased operations are simply removed
// from their region list, their arena slot stays behind. Values record their
// consumer operations so that replacing a value rewrites consumer operand
// slots in place — consumers are never moved or copied.
//
// Preconditions: none.
// Postconditions: structural invariants are maintained by the mutation API
//   (consumer edges stay consistent with operand slots).
// Failure modes: none (lookup methods index arenas directly).
// Side effects: none outside the owning FuncBody.

use std::fmt;

use crate::diag::Span;
use crate::id::{OpId, ValueId};

// ── Types ───────────────────────────────────────────────────────────────────

/// Scalar element type of a tensor or buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElemType {
    F32,
    F64,
    I32,
}

impl fmt::Display for ElemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ElemType::F32 => "f32",
            ElemType::F64 => "f64",
            ElemType::I32 => "i32",
        };
        write!(f, "{}", s)
    }
}

/// One dimension of a tensor or buffer type: statically known or dynamic
/// (resolved at run time through a shape value).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimSize {
    Fixed(u64),
    Dynamic,
}

impl fmt::Display for DimSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DimSize::Fixed(n) => write!(f, "{}", n),
            DimSize::Dynamic => write!(f, "?"),
        }
    }
}

/// Value types.
///
/// `Tensor` is value-semantic and illegal after bufferization; `Buffer` is
/// its mutable, memory-backed counterpart. `Shape` is an ordered sequence of
/// per-dimension extents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Tensor { dims: Vec<DimSize>, elem: ElemType },
    Buffer { dims: Vec<DimSize>, elem: ElemType },
    Shape { rank: usize },
    Index,
    Bool,
    Scalar(ElemType),
}

impl Type {
    pub fn tensor(dims: Vec<DimSize>, elem: ElemType) -> Self {
        Type::Tensor { dims, elem }
    }

    pub fn buffer(dims: Vec<DimSize>, elem: ElemType) -> Self {
        Type::Buffer { dims, elem }
    }

    pub fn is_tensor(&self) -> bool {
        matches!(self, Type::Tensor { .. })
    }

    pub fn is_buffer(&self) -> bool {
        matches!(self, Type::Buffer { .. })
    }

    /// Rank of a tensor or buffer type.
    pub fn rank(&self) -> Option<usize> {
        match self {
            Type::Tensor { dims, .. } | Type::Buffer { dims, .. } => Some(dims.len()),
            _ => None,
        }
    }

    /// Dimension list of a tensor or buffer type.
    pub fn dims(&self) -> Option<&[DimSize]> {
        match self {
            Type::Tensor { dims, .. } | Type::Buffer { dims, .. } => Some(dims),
            _ => None,
        }
    }

    /// Element type of a tensor, buffer, or scalar type.
    pub fn elem(&self) -> Option<ElemType> {
        match self {
            Type::Tensor { elem, .. } | Type::Buffer { elem, .. } | Type::Scalar(elem) => {
                Some(*elem)
            }
            _ => None,
        }
    }

    /// The buffer type backing a tensor type: same dims, same element type.
    pub fn buffer_for(&self) -> Option<Type> {
        match self {
            Type::Tensor { dims, elem } => Some(Type::Buffer {
                dims: dims.clone(),
                elem: *elem,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Tensor { dims, elem } => {
                write!(f, "tensor<")?;
                for d in dims {
                    write!(f, "{}x", d)?;
                }
                write!(f, "{}>", elem)
            }
            Type::Buffer { dims, elem } => {
                write!(f, "buffer<")?;
                for d in dims {
                    write!(f, "{}x", d)?;
                }
                write!(f, "{}>", elem)
            }
            Type::Shape { rank } => write!(f, "shape<{}>", rank),
            Type::Index => write!(f, "index"),
            Type::Bool => write!(f, "bool"),
            Type::Scalar(elem) => write!(f, "{}", elem),
        }
    }
}

// ── Operation kinds ─────────────────────────────────────────────────────────

/// Closed set of operation kinds.
///
/// `BroadcastTo` and `Matmul` are the tensor-level kinds eliminated by
/// bufferization; everything else is buffer-level and legal in the final
/// program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    BroadcastTo,
    Matmul,
    AllocBuffer,
    Dim,
    ConstIndex,
    ConstScalar,
    PackShape,
    GetExtent,
    CmpNe,
    Select,
    For,
    Load,
    Store,
    Fill,
    MatmulAcc,
    Return,
}

/// The buffer-level kinds: every kind except the two tensor-level ones.
pub const BUFFER_LEVEL_KINDS: [OpKind; 14] = [
    OpKind::AllocBuffer,
    OpKind::Dim,
    OpKind::ConstIndex,
    OpKind::ConstScalar,
    OpKind::PackShape,
    OpKind::GetExtent,
    OpKind::CmpNe,
    OpKind::Select,
    OpKind::For,
    OpKind::Load,
    OpKind::Store,
    OpKind::Fill,
    OpKind::MatmulAcc,
    OpKind::Return,
];

impl OpKind {
    pub fn name(self) -> &'static str {
        match self {
            OpKind::BroadcastTo => "broadcast_to",
            OpKind::Matmul => "matmul",
            OpKind::AllocBuffer => "alloc_buffer",
            OpKind::Dim => "dim",
            OpKind::ConstIndex => "const_index",
            OpKind::ConstScalar => "const_scalar",
            OpKind::PackShape => "pack_shape",
            OpKind::GetExtent => "get_extent",
            OpKind::CmpNe => "cmp_ne",
            OpKind::Select => "select",
            OpKind::For => "for",
            OpKind::Load => "load",
            OpKind::Store => "store",
            OpKind::Fill => "fill",
            OpKind::MatmulAcc => "matmul_acc",
            OpKind::Return => "return",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "broadcast_to" => OpKind::BroadcastTo,
            "matmul" => OpKind::Matmul,
            "alloc_buffer" => OpKind::AllocBuffer,
            "dim" => OpKind::Dim,
            "const_index" => OpKind::ConstIndex,
            "const_scalar" => OpKind::ConstScalar,
            "pack_shape" => OpKind::PackShape,
            "get_extent" => OpKind::GetExtent,
            "cmp_ne" => OpKind::CmpNe,
            "select" => OpKind::Select,
            "for" => OpKind::For,
            "load" => OpKind::Load,
            "store" => OpKind::Store,
            "fill" => OpKind::Fill,
            "matmul_acc" => OpKind::MatmulAcc,
            "return" => OpKind::Return,
            _ => return None,
        };
        Some(kind)
    }

    /// Number of results an operation of this kind produces.
    pub fn num_results(self) -> usize {
        match self {
            OpKind::For
            | OpKind::Store
            | OpKind::Fill
            | OpKind::MatmulAcc
            | OpKind::Return => 0,
            _ => 1,
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ── Operations and values ───────────────────────────────────────────────────

/// Constant payload of `const_index`, `const_scalar`, and `dim` operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Attr {
    Index(u64),
    Scalar(f64),
}

/// A tagged IR node. Mutated only by replacement, never in place.
#[derive(Debug, Clone)]
pub struct Operation {
    pub kind: OpKind,
    pub operands: Vec<ValueId>,
    pub results: Vec<ValueId>,
    pub attr: Option<Attr>,
    pub span: Span,
    /// Nested region — non-empty only for `for`.
    pub body: Vec<OpId>,
    /// Induction variable of a `for` loop.
    pub body_arg: Option<ValueId>,
}

/// Where a value is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDef {
    /// Function argument at the given position.
    Arg(usize),
    /// Result `index` of the given operation.
    Result(OpId, usize),
    /// Induction variable of the given `for` loop.
    Induction(OpId),
}

/// A typed value handle plus its recorded consumer edges.
///
/// One consumer entry is recorded per operand slot, so an operation using a
/// value twice appears twice.
#[derive(Debug, Clone)]
pub struct ValueData {
    pub ty: Type,
    pub def: ValueDef,
    pub consumers: Vec<OpId>,
}

/// A region list an operation can be inserted into: the function's top level
/// or the body of a `for` loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionRef {
    Top,
    Body(OpId),
}

// ── Function body ───────────────────────────────────────────────────────────

/// A function body: op/value arenas plus the top-level region list.
#[derive(Debug, Clone)]
pub struct FuncBody {
    pub name: String,
    ops: Vec<Operation>,
    values: Vec<ValueData>,
    pub args: Vec<ValueId>,
    top: Vec<OpId>,
}

impl FuncBody {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ops: Vec::new(),
            values: Vec::new(),
            args: Vec::new(),
            top: Vec::new(),
        }
    }

    // ── Lookup ──────────────────────────────────────────────────────────

    pub fn op(&self, id: OpId) -> &Operation {
        &self.ops[id.index()]
    }

    pub fn op_mut(&mut self, id: OpId) -> &mut Operation {
        &mut self.ops[id.index()]
    }

    pub fn value(&self, id: ValueId) -> &ValueData {
        &self.values[id.index()]
    }

    pub fn value_ty(&self, id: ValueId) -> &Type {
        &self.values[id.index()].ty
    }

    /// Top-level operations in execution order (snapshot).
    pub fn top_ops(&self) -> Vec<OpId> {
        self.top.clone()
    }

    /// All operations, pre-order: each op before the ops in its body.
    pub fn walk(&self) -> Vec<OpId> {
        let mut out = Vec::new();
        for &id in &self.top {
            self.walk_into(id, &mut out);
        }
        out
    }

    fn walk_into(&self, id: OpId, out: &mut Vec<OpId>) {
        out.push(id);
        for &child in &self.ops[id.index()].body {
            self.walk_into(child, out);
        }
    }

    // ── Construction ────────────────────────────────────────────────────

    pub fn add_arg(&mut self, ty: Type) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueData {
            ty,
            def: ValueDef::Arg(self.args.len()),
            consumers: Vec::new(),
        });
        self.args.push(id);
        id
    }

    /// Create an operation in the arena without placing it in a region.
    /// Records one consumer edge per operand slot and creates result values.
    pub fn new_op(
        &mut self,
        kind: OpKind,
        operands: Vec<ValueId>,
        result_tys: Vec<Type>,
        attr: Option<Attr>,
        span: Span,
    ) -> OpId {
        let id = OpId(self.ops.len() as u32);
        for &operand in &operands {
            self.values[operand.index()].consumers.push(id);
        }
        let mut results = Vec::with_capacity(result_tys.len());
        for (i, ty) in result_tys.into_iter().enumerate() {
            let v = ValueId(self.values.len() as u32);
            self.values.push(ValueData {
                ty,
                def: ValueDef::Result(id, i),
                consumers: Vec::new(),
            });
            results.push(v);
        }
        self.ops.push(Operation {
            kind,
            operands,
            results,
            attr,
            span,
            body: Vec::new(),
            body_arg: None,
        });
        id
    }

    /// Create the induction variable of a `for` operation.
    pub fn add_induction(&mut self, op: OpId) -> ValueId {
        let v = ValueId(self.values.len() as u32);
        self.values.push(ValueData {
            ty: Type::Index,
            def: ValueDef::Induction(op),
            consumers: Vec::new(),
        });
        self.ops[op.index()].body_arg = Some(v);
        v
    }

    // ── Regions ─────────────────────────────────────────────────────────

    pub fn region(&self, r: RegionRef) -> &[OpId] {
        match r {
            RegionRef::Top => &self.top,
            RegionRef::Body(op) => &self.ops[op.index()].body,
        }
    }

    fn region_mut(&mut self, r: RegionRef) -> &mut Vec<OpId> {
        match r {
            RegionRef::Top => &mut self.top,
            RegionRef::Body(op) => &mut self.ops[op.index()].body,
        }
    }

    /// Append an operation to the end of a region.
    pub fn push_op(&mut self, r: RegionRef, op: OpId) {
        self.region_mut(r).push(op);
    }

    /// Insert an operation into a region at the given position.
    pub fn insert_op(&mut self, r: RegionRef, index: usize, op: OpId) {
        self.region_mut(r).insert(index, op);
    }

    /// Find the region and position of a placed operation.
    pub fn locate(&self, op: OpId) -> Option<(RegionRef, usize)> {
        if let Some(i) = self.top.iter().position(|&o| o == op) {
            return Some((RegionRef::Top, i));
        }
        for id in self.walk() {
            if let Some(i) = self.ops[id.index()].body.iter().position(|&o| o == op) {
                return Some((RegionRef::Body(id), i));
            }
        }
        None
    }

    // ── Mutation by replacement ─────────────────────────────────────────

    /// Rebind every consumer of `old` to `new`. Consumer operand slots are
    /// rewritten in place; consumer edge records move from `old` to `new`.
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) {
        if old == new {
            return;
        }
        let consumers = std::mem::take(&mut self.values[old.index()].consumers);
        for &op in &consumers {
            for slot in self.ops[op.index()].operands.iter_mut() {
                if *slot == old {
                    *slot = new;
                }
            }
        }
        self.values[new.index()].consumers.extend(consumers);
    }

    /// Remove an operation from its region and drop its consumer edges.
    /// The caller must have rebound the op's results first.
    pub fn erase_op(&mut self, op: OpId) {
        if let Some((region, index)) = self.locate(op) {
            self.region_mut(region).remove(index);
        }
        let operands = std::mem::take(&mut self.ops[op.index()].operands);
        for operand in operands {
            self.values[operand.index()].consumers.retain(|&c| c != op);
        }
    }
}

// ── Builder ─────────────────────────────────────────────────────────────────

/// Insertion-point cursor over a function body.
///
/// Created before a target operation (pattern rewrites) or at the end of a
/// region (front-end binding); each created op advances the cursor, so ops
/// appear in creation order.
pub struct Builder<'f> {
    func: &'f mut FuncBody,
    region: RegionRef,
    index: usize,
}

impl<'f> Builder<'f> {
    /// Position the cursor immediately before a placed operation.
    pub fn before(func: &'f mut FuncBody, op: OpId) -> Option<Self> {
        let (region, index) = func.locate(op)?;
        Some(Self {
            func,
            region,
            index,
        })
    }

    /// Position the cursor at the end of the top-level region.
    pub fn at_top_end(func: &'f mut FuncBody) -> Self {
        let index = func.region(RegionRef::Top).len();
        Self {
            func,
            region: RegionRef::Top,
            index,
        }
    }

    pub fn func(&mut self) -> &mut FuncBody {
        self.func
    }

    /// Move the cursor to the end of a `for` loop's body.
    pub fn enter_body(&mut self, loop_op: OpId) {
        self.index = self.func.region(RegionRef::Body(loop_op)).len();
        self.region = RegionRef::Body(loop_op);
    }

    /// Create an operation at the cursor and advance past it.
    pub fn create(
        &mut self,
        kind: OpKind,
        operands: Vec<ValueId>,
        result_tys: Vec<Type>,
        attr: Option<Attr>,
        span: Span,
    ) -> OpId {
        let op = self.func.new_op(kind, operands, result_tys, attr, span);
        self.func.insert_op(self.region, self.index, op);
        self.index += 1;
        op
    }

    fn single_result(&self, op: OpId) -> ValueId {
        self.func.op(op).results[0]
    }

    // ── Typed convenience wrappers ──────────────────────────────────────

    pub fn const_index(&mut self, value: u64, span: Span) -> ValueId {
        let op = self.create(
            OpKind::ConstIndex,
            Vec::new(),
            vec![Type::Index],
            Some(Attr::Index(value)),
            span,
        );
        self.single_result(op)
    }

    pub fn const_scalar(&mut self, value: f64, elem: ElemType, span: Span) -> ValueId {
        let op = self.create(
            OpKind::ConstScalar,
            Vec::new(),
            vec![Type::Scalar(elem)],
            Some(Attr::Scalar(value)),
            span,
        );
        self.single_result(op)
    }

    pub fn dim(&mut self, value: ValueId, dim: u64, span: Span) -> ValueId {
        let op = self.create(
            OpKind::Dim,
            vec![value],
            vec![Type::Index],
            Some(Attr::Index(dim)),
            span,
        );
        self.single_result(op)
    }

    pub fn pack_shape(&mut self, extents: Vec<ValueId>, span: Span) -> ValueId {
        let rank = extents.len();
        let op = self.create(
            OpKind::PackShape,
            extents,
            vec![Type::Shape { rank }],
            None,
            span,
        );
        self.single_result(op)
    }

    pub fn get_extent(&mut self, shape: ValueId, dim_index: ValueId, span: Span) -> ValueId {
        let op = self.create(
            OpKind::GetExtent,
            vec![shape, dim_index],
            vec![Type::Index],
            None,
            span,
        );
        self.single_result(op)
    }

    pub fn alloc_buffer(&mut self, shape: ValueId, buffer_ty: Type, span: Span) -> ValueId {
        let op = self.create(
            OpKind::AllocBuffer,
            vec![shape],
            vec![buffer_ty],
            None,
            span,
        );
        self.single_result(op)
    }

    pub fn cmp_ne(&mut self, lhs: ValueId, rhs: ValueId, span: Span) -> ValueId {
        let op = self.create(OpKind::CmpNe, vec![lhs, rhs], vec![Type::Bool], None, span);
        self.single_result(op)
    }

    pub fn select(
        &mut self,
        cond: ValueId,
        if_true: ValueId,
        if_false: ValueId,
        span: Span,
    ) -> ValueId {
        let op = self.create(
            OpKind::Select,
            vec![cond, if_true, if_false],
            vec![Type::Index],
            None,
            span,
        );
        self.single_result(op)
    }

    /// Create an empty `for` loop; returns the loop op and its induction
    /// variable. The cursor stays outside the loop — call `enter_body` to
    /// build its body.
    pub fn for_loop(
        &mut self,
        lower: ValueId,
        upper: ValueId,
        step: ValueId,
        span: Span,
    ) -> (OpId, ValueId) {
        let op = self.create(OpKind::For, vec![lower, upper, step], Vec::new(), None, span);
        let iv = self.func.add_induction(op);
        (op, iv)
    }

    pub fn load(&mut self, buffer: ValueId, indices: Vec<ValueId>, span: Span) -> ValueId {
        let elem = self
            .func
            .value_ty(buffer)
            .elem()
            .unwrap_or(ElemType::F32);
        let mut operands = vec![buffer];
        operands.extend(indices);
        let op = self.create(
            OpKind::Load,
            operands,
            vec![Type::Scalar(elem)],
            None,
            span,
        );
        self.single_result(op)
    }

    pub fn store(&mut self, value: ValueId, buffer: ValueId, indices: Vec<ValueId>, span: Span) {
        let mut operands = vec![value, buffer];
        operands.extend(indices);
        self.create(OpKind::Store, operands, Vec::new(), None, span);
    }

    pub fn fill(&mut self, buffer: ValueId, scalar: ValueId, span: Span) {
        self.create(OpKind::Fill, vec![buffer, scalar], Vec::new(), None, span);
    }

    pub fn matmul_acc(&mut self, lhs: ValueId, rhs: ValueId, out: ValueId, span: Span) {
        self.create(OpKind::MatmulAcc, vec![lhs, rhs, out], Vec::new(), None, span);
    }
}

// ── Module ──────────────────────────────────────────────────────────────────

/// A set of function bodies. Functions are independent; the driver runs on
/// each in isolation.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub funcs: Vec<FuncBody>,
}

// ── Tests ───────────────────────────────────────────────────────────────────
