// interp.rs — Reference evaluator for lowered buffer programs.
//
// Executes a legal (buffer-level) function body directly over the arena IR.
// Supplies the two numeric kernels the lowering delegates to — zero-fill and
// accumulating dense matmul — plus loops, loads/stores, extent reads, and
// select/compare. Tensor-level operations are not executable: the evaluator
// exists to test what bufferization generates, not to interpret its input.
//
// Buffers are row-major; all element types are evaluated in f64.
//
// Preconditions: the function body contains only buffer-level operations.
// Postconditions: returns the operand values of the first executed `return`.
// Failure modes: EvalError for tensor-level ops, type mismatches, or
//   out-of-range indices.
// Side effects: mutates buffers shared through Rc handles.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::id::{OpId, ValueId};
use crate::ir::{Attr, DimSize, FuncBody, OpKind, RegionRef};

/// A mutable runtime buffer: extents plus row-major data.
#[derive(Debug, Clone, PartialEq)]
pub struct BufData {
    pub dims: Vec<i64>,
    pub data: Vec<f64>,
}

impl BufData {
    pub fn zeros(dims: Vec<i64>) -> Self {
        let len = dims.iter().product::<i64>().max(0) as usize;
        Self {
            dims,
            data: vec![0.0; len],
        }
    }

    fn linear_index(&self, indices: &[i64]) -> Option<usize> {
        if indices.len() != self.dims.len() {
            return None;
        }
        let mut linear: i64 = 0;
        for (&i, &extent) in indices.iter().zip(self.dims.iter()) {
            if i < 0 || i >= extent {
                return None;
            }
            linear = linear * extent + i;
        }
        Some(linear as usize)
    }

    pub fn get(&self, indices: &[i64]) -> Option<f64> {
        self.linear_index(indices).map(|i| self.data[i])
    }
}

/// A runtime value.
#[derive(Debug, Clone)]
pub enum RtValue {
    Index(i64),
    Bool(bool),
    Scalar(f64),
    Shape(Vec<i64>),
    Buffer(Rc<RefCell<BufData>>),
}

impl RtValue {
    /// Convenience constructor for buffer arguments.
    pub fn buffer(dims: Vec<i64>, data: Vec<f64>) -> Self {
        RtValue::Buffer(Rc::new(RefCell::new(BufData { dims, data })))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvalError {
    pub message: String,
}

impl EvalError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "eval error: {}", self.message)
    }
}

impl std::error::Error for EvalError {}

/// Evaluate a function body with the given arguments; returns the values of
/// the first `return` reached at the top level.
pub fn eval_func(func: &FuncBody, args: Vec<RtValue>) -> Result<Vec<RtValue>, EvalError> {
    if args.len() != func.args.len() {
        return Err(EvalError::new(format!(
            "expected {} arguments, got {}",
            func.args.len(),
            args.len()
        )));
    }
    let mut env: HashMap<ValueId, RtValue> = HashMap::new();
    for (&id, value) in func.args.iter().zip(args) {
        env.insert(id, value);
    }
    let mut interp = Interp { func, env };
    match interp.run_region(RegionRef::Top)? {
        Some(values) => Ok(values),
        None => Ok(Vec::new()),
    }
}

struct Interp<'f> {
    func: &'f FuncBody,
    env: HashMap<ValueId, RtValue>,
}

impl<'f> Interp<'f> {
    /// Execute a region; `Some` when a `return` was reached.
    fn run_region(&mut self, region: RegionRef) -> Result<Option<Vec<RtValue>>, EvalError> {
        for &op in self.func.region(region) {
            if let Some(values) = self.run_op(op)? {
                return Ok(Some(values));
            }
        }
        Ok(None)
    }

    fn run_op(&mut self, op: OpId) -> Result<Option<Vec<RtValue>>, EvalError> {
        let operation = self.func.op(op);
        match operation.kind {
            OpKind::Return => {
                let mut values = Vec::with_capacity(operation.operands.len());
                for &v in &operation.operands {
                    values.push(self.get(v)?);
                }
                return Ok(Some(values));
            }
            OpKind::ConstIndex => {
                let Some(Attr::Index(n)) = operation.attr else {
                    return Err(EvalError::new("const_index without payload"));
                };
                self.set(operation.results[0], RtValue::Index(n as i64));
            }
            OpKind::ConstScalar => {
                let Some(Attr::Scalar(x)) = operation.attr else {
                    return Err(EvalError::new("const_scalar without payload"));
                };
                self.set(operation.results[0], RtValue::Scalar(x));
            }
            OpKind::Dim => {
                let Some(Attr::Index(d)) = operation.attr else {
                    return Err(EvalError::new("dim without payload"));
                };
                let buf = self.get_buffer(operation.operands[0])?;
                let dims = buf.borrow().dims.clone();
                let extent = *dims
                    .get(d as usize)
                    .ok_or_else(|| EvalError::new(format!("dim {} out of range", d)))?;
                self.set(operation.results[0], RtValue::Index(extent));
            }
            OpKind::PackShape => {
                let mut extents = Vec::with_capacity(operation.operands.len());
                for &v in &operation.operands {
                    extents.push(self.get_index(v)?);
                }
                self.set(operation.results[0], RtValue::Shape(extents));
            }
            OpKind::GetExtent => {
                let shape = self.get_shape(operation.operands[0])?;
                let index = self.get_index(operation.operands[1])?;
                let extent = *shape
                    .get(index as usize)
                    .ok_or_else(|| EvalError::new(format!("extent {} out of range", index)))?;
                self.set(operation.results[0], RtValue::Index(extent));
            }
            OpKind::AllocBuffer => {
                // Static dims from the type, dynamic dims from the shape
                // operand.
                let shape = self.get_shape(operation.operands[0])?;
                let result = operation.results[0];
                let Some(type_dims) = self.func.value_ty(result).dims() else {
                    return Err(EvalError::new("alloc_buffer result is not a buffer"));
                };
                if shape.len() != type_dims.len() {
                    return Err(EvalError::new(format!(
                        "shape rank {} does not match buffer rank {}",
                        shape.len(),
                        type_dims.len()
                    )));
                }
                let dims: Vec<i64> = type_dims
                    .iter()
                    .zip(shape.iter())
                    .map(|(d, &runtime)| match d {
                        DimSize::Fixed(n) => *n as i64,
                        DimSize::Dynamic => runtime,
                    })
                    .collect();
                self.set(
                    result,
                    RtValue::Buffer(Rc::new(RefCell::new(BufData::zeros(dims)))),
                );
            }
            OpKind::CmpNe => {
                let lhs = self.get_index(operation.operands[0])?;
                let rhs = self.get_index(operation.operands[1])?;
                self.set(operation.results[0], RtValue::Bool(lhs != rhs));
            }
            OpKind::Select => {
                let cond = match self.get(operation.operands[0])? {
                    RtValue::Bool(b) => b,
                    _ => return Err(EvalError::new("select condition is not a bool")),
                };
                let picked = if cond {
                    operation.operands[1]
                } else {
                    operation.operands[2]
                };
                let value = self.get(picked)?;
                self.set(operation.results[0], value);
            }
            OpKind::For => {
                let lower = self.get_index(operation.operands[0])?;
                let upper = self.get_index(operation.operands[1])?;
                let step = self.get_index(operation.operands[2])?;
                if step <= 0 {
                    return Err(EvalError::new("loop step must be positive"));
                }
                let Some(iv) = operation.body_arg else {
                    return Err(EvalError::new("for loop without induction variable"));
                };
                let mut i = lower;
                while i < upper {
                    self.set(iv, RtValue::Index(i));
                    if let Some(values) = self.run_region(RegionRef::Body(op))? {
                        return Ok(Some(values));
                    }
                    i += step;
                }
            }
            OpKind::Load => {
                let buf = self.get_buffer(operation.operands[0])?;
                let indices = self.get_indices(&operation.operands[1..])?;
                let value = buf
                    .borrow()
                    .get(&indices)
                    .ok_or_else(|| EvalError::new("load index out of range"))?;
                self.set(operation.results[0], RtValue::Scalar(value));
            }
            OpKind::Store => {
                let value = self.get_scalar(operation.operands[0])?;
                let buf = self.get_buffer(operation.operands[1])?;
                let indices = self.get_indices(&operation.operands[2..])?;
                let mut data = buf.borrow_mut();
                let linear = data
                    .linear_index(&indices)
                    .ok_or_else(|| EvalError::new("store index out of range"))?;
                data.data[linear] = value;
            }
            OpKind::Fill => {
                let buf = self.get_buffer(operation.operands[0])?;
                let value = self.get_scalar(operation.operands[1])?;
                for slot in buf.borrow_mut().data.iter_mut() {
                    *slot = value;
                }
            }
            OpKind::MatmulAcc => {
                let lhs = self.get_buffer(operation.operands[0])?;
                let rhs = self.get_buffer(operation.operands[1])?;
                let out = self.get_buffer(operation.operands[2])?;
                let lhs = lhs.borrow();
                let rhs = rhs.borrow();
                let mut out = out.borrow_mut();
                let (&[m, k], &[k2, n], &[om, on]) =
                    (&lhs.dims[..], &rhs.dims[..], &out.dims[..])
                else {
                    return Err(EvalError::new("matmul_acc operands must be rank-2"));
                };
                if k != k2 || om != m || on != n {
                    return Err(EvalError::new("matmul_acc dimension mismatch"));
                }
                for i in 0..m {
                    for j in 0..n {
                        let mut acc = 0.0;
                        for l in 0..k {
                            acc += lhs.data[(i * k + l) as usize] * rhs.data[(l * n + j) as usize];
                        }
                        out.data[(i * n + j) as usize] += acc;
                    }
                }
            }
            OpKind::BroadcastTo | OpKind::Matmul => {
                return Err(EvalError::new(format!(
                    "cannot evaluate tensor-level operation '{}'",
                    operation.kind
                )));
            }
        }
        Ok(None)
    }

    fn set(&mut self, id: ValueId, value: RtValue) {
        self.env.insert(id, value);
    }

    fn get(&self, id: ValueId) -> Result<RtValue, EvalError> {
        self.env
            .get(&id)
            .cloned()
            .ok_or_else(|| EvalError::new("use of undefined value"))
    }

    fn get_index(&self, id: ValueId) -> Result<i64, EvalError> {
        match self.get(id)? {
            RtValue::Index(i) => Ok(i),
            other => Err(EvalError::new(format!("expected index, got {:?}", other))),
        }
    }

    fn get_scalar(&self, id: ValueId) -> Result<f64, EvalError> {
        match self.get(id)? {
            RtValue::Scalar(x) => Ok(x),
            other => Err(EvalError::new(format!("expected scalar, got {:?}", other))),
        }
    }

    fn get_shape(&self, id: ValueId) -> Result<Vec<i64>, EvalError> {
        match self.get(id)? {
            RtValue::Shape(s) => Ok(s),
            other => Err(EvalError::new(format!("expected shape, got {:?}", other))),
        }
    }

    fn get_buffer(&self, id: ValueId) -> Result<Rc<RefCell<BufData>>, EvalError> {
        match self.get(id)? {
            RtValue::Buffer(b) => Ok(b),
            other => Err(EvalError::new(format!("expected buffer, got {:?}", other))),
        }
    }

    fn get_indices(&self, ids: &[ValueId]) -> Result<Vec<i64>, EvalError> {
        ids.iter().map(|&v| self.get_index(v)).collect()
    }
}
