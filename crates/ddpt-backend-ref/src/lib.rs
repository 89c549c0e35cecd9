//! Reference backend: interprets batch modules in-process.
//!
//! Implements the scheduler's [`JitRunner`] contract without any native
//! toolchain, writing real memref descriptors into the output buffer so the
//! delivery path is exercised end to end. Host arrays only; distributed
//! types are rejected.

use std::collections::HashMap;

use ddpt::depman::memref_words;
use ddpt::dtype::Scalar;
use ddpt::error::{RtResult, RuntimeError};
use ddpt::ir::{ElemType, EwBinOpId, EwUnyOpId, Function, Inst, Module, OpKind, ReduceOpId, Type, ValueId};
use ddpt::schedule::{InputBuffer, JitRunner};
use ddpt::tensor::{contiguous_strides, HostBuffer};

#[derive(Clone)]
struct HostArray {
    dims: Vec<usize>,
    buf: HostBuffer,
}

#[derive(Clone)]
enum Value {
    Index(i64),
    Scalar(Scalar),
    Arr(HostArray),
}

/// In-process interpreter with the `JitRunner` calling convention.
///
/// Result buffers stay pinned inside the backend until the next run so the
/// descriptors written into the output buffer remain readable during
/// delivery.
pub struct RefBackend {
    retained: Vec<HostArray>,
}

impl RefBackend {
    pub fn new() -> Self {
        RefBackend {
            retained: Vec::new(),
        }
    }
}

impl Default for RefBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl JitRunner for RefBackend {
    fn run(
        &mut self,
        module: &Module,
        fname: &str,
        inputs: &[InputBuffer],
        out: &mut [isize],
    ) -> RtResult<()> {
        self.retained.clear();
        let function = module.function(fname).ok_or_else(|| {
            RuntimeError::LookupFailure {
                symbol: format!("_mlir_ciface_{fname}"),
            }
        })?;
        if function.params.len() != inputs.len() {
            return Err(RuntimeError::invariant(format!(
                "entry input arity mismatch: expected {}, got {}",
                function.params.len(),
                inputs.len()
            )));
        }

        let mut env: HashMap<ValueId, Value> = HashMap::new();
        for ((value, ty), buffer) in function.params.iter().zip(inputs) {
            env.insert(*value, Value::Arr(decode_input(ty, buffer.words())?));
        }
        for inst in &function.body {
            let value = eval(inst, &env)?;
            env.insert(inst.result, value);
        }
        write_results(function, &env, &mut self.retained, out)
    }
}

fn write_results(
    function: &Function,
    env: &HashMap<ValueId, Value>,
    retained: &mut Vec<HostArray>,
    out: &mut [isize],
) -> RtResult<()> {
    let mut pos = 0usize;
    for ret in &function.ret {
        let array = match env.get(ret) {
            Some(Value::Arr(array)) => array.clone(),
            _ => {
                return Err(RuntimeError::invariant(format!(
                    "return value {ret} is not an array"
                )))
            }
        };
        let rank = array.dims.len();
        let words = memref_words(rank);
        if pos + words > out.len() {
            return Err(RuntimeError::invariant(
                "output buffer too small for results",
            ));
        }
        retained.push(array);
        let pinned = retained.last().expect("just pushed");
        let ptr = pinned.buf.as_ptr() as isize;
        out[pos] = ptr;
        out[pos + 1] = ptr;
        out[pos + 2] = 0;
        for (i, dim) in pinned.dims.iter().enumerate() {
            out[pos + 3 + i] = *dim as isize;
        }
        let strides = contiguous_strides(&pinned.dims);
        for (i, stride) in strides.iter().enumerate() {
            out[pos + 3 + rank + i] = *stride;
        }
        pos += words;
    }
    Ok(())
}

fn decode_input(ty: &Type, words: &[isize]) -> RtResult<HostArray> {
    let (elem, rank) = match ty {
        Type::Array(a) => (a.elem, a.shape.rank()),
        Type::DistArray(_) => {
            return Err(RuntimeError::compile_failure(
                "reference backend is host-only; distributed inputs are unsupported",
            ))
        }
        other => {
            return Err(RuntimeError::invariant(format!(
                "function input has non-array type {other}"
            )))
        }
    };
    if words.len() != memref_words(rank) {
        return Err(RuntimeError::invariant(format!(
            "input descriptor has {} words, rank {rank} needs {}",
            words.len(),
            memref_words(rank)
        )));
    }
    let dims: Vec<usize> = words[3..3 + rank].iter().map(|w| *w as usize).collect();
    let strides = &words[3 + rank..];
    let expected = contiguous_strides(&dims);
    if !strides.iter().copied().eq(expected.iter().copied()) {
        return Err(RuntimeError::invariant(
            "reference backend requires row-major contiguous inputs",
        ));
    }
    let len: usize = dims.iter().product();
    // SAFETY: the descriptor was flattened from a live host array whose
    // buffer stays pinned in the scheduler's input list for this call.
    let buf = unsafe { HostBuffer::copy_from_raw(elem, words[1] as *const u8, words[2], len) };
    Ok(HostArray { dims, buf })
}

fn operand_value<'a>(
    inst: &Inst,
    env: &'a HashMap<ValueId, Value>,
    idx: usize,
) -> RtResult<&'a Value> {
    inst.operands
        .get(idx)
        .and_then(|id| env.get(id))
        .ok_or_else(|| RuntimeError::invariant(format!("missing operand {idx} of {}", inst.result)))
}

fn eval(inst: &Inst, env: &HashMap<ValueId, Value>) -> RtResult<Value> {
    let operand = |idx: usize| operand_value(inst, env, idx);
    match &inst.op {
        OpKind::ConstIndex(v) => Ok(Value::Index(*v)),
        OpKind::ConstScalar { value, .. } => Ok(Value::Scalar(*value)),
        OpKind::Create { .. } => {
            let (elem, rank) = array_parts(&inst.ty)?;
            let mut dims = Vec::with_capacity(rank);
            for idx in 0..rank {
                dims.push(as_index(operand(idx)?)? as usize);
            }
            let len: usize = dims.iter().product();
            let buf = if inst.operands.len() > rank {
                let fill = as_scalar(operand(rank)?)?;
                buffer_from_f64(elem, std::iter::repeat(fill.as_f64()).take(len))
            } else {
                HostBuffer::zeros(elem, len)
            };
            Ok(Value::Arr(HostArray { dims, buf }))
        }
        OpKind::Linspace { endpoint, .. } => {
            let start = as_f64(operand(0)?)?;
            let stop = as_f64(operand(1)?)?;
            let num = as_index(operand(2)?)? as usize;
            let (elem, _) = array_parts(&inst.ty)?;
            let denom = if *endpoint {
                (num.max(2) - 1) as f64
            } else {
                num.max(1) as f64
            };
            let step = (stop - start) / denom;
            let buf = buffer_from_f64(elem, (0..num).map(|i| start + i as f64 * step));
            Ok(Value::Arr(HostArray {
                dims: vec![num],
                buf,
            }))
        }
        OpKind::EwBin(op) => {
            let lhs = as_array(operand(0)?)?;
            let rhs = as_array(operand(1)?)?;
            if lhs.dims != rhs.dims {
                return Err(RuntimeError::invariant(
                    "element-wise operands have mismatched shapes",
                ));
            }
            Ok(Value::Arr(HostArray {
                dims: lhs.dims.clone(),
                buf: ew_binary(*op, &lhs.buf, &rhs.buf)?,
            }))
        }
        OpKind::EwUny(op) => {
            let a = as_array(operand(0)?)?;
            Ok(Value::Arr(HostArray {
                dims: a.dims.clone(),
                buf: ew_unary(*op, &a.buf)?,
            }))
        }
        OpKind::Reduce { op, dims } => {
            let a = as_array(operand(0)?)?;
            if dims.len() != a.dims.len() {
                return Err(RuntimeError::compile_failure(
                    "reference backend only reduces over every dimension",
                ));
            }
            Ok(Value::Arr(HostArray {
                dims: Vec::new(),
                buf: reduce_all(*op, &a.buf)?,
            }))
        }
        OpKind::Reshape => {
            let a = as_array(operand(0)?)?;
            let mut dims = Vec::with_capacity(inst.operands.len() - 1);
            for idx in 1..inst.operands.len() {
                dims.push(as_index(operand(idx)?)? as usize);
            }
            let len: usize = dims.iter().product();
            if len != a.buf.len() {
                return Err(RuntimeError::invariant(format!(
                    "reshape to {:?} does not preserve {} elements",
                    dims,
                    a.buf.len()
                )));
            }
            Ok(Value::Arr(HostArray {
                dims,
                buf: a.buf.clone(),
            }))
        }
        OpKind::ExtractRaw => Ok(Value::Arr(as_array(operand(0)?)?.clone())),
    }
}

fn array_parts(ty: &Type) -> RtResult<(ElemType, usize)> {
    match ty {
        Type::Array(a) => Ok((a.elem, a.shape.rank())),
        Type::DistArray(_) => Err(RuntimeError::compile_failure(
            "reference backend is host-only; distributed results are unsupported",
        )),
        other => Err(RuntimeError::invariant(format!(
            "expected an array type, found {other}"
        ))),
    }
}

fn as_array(value: &Value) -> RtResult<&HostArray> {
    match value {
        Value::Arr(array) => Ok(array),
        _ => Err(RuntimeError::invariant("expected an array value")),
    }
}

fn as_index(value: &Value) -> RtResult<i64> {
    match value {
        Value::Index(v) => Ok(*v),
        _ => Err(RuntimeError::invariant("expected an index value")),
    }
}

fn as_scalar(value: &Value) -> RtResult<Scalar> {
    match value {
        Value::Scalar(v) => Ok(*v),
        _ => Err(RuntimeError::invariant("expected a scalar value")),
    }
}

fn as_f64(value: &Value) -> RtResult<f64> {
    match value {
        Value::Index(v) => Ok(*v as f64),
        Value::Scalar(v) => Ok(v.as_f64()),
        Value::Arr(_) => Err(RuntimeError::invariant("expected a scalar operand")),
    }
}

fn buffer_from_f64(elem: ElemType, values: impl Iterator<Item = f64>) -> HostBuffer {
    match elem {
        ElemType::I1 => HostBuffer::Bool(values.map(|v| v != 0.0).collect()),
        ElemType::I8 => HostBuffer::I8(values.map(|v| v as i8).collect()),
        ElemType::I16 => HostBuffer::I16(values.map(|v| v as i16).collect()),
        ElemType::I32 => HostBuffer::I32(values.map(|v| v as i32).collect()),
        ElemType::I64 => HostBuffer::I64(values.map(|v| v as i64).collect()),
        ElemType::F32 => HostBuffer::F32(values.map(|v| v as f32).collect()),
        ElemType::F64 => HostBuffer::F64(values.collect()),
    }
}

fn zip_int<T>(op: EwBinOpId, x: &[T], y: &[T]) -> RtResult<Vec<T>>
where
    T: Copy
        + PartialEq
        + Default
        + std::ops::Add<Output = T>
        + std::ops::Sub<Output = T>
        + std::ops::Mul<Output = T>
        + std::ops::Div<Output = T>,
{
    let zero = T::default();
    x.iter()
        .zip(y.iter())
        .map(|(a, b)| match op {
            EwBinOpId::Add => Ok(*a + *b),
            EwBinOpId::Sub => Ok(*a - *b),
            EwBinOpId::Mul => Ok(*a * *b),
            EwBinOpId::Div => {
                if *b == zero {
                    Err(RuntimeError::invariant("integer division by zero"))
                } else {
                    Ok(*a / *b)
                }
            }
        })
        .collect()
}

fn zip_float<T>(op: EwBinOpId, x: &[T], y: &[T]) -> Vec<T>
where
    T: Copy
        + std::ops::Add<Output = T>
        + std::ops::Sub<Output = T>
        + std::ops::Mul<Output = T>
        + std::ops::Div<Output = T>,
{
    x.iter()
        .zip(y.iter())
        .map(|(a, b)| match op {
            EwBinOpId::Add => *a + *b,
            EwBinOpId::Sub => *a - *b,
            EwBinOpId::Mul => *a * *b,
            EwBinOpId::Div => *a / *b,
        })
        .collect()
}

fn ew_binary(op: EwBinOpId, a: &HostBuffer, b: &HostBuffer) -> RtResult<HostBuffer> {
    use HostBuffer::*;
    match (a, b) {
        (I8(x), I8(y)) => Ok(I8(zip_int(op, x, y)?)),
        (I16(x), I16(y)) => Ok(I16(zip_int(op, x, y)?)),
        (I32(x), I32(y)) => Ok(I32(zip_int(op, x, y)?)),
        (I64(x), I64(y)) => Ok(I64(zip_int(op, x, y)?)),
        (F32(x), F32(y)) => Ok(F32(zip_float(op, x, y))),
        (F64(x), F64(y)) => Ok(F64(zip_float(op, x, y))),
        _ => Err(RuntimeError::invariant(
            "element-wise operands have mismatched element types",
        )),
    }
}

fn ew_unary(op: EwUnyOpId, a: &HostBuffer) -> RtResult<HostBuffer> {
    use HostBuffer::*;
    macro_rules! map_buf {
        ($x:expr, $ctor:ident, $f:expr) => {
            Ok($ctor($x.iter().map(|v| $f(*v)).collect()))
        };
    }
    match (op, a) {
        (EwUnyOpId::Neg, I8(x)) => map_buf!(x, I8, |v: i8| v.wrapping_neg()),
        (EwUnyOpId::Neg, I16(x)) => map_buf!(x, I16, |v: i16| v.wrapping_neg()),
        (EwUnyOpId::Neg, I32(x)) => map_buf!(x, I32, |v: i32| v.wrapping_neg()),
        (EwUnyOpId::Neg, I64(x)) => map_buf!(x, I64, |v: i64| v.wrapping_neg()),
        (EwUnyOpId::Neg, F32(x)) => map_buf!(x, F32, |v: f32| -v),
        (EwUnyOpId::Neg, F64(x)) => map_buf!(x, F64, |v: f64| -v),
        (EwUnyOpId::Abs, I8(x)) => map_buf!(x, I8, |v: i8| v.wrapping_abs()),
        (EwUnyOpId::Abs, I16(x)) => map_buf!(x, I16, |v: i16| v.wrapping_abs()),
        (EwUnyOpId::Abs, I32(x)) => map_buf!(x, I32, |v: i32| v.wrapping_abs()),
        (EwUnyOpId::Abs, I64(x)) => map_buf!(x, I64, |v: i64| v.wrapping_abs()),
        (EwUnyOpId::Abs, F32(x)) => map_buf!(x, F32, |v: f32| v.abs()),
        (EwUnyOpId::Abs, F64(x)) => map_buf!(x, F64, |v: f64| v.abs()),
        _ => Err(RuntimeError::invariant(
            "unary operation unsupported for this element type",
        )),
    }
}

fn reduce_all(op: ReduceOpId, a: &HostBuffer) -> RtResult<HostBuffer> {
    use HostBuffer::*;
    macro_rules! fold_buf {
        ($x:expr, $ctor:ident, $init:expr, $f:expr) => {
            Ok($ctor(vec![$x.iter().fold($init, $f)]))
        };
    }
    match (op, a) {
        (ReduceOpId::Sum, I8(x)) => fold_buf!(x, I8, 0i8, |acc, v| acc.wrapping_add(*v)),
        (ReduceOpId::Sum, I16(x)) => fold_buf!(x, I16, 0i16, |acc, v| acc.wrapping_add(*v)),
        (ReduceOpId::Sum, I32(x)) => fold_buf!(x, I32, 0i32, |acc, v| acc.wrapping_add(*v)),
        (ReduceOpId::Sum, I64(x)) => fold_buf!(x, I64, 0i64, |acc, v| acc.wrapping_add(*v)),
        (ReduceOpId::Sum, F32(x)) => fold_buf!(x, F32, 0.0f32, |acc, v| acc + *v),
        (ReduceOpId::Sum, F64(x)) => fold_buf!(x, F64, 0.0f64, |acc, v| acc + *v),
        (ReduceOpId::Prod, I8(x)) => fold_buf!(x, I8, 1i8, |acc, v| acc.wrapping_mul(*v)),
        (ReduceOpId::Prod, I16(x)) => fold_buf!(x, I16, 1i16, |acc, v| acc.wrapping_mul(*v)),
        (ReduceOpId::Prod, I32(x)) => fold_buf!(x, I32, 1i32, |acc, v| acc.wrapping_mul(*v)),
        (ReduceOpId::Prod, I64(x)) => fold_buf!(x, I64, 1i64, |acc, v| acc.wrapping_mul(*v)),
        (ReduceOpId::Prod, F32(x)) => fold_buf!(x, F32, 1.0f32, |acc, v| acc * *v),
        (ReduceOpId::Prod, F64(x)) => fold_buf!(x, F64, 1.0f64, |acc, v| acc * *v),
        _ => Err(RuntimeError::invariant(
            "reduction unsupported for this element type",
        )),
    }
}
