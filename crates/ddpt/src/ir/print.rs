//! Deterministic textual form of the IR.
//!
//! The rendered text is what the lowering toolchain consumes and what the
//! engine cache hashes, so formatting must stay stable.

use std::fmt;

use crate::dtype::Scalar;

use super::ops::OpKind;
use super::types::{Dim, ElemType, Shape, Type};
use super::{Function, Inst, Module, ValueId};

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

impl fmt::Display for ElemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElemType::I1 => "i1",
            ElemType::I8 => "i8",
            ElemType::I16 => "i16",
            ElemType::I32 => "i32",
            ElemType::I64 => "i64",
            ElemType::F32 => "f32",
            ElemType::F64 => "f64",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Dyn => f.write_str("?"),
            Dim::Fixed(v) => write!(f, "{v}"),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, dim) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{dim}")?;
        }
        f.write_str("]")
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Index => f.write_str("index"),
            Type::Scalar(elem) => write!(f, "{elem}"),
            Type::RankedTensor { elem, shape } => {
                f.write_str("tensor<")?;
                for dim in &shape.0 {
                    write!(f, "{dim}x")?;
                }
                write!(f, "{elem}>")
            }
            Type::Array(a) => {
                f.write_str("ndarray<")?;
                for dim in &a.shape.0 {
                    write!(f, "{dim}x")?;
                }
                write!(f, "{}>", a.elem)
            }
            Type::DistArray(d) => {
                write!(
                    f,
                    "dist.array<{}, global = {}, lhalo = {}, owned = {}, rhalo = {}, loffs = {}, team = {}",
                    d.elem, d.global, d.local_halo, d.owned, d.right_halo, d.offsets, d.team
                )?;
                if let Some(device) = &d.device {
                    write!(f, ", device = \"{device}\"")?;
                }
                f.write_str(">")
            }
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v:?}"),
            Scalar::Bool(v) => write!(f, "{v}"),
        }
    }
}

fn operand_list(f: &mut fmt::Formatter<'_>, operands: &[ValueId]) -> fmt::Result {
    for (i, operand) in operands.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{operand}")?;
    }
    Ok(())
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = ", self.result)?;
        match &self.op {
            OpKind::ConstIndex(v) => write!(f, "arith.constant {v}")?,
            OpKind::ConstScalar { value, .. } => write!(f, "arith.constant {value}")?,
            OpKind::Create { team } => {
                f.write_str("ndarray.create(")?;
                operand_list(f, &self.operands)?;
                write!(f, ") {{team = {team}}}")?;
            }
            OpKind::Linspace { endpoint, team } => {
                f.write_str("ndarray.linspace(")?;
                operand_list(f, &self.operands)?;
                write!(f, ") {{endpoint = {endpoint}, team = {team}}}")?;
            }
            OpKind::EwBin(op) => {
                write!(f, "ndarray.ewbin {} ", op.name())?;
                operand_list(f, &self.operands)?;
            }
            OpKind::EwUny(op) => {
                write!(f, "ndarray.ewuny {} ", op.name())?;
                operand_list(f, &self.operands)?;
            }
            OpKind::Reduce { op, dims } => {
                write!(f, "ndarray.reduce {} ", op.name())?;
                operand_list(f, &self.operands)?;
                f.write_str(" dims[")?;
                for (i, dim) in dims.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{dim}")?;
                }
                f.write_str("]")?;
            }
            OpKind::Reshape => {
                f.write_str("ndarray.reshape(")?;
                operand_list(f, &self.operands)?;
                f.write_str(")")?;
            }
            OpKind::ExtractRaw => {
                f.write_str("ndarray.extract_raw ")?;
                operand_list(f, &self.operands)?;
            }
        }
        write!(f, " : {}", self.ty)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "func @{}(", self.name)?;
        for (i, (value, ty)) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}: {ty}")?;
        }
        f.write_str(") -> (")?;
        for (i, ty) in self.results.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{ty}")?;
        }
        f.write_str(") {\n")?;
        for inst in &self.body {
            writeln!(f, "  {inst}")?;
        }
        f.write_str("  return")?;
        for (i, value) in self.ret.iter().enumerate() {
            if i == 0 {
                f.write_str(" ")?;
            } else {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str("\n}")
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module @{} {{", self.name)?;
        for function in &self.functions {
            let text = function.to_string();
            for line in text.lines() {
                writeln!(f, "  {line}")?;
            }
        }
        f.write_str("}\n")
    }
}
