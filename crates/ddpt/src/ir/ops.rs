//! Operation set of the array dialect.

use serde::{Deserialize, Serialize};

use crate::dtype::Scalar;

use super::types::ElemType;

/// Element-wise binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EwBinOpId {
    Add,
    Sub,
    Mul,
    Div,
}

impl EwBinOpId {
    pub fn name(self) -> &'static str {
        match self {
            EwBinOpId::Add => "add",
            EwBinOpId::Sub => "sub",
            EwBinOpId::Mul => "mul",
            EwBinOpId::Div => "div",
        }
    }
}

/// Element-wise unary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EwUnyOpId {
    Neg,
    Abs,
}

impl EwUnyOpId {
    pub fn name(self) -> &'static str {
        match self {
            EwUnyOpId::Neg => "neg",
            EwUnyOpId::Abs => "abs",
        }
    }
}

/// Reduction operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReduceOpId {
    Sum,
    Prod,
}

impl ReduceOpId {
    pub fn name(self) -> &'static str {
        match self {
            ReduceOpId::Sum => "sum",
            ReduceOpId::Prod => "prod",
        }
    }
}

/// Staged operation kinds.
///
/// Creation ops carry the team as an attribute; shape extents, fill values
/// and linspace bounds arrive as constant operands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpKind {
    ConstIndex(i64),
    ConstScalar { value: Scalar, elem: ElemType },
    /// Operands: shape extents, then an optional fill value.
    Create { team: u64 },
    /// Operands: start, stop, num.
    Linspace { endpoint: bool, team: u64 },
    EwBin(EwBinOpId),
    EwUny(EwUnyOpId),
    Reduce { op: ReduceOpId, dims: Vec<usize> },
    /// Operands: input, then the new shape extents.
    Reshape,
    /// Unwraps the plain ranked tensor from an array value for returning.
    ExtractRaw,
}
