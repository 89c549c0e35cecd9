//! Enumerates the array element types supported by the runtime.

use serde::{Deserialize, Serialize};

use crate::error::{RtResult, RuntimeError};

/// Logical dtype identifier carried by array handles and deferred nodes.
///
/// Signedness lives only in this tag; the compiler IR sees signless integers
/// of the matching width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DTypeId {
    F64,
    F32,
    I64,
    U64,
    I32,
    U32,
    I16,
    U16,
    I8,
    U8,
    Bool,
}

impl DTypeId {
    /// Returns the number of bytes required per scalar element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DTypeId::F64 | DTypeId::I64 | DTypeId::U64 => 8,
            DTypeId::F32 | DTypeId::I32 | DTypeId::U32 => 4,
            DTypeId::I16 | DTypeId::U16 => 2,
            DTypeId::I8 | DTypeId::U8 | DTypeId::Bool => 1,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DTypeId::F64 | DTypeId::F32)
    }

    pub fn is_unsigned(self) -> bool {
        matches!(self, DTypeId::U64 | DTypeId::U32 | DTypeId::U16 | DTypeId::U8)
    }

    /// Produces a stable tag used for worker serialization.
    pub fn tag(self) -> u32 {
        match self {
            DTypeId::F64 => 0,
            DTypeId::F32 => 1,
            DTypeId::I64 => 2,
            DTypeId::U64 => 3,
            DTypeId::I32 => 4,
            DTypeId::U32 => 5,
            DTypeId::I16 => 6,
            DTypeId::U16 => 7,
            DTypeId::I8 => 8,
            DTypeId::U8 => 9,
            DTypeId::Bool => 10,
        }
    }

    /// Reconstructs a dtype from its serialized tag.
    pub fn from_tag(tag: u32) -> RtResult<Self> {
        Ok(match tag {
            0 => DTypeId::F64,
            1 => DTypeId::F32,
            2 => DTypeId::I64,
            3 => DTypeId::U64,
            4 => DTypeId::I32,
            5 => DTypeId::U32,
            6 => DTypeId::I16,
            7 => DTypeId::U16,
            8 => DTypeId::I8,
            9 => DTypeId::U8,
            10 => DTypeId::Bool,
            _ => return Err(RuntimeError::UnknownDtype { tag }),
        })
    }
}

/// Scalar literal accepted by creation front-ends (e.g. `full`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::Int(v) => v as f64,
            Scalar::Float(v) => v,
            Scalar::Bool(v) => {
                if v {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Scalar::Int(v) => v,
            Scalar::Float(v) => v as i64,
            Scalar::Bool(v) => i64::from(v),
        }
    }
}
