//! Type system of the array dialect.

use serde::{Deserialize, Serialize};

use crate::dtype::DTypeId;

/// Signless element type as seen by the compiler.
///
/// Unsigned dtypes lower to the integer of matching width; the signedness of
/// the original dtype is preserved out-of-band in the array handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElemType {
    I1,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl ElemType {
    pub fn from_dtype(dtype: DTypeId) -> Self {
        match dtype {
            DTypeId::F64 => ElemType::F64,
            DTypeId::F32 => ElemType::F32,
            DTypeId::I64 | DTypeId::U64 => ElemType::I64,
            DTypeId::I32 | DTypeId::U32 => ElemType::I32,
            DTypeId::I16 | DTypeId::U16 => ElemType::I16,
            DTypeId::I8 | DTypeId::U8 => ElemType::I8,
            DTypeId::Bool => ElemType::I1,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, ElemType::F32 | ElemType::F64)
    }
}

/// Single axis extent; everything the runtime stages is dynamically shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dim {
    Dyn,
    Fixed(i64),
}

/// Ordered list of axis extents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape(pub Vec<Dim>);

impl Shape {
    /// All-dynamic shape of the given rank.
    pub fn dynamic(rank: usize) -> Self {
        Shape(vec![Dim::Dyn; rank])
    }

    pub fn fixed(dims: &[i64]) -> Self {
        Shape(dims.iter().map(|d| Dim::Fixed(*d)).collect())
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }
}

/// Local array typed by its owned shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArrayType {
    pub elem: ElemType,
    pub shape: Shape,
}

/// Distributed array: global shape plus the locally held parts and the
/// per-dimension local offsets, tagged with the owning team and device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DistArrayType {
    pub elem: ElemType,
    pub global: Shape,
    pub local_halo: Shape,
    pub owned: Shape,
    pub right_halo: Shape,
    pub offsets: Shape,
    pub team: u64,
    pub device: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Index,
    Scalar(ElemType),
    RankedTensor { elem: ElemType, shape: Shape },
    Array(ArrayType),
    DistArray(DistArrayType),
}

impl Type {
    pub fn elem(&self) -> Option<ElemType> {
        match self {
            Type::Index => None,
            Type::Scalar(elem) => Some(*elem),
            Type::RankedTensor { elem, .. } => Some(*elem),
            Type::Array(a) => Some(a.elem),
            Type::DistArray(d) => Some(d.elem),
        }
    }

    pub fn rank(&self) -> Option<usize> {
        match self {
            Type::Index | Type::Scalar(_) => None,
            Type::RankedTensor { shape, .. } => Some(shape.rank()),
            Type::Array(a) => Some(a.shape.rank()),
            Type::DistArray(d) => Some(d.global.rank()),
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(_) | Type::DistArray(_))
    }

    pub fn is_distributed(&self) -> bool {
        matches!(self, Type::DistArray(_))
    }
}

/// Synthesises the function-argument type for an array handle.
///
/// Non-distributed handles become local arrays typed by the owned shape;
/// distributed handles carry the full shape environment. Rank-0 distributed
/// handles degrade to a 0-rank distributed scalar.
pub fn array_type(dtype: DTypeId, rank: usize, team: u64, device: &str) -> Type {
    let elem = ElemType::from_dtype(dtype);
    if team == 0 {
        return Type::Array(ArrayType {
            elem,
            shape: Shape::dynamic(rank),
        });
    }
    let device = if device.is_empty() {
        None
    } else {
        Some(device.to_string())
    };
    Type::DistArray(DistArrayType {
        elem,
        global: Shape::dynamic(rank),
        local_halo: Shape::dynamic(rank),
        owned: Shape::dynamic(rank),
        right_halo: Shape::dynamic(rank),
        offsets: if rank == 0 {
            Shape::fixed(&[])
        } else {
            Shape::fixed(&[rank as i64])
        },
        team,
        device,
    })
}
