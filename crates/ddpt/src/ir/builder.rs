//! Mutable builder used by deferred nodes to stage operations into the
//! batch function.

use crate::dtype::Scalar;
use crate::error::{RtResult, RuntimeError};

use super::ops::{EwBinOpId, EwUnyOpId, OpKind, ReduceOpId};
use super::types::{ArrayType, DistArrayType, ElemType, Shape, Type};
use super::{Function, Inst, ValueId};

/// Builder over the single function of the current batch module.
pub struct FuncBuilder {
    func: Function,
}

impl FuncBuilder {
    pub fn new(name: &str) -> Self {
        FuncBuilder {
            func: Function::new(name),
        }
    }

    fn allocate_value(&mut self) -> ValueId {
        let value = ValueId(self.func.next_value);
        self.func.next_value += 1;
        value
    }

    fn push(&mut self, op: OpKind, operands: Vec<ValueId>, ty: Type) -> ValueId {
        let result = self.allocate_value();
        self.func.body.push(Inst {
            result,
            op,
            operands,
            ty,
        });
        result
    }

    /// Inserts a function argument at `index` and returns its value.
    pub fn insert_argument(&mut self, index: usize, ty: Type) -> ValueId {
        let value = self.allocate_value();
        self.func.params.insert(index, (value, ty));
        value
    }

    /// Declares one more function result type.
    pub fn push_result(&mut self, ty: Type) {
        self.func.results.push(ty);
    }

    pub fn const_index(&mut self, value: i64) -> ValueId {
        self.push(OpKind::ConstIndex(value), Vec::new(), Type::Index)
    }

    pub fn const_scalar(&mut self, value: Scalar, elem: ElemType) -> ValueId {
        self.push(
            OpKind::ConstScalar { value, elem },
            Vec::new(),
            Type::Scalar(elem),
        )
    }

    pub fn create(&mut self, shape: &[ValueId], fill: Option<ValueId>, ty: Type) -> ValueId {
        let team = match &ty {
            Type::DistArray(d) => d.team,
            _ => 0,
        };
        let mut operands = shape.to_vec();
        if let Some(fill) = fill {
            operands.push(fill);
        }
        self.push(OpKind::Create { team }, operands, ty)
    }

    pub fn linspace(
        &mut self,
        start: ValueId,
        stop: ValueId,
        num: ValueId,
        endpoint: bool,
        ty: Type,
    ) -> ValueId {
        let team = match &ty {
            Type::DistArray(d) => d.team,
            _ => 0,
        };
        self.push(
            OpKind::Linspace { endpoint, team },
            vec![start, stop, num],
            ty,
        )
    }

    pub fn ew_bin(&mut self, op: EwBinOpId, lhs: ValueId, rhs: ValueId) -> RtResult<ValueId> {
        let ty = self.array_type_of(lhs)?;
        Ok(self.push(OpKind::EwBin(op), vec![lhs, rhs], ty))
    }

    pub fn ew_uny(&mut self, op: EwUnyOpId, operand: ValueId) -> RtResult<ValueId> {
        let ty = self.array_type_of(operand)?;
        Ok(self.push(OpKind::EwUny(op), vec![operand], ty))
    }

    pub fn reduce(
        &mut self,
        op: ReduceOpId,
        operand: ValueId,
        dims: Vec<usize>,
    ) -> RtResult<ValueId> {
        let ty = reduce_type(&self.array_type_of(operand)?, dims.len());
        Ok(self.push(OpKind::Reduce { op, dims }, vec![operand], ty))
    }

    pub fn reshape(&mut self, operand: ValueId, shape: &[ValueId], ty: Type) -> ValueId {
        let mut operands = vec![operand];
        operands.extend_from_slice(shape);
        self.push(OpKind::Reshape, operands, ty)
    }

    /// Unwraps the ranked tensor from an array value; used when aggregating
    /// function results.
    pub fn extract_raw(&mut self, value: ValueId) -> RtResult<ValueId> {
        let ty = self.array_type_of(value)?;
        let (elem, rank) = match &ty {
            Type::Array(a) => (a.elem, a.shape.rank()),
            Type::DistArray(d) => (d.elem, d.owned.rank()),
            _ => unreachable!("array_type_of only returns array types"),
        };
        let raw = Type::RankedTensor {
            elem,
            shape: Shape::dynamic(rank),
        };
        Ok(self.push(OpKind::ExtractRaw, vec![value], raw))
    }

    pub fn set_return(&mut self, values: Vec<ValueId>) {
        self.func.ret = values;
    }

    pub fn type_of(&self, value: ValueId) -> Option<&Type> {
        self.func.type_of(value)
    }

    pub fn body_len(&self) -> usize {
        self.func.body.len()
    }

    pub fn finish(self) -> Function {
        self.func
    }

    fn array_type_of(&self, value: ValueId) -> RtResult<Type> {
        match self.func.type_of(value) {
            Some(ty) if ty.is_array() => Ok(ty.clone()),
            Some(ty) => Err(RuntimeError::invariant(format!(
                "value {value} has non-array type {ty}"
            ))),
            None => Err(RuntimeError::invariant(format!(
                "value {value} is not defined in the current function"
            ))),
        }
    }
}

fn reduce_type(ty: &Type, reduced: usize) -> Type {
    match ty {
        Type::Array(a) => Type::Array(ArrayType {
            elem: a.elem,
            shape: Shape::dynamic(a.shape.rank().saturating_sub(reduced)),
        }),
        Type::DistArray(d) => {
            let rank = d.global.rank().saturating_sub(reduced);
            Type::DistArray(DistArrayType {
                elem: d.elem,
                global: Shape::dynamic(rank),
                local_halo: Shape::dynamic(rank),
                owned: Shape::dynamic(rank),
                right_halo: Shape::dynamic(rank),
                offsets: if rank == 0 {
                    Shape::fixed(&[])
                } else {
                    Shape::fixed(&[rank as i64])
                },
                team: d.team,
                device: d.device.clone(),
            })
        }
        other => other.clone(),
    }
}
