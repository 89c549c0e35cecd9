//! Manipulation front-ends.

use crate::deferred::{FactoryId, Runnable};
use crate::depman::DepManager;
use crate::error::RtResult;
use crate::ir::{array_type, FuncBuilder};
use crate::runtime::Runtime;
use crate::tensor::ArrayFuture;

use super::deliver_into;

// Reshape always produces a fresh array; views are out of scope.
struct DeferredReshape {
    a: u64,
    shape: Vec<i64>,
    out: ArrayFuture,
}

impl Runnable for DeferredReshape {
    fn guid(&self) -> u64 {
        self.out.guid()
    }

    fn emit(&mut self, builder: &mut FuncBuilder, dm: &mut DepManager) -> RtResult<bool> {
        let operand = dm.get_dependent(builder, self.a)?;
        let dims: Vec<_> = self
            .shape
            .iter()
            .map(|extent| builder.const_index(*extent))
            .collect();
        let ty = array_type(
            self.out.dtype(),
            self.shape.len(),
            self.out.team(),
            self.out.device(),
        );
        let value = builder.reshape(operand, &dims, ty);
        deliver_into(dm, &self.out, value)
    }

    fn factory_id(&self) -> FactoryId {
        FactoryId::Reshape
    }
}

impl Runtime {
    /// Reshapes `a` to the given extents.
    pub fn reshape(&self, a: &ArrayFuture, shape: &[i64]) -> RtResult<ArrayFuture> {
        let out = ArrayFuture::new(
            a.dtype(),
            shape.len(),
            a.device(),
            a.team(),
            a.balanced(),
        );
        let node = DeferredReshape {
            a: a.guid(),
            shape: shape.to_vec(),
            out: out.clone(),
        };
        self.defer_array(&out, Box::new(node))?;
        Ok(out)
    }
}
