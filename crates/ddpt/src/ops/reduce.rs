//! Reduction front-ends.

use crate::deferred::{FactoryId, Runnable};
use crate::depman::DepManager;
use crate::error::RtResult;
use crate::ir::{FuncBuilder, ReduceOpId};
use crate::runtime::Runtime;
use crate::tensor::ArrayFuture;

use super::deliver_into;

pub use crate::ir::ReduceOpId as ReduceOp;

struct DeferredReduce {
    op: ReduceOpId,
    a: u64,
    dims: Vec<usize>,
    out: ArrayFuture,
}

impl Runnable for DeferredReduce {
    fn guid(&self) -> u64 {
        self.out.guid()
    }

    fn emit(&mut self, builder: &mut FuncBuilder, dm: &mut DepManager) -> RtResult<bool> {
        let operand = dm.get_dependent(builder, self.a)?;
        let value = builder.reduce(self.op, operand, self.dims.clone())?;
        deliver_into(dm, &self.out, value)
    }

    fn factory_id(&self) -> FactoryId {
        FactoryId::Reduce
    }
}

impl Runtime {
    /// Reduces `a` over the given dimensions.
    pub fn reduce(
        &self,
        op: ReduceOpId,
        a: &ArrayFuture,
        dims: &[usize],
    ) -> RtResult<ArrayFuture> {
        let rank = a.rank().saturating_sub(dims.len());
        let out = ArrayFuture::new(a.dtype(), rank, a.device(), a.team(), a.balanced());
        let node = DeferredReduce {
            op,
            a: a.guid(),
            dims: dims.to_vec(),
            out: out.clone(),
        };
        self.defer_array(&out, Box::new(node))?;
        Ok(out)
    }

    /// Reduces over every dimension, yielding a 0-rank array.
    pub fn sum(&self, a: &ArrayFuture) -> RtResult<ArrayFuture> {
        let dims: Vec<usize> = (0..a.rank()).collect();
        self.reduce(ReduceOpId::Sum, a, &dims)
    }

    pub fn prod(&self, a: &ArrayFuture) -> RtResult<ArrayFuture> {
        let dims: Vec<usize> = (0..a.rank()).collect();
        self.reduce(ReduceOpId::Prod, a, &dims)
    }
}
