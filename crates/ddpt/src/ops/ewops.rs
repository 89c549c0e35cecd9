//! Element-wise binary and unary front-ends.

use crate::deferred::{FactoryId, Runnable};
use crate::depman::DepManager;
use crate::error::RtResult;
use crate::ir::{EwBinOpId, EwUnyOpId, FuncBuilder};
use crate::runtime::Runtime;
use crate::tensor::ArrayFuture;

use super::deliver_into;

pub use crate::ir::EwBinOpId as EwBinOp;
pub use crate::ir::EwUnyOpId as EwUnyOp;

struct DeferredEwBin {
    op: EwBinOpId,
    a: u64,
    b: u64,
    out: ArrayFuture,
}

impl Runnable for DeferredEwBin {
    fn guid(&self) -> u64 {
        self.out.guid()
    }

    fn emit(&mut self, builder: &mut FuncBuilder, dm: &mut DepManager) -> RtResult<bool> {
        let lhs = dm.get_dependent(builder, self.a)?;
        let rhs = dm.get_dependent(builder, self.b)?;
        let value = builder.ew_bin(self.op, lhs, rhs)?;
        deliver_into(dm, &self.out, value)
    }

    fn factory_id(&self) -> FactoryId {
        FactoryId::EwBin
    }
}

struct DeferredEwUny {
    op: EwUnyOpId,
    a: u64,
    out: ArrayFuture,
}

impl Runnable for DeferredEwUny {
    fn guid(&self) -> u64 {
        self.out.guid()
    }

    fn emit(&mut self, builder: &mut FuncBuilder, dm: &mut DepManager) -> RtResult<bool> {
        let operand = dm.get_dependent(builder, self.a)?;
        let value = builder.ew_uny(self.op, operand)?;
        deliver_into(dm, &self.out, value)
    }

    fn factory_id(&self) -> FactoryId {
        FactoryId::EwUny
    }
}

impl Runtime {
    /// Element-wise binary operation; operands are referenced by guid.
    pub fn ew_bin(
        &self,
        op: EwBinOpId,
        a: &ArrayFuture,
        b: &ArrayFuture,
    ) -> RtResult<ArrayFuture> {
        let out = ArrayFuture::new(
            a.dtype(),
            a.rank(),
            a.device(),
            a.team(),
            a.balanced() && b.balanced(),
        );
        let node = DeferredEwBin {
            op,
            a: a.guid(),
            b: b.guid(),
            out: out.clone(),
        };
        self.defer_array(&out, Box::new(node))?;
        Ok(out)
    }

    pub fn add(&self, a: &ArrayFuture, b: &ArrayFuture) -> RtResult<ArrayFuture> {
        self.ew_bin(EwBinOpId::Add, a, b)
    }

    pub fn subtract(&self, a: &ArrayFuture, b: &ArrayFuture) -> RtResult<ArrayFuture> {
        self.ew_bin(EwBinOpId::Sub, a, b)
    }

    pub fn multiply(&self, a: &ArrayFuture, b: &ArrayFuture) -> RtResult<ArrayFuture> {
        self.ew_bin(EwBinOpId::Mul, a, b)
    }

    pub fn divide(&self, a: &ArrayFuture, b: &ArrayFuture) -> RtResult<ArrayFuture> {
        self.ew_bin(EwBinOpId::Div, a, b)
    }

    /// Element-wise unary operation.
    pub fn ew_uny(&self, op: EwUnyOpId, a: &ArrayFuture) -> RtResult<ArrayFuture> {
        let out = ArrayFuture::new(a.dtype(), a.rank(), a.device(), a.team(), a.balanced());
        let node = DeferredEwUny {
            op,
            a: a.guid(),
            out: out.clone(),
        };
        self.defer_array(&out, Box::new(node))?;
        Ok(out)
    }

    pub fn negative(&self, a: &ArrayFuture) -> RtResult<ArrayFuture> {
        self.ew_uny(EwUnyOpId::Neg, a)
    }

    pub fn abs(&self, a: &ArrayFuture) -> RtResult<ArrayFuture> {
        self.ew_uny(EwUnyOpId::Abs, a)
    }
}
