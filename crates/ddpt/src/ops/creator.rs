//! Array-API creation front-ends.

use crate::deferred::{FactoryId, Runnable};
use crate::depman::DepManager;
use crate::dtype::{DTypeId, Scalar};
use crate::error::RtResult;
use crate::ir::{array_type, ElemType, FuncBuilder};
use crate::runtime::Runtime;
use crate::tensor::ArrayFuture;
use crate::transceiver::mk_team;

use super::deliver_into;

struct DeferredFull {
    shape: Vec<i64>,
    value: Scalar,
    out: ArrayFuture,
}

impl Runnable for DeferredFull {
    fn guid(&self) -> u64 {
        self.out.guid()
    }

    fn emit(&mut self, builder: &mut FuncBuilder, dm: &mut DepManager) -> RtResult<bool> {
        let dims: Vec<_> = self
            .shape
            .iter()
            .map(|extent| builder.const_index(*extent))
            .collect();
        let elem = ElemType::from_dtype(self.out.dtype());
        let fill = builder.const_scalar(self.value, elem);
        let ty = array_type(
            self.out.dtype(),
            self.shape.len(),
            self.out.team(),
            self.out.device(),
        );
        let value = builder.create(&dims, Some(fill), ty);
        deliver_into(dm, &self.out, value)
    }

    fn factory_id(&self) -> FactoryId {
        FactoryId::Full
    }
}

struct DeferredArange {
    start: i64,
    end: i64,
    step: i64,
    out: ArrayFuture,
}

impl Runnable for DeferredArange {
    fn guid(&self) -> u64 {
        self.out.guid()
    }

    fn emit(&mut self, builder: &mut FuncBuilder, dm: &mut DepManager) -> RtResult<bool> {
        // Half-open range lowered onto linspace without its endpoint.
        let num = (self.end - self.start + self.step + if self.step < 0 { 1 } else { -1 })
            / self.step;
        let start = builder.const_index(self.start);
        let stop = builder.const_index(self.start + num * self.step);
        let count = builder.const_index(num);
        let ty = array_type(self.out.dtype(), 1, self.out.team(), self.out.device());
        let value = builder.linspace(start, stop, count, false, ty);
        deliver_into(dm, &self.out, value)
    }

    fn factory_id(&self) -> FactoryId {
        FactoryId::Arange
    }
}

struct DeferredLinspace {
    start: f64,
    end: f64,
    num: u64,
    endpoint: bool,
    out: ArrayFuture,
}

impl Runnable for DeferredLinspace {
    fn guid(&self) -> u64 {
        self.out.guid()
    }

    fn emit(&mut self, builder: &mut FuncBuilder, dm: &mut DepManager) -> RtResult<bool> {
        let start = builder.const_scalar(Scalar::Float(self.start), ElemType::F64);
        let stop = builder.const_scalar(Scalar::Float(self.end), ElemType::F64);
        let count = builder.const_index(self.num as i64);
        let ty = array_type(self.out.dtype(), 1, self.out.team(), self.out.device());
        let value = builder.linspace(start, stop, count, self.endpoint, ty);
        deliver_into(dm, &self.out, value)
    }

    fn factory_id(&self) -> FactoryId {
        FactoryId::Linspace
    }
}

impl Runtime {
    /// Creates an array of the given shape filled with `value`.
    pub fn full(
        &self,
        shape: &[i64],
        value: Scalar,
        dtype: DTypeId,
        team: u64,
    ) -> RtResult<ArrayFuture> {
        let out = ArrayFuture::new(dtype, shape.len(), "", mk_team(team), true);
        let node = DeferredFull {
            shape: shape.to_vec(),
            value,
            out: out.clone(),
        };
        self.defer_array(&out, Box::new(node))?;
        Ok(out)
    }

    /// Creates the half-open integer range `[start, end)` with `step`.
    pub fn arange(
        &self,
        start: i64,
        end: i64,
        step: i64,
        dtype: DTypeId,
        team: u64,
    ) -> RtResult<ArrayFuture> {
        let out = ArrayFuture::new(dtype, 1, "", mk_team(team), true);
        let node = DeferredArange {
            start,
            end,
            step,
            out: out.clone(),
        };
        self.defer_array(&out, Box::new(node))?;
        Ok(out)
    }

    /// Creates `num` evenly spaced samples over `[start, end]`.
    pub fn linspace(
        &self,
        start: f64,
        end: f64,
        num: u64,
        endpoint: bool,
        dtype: DTypeId,
        team: u64,
    ) -> RtResult<ArrayFuture> {
        let out = ArrayFuture::new(dtype, 1, "", mk_team(team), true);
        let node = DeferredLinspace {
            start,
            end,
            num,
            endpoint,
            out: out.clone(),
        };
        self.defer_array(&out, Box::new(node))?;
        Ok(out)
    }
}
