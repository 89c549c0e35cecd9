//! Service operations: dropping handles, flushing the queue, replication.

use std::sync::Arc;

use crate::deferred::{Completion, FactoryId, Runnable};
use crate::depman::DepManager;
use crate::error::{RtResult, RuntimeError};
use crate::ir::FuncBuilder;
use crate::registry::Registry;
use crate::runtime::Runtime;
use crate::tensor::ArrayFuture;

enum ServiceOp {
    Drop,
    Run,
}

struct DeferredService {
    op: ServiceOp,
    guid: u64,
    done: Completion<bool>,
}

impl Runnable for DeferredService {
    fn run(&mut self) -> RtResult<()> {
        match self.op {
            ServiceOp::Run => {
                self.done.set(true);
                Ok(())
            }
            ServiceOp::Drop => Err(RuntimeError::invariant(
                "drop has no eager execution path",
            )),
        }
    }

    fn emit(&mut self, _builder: &mut FuncBuilder, dm: &mut DepManager) -> RtResult<bool> {
        match self.op {
            ServiceOp::Drop => {
                dm.drop(self.guid)?;
                self.done.set(true);
                Ok(false)
            }
            // RUN declines JIT so the scheduler flushes the staged prefix.
            ServiceOp::Run => Ok(true),
        }
    }

    fn factory_id(&self) -> FactoryId {
        FactoryId::Service
    }
}

struct DeferredReplicate {
    a: u64,
    registry: Arc<Registry>,
    out: ArrayFuture,
}

impl Runnable for DeferredReplicate {
    fn guid(&self) -> u64 {
        self.out.guid()
    }

    fn run(&mut self) -> RtResult<()> {
        let source = self.registry.get(self.a)?;
        self.out.set_value(source.get());
        Ok(())
    }

    fn emit(&mut self, _builder: &mut FuncBuilder, _dm: &mut DepManager) -> RtResult<bool> {
        Ok(true)
    }

    fn factory_id(&self) -> FactoryId {
        FactoryId::Replicate
    }
}

impl Runtime {
    /// Releases an array handle: the next batch forgets its value, callbacks
    /// and registry entry.
    pub fn drop_array(&self, a: &ArrayFuture) -> RtResult<Completion<bool>> {
        let done = Completion::new();
        let node = DeferredService {
            op: ServiceOp::Drop,
            guid: a.guid(),
            done: done.clone(),
        };
        self.push(Box::new(node))?;
        Ok(done)
    }

    /// Forces the worker to flush everything staged so far.
    pub fn flush(&self) -> RtResult<Completion<bool>> {
        let done = Completion::new();
        let node = DeferredService {
            op: ServiceOp::Run,
            guid: crate::registry::NOGUID,
            done: done.clone(),
        };
        self.push(Box::new(node))?;
        Ok(done)
    }

    /// Replicates an array onto every rank of its team. With a single rank
    /// this hands back the source value.
    pub fn replicate(&self, a: &ArrayFuture) -> RtResult<ArrayFuture> {
        let out = ArrayFuture::new(a.dtype(), a.rank(), a.device(), a.team(), a.balanced());
        let node = DeferredReplicate {
            a: a.guid(),
            registry: Arc::clone(self.registry()),
            out: out.clone(),
        };
        self.defer_array(&out, Box::new(node))?;
        Ok(out)
    }
}
