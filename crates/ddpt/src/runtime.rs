//! Runtime facade owning the registry, the deferred queue and the worker.

use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::deferred::{Msg, Runnable};
use crate::error::{RtResult, RuntimeError};
use crate::registry::Registry;
use crate::schedule::{process_promises, JitRunner};
use crate::tensor::{ArrayFuture, NdArray};

/// Process-wide runtime state behind `init`/`fini`.
///
/// Front-ends enqueue deferred nodes from any thread; the single worker
/// thread owns the queue, the registry mutations and the JIT engine.
pub struct Runtime {
    registry: Arc<Registry>,
    sender: Mutex<Option<Sender<Msg>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    errors: Arc<Mutex<Vec<RuntimeError>>>,
}

impl Runtime {
    /// Spawns the worker thread around the given JIT engine.
    pub fn init<R: JitRunner + 'static>(runner: R) -> Self {
        let registry = Arc::new(Registry::new());
        let errors = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = channel();
        let worker_registry = Arc::clone(&registry);
        let worker_errors = Arc::clone(&errors);
        let worker = std::thread::Builder::new()
            .name("ddpt-worker".to_string())
            .spawn(move || process_promises(rx, worker_registry, worker_errors, runner))
            .expect("failed to spawn ddpt worker");
        Runtime {
            registry,
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            errors,
        }
    }

    /// Flushes the queue and joins the worker. Idempotent.
    pub fn fini(&self) {
        if let Some(sender) = self.sender.lock().expect("runtime poisoned").take() {
            let _ = sender.send(Msg::Fini);
        }
        if let Some(worker) = self.worker.lock().expect("runtime poisoned").take() {
            let _ = worker.join();
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Batch failures reported by the worker since the last call.
    pub fn drain_errors(&self) -> Vec<RuntimeError> {
        std::mem::take(&mut *self.errors.lock().expect("runtime poisoned"))
    }

    pub(crate) fn push(&self, node: Box<dyn Runnable>) -> RtResult<()> {
        let guard = self.sender.lock().expect("runtime poisoned");
        let sender = guard
            .as_ref()
            .ok_or_else(|| RuntimeError::invariant("runtime already finalized"))?;
        sender
            .send(Msg::Node(node))
            .map_err(|_| RuntimeError::invariant("worker thread is gone"))
    }

    /// Registers the future of an array-producing node and enqueues the node.
    pub(crate) fn defer_array(
        &self,
        future: &ArrayFuture,
        node: Box<dyn Runnable>,
    ) -> RtResult<()> {
        self.registry.put(future)?;
        self.push(node)
    }

    /// Adopts an externally materialised array into the registry, so later
    /// batches can import it as a function argument.
    pub fn import(
        &self,
        array: NdArray,
        device: &str,
        team: u64,
    ) -> RtResult<ArrayFuture> {
        let future = ArrayFuture::new(
            array.dtype(),
            array.dims().len(),
            device,
            team,
            array.balanced(),
        );
        self.registry.put(&future)?;
        future.set_value(Arc::new(array));
        Ok(future)
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.fini();
    }
}
