//! Deferred operations: promises plus the capability to either stage
//! compiler IR or execute eagerly.

use std::sync::{Arc, Condvar, Mutex};

use serde::{Deserialize, Serialize};

use crate::depman::DepManager;
use crate::error::{RtResult, RuntimeError};
use crate::ir::FuncBuilder;
use crate::registry::NOGUID;

/// Serialization tag identifying the concrete deferred node kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FactoryId {
    Full,
    Arange,
    Linspace,
    EwBin,
    EwUny,
    Reduce,
    Reshape,
    Service,
    Replicate,
}

/// Interface for queued operations.
///
/// `emit` stages compiler IR against the open batch function and returns
/// `Ok(true)` to decline JIT and request eager execution of `run` instead.
/// Nodes reference their inputs by guid only, never by node pointer.
pub trait Runnable: Send {
    /// Guid of the array this node produces, or [`NOGUID`].
    fn guid(&self) -> u64 {
        NOGUID
    }

    /// Eager execution path.
    fn run(&mut self) -> RtResult<()> {
        Err(RuntimeError::invariant(
            "operation has no eager execution path",
        ))
    }

    /// Stages IR for the current batch; `Ok(true)` requests eager `run`.
    fn emit(&mut self, builder: &mut FuncBuilder, dm: &mut DepManager) -> RtResult<bool> {
        let _ = (builder, dm);
        Err(RuntimeError::invariant("operation cannot stage compiler IR"))
    }

    fn factory_id(&self) -> FactoryId;
}

/// Queue message consumed by the worker.
pub(crate) enum Msg {
    Node(Box<dyn Runnable>),
    Fini,
}

struct CompletionState<T> {
    value: Mutex<Option<T>>,
    ready: Condvar,
}

/// Future for operations that resolve to a plain value rather than an array
/// (service operations).
pub struct Completion<T>(Arc<CompletionState<T>>);

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Completion(Arc::clone(&self.0))
    }
}

impl<T: Clone> Completion<T> {
    pub fn new() -> Self {
        Completion(Arc::new(CompletionState {
            value: Mutex::new(None),
            ready: Condvar::new(),
        }))
    }

    pub fn set(&self, value: T) {
        let mut guard = self.0.value.lock().expect("completion poisoned");
        *guard = Some(value);
        self.0.ready.notify_all();
    }

    pub fn wait(&self) -> T {
        let mut guard = self.0.value.lock().expect("completion poisoned");
        loop {
            if let Some(value) = guard.as_ref() {
                return value.clone();
            }
            guard = self.0.ready.wait(guard).expect("completion poisoned");
        }
    }

    pub fn try_take(&self) -> Option<T> {
        self.0
            .value
            .lock()
            .expect("completion poisoned")
            .as_ref()
            .cloned()
    }
}

impl<T: Clone> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}
