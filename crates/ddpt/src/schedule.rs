//! Worker loop draining the deferred queue in batches.

use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::{Arc, Mutex};

use smallvec::SmallVec;

use crate::deferred::{Msg, Runnable};
use crate::depman::DepManager;
use crate::env;
use crate::error::RtResult;
use crate::ir::{FuncBuilder, Module, JIT_FN};
use crate::registry::Registry;
use crate::tensor::NdArray;

/// Flat memref descriptor words for one function input, pinned together with
/// the array that backs the pointers inside them.
pub struct InputBuffer {
    words: SmallVec<[isize; 16]>,
    _array: Arc<NdArray>,
}

impl InputBuffer {
    pub(crate) fn new(words: Vec<isize>, array: Arc<NdArray>) -> Self {
        InputBuffer {
            words: SmallVec::from_vec(words),
            _array: array,
        }
    }

    pub fn words(&self) -> &[isize] {
        &self.words
    }

    /// First word of the descriptor; what the packed ABI passes per input.
    pub fn as_ptr(&self) -> *const isize {
        self.words.as_ptr()
    }
}

/// Contract between the scheduler and a JIT engine.
///
/// `run` lowers and compiles `module` (with whatever caching the engine
/// keeps), invokes `fname` exactly once against the packed inputs, and fills
/// `out` with the returned descriptor words. The worker owns the single
/// runner instance; compiled state lives for the process.
pub trait JitRunner: Send {
    fn run(
        &mut self,
        module: &Module,
        fname: &str,
        inputs: &[InputBuffer],
        out: &mut [isize],
    ) -> RtResult<()>;
}

/// One batch in flight: the open function plus its dependency state.
struct Batch {
    builder: FuncBuilder,
    dm: DepManager,
    emitted: usize,
}

impl Batch {
    fn new(registry: Arc<Registry>) -> Self {
        Batch {
            builder: FuncBuilder::new(JIT_FN),
            dm: DepManager::new(registry),
            emitted: 0,
        }
    }
}

/// Compiles, invokes and delivers everything staged in `batch`.
fn flush<R: JitRunner>(mut batch: Batch, runner: &mut R) -> RtResult<()> {
    let inputs = batch.dm.store_inputs();
    let total = batch.dm.handle_result(&mut batch.builder)? as usize;
    let function = batch.builder.finish();
    let empty = function.body.is_empty() && inputs.is_empty() && total == 0;
    let module = Module::with_function(function);
    let mut out = vec![0isize; total];
    if !empty {
        runner.run(&module, JIT_FN, &inputs, &mut out)?;
    }
    batch.dm.deliver(&out)
}

/// Drains the deferred queue until shutdown.
///
/// Batch boundaries are queue quiescence, a node declining JIT (it runs
/// eagerly after the staged prefix is flushed), or shutdown. Per-batch
/// failures are reported and the batch is abandoned; the registry survives.
pub(crate) fn process_promises<R: JitRunner>(
    rx: Receiver<Msg>,
    registry: Arc<Registry>,
    errors: Arc<Mutex<Vec<crate::error::RuntimeError>>>,
    mut runner: R,
) {
    let report = |err: crate::error::RuntimeError| {
        eprintln!("[ddpt] batch failed: {err}");
        errors.lock().expect("error log poisoned").push(err);
    };

    'worker: loop {
        let first = match rx.recv() {
            Ok(msg) => msg,
            Err(_) => break,
        };
        let mut pending = Some(first);
        let mut batch = Batch::new(Arc::clone(&registry));
        let mut eager: Option<Box<dyn Runnable>> = None;
        let mut shutdown = false;

        loop {
            let msg = match pending.take() {
                Some(msg) => msg,
                None => match rx.try_recv() {
                    Ok(msg) => msg,
                    // Quiescence closes the batch.
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        shutdown = true;
                        break;
                    }
                },
            };
            match msg {
                Msg::Fini => {
                    shutdown = true;
                    break;
                }
                Msg::Node(mut node) => match node.emit(&mut batch.builder, &mut batch.dm) {
                    Ok(false) => batch.emitted += 1,
                    Ok(true) => {
                        eager = Some(node);
                        break;
                    }
                    Err(err) => {
                        report(err);
                        // Abandon the batch; keep draining from a fresh one.
                        continue 'worker;
                    }
                },
            }
        }

        if env::verbose_level() >= 1 && (batch.emitted > 0 || eager.is_some()) {
            eprintln!(
                "[ddpt] flushing batch: {} nodes staged, eager follow-up: {}",
                batch.emitted,
                eager.is_some()
            );
        }
        if batch.emitted > 0 {
            if let Err(err) = flush(batch, &mut runner) {
                report(err);
            }
        }
        if let Some(mut node) = eager {
            if let Err(err) = node.run() {
                report(err);
            }
        }
        if shutdown {
            break;
        }
    }
}
