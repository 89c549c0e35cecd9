//! Per-batch dependency manager.
//!
//! Threads the deferred graph into the open batch function: synthesises
//! function arguments for unbound inputs, records values produced inside the
//! function, assembles the return tuple, and fans the flat output buffer back
//! out to delivery callbacks after the invocation.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{RtResult, RuntimeError};
use crate::ir::{array_type, FuncBuilder, Type, ValueId};
use crate::registry::Registry;
use crate::schedule::InputBuffer;
use crate::tensor::ArrayFuture;

/// Number of words in a standard memref descriptor of the given rank:
/// `[allocated, aligned, offset, sizes.., strides..]`.
pub fn memref_words(rank: usize) -> usize {
    3 + 2 * rank
}

/// Number of output-buffer words one result occupies.
///
/// Distributed, non-0-rank arrays return a halo triple followed by a 1-D
/// uint64 memref of local offsets; everything else is a single memref.
pub fn ptensor_words(rank: usize, distributed: bool) -> usize {
    if distributed && rank > 0 {
        3 * memref_words(rank) + memref_words(1)
    } else {
        memref_words(rank)
    }
}

/// Borrowed view of one memref descriptor inside the flat output buffer.
#[derive(Debug, Clone, Copy)]
pub struct MemRefView<'a> {
    pub allocated: isize,
    pub aligned: isize,
    pub offset: isize,
    pub sizes: &'a [isize],
    pub strides: &'a [isize],
}

/// Unpacked descriptor fields handed to a delivery callback.
///
/// Halo and offset parts are present only for distributed, non-0-rank
/// results.
#[derive(Debug)]
pub struct Delivered<'a> {
    pub rank: usize,
    pub data: MemRefView<'a>,
    pub left_halo: Option<MemRefView<'a>>,
    pub right_halo: Option<MemRefView<'a>>,
    pub local_offsets: Option<MemRefView<'a>>,
}

pub type DeliverFn = Box<dyn FnOnce(Delivered<'_>) -> RtResult<()> + Send>;
pub type ReadyFn = Box<dyn FnOnce(u64) + Send>;

struct IvmEntry {
    guid: u64,
    value: ValueId,
    deliver: Option<DeliverFn>,
    live: bool,
}

#[derive(Debug, Clone, Copy)]
struct ResultInfo {
    rank: usize,
    distributed: bool,
}

/// Per-compilation bookkeeping state.
///
/// `ivm` preserves insertion order; that order defines argument index,
/// result index and delivery order.
pub struct DepManager {
    registry: Arc<Registry>,
    ivm: Vec<IvmEntry>,
    index: HashMap<u64, usize>,
    args: Vec<(u64, ArrayFuture)>,
    ready: Vec<(u64, ReadyFn)>,
    irm: HashMap<u64, ResultInfo>,
}

impl DepManager {
    pub fn new(registry: Arc<Registry>) -> Self {
        DepManager {
            registry,
            ivm: Vec::new(),
            index: HashMap::new(),
            args: Vec::new(),
            ready: Vec::new(),
            irm: HashMap::new(),
        }
    }

    fn live_entry(&self, guid: u64) -> Option<&IvmEntry> {
        self.index
            .get(&guid)
            .map(|slot| &self.ivm[*slot])
            .filter(|entry| entry.live)
    }

    fn push_entry(&mut self, guid: u64, value: ValueId, deliver: Option<DeliverFn>) {
        self.index.insert(guid, self.ivm.len());
        self.ivm.push(IvmEntry {
            guid,
            value,
            deliver,
            live: true,
        });
    }

    /// Resolves `guid` to a value inside the current function, importing it
    /// as a freshly synthesised function argument when it was produced by an
    /// earlier batch.
    pub fn get_dependent(&mut self, builder: &mut FuncBuilder, guid: u64) -> RtResult<ValueId> {
        if let Some(entry) = self.live_entry(guid) {
            return Ok(entry.value);
        }
        let future = self.registry.get(guid)?;
        let ty = array_type(
            future.dtype(),
            future.rank(),
            future.team(),
            future.device(),
        );
        let value = builder.insert_argument(self.args.len(), ty);
        self.args.push((guid, future));
        self.push_entry(guid, value, None);
        Ok(value)
    }

    /// Records a value produced inside the function together with its
    /// delivery callback.
    pub fn add_value(&mut self, guid: u64, value: ValueId, deliver: DeliverFn) -> RtResult<()> {
        if self.live_entry(guid).is_some() {
            return Err(RuntimeError::invariant(format!(
                "guid {guid} already has a value in this batch"
            )));
        }
        self.push_entry(guid, value, Some(deliver));
        Ok(())
    }

    /// Registers a callback fired after execution regardless of whether the
    /// guid is among the returned results.
    pub fn add_ready(&mut self, guid: u64, ready: ReadyFn) {
        self.ready.push((guid, ready));
    }

    /// User-observable end-of-life of an array handle: forget the value,
    /// its callbacks, and the registry entry.
    pub fn drop(&mut self, guid: u64) -> RtResult<()> {
        if let Some(slot) = self.index.get(&guid).copied() {
            let entry = &mut self.ivm[slot];
            entry.live = false;
            entry.deliver = None;
        }
        self.ready.retain(|(g, _)| *g != guid);
        self.irm.remove(&guid);
        self.registry.del(guid)
    }

    /// Materialises every imported argument into its flat descriptor words.
    ///
    /// Clears the corresponding `ivm` entries (inputs need no delivery) and
    /// releases the held futures. Must run before [`handle_result`].
    ///
    /// [`handle_result`]: DepManager::handle_result
    pub fn store_inputs(&mut self) -> Vec<InputBuffer> {
        let args = std::mem::take(&mut self.args);
        let mut buffers = Vec::with_capacity(args.len());
        for (guid, future) in args {
            let mut words = Vec::new();
            let array = future.add_to_args(&mut words);
            if let Some(slot) = self.index.get(&guid).copied() {
                self.ivm[slot].live = false;
            }
            buffers.push(InputBuffer::new(words, array));
        }
        buffers
    }

    /// Aggregates every surviving value into the function's return tuple.
    ///
    /// Extends the function signature, records rank/distribution for the
    /// decoder, emits the return operation, and reports twice the exact
    /// output word count as the caller-allocation upper bound.
    pub fn handle_result(&mut self, builder: &mut FuncBuilder) -> RtResult<u64> {
        let mut ret = Vec::new();
        let mut words = 0usize;
        for slot in 0..self.ivm.len() {
            if !self.ivm[slot].live {
                continue;
            }
            let guid = self.ivm[slot].guid;
            let value = self.ivm[slot].value;
            let ty = builder
                .type_of(value)
                .cloned()
                .ok_or_else(|| RuntimeError::invariant(format!("no type for value {value}")))?;
            let (rank, distributed) = match &ty {
                Type::Array(a) => (a.shape.rank(), false),
                Type::DistArray(d) => (d.global.rank(), true),
                other => {
                    return Err(RuntimeError::invariant(format!(
                        "result value {value} has non-array type {other}"
                    )))
                }
            };
            let raw = builder.extract_raw(value)?;
            let raw_ty = builder
                .type_of(raw)
                .cloned()
                .ok_or_else(|| RuntimeError::invariant("extract_raw produced no type"))?;
            builder.push_result(raw_ty);
            ret.push(raw);
            self.irm.insert(guid, ResultInfo { rank, distributed });
            words += ptensor_words(rank, distributed);
        }
        builder.set_return(ret);
        Ok(2 * words as u64)
    }

    /// Walks the flat output buffer in result order and fans descriptor
    /// fields out to the delivery callbacks, then fires the ready callbacks.
    pub fn deliver(&mut self, output: &[isize]) -> RtResult<()> {
        let mut pos = 0usize;
        let entries = std::mem::take(&mut self.ivm);
        self.index.clear();
        for entry in entries {
            if !entry.live {
                continue;
            }
            let info = self.irm.get(&entry.guid).copied().ok_or_else(|| {
                RuntimeError::invariant(format!("guid {} missing result info", entry.guid))
            })?;
            let deliver = entry.deliver.ok_or_else(|| {
                RuntimeError::invariant(format!(
                    "guid {} has a result but no delivery callback",
                    entry.guid
                ))
            })?;
            let delivered;
            if info.distributed && info.rank > 0 {
                let left = read_memref(output, &mut pos, info.rank)?;
                let data = read_memref(output, &mut pos, info.rank)?;
                let right = read_memref(output, &mut pos, info.rank)?;
                let offsets = read_memref(output, &mut pos, 1)?;
                delivered = Delivered {
                    rank: info.rank,
                    data,
                    left_halo: Some(left),
                    right_halo: Some(right),
                    local_offsets: Some(offsets),
                };
            } else {
                let data = read_memref(output, &mut pos, info.rank)?;
                delivered = Delivered {
                    rank: info.rank,
                    data,
                    left_halo: None,
                    right_halo: None,
                    local_offsets: None,
                };
            }
            deliver(delivered)?;
        }
        for (guid, ready) in self.ready.drain(..) {
            ready(guid);
        }
        Ok(())
    }
}

fn read_memref<'a>(
    output: &'a [isize],
    pos: &mut usize,
    rank: usize,
) -> RtResult<MemRefView<'a>> {
    let words = memref_words(rank);
    let end = *pos + words;
    if end > output.len() {
        return Err(RuntimeError::invariant(format!(
            "output buffer too small: need {end} words, have {}",
            output.len()
        )));
    }
    let view = MemRefView {
        allocated: output[*pos],
        aligned: output[*pos + 1],
        offset: output[*pos + 2],
        sizes: &output[*pos + 3..*pos + 3 + rank],
        strides: &output[*pos + 3 + rank..end],
    };
    *pos = end;
    Ok(view)
}
