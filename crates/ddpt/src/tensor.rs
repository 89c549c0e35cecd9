//! Array futures and the host-side materialised array implementation.

use std::sync::{Arc, Condvar, Mutex, OnceLock};

use smallvec::SmallVec;

use crate::depman::{Delivered, MemRefView};
use crate::dtype::DTypeId;
use crate::error::{RtResult, RuntimeError};
use crate::ir::ElemType;
use crate::registry::NOGUID;

/// Typed host storage for one buffer of array elements.
///
/// Unsigned dtypes share the signless variant of matching width, mirroring
/// the integer types the compiler sees.
#[derive(Debug, Clone, PartialEq)]
pub enum HostBuffer {
    Bool(Vec<bool>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl HostBuffer {
    pub fn zeros(elem: ElemType, len: usize) -> Self {
        match elem {
            ElemType::I1 => HostBuffer::Bool(vec![false; len]),
            ElemType::I8 => HostBuffer::I8(vec![0; len]),
            ElemType::I16 => HostBuffer::I16(vec![0; len]),
            ElemType::I32 => HostBuffer::I32(vec![0; len]),
            ElemType::I64 => HostBuffer::I64(vec![0; len]),
            ElemType::F32 => HostBuffer::F32(vec![0.0; len]),
            ElemType::F64 => HostBuffer::F64(vec![0.0; len]),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            HostBuffer::Bool(v) => v.len(),
            HostBuffer::I8(v) => v.len(),
            HostBuffer::I16(v) => v.len(),
            HostBuffer::I32(v) => v.len(),
            HostBuffer::I64(v) => v.len(),
            HostBuffer::F32(v) => v.len(),
            HostBuffer::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn elem(&self) -> ElemType {
        match self {
            HostBuffer::Bool(_) => ElemType::I1,
            HostBuffer::I8(_) => ElemType::I8,
            HostBuffer::I16(_) => ElemType::I16,
            HostBuffer::I32(_) => ElemType::I32,
            HostBuffer::I64(_) => ElemType::I64,
            HostBuffer::F32(_) => ElemType::F32,
            HostBuffer::F64(_) => ElemType::F64,
        }
    }

    pub fn as_ptr(&self) -> *const u8 {
        match self {
            HostBuffer::Bool(v) => v.as_ptr() as *const u8,
            HostBuffer::I8(v) => v.as_ptr() as *const u8,
            HostBuffer::I16(v) => v.as_ptr() as *const u8,
            HostBuffer::I32(v) => v.as_ptr() as *const u8,
            HostBuffer::I64(v) => v.as_ptr() as *const u8,
            HostBuffer::F32(v) => v.as_ptr() as *const u8,
            HostBuffer::F64(v) => v.as_ptr() as *const u8,
        }
    }

    /// Copies `len` elements out of a memref data pointer.
    ///
    /// # Safety
    /// `aligned` offset by `offset` elements must be valid for reading `len`
    /// contiguous elements of `elem`.
    pub unsafe fn copy_from_raw(
        elem: ElemType,
        aligned: *const u8,
        offset: isize,
        len: usize,
    ) -> HostBuffer {
        unsafe fn copy<T: Copy>(ptr: *const u8, offset: isize, len: usize) -> Vec<T> {
            std::slice::from_raw_parts((ptr as *const T).offset(offset), len).to_vec()
        }
        match elem {
            ElemType::I1 => HostBuffer::Bool(copy(aligned, offset, len)),
            ElemType::I8 => HostBuffer::I8(copy(aligned, offset, len)),
            ElemType::I16 => HostBuffer::I16(copy(aligned, offset, len)),
            ElemType::I32 => HostBuffer::I32(copy(aligned, offset, len)),
            ElemType::I64 => HostBuffer::I64(copy(aligned, offset, len)),
            ElemType::F32 => HostBuffer::F32(copy(aligned, offset, len)),
            ElemType::F64 => HostBuffer::F64(copy(aligned, offset, len)),
        }
    }
}

/// Row-major strides for the given extents.
pub fn contiguous_strides(dims: &[usize]) -> SmallVec<[isize; 4]> {
    let mut strides: SmallVec<[isize; 4]> = SmallVec::from_elem(1, dims.len());
    for i in (0..dims.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * dims[i + 1] as isize;
    }
    strides
}

fn view_is_contiguous(view: &MemRefView<'_>) -> bool {
    let dims: Vec<usize> = view.sizes.iter().map(|s| *s as usize).collect();
    let expected = contiguous_strides(&dims);
    view.strides.iter().copied().eq(expected.iter().copied())
}

fn copy_view(elem: ElemType, view: &MemRefView<'_>) -> RtResult<HostBuffer> {
    if !view_is_contiguous(view) {
        return Err(RuntimeError::invariant(
            "delivered memref is not row-major contiguous",
        ));
    }
    let len = view.sizes.iter().map(|s| *s as usize).product::<usize>();
    // SAFETY: the descriptor was produced by the compiled function for this
    // rank; contiguity was just verified, so aligned+offset covers len
    // elements.
    Ok(unsafe { HostBuffer::copy_from_raw(elem, view.aligned as *const u8, view.offset, len) })
}

/// Materialised array implementation.
///
/// Holds a host copy of the delivered data; distributed arrays additionally
/// carry their halo parts and local offsets.
#[derive(Debug)]
pub struct NdArray {
    dtype: DTypeId,
    dims: SmallVec<[usize; 4]>,
    strides: SmallVec<[isize; 4]>,
    data: HostBuffer,
    left_halo: Option<HostBuffer>,
    right_halo: Option<HostBuffer>,
    local_offsets: Option<Vec<u64>>,
    team: u64,
    balanced: bool,
}

impl NdArray {
    pub fn new(dtype: DTypeId, dims: &[usize], data: HostBuffer) -> RtResult<Self> {
        let expected: usize = dims.iter().product();
        if data.len() != expected {
            return Err(RuntimeError::invariant(format!(
                "buffer holds {} elements, shape {:?} needs {}",
                data.len(),
                dims,
                expected
            )));
        }
        Ok(NdArray {
            dtype,
            dims: SmallVec::from_slice(dims),
            strides: contiguous_strides(dims),
            data,
            left_halo: None,
            right_halo: None,
            local_offsets: None,
            team: 0,
            balanced: true,
        })
    }

    /// Builds an array from the descriptor fields delivered after a JIT run.
    pub fn from_delivered(
        dtype: DTypeId,
        team: u64,
        balanced: bool,
        delivered: &Delivered<'_>,
    ) -> RtResult<Self> {
        let elem = ElemType::from_dtype(dtype);
        let data = copy_view(elem, &delivered.data)?;
        let left_halo = delivered
            .left_halo
            .as_ref()
            .map(|view| copy_view(elem, view))
            .transpose()?;
        let right_halo = delivered
            .right_halo
            .as_ref()
            .map(|view| copy_view(elem, view))
            .transpose()?;
        let local_offsets = match &delivered.local_offsets {
            Some(view) => {
                let len = view.sizes.first().map(|s| *s as usize).unwrap_or(0);
                // SAFETY: the offsets memref is a 1-D uint64 buffer of `len`
                // words produced by the compiled function.
                let words = unsafe {
                    std::slice::from_raw_parts(
                        (view.aligned as *const u64).offset(view.offset),
                        len,
                    )
                };
                Some(words.to_vec())
            }
            None => None,
        };
        let dims: SmallVec<[usize; 4]> = delivered
            .data
            .sizes
            .iter()
            .map(|s| *s as usize)
            .collect();
        let strides = contiguous_strides(&dims);
        Ok(NdArray {
            dtype,
            dims,
            strides,
            data,
            left_halo,
            right_halo,
            local_offsets,
            team,
            balanced,
        })
    }

    pub fn dtype(&self) -> DTypeId {
        self.dtype
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    pub fn data(&self) -> &HostBuffer {
        &self.data
    }

    pub fn team(&self) -> u64 {
        self.team
    }

    pub fn balanced(&self) -> bool {
        self.balanced
    }

    pub fn local_offsets(&self) -> Option<&[u64]> {
        self.local_offsets.as_deref()
    }

    pub fn as_i64(&self) -> Option<&[i64]> {
        match &self.data {
            HostBuffer::I64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match &self.data {
            HostBuffer::I32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            HostBuffer::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match &self.data {
            HostBuffer::F64(v) => Some(v),
            _ => None,
        }
    }

    /// Appends the flat memref descriptor words for the native-code ABI:
    /// `[allocated, aligned, offset, sizes.., strides..]`.
    pub fn store_memref(&self, out: &mut Vec<isize>) {
        let ptr = self.data.as_ptr() as isize;
        out.push(ptr);
        out.push(ptr);
        out.push(0);
        for dim in &self.dims {
            out.push(*dim as isize);
        }
        for stride in &self.strides {
            out.push(*stride);
        }
    }
}

#[derive(Debug)]
struct FutureState {
    guid: OnceLock<u64>,
    dtype: DTypeId,
    rank: usize,
    device: String,
    team: u64,
    balanced: bool,
    value: Mutex<Option<Arc<NdArray>>>,
    ready: Condvar,
}

/// Shared array handle: promise and future over one logical array.
///
/// Carries the static metadata needed for type synthesis (dtype, rank,
/// device tag, team) and blocks on `get` until the worker delivers.
#[derive(Clone, Debug)]
pub struct ArrayFuture(Arc<FutureState>);

impl ArrayFuture {
    pub fn new(dtype: DTypeId, rank: usize, device: &str, team: u64, balanced: bool) -> Self {
        ArrayFuture(Arc::new(FutureState {
            guid: OnceLock::new(),
            dtype,
            rank,
            device: device.to_string(),
            team,
            balanced,
            value: Mutex::new(None),
            ready: Condvar::new(),
        }))
    }

    pub fn guid(&self) -> u64 {
        self.0.guid.get().copied().unwrap_or(NOGUID)
    }

    pub(crate) fn bind_guid(&self, guid: u64) -> RtResult<()> {
        self.0
            .guid
            .set(guid)
            .map_err(|_| RuntimeError::invariant(format!("future already bound to guid {}", self.guid())))
    }

    pub fn dtype(&self) -> DTypeId {
        self.0.dtype
    }

    pub fn rank(&self) -> usize {
        self.0.rank
    }

    pub fn device(&self) -> &str {
        &self.0.device
    }

    pub fn team(&self) -> u64 {
        self.0.team
    }

    pub fn balanced(&self) -> bool {
        self.0.balanced
    }

    /// Fulfils the promise and wakes every blocked `get`.
    pub fn set_value(&self, value: Arc<NdArray>) {
        let mut guard = self.0.value.lock().expect("array future poisoned");
        *guard = Some(value);
        self.0.ready.notify_all();
    }

    /// Blocks until the worker delivers the materialised array.
    pub fn get(&self) -> Arc<NdArray> {
        let mut guard = self.0.value.lock().expect("array future poisoned");
        loop {
            if let Some(value) = guard.as_ref() {
                return Arc::clone(value);
            }
            guard = self.0.ready.wait(guard).expect("array future poisoned");
        }
    }

    /// Non-blocking view of the materialised array, if already delivered.
    pub fn try_get(&self) -> Option<Arc<NdArray>> {
        self.0
            .value
            .lock()
            .expect("array future poisoned")
            .as_ref()
            .map(Arc::clone)
    }

    /// Appends this array's memref descriptor words, materialising first.
    /// Returns the array so the caller can keep the words' backing storage
    /// alive for the duration of the invocation.
    pub fn add_to_args(&self, out: &mut Vec<isize>) -> Arc<NdArray> {
        let array = self.get();
        array.store_memref(out);
        array
    }
}
