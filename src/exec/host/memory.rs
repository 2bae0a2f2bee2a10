// src/exec/host/memory.rs

//! Host-side storage standing in for device memory.
//!
//! Every simulated device allocates from the same pool, but each block is
//! tagged with its owning device and guarded by its own lock, so copies and
//! kernels on different devices only contend when they touch the same block.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tracing::{debug, trace};

use crate::dag::CopyOperation;
use crate::engine::{ErrorInfo, ErrorKind, RtResult};
use crate::region::{Id3, Range3};
use crate::types::{DeviceId, DevicePtr};

/// First address handed out; keeps null-like values out of the pool.
const BASE_ADDRESS: u64 = 0x1000;

#[derive(Debug)]
struct Block {
    device: DeviceId,
    data: Vec<u8>,
}

#[derive(Debug, Default)]
struct Bookkeeping {
    next_address: u64,
    usage: HashMap<DeviceId, usize>,
}

#[derive(Debug, Default)]
pub struct HostMemory {
    blocks: RwLock<HashMap<DevicePtr, Arc<Mutex<Block>>>>,
    books: Mutex<Bookkeeping>,
}

/// Byte ranges `(start, len)` of the contiguous rows of a box inside a
/// row-major allocation.
pub fn box_rows(
    offset: Id3,
    extent: Range3,
    range: Range3,
    element_size: usize,
) -> impl Iterator<Item = (usize, usize)> {
    let row_len = range[2] * element_size;
    (0..range[0]).flat_map(move |i| {
        (0..range[1]).map(move |j| {
            let linear = ((offset[0] + i) * extent[1] + (offset[1] + j)) * extent[2] + offset[2];
            (linear * element_size, row_len)
        })
    })
}

fn box_fits(offset: &Id3, extent: &Range3, range: &Range3) -> bool {
    (0..3).all(|axis| offset[axis] + range[axis] <= extent[axis])
}

impl HostMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently allocated on `device`.
    pub fn usage(&self, device: DeviceId) -> usize {
        self.books().usage.get(&device).copied().unwrap_or(0)
    }

    /// Allocate a zero-filled block on `device`.
    ///
    /// Fails if the block would push the device above `limit`.
    pub fn allocate(
        &self,
        device: DeviceId,
        alignment: usize,
        bytes: usize,
        limit: Option<usize>,
    ) -> RtResult<DevicePtr> {
        let ptr = {
            let mut books = self.books();
            let used = books.usage.get(&device).copied().unwrap_or(0);
            if let Some(limit) = limit {
                if used + bytes > limit {
                    return Err(ErrorInfo::new(
                        ErrorKind::MemoryAllocation,
                        format!(
                            "device {device}: cannot allocate {bytes} bytes ({used} of {limit} in use)"
                        ),
                    ));
                }
            }

            let alignment = alignment.max(1) as u64;
            let start = books.next_address.max(BASE_ADDRESS);
            let aligned = start.div_ceil(alignment) * alignment;
            books.next_address = aligned + bytes.max(1) as u64;
            *books.usage.entry(device).or_insert(0) += bytes;
            DevicePtr(aligned)
        };

        self.blocks_mut().insert(
            ptr,
            Arc::new(Mutex::new(Block {
                device,
                data: vec![0; bytes],
            })),
        );
        debug!(%device, %ptr, bytes, "allocated host block");
        Ok(ptr)
    }

    pub fn free(&self, ptr: DevicePtr) -> RtResult<()> {
        let block = self
            .blocks_mut()
            .remove(&ptr)
            .ok_or_else(|| ErrorInfo::internal(format!("free of unknown pointer {ptr}")))?;
        let block = lock_block(&block);
        let mut books = self.books();
        if let Some(used) = books.usage.get_mut(&block.device) {
            *used = used.saturating_sub(block.data.len());
        }
        debug!(device = %block.device, %ptr, "freed host block");
        Ok(())
    }

    /// Copy of a whole block.
    pub fn read(&self, ptr: DevicePtr) -> RtResult<Vec<u8>> {
        self.with_bytes_mut(ptr, |data| data.to_vec())
    }

    /// Overwrite the start of a block.
    pub fn write(&self, ptr: DevicePtr, bytes: &[u8]) -> RtResult<()> {
        self.with_bytes_mut(ptr, |data| {
            if bytes.len() > data.len() {
                return Err(ErrorInfo::internal(format!(
                    "write of {} bytes into {} byte block {ptr}",
                    bytes.len(),
                    data.len()
                )));
            }
            data[..bytes.len()].copy_from_slice(bytes);
            Ok(())
        })?
    }

    /// Run `f` with exclusive access to a block's bytes.
    pub fn with_bytes_mut<R>(&self, ptr: DevicePtr, f: impl FnOnce(&mut [u8]) -> R) -> RtResult<R> {
        let block = self.block(ptr)?;
        let mut guard = lock_block(&block);
        Ok(f(&mut guard.data))
    }

    /// Perform a (possibly strided) box copy between two blocks.
    ///
    /// The source rows are gathered first and the destination lock is taken
    /// afterwards, so a copy never holds two block locks at once.
    pub fn copy(&self, op: &CopyOperation) -> RtResult<()> {
        let src = &op.source;
        let dst = &op.dest;
        if src.element_size != dst.element_size {
            return Err(ErrorInfo::internal(format!(
                "element size mismatch in {op}: {} vs {}",
                src.element_size, dst.element_size
            )));
        }
        if !box_fits(&src.offset, &src.extent, &op.range)
            || !box_fits(&dst.offset, &dst.extent, &op.range)
        {
            return Err(ErrorInfo::internal(format!("{op} is out of bounds")));
        }

        let staged = self.with_bytes_mut(src.ptr, |data| {
            let mut staged = Vec::with_capacity(op.num_bytes());
            for (start, len) in box_rows(src.offset, src.extent, op.range, src.element_size) {
                let row = data.get(start..start + len).ok_or_else(|| {
                    ErrorInfo::internal(format!("source row out of block bounds in {op}"))
                })?;
                staged.extend_from_slice(row);
            }
            Ok::<_, ErrorInfo>(staged)
        })??;

        self.with_bytes_mut(dst.ptr, |data| {
            let mut cursor = 0;
            for (start, len) in box_rows(dst.offset, dst.extent, op.range, dst.element_size) {
                let row = data.get_mut(start..start + len).ok_or_else(|| {
                    ErrorInfo::internal(format!("destination row out of block bounds in {op}"))
                })?;
                row.copy_from_slice(&staged[cursor..cursor + len]);
                cursor += len;
            }
            Ok::<_, ErrorInfo>(())
        })??;

        trace!(%op, bytes = staged.len(), "copy executed");
        Ok(())
    }

    fn block(&self, ptr: DevicePtr) -> RtResult<Arc<Mutex<Block>>> {
        self.blocks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&ptr)
            .cloned()
            .ok_or_else(|| ErrorInfo::internal(format!("unknown device pointer {ptr}")))
    }

    fn blocks_mut(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<DevicePtr, Arc<Mutex<Block>>>> {
        self.blocks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn books(&self) -> MutexGuard<'_, Bookkeeping> {
        self.books
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn lock_block(block: &Mutex<Block>) -> MutexGuard<'_, Block> {
    block.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
