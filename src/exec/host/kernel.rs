// src/exec/host/kernel.rs

//! What a kernel sees when it runs on a host device.

use anyhow::{anyhow, bail, Result};

use crate::exec::host::memory::{box_rows, HostMemory};
use crate::region::{Range3, Rect, RegionId};
use crate::types::{AccessMode, DeviceId, DevicePtr};

/// A requirement's replica as bound for one kernel launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferView {
    pub region: RegionId,
    pub ptr: DevicePtr,
    pub element_size: usize,
    /// Extent of the whole buffer.
    pub extent: Range3,
    /// The accessed box.
    pub rect: Rect,
    pub mode: AccessMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedArg {
    Scalar(u64),
    Buffer(BufferView),
}

pub struct KernelContext<'a> {
    device: DeviceId,
    args: &'a [ResolvedArg],
    memory: &'a HostMemory,
}

impl<'a> KernelContext<'a> {
    pub fn new(device: DeviceId, args: &'a [ResolvedArg], memory: &'a HostMemory) -> Self {
        Self {
            device,
            args,
            memory,
        }
    }

    pub fn device(&self) -> DeviceId {
        self.device
    }

    pub fn args(&self) -> &[ResolvedArg] {
        self.args
    }

    pub fn scalar(&self, index: usize) -> Result<u64> {
        match self.args.get(index) {
            Some(ResolvedArg::Scalar(v)) => Ok(*v),
            Some(ResolvedArg::Buffer(_)) => bail!("argument {index} is a buffer, not a scalar"),
            None => bail!("kernel has no argument {index}"),
        }
    }

    pub fn buffer(&self, index: usize) -> Result<BufferView> {
        match self.args.get(index) {
            Some(ResolvedArg::Buffer(view)) => Ok(*view),
            Some(ResolvedArg::Scalar(_)) => bail!("argument {index} is a scalar, not a buffer"),
            None => bail!("kernel has no argument {index}"),
        }
    }

    /// Indices of all buffer arguments, in argument order.
    pub fn buffer_indices(&self) -> Vec<usize> {
        self.args
            .iter()
            .enumerate()
            .filter_map(|(i, a)| matches!(a, ResolvedArg::Buffer(_)).then_some(i))
            .collect()
    }

    /// Bytes of the accessed box of buffer argument `index`, packed row-major.
    pub fn read_elements(&self, index: usize) -> Result<Vec<u8>> {
        let view = self.buffer(index)?;
        if view.mode.is_discard() {
            bail!("buffer argument {index} was declared {}; its contents are undefined", view.mode);
        }
        let bytes = self
            .memory
            .with_bytes_mut(view.ptr, |data| {
                let mut out = Vec::with_capacity(view.rect.volume() * view.element_size);
                for (start, len) in rows(&view) {
                    out.extend_from_slice(data.get(start..start + len)?);
                }
                Some(out)
            })?
            .ok_or_else(|| anyhow!("buffer argument {index} exceeds its allocation"))?;
        Ok(bytes)
    }

    /// Apply `f` to every element of the accessed box of buffer argument `index`.
    pub fn for_each_element_mut(
        &mut self,
        index: usize,
        mut f: impl FnMut(&mut [u8]),
    ) -> Result<()> {
        let view = self.writable(index)?;
        self.memory
            .with_bytes_mut(view.ptr, |data| {
                for (start, len) in rows(&view) {
                    let row = data.get_mut(start..start + len)?;
                    for element in row.chunks_exact_mut(view.element_size) {
                        f(element);
                    }
                }
                Some(())
            })?
            .ok_or_else(|| anyhow!("buffer argument {index} exceeds its allocation"))
    }

    /// Overwrite the accessed box of buffer argument `index` with packed bytes.
    pub fn write_elements(&mut self, index: usize, bytes: &[u8]) -> Result<()> {
        let view = self.writable(index)?;
        let expected = view.rect.volume() * view.element_size;
        if bytes.len() != expected {
            bail!(
                "buffer argument {index} needs {expected} bytes, got {}",
                bytes.len()
            );
        }
        self.memory
            .with_bytes_mut(view.ptr, |data| {
                let mut cursor = 0;
                for (start, len) in rows(&view) {
                    data.get_mut(start..start + len)?
                        .copy_from_slice(&bytes[cursor..cursor + len]);
                    cursor += len;
                }
                Some(())
            })?
            .ok_or_else(|| anyhow!("buffer argument {index} exceeds its allocation"))
    }

    fn writable(&self, index: usize) -> Result<BufferView> {
        let view = self.buffer(index)?;
        if view.mode.is_read_only() {
            bail!("buffer argument {index} is read-only");
        }
        Ok(view)
    }
}

fn rows(view: &BufferView) -> impl Iterator<Item = (usize, usize)> + use<> {
    box_rows(view.rect.offset, view.extent, view.rect.range, view.element_size)
}
