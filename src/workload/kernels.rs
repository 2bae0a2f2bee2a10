// src/workload/kernels.rs

//! Built-in host kernels.
//!
//! Elements are little-endian unsigned integers of the buffer's element
//! size (at most 8 bytes). Argument 0 is the task's scalar `value`; every
//! following argument is a buffer accessor.

use anyhow::bail;

use crate::config::KernelKind;
use crate::dag::Kernel;
use crate::exec::host::KernelContext;

pub fn kernel_for(kind: KernelKind) -> Kernel {
    match kind {
        KernelKind::Fill => fill(),
        KernelKind::Increment => increment(),
    }
}

/// Set every element of every writable buffer to the scalar argument.
pub fn fill() -> Kernel {
    Kernel::new("fill", |ctx: &mut KernelContext<'_>| {
        let value = ctx.scalar(0)?;
        for index in ctx.buffer_indices() {
            let view = ctx.buffer(index)?;
            if view.mode.is_read_only() {
                continue;
            }
            let element = encode_element(value, view.element_size);
            ctx.for_each_element_mut(index, |e| e.copy_from_slice(&element))?;
        }
        Ok(())
    })
}

/// Add the scalar argument to every element of every writable buffer,
/// wrapping at the element width.
pub fn increment() -> Kernel {
    Kernel::new("increment", |ctx: &mut KernelContext<'_>| {
        let delta = ctx.scalar(0)?;
        for index in ctx.buffer_indices() {
            let view = ctx.buffer(index)?;
            if view.mode.is_read_only() {
                continue;
            }
            if view.mode.is_discard() {
                bail!(
                    "increment needs the previous contents of buffer argument {index}, \
                     but it was declared {}",
                    view.mode
                );
            }
            ctx.for_each_element_mut(index, |e| {
                let next = decode_element(e).wrapping_add(delta);
                let size = e.len();
                e.copy_from_slice(&encode_element(next, size));
            })?;
        }
        Ok(())
    })
}

/// Little-endian encoding of `value` truncated (or zero-extended) to `size`
/// bytes.
pub fn encode_element(value: u64, size: usize) -> Vec<u8> {
    let mut out = vec![0; size];
    let le = value.to_le_bytes();
    let n = size.min(le.len());
    out[..n].copy_from_slice(&le[..n]);
    out
}

/// Inverse of [`encode_element`]; bytes beyond the eighth are ignored.
pub fn decode_element(bytes: &[u8]) -> u64 {
    let mut le = [0u8; 8];
    let n = bytes.len().min(8);
    le[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(le)
}
