//! # Memory
//!
//! Virtual memory of a dumped process.
//!
//! A core never contains the whole address space. Read-only file mappings
//! (program text, rodata) are usually left out and must be served from the
//! executable, while writable segments are stored in the core itself. This
//! module composes such backings into one address space:
//!
//! - [`MemoryReader`]: the capability of reading bytes at a virtual address
//! - [`ReadAt`]: a random-access byte source (a file, a byte buffer)
//! - [`OffsetReaderAt`]: a `ReadAt` anchored at a virtual base address
//! - [`SplicedMemory`]: many readers overlaid so that the most recently added
//!   one wins wherever they overlap

pub mod offset;
pub mod spliced;

use std::sync::Arc;

pub use offset::{FileSegment, OffsetReaderAt, ReadAt};
pub use spliced::{Region, SplicedMemory};

use crate::error::{FossilError, Result};
use crate::types::Address;

/// Reads bytes of a virtual address space
///
/// `read_memory` fills as much of `buf` as it can starting at `addr` and
/// returns the number of bytes written. Returning fewer bytes than
/// `buf.len()` *without* an error is a legal short read; callers that need
/// every byte use [`read_exact`].
///
/// Implementations must be shareable between threads: the same reader is
/// referenced from the spliced address space and from concurrent search tasks.
pub trait MemoryReader: Send + Sync
{
    /// Read into `buf` starting at virtual address `addr`.
    fn read_memory(&self, buf: &mut [u8], addr: Address) -> Result<usize>;
}

impl<T: MemoryReader + ?Sized> MemoryReader for Arc<T>
{
    fn read_memory(&self, buf: &mut [u8], addr: Address) -> Result<usize>
    {
        (**self).read_memory(buf, addr)
    }
}

/// Read exactly `len` bytes at `addr`.
///
/// A short read without error becomes [`FossilError::ShortRead`].
pub fn read_exact<M: MemoryReader + ?Sized>(reader: &M, addr: Address, len: usize) -> Result<Vec<u8>>
{
    let mut buf = vec![0u8; len];
    let read = reader.read_memory(&mut buf, addr)?;
    if read < len {
        return Err(FossilError::ShortRead {
            address: addr,
            requested: len,
            read,
        });
    }
    Ok(buf)
}

/// Read a little-endian unsigned integer of `size` bytes (1, 2, 4 or 8).
pub fn read_uint<M: MemoryReader + ?Sized>(reader: &M, addr: Address, size: usize) -> Result<u64>
{
    if !matches!(size, 1 | 2 | 4 | 8) {
        return Err(FossilError::InvalidArgument(format!("unsupported integer size {size}")));
    }
    let bytes = read_exact(reader, addr, size)?;
    let mut raw = [0u8; 8];
    raw[..size].copy_from_slice(&bytes);
    Ok(u64::from_le_bytes(raw))
}

/// Read a pointer-sized value and return it as an address.
pub fn read_pointer<M: MemoryReader + ?Sized>(reader: &M, addr: Address, pointer_size: u8) -> Result<Address>
{
    read_uint(reader, addr, usize::from(pointer_size)).map(Address::from)
}

/// Read a Go string header (`data`, `len`) at `addr` and the bytes it points to.
///
/// Strings longer than `max_len` are truncated to `max_len` bytes. Invalid
/// UTF-8 is replaced rather than rejected.
pub fn read_go_string<M: MemoryReader + ?Sized>(
    reader: &M,
    addr: Address,
    pointer_size: u8,
    max_len: usize,
) -> Result<String>
{
    let data = read_pointer(reader, addr, pointer_size)?;
    let len = read_uint(reader, addr + u64::from(pointer_size), usize::from(pointer_size))?;
    let len = usize::try_from(len).unwrap_or(usize::MAX).min(max_len);
    if len == 0 {
        return Ok(String::new());
    }
    let bytes = read_exact(reader, data, len)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
