//! Random-access byte sources anchored at a virtual address.

use std::sync::Arc;

use super::MemoryReader;
use crate::error::{FossilError, Result};
use crate::types::Address;

/// A random-access byte source
///
/// Reading at or past the end of the source is not an error: it returns
/// `Ok(0)` (or fewer bytes than requested), which callers see as a short read.
pub trait ReadAt: Send + Sync
{
    /// Read into `buf` starting at byte `offset` of the source.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>;
}

impl ReadAt for [u8]
{
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>
    {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= self.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }
}

impl ReadAt for Vec<u8>
{
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>
    {
        self.as_slice().read_at(buf, offset)
    }
}

impl<T: ReadAt + ?Sized> ReadAt for Arc<T>
{
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>
    {
        (**self).read_at(buf, offset)
    }
}

/// Window `[file_offset, file_offset + file_size)` into shared file bytes
///
/// Used for `PT_LOAD` segments of a core: the segment's bytes are a slice of
/// the core file, and offset 0 of the window is the segment's first byte.
/// The window is clipped to the bytes actually present, so a truncated core
/// yields short reads rather than errors.
#[derive(Debug, Clone)]
pub struct FileSegment
{
    data: Arc<[u8]>,
    file_offset: u64,
    file_size: u64,
}

impl FileSegment
{
    pub fn new(data: Arc<[u8]>, file_offset: u64, file_size: u64) -> Self
    {
        Self {
            data,
            file_offset,
            file_size,
        }
    }

    /// Number of bytes the window claims.
    #[must_use]
    pub const fn size(&self) -> u64
    {
        self.file_size
    }
}

impl ReadAt for FileSegment
{
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>
    {
        if offset >= self.file_size {
            return Ok(0);
        }
        let remaining = self.file_size - offset;
        let len = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));
        let Some(start) = self.file_offset.checked_add(offset) else {
            return Ok(0);
        };
        self.data.read_at(&mut buf[..len], start)
    }
}

/// Adapts a [`ReadAt`] into a [`MemoryReader`] anchored at `base`
///
/// Virtual address `a` is served from source offset `a - base`. Source errors
/// are passed through untouched.
///
/// ```rust
/// use fossil_core::memory::{MemoryReader, OffsetReaderAt};
/// use fossil_core::types::Address;
///
/// let reader = OffsetReaderAt::new(b"hello world".to_vec(), Address::from(0x1000));
/// let mut buf = [0u8; 5];
/// assert_eq!(reader.read_memory(&mut buf, Address::from(0x1006))?, 5);
/// assert_eq!(&buf, b"world");
/// # Ok::<(), fossil_core::FossilError>(())
/// ```
#[derive(Debug, Clone)]
pub struct OffsetReaderAt<R>
{
    source: R,
    base: Address,
}

impl<R: ReadAt> OffsetReaderAt<R>
{
    pub const fn new(source: R, base: Address) -> Self
    {
        Self { source, base }
    }

    /// Virtual address of source offset 0.
    pub const fn base(&self) -> Address
    {
        self.base
    }

    pub const fn source(&self) -> &R
    {
        &self.source
    }
}

impl<R: ReadAt> MemoryReader for OffsetReaderAt<R>
{
    fn read_memory(&self, buf: &mut [u8], addr: Address) -> Result<usize>
    {
        let Some(offset) = addr.offset_from(self.base) else {
            return Err(FossilError::InvalidArgument(format!(
                "address {addr} is below reader base {}",
                self.base
            )));
        };
        self.source.read_at(buf, offset)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_slice_read_past_end_is_short()
    {
        let data: &[u8] = &[1, 2, 3];
        let mut buf = [0u8; 4];
        assert_eq!(data.read_at(&mut buf, 1).unwrap(), 2);
        assert_eq!(data.read_at(&mut buf, 3).unwrap(), 0);
        assert_eq!(data.read_at(&mut buf, u64::MAX).unwrap(), 0);
    }

    #[test]
    fn test_file_segment_window()
    {
        let file: Arc<[u8]> = Arc::from((0u8..32).collect::<Vec<_>>());
        let seg = FileSegment::new(Arc::clone(&file), 8, 4);
        let mut buf = [0u8; 8];
        assert_eq!(seg.read_at(&mut buf, 0).unwrap(), 4);
        assert_eq!(&buf[..4], &[8, 9, 10, 11]);
        assert_eq!(seg.read_at(&mut buf, 4).unwrap(), 0);
    }

    #[test]
    fn test_file_segment_truncated_file()
    {
        let file: Arc<[u8]> = Arc::from(vec![7u8; 10]);
        let seg = FileSegment::new(file, 8, 16);
        let mut buf = [0u8; 16];
        assert_eq!(seg.read_at(&mut buf, 0).unwrap(), 2);
    }

    #[test]
    fn test_offset_reader_translates_addresses()
    {
        let reader = OffsetReaderAt::new(vec![0xde, 0xad, 0xbe, 0xef], Address::from(0x400));
        let mut buf = [0u8; 2];
        assert_eq!(reader.read_memory(&mut buf, Address::from(0x402)).unwrap(), 2);
        assert_eq!(buf, [0xbe, 0xef]);
    }

    #[test]
    fn test_offset_reader_below_base()
    {
        let reader = OffsetReaderAt::new(vec![0u8; 4], Address::from(0x400));
        let mut buf = [0u8; 1];
        let err = reader.read_memory(&mut buf, Address::from(0x3ff)).unwrap_err();
        assert!(matches!(err, FossilError::InvalidArgument(_)));
    }
}
