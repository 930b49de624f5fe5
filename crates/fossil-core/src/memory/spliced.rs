//! Interval overlay of memory readers.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use super::MemoryReader;
use crate::error::{FossilError, Result};
use crate::types::Address;

/// One contiguous, non-empty interval of a [`SplicedMemory`] and the reader
/// that answers it.
#[derive(Clone)]
pub struct Region
{
    offset: Address,
    length: u64,
    reader: Arc<dyn MemoryReader>,
}

impl Region
{
    /// First address of the region.
    #[must_use]
    pub const fn offset(&self) -> Address
    {
        self.offset
    }

    /// Length in bytes, always non-zero.
    #[must_use]
    pub const fn length(&self) -> u64
    {
        self.length
    }

    /// Exclusive end. Never overflows: intervals are clamped on insertion.
    #[must_use]
    pub const fn end(&self) -> u64
    {
        self.offset.value() + self.length
    }

    /// Inclusive last address.
    const fn last(&self) -> u64
    {
        self.offset.value() + self.length - 1
    }

    /// Reader answering this interval.
    #[must_use]
    pub fn reader(&self) -> &Arc<dyn MemoryReader>
    {
        &self.reader
    }

    fn slice(&self, start: u64, length: u64) -> Self
    {
        Self {
            offset: Address::from(start),
            length,
            reader: Arc::clone(&self.reader),
        }
    }
}

impl fmt::Debug for Region
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Region")
            .field("offset", &self.offset)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

/// A virtual address space assembled from overlapping readers
///
/// Regions are kept sorted by offset and pairwise disjoint after every
/// [`add`](SplicedMemory::add); every mapped address is answered by exactly
/// one reader, the most recently added one that covers it. Gaps between
/// regions are unmapped.
///
/// ## Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use fossil_core::memory::{OffsetReaderAt, SplicedMemory};
/// use fossil_core::types::Address;
///
/// let mut mem = SplicedMemory::new();
/// mem.add(Arc::new(OffsetReaderAt::new(vec![0xaa; 100], Address::ZERO)), Address::ZERO, 100);
/// mem.add(Arc::new(OffsetReaderAt::new(vec![0xbb; 10], Address::from(30))), Address::from(30), 10);
///
/// let spans: Vec<_> = mem.regions().map(|r| (r.offset().value(), r.length())).collect();
/// assert_eq!(spans, vec![(0, 30), (30, 10), (40, 60)]);
///
/// let mut buf = [0u8; 4];
/// mem.read_memory_at(&mut buf, Address::from(28))?;
/// assert_eq!(buf, [0xaa, 0xaa, 0xbb, 0xbb]);
/// # Ok::<(), fossil_core::FossilError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct SplicedMemory
{
    regions: Vec<Region>,
}

impl SplicedMemory
{
    #[must_use]
    pub const fn new() -> Self
    {
        Self { regions: Vec::new() }
    }

    /// Map `[offset, offset + length)` to `reader`, superseding whatever
    /// previously answered any byte of that interval.
    ///
    /// A zero `length` is a no-op. An interval running past the end of the
    /// address space is clamped to end at `u64::MAX`.
    pub fn add(&mut self, reader: Arc<dyn MemoryReader>, offset: Address, length: u64)
    {
        let length = length.min(u64::MAX - offset.value());
        if length == 0 {
            return;
        }

        let new = Region { offset, length, reader };
        let start = new.offset.value();
        let last = new.last();

        let mut out = Vec::with_capacity(self.regions.len() + 2);
        let mut pending = Some(new);

        for existing in std::mem::take(&mut self.regions) {
            let e_start = existing.offset.value();
            let e_last = existing.last();

            if e_last < start {
                // entirely before the new interval
                out.push(existing);
            } else if e_start > last {
                // entirely after
                if let Some(new) = pending.take() {
                    out.push(new);
                }
                out.push(existing);
            } else if start <= e_start && e_last <= last {
                // fully covered, dropped
            } else if e_start < start && e_last <= last {
                // tail covered, keep the prefix
                push_non_empty(&mut out, existing.slice(e_start, start - e_start));
            } else if start <= e_start {
                // head covered, keep the suffix
                if let Some(new) = pending.take() {
                    out.push(new);
                }
                push_non_empty(&mut out, existing.slice(last + 1, e_last - last));
            } else {
                // new interval strictly inside: split around it
                push_non_empty(&mut out, existing.slice(e_start, start - e_start));
                if let Some(new) = pending.take() {
                    out.push(new);
                }
                push_non_empty(&mut out, existing.slice(last + 1, e_last - last));
            }
        }

        if let Some(new) = pending {
            out.push(new);
        }
        self.regions = out;

        debug!(
            offset = %offset,
            length,
            regions = self.regions.len(),
            "spliced reader into address space"
        );
    }

    /// Regions in ascending address order.
    pub fn regions(&self) -> impl ExactSizeIterator<Item = &Region> + '_
    {
        self.regions.iter()
    }

    /// Number of regions.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.regions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.regions.is_empty()
    }

    /// `true` if some region answers `addr`.
    #[must_use]
    pub fn contains(&self, addr: Address) -> bool
    {
        self.region_index(addr).is_some()
    }

    fn region_index(&self, addr: Address) -> Option<usize>
    {
        let idx = self.regions.partition_point(|r| r.end() <= addr.value());
        self.regions
            .get(idx)
            .filter(|r| r.offset <= addr)
            .map(|_| idx)
    }

    /// Read through the overlay. See [`MemoryReader::read_memory`] on `SplicedMemory`.
    pub fn read_memory_at(&self, buf: &mut [u8], addr: Address) -> Result<usize>
    {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut done = 0usize;
        let mut cursor = addr;
        let first = self.regions.partition_point(|r| r.end() <= addr.value());

        for region in &self.regions[first..] {
            if region.offset > cursor {
                break;
            }

            let available = region.end() - cursor.value();
            let wanted = buf.len() - done;
            let clip = usize::try_from(available).map_or(wanted, |avail| avail.min(wanted));

            let got = match region.reader.read_memory(&mut buf[done..done + clip], cursor) {
                Ok(got) => got.min(clip),
                Err(err) => return Err(err.after_partial_read(done)),
            };
            trace!(address = %cursor, requested = clip, read = got, "region read");

            done += got;
            cursor = cursor + got as u64;
            if got < clip || done == buf.len() {
                return Ok(done);
            }
        }

        if done == 0 {
            Err(FossilError::NotMapped(cursor))
        } else {
            Err(FossilError::Unmapped {
                address: cursor,
                read: done,
            })
        }
    }
}

impl MemoryReader for SplicedMemory
{
    /// Fill `buf` from consecutive regions starting at `addr`.
    ///
    /// - A reader's short read ends the read with `Ok(short count)`.
    /// - Running into a gap after some bytes gives [`FossilError::Unmapped`]
    ///   naming the first unmapped address and the count read so far.
    /// - An unmapped `addr` gives [`FossilError::NotMapped`].
    /// - A reader error after earlier regions contributed bytes keeps the
    ///   partial count (see [`FossilError::bytes_read`]).
    fn read_memory(&self, buf: &mut [u8], addr: Address) -> Result<usize>
    {
        self.read_memory_at(buf, addr)
    }
}

fn push_non_empty(out: &mut Vec<Region>, region: Region)
{
    if region.length > 0 {
        out.push(region);
    }
}
