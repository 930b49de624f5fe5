//! # Search
//!
//! Scan the address space of a dump for a byte pattern.
//!
//! One tokio task is spawned per spliced region. Each task reads its region in
//! chunks and yields between them; the first task to find the pattern sends
//! the address through a single-slot channel, and every other task is aborted
//! as soon as that message arrives. Only one result is ever produced.
//!
//! Matches that straddle two regions are not found.

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, trace};

use crate::error::{FossilError, Result};
use crate::memory::{MemoryReader, Region, SplicedMemory};
use crate::types::Address;

/// Find an occurrence of `pattern` anywhere in `memory`.
///
/// Returns the address of the first match reported by any region task, or
/// `None` when no region contains the pattern. With several matches, which
/// one wins is not specified.
///
/// # Errors
///
/// [`FossilError::InvalidArgument`] for an empty pattern or a zero chunk size.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use fossil_core::memory::{OffsetReaderAt, SplicedMemory};
/// use fossil_core::search::find_first;
/// use fossil_core::types::Address;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let mut memory = SplicedMemory::new();
/// let bytes = b"....needle....".to_vec();
/// let len = bytes.len() as u64;
/// memory.add(Arc::new(OffsetReaderAt::new(bytes, Address::from(0x1000))), Address::from(0x1000), len);
///
/// let found = find_first(&memory, b"needle", 4).await?;
/// assert_eq!(found, Some(Address::from(0x1004)));
/// # Ok::<(), fossil_core::FossilError>(())
/// # }).unwrap();
/// ```
pub async fn find_first(memory: &SplicedMemory, pattern: &[u8], chunk_size: usize) -> Result<Option<Address>>
{
    if pattern.is_empty() {
        return Err(FossilError::InvalidArgument("empty search pattern".to_string()));
    }
    if chunk_size == 0 {
        return Err(FossilError::InvalidArgument("search chunk size must be positive".to_string()));
    }

    let (sender, mut receiver) = mpsc::channel(1);
    let mut tasks = JoinSet::new();
    for region in memory.regions() {
        let region = region.clone();
        let pattern = pattern.to_vec();
        let sender = sender.clone();
        tasks.spawn(async move {
            if let Some(found) = scan_region(&region, &pattern, chunk_size).await {
                let _ = sender.send(found).await;
            }
        });
    }
    drop(sender);

    let found = receiver.recv().await;
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}

    debug!(pattern_len = pattern.len(), regions = memory.len(), found = ?found, "search finished");
    Ok(found)
}

async fn scan_region(region: &Region, pattern: &[u8], chunk_size: usize) -> Option<Address>
{
    let overlap = pattern.len() as u64 - 1;
    let mut offset = 0u64;
    while offset < region.length() {
        let want = (chunk_size as u64 + overlap).min(region.length() - offset);
        let mut buf = vec![0u8; usize::try_from(want).ok()?];
        let start = region.offset() + offset;
        let read = match region.reader().read_memory(&mut buf, start) {
            Ok(read) => read,
            Err(err) => {
                trace!(address = %start, error = %err, "stopping region scan");
                return None;
            }
        };
        buf.truncate(read);
        if let Some(pos) = buf.windows(pattern.len()).position(|window| window == pattern) {
            return Some(start + pos as u64);
        }
        if (read as u64) < want {
            return None;
        }
        offset += chunk_size as u64;
        tokio::task::yield_now().await;
    }
    None
}
