//! # Dump Model
//!
//! A parsed core dump: the process id, one register snapshot per thread and
//! the reassembled address space.
//!
//! [`Core`] is format-agnostic. [`elf`] fills one in from a Linux ELF64 core
//! and its executable; tests build cores directly with [`Core::new`],
//! [`Core::add_thread`] and [`Core::map`].

pub mod elf;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

pub use elf::{parse_core, read_core, ExecutableImage};

use crate::error::Result;
use crate::memory::{MemoryReader, SplicedMemory};
use crate::types::{Address, Architecture, MemoryRegion, MemoryRegionId, ProcessId, RegionSource, Registers, ThreadId};

/// Register state of one thread at capture time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSnapshot
{
    pub id: ThreadId,
    pub registers: Registers,
    /// Signal pending on the thread (`pr_cursig`), 0 if none.
    pub signal: i32,
}

impl ThreadSnapshot
{
    pub fn new(id: ThreadId, registers: Registers) -> Self
    {
        Self {
            id,
            registers,
            signal: 0,
        }
    }
}

/// A parsed core dump
///
/// Threads are keyed by id so enumeration is always in ascending id order.
/// All bytes are owned (shared `Arc` buffers); a `Core` holds no file handles.
#[derive(Debug, Clone)]
pub struct Core
{
    pid: ProcessId,
    architecture: Architecture,
    command: Option<String>,
    threads: BTreeMap<ThreadId, ThreadSnapshot>,
    memory: SplicedMemory,
    regions: Vec<MemoryRegion>,
}

impl Core
{
    /// Empty core with no threads and no mapped memory.
    #[must_use]
    pub fn new(pid: ProcessId, architecture: Architecture) -> Self
    {
        Self {
            pid,
            architecture,
            command: None,
            threads: BTreeMap::new(),
            memory: SplicedMemory::new(),
            regions: Vec::new(),
        }
    }

    /// Add (or replace) a thread snapshot.
    pub fn add_thread(&mut self, snapshot: ThreadSnapshot)
    {
        self.threads.insert(snapshot.id, snapshot);
    }

    /// Splice `reader` over `[start, start + length)` and record a region
    /// descriptor for it.
    ///
    /// Later mappings win where they overlap earlier ones.
    pub fn map(
        &mut self,
        reader: Arc<dyn MemoryReader>,
        start: Address,
        length: u64,
        permissions: &str,
        name: Option<String>,
        source: RegionSource,
    )
    {
        if length == 0 {
            return;
        }
        self.memory.add(reader, start, length);
        self.describe(start, length, permissions, name, source);
    }

    /// Record a region descriptor without mapping any bytes.
    pub(crate) fn describe(&mut self, start: Address, length: u64, permissions: &str, name: Option<String>, source: RegionSource)
    {
        let end = start.saturating_add(length);
        let at = self.regions.partition_point(|r| r.start <= start);
        self.regions.insert(
            at,
            MemoryRegion::new(MemoryRegionId(0), start, end, permissions.to_string(), name, source),
        );
        for (idx, region) in self.regions.iter_mut().enumerate() {
            region.id = MemoryRegionId(idx);
        }
        debug!(start = %start, end = %end, source = %source, "recorded memory region");
    }

    pub(crate) fn set_command(&mut self, command: Option<String>)
    {
        self.command = command;
    }

    #[must_use]
    pub const fn pid(&self) -> ProcessId
    {
        self.pid
    }

    #[must_use]
    pub const fn architecture(&self) -> Architecture
    {
        self.architecture
    }

    /// Command line recorded in `NT_PRPSINFO`, if present.
    #[must_use]
    pub fn command(&self) -> Option<&str>
    {
        self.command.as_deref()
    }

    /// Threads in ascending id order.
    pub fn threads(&self) -> impl Iterator<Item = &ThreadSnapshot> + '_
    {
        self.threads.values()
    }

    #[must_use]
    pub fn thread(&self, id: ThreadId) -> Option<&ThreadSnapshot>
    {
        self.threads.get(&id)
    }

    #[must_use]
    pub fn thread_count(&self) -> usize
    {
        self.threads.len()
    }

    /// Lowest thread id, the default selection of a freshly opened core.
    #[must_use]
    pub fn first_thread(&self) -> Option<ThreadId>
    {
        self.threads.keys().next().copied()
    }

    /// Region descriptors sorted by start address.
    ///
    /// Descriptors may overlap (a file mapping and the core segment that
    /// overrides it are both listed); reads go through [`Core::memory`].
    #[must_use]
    pub fn regions(&self) -> &[MemoryRegion]
    {
        &self.regions
    }

    /// The spliced address space.
    #[must_use]
    pub const fn memory(&self) -> &SplicedMemory
    {
        &self.memory
    }
}

impl MemoryReader for Core
{
    fn read_memory(&self, buf: &mut [u8], addr: Address) -> Result<usize>
    {
        self.memory.read_memory_at(buf, addr)
    }
}
