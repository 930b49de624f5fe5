//! Goroutine control structures (`runtime.g`).

use std::collections::HashMap;
use std::fmt;

use crate::error::Result;
use crate::memory::{read_pointer, read_uint, MemoryReader};
use crate::types::{Address, Location, ThreadId};

/// Byte offsets of the `runtime.g` fields we decode
///
/// Read from the executable's DWARF (`runtime.g` and `runtime.gobuf`
/// members); `sched_pc` and `sched_sp` are already the sum of the `sched`
/// member offset and the `gobuf` field offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskLayout
{
    pub goid: u64,
    pub status: u64,
    pub sched_pc: u64,
    pub sched_sp: u64,
    pub gopc: u64,
    pub start_pc: u64,
}

impl TaskLayout
{
    /// Combine member offsets of `runtime.g` and `runtime.gobuf`.
    ///
    /// Returns `None` if any required member is missing.
    pub(crate) fn from_members(g: &HashMap<String, u64>, gobuf: &HashMap<String, u64>) -> Option<Self>
    {
        let sched = *g.get("sched")?;
        Some(Self {
            goid: *g.get("goid")?,
            status: *g.get("atomicstatus")?,
            sched_pc: sched + *gobuf.get("pc")?,
            sched_sp: sched + *gobuf.get("sp")?,
            gopc: *g.get("gopc")?,
            start_pc: *g.get("startpc")?,
        })
    }
}

/// Scheduling state of a goroutine (`runtime._G*` constants)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GoroutineStatus
{
    Idle,
    Runnable,
    Running,
    Syscall,
    Waiting,
    Dead,
    CopyStack,
    Preempted,
    Other(u32),
}

impl GoroutineStatus
{
    /// Set while the garbage collector scans the stack.
    const SCAN_BIT: u32 = 0x1000;

    #[must_use]
    pub const fn from_raw(raw: u32) -> Self
    {
        match raw & !Self::SCAN_BIT {
            0 => Self::Idle,
            1 => Self::Runnable,
            2 => Self::Running,
            3 => Self::Syscall,
            4 => Self::Waiting,
            6 => Self::Dead,
            8 => Self::CopyStack,
            9 => Self::Preempted,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for GoroutineStatus
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Runnable => write!(f, "runnable"),
            Self::Running => write!(f, "running"),
            Self::Syscall => write!(f, "syscall"),
            Self::Waiting => write!(f, "waiting"),
            Self::Dead => write!(f, "dead"),
            Self::CopyStack => write!(f, "copystack"),
            Self::Preempted => write!(f, "preempted"),
            Self::Other(raw) => write!(f, "status({raw})"),
        }
    }
}

/// A goroutine decoded from the dump
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Goroutine
{
    pub id: i64,
    pub status: GoroutineStatus,
    /// Address of the `runtime.g` structure.
    pub address: Address,
    /// Saved (or, when bound, live) program counter.
    pub pc: Address,
    pub sp: Address,
    /// Where the `go` statement that created it was executed.
    pub gopc: Address,
    /// Entry of the function it was started with.
    pub start_pc: Address,
    /// OS thread running this goroutine at capture time.
    pub thread: Option<ThreadId>,
    pub location: Option<Location>,
}

impl Goroutine
{
    /// Decode the `runtime.g` at `address`.
    pub fn read<M: MemoryReader + ?Sized>(mem: &M, layout: &TaskLayout, address: Address, pointer_size: u8) -> Result<Self>
    {
        let id = read_uint(mem, address + layout.goid, 8)?;
        let status = read_uint(mem, address + layout.status, 4)?;
        Ok(Self {
            id: i64::from_ne_bytes(id.to_ne_bytes()),
            status: GoroutineStatus::from_raw(u32::try_from(status).unwrap_or(u32::MAX)),
            address,
            pc: read_pointer(mem, address + layout.sched_pc, pointer_size)?,
            sp: read_pointer(mem, address + layout.sched_sp, pointer_size)?,
            gopc: read_pointer(mem, address + layout.gopc, pointer_size)?,
            start_pc: read_pointer(mem, address + layout.start_pc, pointer_size)?,
            thread: None,
            location: None,
        })
    }

    #[must_use]
    pub fn is_dead(&self) -> bool
    {
        self.status == GoroutineStatus::Dead
    }
}
