//! # Target Contract
//!
//! The interface every debugging backend implements.
//!
//! A front end (the CLI, a future RPC server) talks to a [`Target`] and the
//! [`Thread`]s it hands out, never to a concrete backend. [`CoreProcess`] is
//! the post-mortem implementation: everything that inspects state works, and
//! everything that would change the process fails with
//! [`FossilError::ReadOnlyTarget`](crate::FossilError::ReadOnlyTarget).
//!
//! ## Thread Safety
//!
//! A target is `Send` but not internally synchronized. Selection methods take
//! `&mut self`; wrap the target in a `Mutex` if several tasks share a session.

mod process;

use std::collections::BTreeMap;
use std::path::Path;

pub use process::{CoreProcess, CoreThread};

use crate::binary::{Arch, BinaryInfo};
use crate::breakpoints::{Breakpoint, BreakpointKind};
use crate::error::Result;
use crate::memory::MemoryReader;
use crate::runtime::Goroutine;
use crate::types::{Address, Function, Location, MemoryRegion, ProcessId, Registers, ThreadId};

/// One OS thread of a target
///
/// Reading memory through a thread reads the process address space; the
/// thread only matters for backends where memory access goes through a
/// specific thread.
pub trait Thread: MemoryReader
{
    fn thread_id(&self) -> ThreadId;

    /// Write `data` at `addr`, returning the number of bytes written.
    fn write_memory(&self, addr: Address, data: &[u8]) -> Result<usize>;

    /// Source location of the thread's program counter.
    fn location(&self) -> Result<Location>;

    fn registers(&self) -> Result<Registers>;

    fn arch(&self) -> &Arch;

    /// Breakpoint the thread is stopped at, if any.
    fn breakpoint(&self) -> Option<&Breakpoint>;

    fn step_instruction(&self) -> Result<()>;

    fn bin_info(&self) -> &BinaryInfo;
}

/// A debugged process
pub trait Target: Send
{
    fn pid(&self) -> ProcessId;

    fn bin_info(&self) -> &BinaryInfo;

    /// `true` once the process has exited.
    fn exited(&self) -> bool;

    /// `true` while the process is executing.
    fn running(&self) -> bool;

    /// All threads, sorted by id.
    fn threads(&self) -> Vec<Box<dyn Thread + '_>>;

    fn find_thread(&self, id: ThreadId) -> Option<Box<dyn Thread + '_>>;

    /// The selected thread.
    fn current_thread(&self) -> Option<Box<dyn Thread + '_>>;

    /// The selected goroutine, if the current thread runs one.
    fn selected_goroutine(&self) -> Option<&Goroutine>;

    /// Every live goroutine of the process.
    fn goroutines(&self) -> Result<&[Goroutine]>;

    /// Select thread `id` and the goroutine it runs.
    fn switch_thread(&mut self, id: ThreadId) -> Result<()>;

    /// Select goroutine `id` (`-1`: the selected one).
    ///
    /// A goroutine running on a thread also selects that thread.
    fn switch_goroutine(&mut self, id: i64) -> Result<()>;

    /// Breakpoints keyed by address.
    fn breakpoints(&self) -> &BTreeMap<u64, Breakpoint>;

    fn set_breakpoint(&mut self, addr: Address, kind: BreakpointKind, condition: Option<String>) -> Result<&Breakpoint>;

    fn clear_breakpoint(&mut self, addr: Address) -> Result<Breakpoint>;

    fn clear_internal_breakpoints(&mut self) -> Result<()>;

    /// Resume until the next stop; returns the thread that stopped.
    fn continue_once(&mut self) -> Result<ThreadId>;

    fn step_instruction(&mut self) -> Result<()>;

    fn request_manual_stop(&mut self) -> Result<()>;

    fn halt(&mut self) -> Result<()>;

    fn kill(&mut self) -> Result<()>;

    fn detach(&mut self, kill: bool) -> Result<()>;

    /// Mapped regions, sorted by start address.
    fn memory_regions(&self) -> &[MemoryRegion];

    /// Address to stop at for `file:line`.
    fn find_file_location(&self, file: &str, line: u32) -> Result<Address>
    {
        self.bin_info().find_file_location(file, line)
    }

    /// Address to stop at for the function `name`.
    fn find_function_location(&self, name: &str, first_line: bool, line_offset: u32) -> Result<Address>
    {
        self.bin_info().find_function_location(name, first_line, line_offset)
    }

    fn first_pc_after_prologue(&self, function: &Function, same_line: bool) -> Result<Address>
    {
        self.bin_info().first_pc_after_prologue(function, same_line)
    }
}

/// Open a core dump and its executable as a [`Target`].
///
/// # Errors
///
/// Fails if either file cannot be read or parsed, or if the Go runtime of the
/// executable cannot be identified.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
///
/// use fossil_core::target::open_target;
///
/// let target = open_target(Path::new("core.1234"), Path::new("./server"))?;
/// for thread in target.threads() {
///     println!("{}: {}", thread.thread_id(), thread.location()?);
/// }
/// # Ok::<(), fossil_core::FossilError>(())
/// ```
pub fn open_target(core: &Path, exe: &Path) -> Result<Box<dyn Target>>
{
    Ok(Box::new(CoreProcess::open(core, exe)?))
}
