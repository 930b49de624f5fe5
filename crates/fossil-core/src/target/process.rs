//! Post-mortem target backed by a core dump.

use std::collections::BTreeMap;
use std::path::Path;

use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use super::{Target, Thread};
use crate::binary::{Arch, BinaryInfo};
use crate::breakpoints::{Breakpoint, BreakpointKind};
use crate::config::CoreConfig;
use crate::dump::{read_core, Core, ThreadSnapshot};
use crate::error::{FossilError, Result};
use crate::memory::MemoryReader;
use crate::runtime::{self, Goroutine};
use crate::types::{Address, Location, MemoryRegion, ProcessId, Registers, ThreadId};

/// A process reconstructed from a core dump
///
/// Inspection works as on a live process. Every operation that would change
/// the process fails with [`FossilError::ReadOnlyTarget`]; lifecycle requests
/// (`halt`, `kill`, `detach`) succeed without doing anything.
///
/// [`Target::exited`] and [`Target::running`] are always `false`, even if the
/// dump was written by a process that was exiting.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
///
/// use fossil_core::target::{CoreProcess, Target};
///
/// let mut process = CoreProcess::open(Path::new("core"), Path::new("server"))?;
/// process.switch_goroutine(1)?;
/// if let Some(thread) = process.current_thread() {
///     println!("{}", thread.location()?);
/// }
/// # Ok::<(), fossil_core::FossilError>(())
/// ```
#[derive(Debug)]
pub struct CoreProcess
{
    bin: BinaryInfo,
    core: Core,
    config: CoreConfig,
    breakpoints: BTreeMap<u64, Breakpoint>,
    current_thread: Option<ThreadId>,
    selected_goroutine: Option<Goroutine>,
    goroutines: OnceCell<Vec<Goroutine>>,
}

impl CoreProcess
{
    /// Open `core_path` with the executable at `exe_path`, using limits from
    /// the environment ([`CoreConfig::from_env`]).
    pub fn open(core_path: &Path, exe_path: &Path) -> Result<Self>
    {
        Self::open_core(core_path, exe_path, CoreConfig::from_env())
    }

    /// Open `core_path` with the executable at `exe_path`.
    ///
    /// Both files are read completely; no handle is kept open.
    pub fn open_core(core_path: &Path, exe_path: &Path, config: CoreConfig) -> Result<Self>
    {
        let core = read_core(core_path, exe_path)?;
        let bin = BinaryInfo::load(exe_path)?;
        Self::from_parts(core, bin, config)
    }

    /// Build a target from an already parsed core and binary.
    ///
    /// Selects the lowest thread id, probes the Go runtime to configure where
    /// goroutine pointers live, then selects that thread's goroutine. Failing
    /// to find a goroutine is not an error.
    pub fn from_parts(core: Core, mut bin: BinaryInfo, config: CoreConfig) -> Result<Self>
    {
        let Some(first) = core.first_thread() else {
            return Err(FossilError::InvalidCore("core has no threads".to_string()));
        };

        let (version, external) = {
            let snapshot = core.thread(first).ok_or(FossilError::ThreadNotFound(first.raw()))?;
            let thread = CoreThread::new(snapshot, &core, &bin);
            runtime::probe_runtime(&thread, config.max_string_len)?
        };
        bin.arch_mut().set_task_struct_offset(&version, external);

        let mut process = Self {
            bin,
            core,
            config,
            breakpoints: BTreeMap::new(),
            current_thread: Some(first),
            selected_goroutine: None,
            goroutines: OnceCell::new(),
        };
        process.selected_goroutine = process.goroutine_on(first);

        info!(
            pid = %process.core.pid(),
            threads = process.core.thread_count(),
            version = %version,
            thread = %first,
            goroutine = process.selected_goroutine.as_ref().map(|g| g.id),
            "opened core"
        );
        Ok(process)
    }

    /// The parsed dump.
    #[must_use]
    pub const fn core(&self) -> &Core
    {
        &self.core
    }

    #[must_use]
    pub const fn config(&self) -> &CoreConfig
    {
        &self.config
    }

    fn thread_view(&self, id: ThreadId) -> Option<CoreThread<'_>>
    {
        self.core
            .thread(id)
            .map(|snapshot| CoreThread::new(snapshot, &self.core, &self.bin))
    }

    /// Goroutine running on thread `id`, `None` if there is none or it
    /// cannot be decoded.
    fn goroutine_on(&self, id: ThreadId) -> Option<Goroutine>
    {
        let thread = self.thread_view(id)?;
        match runtime::goroutine_for_thread(&thread) {
            Ok(goroutine) => goroutine,
            Err(err) => {
                warn!(thread = %id, error = %err, "could not resolve goroutine of thread");
                None
            }
        }
    }
}

impl Target for CoreProcess
{
    fn pid(&self) -> ProcessId
    {
        self.core.pid()
    }

    fn bin_info(&self) -> &BinaryInfo
    {
        &self.bin
    }

    fn exited(&self) -> bool
    {
        false
    }

    fn running(&self) -> bool
    {
        false
    }

    fn threads(&self) -> Vec<Box<dyn Thread + '_>>
    {
        self.core
            .threads()
            .map(|snapshot| Box::new(CoreThread::new(snapshot, &self.core, &self.bin)) as Box<dyn Thread + '_>)
            .collect()
    }

    fn find_thread(&self, id: ThreadId) -> Option<Box<dyn Thread + '_>>
    {
        self.thread_view(id).map(|thread| Box::new(thread) as Box<dyn Thread + '_>)
    }

    fn current_thread(&self) -> Option<Box<dyn Thread + '_>>
    {
        self.current_thread.and_then(|id| self.find_thread(id))
    }

    fn selected_goroutine(&self) -> Option<&Goroutine>
    {
        self.selected_goroutine.as_ref()
    }

    fn goroutines(&self) -> Result<&[Goroutine]>
    {
        self.goroutines
            .get_or_try_init(|| runtime::all_goroutines(self, self.config.max_goroutines))
            .map(Vec::as_slice)
    }

    fn switch_thread(&mut self, id: ThreadId) -> Result<()>
    {
        if self.core.thread(id).is_none() {
            return Err(FossilError::ThreadNotFound(id.raw()));
        }
        self.current_thread = Some(id);
        self.selected_goroutine = self.goroutine_on(id);
        debug!(thread = %id, goroutine = self.selected_goroutine.as_ref().map(|g| g.id), "switched thread");
        Ok(())
    }

    fn switch_goroutine(&mut self, id: i64) -> Result<()>
    {
        let Some(goroutine) = runtime::find_goroutine(&*self, id)? else {
            return Ok(());
        };
        if let Some(thread) = goroutine.thread {
            return self.switch_thread(thread);
        }
        debug!(goroutine = goroutine.id, "switched goroutine");
        self.selected_goroutine = Some(goroutine);
        Ok(())
    }

    fn breakpoints(&self) -> &BTreeMap<u64, Breakpoint>
    {
        &self.breakpoints
    }

    fn set_breakpoint(&mut self, _addr: Address, _kind: BreakpointKind, _condition: Option<String>) -> Result<&Breakpoint>
    {
        Err(FossilError::read_only("set breakpoint"))
    }

    fn clear_breakpoint(&mut self, addr: Address) -> Result<Breakpoint>
    {
        if self.breakpoints.contains_key(&addr.value()) {
            return Err(FossilError::read_only("clear breakpoint"));
        }
        Err(FossilError::NoBreakpoint(addr.value()))
    }

    fn clear_internal_breakpoints(&mut self) -> Result<()>
    {
        Ok(())
    }

    fn continue_once(&mut self) -> Result<ThreadId>
    {
        Err(FossilError::read_only("continue"))
    }

    fn step_instruction(&mut self) -> Result<()>
    {
        Err(FossilError::read_only("step instruction"))
    }

    fn request_manual_stop(&mut self) -> Result<()>
    {
        Ok(())
    }

    fn halt(&mut self) -> Result<()>
    {
        Ok(())
    }

    fn kill(&mut self) -> Result<()>
    {
        Ok(())
    }

    fn detach(&mut self, _kill: bool) -> Result<()>
    {
        Ok(())
    }

    fn memory_regions(&self) -> &[MemoryRegion]
    {
        self.core.regions()
    }
}

/// A thread of a [`CoreProcess`]
///
/// Borrowed view of one thread snapshot; cheap to create, never outlives the
/// process.
#[derive(Debug, Clone, Copy)]
pub struct CoreThread<'a>
{
    snapshot: &'a ThreadSnapshot,
    core: &'a Core,
    bin: &'a BinaryInfo,
}

impl<'a> CoreThread<'a>
{
    const fn new(snapshot: &'a ThreadSnapshot, core: &'a Core, bin: &'a BinaryInfo) -> Self
    {
        Self { snapshot, core, bin }
    }

    /// Signal pending on this thread when the dump was written.
    #[must_use]
    pub const fn signal(&self) -> i32
    {
        self.snapshot.signal
    }
}

impl MemoryReader for CoreThread<'_>
{
    fn read_memory(&self, buf: &mut [u8], addr: Address) -> Result<usize>
    {
        let read = self.core.read_memory(buf, addr)?;
        if read < buf.len() {
            return Err(FossilError::ShortRead {
                address: addr,
                requested: buf.len(),
                read,
            });
        }
        Ok(read)
    }
}

impl Thread for CoreThread<'_>
{
    fn thread_id(&self) -> ThreadId
    {
        self.snapshot.id
    }

    fn write_memory(&self, _addr: Address, _data: &[u8]) -> Result<usize>
    {
        Err(FossilError::read_only("write memory"))
    }

    fn location(&self) -> Result<Location>
    {
        Ok(self.bin.location(self.snapshot.registers.pc))
    }

    fn registers(&self) -> Result<Registers>
    {
        Ok(self.snapshot.registers.clone())
    }

    fn arch(&self) -> &Arch
    {
        self.bin.arch()
    }

    fn breakpoint(&self) -> Option<&Breakpoint>
    {
        None
    }

    fn step_instruction(&self) -> Result<()>
    {
        Err(FossilError::read_only("step instruction"))
    }

    fn bin_info(&self) -> &BinaryInfo
    {
        self.bin
    }
}
