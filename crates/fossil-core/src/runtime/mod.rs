//! # Go Runtime
//!
//! Knowledge about the Go runtime of the dumped program: its version, where a
//! thread keeps the goroutine it is running, and how to walk every goroutine
//! in the process.
//!
//! Everything here reads through the [`Thread`] / [`Target`] contracts, so it
//! works the same on any backend.

mod goroutine;
mod version;

use std::collections::HashMap;

use tracing::{debug, warn};

pub use goroutine::{Goroutine, GoroutineStatus, TaskLayout};
pub use version::RuntimeVersion;

use crate::binary::TaskLocation;
use crate::error::{FossilError, Result};
use crate::memory::{read_go_string, read_pointer, read_uint};
use crate::target::{Target, Thread};
use crate::types::Address;

const BUILD_VERSION_SYMBOL: &str = "runtime.buildVersion";
const ALLGLEN_SYMBOL: &str = "runtime.allglen";
const ALLGS_SYMBOL: &str = "runtime.allgs";

/// Read and parse `runtime.buildVersion`, and detect external linking.
///
/// Returns the version and `true` if the executable went through an external
/// linker. Any failure is reported as [`FossilError::UnsupportedRuntime`].
pub fn probe_runtime(thread: &dyn Thread, max_string_len: usize) -> Result<(RuntimeVersion, bool)>
{
    let bin = thread.bin_info();
    let address = bin
        .symbol_address(BUILD_VERSION_SYMBOL)
        .map_err(|_| FossilError::UnsupportedRuntime(format!("{BUILD_VERSION_SYMBOL} not found")))?;
    let text = read_go_string(thread, address, bin.arch().pointer_size(), max_string_len)
        .map_err(|err| FossilError::UnsupportedRuntime(format!("could not read {BUILD_VERSION_SYMBOL}: {err}")))?;
    let version = RuntimeVersion::parse(&text)
        .ok_or_else(|| FossilError::UnsupportedRuntime(format!("could not parse version {text:?}")))?;
    let external = bin.is_externally_linked();
    debug!(version = %version, external_linker = external, "probed runtime");
    Ok((version, external))
}

/// Address of the `runtime.g` the thread was running, if any.
fn task_address(thread: &dyn Thread) -> Result<Address>
{
    let registers = thread.registers()?;
    match thread.arch().task_location() {
        TaskLocation::TlsOffset(offset) => {
            let slot = Address::from(registers.tls.value().wrapping_add_signed(offset));
            read_pointer(thread, slot, thread.arch().pointer_size())
        }
        TaskLocation::Register(id) => registers
            .get(id)
            .map(Address::from)
            .ok_or_else(|| FossilError::InvalidArgument(format!("register {id:?} not available"))),
        TaskLocation::Unknown => Err(FossilError::UnsupportedRuntime(
            "goroutine location has not been configured".to_string(),
        )),
    }
}

/// The goroutine `thread` was running when the dump was taken.
///
/// `Ok(None)` means the thread was not running Go code (a zero task pointer).
/// The result carries the thread's live pc and sp rather than the values
/// saved in the goroutine.
pub fn goroutine_for_thread(thread: &dyn Thread) -> Result<Option<Goroutine>>
{
    let bin = thread.bin_info();
    let layout = bin
        .task_layout()
        .ok_or_else(|| FossilError::UnsupportedRuntime("runtime.g layout not found".to_string()))?;

    let address = task_address(thread)?;
    if address.is_null() {
        return Ok(None);
    }

    let mut goroutine = Goroutine::read(thread, layout, address, bin.arch().pointer_size())?;
    let registers = thread.registers()?;
    goroutine.pc = registers.pc;
    goroutine.sp = registers.sp;
    goroutine.thread = Some(thread.thread_id());
    goroutine.location = Some(bin.location(goroutine.pc));
    Ok(Some(goroutine))
}

/// Every live goroutine of the process, in `runtime.allgs` order.
///
/// Dead goroutines are skipped. Goroutines that a thread was running are
/// returned bound to that thread. At most `max` entries of `allgs` are read.
pub fn all_goroutines(target: &dyn Target, max: usize) -> Result<Vec<Goroutine>>
{
    let bin = target.bin_info();
    let layout = bin
        .task_layout()
        .ok_or_else(|| FossilError::UnsupportedRuntime("runtime.g layout not found".to_string()))?;
    let pointer_size = bin.arch().pointer_size();

    let mut bound: HashMap<Address, Goroutine> = HashMap::new();
    for thread in target.threads() {
        match goroutine_for_thread(&*thread) {
            Ok(Some(goroutine)) => {
                bound.insert(goroutine.address, goroutine);
            }
            Ok(None) => {}
            Err(err) => debug!(thread = %thread.thread_id(), error = %err, "thread has no goroutine"),
        }
    }

    let Some(mem) = target.current_thread() else {
        return Err(FossilError::InvalidCore("core has no threads".to_string()));
    };
    let count = read_uint(&*mem, bin.symbol_address(ALLGLEN_SYMBOL)?, usize::from(pointer_size))?;
    let base = read_pointer(&*mem, bin.symbol_address(ALLGS_SYMBOL)?, pointer_size)?;

    let count = usize::try_from(count).unwrap_or(usize::MAX);
    if count > max {
        warn!(count, max, "runtime.allglen exceeds the configured limit; truncating");
    }

    let mut goroutines = Vec::new();
    for index in 0..count.min(max) {
        let slot = base + (index as u64) * u64::from(pointer_size);
        let address = read_pointer(&*mem, slot, pointer_size)?;
        if address.is_null() {
            continue;
        }
        if let Some(goroutine) = bound.remove(&address) {
            goroutines.push(goroutine);
            continue;
        }
        let mut goroutine = Goroutine::read(&*mem, layout, address, pointer_size)?;
        if goroutine.is_dead() {
            continue;
        }
        goroutine.location = Some(bin.location(goroutine.pc));
        goroutines.push(goroutine);
    }
    debug!(count = goroutines.len(), "enumerated goroutines");
    Ok(goroutines)
}

/// Look up a goroutine by id; `-1` is the selected goroutine.
///
/// `Ok(None)` only happens for `-1` with nothing selected.
pub fn find_goroutine(target: &dyn Target, id: i64) -> Result<Option<Goroutine>>
{
    if id == -1 {
        return Ok(target.selected_goroutine().cloned());
    }
    target
        .goroutines()?
        .iter()
        .find(|goroutine| goroutine.id == id)
        .cloned()
        .map(Some)
        .ok_or(FossilError::GoroutineNotFound(id))
}
