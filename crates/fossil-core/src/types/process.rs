//! Process, thread, and memory region types.

use std::fmt;

use super::Address;

/// Process identifier of the dumped process
///
/// Taken from the first `NT_PRSTATUS` note of the core (falling back to
/// `NT_PRPSINFO`).
///
/// ```rust
/// use fossil_core::types::ProcessId;
///
/// let pid = ProcessId::from(4242);
/// assert_eq!(u32::from(pid), 4242);
/// assert_eq!(pid.to_string(), "4242");
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u32);

impl From<u32> for ProcessId
{
    fn from(pid: u32) -> Self
    {
        Self(pid)
    }
}

impl From<ProcessId> for u32
{
    fn from(pid: ProcessId) -> Self
    {
        pid.0
    }
}

impl fmt::Display for ProcessId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Kernel thread identifier (TID) of a thread in the dump
///
/// Thread ids are ordered so that snapshots can be kept in a `BTreeMap` and
/// enumerated deterministically; the lowest id is the initially selected
/// thread of a freshly opened core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u64);

impl ThreadId
{
    /// Raw `u64` value of the thread id.
    #[must_use]
    pub const fn raw(self) -> u64
    {
        self.0
    }
}

impl From<u64> for ThreadId
{
    fn from(value: u64) -> Self
    {
        Self(value)
    }
}

impl fmt::Display for ThreadId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Position of a region in the list returned by `memory_regions()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryRegionId(pub usize);

impl MemoryRegionId
{
    #[must_use]
    pub const fn value(self) -> usize
    {
        self.0
    }
}

/// Where the bytes of a region come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionSource
{
    /// A `PT_LOAD` segment stored in the core file itself
    Core,
    /// A file mapping (`NT_FILE` entry) served from the paired executable
    Executable,
    /// A file mapping whose file is not available; reads hit nothing
    Missing,
}

impl fmt::Display for RegionSource
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            Self::Core => "core",
            Self::Executable => "exe",
            Self::Missing => "missing",
        };
        write!(f, "{label}")
    }
}

/// Memory region descriptor of the dumped process
///
/// Descriptors are informational: they list what the core says was mapped,
/// with the permissions recorded in the program header and the file name
/// recorded in the `NT_FILE` note. Reads never consult them; the spliced
/// address space is the single source of truth for bytes.
///
/// ```
/// use fossil_core::types::{Address, MemoryRegion, MemoryRegionId, RegionSource};
///
/// let text = MemoryRegion::new(
///     MemoryRegionId(0),
///     Address::from(0x40_0000),
///     Address::from(0x40_2000),
///     "r-x".to_string(),
///     Some("/usr/bin/server".to_string()),
///     RegionSource::Executable,
/// );
/// assert_eq!(text.size(), 0x2000);
/// assert!(text.is_executable());
/// assert!(!text.is_writable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion
{
    /// Position in the region list.
    pub id: MemoryRegionId,
    /// Start address (inclusive)
    pub start: Address,
    /// End address (exclusive)
    pub end: Address,
    /// Permission string in `rwx` form, `-` for a missing permission
    pub permissions: String,
    /// Backing file name from the `NT_FILE` note, if any
    pub name: Option<String>,
    /// Where reads of this region are served from
    pub source: RegionSource,
}

impl MemoryRegion
{
    pub fn new(
        id: MemoryRegionId,
        start: Address,
        end: Address,
        permissions: String,
        name: Option<String>,
        source: RegionSource,
    ) -> Self
    {
        Self {
            id,
            start,
            end,
            permissions,
            name,
            source,
        }
    }

    /// Size in bytes; zero when `end <= start`.
    #[must_use]
    pub fn size(&self) -> u64
    {
        self.end.value().saturating_sub(self.start.value())
    }

    #[must_use]
    pub fn is_readable(&self) -> bool
    {
        self.permissions.contains('r')
    }

    #[must_use]
    pub fn is_writable(&self) -> bool
    {
        self.permissions.contains('w')
    }

    #[must_use]
    pub fn is_executable(&self) -> bool
    {
        self.permissions.contains('x')
    }

    /// `true` if `address` lies in `[start, end)`.
    #[must_use]
    pub fn contains(&self, address: Address) -> bool
    {
        address >= self.start && address < self.end
    }
}

/// Format ELF `p_flags` as an `rwx` permission string.
pub(crate) fn permissions_from_flags(flags: u32) -> String
{
    const PF_X: u32 = 1;
    const PF_W: u32 = 2;
    const PF_R: u32 = 4;

    let mut out = String::with_capacity(3);
    out.push(if flags & PF_R != 0 { 'r' } else { '-' });
    out.push(if flags & PF_W != 0 { 'w' } else { '-' });
    out.push(if flags & PF_X != 0 { 'x' } else { '-' });
    out
}

/// CPU architecture of the dumped process
///
/// Detected from `e_machine` of the core (and cross-checked against the
/// executable). Only the two 64-bit architectures Linux cores are read for
/// have named variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture
{
    /// 64-bit ARM (`EM_AARCH64`)
    ///
    /// 31 general-purpose registers `x0`-`x30` plus `sp`, `pc` and `pstate`.
    /// The Go runtime keeps the current goroutine in `x28`.
    Arm64,
    /// 64-bit x86 (`EM_X86_64`)
    ///
    /// The Go runtime keeps the current goroutine in thread-local storage,
    /// addressed relative to `fs_base`.
    X86_64,
    /// Any other machine; the name is the ELF machine description
    Unknown(&'static str),
}

impl Architecture
{
    /// Map an ELF `e_machine` value.
    #[must_use]
    pub const fn from_elf_machine(machine: u16) -> Self
    {
        const EM_X86_64: u16 = 62;
        const EM_AARCH64: u16 = 183;

        match machine {
            EM_X86_64 => Self::X86_64,
            EM_AARCH64 => Self::Arm64,
            _ => Self::Unknown("unsupported"),
        }
    }

    /// Size of a pointer in bytes.
    #[must_use]
    pub const fn pointer_size_bytes(self) -> u8
    {
        match self {
            Self::Arm64 | Self::X86_64 | Self::Unknown(_) => 8,
        }
    }

    /// `true` for the architectures cores can be read for.
    #[must_use]
    pub const fn is_supported(self) -> bool
    {
        matches!(self, Self::Arm64 | Self::X86_64)
    }
}

impl fmt::Display for Architecture
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::Arm64 => write!(f, "arm64"),
            Self::X86_64 => write!(f, "amd64"),
            Self::Unknown(name) => write!(f, "{name}"),
        }
    }
}
