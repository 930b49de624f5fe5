//! Architecture description and the location of the current goroutine.

use tracing::debug;

use crate::runtime::RuntimeVersion;
use crate::types::{Architecture, Arm64Register, RegisterId};

/// Where a thread keeps the pointer to the goroutine it is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskLocation
{
    /// Not configured yet; set by [`Arch::set_task_struct_offset`]
    Unknown,
    /// Pointer-sized slot at this signed offset from the TLS base
    TlsOffset(i64),
    /// Held directly in a register
    Register(RegisterId),
}

/// Architecture knowledge used by the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arch
{
    architecture: Architecture,
    task_location: TaskLocation,
}

impl Arch
{
    #[must_use]
    pub const fn new(architecture: Architecture) -> Self
    {
        Self {
            architecture,
            task_location: TaskLocation::Unknown,
        }
    }

    #[must_use]
    pub const fn architecture(&self) -> Architecture
    {
        self.architecture
    }

    #[must_use]
    pub const fn pointer_size(&self) -> u8
    {
        self.architecture.pointer_size_bytes()
    }

    #[must_use]
    pub const fn task_location(&self) -> TaskLocation
    {
        self.task_location
    }

    /// Configure where the goroutine pointer lives for this runtime.
    ///
    /// On linux/amd64 the runtime stores it at `-16` from `fs_base`; binaries
    /// linked externally, built with go1.5 or later, or development builds
    /// use `-8`. On arm64 it is always in `x28`.
    pub fn set_task_struct_offset(&mut self, version: &RuntimeVersion, external_linker: bool)
    {
        const GO1_5_BETA2: RuntimeVersion = RuntimeVersion {
            major: 1,
            minor: 5,
            rev: -1,
            beta: 2,
            rc: 0,
        };

        self.task_location = match self.architecture {
            Architecture::X86_64 => {
                let mut offset: i64 = -16;
                if external_linker || version.after_or_equal(&GO1_5_BETA2) || version.is_devel() {
                    offset += 8;
                }
                TaskLocation::TlsOffset(offset)
            }
            Architecture::Arm64 => TaskLocation::Register(RegisterId::Arm64(Arm64Register::X(28))),
            Architecture::Unknown(_) => TaskLocation::Unknown,
        };
        debug!(version = %version, external_linker, location = ?self.task_location, "configured goroutine location");
    }

    /// Override the goroutine location.
    pub fn set_task_location(&mut self, location: TaskLocation)
    {
        self.task_location = location;
    }
}
