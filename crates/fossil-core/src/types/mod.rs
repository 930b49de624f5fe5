//! # Types
//!
//! Plain data types shared by the dump loader, the binary reader and the
//! target implementation.
//!
//! Everything here describes the *captured* process: its addresses, threads,
//! registers and mappings at the moment the core was written.

pub mod address;
pub mod process;
pub mod registers;
pub mod symbols;

pub use address::Address;
pub(crate) use process::permissions_from_flags;
pub use process::{Architecture, MemoryRegion, MemoryRegionId, ProcessId, RegionSource, ThreadId};
pub use registers::{Arm64Register, RegisterId, Registers, X86_64Register, ARM64_USER_REGS, X86_64_USER_REGS};
pub use symbols::{Function, Location, SymbolLanguage, SymbolName};
