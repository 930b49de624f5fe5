//! # fossil-core
//!
//! Post-mortem debugging primitives for Fossil.
//!
//! This crate turns a Linux core dump of a Go program, plus the executable
//! that produced it, into a read-only debugging target:
//! - Reassembling the address space from core segments and executable
//!   mappings ([`memory::SplicedMemory`])
//! - Thread register snapshots and process metadata ([`dump::Core`])
//! - Symbols, line tables and prologue analysis ([`binary::BinaryInfo`])
//! - Go runtime probing and goroutine enumeration ([`runtime`])
//! - The debugging contract shared with live backends ([`target::Target`])
//!
//! ## Supported Dumps
//!
//! - **ELF64 little-endian** cores written by Linux
//! - **x86-64** and **ARM64** (AArch64)
//!
//! ## Read-Only Semantics
//!
//! A dump cannot be resumed or modified. Operations that would do so return
//! [`FossilError::ReadOnlyTarget`]; lifecycle operations (`halt`, `kill`,
//! `detach`) succeed and do nothing.

pub mod binary;
pub mod breakpoints;
pub mod config;
pub mod dump;
pub mod error;
pub mod memory;
pub mod prelude;
pub mod runtime;
pub mod search;
pub mod target;
pub mod types;

pub use config::CoreConfig;
// Re-export commonly used types
pub use error::{FossilError, Result};
pub use target::{open_target, CoreProcess, Target, Thread};
pub use types::{Address, ProcessId, Registers, ThreadId};
