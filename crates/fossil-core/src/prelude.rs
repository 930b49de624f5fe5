//! Common module for library exports

pub use crate::binary::{BinaryInfo, LineRow};
pub use crate::error::{FossilError, Result};
pub use crate::memory::{read_exact, read_pointer, MemoryReader, OffsetReaderAt, SplicedMemory};
pub use crate::runtime::{Goroutine, GoroutineStatus};
pub use crate::target::{CoreProcess, Target, Thread};
pub use crate::types::address::Address;
pub use crate::types::process::{Architecture, MemoryRegion, ProcessId, ThreadId};
