//! # Error Types
//!
//! General error handling for the post-mortem debugger.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use thiserror::Error;

use crate::types::Address;

/// Main error type for fossil operations
///
/// This enum represents all the ways opening or querying a core dump can fail.
///
/// ## Error Categories
///
/// 1. **Construction errors**: InvalidCore, InvalidBinary, UnsupportedRuntime, Io
/// 2. **Unsupported operations**: ReadOnlyTarget (writes, breakpoints, execution control)
/// 3. **Lookup errors**: ThreadNotFound, GoroutineNotFound, NoBreakpoint, FunctionNotFound,
///    LineNotFound, SymbolNotFound
/// 4. **Memory errors**: NotMapped, Unmapped, ShortRead, PartialRead
/// 5. **Argument errors**: InvalidArgument
#[derive(Error, Debug)]
pub enum FossilError
{
    /// The core file could not be parsed
    ///
    /// This happens when:
    /// - The file is not an ELF64 image or not of type `ET_CORE`
    /// - A note or program header is truncated
    /// - The core contains no thread status notes
    #[error("Invalid core file: {0}")]
    InvalidCore(String),

    /// The executable paired with the core could not be loaded
    #[error("Invalid executable: {0}")]
    InvalidBinary(String),

    /// The runtime that produced the dump could not be identified
    ///
    /// Goroutine-aware queries need the runtime version and link mode to
    /// locate the goroutine control structure. When `runtime.buildVersion`
    /// is missing or unreadable this error is returned from `open_core`.
    #[error("Unsupported runtime: {0}")]
    UnsupportedRuntime(String),

    /// The operation would mutate a frozen snapshot
    ///
    /// Returned by memory writes, breakpoint insertion, continue and
    /// single-step. Callers can match on this variant (or use
    /// [`FossilError::is_read_only`]) to offer a live debugging session instead.
    #[error("{operation}: target is a read-only core dump")]
    ReadOnlyTarget
    {
        /// Name of the rejected operation
        operation: &'static str,
    },

    /// No thread with this id exists in the snapshot
    #[error("Thread {0} does not exist")]
    ThreadNotFound(u64),

    /// No live goroutine with this id exists in the snapshot
    #[error("Unknown goroutine {0}")]
    GoroutineNotFound(i64),

    /// No breakpoint found at the specified address
    #[error("No breakpoint at address 0x{0:016x}")]
    NoBreakpoint(u64),

    /// The executable does not define a function with this name
    #[error("Could not find function {0}")]
    FunctionNotFound(String),

    /// No statement in the line table belongs to the requested line
    #[error("Could not find {file}:{line}")]
    LineNotFound
    {
        file: String,
        line: u32,
    },

    /// The executable does not define a symbol with this name
    #[error("Could not find symbol {0}")]
    SymbolNotFound(String),

    /// No mapped region contains the requested address
    #[error("Address {0} is not mapped")]
    NotMapped(Address),

    /// A read ran into an unmapped hole after reading part of the buffer
    #[error("Hit unmapped area at {address} after {read} bytes")]
    Unmapped
    {
        /// First address that no region answers
        address: Address,
        /// Bytes copied into the buffer before the hole
        read: usize,
    },

    /// A backing returned fewer bytes than requested
    #[error("Short read at {address}: wanted {requested} bytes, got {read}")]
    ShortRead
    {
        address: Address,
        requested: usize,
        read: usize,
    },

    /// A backing failed after earlier regions already contributed bytes
    #[error("Read failed after {read} bytes: {source}")]
    PartialRead
    {
        read: usize,
        #[source]
        source: Box<FossilError>,
    },

    /// Invalid argument passed to a fossil function
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error (opening the core or executable, reading a backing file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FossilError
{
    /// Shorthand for [`FossilError::ReadOnlyTarget`].
    #[must_use]
    pub const fn read_only(operation: &'static str) -> Self
    {
        Self::ReadOnlyTarget { operation }
    }

    /// `true` if this error rejects a mutation of a frozen target.
    #[must_use]
    pub const fn is_read_only(&self) -> bool
    {
        matches!(self, Self::ReadOnlyTarget { .. })
    }

    /// `true` for lookups of unknown threads, goroutines, breakpoints or symbols.
    #[must_use]
    pub const fn is_not_found(&self) -> bool
    {
        matches!(
            self,
            Self::ThreadNotFound(_)
                | Self::GoroutineNotFound(_)
                | Self::NoBreakpoint(_)
                | Self::FunctionNotFound(_)
                | Self::LineNotFound { .. }
                | Self::SymbolNotFound(_)
        )
    }

    /// Number of bytes that reached the caller's buffer before the failure.
    ///
    /// Any error from a memory read means the read was not precise, even
    /// when this is non-zero.
    #[must_use]
    pub fn bytes_read(&self) -> usize
    {
        match self {
            Self::Unmapped { read, .. } | Self::ShortRead { read, .. } | Self::PartialRead { read, .. } => *read,
            _ => 0,
        }
    }

    /// Attach a partial byte count to an error raised by a backing.
    pub(crate) fn after_partial_read(self, read: usize) -> Self
    {
        if read == 0 {
            return self;
        }
        match self {
            Self::Unmapped { address, read: inner } => Self::Unmapped {
                address,
                read: read + inner,
            },
            other => Self::PartialRead {
                read: read + other.bytes_read(),
                source: Box::new(other),
            },
        }
    }
}

/// Convenience type alias for `Result<T, FossilError>`
///
/// ```rust
/// use fossil_core::error::Result;
/// fn foo() -> Result<()>
/// {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, FossilError>;
