//! # Fossil Utilities
//!
//! Logging bootstrap shared by the Fossil binaries.
//!
//! Libraries only emit `tracing` events; a binary calls one of the `init_*`
//! functions once at startup to decide where they go.

pub mod logging;

pub use logging::{init_logging, init_logging_with_level, LogFormat, LogLevel, LoggingError, LoggingGuard};
pub use tracing::{debug, error, info, trace, warn};
