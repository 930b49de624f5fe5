//! # Configuration
//!
//! Limits applied while reading a core. Every limit guards against garbage in
//! a damaged dump: a corrupted `runtime.allglen` or string header must not
//! make us allocate gigabytes.
//!
//! ## Environment Variables
//!
//! - `FOSSIL_MAX_GOROUTINES`: upper bound on goroutines decoded from `runtime.allgs`
//! - `FOSSIL_MAX_STRING_LEN`: upper bound on Go strings read from the dump
//! - `FOSSIL_SEARCH_CHUNK`: bytes scanned per step by [`crate::search::find_first`]

use std::env;
use std::str::FromStr;

use tracing::warn;

/// Default cap on decoded goroutines.
pub const DEFAULT_MAX_GOROUTINES: usize = 1 << 20;

/// Default cap on Go string lengths.
pub const DEFAULT_MAX_STRING_LEN: usize = 64 * 1024;

/// Default search chunk size.
pub const DEFAULT_SEARCH_CHUNK: usize = 64 * 1024;

/// Limits used by a [`crate::target::CoreProcess`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreConfig
{
    pub max_goroutines: usize,
    pub max_string_len: usize,
    pub search_chunk_size: usize,
}

impl Default for CoreConfig
{
    fn default() -> Self
    {
        Self {
            max_goroutines: DEFAULT_MAX_GOROUTINES,
            max_string_len: DEFAULT_MAX_STRING_LEN,
            search_chunk_size: DEFAULT_SEARCH_CHUNK,
        }
    }
}

impl CoreConfig
{
    /// Defaults overridden by the `FOSSIL_*` environment variables.
    ///
    /// Unparsable or zero values are ignored with a warning.
    #[must_use]
    pub fn from_env() -> Self
    {
        let defaults = Self::default();
        Self {
            max_goroutines: env_limit("FOSSIL_MAX_GOROUTINES", defaults.max_goroutines),
            max_string_len: env_limit("FOSSIL_MAX_STRING_LEN", defaults.max_string_len),
            search_chunk_size: env_limit("FOSSIL_SEARCH_CHUNK", defaults.search_chunk_size),
        }
    }
}

fn env_limit(name: &str, default: usize) -> usize
{
    match env::var(name) {
        Ok(value) => parse_limit(&value).unwrap_or_else(|| {
            warn!(variable = name, value = %value, "ignoring invalid limit");
            default
        }),
        Err(_) => default,
    }
}

fn parse_limit(value: &str) -> Option<usize>
{
    let value = value.trim();
    let parsed = if let Some(hex) = value.strip_prefix("0x") {
        usize::from_str_radix(hex, 16).ok()?
    } else {
        usize::from_str(value).ok()?
    };
    (parsed > 0).then_some(parsed)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_parse_limit()
    {
        assert_eq!(parse_limit("4096"), Some(4096));
        assert_eq!(parse_limit(" 0x100 "), Some(256));
        assert_eq!(parse_limit("0"), None);
        assert_eq!(parse_limit("lots"), None);
    }

    #[test]
    fn test_defaults()
    {
        let config = CoreConfig::default();
        assert_eq!(config.max_string_len, DEFAULT_MAX_STRING_LEN);
        assert!(config.search_chunk_size > 0);
    }
}
