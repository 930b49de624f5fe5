//! Symbol demangling utilities.
//!
//! Go emits readable linkage names (`main.main`, `net/http.(*Server).Serve`),
//! but a Go executable can link Rust or C++ code through cgo. Names are
//! classified by their mangling pattern:
//!
//! - **Rust**: `_R...` (v0) or `_ZN...` (legacy), demangled with `rustc-demangle`
//! - **C++**: other `_Z...` names (Itanium)
//! - **Go**: dotted names without a leading underscore or dot
//! - **C**: everything else

use rustc_demangle::try_demangle;

use crate::error::FossilError;
use crate::types::{SymbolLanguage, SymbolName};

/// Build a [`SymbolName`] from a raw symbol table entry.
pub(crate) fn make_symbol_name(raw: String) -> SymbolName
{
    let demangled = try_demangle(&raw).ok().map(|d| format!("{d:#}"));
    let language = classify(&raw);
    SymbolName::new(raw, demangled, language)
}

fn classify(raw: &str) -> SymbolLanguage
{
    if raw.starts_with("_R") || (raw.starts_with("_ZN") && try_demangle(raw).is_ok()) {
        SymbolLanguage::Rust
    } else if raw.starts_with("_Z") {
        SymbolLanguage::Cpp
    } else if !raw.starts_with(['_', '.']) && raw.contains('.') {
        SymbolLanguage::Go
    } else if raw.is_empty() {
        SymbolLanguage::Unknown
    } else {
        SymbolLanguage::C
    }
}

/// Map a gimli DWARF error to a [`FossilError`] with context.
pub(crate) fn map_dwarf_error(context: &str, err: gimli::Error) -> FossilError
{
    FossilError::InvalidBinary(format!("{context}: {err}"))
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_go_names()
    {
        let name = make_symbol_name("net/http.(*Server).Serve".to_string());
        assert_eq!(name.language(), SymbolLanguage::Go);
        assert_eq!(name.display_name(), "net/http.(*Server).Serve");
        assert_eq!(classify("main.main"), SymbolLanguage::Go);
    }

    #[test]
    fn test_rust_names_are_demangled()
    {
        let name = make_symbol_name("_ZN4core3fmt5write17h0123456789abcdefE".to_string());
        assert_eq!(name.language(), SymbolLanguage::Rust);
        assert_eq!(name.display_name(), "core::fmt::write");
    }

    #[test]
    fn test_c_names()
    {
        assert_eq!(classify("malloc"), SymbolLanguage::C);
        assert_eq!(classify("_start"), SymbolLanguage::C);
        assert_eq!(classify("_Z3fooi"), SymbolLanguage::Cpp);
    }
}
