//! Symbol, function and source location types.

use std::fmt;

use super::Address;

/// Programming language a symbol was emitted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolLanguage
{
    /// Go symbol (`package.Func`, `package.(*T).Method`).
    Go,
    /// Rust symbol (legacy or v0 mangling).
    Rust,
    /// C++ symbol (Itanium mangling without Rust extensions).
    Cpp,
    /// C symbol or unmangled global.
    C,
    Unknown,
}

impl fmt::Display for SymbolLanguage
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            Self::Go => "go",
            Self::Rust => "rust",
            Self::Cpp => "c++",
            Self::C => "c",
            Self::Unknown => "unknown",
        };
        write!(f, "{label}")
    }
}

/// A symbol name with demangling metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolName
{
    raw: String,
    demangled: Option<String>,
    language: SymbolLanguage,
}

impl SymbolName
{
    pub fn new(raw: String, demangled: Option<String>, language: SymbolLanguage) -> Self
    {
        Self {
            raw,
            demangled,
            language,
        }
    }

    /// Name exactly as it appears in the symbol table.
    pub fn raw(&self) -> &str
    {
        &self.raw
    }

    pub fn demangled(&self) -> Option<&str>
    {
        self.demangled.as_deref()
    }

    /// Demangled name, falling back to the raw one.
    pub fn display_name(&self) -> &str
    {
        self.demangled.as_deref().unwrap_or(&self.raw)
    }

    pub fn language(&self) -> SymbolLanguage
    {
        self.language
    }
}

impl fmt::Display for SymbolName
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.display_name())
    }
}

/// A function of the executable
///
/// `entry` is the address of the first instruction, `end` the first address
/// past the function. Functions are compared by name and range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function
{
    pub name: SymbolName,
    pub entry: Address,
    pub end: Address,
}

impl Function
{
    /// `true` if `pc` lies in `[entry, end)`.
    #[must_use]
    pub fn contains(&self, pc: Address) -> bool
    {
        pc >= self.entry && pc < self.end
    }

    /// Raw symbol name; the key used by `lookup_function`.
    #[must_use]
    pub fn name(&self) -> &str
    {
        self.name.raw()
    }
}

impl fmt::Display for Function
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.name)
    }
}

/// Resolved source position of a program counter
///
/// Any of `file`, `line` and `function` may be missing when the executable
/// lacks debug information for `pc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location
{
    pub pc: Address,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub function: Option<Function>,
}

impl Location
{
    /// Location carrying only a program counter.
    #[must_use]
    pub const fn unknown(pc: Address) -> Self
    {
        Self {
            pc,
            file: None,
            line: None,
            function: None,
        }
    }
}

impl fmt::Display for Location
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.pc)?;
        if let Some(function) = &self.function {
            write!(f, " in {function}")?;
        }
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, " at {file}:{line}"),
            (Some(file), None) => write!(f, " at {file}"),
            _ => Ok(()),
        }
    }
}
