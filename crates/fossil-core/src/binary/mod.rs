//! # Binary Info
//!
//! Symbol, line and architecture metadata of the executable that produced a
//! core.
//!
//! Loaded once with [`BinaryInfo::load`] using `object` for the ELF symbol
//! table, `gimli` for line programs and struct layouts, and `addr2line` for
//! pc to source lookups. All lookups are pure functions of the loaded tables.
//!
//! Tables can also be filled by hand ([`BinaryInfo::new`] plus the `add_*`
//! methods), which is how tests describe a program without compiling one.

pub mod arch;
pub(crate) mod demangle;
pub(crate) mod dwarf;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use addr2line::Context;
use object::{Object, ObjectSymbol, SymbolKind};
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

pub use arch::{Arch, TaskLocation};
pub use dwarf::LineRow;

use self::demangle::make_symbol_name;
use self::dwarf::{DebugSections, OwnedReader};
use crate::error::{FossilError, Result};
use crate::runtime::TaskLayout;
use crate::types::{Address, Architecture, Function, Location};

/// Producer prefix of compile units assembled by the GNU assembler; their
/// presence means the binary went through an external linker.
const EXTERNAL_LINKER_PRODUCER: &str = "GNU AS";

/// Symbol and line tables of an executable
pub struct BinaryInfo
{
    path: Option<PathBuf>,
    arch: Arch,
    functions: Vec<Function>,
    symbols: HashMap<String, Address>,
    rows: Vec<LineRow>,
    producers: Vec<String>,
    task_layout: Option<TaskLayout>,
    sections: Option<DebugSections>,
    context: OnceCell<Option<Mutex<Context<OwnedReader>>>>,
}

impl std::fmt::Debug for BinaryInfo
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("BinaryInfo")
            .field("path", &self.path)
            .field("arch", &self.arch)
            .field("functions", &self.functions.len())
            .field("symbols", &self.symbols.len())
            .field("line_rows", &self.rows.len())
            .field("task_layout", &self.task_layout)
            .finish_non_exhaustive()
    }
}

impl BinaryInfo
{
    /// Empty tables for `architecture`.
    #[must_use]
    pub fn new(architecture: Architecture) -> Self
    {
        Self {
            path: None,
            arch: Arch::new(architecture),
            functions: Vec::new(),
            symbols: HashMap::new(),
            rows: Vec::new(),
            producers: Vec::new(),
            task_layout: None,
            sections: None,
            context: OnceCell::new(),
        }
    }

    /// Read and parse the executable at `path`.
    pub fn load(path: &Path) -> Result<Self>
    {
        let data = fs::read(path)?;
        let mut info = Self::parse(&data)?;
        info.path = Some(path.to_path_buf());
        info!(
            path = %path.display(),
            functions = info.functions.len(),
            line_rows = info.rows.len(),
            "loaded binary info"
        );
        Ok(info)
    }

    /// Parse an in-memory ELF executable.
    pub fn parse(data: &[u8]) -> Result<Self>
    {
        let file = object::File::parse(data).map_err(|err| FossilError::InvalidBinary(err.to_string()))?;
        let architecture = match file.architecture() {
            object::Architecture::X86_64 => Architecture::X86_64,
            object::Architecture::Aarch64 => Architecture::Arm64,
            _ => Architecture::Unknown("unsupported"),
        };
        let mut info = Self::new(architecture);

        let mut text = Vec::new();
        for symbol in file.symbols() {
            if !symbol.is_definition() {
                continue;
            }
            let Ok(name) = symbol.name() else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            let address = Address::from(symbol.address());
            info.symbols.entry(name.to_string()).or_insert(address);
            if symbol.kind() == SymbolKind::Text {
                text.push((name.to_string(), address, symbol.size()));
            }
        }
        info.set_functions(text);

        let sections = DebugSections::load(&file)?;
        if sections.is_empty() {
            warn!("executable has no DWARF information; line lookups will fail");
        } else {
            let dwarf = sections.dwarf()?;
            let summary = dwarf::summarize(&dwarf)?;
            info.rows = summary.rows;
            info.producers = summary.producers;
            info.task_layout = summary.task_layout;
            if info.task_layout.is_none() {
                debug!("runtime.g layout not found in DWARF");
            }
        }
        info.sections = Some(sections);
        Ok(info)
    }

    fn set_functions(&mut self, mut text: Vec<(String, Address, u64)>)
    {
        text.sort_by_key(|(_, address, _)| *address);
        text.dedup_by_key(|(_, address, _)| *address);
        let mut functions = Vec::with_capacity(text.len());
        for (idx, (name, entry, size)) in text.iter().enumerate() {
            let end = if *size > 0 {
                entry.saturating_add(*size)
            } else {
                text.get(idx + 1).map_or(entry.saturating_add(1), |(_, next, _)| *next)
            };
            functions.push(Function {
                name: make_symbol_name(name.clone()),
                entry: *entry,
                end,
            });
        }
        self.functions = functions;
    }

    /// Register a function `[entry, end)`; it is also visible as a symbol.
    pub fn add_function(&mut self, name: &str, entry: Address, end: Address)
    {
        self.symbols.entry(name.to_string()).or_insert(entry);
        let function = Function {
            name: make_symbol_name(name.to_string()),
            entry,
            end,
        };
        let at = self.functions.partition_point(|f| f.entry < entry);
        self.functions.insert(at, function);
    }

    /// Register a data or text symbol.
    pub fn add_symbol(&mut self, name: &str, address: Address)
    {
        self.symbols.insert(name.to_string(), address);
    }

    /// Append line table rows (kept sorted by address).
    pub fn add_line_rows(&mut self, rows: impl IntoIterator<Item = LineRow>)
    {
        self.rows.extend(rows);
        dwarf::sort_line_rows(&mut self.rows);
    }

    /// Record a compile unit producer string.
    pub fn add_producer(&mut self, producer: &str)
    {
        self.producers.push(producer.to_string());
    }

    pub fn set_task_layout(&mut self, layout: TaskLayout)
    {
        self.task_layout = Some(layout);
    }

    /// Path the tables were loaded from.
    #[must_use]
    pub fn path(&self) -> Option<&Path>
    {
        self.path.as_deref()
    }

    #[must_use]
    pub const fn arch(&self) -> &Arch
    {
        &self.arch
    }

    pub fn arch_mut(&mut self) -> &mut Arch
    {
        &mut self.arch
    }

    /// Functions sorted by entry address.
    #[must_use]
    pub fn functions(&self) -> &[Function]
    {
        &self.functions
    }

    #[must_use]
    pub fn line_rows(&self) -> &[LineRow]
    {
        &self.rows
    }

    /// `DW_AT_producer` of every compile unit.
    #[must_use]
    pub fn producers(&self) -> &[String]
    {
        &self.producers
    }

    #[must_use]
    pub const fn task_layout(&self) -> Option<&TaskLayout>
    {
        self.task_layout.as_ref()
    }

    /// `true` if any compile unit was produced by the GNU assembler.
    #[must_use]
    pub fn is_externally_linked(&self) -> bool
    {
        self.producers
            .iter()
            .any(|producer| producer.starts_with(EXTERNAL_LINKER_PRODUCER))
    }

    /// Function named exactly `name`.
    #[must_use]
    pub fn lookup_function(&self, name: &str) -> Option<&Function>
    {
        self.functions.iter().find(|f| f.name() == name)
    }

    /// Function whose range contains `pc`.
    #[must_use]
    pub fn function_at(&self, pc: Address) -> Option<&Function>
    {
        let idx = self.functions.partition_point(|f| f.entry <= pc);
        idx.checked_sub(1)
            .and_then(|idx| self.functions.get(idx))
            .filter(|f| f.contains(pc))
    }

    /// Address of the symbol `name`.
    pub fn symbol_address(&self, name: &str) -> Result<Address>
    {
        self.symbols
            .get(name)
            .copied()
            .ok_or_else(|| FossilError::SymbolNotFound(name.to_string()))
    }

    fn symbol_context(&self) -> Option<&Mutex<Context<OwnedReader>>>
    {
        self.context
            .get_or_init(|| {
                let sections = self.sections.as_ref().filter(|s| !s.is_empty())?;
                let dwarf = sections
                    .dwarf()
                    .map_err(|err| warn!(error = %err, "failed to load DWARF for addr2line"))
                    .ok()?;
                Context::from_dwarf(dwarf)
                    .map_err(|err| warn!(error = %err, "failed to build addr2line context"))
                    .ok()
                    .map(Mutex::new)
            })
            .as_ref()
    }

    fn row_for(&self, pc: Address) -> Option<&LineRow>
    {
        let idx = self.rows.partition_point(|row| row.address <= pc);
        let row = self.rows.get(idx.checked_sub(1)?)?;
        (!row.end_sequence).then_some(row)
    }

    /// Source file, line and function of `pc`.
    #[must_use]
    pub fn pc_to_line(&self, pc: Address) -> (Option<String>, Option<u32>, Option<Function>)
    {
        let function = self.function_at(pc).cloned();

        if let Some(context) = self.symbol_context() {
            if let Ok(ctx) = context.lock() {
                if let Ok(Some(location)) = ctx.find_location(pc.value()) {
                    if let Some(file) = location.file {
                        return (Some(file.to_string()), location.line, function);
                    }
                }
            }
        }

        match self.row_for(pc) {
            Some(row) => (Some(row.file.to_string()), Some(row.line), function),
            None => (None, None, function),
        }
    }

    /// [`pc_to_line`](Self::pc_to_line) packed into a [`Location`].
    #[must_use]
    pub fn location(&self, pc: Address) -> Location
    {
        let (file, line, function) = self.pc_to_line(pc);
        Location {
            pc,
            file,
            line,
            function,
        }
    }

    /// Lowest statement address of `file:line`.
    ///
    /// `file` matches a line table path that is equal to it or ends with
    /// `/file`.
    pub fn line_to_pc(&self, file: &str, line: u32) -> Result<(Address, Option<Function>)>
    {
        let suffix = format!("/{}", file.trim_start_matches('/'));
        let pc = self
            .rows
            .iter()
            .filter(|row| !row.end_sequence && row.is_stmt && row.line == line)
            .filter(|row| &*row.file == file || row.file.ends_with(&suffix))
            .map(|row| row.address)
            .min()
            .ok_or_else(|| FossilError::LineNotFound {
                file: file.to_string(),
                line,
            })?;
        Ok((pc, self.function_at(pc).cloned()))
    }

    /// First address of `function` past its prologue.
    ///
    /// The first row flagged `prologue_end` wins; otherwise the first row on a
    /// different line than the entry; otherwise the entry itself. With
    /// `same_line`, a result on another line than the entry yields the entry.
    pub fn first_pc_after_prologue(&self, function: &Function, same_line: bool) -> Result<Address>
    {
        let start = self.rows.partition_point(|row| row.address < function.entry);
        let rows: Vec<&LineRow> = self.rows[start..]
            .iter()
            .take_while(|row| row.address < function.end)
            .filter(|row| !row.end_sequence)
            .collect();

        let entry_line = self.pc_to_line(function.entry).1;
        let pc = rows
            .iter()
            .find(|row| row.prologue_end)
            .or_else(|| rows.iter().find(|row| row.line != 0 && Some(row.line) != entry_line))
            .map_or(function.entry, |row| row.address);

        if same_line && self.pc_to_line(pc).1 != entry_line {
            return Ok(function.entry);
        }
        Ok(pc)
    }

    /// Address to stop at for `file:line`.
    pub fn find_file_location(&self, file: &str, line: u32) -> Result<Address>
    {
        let (pc, function) = self.line_to_pc(file, line)?;
        match function {
            Some(function) if function.entry == pc => self.first_pc_after_prologue(&function, true),
            _ => Ok(pc),
        }
    }

    /// Address to stop at for a function.
    ///
    /// - `first_line`: the first pc after the prologue
    /// - `line_offset > 0`: the address of the line `line_offset` lines after
    ///   the entry's, in the entry's file
    /// - otherwise: the entry
    pub fn find_function_location(&self, name: &str, first_line: bool, line_offset: u32) -> Result<Address>
    {
        let function = self
            .lookup_function(name)
            .ok_or_else(|| FossilError::FunctionNotFound(name.to_string()))?;

        if first_line {
            return self.first_pc_after_prologue(function, false);
        }
        if line_offset > 0 {
            let (file, line, _) = self.pc_to_line(function.entry);
            let (Some(file), Some(line)) = (file, line) else {
                return Err(FossilError::LineNotFound {
                    file: name.to_string(),
                    line: line_offset,
                });
            };
            return self.line_to_pc(&file, line.saturating_add(line_offset)).map(|(pc, _)| pc);
        }
        Ok(function.entry)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn sample() -> BinaryInfo
    {
        let mut bin = BinaryInfo::new(Architecture::X86_64);
        bin.add_function("main.main", Address::from(0x1000), Address::from(0x1100));
        bin.add_function("main.helper", Address::from(0x1100), Address::from(0x1200));
        bin.add_line_rows([
            LineRow::statement(Address::from(0x1000), "/src/app/main.go", 10),
            LineRow::statement(Address::from(0x1008), "/src/app/main.go", 10).with_prologue_end(),
            LineRow::statement(Address::from(0x1010), "/src/app/main.go", 11),
            LineRow::statement(Address::from(0x1020), "/src/app/main.go", 12),
            LineRow::statement(Address::from(0x1100), "/src/app/main.go", 20),
            LineRow::statement(Address::from(0x1110), "/src/app/main.go", 21),
            LineRow::end_of_sequence(Address::from(0x1200)),
        ]);
        bin
    }

    #[test]
    fn test_pc_to_line()
    {
        let bin = sample();
        let (file, line, function) = bin.pc_to_line(Address::from(0x1014));
        assert_eq!(file.as_deref(), Some("/src/app/main.go"));
        assert_eq!(line, Some(11));
        assert_eq!(function.map(|f| f.name().to_string()), Some("main.main".to_string()));

        let (file, line, function) = bin.pc_to_line(Address::from(0x1200));
        assert!(file.is_none() && line.is_none() && function.is_none());
    }

    #[test]
    fn test_line_to_pc_matches_suffix()
    {
        let bin = sample();
        let (pc, function) = bin.line_to_pc("main.go", 11).unwrap();
        assert_eq!(pc.value(), 0x1010);
        assert_eq!(function.unwrap().name(), "main.main");
        assert!(bin.line_to_pc("ain.go", 11).is_err());
        assert!(matches!(
            bin.line_to_pc("main.go", 99),
            Err(FossilError::LineNotFound { line: 99, .. })
        ));
    }

    #[test]
    fn test_prologue_end_wins()
    {
        let bin = sample();
        let main = bin.lookup_function("main.main").unwrap().clone();
        assert_eq!(bin.first_pc_after_prologue(&main, false).unwrap().value(), 0x1008);
        assert_eq!(bin.first_pc_after_prologue(&main, true).unwrap().value(), 0x1008);
    }

    #[test]
    fn test_prologue_falls_back_to_next_line()
    {
        let bin = sample();
        let helper = bin.lookup_function("main.helper").unwrap().clone();
        assert_eq!(bin.first_pc_after_prologue(&helper, false).unwrap().value(), 0x1110);
        assert_eq!(bin.first_pc_after_prologue(&helper, true).unwrap().value(), 0x1100);
    }

    #[test]
    fn test_find_file_location_skips_prologue()
    {
        let bin = sample();
        assert_eq!(bin.find_file_location("main.go", 10).unwrap().value(), 0x1008);
        assert_eq!(bin.find_file_location("main.go", 12).unwrap().value(), 0x1020);
    }

    #[test]
    fn test_find_function_location()
    {
        let bin = sample();
        assert_eq!(bin.find_function_location("main.main", false, 0).unwrap().value(), 0x1000);
        assert_eq!(bin.find_function_location("main.main", true, 0).unwrap().value(), 0x1008);
        assert_eq!(bin.find_function_location("main.main", false, 2).unwrap().value(), 0x1020);
        assert!(matches!(
            bin.find_function_location("main.missing", false, 0),
            Err(FossilError::FunctionNotFound(_))
        ));
    }

    #[test]
    fn test_symbols_and_linker()
    {
        let mut bin = sample();
        bin.add_symbol("runtime.buildVersion", Address::from(0x5000));
        assert_eq!(bin.symbol_address("runtime.buildVersion").unwrap().value(), 0x5000);
        assert_eq!(bin.symbol_address("main.main").unwrap().value(), 0x1000);
        assert!(matches!(bin.symbol_address("nope"), Err(FossilError::SymbolNotFound(_))));

        assert!(!bin.is_externally_linked());
        bin.add_producer("GNU AS 2.38");
        assert!(bin.is_externally_linked());
    }
}
