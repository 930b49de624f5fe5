//! DWARF loading: line tables, producers and runtime struct layouts.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use gimli::{constants, DebuggingInformationEntry, Dwarf, EndianArcSlice, Reader, RunTimeEndian, SectionId, Unit, UnitOffset};
use object::{Object, ObjectSection};

use super::demangle::map_dwarf_error;
use crate::error::{FossilError, Result};
use crate::runtime::TaskLayout;
use crate::types::Address;

pub(crate) type OwnedReader = EndianArcSlice<RunTimeEndian>;
pub(crate) type OwnedDwarf = Dwarf<OwnedReader>;

/// One row of a DWARF line table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRow
{
    pub address: Address,
    pub file: Arc<str>,
    pub line: u32,
    pub is_stmt: bool,
    pub prologue_end: bool,
    /// First address past a sequence; carries no position.
    pub end_sequence: bool,
}

impl LineRow
{
    /// A statement row, the common case for hand-built tables.
    pub fn statement(address: Address, file: &str, line: u32) -> Self
    {
        Self {
            address,
            file: Arc::from(file),
            line,
            is_stmt: true,
            prologue_end: false,
            end_sequence: false,
        }
    }

    /// Marks the end of a sequence at `address`.
    pub fn end_of_sequence(address: Address) -> Self
    {
        Self {
            address,
            file: Arc::from(""),
            line: 0,
            is_stmt: false,
            prologue_end: false,
            end_sequence: true,
        }
    }

    /// Same row with `prologue_end` set.
    #[must_use]
    pub fn with_prologue_end(mut self) -> Self
    {
        self.prologue_end = true;
        self
    }
}

/// Raw `.debug_*` section bytes of an executable.
pub(crate) struct DebugSections
{
    sections: HashMap<&'static str, Arc<[u8]>>,
    endian: RunTimeEndian,
}

const DEBUG_SECTIONS: &[SectionId] = &[
    SectionId::DebugAbbrev,
    SectionId::DebugAddr,
    SectionId::DebugInfo,
    SectionId::DebugLine,
    SectionId::DebugLineStr,
    SectionId::DebugRanges,
    SectionId::DebugRngLists,
    SectionId::DebugStr,
    SectionId::DebugStrOffsets,
    SectionId::DebugTypes,
    SectionId::DebugLoc,
    SectionId::DebugLocLists,
];

impl DebugSections
{
    /// Copy the DWARF sections out of `file`, decompressing `.zdebug`/SHF_COMPRESSED ones.
    pub(crate) fn load(file: &object::File<'_>) -> Result<Self>
    {
        let endian = if file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };

        let mut sections = HashMap::new();
        for id in DEBUG_SECTIONS {
            let name = id.name();
            let Some(section) = file.section_by_name(name) else {
                continue;
            };
            let data = section
                .uncompressed_data()
                .map_err(|err| FossilError::InvalidBinary(format!("failed to read {name}: {err}")))?;
            let data: Arc<[u8]> = match data {
                Cow::Borrowed(bytes) => Arc::from(bytes),
                Cow::Owned(vec) => vec.into(),
            };
            sections.insert(name, data);
        }
        Ok(Self { sections, endian })
    }

    /// `true` when the executable carries no `.debug_info`.
    pub(crate) fn is_empty(&self) -> bool
    {
        !self.sections.contains_key(SectionId::DebugInfo.name())
    }

    fn reader(&self, id: SectionId) -> OwnedReader
    {
        let data = self
            .sections
            .get(id.name())
            .cloned()
            .unwrap_or_else(|| Arc::<[u8]>::from(Vec::new()));
        EndianArcSlice::new(data, self.endian)
    }

    pub(crate) fn dwarf(&self) -> Result<OwnedDwarf>
    {
        Dwarf::load(|id| Ok::<_, gimli::Error>(self.reader(id))).map_err(|err| map_dwarf_error("loading DWARF", err))
    }
}

/// Everything the target needs out of `.debug_info` and `.debug_line`.
#[derive(Debug, Default)]
pub(crate) struct DwarfSummary
{
    pub rows: Vec<LineRow>,
    pub producers: Vec<String>,
    pub task_layout: Option<TaskLayout>,
}

/// Walk every compile unit once.
pub(crate) fn summarize(dwarf: &OwnedDwarf) -> Result<DwarfSummary>
{
    let mut summary = DwarfSummary::default();
    let mut g_members = None;
    let mut gobuf_members = None;

    let mut headers = dwarf.units();
    while let Some(header) = headers
        .next()
        .map_err(|err| map_dwarf_error("reading .debug_info unit header", err))?
    {
        let unit = dwarf
            .unit(header)
            .map_err(|err| map_dwarf_error("parsing compilation unit", err))?;

        if let Some(producer) = unit_producer(dwarf, &unit)? {
            summary.producers.push(producer);
        }
        read_line_rows(dwarf, &unit, &mut summary.rows)?;

        if g_members.is_none() || gobuf_members.is_none() {
            let mut cursor = unit.entries();
            while let Some((_delta, entry)) = cursor.next_dfs().map_err(|err| map_dwarf_error("traversing DIE tree", err))? {
                if entry.tag() != constants::DW_TAG_structure_type {
                    continue;
                }
                let Some(name) = entry_name(dwarf, &unit, entry)? else {
                    continue;
                };
                match name.as_str() {
                    "runtime.g" if g_members.is_none() => {
                        g_members = Some(struct_member_offsets(dwarf, &unit, entry.offset())?);
                    }
                    "runtime.gobuf" if gobuf_members.is_none() => {
                        gobuf_members = Some(struct_member_offsets(dwarf, &unit, entry.offset())?);
                    }
                    _ => {}
                }
            }
        }
    }

    sort_line_rows(&mut summary.rows);
    if let (Some(g), Some(gobuf)) = (&g_members, &gobuf_members) {
        summary.task_layout = TaskLayout::from_members(g, gobuf);
    }
    Ok(summary)
}

/// Order rows by address; at equal addresses an end-of-sequence row comes
/// before the row that starts the next sequence.
pub(crate) fn sort_line_rows(rows: &mut [LineRow])
{
    rows.sort_by_key(|row| (row.address, !row.end_sequence));
}

fn unit_producer(dwarf: &OwnedDwarf, unit: &Unit<OwnedReader>) -> Result<Option<String>>
{
    let mut cursor = unit.entries();
    let Some((_, root)) = cursor.next_dfs().map_err(|err| map_dwarf_error("reading unit root", err))? else {
        return Ok(None);
    };
    let Some(attr) = root
        .attr(constants::DW_AT_producer)
        .map_err(|err| map_dwarf_error("reading DW_AT_producer", err))?
    else {
        return Ok(None);
    };
    attr_to_string(dwarf, unit, attr.value()).map(Some)
}

fn read_line_rows(dwarf: &OwnedDwarf, unit: &Unit<OwnedReader>, out: &mut Vec<LineRow>) -> Result<()>
{
    let Some(program) = unit.line_program.clone() else {
        return Ok(());
    };
    let mut files: HashMap<u64, Arc<str>> = HashMap::new();
    let mut rows = program.rows();
    while let Some((header, row)) = rows
        .next_row()
        .map_err(|err| map_dwarf_error("reading line program", err))?
    {
        let address = Address::from(row.address());
        if row.end_sequence() {
            out.push(LineRow::end_of_sequence(address));
            continue;
        }

        let file = match files.get(&row.file_index()) {
            Some(file) => Arc::clone(file),
            None => {
                let path = match row.file(header) {
                    Some(entry) => {
                        let name = attr_to_string(dwarf, unit, entry.path_name())?;
                        let dir = match entry.directory(header) {
                            Some(dir) => attr_to_string(dwarf, unit, dir)?,
                            None => String::new(),
                        };
                        join_path(&dir, &name)
                    }
                    None => String::new(),
                };
                let path: Arc<str> = Arc::from(path);
                files.insert(row.file_index(), Arc::clone(&path));
                path
            }
        };

        let line = row
            .line()
            .map_or(0, |line| u32::try_from(line.get()).unwrap_or(u32::MAX));
        out.push(LineRow {
            address,
            file,
            line,
            is_stmt: row.is_stmt(),
            prologue_end: row.prologue_end(),
            end_sequence: false,
        });
    }
    Ok(())
}

fn join_path(dir: &str, name: &str) -> String
{
    if dir.is_empty() || name.starts_with('/') {
        name.to_string()
    } else {
        format!("{}/{name}", dir.trim_end_matches('/'))
    }
}

fn struct_member_offsets(dwarf: &OwnedDwarf, unit: &Unit<OwnedReader>, offset: UnitOffset<usize>) -> Result<HashMap<String, u64>>
{
    let mut members = HashMap::new();
    let mut tree = unit
        .entries_tree(Some(offset))
        .map_err(|err| map_dwarf_error("building struct tree", err))?;
    let root = tree.root().map_err(|err| map_dwarf_error("navigating struct root", err))?;
    let mut children = root.children();
    while let Some(child) = children
        .next()
        .map_err(|err| map_dwarf_error("iterating struct children", err))?
    {
        let entry = child.entry();
        if entry.tag() != constants::DW_TAG_member {
            continue;
        }
        let Some(name) = entry_name(dwarf, unit, entry)? else {
            continue;
        };
        let location = entry
            .attr(constants::DW_AT_data_member_location)
            .map_err(|err| map_dwarf_error("reading DW_AT_data_member_location", err))?
            .and_then(|attr| attr.udata_value());
        if let Some(location) = location {
            members.insert(name, location);
        }
    }
    Ok(members)
}

fn entry_name(
    dwarf: &OwnedDwarf,
    unit: &Unit<OwnedReader>,
    entry: &DebuggingInformationEntry<'_, '_, OwnedReader>,
) -> Result<Option<String>>
{
    let Some(attr) = entry
        .attr(constants::DW_AT_name)
        .map_err(|err| map_dwarf_error("reading DW_AT_name", err))?
    else {
        return Ok(None);
    };
    attr_to_string(dwarf, unit, attr.value()).map(Some)
}

fn attr_to_string(dwarf: &OwnedDwarf, unit: &Unit<OwnedReader>, value: gimli::AttributeValue<OwnedReader>) -> Result<String>
{
    let reader = dwarf
        .attr_string(unit, value)
        .map_err(|err| map_dwarf_error("resolving DWARF string", err))?;
    let text = reader
        .to_string_lossy()
        .map_err(|err| map_dwarf_error("decoding DWARF string", err))?;
    Ok(text.into_owned())
}
