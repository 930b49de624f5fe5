//! Linux ELF64 core file loader.
//!
//! A Linux core is an `ET_CORE` ELF file with one `PT_NOTE` segment and one
//! `PT_LOAD` segment per dumped mapping. The notes we consume:
//!
//! | note           | type         | content                                        |
//! |----------------|--------------|------------------------------------------------|
//! | `NT_PRSTATUS`  | 1            | one per thread: pid, pending signal, registers |
//! | `NT_PRPSINFO`  | 3            | process pid and command line                   |
//! | `NT_FILE`      | `0x46494c45` | file-backed mappings (start, end, page offset) |
//! | `NT_ARM_TLS`   | `0x401`      | `tpidr_el0` of the preceding thread (arm64)    |
//!
//! The address space is assembled bottom-up: file mappings of the executable
//! first, then the executable's own `PT_LOAD` segments, then the core's
//! `PT_LOAD` segments on top. Bytes the kernel wrote into the core therefore
//! always win over what the executable says.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use object::elf::{ET_CORE, PT_LOAD, PT_NOTE};
use object::read::elf::{ElfFile64, FileHeader, ProgramHeader};
use object::Endianness;
use tracing::{debug, info, warn};

use super::{Core, ThreadSnapshot};
use crate::error::{FossilError, Result};
use crate::memory::{FileSegment, MemoryReader, OffsetReaderAt};
use crate::types::{
    permissions_from_flags, Address, Architecture, ProcessId, RegionSource, Registers, ThreadId, ARM64_USER_REGS,
    X86_64_USER_REGS,
};

pub const NT_PRSTATUS: u32 = 1;
pub const NT_PRPSINFO: u32 = 3;
pub const NT_FILE: u32 = 0x4649_4c45;
pub const NT_ARM_TLS: u32 = 0x401;

const PRSTATUS_CURSIG: usize = 12;
const PRSTATUS_PID: usize = 32;
const PRSTATUS_REGS: usize = 112;
const PRPSINFO_PID: usize = 24;
const PRPSINFO_PSARGS: usize = 56;
const PRPSINFO_PSARGS_LEN: usize = 80;

/// The executable paired with a core.
#[derive(Debug, Clone)]
pub struct ExecutableImage
{
    /// Path as given by the user; its file name selects which `NT_FILE`
    /// entries the executable backs.
    pub path: Option<String>,
    pub data: Arc<[u8]>,
}

impl ExecutableImage
{
    pub fn new(path: Option<String>, data: Arc<[u8]>) -> Self
    {
        Self { path, data }
    }

    /// Read the executable at `path` into memory.
    pub fn read(path: &Path) -> Result<Self>
    {
        let data = fs::read(path)?;
        Ok(Self::new(Some(path.display().to_string()), Arc::from(data)))
    }

    /// `true` if an `NT_FILE` entry naming `mapped` refers to this executable.
    ///
    /// Without a path every file mapping is attributed to the executable.
    fn backs(&self, mapped: &str) -> bool
    {
        let Some(path) = &self.path else {
            return true;
        };
        file_name(path) == file_name(mapped)
    }
}

fn file_name(path: &str) -> &str
{
    path.rsplit('/').next().unwrap_or(path)
}

/// One entry of an `NT_FILE` note, offsets already converted to bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMapping
{
    pub start: u64,
    pub end: u64,
    pub file_offset: u64,
    pub name: String,
}

/// Open and parse a core file together with its executable.
pub fn read_core(core_path: &Path, exe_path: &Path) -> Result<Core>
{
    let core = fs::read(core_path)?;
    let exe = ExecutableImage::read(exe_path)?;
    info!(core = %core_path.display(), exe = %exe_path.display(), bytes = core.len(), "reading core file");
    parse_core(Arc::from(core), Some(&exe))
}

/// Parse an in-memory core file.
///
/// `exe` supplies the bytes of file mappings the kernel left out of the core
/// (normally the read-only parts of the executable). Without it only the
/// core's own segments are mapped.
pub fn parse_core(data: Arc<[u8]>, exe: Option<&ExecutableImage>) -> Result<Core>
{
    let elf = ElfFile64::<Endianness>::parse(&*data).map_err(|err| FossilError::InvalidCore(err.to_string()))?;
    let endian = elf.endian();
    if endian != Endianness::Little {
        return Err(FossilError::InvalidCore("big-endian cores are not supported".to_string()));
    }
    let header = elf.elf_header();
    if header.e_type(endian) != ET_CORE {
        return Err(FossilError::InvalidCore(format!(
            "ELF type {} is not a core file",
            header.e_type(endian)
        )));
    }
    let architecture = Architecture::from_elf_machine(header.e_machine(endian));
    if !architecture.is_supported() {
        return Err(FossilError::InvalidCore(format!(
            "unsupported machine {}",
            header.e_machine(endian)
        )));
    }

    let notes = collect_notes(&elf, &data, architecture)?;
    let pid = notes
        .pid
        .ok_or_else(|| FossilError::InvalidCore("no process id in NT_PRSTATUS or NT_PRPSINFO".to_string()))?;
    if notes.threads.is_empty() {
        return Err(FossilError::InvalidCore("no NT_PRSTATUS notes".to_string()));
    }

    let mut core = Core::new(ProcessId(pid), architecture);
    core.set_command(notes.command);
    for thread in notes.threads {
        core.add_thread(thread);
    }

    if let Some(exe) = exe {
        map_executable(&mut core, exe, &notes.files, architecture)?;
    } else {
        for mapping in &notes.files {
            core.describe(
                Address::from(mapping.start),
                mapping.end.saturating_sub(mapping.start),
                "r--",
                Some(mapping.name.clone()),
                RegionSource::Missing,
            );
        }
    }

    for ph in elf.elf_program_headers() {
        if ph.p_type(endian) != PT_LOAD {
            continue;
        }
        let filesz = ph.p_filesz(endian);
        if filesz == 0 {
            continue;
        }
        let vaddr = Address::from(ph.p_vaddr(endian));
        let segment = FileSegment::new(Arc::clone(&data), ph.p_offset(endian), filesz);
        let reader: Arc<dyn MemoryReader> = Arc::new(OffsetReaderAt::new(segment, vaddr));
        let name = notes
            .files
            .iter()
            .find(|m| m.start <= vaddr.value() && vaddr.value() < m.end)
            .map(|m| m.name.clone());
        core.map(
            reader,
            vaddr,
            filesz,
            &permissions_from_flags(ph.p_flags(endian)),
            name,
            RegionSource::Core,
        );
    }

    info!(
        pid,
        threads = core.thread_count(),
        regions = core.memory().len(),
        arch = %architecture,
        "core parsed"
    );
    Ok(core)
}

/// File mappings backed by the executable, then the executable's own segments.
fn map_executable(core: &mut Core, exe: &ExecutableImage, files: &[FileMapping], architecture: Architecture) -> Result<()>
{
    for mapping in files {
        let length = mapping.end.saturating_sub(mapping.start);
        if !exe.backs(&mapping.name) {
            debug!(file = %mapping.name, start = mapping.start, "file mapping not backed by the executable");
            core.describe(
                Address::from(mapping.start),
                length,
                "r--",
                Some(mapping.name.clone()),
                RegionSource::Missing,
            );
            continue;
        }
        let Some(base) = mapping.start.checked_sub(mapping.file_offset) else {
            warn!(file = %mapping.name, start = mapping.start, offset = mapping.file_offset, "skipping file mapping below its file offset");
            continue;
        };
        let reader: Arc<dyn MemoryReader> = Arc::new(OffsetReaderAt::new(Arc::clone(&exe.data), Address::from(base)));
        core.map(
            reader,
            Address::from(mapping.start),
            length,
            "r--",
            Some(mapping.name.clone()),
            RegionSource::Executable,
        );
    }

    let elf = ElfFile64::<Endianness>::parse(&*exe.data).map_err(|err| FossilError::InvalidBinary(err.to_string()))?;
    let endian = elf.endian();
    let exe_arch = Architecture::from_elf_machine(elf.elf_header().e_machine(endian));
    if exe_arch != architecture {
        warn!(core = %architecture, exe = %exe_arch, "executable architecture does not match the core");
    }
    for ph in elf.elf_program_headers() {
        if ph.p_type(endian) != PT_LOAD || ph.p_filesz(endian) == 0 {
            continue;
        }
        let vaddr = Address::from(ph.p_vaddr(endian));
        let filesz = ph.p_filesz(endian);
        let segment = FileSegment::new(Arc::clone(&exe.data), ph.p_offset(endian), filesz);
        core.memory.add(Arc::new(OffsetReaderAt::new(segment, vaddr)), vaddr, filesz);
    }
    Ok(())
}

#[derive(Default)]
struct Notes
{
    pid: Option<u32>,
    command: Option<String>,
    threads: Vec<ThreadSnapshot>,
    files: Vec<FileMapping>,
}

fn collect_notes(elf: &ElfFile64<'_, Endianness>, data: &[u8], architecture: Architecture) -> Result<Notes>
{
    let endian = elf.endian();
    let mut notes = Notes::default();
    let mut prpsinfo_pid = None;

    for ph in elf.elf_program_headers() {
        if ph.p_type(endian) != PT_NOTE {
            continue;
        }
        let Some(mut iter) = ph
            .notes(endian, data)
            .map_err(|err| FossilError::InvalidCore(format!("reading PT_NOTE: {err}")))?
        else {
            continue;
        };
        while let Some(note) = iter
            .next()
            .map_err(|err| FossilError::InvalidCore(format!("reading note: {err}")))?
        {
            let desc = note.desc();
            match note.n_type(endian) {
                NT_PRSTATUS => {
                    let (pid, thread) = parse_prstatus(desc, architecture)?;
                    notes.pid.get_or_insert(pid);
                    notes.threads.push(thread);
                }
                NT_PRPSINFO => {
                    prpsinfo_pid = read_u32(desc, PRPSINFO_PID);
                    notes.command = parse_psargs(desc);
                }
                NT_FILE => notes.files = parse_nt_file(desc)?,
                NT_ARM_TLS => {
                    if let (Some(thread), Some(tls)) = (notes.threads.last_mut(), read_u64(desc, 0)) {
                        thread.registers.tls = Address::from(tls);
                    }
                }
                other => debug!(note_type = other, "ignoring core note"),
            }
        }
    }

    // pr_pid of NT_PRSTATUS is a thread id; the first note may be any thread
    if prpsinfo_pid.is_some() {
        notes.pid = prpsinfo_pid;
    }
    Ok(notes)
}

/// Decode an `NT_PRSTATUS` descriptor into `(pid, thread)`.
///
/// The kernel stores the thread id in `pr_pid`. The first note belongs to
/// the thread that received the fatal signal, which need not be the main
/// thread, so its id is only the process id when `NT_PRPSINFO` is missing.
pub fn parse_prstatus(desc: &[u8], architecture: Architecture) -> Result<(u32, ThreadSnapshot)>
{
    let slots = match architecture {
        Architecture::Arm64 => ARM64_USER_REGS,
        _ => X86_64_USER_REGS,
    };
    let pid = read_u32(desc, PRSTATUS_PID).ok_or_else(|| FossilError::InvalidCore("truncated NT_PRSTATUS".to_string()))?;
    let signal = read_u16(desc, PRSTATUS_CURSIG).unwrap_or(0);

    let raw: Vec<u64> = (0..slots)
        .map(|i| read_u64(desc, PRSTATUS_REGS + i * 8))
        .collect::<Option<_>>()
        .ok_or_else(|| FossilError::InvalidCore(format!("NT_PRSTATUS of thread {pid} has a short register area")))?;
    let registers = match architecture {
        Architecture::Arm64 => Registers::from_arm64_user_regs(&raw),
        _ => Registers::from_x86_64_user_regs(&raw),
    }
    .ok_or_else(|| FossilError::InvalidCore("register area too small".to_string()))?;

    let mut thread = ThreadSnapshot::new(ThreadId(u64::from(pid)), registers);
    thread.signal = i32::from(signal);
    Ok((pid, thread))
}

/// Decode an `NT_FILE` descriptor.
///
/// Layout: `count`, `page_size`, `count` triples of `(start, end, page offset)`,
/// then `count` NUL-terminated file names.
pub fn parse_nt_file(desc: &[u8]) -> Result<Vec<FileMapping>>
{
    let truncated = || FossilError::InvalidCore("truncated NT_FILE note".to_string());
    let count = read_u64(desc, 0).ok_or_else(truncated)?;
    let page_size = read_u64(desc, 8).ok_or_else(truncated)?;
    let count = usize::try_from(count).map_err(|_| truncated())?;
    let names_at = count
        .checked_mul(24)
        .and_then(|n| n.checked_add(16))
        .filter(|&n| n <= desc.len())
        .ok_or_else(truncated)?;

    let mut names = desc[names_at..].split(|&b| b == 0);
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let at = 16 + i * 24;
        let start = read_u64(desc, at).ok_or_else(truncated)?;
        let end = read_u64(desc, at + 8).ok_or_else(truncated)?;
        let pages = read_u64(desc, at + 16).ok_or_else(truncated)?;
        let name = names.next().ok_or_else(truncated)?;
        out.push(FileMapping {
            start,
            end,
            file_offset: pages.saturating_mul(page_size),
            name: String::from_utf8_lossy(name).into_owned(),
        });
    }
    Ok(out)
}

fn parse_psargs(desc: &[u8]) -> Option<String>
{
    let args = desc.get(PRPSINFO_PSARGS..PRPSINFO_PSARGS + PRPSINFO_PSARGS_LEN)?;
    let end = args.iter().position(|&b| b == 0).unwrap_or(args.len());
    let text = String::from_utf8_lossy(&args[..end]).trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn read_u16(desc: &[u8], at: usize) -> Option<u16>
{
    desc.get(at..at + 2)?.try_into().ok().map(u16::from_le_bytes)
}

fn read_u32(desc: &[u8], at: usize) -> Option<u32>
{
    desc.get(at..at + 4)?.try_into().ok().map(u32::from_le_bytes)
}

fn read_u64(desc: &[u8], at: usize) -> Option<u64>
{
    desc.get(at..at + 8)?.try_into().ok().map(u64::from_le_bytes)
}
