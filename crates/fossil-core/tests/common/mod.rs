//! Shared fixtures: a tiny ELF64 writer and an in-memory Go process.

#![allow(dead_code)]

use std::sync::Arc;

use fossil_core::binary::{BinaryInfo, LineRow};
use fossil_core::dump::{Core, ThreadSnapshot};
use fossil_core::memory::OffsetReaderAt;
use fossil_core::runtime::TaskLayout;
use fossil_core::types::{Address, Architecture, ProcessId, RegionSource, Registers, ThreadId};

pub const ET_EXEC: u16 = 2;
pub const ET_CORE: u16 = 4;
pub const EM_X86_64: u16 = 62;
pub const EM_AARCH64: u16 = 183;

pub const NT_PRSTATUS: u32 = 1;
pub const NT_PRPSINFO: u32 = 3;
pub const NT_FILE: u32 = 0x4649_4c45;

pub const PF_X: u32 = 1;
pub const PF_W: u32 = 2;
pub const PF_R: u32 = 4;

const EHDR_SIZE: usize = 64;
const PHDR_SIZE: usize = 56;
const SHDR_SIZE: usize = 64;
const SYM_SIZE: usize = 24;
const PAGE: usize = 0x1000;

const PT_LOAD: u32 = 1;
const PT_NOTE: u32 = 4;
const SHT_PROGBITS: u32 = 1;
const SHT_SYMTAB: u32 = 2;
const SHT_STRTAB: u32 = 3;
const STT_OBJECT: u8 = 1;
const STT_FUNC: u8 = 2;
const STB_GLOBAL: u8 = 1;

struct Segment
{
    vaddr: u64,
    flags: u32,
    data: Vec<u8>,
}

struct Symbol
{
    name: String,
    value: u64,
    size: u64,
    function: bool,
}

/// Builder for small little-endian ELF64 files (cores and executables).
///
/// Segment data is placed so that `file offset % page == vaddr % page`, and
/// the first segment of an executable starts at file offset `0x1000`.
pub struct ElfImage
{
    e_type: u16,
    machine: u16,
    notes: Vec<u8>,
    segments: Vec<Segment>,
    symbols: Vec<Symbol>,
}

impl ElfImage
{
    pub fn core(machine: u16) -> Self
    {
        Self::new(ET_CORE, machine)
    }

    pub fn executable(machine: u16) -> Self
    {
        Self::new(ET_EXEC, machine)
    }

    fn new(e_type: u16, machine: u16) -> Self
    {
        Self {
            e_type,
            machine,
            notes: Vec::new(),
            segments: Vec::new(),
            symbols: Vec::new(),
        }
    }

    pub fn note(mut self, note_type: u32, desc: &[u8]) -> Self
    {
        let name = b"CORE\0";
        self.notes.extend_from_slice(&(name.len() as u32).to_le_bytes());
        self.notes.extend_from_slice(&(desc.len() as u32).to_le_bytes());
        self.notes.extend_from_slice(&note_type.to_le_bytes());
        self.notes.extend_from_slice(name);
        pad_to(&mut self.notes, 4);
        self.notes.extend_from_slice(desc);
        pad_to(&mut self.notes, 4);
        self
    }

    pub fn segment(mut self, vaddr: u64, flags: u32, data: Vec<u8>) -> Self
    {
        self.segments.push(Segment { vaddr, flags, data });
        self
    }

    pub fn function(mut self, name: &str, value: u64, size: u64) -> Self
    {
        self.symbols.push(Symbol {
            name: name.to_string(),
            value,
            size,
            function: true,
        });
        self
    }

    pub fn object(mut self, name: &str, value: u64, size: u64) -> Self
    {
        self.symbols.push(Symbol {
            name: name.to_string(),
            value,
            size,
            function: false,
        });
        self
    }

    pub fn build(&self) -> Vec<u8>
    {
        let phnum = self.segments.len() + usize::from(!self.notes.is_empty());
        let mut out = vec![0u8; EHDR_SIZE + phnum * PHDR_SIZE];

        let notes_offset = out.len();
        out.extend_from_slice(&self.notes);

        let mut placed = Vec::new();
        for segment in &self.segments {
            let page_offset = (segment.vaddr as usize) % PAGE;
            let offset = align_up(out.len(), PAGE) + page_offset;
            out.resize(offset, 0);
            out.extend_from_slice(&segment.data);
            placed.push(offset);
        }

        let mut phdrs = Vec::new();
        if !self.notes.is_empty() {
            phdrs.extend(phdr(PT_NOTE, 0, notes_offset as u64, 0, self.notes.len() as u64, 4));
        }
        for (segment, offset) in self.segments.iter().zip(&placed) {
            let len = segment.data.len() as u64;
            phdrs.extend(phdr(PT_LOAD, segment.flags, *offset as u64, segment.vaddr, len, PAGE as u64));
        }
        out[EHDR_SIZE..EHDR_SIZE + phdrs.len()].copy_from_slice(&phdrs);

        let (shoff, shnum, shstrndx) = if self.symbols.is_empty() {
            (0, 0, 0)
        } else {
            self.write_sections(&mut out, &placed)
        };

        let mut header = vec![0u8; EHDR_SIZE];
        header[0..4].copy_from_slice(b"\x7fELF");
        header[4] = 2; // ELFCLASS64
        header[5] = 1; // ELFDATA2LSB
        header[6] = 1; // EV_CURRENT
        header[16..18].copy_from_slice(&self.e_type.to_le_bytes());
        header[18..20].copy_from_slice(&self.machine.to_le_bytes());
        header[20..24].copy_from_slice(&1u32.to_le_bytes());
        header[32..40].copy_from_slice(&(EHDR_SIZE as u64).to_le_bytes());
        header[40..48].copy_from_slice(&shoff.to_le_bytes());
        header[52..54].copy_from_slice(&(EHDR_SIZE as u16).to_le_bytes());
        header[54..56].copy_from_slice(&(PHDR_SIZE as u16).to_le_bytes());
        header[56..58].copy_from_slice(&(phnum as u16).to_le_bytes());
        header[58..60].copy_from_slice(&(SHDR_SIZE as u16).to_le_bytes());
        header[60..62].copy_from_slice(&shnum.to_le_bytes());
        header[62..64].copy_from_slice(&shstrndx.to_le_bytes());
        out[..EHDR_SIZE].copy_from_slice(&header);
        out
    }

    /// Append `.text`, `.symtab`, `.strtab`, `.shstrtab` and the section
    /// header table. Returns `(e_shoff, e_shnum, e_shstrndx)`.
    fn write_sections(&self, out: &mut Vec<u8>, placed: &[usize]) -> (u64, u16, u16)
    {
        let mut strtab = vec![0u8];
        let mut symtab = vec![0u8; SYM_SIZE];
        for symbol in &self.symbols {
            let name = strtab.len() as u32;
            strtab.extend_from_slice(symbol.name.as_bytes());
            strtab.push(0);

            let kind = if symbol.function { STT_FUNC } else { STT_OBJECT };
            let mut entry = vec![0u8; SYM_SIZE];
            entry[0..4].copy_from_slice(&name.to_le_bytes());
            entry[4] = (STB_GLOBAL << 4) | kind;
            entry[6..8].copy_from_slice(&1u16.to_le_bytes());
            entry[8..16].copy_from_slice(&symbol.value.to_le_bytes());
            entry[16..24].copy_from_slice(&symbol.size.to_le_bytes());
            symtab.extend_from_slice(&entry);
        }
        let shstrtab = b"\0.text\0.symtab\0.strtab\0.shstrtab\0".to_vec();

        pad_to(out, 8);
        let symtab_offset = out.len();
        out.extend_from_slice(&symtab);
        let strtab_offset = out.len();
        out.extend_from_slice(&strtab);
        let shstrtab_offset = out.len();
        out.extend_from_slice(&shstrtab);
        pad_to(out, 8);
        let shoff = out.len();

        let (text_addr, text_offset, text_size) = match (self.segments.first(), placed.first()) {
            (Some(segment), Some(offset)) => (segment.vaddr, *offset as u64, segment.data.len() as u64),
            _ => (0, 0, 0),
        };
        out.extend(vec![0u8; SHDR_SIZE]);
        out.extend(shdr(1, SHT_PROGBITS, 0x6, text_addr, text_offset, text_size, 0, 0, 0));
        out.extend(shdr(
            7,
            SHT_SYMTAB,
            0,
            0,
            symtab_offset as u64,
            symtab.len() as u64,
            3,
            1,
            SYM_SIZE as u64,
        ));
        out.extend(shdr(15, SHT_STRTAB, 0, 0, strtab_offset as u64, strtab.len() as u64, 0, 0, 0));
        out.extend(shdr(23, SHT_STRTAB, 0, 0, shstrtab_offset as u64, shstrtab.len() as u64, 0, 0, 0));
        (shoff as u64, 5, 4)
    }
}

fn phdr(p_type: u32, flags: u32, offset: u64, vaddr: u64, filesz: u64, align: u64) -> Vec<u8>
{
    let mut out = vec![0u8; PHDR_SIZE];
    out[0..4].copy_from_slice(&p_type.to_le_bytes());
    out[4..8].copy_from_slice(&flags.to_le_bytes());
    out[8..16].copy_from_slice(&offset.to_le_bytes());
    out[16..24].copy_from_slice(&vaddr.to_le_bytes());
    out[24..32].copy_from_slice(&vaddr.to_le_bytes());
    out[32..40].copy_from_slice(&filesz.to_le_bytes());
    out[40..48].copy_from_slice(&filesz.to_le_bytes());
    out[48..56].copy_from_slice(&align.to_le_bytes());
    out
}

#[allow(clippy::too_many_arguments)]
fn shdr(name: u32, sh_type: u32, flags: u64, addr: u64, offset: u64, size: u64, link: u32, info: u32, entsize: u64) -> Vec<u8>
{
    let mut out = vec![0u8; SHDR_SIZE];
    out[0..4].copy_from_slice(&name.to_le_bytes());
    out[4..8].copy_from_slice(&sh_type.to_le_bytes());
    out[8..16].copy_from_slice(&flags.to_le_bytes());
    out[16..24].copy_from_slice(&addr.to_le_bytes());
    out[24..32].copy_from_slice(&offset.to_le_bytes());
    out[32..40].copy_from_slice(&size.to_le_bytes());
    out[40..44].copy_from_slice(&link.to_le_bytes());
    out[44..48].copy_from_slice(&info.to_le_bytes());
    out[48..56].copy_from_slice(&8u64.to_le_bytes());
    out[56..64].copy_from_slice(&entsize.to_le_bytes());
    out
}

fn align_up(n: usize, align: usize) -> usize
{
    n.div_ceil(align) * align
}

fn pad_to(buf: &mut Vec<u8>, align: usize)
{
    let len = align_up(buf.len(), align);
    buf.resize(len, 0);
}

/// `NT_PRSTATUS` descriptor for x86-64; `regs` are `(user_regs slot, value)`.
pub fn prstatus_x86_64(tid: u32, signal: u16, regs: &[(usize, u64)]) -> Vec<u8>
{
    let mut desc = vec![0u8; 336];
    desc[0..4].copy_from_slice(&u32::from(signal).to_le_bytes());
    desc[12..14].copy_from_slice(&signal.to_le_bytes());
    desc[32..36].copy_from_slice(&tid.to_le_bytes());
    for (slot, value) in regs {
        let at = 112 + slot * 8;
        desc[at..at + 8].copy_from_slice(&value.to_le_bytes());
    }
    desc
}

/// `NT_PRSTATUS` descriptor for arm64 (`x0`-`x30`, sp, pc, pstate).
pub fn prstatus_arm64(tid: u32, regs: &[(usize, u64)]) -> Vec<u8>
{
    let mut desc = vec![0u8; 392];
    desc[32..36].copy_from_slice(&tid.to_le_bytes());
    for (slot, value) in regs {
        let at = 112 + slot * 8;
        desc[at..at + 8].copy_from_slice(&value.to_le_bytes());
    }
    desc
}

/// `NT_PRPSINFO` descriptor with a pid and command line.
pub fn prpsinfo(pid: u32, args: &str) -> Vec<u8>
{
    let mut desc = vec![0u8; 136];
    desc[24..28].copy_from_slice(&pid.to_le_bytes());
    let len = args.len().min(79);
    desc[56..56 + len].copy_from_slice(&args.as_bytes()[..len]);
    desc
}

/// `NT_FILE` descriptor; entries are `(start, end, file offset in bytes, name)`.
pub fn nt_file(entries: &[(u64, u64, u64, &str)]) -> Vec<u8>
{
    let mut desc = Vec::new();
    desc.extend_from_slice(&(entries.len() as u64).to_le_bytes());
    desc.extend_from_slice(&(PAGE as u64).to_le_bytes());
    for (start, end, offset, _) in entries {
        desc.extend_from_slice(&start.to_le_bytes());
        desc.extend_from_slice(&end.to_le_bytes());
        desc.extend_from_slice(&(offset / PAGE as u64).to_le_bytes());
    }
    for (_, _, _, name) in entries {
        desc.extend_from_slice(name.as_bytes());
        desc.push(0);
    }
    desc
}

/// x86-64 `user_regs_struct` slots.
pub mod slot
{
    pub const RBP: usize = 4;
    pub const RIP: usize = 16;
    pub const RSP: usize = 19;
    pub const FS_BASE: usize = 21;
}

pub const TEXT_BASE: u64 = 0x40_1000;
pub const DATA_BASE: u64 = 0x50_0000;
pub const TLS_BASE: u64 = 0x60_0000;
pub const HEAP_BASE: u64 = 0xc000_0000;

/// Where the Go version string lives inside the data region.
pub const VERSION_AT: u64 = DATA_BASE;
pub const ALLGLEN_AT: u64 = DATA_BASE + 0x10;
pub const ALLGS_AT: u64 = DATA_BASE + 0x20;

/// Byte image of the Go data region: `runtime.buildVersion` (a string
/// header followed by its bytes at `+0x100`).
pub fn data_region(version: &str) -> Vec<u8>
{
    let mut data = vec![0u8; 0x1000];
    put_u64(&mut data, 0, DATA_BASE + 0x100);
    put_u64(&mut data, 8, version.len() as u64);
    data[0x100..0x100 + version.len()].copy_from_slice(version.as_bytes());
    data
}

pub fn put_u64(buf: &mut [u8], at: usize, value: u64)
{
    buf[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

/// Offsets used by [`GoProcess`] for `runtime.g`.
pub const LAYOUT: TaskLayout = TaskLayout {
    goid: 152,
    status: 144,
    sched_pc: 64,
    sched_sp: 56,
    gopc: 280,
    start_pc: 288,
};

const G_STRIDE: u64 = 0x200;

/// One goroutine of a [`GoProcess`].
pub struct FakeGoroutine
{
    pub id: u64,
    pub status: u32,
    pub pc: u64,
    pub sp: u64,
    /// Thread id running it, if any.
    pub thread: Option<u64>,
}

/// One thread of a [`GoProcess`].
pub struct FakeThread
{
    pub id: u64,
    pub pc: u64,
    pub sp: u64,
}

/// Builds a `Core` and `BinaryInfo` describing a Go program on x86-64.
///
/// Goroutine `i` lives at `HEAP_BASE + i * 0x200`; thread `i`'s TLS base is
/// `TLS_BASE + 0x100 * (i + 1)` and the slot at `tls - 8` points at the
/// goroutine it runs (or is zero).
pub struct GoProcess
{
    pub version: String,
    pub goroutines: Vec<FakeGoroutine>,
    pub threads: Vec<FakeThread>,
}

impl GoProcess
{
    /// Three threads; goroutines 1 and 4 run on threads 100 and 101,
    /// goroutine 2 is parked, goroutine 3 is dead, thread 102 runs none.
    pub fn sample() -> Self
    {
        Self {
            version: "go1.21.5".to_string(),
            goroutines: vec![
                FakeGoroutine {
                    id: 1,
                    status: 2,
                    pc: 0x40_1020,
                    sp: 0xc100_0000,
                    thread: Some(100),
                },
                FakeGoroutine {
                    id: 2,
                    status: 4,
                    pc: 0x40_2010,
                    sp: 0xc100_1000,
                    thread: None,
                },
                FakeGoroutine {
                    id: 3,
                    status: 6,
                    pc: 0,
                    sp: 0,
                    thread: None,
                },
                FakeGoroutine {
                    id: 4,
                    status: 3,
                    pc: 0x40_2000,
                    sp: 0xc100_2000,
                    thread: Some(101),
                },
            ],
            threads: vec![
                FakeThread {
                    id: 100,
                    pc: 0x40_1010,
                    sp: 0x7ff0_0000,
                },
                FakeThread {
                    id: 101,
                    pc: 0x40_2008,
                    sp: 0x7ff0_1000,
                },
                FakeThread {
                    id: 102,
                    pc: 0x40_2000,
                    sp: 0x7ff0_2000,
                },
            ],
        }
    }

    pub fn goroutine_address(index: usize) -> u64
    {
        HEAP_BASE + index as u64 * G_STRIDE
    }

    pub fn tls_base(index: usize) -> u64
    {
        TLS_BASE + 0x100 * (index as u64 + 1)
    }

    pub fn core(&self) -> Core
    {
        let mut core = Core::new(ProcessId(100), Architecture::X86_64);

        let mut tls = vec![0u8; 0x1000];
        for (index, thread) in self.threads.iter().enumerate() {
            let mut registers = Registers::new(Architecture::X86_64);
            registers.pc = Address::from(thread.pc);
            registers.sp = Address::from(thread.sp);
            registers.tls = Address::from(Self::tls_base(index));
            core.add_thread(ThreadSnapshot::new(ThreadId(thread.id), registers));

            let running = self.goroutines.iter().position(|g| g.thread == Some(thread.id));
            if let Some(g) = running {
                let slot = (Self::tls_base(index) - 8 - TLS_BASE) as usize;
                put_u64(&mut tls, slot, Self::goroutine_address(g));
            }
        }

        let mut data = data_region(&self.version);
        put_u64(&mut data, (ALLGLEN_AT - DATA_BASE) as usize, self.goroutines.len() as u64);
        put_u64(&mut data, (ALLGS_AT - DATA_BASE) as usize, DATA_BASE + 0x200);
        for index in 0..self.goroutines.len() {
            put_u64(&mut data, 0x200 + index * 8, Self::goroutine_address(index));
        }

        let mut heap = vec![0u8; self.goroutines.len().max(1) * G_STRIDE as usize];
        for (index, g) in self.goroutines.iter().enumerate() {
            let base = index * G_STRIDE as usize;
            put_u64(&mut heap, base + LAYOUT.goid as usize, g.id);
            heap[base + LAYOUT.status as usize..base + LAYOUT.status as usize + 4].copy_from_slice(&g.status.to_le_bytes());
            put_u64(&mut heap, base + LAYOUT.sched_pc as usize, g.pc);
            put_u64(&mut heap, base + LAYOUT.sched_sp as usize, g.sp);
            put_u64(&mut heap, base + LAYOUT.gopc as usize, TEXT_BASE + 0x30);
            put_u64(&mut heap, base + LAYOUT.start_pc as usize, TEXT_BASE);
        }

        map_bytes(&mut core, DATA_BASE, data, "rw-", "data");
        map_bytes(&mut core, TLS_BASE, tls, "rw-", "tls");
        map_bytes(&mut core, HEAP_BASE, heap, "rw-", "heap");
        core
    }

    pub fn binary(&self) -> BinaryInfo
    {
        let mut bin = sample_binary();
        bin.add_symbol("runtime.allglen", Address::from(ALLGLEN_AT));
        bin.add_symbol("runtime.allgs", Address::from(ALLGS_AT));
        bin.set_task_layout(LAYOUT);
        bin
    }
}

/// Splice a byte buffer at `start` as a core-backed region.
pub fn map_bytes(core: &mut Core, start: u64, bytes: Vec<u8>, permissions: &str, name: &str)
{
    let len = bytes.len() as u64;
    core.map(
        Arc::new(OffsetReaderAt::new(bytes, Address::from(start))),
        Address::from(start),
        len,
        permissions,
        Some(name.to_string()),
        RegionSource::Core,
    );
}

/// `main.main` and `runtime.gopark` with a small line table, plus
/// `runtime.buildVersion` at [`VERSION_AT`].
pub fn sample_binary() -> BinaryInfo
{
    let mut bin = BinaryInfo::new(Architecture::X86_64);
    bin.add_function("main.main", Address::from(TEXT_BASE), Address::from(TEXT_BASE + 0x100));
    bin.add_function("runtime.gopark", Address::from(0x40_2000), Address::from(0x40_2100));
    bin.add_symbol("runtime.buildVersion", Address::from(VERSION_AT));
    bin.add_line_rows([
        LineRow::statement(Address::from(TEXT_BASE), "/src/app/main.go", 5),
        LineRow::statement(Address::from(TEXT_BASE + 0x10), "/src/app/main.go", 6).with_prologue_end(),
        LineRow::statement(Address::from(TEXT_BASE + 0x20), "/src/app/main.go", 7),
        LineRow::statement(Address::from(TEXT_BASE + 0x30), "/src/app/main.go", 9),
        LineRow::end_of_sequence(Address::from(TEXT_BASE + 0x100)),
        LineRow::statement(Address::from(0x40_2000), "/usr/local/go/src/runtime/proc.go", 381),
        LineRow::statement(Address::from(0x40_2008), "/usr/local/go/src/runtime/proc.go", 382),
        LineRow::end_of_sequence(Address::from(0x40_2100)),
    ]);
    bin
}
