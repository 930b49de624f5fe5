//! CPU register snapshots.

use super::{Address, Architecture};

/// Identifier for a specific CPU register
///
/// The common registers (`Pc`, `Sp`, `Fp`, `Status`, `Tls`) exist on every
/// supported architecture; the general-purpose registers are reached through
/// the architecture-specific variants.
///
/// ```rust
/// use fossil_core::types::{Arm64Register, RegisterId, X86_64Register};
///
/// let pc = RegisterId::Pc;
/// let g = RegisterId::Arm64(Arm64Register::X(28));
/// let rax = RegisterId::X86_64(X86_64Register::Rax);
/// # let _ = (pc, g, rax);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterId
{
    /// Program counter (`rip` / `pc`)
    Pc,
    /// Stack pointer (`rsp` / `sp`)
    Sp,
    /// Frame pointer (`rbp` / `x29`)
    Fp,
    /// Flags (`eflags` / `pstate`)
    Status,
    /// Thread-local storage base (`fs_base` / `tpidr_el0`)
    Tls,
    /// ARM64 general-purpose register `x0`-`x30`
    Arm64(Arm64Register),
    /// x86-64 general-purpose register
    X86_64(X86_64Register),
}

/// ARM64 general-purpose register `x<n>`, `n` in `0..=30`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arm64Register
{
    X(u8),
}

/// x86-64 general-purpose registers, in `Registers::general` order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum X86_64Register
{
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
}

const X86_64_NAMES: [&str; 14] = [
    "rax", "rbx", "rcx", "rdx", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12", "r13", "r14", "r15",
];

impl X86_64Register
{
    const fn index(self) -> usize
    {
        match self {
            Self::Rax => 0,
            Self::Rbx => 1,
            Self::Rcx => 2,
            Self::Rdx => 3,
            Self::Rsi => 4,
            Self::Rdi => 5,
            Self::R8 => 6,
            Self::R9 => 7,
            Self::R10 => 8,
            Self::R11 => 9,
            Self::R12 => 10,
            Self::R13 => 11,
            Self::R14 => 12,
            Self::R15 => 13,
        }
    }
}

/// Number of `u64` slots in the x86-64 `user_regs_struct` of `NT_PRSTATUS`.
pub const X86_64_USER_REGS: usize = 27;

/// Number of `u64` slots in the ARM64 `user_pt_regs` of `NT_PRSTATUS`.
pub const ARM64_USER_REGS: usize = 34;

/// Register file of one thread at the moment of the dump
///
/// Built from the `pr_reg` area of a thread's `NT_PRSTATUS` note. Registers
/// are frozen; there is no setter beyond construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registers
{
    /// Program counter
    pub pc: Address,
    /// Stack pointer
    pub sp: Address,
    /// Frame pointer
    pub fp: Address,
    /// Flags register
    pub status: u64,
    /// Thread-local storage base
    ///
    /// `fs_base` on x86-64. On ARM64 this comes from the optional `NT_ARM_TLS`
    /// note and is zero when the core does not carry one.
    pub tls: Address,
    /// General-purpose registers
    ///
    /// - **ARM64**: `x0`-`x30` (31 registers)
    /// - **x86-64**: `rax, rbx, rcx, rdx, rsi, rdi, r8`-`r15` (14 registers)
    pub general: Vec<u64>,
    architecture: Architecture,
}

impl Registers
{
    /// All-zero register file for `architecture`.
    #[must_use]
    pub fn new(architecture: Architecture) -> Self
    {
        let count = match architecture {
            Architecture::Arm64 => 31,
            Architecture::X86_64 => X86_64_NAMES.len(),
            Architecture::Unknown(_) => 0,
        };
        Self {
            pc: Address::ZERO,
            sp: Address::ZERO,
            fp: Address::ZERO,
            status: 0,
            tls: Address::ZERO,
            general: vec![0; count],
            architecture,
        }
    }

    /// Decode an x86-64 `user_regs_struct`.
    ///
    /// Slot order: `r15 r14 r13 r12 rbp rbx r11 r10 r9 r8 rax rcx rdx rsi rdi
    /// orig_rax rip cs eflags rsp ss fs_base gs_base ds es fs gs`. Returns
    /// `None` when fewer than [`X86_64_USER_REGS`] slots are supplied.
    #[must_use]
    pub fn from_x86_64_user_regs(raw: &[u64]) -> Option<Self>
    {
        if raw.len() < X86_64_USER_REGS {
            return None;
        }
        let general = vec![
            raw[10], raw[5], raw[11], raw[12], raw[13], raw[14], raw[9], raw[8], raw[7], raw[6], raw[3], raw[2], raw[1],
            raw[0],
        ];
        Some(Self {
            pc: Address::from(raw[16]),
            sp: Address::from(raw[19]),
            fp: Address::from(raw[4]),
            status: raw[18],
            tls: Address::from(raw[21]),
            general,
            architecture: Architecture::X86_64,
        })
    }

    /// Decode an ARM64 `user_pt_regs` (`x0`-`x30`, `sp`, `pc`, `pstate`).
    ///
    /// Returns `None` when fewer than [`ARM64_USER_REGS`] slots are supplied.
    #[must_use]
    pub fn from_arm64_user_regs(raw: &[u64]) -> Option<Self>
    {
        if raw.len() < ARM64_USER_REGS {
            return None;
        }
        Some(Self {
            pc: Address::from(raw[32]),
            sp: Address::from(raw[31]),
            fp: Address::from(raw[29]),
            status: raw[33],
            tls: Address::ZERO,
            general: raw[..31].to_vec(),
            architecture: Architecture::Arm64,
        })
    }

    /// Architecture the register file belongs to.
    #[must_use]
    pub const fn architecture(&self) -> Architecture
    {
        self.architecture
    }

    /// Value of a register, or `None` if it does not exist on this architecture.
    ///
    /// ```rust
    /// use fossil_core::types::{Architecture, Arm64Register, RegisterId, Registers, X86_64Register};
    ///
    /// let mut regs = Registers::new(Architecture::Arm64);
    /// regs.general[28] = 0xc000_0001;
    /// assert_eq!(regs.get(RegisterId::Arm64(Arm64Register::X(28))), Some(0xc000_0001));
    /// assert_eq!(regs.get(RegisterId::X86_64(X86_64Register::Rax)), None);
    /// ```
    #[must_use]
    pub fn get(&self, id: RegisterId) -> Option<u64>
    {
        match id {
            RegisterId::Pc => Some(self.pc.value()),
            RegisterId::Sp => Some(self.sp.value()),
            RegisterId::Fp => Some(self.fp.value()),
            RegisterId::Status => Some(self.status),
            RegisterId::Tls => Some(self.tls.value()),
            RegisterId::Arm64(Arm64Register::X(idx)) => {
                if self.architecture != Architecture::Arm64 {
                    return None;
                }
                self.general.get(usize::from(idx)).copied()
            }
            RegisterId::X86_64(reg) => {
                if self.architecture != Architecture::X86_64 {
                    return None;
                }
                self.general.get(reg.index()).copied()
            }
        }
    }

    /// `(name, value)` pairs for display, general registers first.
    #[must_use]
    pub fn named(&self) -> Vec<(String, u64)>
    {
        let mut out: Vec<(String, u64)> = match self.architecture {
            Architecture::X86_64 => X86_64_NAMES
                .iter()
                .zip(&self.general)
                .map(|(name, value)| ((*name).to_string(), *value))
                .collect(),
            _ => self
                .general
                .iter()
                .enumerate()
                .map(|(idx, value)| (format!("x{idx}"), *value))
                .collect(),
        };
        out.push(("pc".to_string(), self.pc.value()));
        out.push(("sp".to_string(), self.sp.value()));
        out.push(("fp".to_string(), self.fp.value()));
        out.push(("flags".to_string(), self.status));
        out.push(("tls".to_string(), self.tls.value()));
        out
    }
}
