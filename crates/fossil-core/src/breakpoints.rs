//! Breakpoint descriptions shared by every target.
//!
//! A core dump cannot stop anywhere, so [`crate::target::CoreProcess`] never
//! holds one; the type exists so that the [`crate::target::Target`] contract
//! has the same shape for a live backend.

use std::fmt;

use crate::types::Address;

/// Unique identifier for a breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakpointId(u64);

impl BreakpointId
{
    #[must_use]
    pub const fn from_raw(value: u64) -> Self
    {
        Self(value)
    }

    #[must_use]
    pub const fn raw(self) -> u64
    {
        self.0
    }
}

/// What triggers the breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakpointKind
{
    /// Set by the user.
    User,
    /// Set by the debugger itself while stepping (`next`, `stepout`).
    Internal,
    /// Data watchpoint (triggers on memory access).
    Watchpoint,
}

impl fmt::Display for BreakpointKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Self::User => write!(f, "user"),
            Self::Internal => write!(f, "internal"),
            Self::Watchpoint => write!(f, "watchpoint"),
        }
    }
}

/// A breakpoint at an address, optionally guarded by a condition expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint
{
    pub id: BreakpointId,
    pub address: Address,
    pub kind: BreakpointKind,
    pub condition: Option<String>,
}

impl Breakpoint
{
    #[must_use]
    pub const fn new(id: BreakpointId, address: Address, kind: BreakpointKind) -> Self
    {
        Self {
            id,
            address,
            kind,
            condition: None,
        }
    }

    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self
    {
        self.condition = Some(condition.into());
        self
    }

    #[must_use]
    pub const fn is_internal(&self) -> bool
    {
        matches!(self.kind, BreakpointKind::Internal)
    }
}

impl fmt::Display for Breakpoint
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "breakpoint {} ({}) at {}", self.id.raw(), self.kind, self.address)?;
        if let Some(condition) = &self.condition {
            write!(f, " if {condition}")?;
        }
        Ok(())
    }
}
