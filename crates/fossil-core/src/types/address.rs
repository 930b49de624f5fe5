//! Virtual address type.

use std::fmt;
use std::ops::{Add, Sub};

/// Strongly typed virtual address in the dumped process
///
/// Wraps a `u64` so that addresses cannot be confused with sizes, file
/// offsets or counts. Every address a core dump talks about lives in the
/// *captured* process' address space, never in ours.
///
/// ## Arithmetic
///
/// `+` and `-` wrap, matching how the hardware computes effective addresses.
/// Interval code that must not wrap (region ends, clip lengths) uses the
/// `checked_*` and `saturating_*` variants instead.
///
/// ## Example
///
/// ```rust
/// use fossil_core::types::Address;
///
/// let base = Address::from(0x40_0000);
/// assert_eq!((base + 0x10).value(), 0x40_0010);
/// assert_eq!(base.saturating_add(u64::MAX), Address::MAX);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

impl Address
{
    /// The null address
    pub const ZERO: Self = Self(0);

    /// Highest representable address
    pub const MAX: Self = Self(u64::MAX);

    /// Create an address in const contexts.
    #[must_use]
    pub const fn new(value: u64) -> Self
    {
        Self(value)
    }

    /// Raw `u64` value.
    #[must_use]
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// `true` for the null address.
    #[must_use]
    pub const fn is_null(self) -> bool
    {
        self.0 == 0
    }

    /// Add an offset, returning `None` on overflow.
    #[must_use]
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Self)
    }

    /// Subtract an offset, returning `None` on underflow.
    #[must_use]
    pub fn checked_sub(self, offset: u64) -> Option<Self>
    {
        self.0.checked_sub(offset).map(Self)
    }

    /// Add an offset, clamping at [`Address::MAX`].
    #[must_use]
    pub const fn saturating_add(self, offset: u64) -> Self
    {
        Self(self.0.saturating_add(offset))
    }

    /// Distance in bytes from `base` up to `self`, or `None` if `self` lies below `base`.
    ///
    /// ```rust
    /// use fossil_core::types::Address;
    ///
    /// let base = Address::from(0x1000);
    /// assert_eq!(Address::from(0x1800).offset_from(base), Some(0x800));
    /// assert_eq!(Address::from(0x0800).offset_from(base), None);
    /// ```
    #[must_use]
    pub fn offset_from(self, base: Self) -> Option<u64>
    {
        self.0.checked_sub(base.0)
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Self(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:016x}", self.0)
    }
}

impl fmt::LowerHex for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl Add<u64> for Address
{
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output
    {
        Self(self.0.wrapping_add(rhs))
    }
}

impl Sub<u64> for Address
{
    type Output = Self;

    fn sub(self, rhs: u64) -> Self::Output
    {
        Self(self.0.wrapping_sub(rhs))
    }
}
