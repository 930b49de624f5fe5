//! Go runtime version strings.

use std::cmp::Ordering;
use std::fmt;

/// A parsed `runtime.buildVersion`
///
/// Release versions have `rev >= 0`; pre-releases (`go1.9beta2`,
/// `go1.10rc1`) have `rev == -1` so that they sort before the release.
/// Development builds (`devel +abc123 ...`) have `major == -1` and compare
/// before everything; use [`RuntimeVersion::is_devel`] to treat them as new.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuntimeVersion
{
    pub major: i32,
    pub minor: i32,
    pub rev: i32,
    pub beta: i32,
    pub rc: i32,
}

impl RuntimeVersion
{
    /// Development build marker.
    pub const DEVEL: Self = Self {
        major: -1,
        minor: 0,
        rev: 0,
        beta: 0,
        rc: 0,
    };

    /// A release version `major.minor.rev`.
    #[must_use]
    pub const fn release(major: i32, minor: i32, rev: i32) -> Self
    {
        Self {
            major,
            minor,
            rev,
            beta: 0,
            rc: 0,
        }
    }

    /// Parse a version string as stored in `runtime.buildVersion`.
    ///
    /// ```rust
    /// use fossil_core::runtime::RuntimeVersion;
    ///
    /// let v = RuntimeVersion::parse("go1.8.3").unwrap();
    /// assert_eq!((v.major, v.minor, v.rev), (1, 8, 3));
    /// assert!(RuntimeVersion::parse("devel +8a3b1c2 Tue Jan 3").unwrap().is_devel());
    /// assert!(RuntimeVersion::parse("gccgo").is_none());
    /// ```
    #[must_use]
    pub fn parse(text: &str) -> Option<Self>
    {
        if text.starts_with("devel") {
            return Some(Self::DEVEL);
        }
        let text = text.strip_prefix("go")?;
        let text = text.split(' ').next().unwrap_or(text);
        let parts: Vec<&str> = text.splitn(3, '.').collect();
        match parts.as_slice() {
            [major, minor] => {
                let major = major.parse().ok()?;
                if let Some((minor, beta)) = minor.split_once("beta") {
                    return Some(Self {
                        major,
                        minor: minor.parse().ok()?,
                        rev: -1,
                        beta: beta.parse().ok()?,
                        rc: 0,
                    });
                }
                if let Some((minor, rc)) = minor.split_once("rc") {
                    return Some(Self {
                        major,
                        minor: minor.parse().ok()?,
                        rev: -1,
                        beta: 0,
                        rc: rc.parse().ok()?,
                    });
                }
                Some(Self::release(major, minor.parse().ok()?, 0))
            }
            [major, minor, rev] => Some(Self::release(major.parse().ok()?, minor.parse().ok()?, rev.parse().ok()?)),
            _ => None,
        }
    }

    /// `true` for a development build.
    #[must_use]
    pub const fn is_devel(&self) -> bool
    {
        self.major < 0
    }

    /// `true` if `self` is the same as or newer than `other`.
    #[must_use]
    pub fn after_or_equal(&self, other: &Self) -> bool
    {
        self.cmp(other) != Ordering::Less
    }
}

impl PartialOrd for RuntimeVersion
{
    fn partial_cmp(&self, other: &Self) -> Option<Ordering>
    {
        Some(self.cmp(other))
    }
}

impl Ord for RuntimeVersion
{
    fn cmp(&self, other: &Self) -> Ordering
    {
        (self.major, self.minor, self.rev, self.beta, self.rc).cmp(&(
            other.major,
            other.minor,
            other.rev,
            other.beta,
            other.rc,
        ))
    }
}

impl fmt::Display for RuntimeVersion
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        if self.is_devel() {
            return write!(f, "devel");
        }
        write!(f, "go{}.{}", self.major, self.minor)?;
        if self.beta > 0 {
            write!(f, "beta{}", self.beta)
        } else if self.rc > 0 {
            write!(f, "rc{}", self.rc)
        } else if self.rev > 0 {
            write!(f, ".{}", self.rev)
        } else {
            Ok(())
        }
    }
}
