//! Revision numbers.
//!
//! A revision is a non-zero signed integer labeling a point in repository
//! history. Positive values are absolute: 1 is the initial commit and each
//! commit increments by exactly one. Negative values are relative to the
//! head: -1 is the latest commit, -2 the one before it, and so on. Inside
//! storage every revision is normalized to an absolute value ≥ 1; relative
//! forms exist only at the API boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A non-zero revision number. See the module docs for semantics.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Revision(i64);

impl Revision {
    /// Revision `-1`, the latest commit ("HEAD").
    pub const HEAD: Self = Self(-1);
    /// Revision `1`, the initial commit.
    pub const INIT: Self = Self(1);

    /// Create a revision from a raw number.
    ///
    /// # Errors
    /// Zero is not a revision.
    pub fn new(value: i64) -> Result<Self, Error> {
        if value == 0 {
            return Err(Error::invalid("revision must not be zero"));
        }
        Ok(Self(value))
    }

    /// The raw revision number.
    #[must_use]
    pub const fn major(self) -> i64 {
        self.0
    }

    /// `true` if this revision is relative to HEAD (negative).
    #[must_use]
    pub const fn is_relative(self) -> bool {
        self.0 < 0
    }

    /// Step `n` revisions toward newer history, saturating at the domain
    /// bound (`i64::MAX` for absolute revisions, `-1` for relative ones).
    #[must_use]
    pub fn forward(self, n: u64) -> Self {
        let n = i64::try_from(n).unwrap_or(i64::MAX);
        if self.is_relative() {
            Self(self.0.saturating_add(n).min(-1))
        } else {
            Self(self.0.saturating_add(n))
        }
    }

    /// Step `n` revisions toward older history, saturating at the domain
    /// bound (`1` for absolute revisions, `i64::MIN` for relative ones).
    #[must_use]
    pub fn backward(self, n: u64) -> Self {
        let n = i64::try_from(n).unwrap_or(i64::MAX);
        if self.is_relative() {
            Self(self.0.saturating_sub(n))
        } else {
            Self(self.0.saturating_sub(n).max(1))
        }
    }
}

impl TryFrom<i64> for Revision {
    type Error = Error;
    fn try_from(value: i64) -> Result<Self, Error> {
        Self::new(value)
    }
}

impl From<Revision> for i64 {
    fn from(revision: Revision) -> Self {
        revision.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Revision({})", self.0)
    }
}

impl FromStr for Revision {
    type Err = Error;

    /// Parse a decimal revision number, or the word `head` (any case) for
    /// revision `-1`.
    fn from_str(s: &str) -> Result<Self, Error> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("head") {
            return Ok(Self::HEAD);
        }
        let value: i64 = trimmed
            .parse()
            .map_err(|_| Error::invalid(format!("malformed revision string: {s:?}")))?;
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn zero_is_rejected() {
        assert!(Revision::new(0).is_err());
        assert!("0".parse::<Revision>().is_err());
    }

    #[test]
    fn head_parses() {
        assert_eq!("head".parse::<Revision>().unwrap(), Revision::HEAD);
        assert_eq!("HEAD".parse::<Revision>().unwrap(), Revision::HEAD);
        assert_eq!("-1".parse::<Revision>().unwrap(), Revision::HEAD);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!("1.5".parse::<Revision>().is_err());
        assert!("rev7".parse::<Revision>().is_err());
        assert!(String::new().parse::<Revision>().is_err());
    }

    #[test]
    fn forward_saturates_relative_at_head() {
        assert_eq!(Revision::new(-3).unwrap().forward(10), Revision::HEAD);
    }

    #[test]
    fn backward_saturates_absolute_at_init() {
        assert_eq!(Revision::new(5).unwrap().backward(10), Revision::INIT);
    }

    #[test]
    fn arithmetic_moves_by_steps() {
        assert_eq!(Revision::new(5).unwrap().forward(2).major(), 7);
        assert_eq!(Revision::new(5).unwrap().backward(2).major(), 3);
        assert_eq!(Revision::new(-5).unwrap().forward(2).major(), -3);
        assert_eq!(Revision::new(-5).unwrap().backward(2).major(), -7);
    }

    proptest! {
        #[test]
        fn arithmetic_never_produces_zero(start in prop_oneof![1i64..=1_000_000, -1_000_000i64..=-1], n in 0u64..=2_000_000) {
            let rev = Revision::new(start).unwrap();
            prop_assert_ne!(rev.forward(n).major(), 0);
            prop_assert_ne!(rev.backward(n).major(), 0);
        }

        #[test]
        fn forward_then_backward_within_bounds_is_identity(start in 10i64..=1_000_000, n in 0u64..=5) {
            let rev = Revision::new(start).unwrap();
            prop_assert_eq!(rev.forward(n).backward(n), rev);
        }
    }
}
