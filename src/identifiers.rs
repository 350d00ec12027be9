//! Type-safe identifiers for wire correlation.
//!
//! Newtype wrappers keep correlation IDs from being confused with other
//! integers flowing through the connectors (pool sizes, packet sizes).
//!
//! | Type | Description |
//! |------|-------------|
//! | [`CorrelationId`] | Tag tying a request line to its response lines |
//! | [`IdRange`] | Inclusive `[lo, hi]` range the ID pool is filled from |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// CorrelationId
// ============================================================================

/// Integer tag prefixed to every request and response line of one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(u32);

impl CorrelationId {
    /// Creates a correlation ID from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// IdRange
// ============================================================================

/// Inclusive range of correlation IDs.
///
/// Deserializes from a two element list, `[1, 32]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u32>", into = "Vec<u32>")]
pub struct IdRange {
    lo: u32,
    hi: u32,
}

impl IdRange {
    /// Most IDs a range may hold; every ID is pooled up front.
    pub const MAX_LEN: u32 = 65_536;

    /// Creates a range, rejecting `lo > hi` and ranges over [`IdRange::MAX_LEN`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the range is inverted or too long.
    pub fn new(lo: u32, hi: u32) -> Result<Self> {
        if lo > hi {
            return Err(Error::config(format!(
                "Correlation ID range is inverted: [{lo}, {hi}]"
            )));
        }
        if hi - lo >= Self::MAX_LEN {
            return Err(Error::config(format!(
                "Correlation ID range [{lo}, {hi}] holds more than {} IDs",
                Self::MAX_LEN
            )));
        }
        Ok(Self { lo, hi })
    }

    /// Lowest ID in the range.
    #[inline]
    #[must_use]
    pub const fn lo(&self) -> u32 {
        self.lo
    }

    /// Highest ID in the range.
    #[inline]
    #[must_use]
    pub const fn hi(&self) -> u32 {
        self.hi
    }

    /// Number of IDs in the range.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        (self.hi - self.lo) as usize + 1
    }

    /// Always `false`; a valid range holds at least one ID.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Returns `true` if `id` falls inside the range.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: CorrelationId) -> bool {
        self.as_range().contains(&id.get())
    }

    /// Iterates every ID in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = CorrelationId> + use<> {
        self.as_range().map(CorrelationId::new)
    }

    fn as_range(&self) -> RangeInclusive<u32> {
        self.lo..=self.hi
    }
}

impl Default for IdRange {
    fn default() -> Self {
        Self { lo: 1, hi: 32 }
    }
}

impl TryFrom<Vec<u32>> for IdRange {
    type Error = Error;

    fn try_from(bounds: Vec<u32>) -> Result<Self> {
        match bounds.as_slice() {
            [lo, hi] => Self::new(*lo, *hi),
            other => Err(Error::config(format!(
                "Correlation ID range needs exactly two bounds, got {}",
                other.len()
            ))),
        }
    }
}

impl From<IdRange> for Vec<u32> {
    fn from(range: IdRange) -> Self {
        vec![range.lo, range.hi]
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_id_display() {
        assert_eq!(CorrelationId::new(17).to_string(), "17");
    }

    #[test]
    fn test_range_iterates_inclusive() {
        let range = IdRange::new(3, 5).expect("valid range");
        let ids: Vec<u32> = range.iter().map(CorrelationId::get).collect();
        assert_eq!(ids, vec![3, 4, 5]);
        assert_eq!(range.len(), 3);
    }

    #[test]
    fn test_single_id_range() {
        let range = IdRange::new(7, 7).expect("valid range");
        assert_eq!(range.len(), 1);
        assert!(range.contains(CorrelationId::new(7)));
        assert!(!range.contains(CorrelationId::new(8)));
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert!(IdRange::new(5, 1).is_err());
    }

    #[test]
    fn test_oversized_range_rejected() {
        assert!(IdRange::new(0, u32::MAX).is_err());
        assert!(IdRange::new(1, IdRange::MAX_LEN + 1).is_err());

        let widest = IdRange::new(u32::MAX - (IdRange::MAX_LEN - 1), u32::MAX).expect("valid range");
        assert_eq!(widest.len(), IdRange::MAX_LEN as usize);
        assert!(serde_json::from_str::<IdRange>("[0, 4294967295]").is_err());
    }

    #[test]
    fn test_range_from_list() {
        let range: IdRange = serde_json::from_str("[1, 2]").expect("parse");
        assert_eq!((range.lo(), range.hi()), (1, 2));

        assert!(serde_json::from_str::<IdRange>("[1]").is_err());
        assert!(serde_json::from_str::<IdRange>("[9, 2]").is_err());
    }
}
