//! Ordered version tokens for update bundles.
//!
//! A bundle is identified by its version token. Tokens are dot-separated
//! numeric segments (`1.0.10`, `2024.3.1`, plain build numbers like `42`).
//! Comparison is segment-wise numeric, so `1.0.10 > 1.0.2` — string
//! comparison would get this wrong and must never be used for update
//! decisions.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing a version token.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("empty version token")]
    Empty,

    #[error("invalid version segment '{segment}' in '{token}'")]
    InvalidSegment { token: String, segment: String },
}

/// A bundle version: dot-separated numeric segments with a strict total
/// order.
///
/// The original string is kept for display; ordering and equality are
/// defined over the parsed segments, with missing trailing segments treated
/// as zero (`1.2` == `1.2.0`). Deserialization goes through [`parse`],
/// so a malformed version in external metadata is rejected loudly rather
/// than silently ordered.
///
/// [`parse`]: VersionToken::parse
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionToken {
    raw: String,
    segments: Vec<u64>,
}

impl VersionToken {
    /// Parse a version token, validating every segment as numeric.
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let raw = s.trim();
        if raw.is_empty() {
            return Err(VersionError::Empty);
        }
        let mut segments = Vec::new();
        for segment in raw.split('.') {
            let value = segment
                .parse::<u64>()
                .map_err(|_| VersionError::InvalidSegment {
                    token: raw.to_string(),
                    segment: segment.to_string(),
                })?;
            segments.push(value);
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The original string form.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Parsed numeric segments.
    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    /// True if `self` is strictly newer than `other`.
    pub fn is_newer_than(&self, other: &VersionToken) -> bool {
        self.cmp(other) == Ordering::Greater
    }
}

impl Ord for VersionToken {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let x = self.segments.get(i).copied().unwrap_or(0);
            let y = other.segments.get(i).copied().unwrap_or(0);
            match x.cmp(&y) {
                Ordering::Equal => continue,
                non_eq => return non_eq,
            }
        }
        Ordering::Equal
    }
}

impl TryFrom<String> for VersionToken {
    type Error = VersionError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        VersionToken::parse(&s)
    }
}

impl From<VersionToken> for String {
    fn from(token: VersionToken) -> Self {
        token.raw
    }
}

impl PartialOrd for VersionToken {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for VersionToken {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for VersionToken {}

impl FromStr for VersionToken {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionToken::parse(s)
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn v(s: &str) -> VersionToken {
        VersionToken::parse(s).expect("valid version")
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(VersionToken::parse(""), Err(VersionError::Empty));
        assert!(matches!(
            VersionToken::parse("1.0.beta"),
            Err(VersionError::InvalidSegment { .. })
        ));
        assert!(matches!(
            VersionToken::parse("1..2"),
            Err(VersionError::InvalidSegment { .. })
        ));
    }

    #[test]
    fn test_numeric_not_lexicographic() {
        assert!(v("1.0.10").is_newer_than(&v("1.0.2")));
        assert!(v("1.0.2") < v("1.0.10"));
        assert!(v("10.0.0").is_newer_than(&v("9.99.99")));
    }

    #[test]
    fn test_missing_segments_are_zero() {
        assert_eq!(v("1.2"), v("1.2.0"));
        assert!(v("1.2.1").is_newer_than(&v("1.2")));
    }

    #[test]
    fn test_equal_is_not_newer() {
        assert!(!v("2.0.0").is_newer_than(&v("2.0.0")));
    }

    #[test]
    fn test_serde_string_roundtrip() {
        let token = v("1.0.10");
        let json = serde_json::to_string(&token).expect("serialize");
        assert_eq!(json, "\"1.0.10\"");
        let back: VersionToken = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, token);
        assert!(back.is_newer_than(&v("1.0.2")));
    }

    #[test]
    fn test_deserialize_rejects_malformed_version() {
        // External metadata with a garbage version must fail loudly, not
        // compare as 0.0.0.
        assert!(serde_json::from_str::<VersionToken>("\"abc\"").is_err());
        assert!(serde_json::from_str::<VersionToken>("\"1.0.beta\"").is_err());
        assert!(serde_json::from_str::<VersionToken>("\"\"").is_err());
    }

    proptest! {
        // Total order: comparison agrees with the segment vectors, so
        // antisymmetry and transitivity follow from Vec<u64> ordering.
        #[test]
        fn prop_order_matches_numeric_segments(
            a in proptest::collection::vec(0u64..1000, 1..5),
            b in proptest::collection::vec(0u64..1000, 1..5),
        ) {
            let sa = a.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(".");
            let sb = b.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(".");
            let va = v(&sa);
            let vb = v(&sb);

            let len = a.len().max(b.len());
            let pad = |xs: &[u64]| {
                let mut out = xs.to_vec();
                out.resize(len, 0);
                out
            };
            prop_assert_eq!(va.cmp(&vb), pad(&a).cmp(&pad(&b)));
        }
    }
}
