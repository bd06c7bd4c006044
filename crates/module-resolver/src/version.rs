//! Semantic versions and the module constraint language.
//!
//! Versions are strict `major.minor.patch` triples. Constraints come in four
//! forms:
//!
//! - **Caret** `^X` or `^X.Y`: same major, minor at least `Y`. There is no
//!   special case for `0.x`; `^0.2` accepts `0.9.0`.
//! - **Tilde** `~X.Y`: same major and minor, any patch.
//! - **At least** `>=X[.Y[.Z]]`: missing components are zero-padded.
//! - **Exact** `X.Y.Z`: full three-part equality.
//!
//! # Examples
//!
//! ```
//! use module_resolver::version::{SemanticVersion, VersionConstraint};
//!
//! let v = SemanticVersion::parse("1.9.9").unwrap();
//! assert!(v.satisfies("^1.2"));
//! assert!(!v.satisfies("~1.2"));
//!
//! let c = VersionConstraint::parse(">=8.3").unwrap();
//! assert!(c.matches(&SemanticVersion::new(8, 3, 0)));
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static STRICT_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\.(\d+)\.(\d+)$").unwrap());

static VERSION_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\.(\d+)\.(\d+)").unwrap());

/// An immutable `major.minor.patch` version.
///
/// Ordering is lexicographic over `(major, minor, patch)`; the derive relies on
/// the field declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SemanticVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a strict `major.minor.patch` string.
    ///
    /// Surrounding whitespace is ignored; anything else (a `v` prefix,
    /// pre-release suffixes, missing components) is rejected.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let caps = STRICT_VERSION
            .captures(trimmed)
            .ok_or_else(|| Error::InvalidVersion {
                version: input.to_string(),
                reason: "expected MAJOR.MINOR.PATCH".to_string(),
            })?;

        let component = |idx: usize| -> Result<u64> {
            caps[idx].parse::<u64>().map_err(|e| Error::InvalidVersion {
                version: input.to_string(),
                reason: e.to_string(),
            })
        };

        Ok(Self::new(component(1)?, component(2)?, component(3)?))
    }

    /// Evaluate a constraint string against this version.
    ///
    /// Unlike [`VersionConstraint::parse`], a malformed constraint is reported
    /// as [`Satisfaction::Malformed`] rather than an error.
    pub fn check(&self, constraint: &str) -> Satisfaction {
        match VersionConstraint::parse(constraint) {
            Ok(c) if c.matches(self) => Satisfaction::Satisfied,
            Ok(_) => Satisfaction::Unsatisfied,
            Err(e) => Satisfaction::Malformed(e.to_string()),
        }
    }

    /// Whether this version satisfies `constraint`. Malformed constraints are
    /// never satisfied.
    pub fn satisfies(&self, constraint: &str) -> bool {
        self.check(constraint).is_satisfied()
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemanticVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SemanticVersion {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<SemanticVersion> for String {
    fn from(v: SemanticVersion) -> Self {
        v.to_string()
    }
}

/// Outcome of evaluating a constraint string against a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Satisfaction {
    Satisfied,
    Unsatisfied,
    /// The constraint could not be parsed; carries the parse error message.
    Malformed(String),
}

impl Satisfaction {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Satisfaction::Satisfied)
    }
}

/// A parsed version constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionConstraint {
    /// `^X[.Y]`: same major, minor at least `minor`.
    Caret { major: u64, minor: u64 },
    /// `~X.Y`: same major and minor.
    Tilde { major: u64, minor: u64 },
    /// `>=X[.Y[.Z]]`, zero-padded.
    AtLeast(SemanticVersion),
    /// Bare `X.Y.Z`.
    Exact(SemanticVersion),
}

impl VersionConstraint {
    pub fn parse(constraint: &str) -> Result<Self> {
        let trimmed = constraint.trim();
        if trimmed.is_empty() {
            return Err(invalid(constraint, "empty constraint"));
        }

        if let Some(rest) = trimmed.strip_prefix('^') {
            let parts = numeric_parts(constraint, rest, 1)?;
            return Ok(Self::Caret {
                major: parts[0],
                minor: parts.get(1).copied().unwrap_or(0),
            });
        }

        if let Some(rest) = trimmed.strip_prefix('~') {
            let parts = numeric_parts(constraint, rest, 2)?;
            return Ok(Self::Tilde {
                major: parts[0],
                minor: parts[1],
            });
        }

        if let Some(rest) = trimmed.strip_prefix(">=") {
            let parts = numeric_parts(constraint, rest, 1)?;
            return Ok(Self::AtLeast(SemanticVersion::new(
                parts[0],
                parts.get(1).copied().unwrap_or(0),
                parts.get(2).copied().unwrap_or(0),
            )));
        }

        SemanticVersion::parse(trimmed)
            .map(Self::Exact)
            .map_err(|_| invalid(constraint, "expected ^X.Y, ~X.Y, >=X.Y.Z or X.Y.Z"))
    }

    pub fn matches(&self, version: &SemanticVersion) -> bool {
        match *self {
            Self::Caret { major, minor } => version.major == major && version.minor >= minor,
            Self::Tilde { major, minor } => version.major == major && version.minor == minor,
            Self::AtLeast(min) => *version >= min,
            Self::Exact(exact) => *version == exact,
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Caret { major, minor } => write!(f, "^{major}.{minor}"),
            Self::Tilde { major, minor } => write!(f, "~{major}.{minor}"),
            Self::AtLeast(v) => write!(f, ">={v}"),
            Self::Exact(v) => write!(f, "{v}"),
        }
    }
}

impl FromStr for VersionConstraint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Extract the leading `major.minor.patch` from a free-form version string.
///
/// - `"8.3.0-dev"` -> `8.3.0`
/// - `"PHP 8.2.12 (cli)"` -> `8.2.12`
/// - `"8.3"` -> `None`
pub fn normalize_runtime_version(raw: &str) -> Option<SemanticVersion> {
    let caps = VERSION_PREFIX.captures(raw)?;
    Some(SemanticVersion::new(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    ))
}

/// Split `1`, `1.2` or `1.2.3` into numbers, requiring at least `min` parts.
fn numeric_parts(constraint: &str, body: &str, min: usize) -> Result<Vec<u64>> {
    let body = body.trim();
    let parts: Vec<&str> = body.split('.').collect();
    if parts.len() < min || parts.len() > 3 {
        return Err(invalid(
            constraint,
            &format!("expected between {min} and 3 version components"),
        ));
    }
    parts
        .iter()
        .map(|p| {
            if p.is_empty() || !p.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid(constraint, &format!("'{p}' is not a number")));
            }
            p.parse::<u64>()
                .map_err(|e| invalid(constraint, &e.to_string()))
        })
        .collect()
}

fn invalid(constraint: &str, reason: &str) -> Error {
    Error::InvalidConstraint {
        constraint: constraint.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn v(s: &str) -> SemanticVersion {
        SemanticVersion::parse(s).unwrap()
    }

    // --- parse ---

    #[test]
    fn parse_strict_triple() {
        assert_eq!(v("1.2.3"), SemanticVersion::new(1, 2, 3));
        assert_eq!(v("  10.0.42 "), SemanticVersion::new(10, 0, 42));
    }

    #[rstest]
    #[case("")]
    #[case("1.2")]
    #[case("v1.2.3")]
    #[case("1.2.3-beta")]
    #[case("1.2.3.4")]
    #[case("a.b.c")]
    #[case("99999999999999999999.0.0")]
    fn parse_rejects_malformed(#[case] input: &str) {
        let err = SemanticVersion::parse(input).unwrap_err();
        assert!(matches!(err, Error::InvalidVersion { .. }), "{input}: {err}");
    }

    #[test]
    fn ordering_is_lexicographic() {
        assert!(v("1.10.0") > v("1.9.9"));
        assert!(v("2.0.0") > v("1.99.99"));
        assert!(v("1.0.1") > v("1.0.0"));
        assert_eq!(v("1.0.0").cmp(&v("1.0.0")), std::cmp::Ordering::Equal);
    }

    // --- caret ---

    #[rstest]
    #[case("2.0.0", "^1.0", false)]
    #[case("1.9.9", "^1.2", true)]
    #[case("1.1.0", "^1.2", false)]
    #[case("1.2.0", "^1.2", true)]
    #[case("1.0.0", "^1", true)]
    #[case("0.9.0", "^0.2", true)]
    #[case("1.0.0", "^0.2", false)]
    fn caret(#[case] version: &str, #[case] constraint: &str, #[case] expected: bool) {
        assert_eq!(v(version).satisfies(constraint), expected);
    }

    // --- tilde ---

    #[rstest]
    #[case("1.2.9", "~1.2", true)]
    #[case("1.2.0", "~1.2", true)]
    #[case("1.3.0", "~1.2", false)]
    #[case("2.2.0", "~1.2", false)]
    fn tilde(#[case] version: &str, #[case] constraint: &str, #[case] expected: bool) {
        assert_eq!(v(version).satisfies(constraint), expected);
    }

    // --- at least ---

    #[rstest]
    #[case("2.0.0", ">=1.2.0", true)]
    #[case("1.1.9", ">=1.2.0", false)]
    #[case("8.0.0", ">=8", true)]
    #[case("8.2.9", ">=8.3", false)]
    #[case("8.3.0", ">=8.3", true)]
    fn at_least(#[case] version: &str, #[case] constraint: &str, #[case] expected: bool) {
        assert_eq!(v(version).satisfies(constraint), expected);
    }

    #[test]
    fn at_least_zero_pads() {
        assert_eq!(
            VersionConstraint::parse(">=8").unwrap(),
            VersionConstraint::AtLeast(SemanticVersion::new(8, 0, 0))
        );
        assert_eq!(
            VersionConstraint::parse(">=8.3").unwrap(),
            VersionConstraint::AtLeast(SemanticVersion::new(8, 3, 0))
        );
    }

    // --- exact ---

    #[test]
    fn exact_requires_full_triple() {
        assert!(v("1.2.3").satisfies("1.2.3"));
        assert!(!v("1.2.4").satisfies("1.2.3"));
        assert!(matches!(v("1.2.3").check("1.2"), Satisfaction::Malformed(_)));
        assert!(!v("1.2.0").satisfies("1.2"));
    }

    #[rstest]
    #[case("")]
    #[case("^")]
    #[case("~1")]
    #[case("^a.b")]
    #[case(">=")]
    #[case(">=1.2.3.4")]
    #[case("latest")]
    fn malformed_constraints_are_explicit(#[case] constraint: &str) {
        assert!(VersionConstraint::parse(constraint).is_err());
        assert!(matches!(
            v("1.0.0").check(constraint),
            Satisfaction::Malformed(_)
        ));
        assert!(!v("1.0.0").satisfies(constraint));
    }

    #[test]
    fn display_is_canonical() {
        assert_eq!(VersionConstraint::parse("^1").unwrap().to_string(), "^1.0");
        assert_eq!(VersionConstraint::parse("~1.2.7").unwrap().to_string(), "~1.2");
        assert_eq!(VersionConstraint::parse(">=8").unwrap().to_string(), ">=8.0.0");
    }

    // --- normalize_runtime_version ---

    #[rstest]
    #[case("8.3.0-dev", Some((8, 3, 0)))]
    #[case("8.2.12", Some((8, 2, 12)))]
    #[case("PHP 8.2.12 (cli) (built: Nov 2 2023)", Some((8, 2, 12)))]
    #[case("8.3", None)]
    #[case("unknown", None)]
    fn normalizes_runtime_versions(#[case] raw: &str, #[case] expected: Option<(u64, u64, u64)>) {
        assert_eq!(
            normalize_runtime_version(raw),
            expected.map(|(a, b, c)| SemanticVersion::new(a, b, c))
        );
    }

    #[test]
    fn serde_uses_string_form() {
        let json = serde_json::to_string(&v("2.0.1")).unwrap();
        assert_eq!(json, "\"2.0.1\"");
        let back: SemanticVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v("2.0.1"));
        assert!(serde_json::from_str::<SemanticVersion>("\"2.0\"").is_err());
    }
}
