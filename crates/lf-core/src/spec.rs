//! Validated watch specifications.
//!
//! A [`WatchSpec`] is the immutable description of one limit: which
//! directory, the high watermark that triggers eviction, the low watermark
//! eviction stops at, and an optional [`NamePattern`] restricting which file
//! names count. Construction is the only place watermarks are validated, so a
//! `WatchSpec` in hand is always well-formed.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::{Serialize, Serializer};

use crate::error::ConfigError;

/// A regular expression matched against file base names.
///
/// The expression is searched for anywhere in the name, so `[1-3]` matches
/// `"12"` and `"a3b"`. Anchor it (`^...$`) to match whole names.
#[derive(Debug, Clone)]
pub struct NamePattern(Regex);

impl NamePattern {
    /// Compiles a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPattern`] if `pattern` is not a valid
    /// regular expression.
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.to_owned(),
                source,
            })
    }

    /// Returns `true` if `name` contains a match.
    #[inline]
    #[must_use]
    pub fn is_match(&self, name: &str) -> bool {
        self.0.is_match(name)
    }

    /// Returns the pattern source text.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for NamePattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for NamePattern {}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NamePattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Immutable configuration for one watched directory.
///
/// Invariant: `high >= low`. Both are unsigned once validated.
///
/// # Examples
///
/// ```
/// use lf_core::{ConfigError, WatchSpec};
///
/// let spec = WatchSpec::new("/srv/spool", 5, 2, None)?;
/// assert_eq!(spec.threshold(), 3);
/// assert!(spec.matches("anything"));
///
/// assert!(matches!(
///     WatchSpec::new("/srv/spool", 5, 2, Some("[")),
///     Err(ConfigError::InvalidPattern { .. })
/// ));
/// # Ok::<(), ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchSpec {
    directory: Utf8PathBuf,
    high: usize,
    low: usize,
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pattern: Option<NamePattern>,
}

impl WatchSpec {
    /// Validates and builds a watch specification.
    ///
    /// The watermarks are taken as signed integers because that is how they
    /// arrive from configuration; negative values are rejected here rather
    /// than by the parser.
    ///
    /// The directory is not checked. Whoever turns configuration into live
    /// watches is responsible for that.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidWatermark`] if `low < 0`, `high < 0`, or
    ///   `high < low`
    /// - [`ConfigError::InvalidPattern`] if `pattern` does not compile
    pub fn new(
        directory: impl Into<Utf8PathBuf>,
        high: i64,
        low: i64,
        pattern: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let (high, low) = validate_watermarks(high, low)?;
        let pattern = pattern.map(NamePattern::new).transpose()?;

        Ok(Self {
            directory: directory.into(),
            high,
            low,
            pattern,
        })
    }

    /// The directory to limit.
    #[inline]
    #[must_use]
    pub fn directory(&self) -> &Utf8Path {
        &self.directory
    }

    /// The population that triggers eviction.
    #[inline]
    #[must_use]
    pub const fn high(&self) -> usize {
        self.high
    }

    /// The population eviction stops at.
    #[inline]
    #[must_use]
    pub const fn low(&self) -> usize {
        self.low
    }

    /// The initial eviction trigger margin, `high - low`.
    #[inline]
    #[must_use]
    pub const fn threshold(&self) -> usize {
        self.high - self.low
    }

    /// The name pattern, if any.
    #[inline]
    #[must_use]
    pub const fn pattern(&self) -> Option<&NamePattern> {
        self.pattern.as_ref()
    }

    /// Returns `true` if a file called `name` counts toward this limit.
    ///
    /// Without a pattern every name counts.
    #[inline]
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.pattern.as_ref().is_none_or(|p| p.is_match(name))
    }

    /// Returns a copy of this spec pointing at another directory.
    ///
    /// Used to replace a configured path with its canonical form.
    #[must_use]
    pub fn with_directory(&self, directory: impl Into<Utf8PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..self.clone()
        }
    }
}

fn validate_watermarks(high: i64, low: i64) -> Result<(usize, usize), ConfigError> {
    if low < 0 {
        return Err(ConfigError::invalid_watermark(
            high,
            low,
            format!("low {low} must be >= 0"),
        ));
    }
    if high < 0 {
        return Err(ConfigError::invalid_watermark(
            high,
            low,
            format!("high {high} must be >= 0"),
        ));
    }
    if high < low {
        return Err(ConfigError::invalid_watermark(
            high,
            low,
            format!("high {high} must not be below low {low}"),
        ));
    }

    let to_usize = |value: i64| {
        usize::try_from(value).map_err(|_| {
            ConfigError::invalid_watermark(high, low, format!("{value} is too large"))
        })
    };
    Ok((to_usize(high)?, to_usize(low)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_spec() {
        let spec = WatchSpec::new("/spool", 5, 2, None).expect("valid spec");
        assert_eq!(spec.directory(), "/spool");
        assert_eq!(spec.high(), 5);
        assert_eq!(spec.low(), 2);
        assert_eq!(spec.threshold(), 3);
        assert!(spec.pattern().is_none());
    }

    #[test]
    fn test_equal_watermarks_are_valid() {
        let spec = WatchSpec::new("/spool", 0, 0, None).expect("valid spec");
        assert_eq!(spec.threshold(), 0);
    }

    #[test]
    fn test_upside_down_watermarks_fail() {
        let err = WatchSpec::new("/spool", 2, 4, None).unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"invalid watermarks: high 2 must not be below low 4");
    }

    #[test]
    fn test_negative_low_fails() {
        let err = WatchSpec::new("/spool", 2, -2, None).unwrap_err();
        match err {
            ConfigError::InvalidWatermark { high, low, reason } => {
                assert_eq!((high, low), (2, -2));
                assert_eq!(reason, "low -2 must be >= 0");
            }
            other => panic!("Expected InvalidWatermark, got {other:?}"),
        }
    }

    #[test]
    fn test_negative_high_fails() {
        // low is checked first, so use a valid low to reach the high check
        let err = WatchSpec::new("/spool", -1, 0, None).unwrap_err();
        assert_eq!(err.to_string(), "invalid watermarks: high -1 must be >= 0");

        let err = WatchSpec::new("/spool", -1, -2, None).unwrap_err();
        assert!(err.to_string().contains("low -2"));
    }

    #[test]
    fn test_bad_pattern_fails() {
        let err = WatchSpec::new("/spool", 2, 1, Some("[")).unwrap_err();
        match err {
            ConfigError::InvalidPattern { pattern, .. } => assert_eq!(pattern, "["),
            other => panic!("Expected InvalidPattern, got {other:?}"),
        }
    }

    #[test]
    fn test_pattern_searches_anywhere_in_name() {
        let spec = WatchSpec::new("/spool", 2, 1, Some("[1-3]")).expect("valid spec");
        assert!(spec.matches("1"));
        assert!(spec.matches("11"));
        assert!(spec.matches("x3y"));
        assert!(!spec.matches("4"));
        assert!(!spec.matches("99"));
    }

    #[test]
    fn test_missing_pattern_matches_everything() {
        let spec = WatchSpec::new("/spool", 2, 1, None).expect("valid spec");
        assert!(spec.matches(""));
        assert!(spec.matches(".hidden"));
    }

    #[test]
    fn test_with_directory_keeps_limits() {
        let spec = WatchSpec::new("spool", 9, 3, Some("log")).expect("valid spec");
        let moved = spec.with_directory("/abs/spool");
        assert_eq!(moved.directory(), "/abs/spool");
        assert_eq!(moved.high(), 9);
        assert_eq!(moved.pattern().map(NamePattern::as_str), Some("log"));
    }

    #[test]
    fn test_spec_serialization() {
        let spec = WatchSpec::new("/spool", 5, 2, Some(r"\.log$")).expect("valid spec");
        let json = serde_json::to_value(&spec).expect("serializable");
        assert_eq!(
            json,
            serde_json::json!({
                "directory": "/spool",
                "high": 5,
                "low": 2,
                "match": "\\.log$",
            })
        );

        let unfiltered = WatchSpec::new("/spool", 5, 2, None).expect("valid spec");
        let json = serde_json::to_value(&unfiltered).expect("serializable");
        assert!(json.get("match").is_none());
    }
}
