//! Error types for the lf-core crate.
//!
//! This module provides the [`ConfigError`] type for everything that can go
//! wrong before the event loop starts: bad watermarks, bad patterns, and an
//! unreadable or useless configuration file.

use camino::Utf8PathBuf;

/// Errors that can occur during configuration loading and validation.
///
/// All of these are fatal at startup. The binary maps them to exit status 3.
/// Problems confined to a single configuration section are not errors; they
/// are reported as [`ConfigWarning`](crate::ConfigWarning)s and the section is
/// skipped.
///
/// # Examples
///
/// ```
/// use lf_core::{ConfigError, WatchSpec};
///
/// let err = WatchSpec::new("/tmp", 2, 4, None).unwrap_err();
/// assert!(matches!(err, ConfigError::InvalidWatermark { .. }));
/// assert_eq!(err.to_string(), "invalid watermarks: high 2 must not be below low 4");
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The high/low pair is negative or inverted.
    #[error("invalid watermarks: {reason}")]
    InvalidWatermark {
        /// The configured high watermark.
        high: i64,
        /// The configured low watermark.
        low: i64,
        /// Which rule was violated.
        reason: String,
    },

    /// The name pattern is not a valid regular expression.
    #[error("bad match pattern {pattern:?}: {source}")]
    InvalidPattern {
        /// The pattern as written in the configuration.
        pattern: String,
        /// The compile error.
        #[source]
        source: regex::Error,
    },

    /// The configuration file could not be read.
    #[error("could not read {path}: {source}")]
    Read {
        /// The configuration file path.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid INI.
    #[error("could not parse {path}: {source}")]
    Parse {
        /// The configuration file path.
        path: Utf8PathBuf,
        /// The parser's error.
        #[source]
        source: ini::ParseError,
    },

    /// No section of the configuration produced a working watch.
    #[error("no valid sections in {0}")]
    NoValidSections(Utf8PathBuf),
}

impl ConfigError {
    /// Creates a new [`ConfigError::InvalidWatermark`] error.
    #[must_use]
    pub fn invalid_watermark(high: i64, low: i64, reason: impl Into<String>) -> Self {
        Self::InvalidWatermark {
            high,
            low,
            reason: reason.into(),
        }
    }
}
