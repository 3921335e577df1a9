//! Core types, errors, and configuration loading for limitfiles.
//!
//! This crate provides the pieces every other workspace member builds on:
//!
//! - [`WatchSpec`] - a validated high/low watermark pair for one directory,
//!   with an optional file name pattern
//! - [`LimitsConfig`] - the INI configuration file, turned into watch specs
//!   with per-section warnings
//! - [`ConfigError`] - fatal configuration errors
//! - Type aliases for `FxHashMap`/`FxHashSet`
//!
//! # Examples
//!
//! ```
//! use lf_core::WatchSpec;
//!
//! let spec = WatchSpec::new("/var/spool/reports", 100, 20, Some(r"\.csv$"))?;
//! assert_eq!(spec.high(), 100);
//! assert_eq!(spec.low(), 20);
//! assert!(spec.matches("daily.csv"));
//! assert!(!spec.matches("daily.csv.tmp"));
//! # Ok::<(), lf_core::ConfigError>(())
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod hash;
pub mod spec;

pub use config::{ConfigWarning, DEFAULT_CONFIG_PATH, LimitsConfig, WatchSection};
pub use error::ConfigError;
pub use hash::{FxHashMap, FxHashSet};
pub use spec::{NamePattern, WatchSpec};
