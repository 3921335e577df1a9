//! Loading limits from an INI configuration file.
//!
//! Each section describes one watch:
//!
//! ```ini
//! [Nightly reports]
//! directory = /var/spool/reports
//! max = 100
//! keep = 20
//! match = \.csv$
//! ```
//!
//! `directory`, `max`, and `keep` are required; `match` is optional. A section
//! that is incomplete, has a non-integer watermark, an invalid pattern, or
//! points at something that is not a directory produces a [`ConfigWarning`]
//! and is skipped. Only an unreadable or unparseable file is a hard
//! [`ConfigError`] at this stage.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use ini::{Ini, ParseOption, Properties};
use serde::Serialize;

use crate::error::ConfigError;
use crate::spec::WatchSpec;

/// Where the daemon looks for its configuration by default.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/limitfiles.ini";

const KEY_DIRECTORY: &str = "directory";
const KEY_MAX: &str = "max";
const KEY_KEEP: &str = "keep";
const KEY_MATCH: &str = "match";

/// A configuration problem confined to one section.
///
/// The section is skipped; loading continues with the others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigWarning {
    /// The section name (or directory) that could not be watched.
    pub section: String,
    /// What was wrong with it.
    pub reason: String,
}

impl ConfigWarning {
    /// Creates a new warning for `section`.
    pub fn new(section: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            section: section.into(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "can't watch {}: {}", self.section, self.reason)
    }
}

/// One syntactically complete configuration section.
///
/// Watermarks are kept signed here; [`WatchSection::spec`] validates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchSection {
    /// The section header.
    pub name: String,
    /// The `directory` key.
    pub directory: Utf8PathBuf,
    /// The `max` key.
    pub max: i64,
    /// The `keep` key.
    pub keep: i64,
    /// The `match` key, if present.
    pub pattern: Option<String>,
}

impl WatchSection {
    /// Extracts a section from parsed INI properties.
    fn from_properties(name: &str, props: &Properties) -> Result<Self, ConfigWarning> {
        let required = |key: &str| {
            lookup(props, key)
                .ok_or_else(|| ConfigWarning::new(name, format!("missing option '{key}'")))
        };
        let integer = |key: &str| {
            let raw = required(key)?;
            raw.parse::<i64>().map_err(|_| {
                ConfigWarning::new(name, format!("option '{key}' is not an integer: {raw:?}"))
            })
        };

        Ok(Self {
            name: name.to_owned(),
            directory: Utf8PathBuf::from(required(KEY_DIRECTORY)?),
            max: integer(KEY_MAX)?,
            keep: integer(KEY_KEEP)?,
            pattern: lookup(props, KEY_MATCH).map(str::to_owned),
        })
    }

    /// Validates the section into a [`WatchSpec`].
    ///
    /// # Errors
    ///
    /// Returns the validation error from [`WatchSpec::new`].
    pub fn spec(&self) -> Result<WatchSpec, ConfigError> {
        WatchSpec::new(
            self.directory.clone(),
            self.max,
            self.keep,
            self.pattern.as_deref(),
        )
    }
}

/// Keys are matched case-insensitively, like most INI readers do.
fn lookup<'a>(props: &'a Properties, key: &str) -> Option<&'a str> {
    props
        .iter()
        .find(|(k, _)| k.trim().eq_ignore_ascii_case(key))
        .map(|(_, v)| v.trim())
}

/// A parsed limits configuration file.
///
/// # Examples
///
/// ```
/// use lf_core::LimitsConfig;
///
/// let config = LimitsConfig::parse(
///     "limits.ini".into(),
///     "[spool]\ndirectory = /tmp\nmax = 10\nkeep = 5\n\n[broken]\ndirectory = /tmp\n",
/// )?;
/// assert_eq!(config.sections().len(), 1);
/// assert_eq!(config.warnings().len(), 1);
/// # Ok::<(), lf_core::ConfigError>(())
/// ```
#[derive(Debug, Clone)]
pub struct LimitsConfig {
    path: Utf8PathBuf,
    sections: Vec<WatchSection>,
    warnings: Vec<ConfigWarning>,
}

impl LimitsConfig {
    /// Reads and parses the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not valid INI.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(path.to_owned(), &text)
    }

    /// Parses configuration text. `path` is only used in messages.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if `text` is not valid INI.
    pub fn parse(path: Utf8PathBuf, text: &str) -> Result<Self, ConfigError> {
        // Backslashes must reach the regex compiler untouched.
        let options = ParseOption {
            enabled_escape: false,
            ..ParseOption::default()
        };
        let ini = match Ini::load_from_str_opt(text, options) {
            Ok(ini) => ini,
            Err(source) => return Err(ConfigError::Parse { path, source }),
        };

        let mut sections = Vec::new();
        let mut warnings = Vec::new();

        for (name, props) in ini.iter() {
            match name {
                Some(name) => match WatchSection::from_properties(name, props) {
                    Ok(section) => sections.push(section),
                    Err(warning) => warnings.push(warning),
                },
                None if props.iter().next().is_some() => {
                    warnings.push(ConfigWarning::new(
                        "(no section)",
                        "options must follow a [section] header",
                    ));
                }
                None => {}
            }
        }

        tracing::debug!(
            path = %path,
            sections = sections.len(),
            warnings = warnings.len(),
            "Parsed limits configuration"
        );

        Ok(Self {
            path,
            sections,
            warnings,
        })
    }

    /// The file this configuration came from.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Sections that had every required key.
    #[must_use]
    pub fn sections(&self) -> &[WatchSection] {
        &self.sections
    }

    /// Problems found while reading sections.
    #[must_use]
    pub fn warnings(&self) -> &[ConfigWarning] {
        &self.warnings
    }

    /// Validates each section into a [`WatchSpec`].
    ///
    /// Yields a warning instead of a spec for sections with invalid
    /// watermarks or patterns, and for sections whose directory does not
    /// exist or is not a directory.
    pub fn watch_specs(&self) -> impl Iterator<Item = Result<WatchSpec, ConfigWarning>> + '_ {
        self.sections.iter().map(|section| {
            let spec = section
                .spec()
                .map_err(|err| ConfigWarning::new(&section.name, err))?;
            if !spec.directory().is_dir() {
                return Err(ConfigWarning::new(
                    &section.name,
                    format!("{} is not a directory", spec.directory()),
                ));
            }
            Ok(spec)
        })
    }
}
