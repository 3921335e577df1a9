//! Turning configuration into live watches.

use lf_core::{ConfigError, ConfigWarning, LimitsConfig, WatchSpec};
use lf_watcher::WatchRegistry;
use tracing::warn;

/// Logs every warning the configuration loader collected.
pub fn report_warnings(config: &LimitsConfig) {
    for warning in config.warnings() {
        warn!(section = %warning.section, "{warning}");
    }
}

/// The sections that validate, logging a warning for each one that doesn't.
///
/// # Errors
///
/// Returns [`ConfigError::NoValidSections`] if nothing validates.
pub fn valid_specs(config: &LimitsConfig) -> Result<Vec<WatchSpec>, ConfigError> {
    let specs: Vec<WatchSpec> = config
        .watch_specs()
        .filter_map(|spec| {
            spec.inspect_err(|warning| warn!(section = %warning.section, "{warning}"))
                .ok()
        })
        .collect();

    if specs.is_empty() {
        return Err(ConfigError::NoValidSections(config.path().to_owned()));
    }
    Ok(specs)
}

/// Registers a watch for every valid section.
///
/// Each registration scans its directory and evicts once, so this deletes
/// files. Sections that fail to register are logged and skipped.
///
/// # Errors
///
/// Returns [`ConfigError::NoValidSections`] if no watch could be registered.
pub fn register(config: &LimitsConfig) -> Result<WatchRegistry, ConfigError> {
    let mut registry = WatchRegistry::new();
    for spec in valid_specs(config)? {
        if let Err(error) = registry.add_watch(&spec) {
            let warning = ConfigWarning::new(spec.directory().as_str(), &error);
            warn!(directory = %spec.directory(), "{warning}");
        }
    }

    if registry.is_empty() {
        return Err(ConfigError::NoValidSections(config.path().to_owned()));
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use lf_watcher::Limiter;
    use std::fs;
    use tempfile::TempDir;

    fn scratch_dir() -> (TempDir, Utf8PathBuf) {
        let temp = TempDir::new().expect("Failed to create temp directory");
        let path = Utf8PathBuf::from_path_buf(temp.path().to_path_buf())
            .expect("temp path is UTF-8")
            .canonicalize_utf8()
            .expect("canonical temp path");
        (temp, path)
    }

    fn config(text: &str) -> LimitsConfig {
        LimitsConfig::parse(Utf8PathBuf::from("limits.ini"), text).expect("valid INI")
    }

    #[test]
    fn test_register_skips_bad_sections() {
        let (_temp, dir) = scratch_dir();
        let text = format!(
            "[good]\ndirectory = {dir}\nmax = 5\nkeep = 2\n\n\
             [upside-down]\ndirectory = {dir}\nmax = 1\nkeep = 2\n\n\
             [missing]\ndirectory = {dir}/nope\nmax = 5\nkeep = 2\n"
        );
        let registry = register(&config(&text)).expect("one valid watch");
        assert_eq!(registry.len(), 1);
        assert!(registry.lookup(&dir).is_some());
    }

    #[test]
    fn test_duplicate_directory_keeps_first_watch() {
        let (_temp, dir) = scratch_dir();
        let text = format!(
            "[first]\ndirectory = {dir}\nmax = 5\nkeep = 2\n\n\
             [second]\ndirectory = {dir}/.\nmax = 9\nkeep = 1\n"
        );
        let registry = register(&config(&text)).expect("valid watches");
        assert_eq!(registry.len(), 1);
        let id = registry.lookup(&dir).expect("watched");
        assert_eq!(registry.get(id).map(|l| l.spec().high()), Some(5));
    }

    #[test]
    fn test_register_evicts_immediately() {
        let (_temp, dir) = scratch_dir();
        for n in 0..4 {
            fs::write(dir.join(format!("f{n}")), "x").expect("write");
        }
        let text = format!("[spool]\ndirectory = {dir}\nmax = 3\nkeep = 1\n");
        let registry = register(&config(&text)).expect("valid watch");
        let id = registry.lookup(&dir).expect("watched");
        assert_eq!(registry.get(id).map(Limiter::len), Some(1));
        assert_eq!(fs::read_dir(&dir).expect("list").count(), 1);
    }

    #[test]
    fn test_no_valid_sections() {
        let err = register(&config("[broken]\nmax = 5\nkeep = 2\n")).unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"no valid sections in limits.ini");

        let err = valid_specs(&config("")).unwrap_err();
        assert!(matches!(err, ConfigError::NoValidSections(_)));
    }

    #[test]
    fn test_valid_specs_does_not_touch_files() {
        let (_temp, dir) = scratch_dir();
        for n in 0..4 {
            fs::write(dir.join(format!("f{n}")), "x").expect("write");
        }
        let text = format!("[spool]\ndirectory = {dir}\nmax = 1\nkeep = 0\n");
        let specs = valid_specs(&config(&text)).expect("valid");
        assert_eq!(specs.len(), 1);
        assert_eq!(fs::read_dir(&dir).expect("list").count(), 4);
    }
}
