//! Error types for the lf-watcher crate.
//!
//! This module provides the [`WatchError`] type for errors that can occur
//! while registering watches, scanning directories, evicting files, and
//! running the notification backend, plus [`WatchFailure`] for a watch that
//! stopped during live operation.

use camino::Utf8PathBuf;

use crate::registry::WatchId;

/// Errors that can occur during watch operations.
///
/// Filesystem races (a file vanishing between notification and `stat`, a
/// delete refused with `EACCES`/`EPERM`) never surface here; the limiter
/// absorbs them. What remains is either a setup problem or an OS failure the
/// limiter cannot reason about.
///
/// # Error Recovery Strategy
///
/// - **Notify errors** ([`WatchError::Notify`]): Fatal - the backend is broken
/// - **Not a directory** ([`WatchError::NotADirectory`]): Fatal for that watch
/// - **I/O errors** ([`WatchError::Io`]): Fatal for that watch
/// - **Channel closed** ([`WatchError::ChannelClosed`]): Fatal - no more events
/// - **Already watched** ([`WatchError::AlreadyWatched`]): Keep the first watch
/// - **Unknown watch** ([`WatchError::UnknownWatch`]): Nothing to remove
///
/// Non-UTF-8 file names are not errors: they are logged and skipped where
/// they are seen.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The notification backend failed.
    #[error("notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// The watch target is missing or is not a directory.
    #[error("{0} is not a directory")]
    NotADirectory(Utf8PathBuf),

    /// An unexpected I/O error on a specific path.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The path being listed, stat'ed, or deleted.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The event channel was closed unexpectedly.
    #[error("event channel closed unexpectedly")]
    ChannelClosed,

    /// The directory already has a limiter.
    #[error("{0} is already watched")]
    AlreadyWatched(Utf8PathBuf),

    /// No watch with this id is registered.
    #[error("no such watch: {0}")]
    UnknownWatch(WatchId),
}

impl WatchError {
    /// Creates a new [`WatchError::Io`] error.
    #[inline]
    pub fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a new [`WatchError::NotADirectory`] error.
    #[inline]
    pub fn not_a_directory(path: impl Into<Utf8PathBuf>) -> Self {
        Self::NotADirectory(path.into())
    }
}

/// A watch that stopped because its limiter hit an unrecoverable error.
///
/// The registry has already dropped the limiter when this is reported.
#[derive(Debug, thiserror::Error)]
#[error("watch on {directory} stopped: {source}")]
pub struct WatchFailure {
    /// The id the watch was registered under.
    pub id: WatchId,
    /// The watched directory.
    pub directory: Utf8PathBuf,
    /// What went wrong.
    #[source]
    pub source: WatchError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_watch_error_not_a_directory() {
        let err = WatchError::not_a_directory("/etc/passwd");
        insta::assert_snapshot!(err.to_string(), @"/etc/passwd is not a directory");
    }

    #[test]
    fn test_watch_error_io() {
        let err = WatchError::io("/spool/1", io::Error::other("disk on fire"));
        assert!(err.to_string().contains("/spool/1"));
        assert!(err.to_string().contains("disk on fire"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_registry_errors() {
        let err = WatchError::AlreadyWatched(Utf8PathBuf::from("/spool"));
        assert_eq!(err.to_string(), "/spool is already watched");
        let err = WatchError::UnknownWatch(WatchId::new(7));
        assert_eq!(err.to_string(), "no such watch: #7");
    }

    #[test]
    fn test_watch_failure_display() {
        let failure = WatchFailure {
            id: WatchId::new(1),
            directory: Utf8PathBuf::from("/spool"),
            source: WatchError::not_a_directory("/spool"),
        };
        insta::assert_snapshot!(
            failure.to_string(),
            @"watch on /spool stopped: /spool is not a directory"
        );
    }
}
