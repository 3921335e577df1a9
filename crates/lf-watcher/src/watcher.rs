//! Notification backend with async event streaming.
//!
//! This module provides the [`FileWatcher`] type that bridges the synchronous
//! `notify` crate to the async tokio runtime.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 notify backend thread                        │
//! │  ┌───────────────────┐    ┌──────────────────────────────┐   │
//! │  │ RecommendedWatcher │ -> │ Callback                     │   │
//! │  │ (inotify, ...)     │    │ (LimitEvent::from_notify)    │   │
//! │  └───────────────────┘    └──────────────┬───────────────┘   │
//! └──────────────────────────────────────────│───────────────────┘
//!                                            │ blocking_send
//!                                            ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 async runtime (tokio)                        │
//! │  ┌──────────────────┐    ┌────────────────┐                  │
//! │  │ FileWatcher      │    │ mpsc::Receiver │ -> event loop    │
//! │  │ (watch/unwatch)  │    │ (LimitEvent)   │                  │
//! │  └──────────────────┘    └────────────────┘                  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The backend thread is owned by `notify` and lives exactly as long as the
//! [`FileWatcher`]. Events are not debounced: a limiter needs to see every
//! kind of change, and repeated events for one path are idempotent.
//!
//! The channel is bounded. When the consumer falls behind, the backend thread
//! blocks, the kernel queue fills, and the kernel reports an overflow, which
//! arrives as [`LimitEvent::Overflow`] and triggers a rescan.

use camino::{Utf8Path, Utf8PathBuf};
use lf_core::FxHashSet;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::WatchError;
use crate::events::LimitEvent;

/// Default channel capacity for limiter events.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Watches directories (non-recursively) and streams [`LimitEvent`]s.
///
/// Must be created after the process has forked into the background: the
/// backend thread does not survive `fork`.
///
/// # Examples
///
/// ```no_run
/// use camino::Utf8Path;
/// use lf_watcher::FileWatcher;
///
/// # async fn example() -> Result<(), lf_watcher::WatchError> {
/// let mut watcher = FileWatcher::new()?;
/// watcher.watch(Utf8Path::new("/var/spool/in"))?;
///
/// while let Some(event) = watcher.recv().await {
///     println!("{event:?}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct FileWatcher {
    /// The backend. Dropping it stops the backend thread and closes the
    /// sending half of the channel.
    watcher: RecommendedWatcher,

    /// Event receiver for async consumption.
    event_rx: mpsc::Receiver<LimitEvent>,

    /// Directories currently registered with the backend.
    watched: FxHashSet<Utf8PathBuf>,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("watched", &self.watched)
            .finish_non_exhaustive()
    }
}

impl FileWatcher {
    /// Starts the notification backend with the default channel capacity.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Notify`] if the backend fails to initialize
    /// (for example, the inotify instance limit is exhausted).
    pub fn new() -> Result<Self, WatchError> {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Starts the notification backend with a custom channel capacity.
    ///
    /// # Errors
    ///
    /// Same as [`FileWatcher::new`].
    pub fn with_capacity(channel_capacity: usize) -> Result<Self, WatchError> {
        let (event_tx, event_rx) = mpsc::channel(channel_capacity);

        let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    for event in LimitEvent::from_notify(event) {
                        if event_tx.blocking_send(event).is_err() {
                            tracing::debug!("Event channel closed, dropping event");
                            return;
                        }
                    }
                }
                Err(error) => tracing::warn!(error = %error, "Notification backend error"),
            }
        })?;

        Ok(Self {
            watcher,
            event_rx,
            watched: FxHashSet::default(),
        })
    }

    /// Starts delivering events for entries of `directory`.
    ///
    /// `directory` should be the canonical path its limiter uses, since event
    /// paths are reported relative to it.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Notify`] if the backend refuses the watch.
    pub fn watch(&mut self, directory: &Utf8Path) -> Result<(), WatchError> {
        self.watcher
            .watch(directory.as_std_path(), RecursiveMode::NonRecursive)?;
        self.watched.insert(directory.to_owned());
        tracing::info!(directory = %directory, "Watching directory");
        Ok(())
    }

    /// Stops delivering events for `directory`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Notify`] if the backend no longer knows the
    /// watch (for example, the directory was deleted).
    pub fn unwatch(&mut self, directory: &Utf8Path) -> Result<(), WatchError> {
        self.watched.remove(directory);
        self.watcher.unwatch(directory.as_std_path())?;
        tracing::debug!(directory = %directory, "Stopped watching directory");
        Ok(())
    }

    /// Returns `true` if `directory` is registered with the backend.
    #[must_use]
    pub fn is_watching(&self, directory: &Utf8Path) -> bool {
        self.watched.contains(directory)
    }

    /// Number of registered directories.
    #[must_use]
    pub fn watch_count(&self) -> usize {
        self.watched.len()
    }

    /// Receives the next event asynchronously.
    ///
    /// Returns `None` only if the backend has shut down.
    pub async fn recv(&mut self) -> Option<LimitEvent> {
        self.event_rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChangeKind;
    use crate::limiter::tests::Workdir;
    use std::fs;
    use std::time::Duration;

    /// Reads events until one satisfies `wanted`, or gives up after a while.
    async fn wait_for(
        watcher: &mut FileWatcher,
        wanted: impl Fn(&LimitEvent) -> bool,
    ) -> Option<LimitEvent> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let event = tokio::time::timeout_at(deadline, watcher.recv()).await.ok()??;
            if wanted(&event) {
                return Some(event);
            }
        }
    }

    #[tokio::test]
    async fn test_watcher_creation() {
        let watcher = FileWatcher::new().expect("Failed to create watcher");
        assert_eq!(watcher.watch_count(), 0);
    }

    #[tokio::test]
    async fn test_watch_and_unwatch() {
        let dir = Workdir::new();
        let mut watcher = FileWatcher::new().expect("Failed to create watcher");

        watcher.watch(&dir.path).expect("watch");
        assert!(watcher.is_watching(&dir.path));

        watcher.unwatch(&dir.path).expect("unwatch");
        assert!(!watcher.is_watching(&dir.path));
        assert_eq!(watcher.watch_count(), 0);
    }

    #[tokio::test]
    async fn test_watch_missing_directory_fails() {
        let dir = Workdir::new();
        let mut watcher = FileWatcher::new().expect("Failed to create watcher");
        let result = watcher.watch(&dir.file("missing"));
        assert!(matches!(result, Err(WatchError::Notify(_))));
        assert_eq!(watcher.watch_count(), 0);
    }

    #[tokio::test]
    async fn test_watcher_receives_created_events() {
        let dir = Workdir::new();
        let mut watcher = FileWatcher::new().expect("Failed to create watcher");
        watcher.watch(&dir.path).expect("watch");

        let file = dir.file("report.csv");
        fs::write(&file, "hello").expect("Failed to write file");

        let event = wait_for(&mut watcher, |event| event.path() == Some(file.as_path())).await;
        assert!(
            matches!(
                event,
                Some(LimitEvent::Change {
                    kind: ChangeKind::Created | ChangeKind::ContentModified,
                    ..
                })
            ),
            "got {event:?}"
        );
    }

    #[tokio::test]
    async fn test_watcher_reports_directory_attribute_changes() {
        use std::os::unix::fs::PermissionsExt;

        let dir = Workdir::new();
        let mut watcher = FileWatcher::new().expect("Failed to create watcher");
        watcher.watch(&dir.path).expect("watch");

        fs::set_permissions(&dir.path, fs::Permissions::from_mode(0o750)).expect("chmod");

        let event = wait_for(&mut watcher, |event| event.path() == Some(dir.path.as_path())).await;
        assert_eq!(
            event,
            Some(LimitEvent::change(ChangeKind::AttributeChanged, dir.path.clone()))
        );
    }
}
