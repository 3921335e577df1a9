//! Change events consumed by limiters.
//!
//! The notification backend speaks in `notify` events, which carry more
//! detail than a limiter needs and sometimes describe two paths at once (a
//! rename). [`LimitEvent::from_notify`] flattens them into one event per path,
//! tagged with a [`ChangeKind`], plus an [`LimitEvent::Overflow`] marker when
//! the backend reports that events were dropped.
//!
//! # Event Flow
//!
//! ```text
//! inotify / FSEvents / ...
//!        │
//!        ▼
//!   notify::Event ──► LimitEvent::from_notify ──► mpsc channel
//!                                                     │
//!                                                     ▼
//!                                         WatchRegistry::dispatch
//! ```

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use notify::EventKind;
use notify::event::{ModifyKind, RenameMode};
use smallvec::SmallVec;

/// What happened to a path inside a watched directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// A new entry appeared.
    Created,
    /// Permissions, ownership, or timestamps changed.
    AttributeChanged,
    /// File content was written.
    ContentModified,
    /// An entry was moved into the directory.
    RenamedIn,
    /// An entry was moved out of the directory.
    RenamedOut,
    /// An entry was deleted.
    Deleted,
}

impl ChangeKind {
    /// Every change kind, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Created,
        Self::AttributeChanged,
        Self::ContentModified,
        Self::RenamedIn,
        Self::RenamedOut,
        Self::Deleted,
    ];

    /// A short lowercase label for logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::AttributeChanged => "attrib",
            Self::ContentModified => "modified",
            Self::RenamedIn => "renamed-in",
            Self::RenamedOut => "renamed-out",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single notification, routed to limiters by directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitEvent {
    /// A path changed.
    Change {
        /// What happened.
        kind: ChangeKind,
        /// The absolute path of the entry (or of the watched directory itself
        /// for events about the directory).
        path: Utf8PathBuf,
    },

    /// The backend dropped events; the in-memory view can't be trusted.
    Overflow {
        /// The affected directory, or `None` when the backend cannot tell
        /// (inotify queue overflow affects every watch).
        directory: Option<Utf8PathBuf>,
    },
}

impl LimitEvent {
    /// Creates a [`LimitEvent::Change`].
    #[inline]
    pub fn change(kind: ChangeKind, path: impl Into<Utf8PathBuf>) -> Self {
        Self::Change {
            kind,
            path: path.into(),
        }
    }

    /// Creates an overflow event affecting every watch.
    #[inline]
    #[must_use]
    pub const fn overflow() -> Self {
        Self::Overflow { directory: None }
    }

    /// Returns the path this event is about, if it names one.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Change { path, .. } => Some(path),
            Self::Overflow { directory } => directory.as_deref(),
        }
    }

    /// Converts a raw `notify` event into limiter events.
    ///
    /// - Rescan-flagged events become [`LimitEvent::Overflow`].
    /// - A rename carrying both paths becomes a `RenamedOut` for the old path
    ///   followed by a `RenamedIn` for the new one.
    /// - Renames of unknown direction become `RenamedIn`; the limiter re-stats
    ///   the path and drops it if it is gone.
    /// - Access events and anything else unsubscribed produce nothing.
    ///
    /// Non-UTF-8 paths are skipped with a warning.
    #[must_use]
    pub fn from_notify(event: notify::Event) -> SmallVec<[Self; 2]> {
        let mut out = SmallVec::new();

        if event.need_rescan() {
            if event.paths.is_empty() {
                out.push(Self::overflow());
            } else {
                out.extend(utf8_paths(event.paths).map(|directory| Self::Overflow {
                    directory: Some(directory),
                }));
            }
            return out;
        }

        let kind = match event.kind {
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                let mut paths = utf8_paths(event.paths);
                if let Some(from) = paths.next() {
                    out.push(Self::change(ChangeKind::RenamedOut, from));
                }
                if let Some(to) = paths.next() {
                    out.push(Self::change(ChangeKind::RenamedIn, to));
                }
                return out;
            }
            EventKind::Create(_) => ChangeKind::Created,
            EventKind::Modify(ModifyKind::Metadata(_)) => ChangeKind::AttributeChanged,
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeKind::RenamedOut,
            EventKind::Modify(ModifyKind::Name(_)) => ChangeKind::RenamedIn,
            EventKind::Modify(_) => ChangeKind::ContentModified,
            EventKind::Remove(_) => ChangeKind::Deleted,
            EventKind::Access(_) | EventKind::Any | EventKind::Other => {
                tracing::trace!(kind = ?event.kind, "Ignoring unsubscribed event");
                return out;
            }
        };

        out.extend(utf8_paths(event.paths).map(|path| Self::change(kind, path)));
        out
    }
}

fn utf8_paths(paths: Vec<std::path::PathBuf>) -> impl Iterator<Item = Utf8PathBuf> {
    paths
        .into_iter()
        .filter_map(|path| match Utf8PathBuf::try_from(path) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(
                    path = %e.into_path_buf().display(),
                    "Skipping non-UTF-8 path in file event"
                );
                None
            }
        })
}
