//! Per-directory file count enforcement.
//!
//! A [`Limiter`] keeps the last-modified time of every matching regular file
//! in one directory. When the tracked population reaches the high watermark
//! it deletes the oldest files until only the low watermark remains.
//!
//! # Hysteresis
//!
//! Eviction fires when `len - low >= delete_threshold`. The threshold starts
//! at `high - low`. If a sweep leaves the population still at or above the
//! trigger, the threshold is raised to one past the current surplus so the
//! limiter stops re-sweeping on every event until the directory grows
//! further. A resync resets it.
//!
//! # Races
//!
//! Files can disappear between a notification and the `stat` that follows,
//! and deletes can be refused. `ENOENT`, `EACCES`, and `EPERM` are absorbed:
//! the path is simply treated as absent. A path chosen for eviction leaves the
//! bookkeeping *before* the delete is attempted, whether or not the delete
//! succeeds, so an undeletable file cannot pin the limiter into a retry loop.
//! Refused deletions are counted; when the directory's own attributes change
//! (say, write permission comes back) the limiter rescans and the survivors
//! become candidates again. Regained delete permission takes effect only
//! once the directory reports that attribute change.

use std::fmt;
use std::fs;
use std::io;
use std::time::SystemTime;

use camino::{Utf8Path, Utf8PathBuf};
use lf_core::{FxHashMap, WatchSpec};
use tracing::{debug, info, trace, warn};

use crate::error::WatchError;
use crate::events::ChangeKind;

/// Deletes files on behalf of a limiter.
///
/// The production implementation is [`StdRemover`]. The seam exists so the
/// refusal path can be exercised without depending on process privileges.
pub trait FileRemover: fmt::Debug + Send {
    /// Removes the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns the OS error from the delete.
    fn remove(&self, path: &Utf8Path) -> io::Result<()>;
}

/// Removes files with [`std::fs::remove_file`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StdRemover;

impl FileRemover for StdRemover {
    #[inline]
    fn remove(&self, path: &Utf8Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

/// What one eviction pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Paths dropped from the bookkeeping (deleted, already gone, or refused).
    pub removed: usize,
    /// Deletes the filesystem refused.
    pub refused: usize,
    /// The new delete threshold, if the pass had to raise it.
    pub threshold_raised: Option<usize>,
}

impl EvictionReport {
    /// Returns `true` if the pass did nothing at all.
    #[inline]
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.removed == 0 && self.threshold_raised.is_none()
    }
}

/// How a directory listing failure is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanMode {
    /// Registering the watch.
    Initial,
    /// Recovering from lost events; the directory itself may be gone.
    Resync,
}

impl ScanMode {
    fn tolerates(self, err: &io::Error) -> bool {
        match self {
            Self::Initial => is_transient(err),
            Self::Resync => is_transient(err) || err.kind() == io::ErrorKind::NotADirectory,
        }
    }
}

/// Errors that mean "someone else got there first" rather than "broken".
///
/// `PermissionDenied` covers both `EACCES` and `EPERM`.
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
    )
}

type Handler = fn(&mut Limiter, &Utf8Path) -> Result<(), WatchError>;

/// Enforces one [`WatchSpec`] on one directory.
///
/// # Examples
///
/// ```no_run
/// use lf_core::WatchSpec;
/// use camino::Utf8Path;
/// use lf_watcher::{ChangeKind, Limiter};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let spec = WatchSpec::new("/var/spool/reports", 100, 20, None)?;
/// let mut limiter = Limiter::new(&spec)?;
///
/// // Fed by the notification backend:
/// limiter.handle(ChangeKind::Created, Utf8Path::new("/var/spool/reports/new.csv"))?;
/// println!("{} files tracked", limiter.len());
/// # Ok(())
/// # }
/// ```
pub struct Limiter {
    /// The spec, with its directory canonicalized.
    spec: WatchSpec,
    /// Absolute path to mtime for every tracked file.
    files: FxHashMap<Utf8PathBuf, SystemTime>,
    /// Current trigger margin over `low`.
    delete_threshold: usize,
    /// Deletes refused since the last full scan.
    refused: usize,
    remover: Box<dyn FileRemover>,
}

impl fmt::Debug for Limiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Limiter")
            .field("directory", &self.spec.directory())
            .field("tracked", &self.files.len())
            .field("low", &self.spec.low())
            .field("delete_threshold", &self.delete_threshold)
            .field("refused", &self.refused)
            .finish_non_exhaustive()
    }
}

impl Limiter {
    /// The change kinds a limiter subscribes to.
    pub const SUBSCRIBED: [ChangeKind; 6] = [
        ChangeKind::Created,
        ChangeKind::AttributeChanged,
        ChangeKind::ContentModified,
        ChangeKind::RenamedIn,
        ChangeKind::RenamedOut,
        ChangeKind::Deleted,
    ];

    /// Which handler runs for each change kind.
    const HANDLERS: [(ChangeKind, Handler); 6] = [
        (ChangeKind::Created, Self::on_arrival),
        (ChangeKind::AttributeChanged, Self::on_attribute_change),
        (ChangeKind::ContentModified, Self::on_arrival),
        (ChangeKind::RenamedIn, Self::on_arrival),
        (ChangeKind::RenamedOut, Self::on_departure),
        (ChangeKind::Deleted, Self::on_departure),
    ];

    /// Creates a limiter, scans the directory, and evicts once.
    ///
    /// # Errors
    ///
    /// - [`WatchError::NotADirectory`] if the directory is missing or is not
    ///   a directory
    /// - [`WatchError::Io`] for any non-transient failure while listing or
    ///   stat'ing entries, or while deleting during the first eviction
    pub fn new(spec: &WatchSpec) -> Result<Self, WatchError> {
        Self::with_remover(spec, Box::new(StdRemover))
    }

    /// Like [`Limiter::new`], deleting through `remover`.
    ///
    /// # Errors
    ///
    /// Same as [`Limiter::new`].
    pub fn with_remover(
        spec: &WatchSpec,
        remover: Box<dyn FileRemover>,
    ) -> Result<Self, WatchError> {
        let directory = canonical_directory(spec.directory())?;

        let mut limiter = Self {
            spec: spec.with_directory(directory),
            files: FxHashMap::default(),
            delete_threshold: spec.threshold(),
            refused: 0,
            remover,
        };
        limiter.scan(ScanMode::Initial)?;
        limiter.evict()?;

        info!(
            directory = %limiter.directory(),
            tracked = limiter.len(),
            high = limiter.spec.high(),
            low = limiter.spec.low(),
            "Limiting directory"
        );
        Ok(limiter)
    }

    /// The watched directory (canonical).
    #[inline]
    #[must_use]
    pub fn directory(&self) -> &Utf8Path {
        self.spec.directory()
    }

    /// The spec this limiter enforces, with the canonical directory.
    #[inline]
    #[must_use]
    pub const fn spec(&self) -> &WatchSpec {
        &self.spec
    }

    /// Number of tracked files.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` if no files are tracked.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Returns `true` if `path` is tracked.
    #[inline]
    #[must_use]
    pub fn contains(&self, path: &Utf8Path) -> bool {
        self.files.contains_key(path)
    }

    /// The recorded mtime of `path`, if tracked.
    #[inline]
    #[must_use]
    pub fn modified(&self, path: &Utf8Path) -> Option<SystemTime> {
        self.files.get(path).copied()
    }

    /// The current trigger margin over the low watermark.
    #[inline]
    #[must_use]
    pub const fn delete_threshold(&self) -> usize {
        self.delete_threshold
    }

    /// Deletes refused since the last full scan.
    #[inline]
    #[must_use]
    pub const fn refused(&self) -> usize {
        self.refused
    }

    /// Applies one change notification.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Io`] for a non-transient `stat` or delete
    /// failure. The limiter should be discarded after that.
    pub fn handle(&mut self, kind: ChangeKind, path: &Utf8Path) -> Result<(), WatchError> {
        let handler = Self::HANDLERS
            .iter()
            .find_map(|&(k, handler)| (k == kind).then_some(handler));
        match handler {
            Some(handler) => handler(self, path),
            None => {
                trace!(kind = %kind, path = %path, "No handler for change");
                Ok(())
            }
        }
    }

    /// Discards all bookkeeping and rebuilds it from a fresh scan.
    ///
    /// Resets the delete threshold to `high - low` and forgets refused
    /// deletions, then evicts.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Io`] for non-transient failures.
    pub fn resync(&mut self) -> Result<EvictionReport, WatchError> {
        debug!(directory = %self.directory(), "Rescanning directory");
        self.delete_threshold = self.spec.threshold();
        self.refused = 0;
        self.scan(ScanMode::Resync)?;
        self.evict()
    }

    /// Evicts the oldest files if the population reached the trigger.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Io`] if a delete fails for a reason other than
    /// the file being gone or the filesystem refusing.
    pub fn evict(&mut self) -> Result<EvictionReport, WatchError> {
        let mut report = EvictionReport::default();
        if !self.over_trigger() {
            return Ok(report);
        }

        let mut by_age: Vec<(SystemTime, Utf8PathBuf)> = self
            .files
            .iter()
            .map(|(path, mtime)| (*mtime, path.clone()))
            .collect();
        by_age.sort_unstable();

        let mut deletes_left = self.files.len() - self.spec.low();
        for (_, path) in by_age {
            if deletes_left == 0 {
                break;
            }
            self.files.remove(&path);
            match self.remover.remove(&path) {
                Ok(()) => trace!(path = %path, "Deleted"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %path, "Already gone");
                }
                Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                    warn!(path = %path, error = %e, "Delete refused");
                    report.refused += 1;
                    self.refused += 1;
                }
                Err(e) => return Err(WatchError::io(path, e)),
            }
            report.removed += 1;
            deletes_left -= 1;
        }

        if self.over_trigger() {
            self.delete_threshold = self.files.len() - self.spec.low() + 1;
            report.threshold_raised = Some(self.delete_threshold);
            warn!(
                directory = %self.directory(),
                threshold = self.delete_threshold,
                "Could not reach low watermark, raising delete threshold"
            );
        }

        info!(
            directory = %self.directory(),
            removed = report.removed,
            refused = report.refused,
            remaining = self.files.len(),
            "Evicted oldest files"
        );
        Ok(report)
    }

    fn over_trigger(&self) -> bool {
        self.files.len() >= self.spec.low().saturating_add(self.delete_threshold)
    }

    fn scan(&mut self, mode: ScanMode) -> Result<(), WatchError> {
        self.files.clear();
        let directory = self.spec.directory().to_owned();

        let entries = match fs::read_dir(&directory) {
            Ok(entries) => entries,
            Err(e) if mode.tolerates(&e) => {
                warn!(directory = %directory, error = %e, "Could not list directory");
                return Ok(());
            }
            Err(e) => return Err(WatchError::io(directory, e)),
        };

        for entry in entries {
            let entry = entry.map_err(|e| WatchError::io(&directory, e))?;
            let Ok(name) = entry.file_name().into_string() else {
                warn!(
                    path = %entry.path().display(),
                    "Skipping non-UTF-8 file name"
                );
                continue;
            };
            if self.spec.matches(&name) {
                self.record(&directory.join(name))?;
            }
        }

        debug!(directory = %directory, tracked = self.files.len(), "Scanned directory");
        Ok(())
    }

    /// Re-stats `path` and updates its entry.
    fn record(&mut self, path: &Utf8Path) -> Result<(), WatchError> {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.file_type().is_file() => {
                let mtime = meta.modified().map_err(|e| WatchError::io(path, e))?;
                self.files.insert(path.to_owned(), mtime);
            }
            Ok(_) => {
                trace!(path = %path, "Not a regular file");
                self.files.remove(path);
            }
            Err(e) if is_transient(&e) => {
                debug!(path = %path, error = %e, "Treating unreadable entry as absent");
                self.files.remove(path);
            }
            Err(e) => return Err(WatchError::io(path, e)),
        }
        Ok(())
    }

    /// Returns `true` if `path` is a direct child whose name counts.
    fn is_candidate(&self, path: &Utf8Path) -> bool {
        path.parent() == Some(self.directory())
            && path.file_name().is_some_and(|name| self.spec.matches(name))
    }

    fn on_arrival(&mut self, path: &Utf8Path) -> Result<(), WatchError> {
        if !self.is_candidate(path) {
            return Ok(());
        }
        self.record(path)?;
        self.evict().map(drop)
    }

    fn on_attribute_change(&mut self, path: &Utf8Path) -> Result<(), WatchError> {
        if path != self.directory() {
            return self.on_arrival(path);
        }
        if self.refused > 0 {
            info!(
                directory = %self.directory(),
                refused = self.refused,
                "Directory attributes changed after refused deletes, rescanning"
            );
            self.resync()?;
        }
        Ok(())
    }

    fn on_departure(&mut self, path: &Utf8Path) -> Result<(), WatchError> {
        if self.files.remove(path).is_some() {
            trace!(path = %path, "Stopped tracking");
        }
        Ok(())
    }
}

fn canonical_directory(directory: &Utf8Path) -> Result<Utf8PathBuf, WatchError> {
    match fs::metadata(directory) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(WatchError::not_a_directory(directory)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(WatchError::not_a_directory(directory));
        }
        Err(e) => return Err(WatchError::io(directory, e)),
    }
    directory
        .canonicalize_utf8()
        .map_err(|e| WatchError::io(directory, e))
}
