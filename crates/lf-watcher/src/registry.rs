//! Watch bookkeeping and event routing.
//!
//! The [`WatchRegistry`] owns every live [`Limiter`], indexed both by a
//! stable [`WatchId`] and by directory. Incoming [`LimitEvent`]s are routed by
//! path: an event naming a watched directory goes to that directory's limiter
//! (the directory's own attributes changed), otherwise it goes to the limiter
//! of the event's parent directory.
//!
//! A limiter that fails while handling an event is removed and reported as a
//! [`WatchFailure`]; the other watches are unaffected.

use std::collections::BTreeMap;
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use lf_core::{FxHashMap, WatchSpec};
use tracing::{debug, error, info, trace};

use crate::error::{WatchError, WatchFailure};
use crate::events::{ChangeKind, LimitEvent};
use crate::limiter::Limiter;

/// Opaque handle for a registered watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(u64);

impl WatchId {
    /// Wraps a raw id.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// All active limiters.
///
/// # Examples
///
/// ```no_run
/// use lf_core::WatchSpec;
/// use lf_watcher::{LimitEvent, WatchRegistry};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut registry = WatchRegistry::new();
/// let id = registry.add_watch(&WatchSpec::new("/var/spool/in", 50, 10, None)?)?;
///
/// for failure in registry.dispatch(&LimitEvent::overflow()) {
///     eprintln!("{failure}");
/// }
///
/// let limiter = registry.remove_watch(id)?;
/// assert_eq!(limiter.directory(), "/var/spool/in");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct WatchRegistry {
    limiters: BTreeMap<WatchId, Limiter>,
    by_directory: FxHashMap<Utf8PathBuf, WatchId>,
    next_id: u64,
}

impl WatchRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a limiter for `spec` (scanning and evicting once) and registers
    /// it.
    ///
    /// # Errors
    ///
    /// - [`WatchError::AlreadyWatched`] if the canonical directory already
    ///   has a limiter
    /// - Anything [`Limiter::new`] returns
    pub fn add_watch(&mut self, spec: &WatchSpec) -> Result<WatchId, WatchError> {
        if let Ok(canonical) = spec.directory().canonicalize_utf8() {
            if self.by_directory.contains_key(&canonical) {
                return Err(WatchError::AlreadyWatched(canonical));
            }
        }
        self.add_limiter(Limiter::new(spec)?)
    }

    /// Registers an already-built limiter.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::AlreadyWatched`] if its directory already has a
    /// limiter.
    pub fn add_limiter(&mut self, limiter: Limiter) -> Result<WatchId, WatchError> {
        let directory = limiter.directory().to_owned();
        if self.by_directory.contains_key(&directory) {
            return Err(WatchError::AlreadyWatched(directory));
        }

        self.next_id += 1;
        let id = WatchId(self.next_id);
        debug!(id = %id, directory = %directory, "Registered watch");
        self.by_directory.insert(directory, id);
        self.limiters.insert(id, limiter);
        Ok(id)
    }

    /// Unregisters a watch and returns its limiter.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::UnknownWatch`] if `id` is not registered.
    pub fn remove_watch(&mut self, id: WatchId) -> Result<Limiter, WatchError> {
        let limiter = self
            .limiters
            .remove(&id)
            .ok_or(WatchError::UnknownWatch(id))?;
        self.by_directory.remove(limiter.directory());
        debug!(id = %id, directory = %limiter.directory(), "Removed watch");
        Ok(limiter)
    }

    /// The limiter registered under `id`.
    #[must_use]
    pub fn get(&self, id: WatchId) -> Option<&Limiter> {
        self.limiters.get(&id)
    }

    /// The id watching `directory` (canonical form), if any.
    #[must_use]
    pub fn lookup(&self, directory: &Utf8Path) -> Option<WatchId> {
        self.by_directory.get(directory).copied()
    }

    /// Every watched directory with its id, in registration order.
    pub fn directories(&self) -> impl Iterator<Item = (WatchId, &Utf8Path)> {
        self.limiters
            .iter()
            .map(|(id, limiter)| (*id, limiter.directory()))
    }

    /// Number of registered watches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    /// Returns `true` if nothing is watched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }

    /// Routes one event to the limiter(s) it concerns.
    ///
    /// Returns the watches that failed while handling it. Those have already
    /// been removed from the registry.
    pub fn dispatch(&mut self, event: &LimitEvent) -> Vec<WatchFailure> {
        match event {
            LimitEvent::Change { kind, path } => self.dispatch_change(*kind, path),
            LimitEvent::Overflow { directory } => self.dispatch_overflow(directory.as_deref()),
        }
    }

    fn dispatch_change(&mut self, kind: ChangeKind, path: &Utf8Path) -> Vec<WatchFailure> {
        if !Limiter::SUBSCRIBED.contains(&kind) {
            return Vec::new();
        }
        let Some(id) = self.route(path) else {
            trace!(kind = %kind, path = %path, "No watch for event");
            return Vec::new();
        };

        let result = match self.limiters.get_mut(&id) {
            Some(limiter) => limiter.handle(kind, path),
            None => return Vec::new(),
        };
        result
            .err()
            .map(|source| self.fail(id, source))
            .into_iter()
            .collect()
    }

    fn dispatch_overflow(&mut self, directory: Option<&Utf8Path>) -> Vec<WatchFailure> {
        let targets: Vec<WatchId> = match directory {
            Some(directory) => self.route(directory).into_iter().collect(),
            None => self.limiters.keys().copied().collect(),
        };
        info!(watches = targets.len(), "Events were lost, resynchronizing");

        let mut failures = Vec::new();
        for id in targets {
            let result = match self.limiters.get_mut(&id) {
                Some(limiter) => limiter.resync(),
                None => continue,
            };
            if let Err(source) = result {
                failures.push(self.fail(id, source));
            }
        }
        failures
    }

    /// Exact directory match first, then the parent directory.
    fn route(&self, path: &Utf8Path) -> Option<WatchId> {
        self.lookup(path)
            .or_else(|| path.parent().and_then(|parent| self.lookup(parent)))
    }

    fn fail(&mut self, id: WatchId, source: WatchError) -> WatchFailure {
        let directory = match self.remove_watch(id) {
            Ok(limiter) => limiter.directory().to_owned(),
            Err(_) => Utf8PathBuf::new(),
        };
        error!(id = %id, directory = %directory, error = %source, "Watch stopped");
        WatchFailure {
            id,
            directory,
            source,
        }
    }
}
