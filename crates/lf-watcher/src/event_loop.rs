//! The daemon's main loop.
//!
//! [`attach`] registers every limiter's directory with the backend, and
//! [`run`] then feeds notifications to the registry until a shutdown signal
//! arrives or no watches remain.

use tracing::{debug, info, warn};

use crate::error::{WatchError, WatchFailure};
use crate::events::LimitEvent;
use crate::registry::WatchRegistry;
use crate::watcher::FileWatcher;

/// Why [`run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The shutdown future completed.
    Shutdown,
    /// Every watch failed (or none were registered).
    NoWatchesLeft,
}

/// Watches every registered directory, then rescans them all.
///
/// The rescan picks up anything that changed between the initial scans and
/// the backend starting. Directories the backend refuses are dropped from the
/// registry and reported.
pub fn attach(watcher: &mut FileWatcher, registry: &mut WatchRegistry) -> Vec<WatchFailure> {
    let directories: Vec<_> = registry
        .directories()
        .map(|(id, directory)| (id, directory.to_owned()))
        .collect();

    let mut failures = Vec::new();
    for (id, directory) in directories {
        if let Err(source) = watcher.watch(&directory) {
            warn!(directory = %directory, error = %source, "Could not watch directory");
            registry.remove_watch(id).ok();
            failures.push(WatchFailure {
                id,
                directory,
                source,
            });
        }
    }

    failures.extend(registry.dispatch(&LimitEvent::overflow()));
    failures
}

/// Dispatches events until `shutdown` completes or no watches remain.
///
/// Watches that fail are unregistered from both the registry and the backend
/// and logged; the loop carries on with the rest.
///
/// # Errors
///
/// Returns [`WatchError::ChannelClosed`] if the backend stops delivering
/// events.
pub async fn run<F>(
    watcher: &mut FileWatcher,
    registry: &mut WatchRegistry,
    shutdown: F,
) -> Result<LoopExit, WatchError>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    info!(watches = registry.len(), "Event loop started");
    loop {
        if registry.is_empty() {
            warn!("No watches left");
            return Ok(LoopExit::NoWatchesLeft);
        }

        tokio::select! {
            () = &mut shutdown => {
                info!("Shutdown requested");
                return Ok(LoopExit::Shutdown);
            }
            event = watcher.recv() => {
                let event = event.ok_or(WatchError::ChannelClosed)?;
                for failure in registry.dispatch(&event) {
                    if let Err(e) = watcher.unwatch(&failure.directory) {
                        debug!(directory = %failure.directory, error = %e, "Unwatch failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::Limiter;
    use crate::limiter::tests::Workdir;
    use lf_core::WatchSpec;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn spec(dir: &Workdir, high: i64, low: i64) -> WatchSpec {
        WatchSpec::new(dir.path.clone(), high, low, None).expect("valid spec")
    }

    #[tokio::test]
    async fn test_empty_registry_exits_immediately() {
        let mut watcher = FileWatcher::new().expect("watcher");
        let mut registry = WatchRegistry::new();
        let exit = run(&mut watcher, &mut registry, std::future::pending())
            .await
            .expect("loop");
        assert_eq!(exit, LoopExit::NoWatchesLeft);
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let dir = Workdir::new();
        let mut watcher = FileWatcher::new().expect("watcher");
        let mut registry = WatchRegistry::new();
        registry.add_watch(&spec(&dir, 5, 2)).expect("add");
        assert!(attach(&mut watcher, &mut registry).is_empty());

        let exit = run(&mut watcher, &mut registry, async {})
            .await
            .expect("loop");
        assert_eq!(exit, LoopExit::Shutdown);
    }

    #[tokio::test]
    async fn test_attach_rescans_after_watching() {
        let mut dir = Workdir::new();
        let mut watcher = FileWatcher::new().expect("watcher");
        let mut registry = WatchRegistry::new();
        let id = registry.add_watch(&spec(&dir, 5, 2)).expect("add");

        // Arrives after the initial scan, before the backend is listening
        dir.create_files(6);

        assert!(attach(&mut watcher, &mut registry).is_empty());
        assert!(watcher.is_watching(&dir.path));
        assert_eq!(registry.get(id).map(Limiter::len), Some(2));
        dir.assert_files_left([5, 6], [0u64; 0]);
    }

    #[tokio::test]
    async fn test_attach_drops_unwatchable_directory() {
        let dir = Workdir::new();
        let mut watcher = FileWatcher::new().expect("watcher");
        let mut registry = WatchRegistry::new();
        let id = registry.add_watch(&spec(&dir, 5, 2)).expect("add");
        std::fs::remove_dir_all(&dir.path).expect("remove workdir");

        let failures = attach(&mut watcher, &mut registry);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].id, id);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_live_events_enforce_limit() {
        let mut dir = Workdir::new();
        let mut watcher = FileWatcher::new().expect("watcher");
        let mut registry = WatchRegistry::new();
        let id = registry.add_watch(&spec(&dir, 3, 1)).expect("add");
        assert!(attach(&mut watcher, &mut registry).is_empty());

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let driver = async {
            dir.create_files(5);
            for _ in 0..100 {
                if dir.listing().len() <= 2 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            let _ = stop_tx.send(());
        };
        let shutdown = async {
            let _ = stop_rx.await;
        };

        let (exit, ()) = tokio::join!(run(&mut watcher, &mut registry, shutdown), driver);
        assert_eq!(exit.expect("loop"), LoopExit::Shutdown);

        let left = dir.listing().len();
        assert!((1..=2).contains(&left), "{left} files left");
        assert_eq!(registry.get(id).map(Limiter::len), Some(left));
    }
}
