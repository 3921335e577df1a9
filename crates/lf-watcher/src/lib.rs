//! Directory limiters driven by filesystem notifications.
//!
//! This crate keeps watched directories between a low and a high watermark of
//! files. Each directory gets a [`Limiter`] that tracks file mtimes and
//! deletes the oldest files once the population reaches the high watermark.
//! Notifications come from the `notify` crate and are bridged to a tokio
//! event loop.
//!
//! # Overview
//!
//! - [`LimitEvent`] / [`ChangeKind`] - notifications reduced to what a
//!   limiter cares about
//! - [`Limiter`] - per-directory bookkeeping and eviction
//! - [`WatchRegistry`] - all limiters, routing events by directory
//! - [`FileWatcher`] - the `notify` backend behind an mpsc channel
//! - [`attach`] / [`run`] - the daemon's main loop
//!
//! # Architecture
//!
//! ```text
//!  notify backend thread          tokio runtime (current thread)
//! ┌────────────────────┐         ┌──────────────────────────────────┐
//! │ RecommendedWatcher │ events  │ run()                            │
//! │   └─► from_notify ─┼────────►│   └─► WatchRegistry::dispatch    │
//! └────────────────────┘  mpsc   │          ├─► Limiter::handle     │
//!                                │          └─► Limiter::resync     │
//!                                └──────────────────────────────────┘
//! ```
//!
//! # Crate Dependencies
//!
//! ```text
//! lf-cli ──► lf-watcher ──► lf-core
//!        └──────────────────►
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use lf_core::WatchSpec;
//! use lf_watcher::{FileWatcher, WatchRegistry, attach, run};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut registry = WatchRegistry::new();
//!     registry.add_watch(&WatchSpec::new("/var/spool/in", 100, 20, None)?)?;
//!
//!     let mut watcher = FileWatcher::new()?;
//!     for failure in attach(&mut watcher, &mut registry) {
//!         eprintln!("{failure}");
//!     }
//!
//!     let shutdown = async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     };
//!     run(&mut watcher, &mut registry, shutdown).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! Filesystem races never surface as errors. [`WatchError`] is for setup
//! problems and OS failures a limiter cannot reason about; a limiter that
//! hits one during live operation is dropped and reported as a
//! [`WatchFailure`] while the others keep running.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod event_loop;
pub mod events;
pub mod limiter;
pub mod registry;
pub mod watcher;

// Re-export error types
pub use error::{WatchError, WatchFailure};

// Re-export event types
pub use events::{ChangeKind, LimitEvent};

// Re-export limiter types
pub use limiter::{EvictionReport, FileRemover, Limiter, StdRemover};

// Re-export registry and loop types
pub use event_loop::{LoopExit, attach, run};
pub use registry::{WatchId, WatchRegistry};

// Re-export watcher types
pub use watcher::{DEFAULT_CHANNEL_CAPACITY, FileWatcher};
