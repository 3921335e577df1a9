//! Detaching from the controlling terminal.
//!
//! Must run before any thread is spawned. In particular the tokio runtime
//! and the `notify` backend are created afterwards.

use daemonize::Daemonize;

/// File mode mask for the daemon.
const UMASK: u32 = 0o022;

/// Turns the current process into a daemon.
///
/// On return the caller is the detached child: in a new session, with `/` as
/// its working directory, umask `022`, and stdin/stdout/stderr on
/// `/dev/null`. The original process has exited with status 0.
///
/// The pidfile is not written here; see [`crate::pidfile::PidFile`].
///
/// # Errors
///
/// Returns the failing step (fork, setsid, chdir, stdio redirection).
pub fn daemonize() -> Result<(), daemonize::Error> {
    Daemonize::new()
        .working_directory("/")
        .umask(UMASK)
        .start()?;
    tracing::debug!(pid = std::process::id(), "Daemonized");
    Ok(())
}
