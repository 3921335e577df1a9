//! The limitfiles daemon.
//!
//! Keeps directories between a low and a high watermark of files by deleting
//! the oldest ones, driven by filesystem notifications.
//!
//! # Usage
//!
//! ```bash
//! limitfiles [OPTIONS]
//!
//! # Run as a daemon with the default configuration
//! limitfiles --pidfile /run/limitfiles.pid
//!
//! # Run under a supervisor, with debug logging
//! limitfiles --foreground --verbose --config ./limits.ini
//!
//! # Validate a configuration and print the watches it describes
//! limitfiles --check --config ./limits.ini
//! ```
//!
//! # Configuration
//!
//! ```ini
//! [reports]
//! directory = /var/spool/reports
//! max = 100
//! keep = 20
//! match = \.csv$
//! ```
//!
//! # Exit Codes
//!
//! - `0`: clean shutdown (SIGTERM or Ctrl-C), or `--check` succeeded
//! - `1`: any other fatal error, including every watch failing
//! - `3`: configuration error

#![deny(clippy::all)]
#![warn(missing_docs)]

mod daemon;
mod pidfile;
mod watches;

use std::io::Write;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use color_eyre::eyre::WrapErr;
use lf_core::{ConfigError, DEFAULT_CONFIG_PATH, LimitsConfig};
use lf_watcher::{FileWatcher, LoopExit, WatchRegistry};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::pidfile::PidFile;

/// Exit status for configuration errors.
const EXIT_CONFIG: u8 = 3;

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Deletes the oldest files in watched directories to keep them under a
/// configured size.
#[derive(Debug, Parser)]
#[command(name = "limitfiles", version, about, long_about = None)]
struct Cli {
    /// Configuration file.
    #[arg(short, long, env = "LIMITFILES_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: Utf8PathBuf,

    /// Run in the foreground. No pidfile is written.
    #[arg(short, long)]
    foreground: bool,

    /// Write the daemon's process ID to this file. It must not exist.
    #[arg(short, long)]
    pidfile: Option<Utf8PathBuf>,

    /// Validate the configuration, print the watches as JSON, and exit.
    ///
    /// Nothing is scanned or deleted.
    #[arg(long)]
    check: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long)]
    no_color: bool,
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging to stderr.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default.
/// The `notify` backend is filtered to `warn`.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},notify=warn,mio=warn"))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(use_ansi)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

/// Logs a configuration error and returns the matching exit code.
fn config_error(err: &ConfigError) -> ExitCode {
    error!("limitfiles configuration error: {err}");
    ExitCode::from(EXIT_CONFIG)
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// Prints the valid watches as JSON.
fn run_check(config: &LimitsConfig) -> color_eyre::Result<ExitCode> {
    let specs = match watches::valid_specs(config) {
        Ok(specs) => specs,
        Err(err) => return Ok(config_error(&err)),
    };

    let json = serde_json::to_string_pretty(&specs).wrap_err("Failed to serialize watches")?;
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{json}")?;
    Ok(ExitCode::SUCCESS)
}

/// Runs the event loop until a signal arrives or no watches remain.
async fn serve(mut registry: WatchRegistry) -> color_eyre::Result<LoopExit> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut watcher = FileWatcher::new().wrap_err("Could not start the notification backend")?;
    let failures = lf_watcher::attach(&mut watcher, &mut registry);
    if !failures.is_empty() {
        // each failure was logged where it happened
        warn!(
            failed = failures.len(),
            watching = registry.len(),
            "Some watches could not be started"
        );
    }

    let mut sigterm = signal(SignalKind::terminate())?;
    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            _ = tokio::signal::ctrl_c() => info!("Received interrupt, shutting down"),
        }
    };

    let exit = lf_watcher::run(&mut watcher, &mut registry, shutdown).await?;
    Ok(exit)
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
///
/// The runtime is built by hand because the process may fork first, and
/// neither runtime threads nor the `notify` backend survive a fork.
fn main() -> color_eyre::Result<ExitCode> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Initialize tracing (handles --no-color for log output)
    init_tracing(cli.verbose, cli.no_color);

    // 4. Load configuration
    let config = match LimitsConfig::load(&cli.config) {
        Ok(config) => config,
        Err(err) => return Ok(config_error(&err)),
    };
    watches::report_warnings(&config);

    if cli.check {
        return run_check(&config);
    }

    // 5. Register watches (initial scans run here, on the terminal)
    let registry = match watches::register(&config) {
        Ok(registry) => registry,
        Err(err) => return Ok(config_error(&err)),
    };

    // 6. Detach
    let _pidfile = if cli.foreground {
        if let Some(path) = &cli.pidfile {
            info!(path = %path, "Running in the foreground, not writing pidfile");
        }
        None
    } else {
        daemon::daemonize().wrap_err("Could not daemonize")?;
        cli.pidfile
            .as_ref()
            .map(|path| {
                PidFile::create(path).wrap_err_with(|| format!("Could not create pidfile {path}"))
            })
            .transpose()?
    };

    // 7. Run
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .wrap_err("Could not start the async runtime")?;
    let exit = runtime.block_on(serve(registry))?;

    Ok(match exit {
        LoopExit::Shutdown => ExitCode::SUCCESS,
        LoopExit::NoWatchesLeft => ExitCode::FAILURE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["limitfiles"]).expect("valid arguments");
        assert!(!cli.foreground);
        assert!(!cli.check);
        assert!(cli.pidfile.is_none());
        // LIMITFILES_CONFIG may be set in the environment running the tests
        if std::env::var_os("LIMITFILES_CONFIG").is_none() {
            assert_eq!(cli.config, DEFAULT_CONFIG_PATH);
        }
    }

    #[test]
    fn test_short_flags() {
        let cli = Cli::try_parse_from([
            "limitfiles",
            "-f",
            "-c",
            "/tmp/limits.ini",
            "-p",
            "/tmp/limitfiles.pid",
            "-v",
        ])
        .expect("valid arguments");
        assert!(cli.foreground);
        assert!(cli.verbose);
        assert_eq!(cli.config, "/tmp/limits.ini");
        assert_eq!(cli.pidfile.as_deref().map(|p| p.as_str()), Some("/tmp/limitfiles.pid"));
    }

    #[test]
    fn test_unknown_flag_is_rejected() {
        assert!(Cli::try_parse_from(["limitfiles", "--recursive"]).is_err());
    }
}
