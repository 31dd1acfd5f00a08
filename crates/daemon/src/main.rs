// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! conveyord: watch local trees, process changed files, sync them to their
//! destinations

use clap::Parser;
use conveyor_config::Config;
use conveyor_core::{Settings, SystemClock};
use conveyor_daemon::{DaemonArbitrator, Paths, PidLock};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(
    name = "conveyord",
    version,
    about = "Watch local trees, process changed files and sync them to remote destinations"
)]
struct Args {
    /// Path to the XML configuration file
    #[arg(default_value = "config.xml")]
    config: PathBuf,

    /// Directory for the databases, the log file and the PID file
    #[arg(long, default_value = ".")]
    state_dir: PathBuf,

    /// Directory for intermediate processor output (emptied at startup and
    /// clean shutdown)
    #[arg(long)]
    working_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let working_dir =
        args.working_dir.unwrap_or_else(|| std::env::temp_dir().join("conveyor"));
    let paths = Paths::new(args.config, args.state_dir, working_dir);

    if let Err(e) = std::fs::create_dir_all(&paths.data_dir) {
        eprintln!("cannot create state directory {}: {}", paths.data_dir.display(), e);
        return ExitCode::FAILURE;
    }
    let _log_guard = init_logging(&paths);
    tracing::warn!("File Conveyor is initializing");

    let pid_lock = match PidLock::acquire(&paths.pid_file) {
        Ok(lock) => Arc::new(lock),
        Err(e) => {
            tracing::error!(error = %e, "cannot acquire the PID lock");
            return ExitCode::FAILURE;
        }
    };
    spawn_pid_refresher(Arc::clone(&pid_lock));

    let stop = Arc::new(AtomicBool::new(false));
    let stopped_in_console = Arc::new(AtomicBool::new(false));
    spawn_signal_listener(Arc::clone(&stop), Arc::clone(&stopped_in_console));

    let settings = Settings::default();
    let mut restarted = false;
    loop {
        if restarted {
            tracing::warn!("File Conveyor has restarted itself");
        }

        let config = match Config::load(&paths.config_file) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(error = %e, "cannot continue, fix the configuration first");
                return ExitCode::FAILURE;
            }
        };
        let mut arbitrator =
            match DaemonArbitrator::new(config, &paths, settings.clone(), SystemClock) {
                Ok(arbitrator) => arbitrator,
                Err(e) => {
                    tracing::error!(error = %e, "startup validation failed");
                    return ExitCode::FAILURE;
                }
            };

        match arbitrator.run(&stop).await {
            Ok(()) => return ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(error = %e, "File Conveyor stopped on an unhandled error");
                if !settings.restart_after_crash || stopped_in_console.load(Ordering::SeqCst) {
                    return ExitCode::FAILURE;
                }
                tracing::warn!(
                    seconds = settings.restart_interval.as_secs(),
                    "restarting after the configured interval"
                );
                tokio::time::sleep(settings.restart_interval).await;
                if stop.load(Ordering::SeqCst) {
                    return ExitCode::FAILURE;
                }
                restarted = true;
            }
        }
    }
}

/// Log to the console and to a file under the state directory.
fn init_logging(paths: &Paths) -> tracing_appender::non_blocking::WorkerGuard {
    let log_dir = paths.log_file.parent().unwrap_or(&paths.data_dir);
    let file_name = paths
        .log_file
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| "conveyord.log".to_string());
    let appender = tracing_appender::rolling::never(log_dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new("info")
        }))
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();
    guard
}

/// Keep the PID file alive: something may clean it up under us.
fn spawn_pid_refresher(lock: Arc<PidLock>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            if let Err(e) = lock.refresh() {
                tracing::warn!(error = %e, "cannot refresh the PID file");
            }
        }
    });
}

/// SIGINT, SIGTSTP and SIGTERM all initiate orderly shutdown. The first two
/// come from an operator at a console, which also rules out a supervisor
/// restart.
#[cfg(unix)]
fn spawn_signal_listener(stop: Arc<AtomicBool>, stopped_in_console: Arc<AtomicBool>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "cannot install SIGINT handler");
                return;
            }
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "cannot install SIGTERM handler");
                return;
            }
        };
        let mut sigtstp = match signal(SignalKind::from_raw(nix::libc::SIGTSTP)) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "cannot install SIGTSTP handler");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    stopped_in_console.store(true, Ordering::SeqCst);
                    stop.store(true, Ordering::SeqCst);
                }
                _ = sigtstp.recv() => {
                    stopped_in_console.store(true, Ordering::SeqCst);
                    stop.store(true, Ordering::SeqCst);
                }
                _ = sigterm.recv() => {
                    stop.store(true, Ordering::SeqCst);
                }
            }
            tracing::warn!("signaling to stop");
        }
    });
}

#[cfg(not(unix))]
fn spawn_signal_listener(stop: Arc<AtomicBool>, _stopped_in_console: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.store(true, Ordering::SeqCst);
        }
    });
}
