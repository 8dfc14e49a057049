//! `fleetd`: the daemon binary. A thin CLI wrapper around `fleet_daemon`:
//! parse a subcommand, set up tracing, and hand off to a single-threaded
//! Tokio runtime.

use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fleet_daemon::{logging, server, AppState, StaticConfig};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use tracing::{error, info, warn};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Settings-file-change sentinel (§6): a supervisor watching `fleetd`'s exit
/// code interprets this as "restart me", not "crashed".
const RESTART_REQUESTED_EXIT_CODE: i32 = 42;

#[derive(Parser)]
#[command(name = "fleetd", about = "fleet VM orchestration daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon, listening on a Unix domain socket.
    Serve {
        /// `unix://` or `tcp://` address to listen on. Only `unix://` is
        /// implemented; anything else is rejected at startup.
        #[arg(long, default_value = "unix:///run/fleetd.socket")]
        address: String,

        /// Path to the static config file (`multipassd.conf`).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Log verbosity, repeatable (-v, -vv, -vvv, -vvvv).
        #[arg(short = 'v', long = "verbosity", action = clap::ArgAction::Count)]
        verbosity: u8,

        /// Output format for log lines.
        #[arg(long, default_value = "platform")]
        logger: String,
    },
    /// Install the Windows service. Parses everywhere, only works on Windows.
    Install,
    /// Uninstall the Windows service. Parses everywhere, only works on Windows.
    Uninstall,
    /// Run as a Windows service. Parses everywhere, only works on Windows.
    Svc,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            address,
            config,
            verbosity,
            logger,
        } => run_serve(address, config, verbosity, &logger),
        Command::Install | Command::Uninstall | Command::Svc => {
            // §6: these subcommands are Windows-only; off-Windows they parse
            // but go nowhere.
            logging::init(logging::LogFormat::Human);
            error!("service control subcommands are not implemented on this backend");
            std::process::exit(1);
        }
    }
}

fn run_serve(address: String, config_path: Option<PathBuf>, verbosity: u8, logger: &str) -> Result<()> {
    let format = match logger {
        "json" => logging::LogFormat::Json,
        _ => logging::LogFormat::Human,
    };
    logging::init(format);

    let socket_path = parse_unix_address(&address)?;

    let config_path = config_path.unwrap_or_else(|| PathBuf::from("/etc/fleetd/multipassd.conf"));
    let mut config = StaticConfig::load(&config_path).context("loading daemon config")?;
    config.socket_path = socket_path;
    config.verbosity = config.verbosity.max(verbosity);

    let watch_target = config_path.clone();
    spawn_settings_watch(watch_target);

    let state = AppState::new(&config).context("constructing daemon state")?;
    let state = std::sync::Arc::new(state);

    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let socket_path = config.socket_path.clone();
    let result = rt.block_on(run_until_shutdown(socket_path, state));

    match result {
        Ok(()) => Ok(()),
        Err(e) => {
            error!(error = %e, "fleetd exiting on error");
            Err(e)
        }
    }
}

async fn run_until_shutdown(socket_path: PathBuf, state: std::sync::Arc<AppState>) -> Result<()> {
    tokio::select! {
        result = server::serve(&socket_path, state) => result,
        _ = shutdown_signal() => {
            info!("received shutdown signal, exiting");
            Ok(())
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn parse_unix_address(address: &str) -> Result<PathBuf> {
    address
        .strip_prefix("unix://")
        .map(PathBuf::from)
        .context("only unix:// addresses are implemented on this backend")
}

/// Watches the static config file for changes (§6) on a dedicated thread; any
/// debounced event exits the process with the restart-requested sentinel so
/// a supervisor picks the new settings up on the next start.
fn spawn_settings_watch(path: PathBuf) {
    std::thread::spawn(move || {
        let (tx, rx) = std_mpsc::channel::<DebounceEventResult>();
        let mut debouncer = match new_debouncer(Duration::from_secs(2), tx) {
            Ok(debouncer) => debouncer,
            Err(e) => {
                warn!(error = %e, "failed to start settings file watcher");
                return;
            }
        };

        let watch_dir = path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
        if let Err(e) = std::fs::create_dir_all(&watch_dir) {
            warn!(error = %e, "failed to create settings directory for watching");
            return;
        }
        if let Err(e) = debouncer
            .watcher()
            .watch(&watch_dir, notify::RecursiveMode::NonRecursive)
        {
            warn!(error = %e, "failed to watch settings directory");
            return;
        }

        for result in rx {
            match result {
                Ok(events) if events.iter().any(|e| e.path == path) => {
                    info!("settings file changed, requesting restart");
                    std::process::exit(RESTART_REQUESTED_EXIT_CODE);
                }
                Ok(_) => continue,
                Err(e) => warn!(error = %e, "settings watcher error"),
            }
        }
    });
}
