//! Clap command surface: one `Commands` variant per RPC method (§6), a
//! global `--output`/`--socket`/`-v` flag set, and a `run()` entry point
//! that `main.rs` hands straight to a single Tokio runtime.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fleet_rpc::message::{LaunchProgressKind, ReplyMessage, RpcMethod, StatusCode};
use serde_json::json;

use crate::client::RpcClient;
use crate::identity;
use crate::output::{self, OutputFormat};
use crate::ui;

#[derive(Parser)]
#[command(name = "fleetctl", version, about = "CLI client for the fleet VM orchestration daemon")]
struct Cli {
    /// Output format: table, json, yaml
    #[arg(long, short = 'o', global = true, default_value = "table")]
    output: String,

    /// Daemon socket address, e.g. unix:///run/fleetd.socket
    #[arg(long, global = true, default_value = "unix:///run/fleetd.socket")]
    socket: String,

    /// Verbosity, repeatable (-v, -vv, -vvv, -vvvv)
    #[arg(short = 'v', global = true, action = clap::ArgAction::Count)]
    verbosity: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and start a new instance from an image
    Launch {
        image: String,
        name: Option<String>,
        #[arg(long)]
        cpus: Option<u32>,
        #[arg(long)]
        mem: Option<String>,
        #[arg(long)]
        disk: Option<String>,
    },
    /// Start one or more stopped instances
    Start { names: Vec<String> },
    /// Stop one or more running instances
    Stop { names: Vec<String> },
    /// Suspend one or more running instances
    Suspend { names: Vec<String> },
    /// Restart one or more running instances
    Restart { names: Vec<String> },
    /// Soft-delete one or more instances
    Delete { names: Vec<String> },
    /// Recover one or more soft-deleted instances
    Recover { names: Vec<String> },
    /// Permanently remove one or more soft-deleted instances
    Purge { names: Vec<String> },
    /// List every operative instance
    List,
    /// Show the full record for one instance
    Info { name: String },
    /// Look up an image by alias in the manifest
    Find { name: String },
    /// Mount a host path into a running instance
    Mount {
        instance: String,
        source: String,
        target: String,
        #[arg(long = "type")]
        mount_type: Option<String>,
    },
    /// Unmount a previously mounted path
    Umount { instance: String, target: String },
    /// Clone an instance
    Clone { source: String, destination: Option<String> },
    /// Show the backend's network interfaces
    Networks,
    /// Take a snapshot of an instance
    Snapshot {
        instance: String,
        name: Option<String>,
        #[arg(long, default_value = "")]
        comment: String,
    },
    /// Restore an instance to a named snapshot
    Restore {
        instance: String,
        snapshot: String,
        #[arg(long)]
        destructive: bool,
    },
    /// Read a settings key
    Get { key: String },
    /// Write a settings key
    Set { key: String, value: String },
    /// List every registered settings key
    Keys,
    /// Authenticate this client's identity against the daemon's passphrase
    Authenticate { passphrase: String },
    /// Print the daemon's version
    Version,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        cmd_completions(*shell);
        return Ok(());
    }

    let output = OutputFormat::from_str_arg(&cli.output);
    let socket_path = parse_socket_address(&cli.socket)?;
    let identity_path = identity::default_identity_path();
    let cert_pem = identity::load_or_create(&identity_path).context("loading client identity")?;

    let mut client = RpcClient::connect(&socket_path, &cert_pem)
        .await
        .with_context(|| format!("connecting to {}", cli.socket))?;

    let (method, payload) = request_for(&cli.command)?;

    let status = if matches!(cli.command, Commands::Launch { .. }) {
        call_with_launch_progress(&mut client, method, payload, cli.verbosity).await?
    } else {
        client.call(method, payload, cli.verbosity, |reply| print_reply(reply)).await?
    };

    if status.is_ok() {
        match cli.command {
            Commands::List | Commands::Info { .. } | Commands::Find { .. } | Commands::Networks | Commands::Keys | Commands::Get { .. } => {
                output::print_body(output, &status.message);
            }
            Commands::Clone { .. } => ui::success(&format!("cloned to '{}'", status.message)),
            Commands::Snapshot { .. } => ui::success(&format!("snapshot '{}' taken", status.message)),
            _ if !status.message.is_empty() => ui::info(&status.message),
            _ => ui::success("ok"),
        }
        Ok(())
    } else {
        ui::error(&status.message);
        std::process::exit(exit_code_for(status.code));
    }
}

async fn call_with_launch_progress(
    client: &mut RpcClient,
    method: RpcMethod,
    payload: serde_json::Value,
    verbosity: u8,
) -> Result<fleet_rpc::message::RpcStatus> {
    let spinner = ui::spinner("launching...");
    let status = client
        .call(method, payload, verbosity, |reply| {
            if let ReplyMessage::LaunchProgress { percent, kind } = reply {
                spinner.set_message(launch_progress_text(*percent, kind));
            } else {
                spinner.suspend(|| print_reply(reply));
            }
        })
        .await?;
    spinner.finish_and_clear();
    Ok(status)
}

fn launch_progress_text(percent: Option<u8>, kind: &LaunchProgressKind) -> String {
    let label = match kind {
        LaunchProgressKind::ImageDownload => "downloading image",
        LaunchProgressKind::Extracting => "extracting image",
        LaunchProgressKind::Preparing => "preparing instance",
        LaunchProgressKind::WaitingForSsh => "waiting for SSH",
        LaunchProgressKind::WaitingForCloudInit => "waiting for cloud-init",
    };
    match percent {
        Some(p) => format!("{label} ({p}%)"),
        None => label.to_string(),
    }
}

fn print_reply(reply: &ReplyMessage) {
    match reply {
        ReplyMessage::LogLine { text, .. } => println!("{text}"),
        ReplyMessage::ReplyMessage { text } => println!("{text}"),
        ReplyMessage::LaunchProgress { percent, kind } => ui::info(&launch_progress_text(*percent, kind)),
        ReplyMessage::UpdateInfo { instance, current_release, new_release } => {
            ui::warn(&format!("{instance}: {current_release} -> {new_release} available"));
        }
        ReplyMessage::ConfirmBridgeCreation { interface, .. } => {
            ui::warn(&format!("bridge creation for '{interface}' requires confirmation (unsupported by this client)"));
        }
        ReplyMessage::ConfirmOverwrite { detail, .. } => {
            ui::warn(&format!("overwrite confirmation requested: {detail} (unsupported by this client)"));
        }
    }
}

fn request_for(command: &Commands) -> Result<(RpcMethod, serde_json::Value)> {
    Ok(match command {
        Commands::Launch { image, name, cpus, mem, disk } => (
            RpcMethod::Launch,
            json!({ "image": image, "name": name, "cpus": cpus, "mem": mem, "disk": disk }),
        ),
        Commands::Start { names } => (RpcMethod::Start, json!({ "names": names })),
        Commands::Stop { names } => (RpcMethod::Stop, json!({ "names": names })),
        Commands::Suspend { names } => (RpcMethod::Suspend, json!({ "names": names })),
        Commands::Restart { names } => (RpcMethod::Restart, json!({ "names": names })),
        Commands::Delete { names } => (RpcMethod::Delete, json!({ "names": names })),
        Commands::Recover { names } => (RpcMethod::Recover, json!({ "names": names })),
        Commands::Purge { names } => (RpcMethod::Purge, json!({ "names": names })),
        Commands::List => (RpcMethod::List, serde_json::Value::Null),
        Commands::Info { name } => (RpcMethod::Info, json!({ "name": name })),
        Commands::Find { name } => (RpcMethod::Find, json!({ "name": name })),
        Commands::Mount { instance, source, target, mount_type } => (
            RpcMethod::Mount,
            json!({ "instance": instance, "source": source, "target": target, "mount_type": mount_type }),
        ),
        Commands::Umount { instance, target } => (RpcMethod::Umount, json!({ "instance": instance, "target": target })),
        Commands::Clone { source, destination } => (RpcMethod::Clone, json!({ "source": source, "destination": destination })),
        Commands::Networks => (RpcMethod::Networks, serde_json::Value::Null),
        Commands::Snapshot { instance, name, comment } => {
            (RpcMethod::Snapshot, json!({ "instance": instance, "name": name, "comment": comment }))
        }
        Commands::Restore { instance, snapshot, destructive } => (
            RpcMethod::Restore,
            json!({ "instance": instance, "snapshot": snapshot, "destructive": destructive }),
        ),
        Commands::Get { key } => (RpcMethod::Get, json!({ "key": key })),
        Commands::Set { key, value } => (RpcMethod::Set, json!({ "key": key, "value": value })),
        Commands::Keys => (RpcMethod::Keys, serde_json::Value::Null),
        Commands::Authenticate { passphrase } => (RpcMethod::Authenticate, json!({ "passphrase": passphrase })),
        Commands::Version => (RpcMethod::Version, serde_json::Value::Null),
        Commands::Completions { .. } => unreachable!("handled before connecting"),
    })
}

fn parse_socket_address(address: &str) -> Result<PathBuf> {
    address
        .strip_prefix("unix://")
        .map(PathBuf::from)
        .context("only unix:// addresses are implemented on this backend")
}

fn exit_code_for(code: StatusCode) -> i32 {
    match code {
        StatusCode::Ok => 0,
        StatusCode::InvalidArgument => 2,
        StatusCode::NotFound => 3,
        StatusCode::FailedPrecondition => 4,
        StatusCode::Unavailable => 5,
        StatusCode::Unimplemented => 6,
        StatusCode::ResourceExhausted => 7,
        StatusCode::DeadlineExceeded => 8,
        StatusCode::Cancelled => 9,
        StatusCode::Internal => 1,
    }
}

fn cmd_completions(shell: clap_complete::Shell) {
    let mut cmd = <Cli as clap::CommandFactory>::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
}
