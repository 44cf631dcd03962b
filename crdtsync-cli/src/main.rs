use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use crdtsync_core::config::Config;
use crdtsync_core::core_sync::sync::{IntervalTicker, SyncDriver};
use crdtsync_core::core_sync::{
    CrdtOperation, CrdtState, FileStore, KeyValueStore, StoreBackedTransport,
};
use crdtsync_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use crdtsync_core::shutdown::{install_signal_handlers, ShutdownCoordinator};
use crdtsync_core::{CrdtKind, CrdtSynchronizer, SyncCommand};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "crdtsync")]
#[command(author, version, about = "Replica-local CRDT synchronizer", long_about = None)]
struct Args {
    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding replica snapshots (supports ~ and $VARS)
    #[arg(short, long)]
    data_dir: Option<String>,

    /// Identifier of the local replica
    #[arg(short, long)]
    replica_id: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a CRDT instance
    Create {
        /// g-counter, pn-counter, g-set, pn-set, g-map, lww-map, or-map, sequence
        kind: String,
        id: String,
        /// Initial value as JSON
        #[arg(long)]
        seed: Option<String>,
    },

    /// Apply an operation to a CRDT
    Apply {
        id: String,
        opcode: String,
        /// Operation payload as JSON
        #[arg(default_value = "{}")]
        payload: String,
    },

    /// Print one CRDT, or the value of every CRDT
    Show { id: Option<String> },

    /// Merge a remote CRDT state read from a JSON file
    Merge { id: String, state_file: PathBuf },

    /// Resolve conflicts among operations read from a JSON file
    Resolve {
        operations_file: PathBuf,
        #[arg(short, long, default_value = "automatic")]
        strategy: String,
    },

    /// Trim operation histories
    Compact,

    /// Run one sync round against replicas sharing the data directory
    Sync {
        /// Defaults to every replica found in the data directory
        targets: Vec<String>,
    },

    /// Print replica statistics
    Status,

    /// Execute a raw JSON command
    Exec { command: String },

    /// Sync periodically until interrupted
    Run {
        /// Overrides the configured interval (e.g. "5s", "1m")
        #[arg(long)]
        interval: Option<String>,
    },
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };
    let file_replica = args.config.is_some().then(|| config.sync.replica_id.clone());

    config.apply_env()?;
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    if let Some(dir) = &args.data_dir {
        let expanded = shellexpand::full(dir).with_context(|| format!("expanding data dir '{}'", dir))?;
        config.store.data_dir = PathBuf::from(expanded.as_ref());
    }

    match &args.replica_id {
        Some(id) => config.sync.replica_id = id.clone(),
        None => {
            let from_env = std::env::var("CRDTSYNC_SYNC_REPLICA_ID").is_ok();
            if !from_env && file_replica.is_none() {
                bail!("a replica id is required: pass --replica-id, set CRDTSYNC_SYNC_REPLICA_ID or use a config file");
            }
        }
    }

    config.validate()?;
    Ok(config)
}

fn init_logging(config: &Config) -> Result<()> {
    let level = LogLevel::parse(&config.logging.level).unwrap_or_else(|| {
        eprintln!("Invalid log level '{}', using 'info'", config.logging.level);
        LogLevel::Info
    });
    let log_config = LogConfig::new(level)
        .json_format(config.logging.json_format)
        .with_timestamp(config.logging.with_timestamp)
        .with_target(config.logging.with_target);
    init_logging_with_config(log_config)?;
    Ok(())
}

fn parse_json(raw: &str, what: &str) -> Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("{} is not valid JSON", what))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Map a one-shot subcommand to its synchronizer command
fn to_sync_command(command: Command) -> Result<SyncCommand> {
    let command = match command {
        Command::Create { kind, id, seed } => SyncCommand::CreateCrdt {
            crdt_type: CrdtKind::parse(&kind).ok_or_else(|| anyhow!("unknown CRDT type '{}'", kind))?,
            crdt_id: id,
            seed: seed.map(|s| parse_json(&s, "seed")).transpose()?,
        },
        Command::Apply { id, opcode, payload } => SyncCommand::ApplyOperation {
            crdt_id: id,
            opcode,
            payload: parse_json(&payload, "payload")?,
        },
        Command::Merge { id, state_file } => SyncCommand::MergeStates {
            crdt_id: id,
            remote_state: read_json::<CrdtState>(&state_file)?,
        },
        Command::Resolve {
            operations_file,
            strategy,
        } => SyncCommand::ResolveConflicts {
            operations: read_json::<Vec<CrdtOperation>>(&operations_file)?,
            strategy,
        },
        Command::Compact => SyncCommand::CompactOperations,
        Command::Sync { targets } => SyncCommand::SyncReplicas {
            targets: (!targets.is_empty()).then_some(targets),
        },
        Command::Exec { command } => {
            serde_json::from_str(&command).context("command is not a valid JSON command")?
        }
        other => bail!("{:?} is not a synchronizer command", other),
    };
    Ok(command)
}

async fn run_driver(
    config: &Config,
    synchronizer: CrdtSynchronizer,
    store: Arc<dyn KeyValueStore>,
    transport: StoreBackedTransport,
    interval: Option<String>,
) -> Result<()> {
    let period = match interval {
        Some(raw) => humantime_duration(&raw)?,
        None => config.sync.sync_interval,
    };

    let shutdown = Arc::new(ShutdownCoordinator::new(Duration::from_secs(10)));
    install_signal_handlers(shutdown.clone());

    let driver = SyncDriver::new(Arc::new(Mutex::new(synchronizer)), Arc::new(transport), shutdown)
        .with_store(store);
    info!(interval = ?period, "Starting periodic sync");
    let report = driver.run(IntervalTicker::new(period)).await;

    info!(
        rounds = report.rounds,
        failed = report.failed_rounds,
        operations = report.operations_synced,
        compacted = report.operations_compacted,
        "Periodic sync finished"
    );
    Ok(())
}

fn humantime_duration(raw: &str) -> Result<Duration> {
    let duration = humantime_serde::re::humantime::parse_duration(raw)
        .with_context(|| format!("'{}' is not a duration", raw))?;
    if duration.is_zero() {
        bail!("interval must be positive");
    }
    Ok(duration)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_logging(&config)?;
    crdtsync_core::metrics::init_metrics();

    info!(replica = %config.sync.replica_id, data_dir = %config.store.data_dir.display(), "crdtsync started");

    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(&config.store.data_dir));
    let mut synchronizer = CrdtSynchronizer::new(config.sync.clone())
        .with_snapshot_ttl(config.store.snapshot_ttl);
    if !synchronizer.restore(store.as_ref()).await? {
        debug!("Starting from an empty replica");
    }
    let transport = StoreBackedTransport::new(store.clone(), config.sync.clone())
        .with_snapshot_ttl(config.store.snapshot_ttl);

    match args.command {
        Command::Show { id: Some(id) } => {
            let state = synchronizer
                .get(&id)
                .ok_or_else(|| anyhow!("CRDT not found: {}", id))?;
            print_json(state)?;
        }
        Command::Show { id: None } => {
            let values: serde_json::Map<String, Value> = synchronizer
                .crdt_ids()
                .into_iter()
                .filter_map(|id| synchronizer.value(&id).map(|v| (id, v)))
                .collect();
            print_json(&values)?;
        }
        Command::Status => print_json(&synchronizer.stats())?,
        Command::Run { interval } => {
            run_driver(&config, synchronizer, store, transport, interval).await?;
        }
        command => {
            let command = to_sync_command(command)?;
            let response = synchronizer
                .execute(command, &transport, Some(store.as_ref()))
                .await?;
            print_json(&response)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_humantime_duration() {
        assert_eq!(humantime_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(humantime_duration("1m 30s").unwrap(), Duration::from_secs(90));
        assert!(humantime_duration("0s").is_err());
        assert!(humantime_duration("soon").is_err());
    }
}
