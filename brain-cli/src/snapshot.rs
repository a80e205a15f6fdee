//! brain-snapshot - create, inspect, and clean up point-in-time snapshots.

use anyhow::{Context, Result};
use brain_core::snapshot::SnapshotManager;
use brain_core::store::EntityStore;
use brain_core::Config;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "brain-snapshot")]
#[command(about = "Create, inspect, and retire point-in-time snapshots of the entity graph")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Brain root directory
    #[arg(long, global = true)]
    root: Option<std::path::PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new snapshot
    Create {
        /// Include every entity header, not just the registry
        #[arg(long)]
        full: bool,
        /// Skip gzip compression
        #[arg(long)]
        uncompressed: bool,
    },
    /// List known snapshots
    List,
    /// Show the snapshot closest to (and before) a given timestamp (RFC3339); defaults to latest
    Get {
        #[arg(long)]
        at: Option<String>,
    },
    /// Remove snapshots past the retention window
    Cleanup {
        #[arg(long, default_value_t = 90)]
        retention_days: i64,
        #[arg(long)]
        keep_monthly: bool,
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = brain_core::logging::init(&config.logging).ok();

    let root = args.root.unwrap_or_else(|| config.root());
    let store = EntityStore::open(&root).context("failed to open entity store")?;
    let manager = SnapshotManager::new(&root);

    match args.command {
        Command::Create { full, uncompressed } => {
            let path = manager.create(&store, full, !uncompressed).context("failed to create snapshot")?;
            println!("Created {}", path.display());
        }
        Command::List => {
            let snapshots = manager.list().context("failed to list snapshots")?;
            if snapshots.is_empty() {
                println!("No snapshots yet");
            }
            for s in snapshots {
                println!("{}  {}  {} bytes{}", s.date, s.timestamp.to_rfc3339(), s.size_bytes, if s.compressed { " (gz)" } else { "" });
            }
        }
        Command::Get { at } => {
            let at: Option<DateTime<Utc>> = at.map(|s| s.parse()).transpose().context("invalid --at timestamp, expected RFC3339")?;
            match manager.get(at).context("failed to load snapshot")? {
                Some(snapshot) => {
                    println!("Snapshot created {} ({:?})", snapshot.created.to_rfc3339(), snapshot.kind);
                    if let Some(registry) = &snapshot.registry {
                        println!("  registry entities: {}", registry.entities.len());
                    }
                    if let Some(entities) = &snapshot.entities {
                        println!("  entity headers: {}", entities.len());
                    }
                }
                None => println!("No snapshot found"),
            }
        }
        Command::Cleanup { retention_days, keep_monthly, dry_run } => {
            let removed = manager.cleanup(retention_days, keep_monthly, dry_run).context("cleanup failed")?;
            if dry_run {
                println!("Would remove {} snapshot director{}", removed.len(), if removed.len() == 1 { "y" } else { "ies" });
            } else {
                println!("Removed {} snapshot director{}", removed.len(), if removed.len() == 1 { "y" } else { "ies" });
            }
            for path in removed {
                println!("  {}", path.display());
            }
        }
    }

    Ok(())
}
