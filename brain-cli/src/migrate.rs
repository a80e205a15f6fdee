//! brain-migrate - v1 -> v2 schema migration, status, and rollback.

use anyhow::{Context, Result};
use brain_core::index::{ContentIndex, IndexVocab};
use brain_core::migration::{Migrator, Validator};
use brain_core::registry::Registry;
use brain_core::snapshot::SnapshotManager;
use brain_core::store::EntityStore;
use brain_core::Config;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "brain-migrate")]
#[command(about = "Migrate entity files from v1 to v2 schema")]
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
    /// Show how many entities are on each schema version
    Status,
    /// Run the migration
    Run {
        #[arg(long)]
        dry_run: bool,
        /// Skip the pre-migration backup (not recommended)
        #[arg(long)]
        skip_backup: bool,
        /// Re-migrate v2 entities that fail validation
        #[arg(long)]
        force: bool,
    },
    /// Restore the store from a prior migration backup
    Rollback { backup_path: std::path::PathBuf },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = brain_core::logging::init(&config.logging).ok();

    let root = args.root.unwrap_or_else(|| config.root());
    let store = EntityStore::open(&root).context("failed to open entity store")?;
    let migrator = Migrator::new(&store);

    match args.command {
        Command::Status => {
            let status = migrator.status().context("failed to compute migration status")?;
            println!("Total:   {}", status.total);
            println!("v1:      {}", status.v1_count);
            println!("v2:      {}", status.v2_count);
            println!("Unknown: {}", status.unknown_count);
        }
        Command::Run { dry_run, skip_backup, force } => {
            let report = migrator.migrate(dry_run, skip_backup, force).context("migration failed")?;
            if let Some(backup) = &report.backup_path {
                println!("Backup: {}", backup.display());
            }
            println!("Migrated: {}", report.migrated.len());
            println!("Skipped:  {}", report.skipped.len());
            if !report.failed.is_empty() {
                println!("Failed:   {}", report.failed.len());
                for (id, err) in &report.failed {
                    println!("  {id}: {err}");
                }
                if let Some(backup) = &report.backup_path {
                    migrator.rollback(backup).context("rollback after failed migration failed")?;
                    println!("Rolled back from {}", backup.display());
                }
                std::process::exit(1);
            }

            if dry_run {
                return Ok(());
            }

            let registry = Registry::rebuild(&store, None).context("failed to rebuild registry after migration")?;
            registry.save(&root).context("failed to save registry after migration")?;
            let vocab = IndexVocab::load(&config.index).context("failed to load index vocabulary")?;
            let index = ContentIndex::build_with_vocab(&store, &vocab)
                .context("failed to build content index after migration")?;
            index.save(&root).context("failed to save content index after migration")?;
            println!("Registry rebuilt: {} entities", registry.entities.len());

            let snapshot_path = SnapshotManager::new(&root)
                .create(&store, true, true)
                .context("failed to create post-migration snapshot")?;
            println!("Snapshot: {}", snapshot_path.display());

            let verify = Validator::validate_all(&store).context("post-migration verification failed")?;
            let verify_errors: usize = verify.iter().map(|r| r.errors.len()).sum();
            if verify_errors > 0 {
                println!("Verify:   {verify_errors} error(s) found, rolling back");
                if let Some(backup) = &report.backup_path {
                    migrator.rollback(backup).context("rollback after failed verification failed")?;
                    println!("Rolled back from {}", backup.display());
                }
                std::process::exit(1);
            }
            println!("Verify:   OK");
        }
        Command::Rollback { backup_path } => {
            migrator.rollback(&backup_path).context("rollback failed")?;
            println!("Rolled back from {}", backup_path.display());
        }
    }

    Ok(())
}
