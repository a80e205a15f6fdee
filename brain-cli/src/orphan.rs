//! brain-orphan - analyze and triage orphaned (relationship-less) entities.

use anyhow::{Context, Result};
use brain_core::reports::OrphanAnalyzer;
use brain_core::store::EntityStore;
use brain_core::{Config, EntityType};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "brain-orphan")]
#[command(about = "Analyze and triage orphaned entities")]
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
    /// Report orphan counts by type and reason
    Analyze {
        #[arg(long, value_parser = parse_entity_type)]
        r#type: Option<EntityType>,
    },
    /// Mark unreasoned orphans as pending enrichment
    MarkPending {
        #[arg(long)]
        dry_run: bool,
    },
    /// Mark orphans of standalone-by-nature types (default: domain, brand)
    MarkStandalone {
        #[arg(long, value_parser = parse_entity_type)]
        types: Vec<EntityType>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Clear the orphan reason on entities that now have relationships
    ClearConnected {
        #[arg(long)]
        dry_run: bool,
    },
    /// Mark specific orphans as having no external data to enrich from
    MarkNoExternalData {
        entity_ids: Vec<String>,
        #[arg(long)]
        dry_run: bool,
    },
}

fn parse_entity_type(s: &str) -> std::result::Result<EntityType, String> {
    s.parse()
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = brain_core::logging::init(&config.logging).ok();

    let root = args.root.unwrap_or_else(|| config.root());
    let store = EntityStore::open(&root).context("failed to open entity store")?;
    let analyzer = OrphanAnalyzer::new(&store);

    match args.command {
        Command::Analyze { r#type } => {
            let analysis = analyzer.analyze(r#type).context("orphan analysis failed")?;
            println!("Entities scanned: {}", analysis.total_entities);
            println!("Orphans:          {}", analysis.total_orphans);
            println!();
            println!("By type:");
            for (k, v) in &analysis.orphans_by_type {
                println!("  {k:<12} {v}");
            }
            println!();
            println!("By reason:");
            for (k, v) in &analysis.orphans_by_reason {
                println!("  {k:<20} {v}");
            }
        }
        Command::MarkPending { dry_run } => {
            let count = analyzer.mark_pending(dry_run).context("mark_pending failed")?;
            println!("{}{} orphan(s) marked pending_enrichment", if dry_run { "[dry run] " } else { "" }, count);
        }
        Command::MarkStandalone { types, dry_run } => {
            let types_opt = if types.is_empty() { None } else { Some(types.as_slice()) };
            let count = analyzer.mark_standalone(types_opt, dry_run).context("mark_standalone failed")?;
            println!("{}{} orphan(s) marked standalone", if dry_run { "[dry run] " } else { "" }, count);
        }
        Command::ClearConnected { dry_run } => {
            let count = analyzer.clear_connected(dry_run).context("clear_connected failed")?;
            println!("{}{} entity/entities cleared", if dry_run { "[dry run] " } else { "" }, count);
        }
        Command::MarkNoExternalData { entity_ids, dry_run } => {
            let count = analyzer.mark_no_external_data(&entity_ids, dry_run).context("mark_no_external_data failed")?;
            println!("{}{} orphan(s) marked no_external_data", if dry_run { "[dry run] " } else { "" }, count);
        }
    }

    Ok(())
}
