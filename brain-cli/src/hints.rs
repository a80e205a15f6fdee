//! brain-hints - extraction hints: which entities are missing fields an
//! enrichment source could fill in, and with what priority.

use anyhow::{Context, Result};
use brain_core::reports::{ExtractionHintsGenerator, Priority};
use brain_core::store::EntityStore;
use brain_core::{Config, EntityType};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "brain-hints")]
#[command(about = "Report missing entity fields an enrichment source could fill")]
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
    /// Generate hints across the whole store
    Generate {
        #[arg(long, value_parser = |s: &str| s.parse::<EntityType>())]
        r#type: Option<EntityType>,
        #[arg(long, value_parser = parse_priority)]
        priority: Option<Priority>,
    },
    /// Hints relevant to a single enrichment source (e.g. "issue_tracker")
    ForSource {
        source: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn parse_priority(s: &str) -> std::result::Result<Priority, String> {
    match s {
        "high" => Ok(Priority::High),
        "medium" => Ok(Priority::Medium),
        "low" => Ok(Priority::Low),
        other => Err(format!("unknown priority '{other}', expected high/medium/low")),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = brain_core::logging::init(&config.logging).ok();

    let root = args.root.unwrap_or_else(|| config.root());
    let store = EntityStore::open(&root).context("failed to open entity store")?;
    let generator = ExtractionHintsGenerator::new(&store);

    match args.command {
        Command::Generate { r#type, priority } => {
            let report = generator.generate(r#type, priority).context("failed to generate extraction hints")?;
            println!("Entities scanned:   {}", report.total_entities);
            println!("Entities with gaps: {}", report.entities_with_gaps);
            println!("Total hints:        {} ({} high priority)", report.total_hints, report.high_priority_hints);
            println!();
            for hint in &report.hints {
                println!("{} [{}] {} ({}) <- {}", hint.entity_id, hint.entity_type, hint.field, hint.priority, hint.sources.join(", "));
            }
        }
        Command::ForSource { source, limit } => {
            let hints = generator.for_source(&source, limit).context("failed to generate source hints")?;
            for hint in &hints {
                println!("{} [{}] {} ({})", hint.entity_id, hint.entity_type, hint.field, hint.priority);
            }
        }
    }

    Ok(())
}
