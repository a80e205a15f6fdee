//! brain-stale - read-only report of entities that haven't been touched
//! recently, or whose lifecycle state suggests they're no longer current.

use anyhow::{Context, Result};
use brain_core::reports::StaleEntityDetector;
use brain_core::store::EntityStore;
use brain_core::{Config, EntityType};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "brain-stale")]
#[command(about = "Detect entities that are stale or past their lifecycle")]
#[command(version)]
struct Args {
    /// Brain root directory
    #[arg(long)]
    root: Option<std::path::PathBuf>,

    #[arg(long, value_parser = |s: &str| s.parse::<EntityType>())]
    r#type: Option<EntityType>,

    /// Override every type's default staleness threshold, in days
    #[arg(long)]
    threshold_days: Option<i64>,

    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = brain_core::logging::init(&config.logging).ok();

    let root = args.root.unwrap_or_else(|| config.root());
    let store = EntityStore::open(&root).context("failed to open entity store")?;
    let detector = StaleEntityDetector::new(&store);

    let stale = detector.detect(None, args.r#type, args.threshold_days).context("stale detection failed")?;
    let summary = detector.summarize(&stale);

    if args.json {
        let json = serde_json::json!({
            "total_stale": summary.total_stale,
            "average_days_stale": summary.average_days_stale,
            "by_type": summary.by_type,
            "by_action": summary.by_action,
            "oldest": summary.oldest,
            "oldest_days": summary.oldest_days,
            "entities": stale.iter().map(|e| serde_json::json!({
                "entity_id": e.entity_id,
                "entity_type": e.entity_type.to_string(),
                "days_stale": e.days_stale,
                "reasons": e.reasons,
                "recommended_action": e.recommended_action,
            })).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!("Stale entities: {} (avg {}d)", summary.total_stale, summary.average_days_stale);
    if let Some(oldest) = &summary.oldest {
        println!("Oldest: {oldest} ({}d)", summary.oldest_days);
    }
    println!();
    for e in &stale {
        println!("{} [{}] {}d stale -> {}", e.entity_id, e.entity_type, e.days_stale, e.recommended_action);
        for reason in &e.reasons {
            println!("  - {reason}");
        }
    }

    Ok(())
}
