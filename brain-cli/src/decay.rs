//! brain-decay - read-only relationship confidence decay report.

use anyhow::{Context, Result};
use brain_core::decay::DecayMonitor;
use brain_core::store::EntityStore;
use brain_core::Config;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "brain-decay")]
#[command(about = "Scan the entity graph for decayed/stale relationships")]
#[command(version)]
struct Args {
    /// Brain root directory
    #[arg(long)]
    root: Option<std::path::PathBuf>,

    /// Override every relationship type's staleness threshold, in days
    #[arg(long)]
    threshold_days: Option<u32>,

    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = brain_core::logging::init(&config.logging).ok();

    let root = args.root.unwrap_or_else(|| config.root());
    let store = EntityStore::open(&root).context("failed to open entity store")?;

    let monitor = DecayMonitor::new(&store, config.decay.decay_rate, config.decay.floor, config.decay.staleness_overrides.clone());
    let report = monitor.scan(None, args.threshold_days).context("decay scan failed")?;

    if args.json {
        let json = serde_json::json!({
            "total_entities": report.total_entities,
            "total_relationships": report.total_relationships,
            "stale_relationships": report.stale_relationships,
            "avg_confidence": report.avg_confidence,
            "avg_decayed_confidence": report.avg_decayed_confidence,
            "stale_by_type": report.stale_by_type,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!("Entities scanned:      {}", report.total_entities);
    println!("Relationships scanned: {}", report.total_relationships);
    println!("Stale relationships:   {}", report.stale_relationships);
    println!("Avg confidence:        {:.3} -> {:.3} decayed", report.avg_confidence, report.avg_decayed_confidence);
    println!();
    for (rel_type, count) in &report.stale_by_type {
        println!("  {rel_type:<20} {count}");
    }
    println!();
    for stale in &report.stale_list {
        println!(
            "{} --{}--> {} (conf {:.2} -> {:.2}, {}d stale)",
            stale.entity_id, stale.relationship_type, stale.target, stale.base_confidence, stale.decayed_confidence, stale.days_stale
        );
    }

    Ok(())
}
