//! brain-orchestrate - run the enrichment orchestrator over every source's
//! inbox. Ctrl+C triggers a graceful cancel: the in-flight batch finishes,
//! a checkpoint is saved, and the process exits cleanly.

use anyhow::{Context, Result};
use brain_core::orchestrator::{EnrichmentOrchestrator, OrchestratorConfig};
use brain_core::resolver::CanonicalResolver;
use brain_core::store::EntityStore;
use brain_core::Config;
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "brain-orchestrate")]
#[command(about = "Run the enrichment orchestrator over every source's inbox")]
#[command(version)]
struct Args {
    /// Brain root directory
    #[arg(long)]
    root: Option<std::path::PathBuf>,

    /// Restrict to these sources (repeatable); default: every registered source
    #[arg(long = "source")]
    sources: Vec<String>,

    /// Resume from the last checkpoint instead of starting fresh
    #[arg(long)]
    resume: bool,

    #[arg(long)]
    dry_run: bool,

    #[arg(long)]
    max_workers: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    rate_limit_per_minute: Option<u32>,
}

/// Converts the config file's per-worker rate limit (milliseconds between
/// calls) into the orchestrator's per-minute throughput figure.
fn rate_limit_per_minute_from_ms(rate_limit_ms: u64) -> u32 {
    if rate_limit_ms == 0 {
        return u32::MAX;
    }
    (60_000 / rate_limit_ms).max(1) as u32
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = brain_core::logging::init(&config.logging).ok();

    let root = args.root.unwrap_or_else(|| config.root());
    let store = EntityStore::open(&root).context("failed to open entity store")?;
    let resolver = CanonicalResolver::open(&store).context("failed to open resolver")?;

    let mut orch_config = OrchestratorConfig::new(&root);
    orch_config.max_workers = config.orchestrator.max_workers;
    orch_config.batch_size = config.orchestrator.batch_size;
    orch_config.rate_limit_per_minute = rate_limit_per_minute_from_ms(config.orchestrator.rate_limit_ms);
    orch_config.checkpoint_path = if config.orchestrator.checkpoint_path.is_absolute() {
        config.orchestrator.checkpoint_path.clone()
    } else {
        root.join(&config.orchestrator.checkpoint_path)
    };

    if let Some(n) = args.max_workers {
        orch_config.max_workers = n;
    }
    if let Some(n) = args.batch_size {
        orch_config.batch_size = n;
    }
    if let Some(n) = args.rate_limit_per_minute {
        orch_config.rate_limit_per_minute = n;
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_handler = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nCanceling after the current batch...");
        cancel_handler.store(true, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")?;

    let sources = if args.sources.is_empty() { None } else { Some(args.sources.as_slice()) };

    let orchestrator = EnrichmentOrchestrator::new(&store, &resolver, orch_config);
    let report = orchestrator.run(sources, args.resume, args.dry_run, &cancel).context("orchestration run failed")?;

    println!("Processed: {}/{}", report.progress.processed_entities, report.progress.total_entities);
    println!("Successful: {}", report.progress.successful);
    println!("Failed:     {}", report.progress.failed);
    println!("Sources completed: {}", report.progress.sources_completed.join(", "));
    if report.canceled {
        println!("Canceled (checkpoint saved, resume with --resume)");
    }
    if !report.source_errors.is_empty() {
        println!("Source errors:");
        for (source, err) in &report.source_errors {
            println!("  {source}: {err}");
        }
    }

    Ok(())
}
