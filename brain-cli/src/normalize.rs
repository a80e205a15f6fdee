//! brain-normalize - resolve relationship targets to canonical ids, drop
//! duplicates, and flag unresolvable targets as orphans.

use anyhow::{Context, Result};
use brain_core::normalizer::RelationshipNormalizer;
use brain_core::resolver::CanonicalResolver;
use brain_core::store::EntityStore;
use brain_core::Config;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "brain-normalize")]
#[command(about = "Normalize relationship targets across the entity store")]
#[command(version)]
struct Args {
    /// Brain root directory
    #[arg(long)]
    root: Option<std::path::PathBuf>,

    /// Normalize a single entity instead of the whole store
    #[arg(long)]
    entity: Option<String>,

    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = brain_core::logging::init(&config.logging).ok();

    let root = args.root.unwrap_or_else(|| config.root());
    let store = EntityStore::open(&root).context("failed to open entity store")?;
    let resolver = CanonicalResolver::open(&store).context("failed to open resolver")?;
    let normalizer = RelationshipNormalizer::new(&store, &resolver);

    if let Some(entity_id) = args.entity {
        let result = normalizer.normalize_entity(&entity_id, args.dry_run).context("normalization failed")?;
        println!("{entity_id}: {} -> {} relationships ({} duplicates removed)", result.original_count, result.normalized_count, result.duplicates_removed);
        for change in &result.changes {
            println!("  {} : {} -> {}", change.relationship_type, change.old_target, change.new_target);
        }
        for orphan in &result.orphans_found {
            println!("  unresolved target: {orphan}");
        }
        return Ok(());
    }

    let result = normalizer
        .normalize_all(args.dry_run, |done, total| {
            if total > 0 && done % 50 == 0 {
                tracing::info!(done, total, "normalization progress");
            }
        })
        .context("normalization failed")?;

    println!("Processed:  {}/{}", result.entities_processed, result.total_entities);
    println!("Modified:   {}", result.entities_modified);
    println!("Relationships normalized: {}", result.relationships_normalized);
    println!("Duplicates removed:       {}", result.duplicates_removed);
    println!("Unresolved targets:       {}", result.orphan_targets.len());
    for (entity_id, target) in &result.orphan_targets {
        println!("  {entity_id} -> {target}");
    }
    if !result.errors.is_empty() {
        println!("Errors: {}", result.errors.len());
        for (id, err) in &result.errors {
            println!("  {id}: {err}");
        }
        std::process::exit(1);
    }

    Ok(())
}
