//! brain-query - run the BRAIN+GRAPH query pipeline against the entity store.

use anyhow::{Context, Result};
use brain_core::index::{ContentIndex, IndexVocab};
use brain_core::query;
use brain_core::registry::Registry;
use brain_core::store::EntityStore;
use brain_core::Config;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "brain-query")]
#[command(about = "Search the entity graph by keyword, with optional one-hop expansion")]
#[command(version)]
struct Args {
    /// Search text
    text: String,

    /// Brain root directory
    #[arg(long)]
    root: Option<std::path::PathBuf>,

    /// Max results
    #[arg(long, default_value_t = 20)]
    limit: usize,

    /// Disable one-hop graph expansion
    #[arg(long)]
    no_graph: bool,

    /// Graph expansion depth (only 1 is supported)
    #[arg(long, default_value_t = 1)]
    depth: u32,

    /// Emit JSON instead of text
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = brain_core::logging::init(&config.logging).ok();

    let root = args.root.unwrap_or_else(|| config.root());
    let store = EntityStore::open(&root).context("failed to open entity store")?;
    let registry = Registry::load(&root).context("failed to load registry (run brain-registry first)")?;
    let index = ContentIndex::load(&root).context("failed to load content index (run brain-registry first)")?;
    let vocab = IndexVocab::load(&config.index).context("failed to load index vocabulary")?;

    let results = query::query(
        &store,
        &registry,
        &index,
        &args.text,
        args.limit,
        !args.no_graph,
        args.depth,
        &vocab,
    )
    .context("query failed")?;

    if args.json {
        let json = serde_json::to_string_pretty(
            &results
                .iter()
                .map(|r| serde_json::json!({"entity_id": r.entity_id, "score": r.score, "match_reasons": r.match_reasons}))
                .collect::<Vec<_>>(),
        )?;
        println!("{json}");
    } else if results.is_empty() {
        println!("No matches for \"{}\"", args.text);
    } else {
        for r in &results {
            println!("{:<40} {:.3}  [{}]", r.entity_id, r.score, r.match_reasons.join(", "));
        }
    }

    Ok(())
}
