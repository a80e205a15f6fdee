//! brain-registry - rebuild the registry and content index, or print
//! registry stats. These are the two derived-layer artifacts every other
//! command (query, resolve) reads.

use anyhow::{Context, Result};
use brain_core::index::{ContentIndex, IndexVocab};
use brain_core::registry::Registry;
use brain_core::store::EntityStore;
use brain_core::Config;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "brain-registry")]
#[command(about = "Rebuild or inspect the entity registry and content index")]
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
    /// Rebuild registry + content index from the entity store
    Rebuild {
        /// Rebuild from scratch instead of incrementally against the existing registry
        #[arg(long)]
        full: bool,
    },
    /// Print registry counts
    Stats,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = brain_core::logging::init(&config.logging).ok();

    let root = args.root.unwrap_or_else(|| config.root());
    let store = EntityStore::open(&root).context("failed to open entity store")?;

    match args.command {
        Command::Rebuild { full } => {
            let incremental = if full { None } else { Registry::load(&root).ok() };
            let registry = Registry::rebuild(&store, incremental.as_ref()).context("failed to rebuild registry")?;
            registry.save(&root).context("failed to save registry")?;

            let vocab = IndexVocab::load(&config.index).context("failed to load index vocabulary")?;
            let index = ContentIndex::build_with_vocab(&store, &vocab).context("failed to build content index")?;
            index.save(&root).context("failed to save content index")?;

            println!("Registry rebuilt: {} entities", registry.entities.len());
            println!("Content index rebuilt: {} entities, {} tokens", index.meta.entity_count, index.meta.token_count);
        }
        Command::Stats => {
            let registry = Registry::load(&root).context("failed to load registry (run rebuild first)")?;
            println!("Registry entities: {}", registry.entities.len());
        }
    }

    Ok(())
}
