//! brain-resolve - resolve a free-text reference to a canonical entity id,
//! rebuild the resolver cache, or inspect alias coverage.

use anyhow::{Context, Result};
use brain_core::resolver::CanonicalResolver;
use brain_core::store::EntityStore;
use brain_core::Config;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "brain-resolve")]
#[command(about = "Resolve references against the canonical entity resolver")]
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
    /// Resolve a single reference
    Get {
        reference: String,
        /// Show similar references if unresolved
        #[arg(long, default_value_t = 5)]
        suggest: usize,
    },
    /// Rebuild the resolver cache from scratch
    Rebuild,
    /// Print resolver statistics
    Stats,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = brain_core::logging::init(&config.logging).ok();

    let root = args.root.unwrap_or_else(|| config.root());
    let store = EntityStore::open(&root).context("failed to open entity store")?;

    match args.command {
        Command::Get { reference, suggest } => {
            let resolver = CanonicalResolver::open(&store).context("failed to open resolver")?;
            match resolver.resolve(&reference) {
                Some(id) => println!("{reference} -> {id}"),
                None => {
                    println!("{reference} -> (unresolved)");
                    for (candidate, score) in resolver.find_similar(&reference, suggest) {
                        println!("  maybe: {candidate} ({score:.2})");
                    }
                }
            }
        }
        Command::Rebuild => {
            let resolver = CanonicalResolver::rebuild(&store).context("failed to rebuild resolver")?;
            let stats = resolver.stats();
            println!("Rebuilt resolver cache: {} canonical entities, {} references", stats.total_entities, stats.total_references);
        }
        Command::Stats => {
            let resolver = CanonicalResolver::open(&store).context("failed to open resolver")?;
            let stats = resolver.stats();
            println!("Canonical entities:    {}", stats.total_entities);
            println!("Known references:      {}", stats.total_references);
            println!("Avg refs per entity:   {}", stats.avg_refs_per_entity);
        }
    }

    Ok(())
}
