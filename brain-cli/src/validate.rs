//! brain-validate - schema validation over entity files, without migrating.

use anyhow::{Context, Result};
use brain_core::migration::{Severity, Validator};
use brain_core::store::EntityStore;
use brain_core::Config;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "brain-validate")]
#[command(about = "Validate entity files against the v1/v2 schema rules")]
#[command(version)]
struct Args {
    /// Brain root directory
    #[arg(long)]
    root: Option<std::path::PathBuf>,

    /// Validate a single file instead of the whole store
    #[arg(long)]
    file: Option<std::path::PathBuf>,

    /// Only print entities with errors or warnings
    #[arg(long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = brain_core::logging::init(&config.logging).ok();

    let root = args.root.unwrap_or_else(|| config.root());

    let results = if let Some(path) = &args.file {
        vec![Validator::validate_file(path)]
    } else {
        let store = EntityStore::open(&root).context("failed to open entity store")?;
        Validator::validate_all(&store).context("failed to validate store")?
    };

    let mut error_count = 0;
    let mut warning_count = 0;

    for result in &results {
        if result.is_valid() && result.warnings.is_empty() {
            if !args.quiet {
                println!("OK    {}", result.path.display());
            }
            continue;
        }

        println!("{}  {}", if result.is_valid() { "WARN " } else { "FAIL " }, result.path.display());
        for issue in result.errors.iter().chain(result.warnings.iter()) {
            let tag = match issue.severity {
                Severity::Error => "error",
                Severity::Warning => "warn",
                Severity::Info => "info",
            };
            println!("  [{tag}] {}: {}", issue.field, issue.message);
        }
        error_count += result.errors.len();
        warning_count += result.warnings.len();
    }

    println!();
    println!("{} file(s), {} error(s), {} warning(s)", results.len(), error_count, warning_count);

    if error_count > 0 {
        std::process::exit(1);
    }
    Ok(())
}
