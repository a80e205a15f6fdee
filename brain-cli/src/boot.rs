//! brain-boot - run the pre-flight validator before a batch job starts.

use anyhow::{Context, Result};
use brain_core::boot::BootValidator;
use brain_core::store::EntityStore;
use brain_core::Config;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "brain-boot")]
#[command(about = "Run pre-flight checks against the entity store")]
#[command(version)]
struct Args {
    /// Brain root directory
    #[arg(long)]
    root: Option<std::path::PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = brain_core::logging::init(&config.logging).ok();

    let root = args.root.unwrap_or_else(|| config.root());
    let store = EntityStore::open(&root).context("failed to open entity store")?;

    let report = BootValidator::new(&store).run_preflight();

    for check in &report.checks {
        println!("{}  {:<40} {}", if check.passed { "OK  " } else { "FAIL" }, check.name, check.message);
    }

    if !report.passed() {
        std::process::exit(1);
    }
    Ok(())
}
