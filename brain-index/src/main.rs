//! brain-index - whole-graph roll-up report generator
//!
//! Generates a human-readable (or JSON) summary of the entity graph: counts
//! by type/status, orphan distribution, top stale relationships, and
//! recently updated entities. Distinct from the inverted content index that
//! `brain-core::index` builds for keyword search.

mod report;

use anyhow::{Context, Result};
use brain_core::format::format_relative_time;
use brain_core::store::EntityStore;
use brain_core::Config;
use clap::Parser;
use report::IndexReport;

#[derive(Parser, Debug)]
#[command(name = "brain-index")]
#[command(about = "Generate a roll-up report of the entity graph")]
#[command(version)]
struct Args {
    /// Brain root directory (defaults to the resolved config root)
    #[arg(long)]
    root: Option<std::path::PathBuf>,

    /// Output format: text (default), md, or json
    #[arg(long, default_value = "text")]
    format: String,

    /// Write the report to a file instead of stdout
    #[arg(long)]
    output: Option<std::path::PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = brain_core::logging::init(&config.logging).ok();

    let root = match args.root {
        Some(r) => r,
        None => config.root(),
    };
    let store = EntityStore::open(&root).context("failed to open entity store")?;

    let report = report::generate(&store, config.decay.decay_rate, config.decay.floor)
        .context("failed to generate index report")?;

    let rendered = match args.format.as_str() {
        "json" => render_json(&report)?,
        "md" => render_markdown(&report),
        "text" => render_text(&report),
        other => anyhow::bail!("unknown format '{other}'; use text, md, or json"),
    };

    match args.output {
        Some(path) => std::fs::write(&path, rendered).with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{rendered}"),
    }

    Ok(())
}

fn render_text(report: &IndexReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("Brain index — {}\n", report.generated_at.to_rfc3339()));
    out.push_str(&format!("  total entities: {}\n\n", report.total_entities));

    out.push_str("By type:\n");
    for (k, v) in sorted_pairs(&report.by_type) {
        out.push_str(&format!("  {k:<12} {v}\n"));
    }
    out.push('\n');

    out.push_str("By status:\n");
    for (k, v) in sorted_pairs(&report.by_status) {
        out.push_str(&format!("  {k:<12} {v}\n"));
    }
    out.push('\n');

    out.push_str(&format!("Orphans: {} total\n", report.total_orphans));
    for (k, v) in sorted_pairs(&report.orphans_by_reason) {
        out.push_str(&format!("  {k:<20} {v}\n"));
    }
    out.push('\n');

    out.push_str(&format!("Stale entities: {} total\n", report.total_stale_entities));
    for (k, v) in sorted_pairs(&report.stale_by_action) {
        out.push_str(&format!("  {k:<20} {v}\n"));
    }
    out.push('\n');

    out.push_str("Top stale relationships:\n");
    for r in &report.top_stale_relationships {
        out.push_str(&format!(
            "  {} --{}--> {} (conf {:.2}, {}d stale)\n",
            r.entity_id, r.relationship_type, r.target, r.decayed_confidence, r.days_stale
        ));
    }
    out.push('\n');

    out.push_str("Recently updated:\n");
    for e in &report.recently_updated {
        out.push_str(&format!(
            "  {} [{}] {} - {}\n",
            e.entity_id,
            e.entity_type,
            e.name,
            format_relative_time(e.updated)
        ));
    }

    out
}

fn render_markdown(report: &IndexReport) -> String {
    let mut out = String::new();
    out.push_str("# Brain Index\n\n");
    out.push_str(&format!("*Generated: {}*\n\n", report.generated_at.to_rfc3339()));

    out.push_str("## Summary\n\n");
    out.push_str("| Metric | Value |\n|--------|-------|\n");
    out.push_str(&format!("| Total entities | {} |\n", report.total_entities));
    out.push_str(&format!("| Orphans | {} |\n", report.total_orphans));
    out.push_str(&format!("| Stale entities | {} |\n", report.total_stale_entities));
    out.push('\n');

    out.push_str("## By Type\n\n| Type | Count |\n|------|-------|\n");
    for (k, v) in sorted_pairs(&report.by_type) {
        out.push_str(&format!("| {k} | {v} |\n"));
    }
    out.push('\n');

    out.push_str("## By Status\n\n| Status | Count |\n|--------|-------|\n");
    for (k, v) in sorted_pairs(&report.by_status) {
        out.push_str(&format!("| {k} | {v} |\n"));
    }
    out.push('\n');

    out.push_str("## Orphans by Reason\n\n| Reason | Count |\n|--------|-------|\n");
    for (k, v) in sorted_pairs(&report.orphans_by_reason) {
        out.push_str(&format!("| {k} | {v} |\n"));
    }
    out.push('\n');

    out.push_str("## Stale Entities by Recommended Action\n\n| Action | Count |\n|--------|-------|\n");
    for (k, v) in sorted_pairs(&report.stale_by_action) {
        out.push_str(&format!("| {k} | {v} |\n"));
    }
    out.push('\n');

    out.push_str("## Top Stale Relationships\n\n| Entity | Relationship | Target | Confidence | Days Stale |\n|---|---|---|---|---|\n");
    for r in &report.top_stale_relationships {
        out.push_str(&format!(
            "| {} | {} | {} | {:.2} | {} |\n",
            r.entity_id, r.relationship_type, r.target, r.decayed_confidence, r.days_stale
        ));
    }
    out.push('\n');

    out.push_str("## Recently Updated\n\n| Entity | Type | Name | Updated |\n|---|---|---|---|\n");
    for e in &report.recently_updated {
        out.push_str(&format!("| {} | {} | {} | {} |\n", e.entity_id, e.entity_type, e.name, e.updated.to_rfc3339()));
    }

    out
}

fn render_json(report: &IndexReport) -> Result<String> {
    let json = serde_json::json!({
        "generated_at": report.generated_at.to_rfc3339(),
        "total_entities": report.total_entities,
        "by_type": report.by_type,
        "by_status": report.by_status,
        "total_orphans": report.total_orphans,
        "orphans_by_reason": report.orphans_by_reason,
        "total_stale_entities": report.total_stale_entities,
        "stale_by_action": report.stale_by_action,
        "top_stale_relationships": report.top_stale_relationships.iter().map(|r| serde_json::json!({
            "entity_id": r.entity_id,
            "relationship_type": r.relationship_type,
            "target": r.target,
            "decayed_confidence": r.decayed_confidence,
            "days_stale": r.days_stale,
        })).collect::<Vec<_>>(),
        "recently_updated": report.recently_updated.iter().map(|e| serde_json::json!({
            "entity_id": e.entity_id,
            "entity_type": e.entity_type.to_string(),
            "name": e.name,
            "updated": e.updated.to_rfc3339(),
        })).collect::<Vec<_>>(),
    });
    Ok(serde_json::to_string_pretty(&json)?)
}

fn sorted_pairs(map: &std::collections::HashMap<String, usize>) -> Vec<(String, usize)> {
    let mut pairs: Vec<(String, usize)> = map.iter().map(|(k, v)| (k.clone(), *v)).collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    pairs
}
