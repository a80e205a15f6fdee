//! BRAIN+GRAPH query engine: alias lookup, stemmed content search, and
//! one-hop graph expansion, merged by max-score-wins.

use crate::error::{Error, Result};
use crate::index::{tokenize_and_stem, ContentIndex, IndexVocab, PorterStemmer};
use crate::registry::Registry;
use crate::store::EntityStore;
use std::collections::HashMap;

const SCORE_ALIAS_EXACT: f64 = 1.0;
const SCORE_ALIAS_PARTIAL: f64 = 0.5;
const SCORE_CONTENT_TITLE: f64 = 0.3;
const SCORE_CONTENT_BODY: f64 = 0.1;
const DEFAULT_EXPANSION_STRENGTH: f64 = 0.5;

/// One entry in a query result set, with the reasons it matched.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub entity_id: String,
    pub score: f64,
    pub match_reasons: Vec<String>,
}

fn bump(results: &mut HashMap<String, (f64, Vec<String>)>, id: String, score: f64, reason: &str) {
    let entry = results.entry(id).or_insert((0.0, Vec::new()));
    if score > entry.0 {
        entry.0 = score;
    }
    if !entry.1.iter().any(|r| r == reason) {
        entry.1.push(reason.to_string());
    }
}

fn id_for_slug(registry: &Registry, slug: &str) -> Option<String> {
    registry
        .entities
        .get(slug)
        .map(|entry| entry.path.trim_end_matches(".md").to_string())
}

fn alias_search(query: &str, registry: &Registry) -> HashMap<String, (f64, Vec<String>)> {
    let mut results = HashMap::new();
    let query_lower = query.to_lowercase();
    if query_lower.is_empty() {
        return results;
    }

    if let Some(slug) = registry.alias_index.get(&query_lower) {
        if let Some(id) = id_for_slug(registry, slug) {
            bump(&mut results, id, SCORE_ALIAS_EXACT, "alias");
        }
    }

    let terms: Vec<&str> = query_lower.split_whitespace().collect();
    if terms.is_empty() {
        return results;
    }
    let mut term_counts: HashMap<&str, usize> = HashMap::new();
    for term in &terms {
        *term_counts.entry(*term).or_insert(0) += 1;
    }

    for (alias, slug) in &registry.alias_index {
        if alias == &query_lower {
            continue;
        }
        let Some(id) = id_for_slug(registry, slug) else {
            continue;
        };
        for term in &terms {
            if alias == term {
                let repeats = term_counts[term];
                let score =
                    (SCORE_ALIAS_PARTIAL + 0.1 * (repeats.saturating_sub(1)) as f64).min(1.0);
                bump(&mut results, id.clone(), score, "alias");
            } else if alias.len() <= term.len() + 3 && term.starts_with(alias.as_str()) {
                bump(&mut results, id.clone(), SCORE_ALIAS_PARTIAL * 0.8, "alias");
            }
        }
    }

    results
}

fn expand_tokens(tokens: &[String], synonyms: &HashMap<String, Vec<String>>) -> Vec<Vec<String>> {
    tokens
        .iter()
        .map(|t| {
            let mut group = vec![t.clone()];
            if let Some(syns) = synonyms.get(t.as_str()) {
                for s in syns {
                    group.push(s.clone());
                }
            }
            group
        })
        .collect()
}

fn slug_name_matches(entity_id: &str, terms: &[&str]) -> bool {
    let slug = entity_id.rsplit('/').next().unwrap_or(entity_id);
    let spaced = slug.replace(['-', '_'], " ").to_lowercase();
    terms.iter().any(|term| spaced.contains(term))
}

fn content_search(query: &str, index: &ContentIndex, vocab: &IndexVocab) -> HashMap<String, (f64, Vec<String>)> {
    let stemmer = PorterStemmer::new();
    let tokens = tokenize_and_stem(query, &stemmer, &vocab.stopwords);
    let mut results = HashMap::new();
    if tokens.is_empty() {
        return results;
    }

    let groups = expand_tokens(&tokens, &vocab.synonyms);
    let mut per_token_matches: Vec<std::collections::HashSet<&str>> = Vec::new();
    for group in &groups {
        let mut set = std::collections::HashSet::new();
        for variant in group {
            if let Some(postings) = index.postings(variant) {
                for id in postings {
                    set.insert(id.as_str());
                }
            }
        }
        per_token_matches.push(set);
    }

    let mut candidates: std::collections::HashSet<&str> = std::collections::HashSet::new();
    for set in &per_token_matches {
        candidates.extend(set.iter().copied());
    }

    let query_terms: Vec<&str> = query.to_lowercase().split_whitespace().collect();

    for id in candidates {
        let matched = per_token_matches.iter().filter(|set| set.contains(id)).count();
        let coverage = matched as f64 / tokens.len() as f64;
        let mut score = SCORE_CONTENT_BODY * coverage;
        if slug_name_matches(id, &query_terms) {
            score = score.max(SCORE_CONTENT_TITLE);
        }
        bump(&mut results, id.to_string(), score, "content");
    }

    results
}

fn merge(
    a: HashMap<String, (f64, Vec<String>)>,
    b: HashMap<String, (f64, Vec<String>)>,
) -> HashMap<String, (f64, Vec<String>)> {
    let mut merged = a;
    for (id, (score, reasons)) in b {
        let entry = merged.entry(id).or_insert((0.0, Vec::new()));
        if score > entry.0 {
            entry.0 = score;
        }
        for reason in reasons {
            if !entry.1.iter().any(|r| r == &reason) {
                entry.1.push(reason);
            }
        }
    }
    merged
}

/// Runs the full BRAIN+GRAPH query pipeline: alias search, stemmed content
/// search, merge, one-hop graph expansion, re-merge, sort, and truncate.
///
/// `depth` beyond `1` is not a defined behavior; any value other than `1` is
/// rejected.
pub fn query(
    store: &EntityStore,
    registry: &Registry,
    index: &ContentIndex,
    text: &str,
    limit: usize,
    use_graph: bool,
    depth: u32,
    vocab: &IndexVocab,
) -> Result<Vec<QueryResult>> {
    if depth != 1 {
        return Err(Error::PreconditionNotMet(
            "graph expansion depth other than 1 is not supported".to_string(),
        ));
    }

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let alias_hits = alias_search(text, registry);
    let content_hits = content_search(text, index, vocab);
    let seed = merge(alias_hits, content_hits);

    let mut merged = seed.clone();

    if use_graph {
        for (seed_id, (seed_score, _)) in &seed {
            let Ok(file) = store.read(seed_id) else {
                continue;
            };
            for rel in &file.header.relationships {
                if seed.contains_key(&rel.target) {
                    continue;
                }
                let neighbor_score = seed_score * rel.strength.unwrap_or(DEFAULT_EXPANSION_STRENGTH);
                bump(&mut merged, rel.target.clone(), neighbor_score, "graph");
            }
        }
    }

    let mut results: Vec<QueryResult> = merged
        .into_iter()
        .map(|(entity_id, (score, match_reasons))| QueryResult {
            entity_id,
            score,
            match_reasons,
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.entity_id.cmp(&b.entity_id))
    });
    results.truncate(limit);

    Ok(results)
}
