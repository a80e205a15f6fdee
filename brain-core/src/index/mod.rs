//! Inverted content index: tokenizes and stems every entity's body text,
//! building a token -> posting-list map used by the query engine's content
//! search stage.

use crate::atomic::write_atomic;
use crate::config::IndexConfig;
use crate::error::Result;
use crate::store::EntityStore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;

const INDEX_FILE_NAME: &str = "index.json";

/// Default synonym groups, taken verbatim from `brain_search.py::_build_synonym_dict`.
/// Each group's members are mutually synonymous (bidirectional).
const DEFAULT_SYNONYM_GROUPS: &[(&str, &[&str])] = &[
    ("launch", &["releas", "deploy", "ship", "rollout"]),
    ("bug", &["issu", "defect", "error", "problem"]),
    ("feature", &["function", "capabl"]),
    ("user", &["custom", "client"]),
    ("team", &["squad", "group"]),
    ("test", &["verifi", "valid", "check"]),
    ("config", &["set", "configur"]),
    ("auth", &["authent", "login", "signin"]),
    ("api", &["endpoint", "servic"]),
    ("db", &["databas", "store"]),
    ("ui", &["interfac", "frontend", "ux"]),
];

/// Resolved stopword/synonym vocabulary the index and query engine both
/// consume, loaded once from [`IndexConfig`] so a build and a subsequent
/// query always tokenize with the same effective rules.
#[derive(Debug, Clone)]
pub struct IndexVocab {
    pub stopwords: HashSet<String>,
    pub synonyms: HashMap<String, Vec<String>>,
}

impl IndexVocab {
    /// Loads stopwords/synonyms per `config`, falling back to the compiled-in
    /// defaults when no override path is set.
    pub fn load(config: &IndexConfig) -> Result<Self> {
        let stopwords = match &config.stopwords_path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                content
                    .lines()
                    .map(|l| l.trim().to_lowercase())
                    .filter(|l| !l.is_empty())
                    .collect()
            }
            None => DEFAULT_STOPWORDS.iter().map(|s| s.to_string()).collect(),
        };

        let synonyms = match &config.synonyms_path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                let table: HashMap<String, Vec<String>> = toml::from_str(&content)
                    .map_err(|e| crate::error::Error::Config(format!("invalid synonym table {path:?}: {e}")))?;
                build_synonym_dict(table.iter().map(|(k, v)| (k.as_str(), v.clone())))
            }
            None => build_synonym_dict(
                DEFAULT_SYNONYM_GROUPS
                    .iter()
                    .map(|(k, v)| (*k, v.iter().map(|s| s.to_string()).collect())),
            ),
        };

        Ok(Self { stopwords, synonyms })
    }
}

impl Default for IndexVocab {
    fn default() -> Self {
        Self::load(&IndexConfig::default()).expect("compiled-in defaults never fail to load")
    }
}

fn build_synonym_dict<'a>(
    groups: impl Iterator<Item = (&'a str, Vec<String>)>,
) -> HashMap<String, Vec<String>> {
    let mut m: HashMap<String, Vec<String>> = HashMap::new();
    for (key, synonyms) in groups {
        for syn in synonyms {
            m.entry(key.to_string()).or_default().push(syn.clone());
            m.entry(syn).or_default().push(key.to_string());
        }
    }
    m
}

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[a-zA-Z][a-zA-Z0-9]*\b").unwrap())
}

fn code_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```.*?```").unwrap())
}

fn inline_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`[^`]*`").unwrap())
}

fn markdown_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap())
}

fn wiki_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[([^\]|]*)(\|[^\]]*)?\]\]").unwrap())
}

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^#+\s+").unwrap())
}

fn emphasis_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[*_]{1,2}([^*_]+)[*_]{1,2}").unwrap())
}

/// Compiled-in stop-word default, overridable via [`IndexConfig::stopwords_path`].
pub const DEFAULT_STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from",
    "further", "had", "has", "have", "having", "he", "her", "here", "hers", "herself", "him",
    "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just", "me",
    "more", "most", "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once", "only",
    "or", "other", "our", "ours", "ourselves", "out", "over", "own", "same", "she", "should",
    "so", "some", "such", "than", "that", "the", "their", "theirs", "them", "themselves", "then",
    "there", "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
    "very", "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why",
    "will", "with", "you", "your", "yours", "yourself", "yourselves",
];

/// Strips YAML frontmatter and common markdown markup, returning plain text
/// suitable for tokenization.
pub fn extract_text(content: &str) -> String {
    let body = if let Some(rest) = content.strip_prefix("---") {
        match rest.find("---") {
            Some(end) => &rest[end + 3..],
            None => content,
        }
    } else {
        content
    };

    let text = code_fence_re().replace_all(body, " ");
    let text = inline_code_re().replace_all(&text, " ");
    let text = markdown_link_re().replace_all(&text, "$1");
    let text = wiki_link_re().replace_all(&text, "$1");
    let text = header_re().replace_all(&text, "");
    let text = emphasis_re().replace_all(&text, "$1");
    text.into_owned()
}

/// Porter-style stemmer. Ported step for step: 1a/1b suffix stripping with a
/// vowel-in-stem guard, a closed-list suffix-replacement pass, then a final
/// set of length-gated trims.
#[derive(Default)]
pub struct PorterStemmer {
    cache: std::sync::Mutex<HashMap<String, String>>,
}

impl PorterStemmer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stem(&self, word: &str) -> String {
        let word = word.to_lowercase();
        if word.len() <= 2 {
            return word;
        }
        if let Some(cached) = self.cache.lock().unwrap().get(&word) {
            return cached.clone();
        }

        let mut w = word.clone();
        w = Self::step1a(&w);
        w = Self::step1b(&w);
        w = Self::step2(&w);
        w = Self::step345(&w);

        self.cache.lock().unwrap().insert(word, w.clone());
        w
    }

    fn has_vowel(s: &str) -> bool {
        s.chars().any(|c| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'))
    }

    fn step1a(w: &str) -> String {
        if let Some(stem) = w.strip_suffix("sses") {
            format!("{stem}ss")
        } else if let Some(stem) = w.strip_suffix("ies") {
            format!("{stem}i")
        } else if w.ends_with("ss") {
            w.to_string()
        } else if let Some(stem) = w.strip_suffix('s') {
            stem.to_string()
        } else {
            w.to_string()
        }
    }

    fn step1b(w: &str) -> String {
        if let Some(stem) = w.strip_suffix("eed") {
            if stem.len() > 1 {
                return format!("{stem}ee");
            }
            return w.to_string();
        }
        if let Some(stem) = w.strip_suffix("ed") {
            if Self::has_vowel(stem) {
                return Self::step1b_fixup(stem);
            }
            return w.to_string();
        }
        if let Some(stem) = w.strip_suffix("ing") {
            if Self::has_vowel(stem) {
                return Self::step1b_fixup(stem);
            }
            return w.to_string();
        }
        w.to_string()
    }

    fn step1b_fixup(stem: &str) -> String {
        if stem.ends_with("at") || stem.ends_with("bl") || stem.ends_with("iz") {
            format!("{stem}e")
        } else if Self::ends_double_consonant(stem) && !stem.ends_with(['l', 's', 'z']) {
            stem[..stem.len() - 1].to_string()
        } else {
            stem.to_string()
        }
    }

    fn ends_double_consonant(s: &str) -> bool {
        let bytes: Vec<char> = s.chars().collect();
        let n = bytes.len();
        n >= 2
            && bytes[n - 1] == bytes[n - 2]
            && !matches!(bytes[n - 1], 'a' | 'e' | 'i' | 'o' | 'u')
    }

    fn step2(w: &str) -> String {
        const REPLACEMENTS: &[(&str, &str)] = &[
            ("ational", "ate"),
            ("tional", "tion"),
            ("enci", "ence"),
            ("anci", "ance"),
            ("izer", "ize"),
            ("ation", "ate"),
            ("ator", "ate"),
            ("alism", "al"),
            ("iveness", "ive"),
            ("fulness", "ful"),
            ("ousness", "ous"),
            ("aliti", "al"),
            ("iviti", "ive"),
            ("biliti", "ble"),
        ];
        for (suffix, replacement) in REPLACEMENTS {
            if w.len() > suffix.len() + 2 {
                if let Some(stem) = w.strip_suffix(suffix) {
                    return format!("{stem}{replacement}");
                }
            }
        }
        w.to_string()
    }

    fn step345(w: &str) -> String {
        if w.len() > 7 {
            if let Some(stem) = w.strip_suffix("icate") {
                return stem.to_string();
            }
            if let Some(stem) = w.strip_suffix("ative") {
                return stem.to_string();
            }
            if let Some(stem) = w.strip_suffix("alize") {
                return stem.to_string();
            }
        }
        if w.len() > 5 {
            if let Some(stem) = w.strip_suffix("ful") {
                return stem.to_string();
            }
        }
        if w.len() > 6 {
            if let Some(stem) = w.strip_suffix("ness") {
                return stem.to_string();
            }
        }
        w.to_string()
    }
}

/// Tokenizes and stems `text`, dropping stopwords and tokens whose stem ends
/// up shorter than two characters.
pub fn tokenize_and_stem(text: &str, stemmer: &PorterStemmer, stopwords: &HashSet<String>) -> Vec<String> {
    word_re()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|w| w.len() >= 3 && !stopwords.contains(w.as_str()))
        .map(|w| stemmer.stem(&w))
        .filter(|w| w.len() >= 2)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IndexMeta {
    pub built: Option<chrono::DateTime<chrono::Utc>>,
    pub entity_count: usize,
    pub token_count: usize,
    pub total_postings: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContentIndex {
    pub meta: IndexMeta,
    pub index: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    And,
    Or,
}

#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub token_count: usize,
    pub total_postings: usize,
    pub avg_postings_per_token: f64,
    pub top_tokens: Vec<(String, usize)>,
}

impl ContentIndex {
    /// Builds the index from every entity's body text in `store`, using the
    /// compiled-in stopword defaults.
    pub fn build(store: &EntityStore) -> Result<Self> {
        Self::build_with_vocab(store, &IndexVocab::default())
    }

    /// Builds the index using a vocabulary loaded from [`IndexConfig`]
    /// (stopword overrides). A query against this index must tokenize with
    /// the same `vocab` to get consistent results.
    pub fn build_with_vocab(store: &EntityStore, vocab: &IndexVocab) -> Result<Self> {
        let stemmer = PorterStemmer::new();
        let mut index: HashMap<String, Vec<String>> = HashMap::new();
        let mut errors = Vec::new();
        let mut entity_count = 0usize;

        for id in store.list()? {
            match store.read(&id) {
                Ok(file) => {
                    entity_count += 1;
                    let text = extract_text(&file.body);
                    let tokens = tokenize_and_stem(&text, &stemmer, &vocab.stopwords);
                    let mut seen = std::collections::HashSet::new();
                    for token in tokens {
                        if seen.insert(token.clone()) {
                            index.entry(token).or_default().push(id.clone());
                        }
                    }
                }
                Err(e) => errors.push(format!("{id}: {e}")),
            }
        }

        for postings in index.values_mut() {
            postings.sort();
        }

        let total_postings: usize = index.values().map(|v| v.len()).sum();
        let meta = IndexMeta {
            built: Some(chrono::Utc::now()),
            entity_count,
            token_count: index.len(),
            total_postings,
            errors,
        };

        tracing::info!(entity_count, tokens = meta.token_count, "content index built");
        Ok(Self { meta, index })
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(&root.join(INDEX_FILE_NAME), &json)?;
        Ok(())
    }

    pub fn load(root: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(root.join(INDEX_FILE_NAME))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Looks up a single already-stemmed token's posting list.
    pub fn postings(&self, stemmed_token: &str) -> Option<&[String]> {
        self.index.get(stemmed_token).map(|v| v.as_slice())
    }

    /// Tokenizes, stems, and searches `query` in `mode`: `And` intersects
    /// every term's posting list, `Or` unions them.
    pub fn search(&self, query: &str, mode: SearchMode) -> Vec<String> {
        let stemmer = PorterStemmer::new();
        let stopwords: HashSet<String> = DEFAULT_STOPWORDS.iter().map(|s| s.to_string()).collect();
        let tokens = tokenize_and_stem(query, &stemmer, &stopwords);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut lists: Vec<&[String]> = Vec::new();
        for token in &tokens {
            match self.index.get(token) {
                Some(postings) => lists.push(postings),
                None if mode == SearchMode::And => return Vec::new(),
                None => {}
            }
        }
        if lists.is_empty() {
            return Vec::new();
        }

        let mut result: std::collections::BTreeSet<String> = lists[0].iter().cloned().collect();
        match mode {
            SearchMode::And => {
                for list in &lists[1..] {
                    let set: std::collections::HashSet<&String> = list.iter().collect();
                    result.retain(|id| set.contains(id));
                }
            }
            SearchMode::Or => {
                for list in &lists[1..] {
                    result.extend(list.iter().cloned());
                }
            }
        }
        result.into_iter().collect()
    }

    pub fn stats(&self) -> IndexStats {
        let mut counts: Vec<(String, usize)> = self
            .index
            .iter()
            .map(|(token, postings)| (token.clone(), postings.len()))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts.truncate(20);

        IndexStats {
            token_count: self.meta.token_count,
            total_postings: self.meta.total_postings,
            avg_postings_per_token: if self.meta.token_count > 0 {
                self.meta.total_postings as f64 / self.meta.token_count as f64
            } else {
                0.0
            },
            top_tokens: counts,
        }
    }
}
