//! Concrete source enrichers.

mod chat;
mod code_host;
mod issue_tracker;
mod session;

pub use chat::ChatEnricher;
pub use code_host::CodeHostEnricher;
pub use issue_tracker::IssueTrackerEnricher;
pub use session::SessionEnricher;

use super::Enricher;

/// Creates all built-in enrichers in the fixed processing order the
/// orchestrator drives: document-adjacent sources first, then chat, then
/// code/issue trackers, then session research.
pub fn create_all_enrichers() -> Vec<Box<dyn Enricher>> {
    vec![
        Box::new(ChatEnricher::new()),
        Box::new(IssueTrackerEnricher::new()),
        Box::new(CodeHostEnricher::new()),
        Box::new(SessionEnricher::new()),
    ]
}
