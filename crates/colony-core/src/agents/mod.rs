//! The five Colony agents. Each wraps one prompt and one parse step around the
//! text-generation capability.

mod critic;
mod explorer;
mod seeder;
mod synthesizer;
mod verifier;

pub use critic::Critic;
pub use explorer::{Exploration, Explorer, ExplorerInput};
pub use seeder::{Seeder, parse_threads};
pub use synthesizer::Synthesizer;
pub use verifier::{SupportJudgement, Verifier, parse_support};

use crate::events::excerpt;
use crate::model::SessionRecord;

/// Compact one-line-per-record rendering of the finding text in session memory.
pub(crate) fn render_findings(records: &[SessionRecord], max_chars: usize) -> String {
    records
        .iter()
        .map(|record| {
            format!(
                "- {} (depth {}): {}",
                record.finding.thread,
                record.finding.depth,
                excerpt(&record.finding.text, max_chars)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Compact rendering of the verdicts in session memory.
pub(crate) fn render_verdicts(records: &[SessionRecord], max_chars: usize) -> String {
    records
        .iter()
        .map(|record| {
            format!(
                "- {}: [{}] {}",
                record.finding.thread,
                record.verdict.class.as_str(),
                excerpt(&record.verdict.text, max_chars)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
pub(crate) fn record(thread: &str, depth: u32, finding: &str, verdict: &str) -> SessionRecord {
    use crate::model::{Finding, Verdict};

    SessionRecord {
        finding: Finding {
            thread: thread.to_string(),
            text: finding.to_string(),
            citations: Vec::new(),
            depth,
            iteration: 1,
        },
        verdict: Verdict::from_text(verdict),
    }
}
