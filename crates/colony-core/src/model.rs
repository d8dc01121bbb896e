//! Run data model: findings, citations, verdicts and the final report.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Provider family a citation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Web,
    Academic,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Web => "web",
            SourceKind::Academic => "academic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub url: String,
    pub kind: SourceKind,
}

/// Outcome of checking one citation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Supported,
    Partial,
    Unsupported,
    Insufficient,
    DeadLink,
    Paywalled,
    Inaccessible,
    Timeout,
    Unreachable,
    /// Source was fetched but the support check itself could not be generated.
    CheckFailed,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Supported => "supported",
            VerificationStatus::Partial => "partial",
            VerificationStatus::Unsupported => "unsupported",
            VerificationStatus::Insufficient => "insufficient",
            VerificationStatus::DeadLink => "dead_link",
            VerificationStatus::Paywalled => "paywalled",
            VerificationStatus::Inaccessible => "inaccessible",
            VerificationStatus::Timeout => "timeout",
            VerificationStatus::Unreachable => "unreachable",
            VerificationStatus::CheckFailed => "check_failed",
        }
    }

    pub fn counts_as_verified(&self) -> bool {
        matches!(
            self,
            VerificationStatus::Supported | VerificationStatus::Partial
        )
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedCitation {
    #[serde(flatten)]
    pub citation: Citation,
    pub verified: bool,
    pub status: VerificationStatus,
    pub rationale: String,
}

impl VerifiedCitation {
    pub fn new(citation: Citation, status: VerificationStatus, rationale: impl Into<String>) -> Self {
        Self {
            citation,
            verified: status.counts_as_verified(),
            status,
            rationale: rationale.into(),
        }
    }
}

/// Text produced by investigating a thread, with the sources it drew on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub thread: String,
    pub text: String,
    pub citations: Vec<Citation>,
    /// Re-investigation depth; 0 for the first pass.
    pub depth: u32,
    /// Run-wide iteration index (1-based).
    pub iteration: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictClass {
    Accepted,
    NeedsRevision,
    InvestigateFurther,
}

impl VerdictClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictClass::Accepted => "accepted",
            VerdictClass::NeedsRevision => "needs_revision",
            VerdictClass::InvestigateFurther => "investigate_further",
        }
    }

    /// Both non-accepted classes send the thread round again.
    pub fn requires_recursion(&self) -> bool {
        *self != VerdictClass::Accepted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    /// Taken from the critic's `CLASSIFICATION:` line.
    Structured,
    /// Derived from trigger vocabulary in the free text.
    KeywordFallback,
}

static CLASSIFICATION_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^[\s>*_#-]*classification[\s*_]*:[\s*_]*(accepted|needs[\s_-]*revision|investigate[\s_-]*further)\b",
    )
    .expect("invalid classification regex")
});

/// Phrases whose presence in a critique triggers another pass.
pub const TRIGGER_PHRASES: [&str; 3] = ["insufficient", "investigate further", "contradicts"];

/// Critic judgement: the free text kept for humans plus the class that drives recursion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub text: String,
    pub class: VerdictClass,
    pub source: ClassificationSource,
}

impl Verdict {
    /// Classify critic output. A `CLASSIFICATION:` line wins (the last one if
    /// repeated); without one the trigger vocabulary decides.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let structured = CLASSIFICATION_LINE
            .captures_iter(&text)
            .last()
            .map(|caps| caps[1].to_lowercase());

        let (class, source) = match structured {
            Some(label) if label.starts_with("accepted") => {
                (VerdictClass::Accepted, ClassificationSource::Structured)
            }
            Some(label) if label.starts_with("needs") => {
                (VerdictClass::NeedsRevision, ClassificationSource::Structured)
            }
            Some(_) => (
                VerdictClass::InvestigateFurther,
                ClassificationSource::Structured,
            ),
            None => (keyword_class(&text), ClassificationSource::KeywordFallback),
        };

        Self {
            text,
            class,
            source,
        }
    }

    pub fn requires_recursion(&self) -> bool {
        self.class.requires_recursion()
    }
}

fn keyword_class(text: &str) -> VerdictClass {
    let lowered = text.to_lowercase();
    if lowered.contains("investigate further") {
        VerdictClass::InvestigateFurther
    } else if lowered.contains("insufficient") || lowered.contains("contradicts") {
        VerdictClass::NeedsRevision
    } else {
        VerdictClass::Accepted
    }
}

/// One reviewed iteration held in a run's session memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub finding: Finding,
    pub verdict: Verdict,
}

/// Terminal state of one thread pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ThreadOutcome {
    Resolved { depth: u32 },
    /// Critic still wanted more after the depth cap was reached.
    Flagged { depth: u32 },
    /// Halted by the run-wide budget before investigating at `depth`.
    BudgetExhausted { depth: u32 },
    Failed { depth: u32, error: String },
}

impl ThreadOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ThreadOutcome::Resolved { .. } => "resolved",
            ThreadOutcome::Flagged { .. } => "flagged",
            ThreadOutcome::BudgetExhausted { .. } => "budget_exhausted",
            ThreadOutcome::Failed { .. } => "failed",
        }
    }
}

/// Per-iteration digest carried into the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingSummary {
    pub thread: String,
    pub depth: u32,
    pub iteration: usize,
    pub verdict: VerdictClass,
    pub confidence: Option<u8>,
    pub citations: usize,
    pub verified_citations: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadReport {
    pub thread: String,
    pub outcome: ThreadOutcome,
}

/// Terminal artifact of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub run_id: String,
    pub goal: String,
    pub synthesis: String,
    pub iterations: usize,
    pub thread_count: usize,
    pub threads: Vec<ThreadReport>,
    pub findings: Vec<FindingSummary>,
    pub failures: Vec<String>,
    pub duration_ms: u64,
}

impl Report {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn render_markdown(&self) -> String {
        let mut output = format!("# Colony report\n\nGoal: {}\nRun: {}\n\n", self.goal, self.run_id);
        output.push_str(&self.synthesis);
        output.push_str("\n\n## Threads\n");
        for (idx, thread) in self.threads.iter().enumerate() {
            output.push_str(&format!(
                "{}. {} [{}]\n",
                idx + 1,
                thread.thread,
                thread.outcome.label()
            ));
        }
        output.push_str(&format!(
            "\nTotal iterations: {}\nFindings in memory: {}\n",
            self.iterations,
            self.findings.len()
        ));
        if !self.failures.is_empty() {
            output.push_str("\n## Failures\n");
            for failure in &self.failures {
                output.push_str(&format!("- {failure}\n"));
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_line_drives_classification() {
        let verdict = Verdict::from_text(
            "The evidence is insufficient in places but acceptable overall.\nCLASSIFICATION: ACCEPTED",
        );
        assert_eq!(verdict.class, VerdictClass::Accepted);
        assert_eq!(verdict.source, ClassificationSource::Structured);
        assert!(!verdict.requires_recursion());
    }

    #[test]
    fn structured_line_tolerates_markdown_and_separators() {
        let verdict = Verdict::from_text("Review...\n**Classification:** needs-revision");
        assert_eq!(verdict.class, VerdictClass::NeedsRevision);

        let verdict = Verdict::from_text("- classification: INVESTIGATE_FURTHER");
        assert_eq!(verdict.class, VerdictClass::InvestigateFurther);
        assert!(verdict.requires_recursion());
    }

    #[test]
    fn keyword_fallback_matches_each_trigger_case_insensitively() {
        for text in [
            "Evidence is INSUFFICIENT.",
            "We should Investigate Further.",
            "This contradicts the prior thread.",
        ] {
            let verdict = Verdict::from_text(text);
            assert_eq!(verdict.source, ClassificationSource::KeywordFallback);
            assert!(verdict.requires_recursion(), "{text}");
        }
    }

    #[test]
    fn no_trigger_means_accepted() {
        let verdict = Verdict::from_text("Solid, well sourced. Confidence: 82");
        assert_eq!(verdict.class, VerdictClass::Accepted);
        assert_eq!(verdict.source, ClassificationSource::KeywordFallback);
    }

    #[test]
    fn ambiguous_phrasing_without_structure_recurses() {
        // "not insufficient" still trips the legacy substring check.
        let verdict = Verdict::from_text("The evidence is not insufficient.");
        assert!(verdict.requires_recursion());
        // The structured field overrides the same phrasing.
        let verdict =
            Verdict::from_text("The evidence is not insufficient.\nCLASSIFICATION: ACCEPTED");
        assert!(!verdict.requires_recursion());
    }

    #[test]
    fn verified_flag_follows_status() {
        let citation = Citation {
            title: "t".into(),
            url: "https://example.org".into(),
            kind: SourceKind::Web,
        };
        assert!(VerifiedCitation::new(citation.clone(), VerificationStatus::Partial, "").verified);
        assert!(!VerifiedCitation::new(citation, VerificationStatus::Timeout, "").verified);
    }
}
