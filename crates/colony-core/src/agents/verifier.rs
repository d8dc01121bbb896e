//! Verifier agent: checks that each cited source supports the finding.
//!
//! Every citation is fetched and judged concurrently. Nothing is dropped: an
//! unreachable source keeps its failure class as its status.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::timeout;
use tracing::instrument;

use crate::llm::DynGenerator;
use crate::memory::truncate_chars;
use crate::metrics;
use crate::model::{Citation, VerificationStatus, VerifiedCitation};
use crate::sources::{FetchFailure, PageFetcher};

const CLAIM_CHARS: usize = 500;

/// Parsed answer of a support check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportJudgement {
    pub status: VerificationStatus,
    pub rationale: String,
}

pub struct Verifier {
    generator: DynGenerator,
    fetcher: Arc<dyn PageFetcher>,
    fetch_timeout: Duration,
    max_content_chars: usize,
}

impl Verifier {
    pub fn new(
        generator: DynGenerator,
        fetcher: Arc<dyn PageFetcher>,
        fetch_timeout: Duration,
        max_content_chars: usize,
    ) -> Self {
        Self {
            generator,
            fetcher,
            fetch_timeout,
            max_content_chars,
        }
    }

    /// One result per input citation, in input order.
    #[instrument(name = "agent.verifier", skip_all, fields(citations = citations.len()))]
    pub async fn verify(&self, claim: &str, citations: &[Citation]) -> Vec<VerifiedCitation> {
        let claim = truncate_chars(claim, CLAIM_CHARS);
        let checked = join_all(
            citations
                .iter()
                .map(|citation| self.verify_one(&claim, citation)),
        )
        .await;

        for result in &checked {
            metrics::record_citation(result.status.as_str());
        }
        tracing::info!(
            verified = checked.iter().filter(|c| c.verified).count(),
            total = checked.len(),
            "Verifier checked citations"
        );
        checked
    }

    async fn verify_one(&self, claim: &str, citation: &Citation) -> VerifiedCitation {
        let fetched = match timeout(self.fetch_timeout, self.fetcher.fetch(&citation.url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchFailure::Timeout),
        };

        let content = match fetched {
            Ok(content) => truncate_chars(&content, self.max_content_chars),
            Err(failure) => {
                tracing::debug!(url = %citation.url, %failure, "citation source unavailable");
                return VerifiedCitation::new(
                    citation.clone(),
                    failure.status(),
                    format!("Could not access source ({failure})"),
                );
            }
        };

        if content.trim().is_empty() {
            return VerifiedCitation::new(
                citation.clone(),
                VerificationStatus::Insufficient,
                "Source returned no readable text",
            );
        }

        match self
            .generator
            .generate(&support_prompt(claim, citation, &content))
            .await
        {
            Ok(answer) => {
                let judgement = parse_support(&answer);
                VerifiedCitation::new(citation.clone(), judgement.status, judgement.rationale)
            }
            Err(err) => {
                tracing::warn!(url = %citation.url, error = %err, "support check failed");
                VerifiedCitation::new(
                    citation.clone(),
                    VerificationStatus::CheckFailed,
                    format!("Support check could not be generated ({err})"),
                )
            }
        }
    }
}

fn support_prompt(claim: &str, citation: &Citation, content: &str) -> String {
    format!(
        "Does the source below support the claim?\n\n\
         Claim:\n{claim}\n\n\
         Source: {} ({})\n{content}\n\n\
         Answer with one word, SUPPORTED, PARTIAL, UNSUPPORTED or INSUFFICIENT, \
         followed by a one-sentence rationale.",
        citation.title, citation.url
    )
}

const LABELS: [(&str, VerificationStatus); 4] = [
    ("UNSUPPORTED", VerificationStatus::Unsupported),
    ("SUPPORTED", VerificationStatus::Supported),
    ("PARTIAL", VerificationStatus::Partial),
    ("INSUFFICIENT", VerificationStatus::Insufficient),
];

/// Read the label and rationale from a support-check answer. Answers without a
/// recognizable leading label count as insufficient.
pub fn parse_support(answer: &str) -> SupportJudgement {
    let head = answer.trim_start_matches(|c: char| {
        c.is_whitespace() || matches!(c, '*' | '#' | '"' | '`' | '-')
    });

    for (label, status) in LABELS {
        let matches_label = head
            .get(..label.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(label));
        if matches_label {
            return SupportJudgement {
                status,
                rationale: rationale(&head[label.len()..]),
            };
        }
    }

    SupportJudgement {
        status: VerificationStatus::Insufficient,
        rationale: rationale(answer),
    }
}

fn rationale(rest: &str) -> String {
    let line = rest
        .lines()
        .map(|line| {
            line.trim_matches(|c: char| {
                c.is_whitespace() || matches!(c, '*' | ':' | '-' | '.' | ',' | '—')
            })
        })
        .find(|line| !line.is_empty());
    match line {
        Some(line) => format!("{line}."),
        None => "No rationale given.".to_string(),
    }
}
