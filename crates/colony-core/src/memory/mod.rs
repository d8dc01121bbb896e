//! Durable, cross-run knowledge store.
//!
//! Entries are append-only. Every store answers queries through
//! [`rank_entries`] so ranking is identical regardless of backing storage.

mod heuristics;
mod jsonl;

pub use heuristics::{extract_confidence, extract_domain_tags, significant_words, truncate_chars};
pub use jsonl::JsonlKnowledgeStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::model::{Finding, Verdict, VerdictClass, VerifiedCitation};

pub const SUMMARY_CHARS: usize = 500;
pub const MAX_QUERY_RESULTS: usize = 10;

/// One persisted iteration: a finding, its verdict and its verified citations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub thread: String,
    pub finding_summary: String,
    pub verdict: String,
    #[serde(default)]
    pub verdict_class: Option<VerdictClass>,
    pub confidence: Option<u8>,
    pub domain_tags: Vec<String>,
    #[serde(default)]
    pub citations: Vec<VerifiedCitation>,
    pub run_id: String,
    #[serde(default)]
    pub depth: u32,
    pub timestamp: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn derive(
        run_id: &str,
        finding: &Finding,
        verdict: &Verdict,
        citations: Vec<VerifiedCitation>,
    ) -> Self {
        Self {
            thread: finding.thread.clone(),
            finding_summary: truncate_chars(&finding.text, SUMMARY_CHARS),
            verdict: verdict.text.clone(),
            verdict_class: Some(verdict.class),
            confidence: extract_confidence(&verdict.text, &finding.text),
            domain_tags: extract_domain_tags(&finding.thread),
            citations,
            run_id: run_id.to_string(),
            depth: finding.depth,
            timestamp: Utc::now(),
        }
    }

    fn matches_topic(&self, topic_lower: &str) -> bool {
        self.domain_tags
            .iter()
            .any(|tag| tag.contains(topic_lower) || topic_lower.contains(tag.as_str()))
            || self.thread.to_lowercase().contains(topic_lower)
    }
}

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn append(&self, entry: MemoryEntry) -> anyhow::Result<()>;

    /// Prior entries relevant to `topic`, best first, at most [`MAX_QUERY_RESULTS`].
    async fn query(&self, topic: &str) -> anyhow::Result<Vec<MemoryEntry>>;
}

pub type DynKnowledgeStore = Arc<dyn KnowledgeStore>;

/// Filter entries overlapping `topic`, then rank by shared significant words.
/// Ties keep insertion order.
pub fn rank_entries<I>(entries: I, topic: &str) -> Vec<MemoryEntry>
where
    I: IntoIterator<Item = MemoryEntry>,
{
    let topic_lower = topic.trim().to_lowercase();
    if topic_lower.is_empty() {
        return Vec::new();
    }
    let query_words = significant_words(&topic_lower);

    let mut scored: Vec<(usize, MemoryEntry)> = entries
        .into_iter()
        .filter(|entry| entry.matches_topic(&topic_lower))
        .map(|entry| {
            let entry_words =
                significant_words(&format!("{} {}", entry.thread, entry.finding_summary));
            let score = query_words
                .iter()
                .filter(|word| entry_words.contains(*word))
                .count();
            (score, entry)
        })
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored
        .into_iter()
        .take(MAX_QUERY_RESULTS)
        .map(|(_, entry)| entry)
        .collect()
}

/// In-memory store for tests and offline runs.
#[derive(Default)]
pub struct InMemoryKnowledgeStore {
    entries: RwLock<Vec<MemoryEntry>>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<MemoryEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub async fn entries(&self) -> Vec<MemoryEntry> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn append(&self, entry: MemoryEntry) -> anyhow::Result<()> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn query(&self, topic: &str) -> anyhow::Result<Vec<MemoryEntry>> {
        let snapshot = self.entries.read().await.clone();
        Ok(rank_entries(snapshot, topic))
    }
}

#[cfg(test)]
pub(crate) fn sample_entry(thread: &str, summary: &str) -> MemoryEntry {
    MemoryEntry {
        thread: thread.to_string(),
        finding_summary: summary.to_string(),
        verdict: "accepted".to_string(),
        verdict_class: Some(VerdictClass::Accepted),
        confidence: None,
        domain_tags: extract_domain_tags(thread),
        citations: Vec::new(),
        run_id: "run-test".to_string(),
        depth: 0,
        timestamp: Utc::now(),
    }
}
