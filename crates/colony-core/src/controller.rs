//! Recursion controller.
//!
//! Each thread runs its own explore → review → verify → persist loop. Threads
//! run concurrently with staggered starts and share one [`RunContext`]: the
//! session memory behind a `RwLock` and an [`IterationBudget`] whose
//! check-and-increment is a single atomic step.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::instrument;

use crate::agents::{Critic, Explorer, ExplorerInput, Verifier};
use crate::config::RunConfig;
use crate::error::GenerationError;
use crate::events::{ProgressEvent, ProgressSink, excerpt};
use crate::memory::{DynKnowledgeStore, MemoryEntry};
use crate::metrics;
use crate::model::{Finding, FindingSummary, SessionRecord, ThreadOutcome, ThreadReport};

const PROGRESS_EXCERPT_CHARS: usize = 160;

/// Run-wide cap on explore/critique iterations across all threads.
#[derive(Debug)]
pub struct IterationBudget {
    used: AtomicUsize,
    limit: usize,
}

impl IterationBudget {
    pub fn new(limit: usize) -> Self {
        Self {
            used: AtomicUsize::new(0),
            limit,
        }
    }

    /// Claim the next iteration, returning its 1-based index, or `None` once
    /// the limit is reached. The count never exceeds the limit.
    pub fn try_acquire(&self) -> Option<usize> {
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                (used < self.limit).then_some(used + 1)
            })
            .ok()
            .map(|previous| previous + 1)
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::SeqCst)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_exhausted(&self) -> bool {
        self.used() >= self.limit
    }
}

/// State shared by every thread pipeline of one run. Dropped when the run ends.
#[derive(Debug)]
pub struct RunContext {
    run_id: String,
    goal: String,
    memory: RwLock<Vec<SessionRecord>>,
    budget: IterationBudget,
}

impl RunContext {
    pub fn new(run_id: impl Into<String>, goal: impl Into<String>, max_iterations: usize) -> Self {
        Self {
            run_id: run_id.into(),
            goal: goal.into(),
            memory: RwLock::new(Vec::new()),
            budget: IterationBudget::new(max_iterations),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn budget(&self) -> &IterationBudget {
        &self.budget
    }

    /// Snapshot of session memory in append order.
    pub async fn session(&self) -> Vec<SessionRecord> {
        self.memory.read().await.clone()
    }

    async fn record(&self, record: SessionRecord) {
        self.memory.write().await.push(record);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoopLimits {
    /// Re-investigations allowed beyond the first pass.
    pub max_depth: u32,
    /// Start delay per position in the thread list.
    pub stagger: Duration,
}

impl From<&RunConfig> for LoopLimits {
    fn from(config: &RunConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            stagger: config.stagger(),
        }
    }
}

/// What one thread pipeline left behind.
#[derive(Debug, Clone)]
pub struct ThreadRun {
    pub report: ThreadReport,
    pub findings: Vec<FindingSummary>,
}

pub struct RecursionController {
    explorer: Explorer,
    critic: Critic,
    verifier: Verifier,
    knowledge: DynKnowledgeStore,
    limits: LoopLimits,
}

impl RecursionController {
    pub fn new(
        explorer: Explorer,
        critic: Critic,
        verifier: Verifier,
        knowledge: DynKnowledgeStore,
        limits: LoopLimits,
    ) -> Self {
        Self {
            explorer,
            critic,
            verifier,
            knowledge,
            limits,
        }
    }

    /// Drive every thread to a terminal state. Results keep the seeded order.
    pub async fn run_threads(
        &self,
        ctx: &RunContext,
        threads: &[String],
        progress: &ProgressSink,
    ) -> Vec<ThreadRun> {
        let pipelines = threads.iter().enumerate().map(|(position, thread)| async move {
            let delay = self.limits.stagger * position as u32;
            if !delay.is_zero() {
                sleep(delay).await;
            }
            self.run_thread(ctx, thread, progress).await
        });
        join_all(pipelines).await
    }

    #[instrument(name = "controller.thread", skip(self, ctx, progress), fields(run_id = %ctx.run_id))]
    async fn run_thread(&self, ctx: &RunContext, thread: &str, progress: &ProgressSink) -> ThreadRun {
        let mut depth = 0;
        let mut findings = Vec::new();

        let outcome = loop {
            let Some(iteration) = ctx.budget.try_acquire() else {
                tracing::info!(depth, "iteration budget exhausted, halting thread");
                break ThreadOutcome::BudgetExhausted { depth };
            };

            match self.iterate(ctx, thread, depth, iteration, progress).await {
                Ok(summary) => {
                    let recurse = summary.verdict.requires_recursion();
                    findings.push(summary);
                    if !recurse {
                        break ThreadOutcome::Resolved { depth };
                    }
                    if depth >= self.limits.max_depth {
                        tracing::info!(depth, "depth cap reached, flagging thread");
                        break ThreadOutcome::Flagged { depth };
                    }
                    depth += 1;
                    progress.emit(ProgressEvent::Recursing {
                        thread: thread.to_string(),
                        next_depth: depth,
                    });
                }
                Err(err) => {
                    tracing::error!(depth, error = %err, "thread pipeline failed");
                    metrics::record_iteration("failed", depth);
                    break ThreadOutcome::Failed {
                        depth,
                        error: err.to_string(),
                    };
                }
            }
        };

        progress.emit(ProgressEvent::ThreadSettled {
            thread: thread.to_string(),
            outcome: outcome.clone(),
        });
        ThreadRun {
            report: ThreadReport {
                thread: thread.to_string(),
                outcome,
            },
            findings,
        }
    }

    /// One pass over a thread. Only text generation can fail it; a knowledge
    /// store failure is logged and the run carries on.
    async fn iterate(
        &self,
        ctx: &RunContext,
        thread: &str,
        depth: u32,
        iteration: usize,
        progress: &ProgressSink,
    ) -> Result<FindingSummary, GenerationError> {
        progress.emit(ProgressEvent::Investigating {
            thread: thread.to_string(),
            depth,
            iteration,
        });

        // This run's own entries already reach the prompt through session memory.
        let prior: Vec<MemoryEntry> = match self.knowledge.query(thread).await {
            Ok(entries) => entries
                .into_iter()
                .filter(|entry| entry.run_id != ctx.run_id)
                .collect(),
            Err(err) => {
                tracing::warn!(error = %err, "knowledge query failed, continuing without prior context");
                Vec::new()
            }
        };
        let session = ctx.session().await;
        let exploration = self
            .explorer
            .explore(&ExplorerInput {
                goal: &ctx.goal,
                thread,
                depth,
                session: &session,
                prior: &prior,
            })
            .await?;
        progress.emit(ProgressEvent::SourcesGathered {
            thread: thread.to_string(),
            web: exploration.web_hits,
            academic: exploration.academic_hits,
            prior_entries: prior.len(),
        });

        let finding = Finding {
            thread: thread.to_string(),
            text: exploration.text,
            citations: exploration.citations,
            depth,
            iteration,
        };
        progress.emit(ProgressEvent::FindingProduced {
            thread: thread.to_string(),
            depth,
            citations: finding.citations.len(),
            excerpt: excerpt(&finding.text, PROGRESS_EXCERPT_CHARS),
        });

        // Re-read so verdicts recorded by other threads meanwhile are visible.
        let history = ctx.session().await;
        let verdict = self
            .critic
            .review(&ctx.goal, thread, &finding.text, &history)
            .await?;
        progress.emit(ProgressEvent::VerdictReached {
            thread: thread.to_string(),
            class: verdict.class,
            excerpt: excerpt(&verdict.text, PROGRESS_EXCERPT_CHARS),
        });

        ctx.record(SessionRecord {
            finding: finding.clone(),
            verdict: verdict.clone(),
        })
        .await;

        let verified = self.verifier.verify(&finding.text, &finding.citations).await;
        let verified_count = verified.iter().filter(|citation| citation.verified).count();
        progress.emit(ProgressEvent::CitationsVerified {
            thread: thread.to_string(),
            verified: verified_count,
            total: verified.len(),
        });

        let entry = MemoryEntry::derive(&ctx.run_id, &finding, &verdict, verified);
        let confidence = entry.confidence;
        match self.knowledge.append(entry).await {
            Ok(()) => progress.emit(ProgressEvent::MemoryPersisted {
                thread: thread.to_string(),
                confidence,
            }),
            Err(err) => {
                tracing::warn!(error = %err, "failed to persist knowledge entry");
                progress.emit(ProgressEvent::MemoryPersistFailed {
                    thread: thread.to_string(),
                    error: format!("{err:#}"),
                });
            }
        }

        metrics::record_iteration(verdict.class.as_str(), depth);
        Ok(FindingSummary {
            thread: thread.to_string(),
            depth,
            iteration,
            verdict: verdict.class,
            confidence,
            citations: finding.citations.len(),
            verified_citations: verified_count,
        })
    }
}
