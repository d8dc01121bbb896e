//! Progress stream for a run.
//!
//! Every agent step reports through a [`ProgressSink`]; callers read the
//! matching receiver and render each event as one progress line. Transport of
//! those lines (terminal, SSE, ...) is up to the caller.

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::model::{Report, ThreadOutcome, VerdictClass};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    RunStarted {
        run_id: String,
        goal: String,
    },
    Seeded {
        threads: Vec<String>,
    },
    Investigating {
        thread: String,
        depth: u32,
        iteration: usize,
    },
    SourcesGathered {
        thread: String,
        web: usize,
        academic: usize,
        prior_entries: usize,
    },
    FindingProduced {
        thread: String,
        depth: u32,
        citations: usize,
        excerpt: String,
    },
    VerdictReached {
        thread: String,
        class: VerdictClass,
        excerpt: String,
    },
    CitationsVerified {
        thread: String,
        verified: usize,
        total: usize,
    },
    MemoryPersisted {
        thread: String,
        confidence: Option<u8>,
    },
    MemoryPersistFailed {
        thread: String,
        error: String,
    },
    Recursing {
        thread: String,
        next_depth: u32,
    },
    ThreadSettled {
        thread: String,
        outcome: ThreadOutcome,
    },
    Synthesizing {
        findings: usize,
    },
    Completed {
        report: Box<Report>,
    },
    Failed {
        error: String,
    },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Completed { .. } | ProgressEvent::Failed { .. }
        )
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::RunStarted { run_id, goal } => {
                write!(f, "[COLONY] run {run_id} started for goal: \"{goal}\"")
            }
            ProgressEvent::Seeded { threads } => {
                write!(f, "[SEEDER] mapped {} research threads", threads.len())?;
                for (idx, thread) in threads.iter().enumerate() {
                    write!(f, "\n   {}. {}", idx + 1, thread)?;
                }
                Ok(())
            }
            ProgressEvent::Investigating {
                thread,
                depth,
                iteration,
            } => write!(
                f,
                "[EXPLORER] researching thread (depth {depth}, iteration {iteration}): \"{thread}\""
            ),
            ProgressEvent::SourcesGathered {
                thread,
                web,
                academic,
                prior_entries,
            } => write!(
                f,
                "[SOURCES] {web} web, {academic} academic, {prior_entries} prior entries for thread: \"{thread}\""
            ),
            ProgressEvent::FindingProduced {
                thread,
                depth,
                citations,
                excerpt,
            } => write!(
                f,
                "[EXPLORER] finding for \"{thread}\" (depth {depth}, {citations} citations): {excerpt}"
            ),
            ProgressEvent::VerdictReached {
                thread,
                class,
                excerpt,
            } => write!(
                f,
                "[CRITIC] {} for \"{thread}\": {excerpt}",
                class.as_str()
            ),
            ProgressEvent::CitationsVerified {
                thread,
                verified,
                total,
            } => write!(
                f,
                "[VERIFIER] {verified}/{total} citations support the finding for thread: \"{thread}\""
            ),
            ProgressEvent::MemoryPersisted { thread, confidence } => match confidence {
                Some(score) => write!(
                    f,
                    "[MEMORY] knowledge entry saved for thread: \"{thread}\" (confidence {score})"
                ),
                None => write!(f, "[MEMORY] knowledge entry saved for thread: \"{thread}\""),
            },
            ProgressEvent::MemoryPersistFailed { thread, error } => write!(
                f,
                "[MEMORY] could not persist entry for thread \"{thread}\": {error}"
            ),
            ProgressEvent::Recursing { thread, next_depth } => write!(
                f,
                "[LOOP] critic flagged gaps, going deeper (depth {next_depth}) on: \"{thread}\""
            ),
            ProgressEvent::ThreadSettled { thread, outcome } => match outcome {
                ThreadOutcome::Resolved { .. } => {
                    write!(f, "[LOOP] thread resolved: \"{thread}\"")
                }
                ThreadOutcome::Flagged { depth } => write!(
                    f,
                    "[LOOP] depth cap {depth} reached, thread flagged: \"{thread}\""
                ),
                ThreadOutcome::BudgetExhausted { .. } => write!(
                    f,
                    "[LOOP] iteration budget exhausted, halting thread: \"{thread}\""
                ),
                ThreadOutcome::Failed { error, .. } => {
                    write!(f, "[LOOP] thread failed: \"{thread}\": {error}")
                }
            },
            ProgressEvent::Synthesizing { findings } => write!(
                f,
                "[SYNTHESIZER] consolidating {findings} findings"
            ),
            ProgressEvent::Completed { report } => write!(
                f,
                "[COLONY] final synthesis ready ({} iterations, {} findings in memory)",
                report.iterations,
                report.findings.len()
            ),
            ProgressEvent::Failed { error } => write!(f, "[COLONY] run failed: {error}"),
        }
    }
}

/// Cloneable sending half of a run's progress stream.
#[derive(Clone)]
pub struct ProgressSink {
    sender: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// A sink that discards every event.
    pub fn silent() -> Self {
        Self { sender: None }
    }

    pub fn emit(&self, event: ProgressEvent) {
        tracing::debug!(progress = %event, "progress");
        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                tracing::trace!("progress receiver dropped");
            }
        }
    }
}

impl Default for ProgressSink {
    fn default() -> Self {
        Self::silent()
    }
}

/// Shorten text for a single progress line, respecting char boundaries.
pub(crate) fn excerpt(text: &str, max_chars: usize) -> String {
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= max_chars {
        return flattened;
    }
    let mut cut: String = flattened.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sink_delivers_events_in_order() {
        let (sink, mut receiver) = ProgressSink::channel();
        sink.emit(ProgressEvent::Synthesizing { findings: 2 });
        sink.emit(ProgressEvent::Failed {
            error: "boom".into(),
        });
        drop(sink);

        let first = receiver.recv().await.unwrap();
        assert!(matches!(first, ProgressEvent::Synthesizing { findings: 2 }));
        let second = receiver.recv().await.unwrap();
        assert!(second.is_terminal());
        assert!(receiver.recv().await.is_none());
    }

    #[test]
    fn dropped_receiver_does_not_panic() {
        let (sink, receiver) = ProgressSink::channel();
        drop(receiver);
        sink.emit(ProgressEvent::Synthesizing { findings: 0 });
        ProgressSink::silent().emit(ProgressEvent::Synthesizing { findings: 0 });
    }

    #[test]
    fn lines_render_with_agent_prefix() {
        let line = ProgressEvent::Recursing {
            thread: "cost curves".into(),
            next_depth: 1,
        }
        .to_string();
        assert!(line.starts_with("[LOOP]"));
        assert!(line.contains("depth 1"));

        let json = serde_json::to_value(ProgressEvent::Seeded {
            threads: vec!["a".into()],
        })
        .unwrap();
        assert_eq!(json["type"], "seeded");
    }

    #[test]
    fn excerpt_truncates_on_char_boundaries() {
        assert_eq!(excerpt("a  b\nc", 10), "a b c");
        assert_eq!(excerpt("ééééé", 3), "ééé...");
    }
}
