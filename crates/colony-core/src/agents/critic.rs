//! Critic agent for adversarial review of findings.

use tracing::instrument;

use crate::agents::render_verdicts;
use crate::error::GenerationError;
use crate::llm::DynGenerator;
use crate::model::{SessionRecord, Verdict};

const HISTORY_EXCERPT_CHARS: usize = 150;

/// Reviews a finding and classifies whether the thread needs more work.
pub struct Critic {
    generator: DynGenerator,
}

impl Critic {
    pub fn new(generator: DynGenerator) -> Self {
        Self { generator }
    }

    #[instrument(name = "agent.critic", skip_all, fields(thread = %thread))]
    pub async fn review(
        &self,
        goal: &str,
        thread: &str,
        finding: &str,
        history: &[SessionRecord],
    ) -> Result<Verdict, GenerationError> {
        let prompt = critic_prompt(goal, thread, finding, history);
        let verdict = Verdict::from_text(self.generator.generate(&prompt).await?);
        tracing::info!(
            class = verdict.class.as_str(),
            source = ?verdict.source,
            "Critic reached verdict"
        );
        Ok(verdict)
    }
}

fn critic_prompt(goal: &str, thread: &str, finding: &str, history: &[SessionRecord]) -> String {
    let history = if history.is_empty() {
        "(no prior verdicts)".to_string()
    } else {
        render_verdicts(history, HISTORY_EXCERPT_CHARS)
    };

    format!(
        "You are the Critic of a research colony. Review the finding adversarially.\n\
         Research goal: \"{goal}\"\n\
         Thread: \"{thread}\"\n\n\
         Finding:\n{finding}\n\n\
         Verdicts so far in this run:\n{history}\n\n\
         Judge the finding on:\n\
         1. Evidence sufficiency. If the evidence is weak, use the word \"insufficient\".\n\
         2. Logical gaps. If a gap needs more work, use the phrase \"investigate further\".\n\
         3. Contradiction with prior findings. If it conflicts, use the word \"contradicts\".\n\
         4. Confidence score (0-100).\n\
         5. Verdict: accepted, needs revision, or investigate further.\n\n\
         End your reply with exactly one line of the form\n\
         CLASSIFICATION: ACCEPTED | NEEDS_REVISION | INVESTIGATE_FURTHER"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::record;
    use crate::llm::FnGenerator;
    use crate::model::{ClassificationSource, VerdictClass};
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn prompt_lists_criteria_and_prior_verdicts() {
        let seen = Arc::new(Mutex::new(String::new()));
        let sink = seen.clone();
        let critic = Critic::new(Arc::new(FnGenerator::new(move |prompt: &str| {
            *sink.lock().unwrap() = prompt.to_string();
            Ok("Well sourced. Confidence: 78\nCLASSIFICATION: ACCEPTED".to_string())
        })));
        let history = vec![record(
            "recycling",
            0,
            "Recovery rates are low.",
            "This contradicts the cost thread.",
        )];

        let verdict = critic
            .review("goal", "cost parity", "Packs reach $90/kWh by 2030.", &history)
            .await
            .unwrap();

        assert_eq!(verdict.class, VerdictClass::Accepted);
        assert_eq!(verdict.source, ClassificationSource::Structured);
        let prompt = seen.lock().unwrap().clone();
        assert!(prompt.contains("\"investigate further\""));
        assert!(prompt.contains("recycling: [needs_revision] This contradicts"));
        assert!(prompt.contains("CLASSIFICATION:"));
    }

    #[tokio::test]
    async fn free_text_trigger_requests_recursion() {
        let critic = Critic::new(Arc::new(FnGenerator::new(|_: &str| {
            Ok("The claims need support; investigate further.".to_string())
        })));
        let verdict = critic.review("goal", "thread", "finding", &[]).await.unwrap();
        assert_eq!(verdict.class, VerdictClass::InvestigateFurther);
        assert!(verdict.requires_recursion());
    }
}
