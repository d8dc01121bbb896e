//! Synthesizer agent: one final report over the whole session memory.

use std::fmt::Write as _;

use tracing::instrument;

use crate::error::GenerationError;
use crate::llm::DynGenerator;
use crate::model::SessionRecord;

pub struct Synthesizer {
    generator: DynGenerator,
}

impl Synthesizer {
    pub fn new(generator: DynGenerator) -> Self {
        Self { generator }
    }

    #[instrument(name = "agent.synthesizer", skip_all, fields(records = records.len()))]
    pub async fn synthesize(
        &self,
        goal: &str,
        records: &[SessionRecord],
    ) -> Result<String, GenerationError> {
        let report = self
            .generator
            .generate(&synthesis_prompt(goal, records))
            .await?;
        tracing::info!(chars = report.len(), "Synthesizer produced report");
        Ok(report)
    }
}

fn synthesis_prompt(goal: &str, records: &[SessionRecord]) -> String {
    let mut prompt = format!(
        "You are the Synthesizer of a research colony.\n\
         Research goal: \"{goal}\"\n\n\
         Complete run memory ({} entries):\n",
        records.len()
    );

    if records.is_empty() {
        prompt.push_str("(no findings were recorded)\n");
    }
    for (idx, record) in records.iter().enumerate() {
        let _ = write!(
            prompt,
            "\n--- Entry {} | thread: \"{}\" | depth {} | iteration {} ---\n\
             Finding:\n{}\n\
             Critic verdict [{}]:\n{}\n",
            idx + 1,
            record.finding.thread,
            record.finding.depth,
            record.finding.iteration,
            record.finding.text.trim(),
            record.verdict.class.as_str(),
            record.verdict.text.trim()
        );
    }

    prompt.push_str(
        "\nWrite the final report with these sections:\n\
         1. Key discoveries\n\
         2. Unresolved contradictions\n\
         3. Confidence the goal was accomplished (0-100)\n\
         4. A one-line statement: ACCOMPLISHED or NOT ACCOMPLISHED, with the reason.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::record;
    use crate::llm::FnGenerator;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn prompt_covers_every_record_and_section() {
        let seen = Arc::new(Mutex::new(String::new()));
        let sink = seen.clone();
        let synthesizer = Synthesizer::new(Arc::new(FnGenerator::new(move |prompt: &str| {
            *sink.lock().unwrap() = prompt.to_string();
            Ok("final report".to_string())
        })));
        let records = vec![
            record("cost parity", 0, "Costs remain 3x.", "investigate further"),
            record("cost parity", 1, "Scale closes half the gap.", "CLASSIFICATION: ACCEPTED"),
            record("safety", 0, "Fewer thermal events.", "Solid."),
        ];

        let report = synthesizer.synthesize("goal", &records).await.unwrap();
        assert_eq!(report, "final report");

        let prompt = seen.lock().unwrap().clone();
        assert!(prompt.contains("(3 entries)"));
        assert!(prompt.contains("thread: \"cost parity\" | depth 1"));
        assert!(prompt.contains("thread: \"safety\" | depth 0"));
        assert!(prompt.contains("Unresolved contradictions"));
        assert!(prompt.contains("(0-100)"));
        assert!(prompt.contains("NOT ACCOMPLISHED"));
    }

    #[tokio::test]
    async fn empty_memory_still_synthesizes() {
        let synthesizer = Synthesizer::new(Arc::new(FnGenerator::new(|prompt: &str| {
            assert!(prompt.contains("no findings were recorded"));
            Ok("nothing learned".to_string())
        })));
        assert!(synthesizer.synthesize("goal", &[]).await.is_ok());
    }
}
