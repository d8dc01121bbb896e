//! Run entry point: goal → Seeder → thread pipelines → Synthesizer → report.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::instrument;
use uuid::Uuid;

use crate::agents::{Critic, Explorer, Seeder, Synthesizer, Verifier};
use crate::config::{ColonyConfig, RunConfig, VerifierConfig};
use crate::controller::{LoopLimits, RecursionController, RunContext};
use crate::error::ColonyError;
use crate::events::{ProgressEvent, ProgressSink};
use crate::llm::{AnthropicGenerator, DynGenerator};
use crate::memory::{DynKnowledgeStore, InMemoryKnowledgeStore, JsonlKnowledgeStore};
use crate::metrics;
use crate::model::{Report, ThreadOutcome};
use crate::sources::{
    BraveWebSearch, HttpPageFetcher, OpenAlexSearch, PageFetcher, ProviderPolicy,
    ResilientSource, SemanticScholarSearch,
};

/// A configured research colony. Cheap to share behind an `Arc`; every run
/// gets its own [`RunContext`].
pub struct Colony {
    seeder: Seeder,
    controller: RecursionController,
    synthesizer: Synthesizer,
    run: RunConfig,
}

impl Colony {
    pub fn builder() -> ColonyBuilder {
        ColonyBuilder::default()
    }

    /// Wire the production adapters: Anthropic for text, Brave for the web,
    /// OpenAlex with Semantic Scholar as fallback, and the JSON-lines log.
    pub fn from_config(config: &ColonyConfig) -> Result<Self, ColonyError> {
        let generator: DynGenerator = Arc::new(AnthropicGenerator::from_config(&config.llm)?);

        let client = reqwest::Client::builder()
            .timeout(config.sources.timeout())
            .build()
            .map_err(|err| {
                ColonyError::InvalidConfiguration(format!("failed to build HTTP client: {err}"))
            })?;
        let policy = ProviderPolicy::new(config.sources.timeout());

        let web = ResilientSource::new(
            Arc::new(BraveWebSearch::new(
                client.clone(),
                &config.sources.web_api_key_env,
                config.sources.max_results,
            )),
            policy,
        );
        let academic = ResilientSource::new(
            Arc::new(OpenAlexSearch::new(client.clone(), config.sources.max_results)),
            policy,
        )
        .with_fallback(
            Arc::new(SemanticScholarSearch::new(
                client,
                &config.sources.scholar_api_key_env,
                config.sources.max_results,
            )),
            policy.with_rate_limit_retry(1, config.sources.retry_delay()),
        );

        let fetcher = HttpPageFetcher::new(
            config.verifier.timeout(),
            config.verifier.max_content_chars,
        )
        .map_err(|err| {
            ColonyError::InvalidConfiguration(format!("failed to build fetch client: {err}"))
        })?;

        Colony::builder()
            .generator(generator)
            .web_source(web)
            .academic_source(academic)
            .fetcher(Arc::new(fetcher))
            .knowledge_store(Arc::new(JsonlKnowledgeStore::new(&config.knowledge.path)))
            .run_config(config.run.clone())
            .verifier_config(config.verifier.clone())
            .build()
    }

    /// Execute one run to completion, reporting every step through `progress`.
    ///
    /// Thread failures end up in [`Report::failures`]; only seeding and
    /// synthesis failures abort the run.
    #[instrument(name = "colony.run", skip_all, fields(goal_chars = goal.len()))]
    pub async fn run(&self, goal: &str, progress: &ProgressSink) -> Result<Report, ColonyError> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(fail(
                progress,
                ColonyError::Seeding("goal must not be empty".to_string()),
            ));
        }

        let started = Instant::now();
        let run_id = format!("run-{}", Uuid::new_v4());
        tracing::info!(%run_id, "Starting research run");
        progress.emit(ProgressEvent::RunStarted {
            run_id: run_id.clone(),
            goal: goal.to_string(),
        });

        let threads = match self.seeder.seed(goal).await {
            Ok(threads) => threads,
            Err(err) => return Err(fail(progress, err.into())),
        };
        progress.emit(ProgressEvent::Seeded {
            threads: threads.clone(),
        });

        let ctx = RunContext::new(run_id.clone(), goal, self.run.max_iterations);
        let thread_runs = self.controller.run_threads(&ctx, &threads, progress).await;
        let records = ctx.session().await;

        progress.emit(ProgressEvent::Synthesizing {
            findings: records.len(),
        });
        let synthesis = match self.synthesizer.synthesize(goal, &records).await {
            Ok(text) => text,
            Err(err) => return Err(fail(progress, err.into())),
        };

        let failures = thread_runs
            .iter()
            .filter_map(|run| match &run.report.outcome {
                ThreadOutcome::Failed { error, .. } => Some(format!("{}: {error}", run.report.thread)),
                _ => None,
            })
            .collect();
        let (thread_reports, findings): (Vec<_>, Vec<_>) = thread_runs
            .into_iter()
            .map(|run| (run.report, run.findings))
            .unzip();

        let duration_ms = started.elapsed().as_millis() as u64;
        let report = Report {
            run_id,
            goal: goal.to_string(),
            synthesis,
            iterations: ctx.budget().used(),
            thread_count: threads.len(),
            threads: thread_reports,
            findings: findings.into_iter().flatten().collect(),
            failures,
            duration_ms,
        };

        metrics::record_run(duration_ms, report.iterations);
        tracing::info!(
            iterations = report.iterations,
            findings = report.findings.len(),
            partial = report.is_partial(),
            duration_ms,
            "Research run completed"
        );
        progress.emit(ProgressEvent::Completed {
            report: Box::new(report.clone()),
        });
        Ok(report)
    }

    /// Spawn a run and hand back its progress stream. The stream ends after a
    /// `Completed` or `Failed` event.
    pub fn stream(
        self: Arc<Self>,
        goal: impl Into<String>,
    ) -> (
        UnboundedReceiver<ProgressEvent>,
        JoinHandle<Result<Report, ColonyError>>,
    ) {
        let goal = goal.into();
        let (progress, receiver) = ProgressSink::channel();
        let handle = tokio::spawn(async move { self.run(&goal, &progress).await });
        (receiver, handle)
    }
}

fn fail(progress: &ProgressSink, err: ColonyError) -> ColonyError {
    tracing::error!(error = %err, "Research run failed");
    progress.emit(ProgressEvent::Failed {
        error: err.to_string(),
    });
    err
}

/// Assembles a [`Colony`] from its capabilities. Only the generator is
/// required: sources default to disabled, the knowledge store to an in-memory
/// one and the page fetcher to plain HTTP.
#[derive(Default)]
pub struct ColonyBuilder {
    generator: Option<DynGenerator>,
    web: Option<ResilientSource>,
    academic: Option<ResilientSource>,
    fetcher: Option<Arc<dyn PageFetcher>>,
    knowledge: Option<DynKnowledgeStore>,
    run: RunConfig,
    verifier: VerifierConfig,
}

impl ColonyBuilder {
    pub fn generator(mut self, generator: DynGenerator) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn web_source(mut self, source: ResilientSource) -> Self {
        self.web = Some(source);
        self
    }

    pub fn academic_source(mut self, source: ResilientSource) -> Self {
        self.academic = Some(source);
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn knowledge_store(mut self, store: DynKnowledgeStore) -> Self {
        self.knowledge = Some(store);
        self
    }

    pub fn run_config(mut self, run: RunConfig) -> Self {
        self.run = run;
        self
    }

    pub fn verifier_config(mut self, verifier: VerifierConfig) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn build(self) -> Result<Colony, ColonyError> {
        let generator = self.generator.ok_or_else(|| {
            ColonyError::InvalidConfiguration("a text generator is required".to_string())
        })?;
        if self.run.max_iterations == 0 {
            return Err(ColonyError::InvalidConfiguration(
                "run.max_iterations must be at least 1".to_string(),
            ));
        }

        let fetcher: Arc<dyn PageFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(
                HttpPageFetcher::new(self.verifier.timeout(), self.verifier.max_content_chars)
                    .map_err(|err| {
                        ColonyError::InvalidConfiguration(format!(
                            "failed to build fetch client: {err}"
                        ))
                    })?,
            ),
        };
        let knowledge = self
            .knowledge
            .unwrap_or_else(|| Arc::new(InMemoryKnowledgeStore::new()));

        let explorer = Explorer::new(
            generator.clone(),
            self.web.unwrap_or_else(ResilientSource::disabled),
            self.academic.unwrap_or_else(ResilientSource::disabled),
        );
        let verifier = Verifier::new(
            generator.clone(),
            fetcher,
            self.verifier.timeout(),
            self.verifier.max_content_chars,
        );
        let controller = RecursionController::new(
            explorer,
            Critic::new(generator.clone()),
            verifier,
            knowledge,
            LoopLimits::from(&self.run),
        );

        Ok(Colony {
            seeder: Seeder::new(generator.clone(), self.run.max_threads),
            controller,
            synthesizer: Synthesizer::new(generator),
            run: self.run,
        })
    }
}
