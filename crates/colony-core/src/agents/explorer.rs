//! Explorer agent: investigates one thread against external sources and the
//! knowledge store, producing a finding with citations.

use std::collections::HashSet;
use std::fmt::Write as _;

use tracing::instrument;

use crate::agents::{render_findings, render_verdicts};
use crate::error::GenerationError;
use crate::events::excerpt;
use crate::llm::DynGenerator;
use crate::memory::MemoryEntry;
use crate::model::{Citation, SessionRecord};
use crate::sources::{ResilientSource, SourceSnippet};

const SESSION_EXCERPT_CHARS: usize = 200;
const PRIOR_EXCERPT_CHARS: usize = 300;
const SNIPPET_CHARS: usize = 600;

pub struct ExplorerInput<'a> {
    pub goal: &'a str,
    pub thread: &'a str,
    pub depth: u32,
    /// Session memory at the time the iteration starts.
    pub session: &'a [SessionRecord],
    /// Knowledge-store entries ranked for this thread.
    pub prior: &'a [MemoryEntry],
}

#[derive(Debug, Clone)]
pub struct Exploration {
    pub text: String,
    pub citations: Vec<Citation>,
    pub web_hits: usize,
    pub academic_hits: usize,
}

pub struct Explorer {
    generator: DynGenerator,
    web: ResilientSource,
    academic: ResilientSource,
}

impl Explorer {
    pub fn new(generator: DynGenerator, web: ResilientSource, academic: ResilientSource) -> Self {
        Self {
            generator,
            web,
            academic,
        }
    }

    /// Source lookups never fail this call; only text generation does.
    #[instrument(name = "agent.explorer", skip_all, fields(thread = %input.thread, depth = input.depth))]
    pub async fn explore(&self, input: &ExplorerInput<'_>) -> Result<Exploration, GenerationError> {
        let (web, academic) = tokio::join!(
            self.web.search(input.thread),
            self.academic.search(input.thread)
        );
        tracing::debug!(
            web = web.len(),
            academic = academic.len(),
            prior = input.prior.len(),
            "Explorer gathered context"
        );

        let prompt = explore_prompt(input, &web, &academic);
        let text = self.generator.generate(&prompt).await?;

        Ok(Exploration {
            text,
            citations: collect_citations(web.iter().chain(academic.iter())),
            web_hits: web.len(),
            academic_hits: academic.len(),
        })
    }
}

/// Every snippet with a URL becomes a citation, first occurrence wins.
fn collect_citations<'a>(snippets: impl Iterator<Item = &'a SourceSnippet>) -> Vec<Citation> {
    let mut seen = HashSet::new();
    snippets
        .filter_map(SourceSnippet::citation)
        .filter(|citation| seen.insert(citation.url.clone()))
        .collect()
}

fn explore_prompt(
    input: &ExplorerInput<'_>,
    web: &[SourceSnippet],
    academic: &[SourceSnippet],
) -> String {
    let mut prompt = format!(
        "You are an Explorer in a research colony.\n\
         Research goal: \"{}\"\n\
         Your thread: \"{}\"\n",
        input.goal, input.thread
    );

    if input.depth > 0 {
        let _ = writeln!(
            prompt,
            "\nThis is re-investigation pass {} of this thread. A critic found gaps in the \
             earlier findings; address them directly and go deeper rather than repeating them.",
            input.depth
        );
        let earlier: Vec<SessionRecord> = input
            .session
            .iter()
            .filter(|record| record.finding.thread == input.thread)
            .cloned()
            .collect();
        if !earlier.is_empty() {
            let _ = writeln!(
                prompt,
                "Critique of earlier passes:\n{}",
                render_verdicts(&earlier, SESSION_EXCERPT_CHARS)
            );
        }
    }

    if !input.session.is_empty() {
        let _ = writeln!(
            prompt,
            "\nFindings so far in this run:\n{}",
            render_findings(input.session, SESSION_EXCERPT_CHARS)
        );
    }

    if !input.prior.is_empty() {
        prompt.push_str("\nPrior knowledge from earlier runs:\n");
        for entry in input.prior {
            let confidence = entry
                .confidence
                .map_or_else(|| "unknown".to_string(), |score| score.to_string());
            let _ = writeln!(
                prompt,
                "- {} (confidence {}): {}",
                entry.thread,
                confidence,
                excerpt(&entry.finding_summary, PRIOR_EXCERPT_CHARS)
            );
        }
        prompt.push_str(
            "State explicitly whether your findings confirm, contradict or extend this prior \
             knowledge. Do not restate what is already known.\n",
        );
    }

    prompt.push_str("\nWeb sources:\n");
    render_snippets(&mut prompt, web);
    prompt.push_str("\nAcademic sources:\n");
    render_snippets(&mut prompt, academic);

    prompt.push_str(
        "\nWrite a focused finding for your thread. Ground claims in the sources above and \
         cite them by title and URL. If no sources are available, say so and reason from \
         general knowledge, flagging uncertainty.",
    );
    prompt
}

fn render_snippets(prompt: &mut String, snippets: &[SourceSnippet]) {
    if snippets.is_empty() {
        prompt.push_str("(none available)\n");
        return;
    }
    for (idx, snippet) in snippets.iter().enumerate() {
        let _ = writeln!(
            prompt,
            "[{}] {} ({})",
            idx + 1,
            snippet.title,
            snippet.url.as_deref().unwrap_or("no url")
        );
        if !snippet.authors.is_empty() {
            let _ = writeln!(prompt, "    Authors: {}", snippet.authors.join(", "));
        }
        let _ = writeln!(prompt, "    {}", excerpt(&snippet.summary, SNIPPET_CHARS));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::record;
    use crate::error::ProviderError;
    use crate::llm::FnGenerator;
    use crate::memory::sample_entry;
    use crate::model::SourceKind;
    use crate::sources::{ProviderPolicy, SourceProvider};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct Fixed(Result<Vec<SourceSnippet>, ProviderError>);

    #[async_trait]
    impl SourceProvider for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn search(&self, _query: &str) -> Result<Vec<SourceSnippet>, ProviderError> {
            self.0.clone()
        }
    }

    fn source(result: Result<Vec<SourceSnippet>, ProviderError>) -> ResilientSource {
        ResilientSource::new(Arc::new(Fixed(result)), ProviderPolicy::default())
    }

    fn snippet(title: &str, url: Option<&str>, kind: SourceKind) -> SourceSnippet {
        SourceSnippet {
            title: title.into(),
            summary: format!("summary of {title}"),
            url: url.map(str::to_string),
            authors: vec![],
            kind,
        }
    }

    fn capturing() -> (DynGenerator, Arc<Mutex<Vec<String>>>) {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let sink = prompts.clone();
        let generator: DynGenerator = Arc::new(FnGenerator::new(move |prompt: &str| {
            sink.lock().unwrap().push(prompt.to_string());
            Ok("finding text".to_string())
        }));
        (generator, prompts)
    }

    fn input<'a>(session: &'a [SessionRecord], prior: &'a [MemoryEntry]) -> ExplorerInput<'a> {
        ExplorerInput {
            goal: "assess solid-state battery adoption barriers",
            thread: "electrolyte manufacturing cost",
            depth: 0,
            session,
            prior,
        }
    }

    #[tokio::test]
    async fn citations_come_from_snippets_with_urls() {
        let (generator, prompts) = capturing();
        let explorer = Explorer::new(
            generator,
            source(Ok(vec![
                snippet("Web A", Some("https://a.example"), SourceKind::Web),
                snippet("Web B", None, SourceKind::Web),
            ])),
            source(Ok(vec![
                snippet("Paper C", Some("https://doi.org/10.1/c"), SourceKind::Academic),
                snippet("Web A again", Some("https://a.example"), SourceKind::Academic),
            ])),
        );

        let exploration = explorer.explore(&input(&[], &[])).await.unwrap();
        assert_eq!(exploration.text, "finding text");
        assert_eq!(exploration.web_hits, 2);
        assert_eq!(exploration.academic_hits, 2);
        let urls: Vec<_> = exploration.citations.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.example", "https://doi.org/10.1/c"]);

        let prompt = prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("Web B (no url)"));
        assert!(prompt.contains("Paper C"));
    }

    #[tokio::test]
    async fn unavailable_sources_still_produce_a_finding() {
        let (generator, prompts) = capturing();
        let explorer = Explorer::new(
            generator,
            source(Err(ProviderError::MissingCredentials("BRAVE_API_KEY".into()))),
            source(Err(ProviderError::Status(500))),
        );

        let exploration = explorer.explore(&input(&[], &[])).await.unwrap();
        assert!(exploration.citations.is_empty());
        assert!(prompts.lock().unwrap()[0].contains("(none available)"));
    }

    #[tokio::test]
    async fn prompt_carries_session_memory_and_prior_knowledge() {
        let (generator, prompts) = capturing();
        let explorer = Explorer::new(generator, ResilientSource::disabled(), ResilientSource::disabled());
        let session = vec![record(
            "electrolyte manufacturing cost",
            0,
            "Sulfide lines need dry rooms.",
            "Evidence is insufficient.\nCLASSIFICATION: NEEDS_REVISION",
        )];
        let prior = vec![sample_entry("electrolyte manufacturing", "dry room costs dominate")];

        let mut request = input(&session, &prior);
        request.depth = 1;
        explorer.explore(&request).await.unwrap();

        let prompt = prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("re-investigation pass 1"));
        assert!(prompt.contains("Sulfide lines need dry rooms."));
        assert!(prompt.contains("[needs_revision]"));
        assert!(prompt.contains("dry room costs dominate"));
        assert!(prompt.contains("confirm, contradict or extend"));
    }

    #[tokio::test]
    async fn generation_failure_is_fatal_for_the_step() {
        let explorer = Explorer::new(
            Arc::new(FnGenerator::new(|_: &str| Err(GenerationError::EmptyResponse))),
            ResilientSource::disabled(),
            ResilientSource::disabled(),
        );
        assert!(explorer.explore(&input(&[], &[])).await.is_err());
    }
}
