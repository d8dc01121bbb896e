//! Seeder agent: decomposes a goal into investigation threads.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::instrument;

use crate::error::GenerationError;
use crate::llm::DynGenerator;

/// Minimum length, after marker stripping, for an item to count as a thread.
const MIN_THREAD_CHARS: usize = 5;

static NUMBERED_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[\s*#>_-]*\(?\d{1,2}[.)]\s+").expect("invalid numbered marker regex")
});
static LEADING_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\s*#>_•-]*(?:\(?\d{1,2}[.)]\s*)?").expect("invalid leading marker regex")
});

pub struct Seeder {
    generator: DynGenerator,
    max_threads: usize,
}

impl Seeder {
    pub fn new(generator: DynGenerator, max_threads: usize) -> Self {
        Self {
            generator,
            max_threads: max_threads.max(1),
        }
    }

    /// Ask for 3-5 distinct angles on `goal`. Only a generation failure is an
    /// error; malformed output degrades to fewer, coarser threads.
    #[instrument(name = "agent.seeder", skip_all, fields(goal_chars = goal.len()))]
    pub async fn seed(&self, goal: &str) -> Result<Vec<String>, GenerationError> {
        let response = self.generator.generate(&seed_prompt(goal)).await?;
        let threads = parse_threads(&response, goal, self.max_threads);
        tracing::info!(threads = threads.len(), "Seeder mapped research threads");
        Ok(threads)
    }
}

fn seed_prompt(goal: &str) -> String {
    format!(
        "You are the Seeder of a research colony.\n\
         Research goal: \"{goal}\"\n\n\
         Break this goal into 3 to 5 independent research threads. Each thread must \
         be a materially different angle on the goal, not a paraphrase of another \
         thread. Reply with a numbered list, one thread per line, and nothing else.\n\
         Example:\n1. First angle\n2. Second angle\n3. Third angle"
    )
}

/// Parse a seeding response into at most `max_threads` threads, trying a JSON
/// array, then numbered markers, then plain lines, then the whole response.
/// Always returns at least one thread.
pub fn parse_threads(response: &str, goal: &str, max_threads: usize) -> Vec<String> {
    let trimmed = response.trim();

    let tiers = [
        json_items(trimmed),
        numbered_items(trimmed),
        line_items(trimmed),
    ];
    for items in tiers {
        if items.len() >= 2 {
            return items.into_iter().take(max_threads.max(1)).collect();
        }
    }

    if trimmed.is_empty() {
        vec![goal.trim().to_string()]
    } else {
        vec![trimmed.to_string()]
    }
}

fn json_items(text: &str) -> Vec<String> {
    let body = text
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    serde_json::from_str::<Vec<String>>(body)
        .map(|items| items.iter().filter_map(|item| usable(item)).collect())
        .unwrap_or_default()
}

fn numbered_items(text: &str) -> Vec<String> {
    let markers: Vec<_> = NUMBERED_MARKER.find_iter(text).collect();
    markers
        .iter()
        .enumerate()
        .filter_map(|(idx, marker)| {
            let end = markers
                .get(idx + 1)
                .map_or(text.len(), |next| next.start());
            let first_line = text[marker.end()..end]
                .lines()
                .find(|line| !line.trim().is_empty())?;
            usable(first_line)
        })
        .collect()
}

fn line_items(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.ends_with(':'))
        .filter_map(usable)
        .collect()
}

fn usable(raw: &str) -> Option<String> {
    let stripped = LEADING_MARKER.replace(raw.trim(), "");
    let cleaned = stripped
        .replace("**", "")
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '“' | '”' | ','))
        .trim()
        .to_string();
    (cleaned.chars().count() >= MIN_THREAD_CHARS).then_some(cleaned)
}
