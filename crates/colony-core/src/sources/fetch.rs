use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::VerificationStatus;

const USER_AGENT: &str = "Colony-Research-Agent/0.3";

static SCRIPT_OR_STYLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)\b[^>]*>.*?</(script|style|noscript)\s*>")
        .expect("invalid script regex")
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("invalid tag regex"));

/// Why a citation's source could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailure {
    /// 404 or 410.
    DeadLink,
    /// 401, 402 or 403.
    Paywalled,
    /// Any other non-success status.
    Inaccessible(u16),
    Timeout,
    /// Connection, TLS or other transport failure.
    Unreachable,
}

impl FetchFailure {
    pub fn from_status(status: u16) -> Self {
        match status {
            404 | 410 => FetchFailure::DeadLink,
            401..=403 => FetchFailure::Paywalled,
            other => FetchFailure::Inaccessible(other),
        }
    }

    pub fn status(&self) -> VerificationStatus {
        match self {
            FetchFailure::DeadLink => VerificationStatus::DeadLink,
            FetchFailure::Paywalled => VerificationStatus::Paywalled,
            FetchFailure::Inaccessible(_) => VerificationStatus::Inaccessible,
            FetchFailure::Timeout => VerificationStatus::Timeout,
            FetchFailure::Unreachable => VerificationStatus::Unreachable,
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::DeadLink => f.write_str("dead link"),
            FetchFailure::Paywalled => f.write_str("access forbidden (likely paywalled)"),
            FetchFailure::Inaccessible(status) => write!(f, "inaccessible (status {status})"),
            FetchFailure::Timeout => f.write_str("timed out"),
            FetchFailure::Unreachable => f.write_str("unreachable"),
        }
    }
}

/// Resolves a citation URL to plain text.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchFailure>;
}

pub struct HttpPageFetcher {
    client: reqwest::Client,
    max_chars: usize,
}

impl HttpPageFetcher {
    pub fn new(timeout: Duration, max_chars: usize) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client, max_chars })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchFailure> {
        let response = self.client.get(url).send().await.map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::from_status(status.as_u16()));
        }

        let body = response.text().await.map_err(classify_transport)?;
        Ok(strip_markup(&body, self.max_chars))
    }
}

fn classify_transport(err: reqwest::Error) -> FetchFailure {
    if err.is_timeout() {
        FetchFailure::Timeout
    } else {
        FetchFailure::Unreachable
    }
}

/// Remove markup, collapse whitespace and cap the result at `max_chars`.
pub fn strip_markup(html: &str, max_chars: usize) -> String {
    let without_code = SCRIPT_OR_STYLE.replace_all(html, " ");
    let without_tags = TAG.replace_all(&without_code, " ");
    without_tags
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(max_chars)
        .collect()
}
