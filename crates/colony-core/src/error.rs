use std::path::PathBuf;

use thiserror::Error;

/// Run-level error for Colony.
#[derive(Debug, Error)]
pub enum ColonyError {
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("missing environment variable: {0}")]
    MissingSecret(String),
    #[error("I/O error while reading {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("text generation failed: {0}")]
    Generation(#[from] GenerationError),
    #[error("seeding failed: {0}")]
    Seeding(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ColonyError {
    pub fn config_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigIo { path, source }
    }
}

/// Failure of the text-generation capability. Always fatal for the step that hit it.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rate limited by text-generation service")]
    RateLimited,
    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("service returned no text")]
    EmptyResponse,
    #[error("could not decode response: {0}")]
    Decode(String),
}

/// Failure of a source provider. Recovered inside the sources layer and never
/// surfaced past it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("missing credentials ({0})")]
    MissingCredentials(String),
    #[error("rate limited")]
    RateLimited,
    #[error("non-success status {0}")]
    Status(u16),
    #[error("timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("could not decode payload: {0}")]
    Decode(String),
}

impl ProviderError {
    /// Short label used for metrics attributes.
    pub fn class(&self) -> &'static str {
        match self {
            ProviderError::MissingCredentials(_) => "missing_credentials",
            ProviderError::RateLimited => "rate_limited",
            ProviderError::Status(_) => "status",
            ProviderError::Timeout => "timeout",
            ProviderError::Transport(_) => "transport",
            ProviderError::Decode(_) => "decode",
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}
