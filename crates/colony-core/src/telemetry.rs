use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt};

use crate::ColonyError;
use crate::config::LoggingConfig;

static SUBSCRIBER_INSTALLED: OnceLock<()> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct TelemetryOptions {
    /// Directive used when `RUST_LOG` is unset, e.g. `info,colony_core=debug`.
    pub env_filter: Option<String>,
    pub with_ansi: bool,
    pub with_target: bool,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            env_filter: None,
            with_ansi: true,
            with_target: false,
        }
    }
}

impl From<&LoggingConfig> for TelemetryOptions {
    fn from(config: &LoggingConfig) -> Self {
        Self {
            env_filter: Some(config.level.clone()),
            ..Self::default()
        }
    }
}

/// Install the run's log subscriber on stderr, leaving stdout to reports.
/// Later calls are no-ops.
pub fn init_telemetry(options: TelemetryOptions) -> Result<(), ColonyError> {
    if SUBSCRIBER_INSTALLED.get().is_some() {
        return Ok(());
    }

    fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::new(filter_directive(options.env_filter)))
        .with_ansi(options.with_ansi)
        .with_target(options.with_target)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| {
            ColonyError::InvalidConfiguration(format!("telemetry init failed: {err}"))
        })?;

    SUBSCRIBER_INSTALLED.get_or_init(|| ());
    Ok(())
}

fn filter_directive(configured: Option<String>) -> String {
    std::env::var("RUST_LOG")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or(configured)
        .unwrap_or_else(|| "info,colony_core=info".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_section_sets_the_filter() {
        let options = TelemetryOptions::from(&LoggingConfig {
            level: "debug".to_string(),
        });
        assert_eq!(options.env_filter.as_deref(), Some("debug"));
        assert!(options.with_ansi);
        assert!(!options.with_target);
    }
}
