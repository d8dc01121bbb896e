use std::env;
use std::fmt;

use crate::ColonyError;

/// Provider API key read from the environment. Never printed: both `Debug`
/// and `Display` show only the variable it came from.
#[derive(Clone)]
pub struct ApiKey {
    var: String,
    value: String,
}

impl ApiKey {
    pub fn expose(&self) -> &str {
        &self.value
    }

    /// Name of the environment variable the key was read from.
    pub fn source_var(&self) -> &str {
        &self.var
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey(${}, redacted)", self.var)
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.var)
    }
}

/// Key for a provider the run cannot do without (text generation).
pub fn required_api_key(var: &str) -> Result<ApiKey, ColonyError> {
    optional_api_key(var).ok_or_else(|| ColonyError::MissingSecret(var.to_string()))
}

/// Key for a provider that skips itself when unconfigured. Blank counts as unset.
pub fn optional_api_key(var: &str) -> Option<ApiKey> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Some(ApiKey {
            var: var.to_string(),
            value,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_key_is_redacted_when_formatted() {
        unsafe {
            std::env::set_var("COLONY_TEST_BRAVE_KEY", "sk-live-123");
        }
        let key = required_api_key("COLONY_TEST_BRAVE_KEY").expect("key should load");
        assert_eq!(key.expose(), "sk-live-123");
        assert_eq!(key.source_var(), "COLONY_TEST_BRAVE_KEY");
        assert!(!format!("{key:?}").contains("sk-live"));
        assert_eq!(key.to_string(), "$COLONY_TEST_BRAVE_KEY");
    }

    #[test]
    fn blank_key_counts_as_unset() {
        unsafe {
            std::env::set_var("COLONY_TEST_BLANK_KEY", "   ");
        }
        assert!(optional_api_key("COLONY_TEST_BLANK_KEY").is_none());
        let err = required_api_key("COLONY_TEST_BLANK_KEY").unwrap_err();
        assert!(
            matches!(err, ColonyError::MissingSecret(name) if name == "COLONY_TEST_BLANK_KEY")
        );
    }
}
