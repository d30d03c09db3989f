//! Environment-variable configuration. The gateway takes no config
//! file — every knob is an env var, read once at startup.

use std::path::PathBuf;

/// Fully-resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bearer credential for the upstream Responses API.
    pub openai_api_key: secrecy::SecretString,
    /// Upstream model every downstream request is translated onto.
    pub openai_model: String,
    /// Listen port.
    pub port: u16,
    /// Whether JSONL event logging is enabled.
    pub log_events: bool,
    /// Directory event logs are written to, when enabled.
    pub log_dir: PathBuf,
    /// Per-request hard timeout; `None` disables it.
    pub request_timeout: Option<std::time::Duration>,
}

/// Fatal at startup when `OPENAI_API_KEY` is unset.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `OPENAI_API_KEY` was unset or empty.
    #[error("OPENAI_API_KEY is required")]
    MissingApiKey,
}

impl Config {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Parses configuration through an arbitrary lookup function, so the
    /// parsing rules can be exercised without touching real process
    /// environment state.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let openai_api_key = lookup("OPENAI_API_KEY").ok_or(ConfigError::MissingApiKey)?;

        if openai_api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }

        let openai_model = lookup("OPENAI_MODEL").unwrap_or_else(|| "gpt-4.1".to_string());

        let port = lookup("PORT").and_then(|value| value.parse().ok()).unwrap_or(8082);

        let log_events = lookup("LOG_EVENTS")
            .map(|value| value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let log_dir = lookup("LOG_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("./logs"));

        let request_timeout = lookup("REQUEST_TIMEOUT_MS")
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|millis| *millis > 0)
            .map(std::time::Duration::from_millis);

        Ok(Self {
            openai_api_key: secrecy::SecretString::from(openai_api_key),
            openai_model,
            port,
            log_events,
            log_dir,
            request_timeout,
        })
    }
}
