//! Configuration types, read from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::channels::gmail::GmailConfig;
use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::pipeline::gate::DEFAULT_MARKER_LABEL;
use crate::pipeline::generator::DEFAULT_PERSONA;
use crate::pipeline::processor::DEFAULT_HISTORY_TURNS;
use crate::pipeline::thread::DEFAULT_THREAD_WINDOW;

/// Default model when `AUTOREPLY_MODEL` is unset.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Default conversation store location.
pub const DEFAULT_HISTORY_PATH: &str = "email_history.json";

/// Full configuration for one deployment.
#[derive(Debug, Clone)]
pub struct ReplyConfig {
    pub gmail: GmailConfig,
    pub llm: LlmConfig,
    /// Marker label applied to handled messages.
    pub marker_label: String,
    pub history_path: PathBuf,
    pub knowledge_path: Option<PathBuf>,
    /// Prior thread messages shown to the generator.
    pub thread_window: usize,
    /// Stored turns rendered in debug logs.
    pub history_turns: usize,
    pub persona: String,
    pub strip_quotes: bool,
    pub dry_run: bool,
    /// Run periodically instead of once.
    pub poll_interval: Option<Duration>,
    /// Directory for daily-rotated log files; stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

impl ReplyConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let gmail = GmailConfig::from_lookup(&lookup)?;

        let backend = match get("AUTOREPLY_LLM_BACKEND") {
            Some(raw) => LlmBackend::parse(&raw)?,
            None => LlmBackend::Anthropic,
        };
        let key_var = backend.api_key_var();
        let api_key = get(key_var).ok_or_else(|| ConfigError::MissingEnvVar(key_var.to_string()))?;
        let llm = LlmConfig {
            backend,
            api_key: SecretString::from(api_key),
            model: get("AUTOREPLY_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        };

        let poll_interval = match parse::<u64>(&get, "AUTOREPLY_POLL_INTERVAL_SECS")? {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    key: "AUTOREPLY_POLL_INTERVAL_SECS".to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
            other => other.map(Duration::from_secs),
        };

        Ok(Self {
            gmail,
            llm,
            marker_label: get("AUTOREPLY_LABEL").unwrap_or_else(|| DEFAULT_MARKER_LABEL.to_string()),
            history_path: get("AUTOREPLY_HISTORY_PATH")
                .map_or_else(|| PathBuf::from(DEFAULT_HISTORY_PATH), PathBuf::from),
            knowledge_path: get("AUTOREPLY_KNOWLEDGE_PATH").map(PathBuf::from),
            thread_window: parse(&get, "AUTOREPLY_THREAD_WINDOW")?.unwrap_or(DEFAULT_THREAD_WINDOW),
            history_turns: parse(&get, "AUTOREPLY_HISTORY_TURNS")?.unwrap_or(DEFAULT_HISTORY_TURNS),
            persona: get("AUTOREPLY_SYSTEM_PROMPT").unwrap_or_else(|| DEFAULT_PERSONA.to_string()),
            strip_quotes: parse_flag(&get, "AUTOREPLY_STRIP_QUOTES")?,
            dry_run: parse_flag(&get, "AUTOREPLY_DRY_RUN")?,
            poll_interval,
            log_dir: get("AUTOREPLY_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|raw| {
            raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })
        })
        .transpose()
}

fn parse_flag(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<bool, ConfigError> {
    match get(key).map(|v| v.to_ascii_lowercase()).as_deref() {
        None | Some("0" | "false" | "no" | "off") => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some(other) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}
