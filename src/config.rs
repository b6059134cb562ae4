use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::AppError;

const DEFAULT_BASE_URL: &str = "https://api.dify.ai/v1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_SUBMISSIONS_FILE: &str = "data/capability-submissions.json";
const DEFAULT_STATIC_DIR: &str = "static";
const DEFAULT_RELAY_WAIT_SECS: u64 = 180;
const DEFAULT_EMITTER_TIMEOUT_SECS: u64 = 300;
const DEFAULT_WORKFLOW_WAIT_SECS: u64 = 60;

/// Runtime settings, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub dify_base_url: String,
    pub chatflow_api_key: String,
    pub workflow_api_key: String,
    pub port: u16,
    pub submissions_file: PathBuf,
    pub static_dir: PathBuf,
    /// How long a streaming chat request waits for a terminal upstream event.
    pub relay_wait: Duration,
    /// Lifetime of the downstream SSE channel before its timeout handler fires.
    pub emitter_timeout: Duration,
    /// How long an aggregated streaming workflow run may take.
    pub workflow_stream_wait: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup so tests need not touch
    /// the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| AppError::Config { message: format!("{key} must be set") })
        };

        Ok(Self {
            dify_base_url: get("DIFY_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            chatflow_api_key: required("DIFY_CHATFLOW_API_KEY")?,
            workflow_api_key: required("DIFY_WORKFLOW_API_KEY")?,
            port: parse_or(get("PORT"), "PORT", DEFAULT_PORT)?,
            submissions_file: get("SUBMISSIONS_FILE")
                .unwrap_or_else(|| DEFAULT_SUBMISSIONS_FILE.to_string())
                .into(),
            static_dir: get("STATIC_DIR").unwrap_or_else(|| DEFAULT_STATIC_DIR.to_string()).into(),
            relay_wait: Duration::from_secs(parse_or(
                get("RELAY_WAIT_SECS"),
                "RELAY_WAIT_SECS",
                DEFAULT_RELAY_WAIT_SECS,
            )?),
            emitter_timeout: Duration::from_secs(parse_or(
                get("RELAY_EMITTER_TIMEOUT_SECS"),
                "RELAY_EMITTER_TIMEOUT_SECS",
                DEFAULT_EMITTER_TIMEOUT_SECS,
            )?),
            workflow_stream_wait: Duration::from_secs(parse_or(
                get("WORKFLOW_STREAM_WAIT_SECS"),
                "WORKFLOW_STREAM_WAIT_SECS",
                DEFAULT_WORKFLOW_WAIT_SECS,
            )?),
        })
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T, AppError> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| AppError::Config {
            message: format!("{key} has an invalid value: '{value}'"),
        }),
    }
}
