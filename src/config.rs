use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, ensure};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_FILE_LOG_FILTER: &str = "debug";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub log_dir: Option<PathBuf>,
    pub file_log_filter: String,
}

impl ClientSettings {
    pub fn from_env() -> Result<Self> {
        // Load .env if present, but do not fail if file does not exist.
        let _ = dotenvy::dotenv();

        let base_url =
            env::var("TEXTDRILL_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned());
        ensure!(
            !base_url.trim().is_empty(),
            "TEXTDRILL_BASE_URL cannot be empty"
        );

        let request_timeout_ms = parse_u64_env("TEXTDRILL_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)?;
        ensure!(
            request_timeout_ms > 0,
            "TEXTDRILL_TIMEOUT_MS must be greater than 0"
        );

        let log_dir = read_optional_env("TEXTDRILL_LOG_DIR").map(PathBuf::from);
        let file_log_filter = read_optional_env("TEXTDRILL_FILE_LOG")
            .unwrap_or_else(|| DEFAULT_FILE_LOG_FILTER.to_owned());

        Ok(Self {
            base_url: base_url.trim().to_owned(),
            request_timeout_ms,
            log_dir,
            file_log_filter,
        })
    }

    /// Settings pointing at `base_url` with defaults for everything else.
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
            log_dir: None,
            file_log_filter: DEFAULT_FILE_LOG_FILTER.to_owned(),
        }
    }
}

fn read_optional_env(name: &str) -> Option<String> {
    env::var(name).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_owned())
        }
    })
}

fn parse_u64_env(name: &str, default: u64) -> Result<u64> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("failed to parse {name} as u64")),
        Err(_) => Ok(default),
    }
}
