use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

use crate::services::image_source::DEFAULT_MAX_UPLOAD_BYTES;
use crate::services::openrouter::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT};

pub const DEFAULT_MODEL: &str = "meta-llama/llama-4-scout:free";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Runtime configuration, read from the environment (and `.env`).
/// The API key is only ever supplied here, never compiled in.
#[derive(Clone)]
pub struct AppConfig {
    pub openrouter_api_key: String,
    pub openrouter_model: String,
    pub openrouter_base_url: String,
    pub analysis_timeout: Duration,
    pub max_upload_bytes: usize,
    pub bind_addr: String,
    pub access_token: Option<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("openrouter_api_key", &"***")
            .field("openrouter_model", &self.openrouter_model)
            .field("openrouter_base_url", &self.openrouter_base_url)
            .field("analysis_timeout", &self.analysis_timeout)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("bind_addr", &self.bind_addr)
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests need not touch the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let openrouter_api_key = get("OPENROUTER_API_KEY")
            .context("OPENROUTER_API_KEY must be set in the environment or .env file")?;

        let analysis_timeout = match get("ANALYSIS_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(
                v.trim()
                    .parse::<u64>()
                    .with_context(|| format!("ANALYSIS_TIMEOUT_SECS is not a number: {}", v))?,
            ),
            None => DEFAULT_TIMEOUT,
        };

        let max_upload_bytes = match get("MAX_UPLOAD_BYTES") {
            Some(v) => v
                .trim()
                .parse::<usize>()
                .with_context(|| format!("MAX_UPLOAD_BYTES is not a number: {}", v))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(Self {
            openrouter_api_key,
            openrouter_model: get("OPENROUTER_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            openrouter_base_url: get("OPENROUTER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            analysis_timeout,
            max_upload_bytes,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            access_token: get("SCANNER_ACCESS_TOKEN"),
        })
    }
}
