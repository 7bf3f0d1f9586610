use anyhow::{bail, Context, Result};

/// Which inference backend serves the two analysis stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    OpenAi,
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub provider: ProviderKind,
    /// Required when `provider` is Gemini.
    pub gemini_api_key: Option<String>,
    /// Required when `provider` is OpenAI.
    pub openai_api_key: Option<String>,
    /// Fixed UTC offset (minutes) for calendar-day bucketing; the host's
    /// local zone when unset.
    pub time_offset_minutes: Option<i32>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let provider = match std::env::var("ANALYZER_PROVIDER")
            .unwrap_or_else(|_| "gemini".to_string())
            .to_lowercase()
            .as_str()
        {
            "gemini" => ProviderKind::Gemini,
            "openai" => ProviderKind::OpenAi,
            other => bail!("ANALYZER_PROVIDER must be 'gemini' or 'openai', got '{other}'"),
        };

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            provider,
            gemini_api_key: std::env::var("GEMINI_API_KEY").ok(),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            time_offset_minutes: match std::env::var("TIME_OFFSET_MINUTES") {
                Ok(raw) => Some(
                    raw.parse::<i32>()
                        .context("TIME_OFFSET_MINUTES must be an integer number of minutes")?,
                ),
                Err(_) => None,
            },
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
