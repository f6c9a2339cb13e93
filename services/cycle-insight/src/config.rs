//! Service configuration
//!
//! Built-in defaults, overridden by `CYCLE_INSIGHT_*` environment variables
//! (nested keys use `__`, e.g. `CYCLE_INSIGHT_NARRATOR__API_KEY`). The plain
//! `PORT` and `API_KEY` variables are honoured when the prefixed ones are unset.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tracing::Level;

use crate::narrator::chat::{DEFAULT_API_URL, DEFAULT_MODEL};
use crate::report::Language;
use crate::sources::{binance, coingecko};

const ENV_PREFIX: &str = "CYCLE_INSIGHT";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub port: u16,
    pub log_level: String,
    pub binance_base_url: String,
    pub coingecko_base_url: String,
    #[serde(default)]
    pub coingecko_api_key: Option<String>,
    /// Daily candles requested per fetch
    pub candle_limit: usize,
    pub refresh_interval_secs: u64,
    pub default_lang: Language,
    pub narrator: NarratorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NarratorConfig {
    /// Chat-completion credential; the gateway answers "not configured" without it
    #[serde(default)]
    pub api_key: Option<String>,
    pub api_url: String,
    pub model: String,
    pub max_tokens: u32,
    /// Remote gateway used instead of the in-process one
    #[serde(default)]
    pub gateway_url: Option<String>,
    pub timeout_secs: u64,
}

impl AppConfig {
    /// Load `.env` (if present) and the process environment
    pub fn load() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_vars(std::env::vars().collect())
    }

    /// Build from an explicit variable map
    pub fn from_vars(vars: HashMap<String, String>) -> anyhow::Result<Self> {
        let settings = ::config::Config::builder()
            .set_default("port", 8080_i64)?
            .set_default("log_level", "info")?
            .set_default("binance_base_url", binance::DEFAULT_BASE_URL)?
            .set_default("coingecko_base_url", coingecko::DEFAULT_BASE_URL)?
            .set_default("candle_limit", 1000_i64)?
            .set_default("refresh_interval_secs", 10_i64)?
            .set_default("default_lang", "zh")?
            .set_default("narrator.api_url", DEFAULT_API_URL)?
            .set_default("narrator.model", DEFAULT_MODEL)?
            .set_default("narrator.max_tokens", 200_i64)?
            .set_default("narrator.timeout_secs", 15_i64)?
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(vars.clone())),
            )
            .build()
            .context("failed to read configuration")?;

        let mut config: AppConfig = settings
            .try_deserialize()
            .context("invalid configuration")?;

        if !vars.contains_key(&format!("{}_PORT", ENV_PREFIX)) {
            if let Some(port) = vars.get("PORT").and_then(|p| p.parse().ok()) {
                config.port = port;
            }
        }
        if config.narrator.api_key.is_none() {
            config.narrator.api_key = vars.get("API_KEY").cloned();
        }

        // Blank values mean unset
        config.narrator.api_key = non_blank(config.narrator.api_key.take());
        config.narrator.gateway_url = non_blank(config.narrator.gateway_url.take());
        config.coingecko_api_key = non_blank(config.coingecko_api_key.take());

        Ok(config)
    }

    pub fn tracing_level(&self) -> Level {
        Level::from_str(&self.log_level).unwrap_or(Level::INFO)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}

impl NarratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_vars(HashMap::new()).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.candle_limit, 1000);
        assert_eq!(config.refresh_interval(), Duration::from_secs(10));
        assert_eq!(config.default_lang, Language::Zh);
        assert_eq!(config.binance_base_url, "https://api.binance.com/api/v3");
        assert_eq!(config.narrator.model, "deepseek-chat");
        assert_eq!(config.narrator.max_tokens, 200);
        assert_eq!(config.narrator.timeout(), Duration::from_secs(15));
        assert!(config.narrator.api_key.is_none());
        assert!(config.narrator.gateway_url.is_none());
        assert_eq!(config.tracing_level(), Level::INFO);
    }

    #[test]
    fn test_prefixed_overrides() {
        let config = AppConfig::from_vars(vars(&[
            ("CYCLE_INSIGHT_PORT", "9000"),
            ("CYCLE_INSIGHT_DEFAULT_LANG", "en"),
            ("CYCLE_INSIGHT_LOG_LEVEL", "debug"),
            ("CYCLE_INSIGHT_NARRATOR__GATEWAY_URL", "http://gateway:8080/api/insight"),
            ("CYCLE_INSIGHT_NARRATOR__MAX_TOKENS", "400"),
            ("PORT", "7000"),
        ]))
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.default_lang, Language::En);
        assert_eq!(config.tracing_level(), Level::DEBUG);
        assert_eq!(config.narrator.max_tokens, 400);
        assert_eq!(
            config.narrator.gateway_url.as_deref(),
            Some("http://gateway:8080/api/insight")
        );
    }

    #[test]
    fn test_plain_port_and_api_key() {
        let config =
            AppConfig::from_vars(vars(&[("PORT", "3000"), ("API_KEY", "sk-plain")])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.narrator.api_key.as_deref(), Some("sk-plain"));
    }

    #[test]
    fn test_blank_api_key_is_unset() {
        let config = AppConfig::from_vars(vars(&[("API_KEY", "  ")])).unwrap();
        assert!(config.narrator.api_key.is_none());
    }
}
