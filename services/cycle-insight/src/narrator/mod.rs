//! Narrators turn a `CycleAnalysis` into user-facing text.
//!
//! `ReportNarrator` is the deterministic formatter and always succeeds.
//! `ChatCompletionNarrator` and `RemoteNarrator` are best-effort.
//! `FallbackNarrator` runs a best-effort narrator under a timeout and falls
//! back to the report on any failure.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cycle::CycleAnalysis;
use crate::report::{format_analysis_report, Language};
use crate::types::MarketStats;

pub mod chat;
pub mod gateway;
pub mod remote;

pub use chat::ChatCompletionNarrator;
pub use gateway::{InsightGateway, InsightRequest, InsightResponse};
pub use remote::RemoteNarrator;

/// Narrator failure. Never shown to end users.
#[derive(Debug, thiserror::Error)]
pub enum NarratorError {
    #[error("narrator credential not configured")]
    NotConfigured,

    #[error("narrator request failed: {0}")]
    Http(String),

    #[error("narrator returned status {0}")]
    Status(u16),

    #[error("narrator timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed narrator response: {0}")]
    MalformedBody(String),

    #[error("narrator returned no content")]
    Empty,
}

/// Strategy that produces narrative text for an analysis
#[async_trait::async_trait]
pub trait Narrator: Send + Sync {
    async fn narrate(
        &self,
        analysis: &CycleAnalysis,
        stats: &MarketStats,
        lang: Language,
    ) -> Result<String, NarratorError>;

    fn name(&self) -> &str;
}

/// Deterministic narrator backed by the report formatter
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportNarrator;

impl ReportNarrator {
    pub fn render(&self, analysis: &CycleAnalysis, lang: Language) -> String {
        format_analysis_report(analysis, lang)
    }
}

#[async_trait::async_trait]
impl Narrator for ReportNarrator {
    async fn narrate(
        &self,
        analysis: &CycleAnalysis,
        _stats: &MarketStats,
        lang: Language,
    ) -> Result<String, NarratorError> {
        Ok(self.render(analysis, lang))
    }

    fn name(&self) -> &str {
        "report"
    }
}

/// Which strategy produced an insight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightSource {
    Narrator,
    Report,
}

/// Text surfaced to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub insight: String,
    pub source: InsightSource,
}

/// Best-effort narrator with the deterministic report as fallback
#[derive(Clone)]
pub struct FallbackNarrator {
    primary: Option<Arc<dyn Narrator>>,
    fallback: ReportNarrator,
    timeout: Duration,
}

impl FallbackNarrator {
    pub fn new(primary: Arc<dyn Narrator>, timeout: Duration) -> Self {
        Self {
            primary: Some(primary),
            fallback: ReportNarrator,
            timeout,
        }
    }

    /// Report-only narrator, used when no remote narrator is configured
    pub fn report_only() -> Self {
        Self {
            primary: None,
            fallback: ReportNarrator,
            timeout: Duration::ZERO,
        }
    }

    pub fn primary_name(&self) -> Option<&str> {
        self.primary.as_ref().map(|p| p.name())
    }

    /// Narrate `analysis`, falling back to the report on error, timeout or empty text.
    ///
    /// `analysis` and `stats` are the snapshot captured at call time.
    pub async fn narrate(
        &self,
        analysis: &CycleAnalysis,
        stats: &MarketStats,
        lang: Language,
    ) -> Insight {
        if let Some(primary) = &self.primary {
            let attempt = tokio::time::timeout(self.timeout, primary.narrate(analysis, stats, lang))
                .await
                .unwrap_or_else(|_| Err(NarratorError::Timeout(self.timeout)));

            match attempt {
                Ok(text) if !text.trim().is_empty() => {
                    info!("Insight generated by {}", primary.name());
                    return Insight {
                        insight: text,
                        source: InsightSource::Narrator,
                    };
                }
                Ok(_) => warn!("{} returned empty text, using report", primary.name()),
                Err(e) => warn!("{} failed ({}), using report", primary.name(), e),
            }
        }

        Insight {
            insight: self.fallback.render(analysis, lang),
            source: InsightSource::Report,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn stats() -> MarketStats {
        MarketStats {
            current_price: 96431.45,
            change_24h: 1245.2,
            change_24h_percent: 1.98,
            high_24h: 98100.0,
            low_24h: 95800.0,
            market_cap: 1.8e12,
            volume_24h: 4.5e10,
        }
    }

    /// Narrator returning a canned result
    pub struct StubNarrator(pub std::result::Result<&'static str, fn() -> NarratorError>);

    #[async_trait::async_trait]
    impl Narrator for StubNarrator {
        async fn narrate(
            &self,
            _analysis: &CycleAnalysis,
            _stats: &MarketStats,
            _lang: Language,
        ) -> Result<String, NarratorError> {
            match &self.0 {
                Ok(text) => Ok(text.to_string()),
                Err(make) => Err(make()),
            }
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    /// Narrator that never answers in time
    pub struct SlowNarrator;

    #[async_trait::async_trait]
    impl Narrator for SlowNarrator {
        async fn narrate(
            &self,
            _analysis: &CycleAnalysis,
            _stats: &MarketStats,
            _lang: Language,
        ) -> Result<String, NarratorError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("too late".to_string())
        }

        fn name(&self) -> &str {
            "slow"
        }
    }
}
