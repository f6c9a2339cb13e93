use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{ChatCompletionNarrator, Narrator, NarratorError};
use crate::cycle::CycleAnalysis;
use crate::report::{text, Language};
use crate::types::MarketStats;

/// Gateway request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightRequest {
    pub analysis: CycleAnalysis,
    pub stats: MarketStats,
    #[serde(default)]
    pub lang: Language,
}

/// Gateway response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightResponse {
    pub insight: String,
}

/// Server side of the insight gateway.
///
/// Holds the server credential through its upstream narrator. Every outcome
/// is an `InsightResponse`: a missing credential or an upstream failure map
/// to fixed localized messages, never to raw error text.
pub struct InsightGateway {
    upstream: Option<Box<dyn Narrator>>,
}

impl InsightGateway {
    pub fn new(upstream: Option<Box<dyn Narrator>>) -> Self {
        Self { upstream }
    }

    /// Build from an optional credential; no key means "not configured" mode
    pub fn from_credential(
        api_url: &str,
        api_key: Option<&str>,
        model: &str,
        max_tokens: u32,
        timeout: std::time::Duration,
    ) -> Self {
        let upstream = api_key.and_then(|key| {
            match ChatCompletionNarrator::new(api_url, key, model, max_tokens, timeout) {
                Ok(narrator) => Some(Box::new(narrator) as Box<dyn Narrator>),
                Err(e) => {
                    warn!("Insight gateway upstream unavailable: {}", e);
                    None
                }
            }
        });
        Self::new(upstream)
    }

    pub fn is_configured(&self) -> bool {
        self.upstream.is_some()
    }

    pub async fn insight(&self, req: &InsightRequest) -> InsightResponse {
        let Some(upstream) = &self.upstream else {
            warn!("Insight requested but no API key is configured");
            return InsightResponse {
                insight: text(req.lang, "not_configured").to_string(),
            };
        };

        let insight = match upstream.narrate(&req.analysis, &req.stats, req.lang).await {
            Ok(insight) => {
                info!("Insight generated ({} chars)", insight.chars().count());
                insight
            }
            Err(NarratorError::Empty) => text(req.lang, "no_content").to_string(),
            Err(e) => {
                warn!("Insight upstream failed: {}", e);
                text(req.lang, "unavailable").to_string()
            }
        };

        InsightResponse { insight }
    }

    /// Answer for a request body that could not be read
    pub fn reject(&self, lang: Language) -> InsightResponse {
        let key = if self.is_configured() {
            "unavailable"
        } else {
            "not_configured"
        };
        InsightResponse {
            insight: text(lang, key).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrator::test_support::{stats, StubNarrator};

    fn request(lang: Language) -> InsightRequest {
        InsightRequest {
            analysis: CycleAnalysis::insufficient_data(),
            stats: stats(),
            lang,
        }
    }

    #[tokio::test]
    async fn test_not_configured_message() {
        let gateway = InsightGateway::from_credential(
            "http://localhost:1",
            None,
            "deepseek-chat",
            200,
            std::time::Duration::from_secs(1),
        );
        assert!(!gateway.is_configured());

        let response = gateway.insight(&request(Language::Zh)).await;
        assert_eq!(response.insight, "API密钥未配置，请检查环境变量设置。");
    }

    #[tokio::test]
    async fn test_upstream_failure_is_generic() {
        let gateway = InsightGateway::new(Some(Box::new(StubNarrator(Err(|| {
            NarratorError::Http("connection refused at 10.0.0.1".to_string())
        })))));

        let response = gateway.insight(&request(Language::En)).await;
        assert_eq!(response.insight, "AI analysis is temporarily unavailable.");
        assert!(!response.insight.contains("10.0.0.1"));
    }

    #[tokio::test]
    async fn test_empty_upstream_reply() {
        let gateway = InsightGateway::new(Some(Box::new(StubNarrator(Err(|| NarratorError::Empty)))));
        let response = gateway.insight(&request(Language::Zh)).await;
        assert_eq!(response.insight, "暂时无法生成分析。");
    }

    #[tokio::test]
    async fn test_upstream_success() {
        let gateway = InsightGateway::new(Some(Box::new(StubNarrator(Ok("Rest phase.")))));
        let response = gateway.insight(&request(Language::En)).await;
        assert_eq!(response.insight, "Rest phase.");
    }

    #[test]
    fn test_reject_checks_credential_first() {
        let unconfigured = InsightGateway::new(None);
        assert_eq!(
            unconfigured.reject(Language::Zh).insight,
            "API密钥未配置，请检查环境变量设置。"
        );

        let configured = InsightGateway::new(Some(Box::new(StubNarrator(Ok("unused")))));
        assert_eq!(
            configured.reject(Language::En).insight,
            "AI analysis is temporarily unavailable."
        );
    }

    #[test]
    fn test_request_wire_format() {
        let json = serde_json::to_value(request(Language::En)).unwrap();
        assert_eq!(json["lang"], "en");
        assert_eq!(json["analysis"]["stage"], "rest");
        assert_eq!(json["stats"]["currentPrice"], 96431.45);

        // lang defaults when omitted
        let mut without_lang = json.clone();
        without_lang.as_object_mut().unwrap().remove("lang");
        let parsed: InsightRequest = serde_json::from_value(without_lang).unwrap();
        assert_eq!(parsed.lang, Language::Zh);
    }
}
