use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::gateway::{InsightRequest, InsightResponse};
use super::{Narrator, NarratorError};
use crate::cycle::CycleAnalysis;
use crate::report::Language;
use crate::types::MarketStats;

/// Client for a remote insight gateway (`POST {analysis, stats, lang}` -> `{insight}`)
pub struct RemoteNarrator {
    client: Client,
    endpoint: Url,
}

impl RemoteNarrator {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, NarratorError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| NarratorError::Http(format!("invalid gateway url {}: {}", endpoint, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NarratorError::Http(e.to_string()))?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl Narrator for RemoteNarrator {
    async fn narrate(
        &self,
        analysis: &CycleAnalysis,
        stats: &MarketStats,
        lang: Language,
    ) -> Result<String, NarratorError> {
        let body = InsightRequest {
            analysis: *analysis,
            stats: *stats,
            lang,
        };

        debug!("Posting insight request to {}", self.endpoint);

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| NarratorError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NarratorError::Status(status.as_u16()));
        }

        let reply: InsightResponse = response
            .json()
            .await
            .map_err(|e| NarratorError::MalformedBody(e.to_string()))?;

        if reply.insight.trim().is_empty() {
            return Err(NarratorError::Empty);
        }
        Ok(reply.insight)
    }

    fn name(&self) -> &str {
        "remote_gateway"
    }
}
