use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{Narrator, NarratorError};
use crate::cycle::CycleAnalysis;
use crate::report::{stage_name, Language};
use crate::types::MarketStats;

pub const DEFAULT_API_URL: &str = "https://api.deepseek.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "deepseek-chat";

/// Hosted chat-completion client, the upstream of the insight gateway
pub struct ChatCompletionNarrator {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatReply>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl ChatCompletionNarrator {
    pub fn new(
        api_url: &str,
        api_key: &str,
        model: &str,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, NarratorError> {
        if api_key.trim().is_empty() {
            return Err(NarratorError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NarratorError::Http(e.to_string()))?;

        Ok(Self {
            client,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            max_tokens,
        })
    }
}

/// Analyst prompt for the 100-day bull run theory
pub fn build_prompt(analysis: &CycleAnalysis, stats: &MarketStats, lang: Language) -> String {
    let criteria = &analysis.criteria;
    let metrics = &analysis.metrics;
    let reply_in = match lang {
        Language::En => "English",
        Language::Zh => "Chinese (Simplified)",
    };

    format!(
        r#"Act as an expert crypto analyst specializing in the "BTC 100-Day Bull Run Theory".

The Theory:
- A rapid, unilateral rise typically lasts ~100 days.
- Phases: Observation (0-30d), Confirmation (30-70d), Warning (70-100d).
- Outside a run the market is in a "Rest" phase.

Current Data:
- Price: ${price:.2}
- 24h Change: {change_24h:.2}%
- 7d Change: {gain_7d:.2}%
- 30d Change: {gain_30d:.2}%

Rule-based Classification:
- Stage: {stage} (probability {probability}%)
- Consecutive days above EMA15: {days}
- Distance from EMA15: {ema_distance:.2}%
- 30d max drawdown: {drawdown:.2}%
- Volume ratio (5d/20d): {volume_ratio:.2}
- Criteria met: {score}/4 (breakout: {breakout}, single-sided rise: {single_sided}, volume expansion: {volume})

Task:
Analyze whether we are currently in a potential "100-day cycle".
If trending up strongly, estimate which phase we might be in.
If trending down or sideways, mention we are likely in a "Rest" phase.

IMPORTANT: Please reply in {reply_in}. Keep it concise (max 3 sentences). Professional tone."#,
        price = stats.current_price,
        change_24h = stats.change_24h_percent,
        gain_7d = metrics.gain_7d,
        gain_30d = metrics.gain_30d,
        stage = stage_name(analysis.stage, Language::En),
        probability = analysis.probability,
        days = criteria.consecutive_days,
        ema_distance = metrics.ema_distance,
        drawdown = metrics.max_drawdown,
        volume_ratio = metrics.volume_ratio,
        score = criteria.score(),
        breakout = criteria.ema_breakout,
        single_sided = criteria.single_sided_rise,
        volume = criteria.volume_expansion,
        reply_in = reply_in,
    )
}

#[async_trait::async_trait]
impl Narrator for ChatCompletionNarrator {
    async fn narrate(
        &self,
        analysis: &CycleAnalysis,
        stats: &MarketStats,
        lang: Language,
    ) -> Result<String, NarratorError> {
        let prompt = build_prompt(analysis, stats, lang);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            max_tokens: self.max_tokens,
        };

        debug!("Requesting chat completion from {}", self.api_url);

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| NarratorError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NarratorError::Status(status.as_u16()));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| NarratorError::MalformedBody(e.to_string()))?;

        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(NarratorError::Empty)
    }

    fn name(&self) -> &str {
        "chat_completion"
    }
}
