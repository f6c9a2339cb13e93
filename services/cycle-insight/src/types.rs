use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Daily OHLCV candle as delivered by the market-data sources
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64, // open time, epoch millis
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>, // quote volume (USDT) when the source reports it
}

impl Candle {
    /// Volume with missing values treated as zero
    pub fn volume_or_zero(&self) -> f64 {
        self.volume.unwrap_or(0.0)
    }
}

/// Current 24h ticker snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketStats {
    pub current_price: f64,
    pub change_24h: f64,
    pub change_24h_percent: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    pub market_cap: f64,
    pub volume_24h: f64,
}

/// One EMA value, aligned with the candle at the same index
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmaPoint {
    pub time: i64,
    pub ema: f64,
}

/// Data source health/status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceHealth {
    pub source: String,
    pub is_healthy: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub success_rate: f64,
    pub avg_latency_ms: u64,
}

/// Error types for market data retrieval
#[derive(Debug, thiserror::Error)]
pub enum MarketDataError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Rate limit exceeded for {source_name}")]
    RateLimit {
        source_name: String,
        retry_after: Option<u64>,
    },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Result type for market data operations
pub type Result<T> = std::result::Result<T, MarketDataError>;

/// Trait for market data sources
#[async_trait::async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Get the current 24h ticker snapshot
    async fn fetch_stats(&self) -> Result<MarketStats>;

    /// Get up to `limit` daily candles, oldest first
    async fn fetch_daily_candles(&self, limit: usize) -> Result<Vec<Candle>>;

    /// Get source health status
    async fn health(&self) -> SourceHealth;

    /// Source name
    fn name(&self) -> &str;
}
