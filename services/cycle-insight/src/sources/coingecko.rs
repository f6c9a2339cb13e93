use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};

use super::{HealthTracker, REQUEST_TIMEOUT_SECS};
use crate::types::*;

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";
const COIN_ID: &str = "bitcoin";

/// CoinGecko API client, the fallback when Binance is unreachable
pub struct CoinGeckoClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    rate_limiter: tokio::sync::Semaphore,
    last_request: tokio::sync::Mutex<Instant>,
    /// Internal health tracking to avoid API calls in health()
    health_tracker: HealthTracker,
}

impl CoinGeckoClient {
    /// Free tier: ~10-30 calls/minute
    /// Pro tier: higher limits with API key
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| MarketDataError::ApiError(e.to_string()))?;

        // Free tier: allow 1 concurrent request to stay under rate limit
        let permits = if api_key.is_some() { 5 } else { 1 };

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            rate_limiter: tokio::sync::Semaphore::new(permits),
            last_request: tokio::sync::Mutex::new(
                Instant::now()
                    .checked_sub(Duration::from_secs(10))
                    .unwrap_or_else(Instant::now),
            ),
            health_tracker: HealthTracker::new(),
        })
    }

    /// Build request with optional API key
    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut req = self.client.get(&url);

        if let Some(key) = &self.api_key {
            req = req.header("x-cg-pro-api-key", key);
        }

        req
    }

    /// Rate-limited request wrapper with per-request timeout
    async fn rate_limited_request<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
    ) -> Result<T> {
        let request_start = Instant::now();

        let _permit = self.rate_limiter.acquire().await.map_err(|e| {
            self.health_tracker.record_failure();
            MarketDataError::ApiError(e.to_string())
        })?;

        // Ensure minimum delay between requests (free tier friendly)
        {
            let mut last = self.last_request.lock().await;
            let elapsed = last.elapsed();
            if elapsed < Duration::from_millis(100) {
                tokio::time::sleep(Duration::from_millis(100) - elapsed).await;
            }
            *last = Instant::now();
        }

        let response = match tokio::time::timeout(
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
            self.build_request(endpoint).send(),
        )
        .await
        {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                self.health_tracker.record_failure();
                return Err(MarketDataError::ApiError(e.to_string()));
            }
            Err(_) => {
                self.health_tracker.record_failure();
                return Err(MarketDataError::ApiError(format!(
                    "CoinGecko request to {} timed out after {}s",
                    endpoint, REQUEST_TIMEOUT_SECS
                )));
            }
        };

        let status = response.status();

        // No retry here: the feed falls through to the next source instead
        if status == 429 {
            self.health_tracker.record_failure();
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(MarketDataError::RateLimit {
                source_name: "coingecko".to_string(),
                retry_after,
            });
        }

        if !status.is_success() {
            self.health_tracker.record_failure();
            let text = response.text().await.unwrap_or_default();
            return Err(MarketDataError::ApiError(format!(
                "CoinGecko API error ({}): {}",
                status, text
            )));
        }

        let latency_ms = request_start.elapsed().as_millis() as u64;
        let parsed = response.json::<T>().await.map_err(|e| {
            self.health_tracker.record_failure();
            MarketDataError::InvalidResponse(e.to_string())
        })?;
        self.health_tracker.record_success(latency_ms);
        Ok(parsed)
    }

    /// Current BTC stats from `/simple/price`
    ///
    /// The endpoint has no 24h high/low; they are approximated as +/-2% of the price.
    pub async fn get_stats(&self) -> Result<MarketStats> {
        let endpoint = format!(
            "/simple/price?ids={}&vs_currencies=usd&include_24hr_vol=true&include_24hr_change=true&include_market_cap=true",
            COIN_ID
        );
        let response: std::collections::HashMap<String, SimplePrice> =
            self.rate_limited_request(&endpoint).await?;

        let btc = response.get(COIN_ID).ok_or_else(|| {
            MarketDataError::InvalidResponse(format!("Missing data for coin: {}", COIN_ID))
        })?;

        let change_percent = btc.usd_24h_change.unwrap_or(0.0);
        Ok(MarketStats {
            current_price: btc.usd,
            change_24h: btc.usd * (change_percent / 100.0),
            change_24h_percent: change_percent,
            high_24h: btc.usd * 1.02,
            low_24h: btc.usd * 0.98,
            market_cap: btc.usd_market_cap.unwrap_or(0.0),
            volume_24h: btc.usd_24h_vol.unwrap_or(0.0),
        })
    }

    /// Daily candles from `/market_chart` with `interval=daily`
    ///
    /// The endpoint returns one price per day, so each candle opens at the
    /// previous close and spans open..close.
    pub async fn get_daily_candles(&self, limit: usize) -> Result<Vec<Candle>> {
        let endpoint = format!(
            "/coins/{}/market_chart?vs_currency=usd&days={}&interval=daily",
            COIN_ID,
            limit.max(1)
        );
        let chart: MarketChart = self.rate_limited_request(&endpoint).await?;

        if chart.prices.is_empty() {
            self.health_tracker.record_failure();
            return Err(MarketDataError::InvalidResponse(
                "CoinGecko market chart has no prices".to_string(),
            ));
        }

        let mut candles = Vec::with_capacity(chart.prices.len());
        let mut prev_close: Option<f64> = None;
        for (idx, [time, close]) in chart.prices.iter().copied().enumerate() {
            let open = prev_close.unwrap_or(close);
            candles.push(Candle {
                time: time as i64,
                open,
                high: open.max(close),
                low: open.min(close),
                close,
                volume: chart.total_volumes.get(idx).map(|v| v[1]),
            });
            prev_close = Some(close);
        }

        let skip = candles.len().saturating_sub(limit);
        Ok(candles.split_off(skip))
    }

    /// Get health status using internal metrics (no API call)
    pub async fn health(&self) -> SourceHealth {
        self.health_tracker.snapshot("coingecko")
    }
}

// Response types for CoinGecko API
#[derive(Debug, Deserialize)]
struct SimplePrice {
    usd: f64,
    usd_market_cap: Option<f64>,
    usd_24h_vol: Option<f64>,
    usd_24h_change: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MarketChart {
    prices: Vec<[f64; 2]>,
    #[serde(default)]
    total_volumes: Vec<[f64; 2]>,
}

#[async_trait::async_trait]
impl MarketDataSource for CoinGeckoClient {
    async fn fetch_stats(&self) -> Result<MarketStats> {
        CoinGeckoClient::get_stats(self).await
    }

    async fn fetch_daily_candles(&self, limit: usize) -> Result<Vec<Candle>> {
        CoinGeckoClient::get_daily_candles(self, limit).await
    }

    async fn health(&self) -> SourceHealth {
        CoinGeckoClient::health(self).await
    }

    fn name(&self) -> &str {
        "coingecko"
    }
}
