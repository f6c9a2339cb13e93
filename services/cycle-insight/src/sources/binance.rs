use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

use super::{json_f64, HealthTracker, REQUEST_TIMEOUT_SECS};
use crate::types::*;

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com/api/v3";
const SYMBOL: &str = "BTCUSDT";

/// Binance spot REST client (24h ticker and daily klines)
pub struct BinanceClient {
    client: Client,
    base_url: String,
    health_tracker: HealthTracker,
}

/// `/ticker/24hr` payload; Binance sends decimals as strings
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    last_price: String,
    price_change: String,
    price_change_percent: String,
    high_price: String,
    low_price: String,
    quote_volume: String,
}

impl BinanceClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| MarketDataError::ApiError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            health_tracker: HealthTracker::new(),
        })
    }

    /// GET `{base_url}{endpoint}` with a per-request timeout and JSON decoding
    async fn request<T: serde::de::DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let request_start = Instant::now();
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("Binance request {}", url);

        let response = match tokio::time::timeout(
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
            self.client.get(&url).send(),
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
                    "Binance request to {} timed out after {}s",
                    endpoint, REQUEST_TIMEOUT_SECS
                )));
            }
        };

        let status = response.status();

        if status == 429 || status == 418 {
            self.health_tracker.record_failure();
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(MarketDataError::RateLimit {
                source_name: "binance".to_string(),
                retry_after,
            });
        }

        if !status.is_success() {
            self.health_tracker.record_failure();
            let text = response.text().await.unwrap_or_default();
            return Err(MarketDataError::ApiError(format!(
                "Binance API error ({}): {}",
                status, text
            )));
        }

        let parsed = response.json::<T>().await.map_err(|e| {
            self.health_tracker.record_failure();
            MarketDataError::InvalidResponse(e.to_string())
        })?;

        let latency_ms = request_start.elapsed().as_millis() as u64;
        self.health_tracker.record_success(latency_ms);
        Ok(parsed)
    }

    /// A body that decodes but fails validation still counts as a failed request
    fn validated<T>(&self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.health_tracker.record_failure();
        }
        result
    }

    /// Current 24h ticker for BTCUSDT
    pub async fn get_stats(&self) -> Result<MarketStats> {
        let endpoint = format!("/ticker/24hr?symbol={}", SYMBOL);
        let ticker: Ticker24h = self.request(&endpoint).await?;
        self.validated(stats_from_ticker(&ticker))
    }

    /// Daily klines for BTCUSDT, oldest first
    ///
    /// Row format: `[openTime, open, high, low, close, volume, closeTime, quoteVolume, ...]`.
    /// Candle volume is the quote (USDT) volume.
    pub async fn get_daily_candles(&self, limit: usize) -> Result<Vec<Candle>> {
        let endpoint = format!("/klines?symbol={}&interval=1d&limit={}", SYMBOL, limit.clamp(1, 1000));
        let payload: Value = self.request(&endpoint).await?;

        self.validated(parse_klines(&payload))
    }

    pub async fn health(&self) -> SourceHealth {
        self.health_tracker.snapshot("binance")
    }
}

fn stats_from_ticker(ticker: &Ticker24h) -> Result<MarketStats> {
    let parse = |field: &str, value: &str| {
        value.parse::<f64>().map_err(|_| {
            MarketDataError::InvalidResponse(format!("Binance {} is not numeric: {}", field, value))
        })
    };
    let quote_volume = parse("quoteVolume", &ticker.quote_volume)?;

    Ok(MarketStats {
        current_price: parse("lastPrice", &ticker.last_price)?,
        change_24h: parse("priceChange", &ticker.price_change)?,
        change_24h_percent: parse("priceChangePercent", &ticker.price_change_percent)?,
        high_24h: parse("highPrice", &ticker.high_price)?,
        low_24h: parse("lowPrice", &ticker.low_price)?,
        // The ticker has no market cap; quote volume x 1000 stands in for it
        market_cap: quote_volume * 1000.0,
        volume_24h: quote_volume,
    })
}

fn parse_klines(payload: &Value) -> Result<Vec<Candle>> {
    payload
        .as_array()
        .ok_or_else(|| {
            MarketDataError::InvalidResponse("Binance klines payload is not an array".to_string())
        })?
        .iter()
        .map(parse_kline)
        .collect()
}

fn parse_kline(row: &Value) -> Result<Candle> {
    let fields = row
        .as_array()
        .filter(|f| f.len() >= 8)
        .ok_or_else(|| MarketDataError::InvalidResponse(format!("Malformed kline row: {}", row)))?;

    let num = |idx: usize| {
        json_f64(&fields[idx]).ok_or_else(|| {
            MarketDataError::InvalidResponse(format!("Kline field {} is not numeric", idx))
        })
    };

    Ok(Candle {
        time: num(0)? as i64,
        open: num(1)?,
        high: num(2)?,
        low: num(3)?,
        close: num(4)?,
        volume: json_f64(&fields[7]),
    })
}

#[async_trait::async_trait]
impl MarketDataSource for BinanceClient {
    async fn fetch_stats(&self) -> Result<MarketStats> {
        BinanceClient::get_stats(self).await
    }

    async fn fetch_daily_candles(&self, limit: usize) -> Result<Vec<Candle>> {
        BinanceClient::get_daily_candles(self, limit).await
    }

    async fn health(&self) -> SourceHealth {
        BinanceClient::health(self).await
    }

    fn name(&self) -> &str {
        "binance"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kline_uses_quote_volume() {
        let row = serde_json::json!([
            1700000000000i64,
            "35000.10",
            "36000.00",
            "34500.00",
            "35800.50",
            "1234.5",
            1700086399999i64,
            "44000000.25",
            1000,
            "600.1",
            "21000000.0",
            "0"
        ]);
        let candle = parse_kline(&row).unwrap();
        assert_eq!(candle.time, 1700000000000);
        assert_eq!(candle.open, 35000.10);
        assert_eq!(candle.close, 35800.50);
        assert_eq!(candle.volume, Some(44000000.25));
    }

    #[test]
    fn test_parse_kline_rejects_short_rows() {
        let row = serde_json::json!([1700000000000i64, "1", "2"]);
        assert!(matches!(
            parse_kline(&row),
            Err(MarketDataError::InvalidResponse(_))
        ));
    }
}
