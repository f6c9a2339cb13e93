pub mod config;
pub mod cycle;
pub mod highlights;
pub mod indicators;
pub mod narrator;
pub mod panel;
pub mod refresh;
pub mod report;
pub mod sources;
pub mod types;

pub use crate::config::{AppConfig, NarratorConfig};
pub use cycle::{analyze_cycle_stage, CycleAnalysis, CycleCriteria, CycleMetrics, CycleStage};
pub use narrator::{FallbackNarrator, Insight, InsightSource, Narrator, NarratorError};
pub use panel::PanelMetrics;
pub use refresh::StatsRefresher;
pub use report::{format_analysis_report, Language};
pub use sources::binance::BinanceClient;
pub use sources::coingecko::CoinGeckoClient;
pub use sources::synthetic::SyntheticSource;
pub use types::*;

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Stats and candles captured together for one analysis run
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub stats: MarketStats,
    pub candles: Vec<Candle>,
}

/// Ordered fallback chain of market-data sources.
///
/// Sources are tried in insertion order and the first success wins. The
/// synthetic source is always the last link, so the feed itself never fails.
pub struct MarketFeed {
    sources: Vec<Arc<dyn MarketDataSource>>,
    fallback: SyntheticSource,
    candle_limit: usize,
    latest_stats: Arc<RwLock<Option<MarketStats>>>,
}

impl MarketFeed {
    pub fn new(candle_limit: usize) -> Self {
        Self {
            sources: Vec::new(),
            fallback: SyntheticSource::new(),
            candle_limit,
            latest_stats: Arc::new(RwLock::new(None)),
        }
    }

    /// Build the default chain: Binance, then CoinGecko, then synthetic data
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let mut feed = Self::new(config.candle_limit);
        feed.add_source(Arc::new(BinanceClient::new(&config.binance_base_url)?));
        feed.add_source(Arc::new(CoinGeckoClient::new(
            &config.coingecko_base_url,
            config.coingecko_api_key.clone(),
        )?));
        Ok(feed)
    }

    pub fn add_source(&mut self, source: Arc<dyn MarketDataSource>) {
        self.sources.push(source);
    }

    /// Current ticker from the first source that answers
    pub async fn fetch_stats(&self) -> MarketStats {
        for source in &self.sources {
            match source.fetch_stats().await {
                Ok(stats) => {
                    debug!("Stats from {}: {}", source.name(), stats.current_price);
                    return stats;
                }
                Err(e) => warn!("Stats source {} failed: {}", source.name(), e),
            }
        }

        warn!("All stats sources failed, serving fallback snapshot");
        sources::synthetic::FALLBACK_STATS
    }

    /// Daily candles from the first source that returns a non-empty series
    pub async fn fetch_candles(&self) -> Vec<Candle> {
        for source in &self.sources {
            match source.fetch_daily_candles(self.candle_limit).await {
                Ok(candles) if !candles.is_empty() => {
                    debug!("{} candles from {}", candles.len(), source.name());
                    return candles;
                }
                Ok(_) => warn!("Candle source {} returned no data", source.name()),
                Err(e) => warn!("Candle source {} failed: {}", source.name(), e),
            }
        }

        warn!("All candle sources failed, generating synthetic series");
        // SyntheticSource never errors
        self.fallback
            .fetch_daily_candles(self.candle_limit)
            .await
            .unwrap_or_default()
    }

    /// Fetch fresh stats and store them as the latest snapshot
    pub async fn refresh_stats(&self) -> MarketStats {
        let stats = self.fetch_stats().await;
        *self.latest_stats.write().await = Some(stats);
        stats
    }

    /// Latest stored stats, fetching once if nothing has been stored yet
    pub async fn latest_stats(&self) -> MarketStats {
        if let Some(stats) = *self.latest_stats.read().await {
            return stats;
        }
        self.refresh_stats().await
    }

    /// Latest stats and fresh candles, fetched concurrently
    pub async fn snapshot(&self) -> MarketSnapshot {
        let (stats, candles) = futures::join!(self.latest_stats(), self.fetch_candles());
        info!(
            "Market snapshot: price {:.2}, {} candles",
            stats.current_price,
            candles.len()
        );
        MarketSnapshot { stats, candles }
    }

    /// Health of every source in the chain, synthetic fallback last
    pub async fn health_check(&self) -> Vec<SourceHealth> {
        let mut healths = Vec::new();

        for source in &self.sources {
            healths.push(source.health().await);
        }
        healths.push(self.fallback.health().await);

        healths
    }
}
