use axum::{
    routing::{get, post},
    Router,
};
use std::sync::{Arc, Mutex};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use cycle_insight::{
    narrator::{ChatCompletionNarrator, InsightGateway, Narrator, RemoteNarrator},
    AppConfig, FallbackNarrator, MarketFeed, NarratorConfig, StatsRefresher,
};

/// Application state shared across handlers
pub struct AppState {
    pub feed: Arc<MarketFeed>,
    pub narrator: FallbackNarrator,
    pub gateway: InsightGateway,
    pub config: AppConfig,
    pub refresher: Mutex<Option<StatsRefresher>>,
}

impl AppState {
    pub fn refresher_running(&self) -> bool {
        self.refresher
            .lock()
            .map(|r| r.as_ref().is_some_and(StatsRefresher::is_running))
            .unwrap_or(false)
    }
}

/// Narrator used by `/api/generate`: a remote gateway if one is configured,
/// else the chat-completion API directly, else the report alone
fn build_narrator(config: &NarratorConfig) -> FallbackNarrator {
    let primary: Option<Arc<dyn Narrator>> = if let Some(url) = &config.gateway_url {
        match RemoteNarrator::new(url, config.timeout()) {
            Ok(remote) => Some(Arc::new(remote)),
            Err(e) => {
                warn!("⚠ Remote gateway disabled: {}", e);
                None
            }
        }
    } else if let Some(key) = &config.api_key {
        match ChatCompletionNarrator::new(
            &config.api_url,
            key,
            &config.model,
            config.max_tokens,
            config.timeout(),
        ) {
            Ok(chat) => Some(Arc::new(chat)),
            Err(e) => {
                warn!("⚠ Chat completion narrator disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    match primary {
        Some(primary) => FallbackNarrator::new(primary, config.timeout()),
        None => FallbackNarrator::report_only(),
    }
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/stats", get(handlers::get_stats))
        .route("/api/candles", get(handlers::get_candles))
        .route("/api/analysis", get(handlers::get_analysis))
        .route("/api/cycles", get(handlers::get_cycles))
        .route("/api/insight", post(handlers::post_insight))
        .route("/api/generate", post(handlers::post_generate))
        .route("/health", get(handlers::health_check))
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(config.tracing_level())
        .init();

    info!("Starting Cycle Insight Service...");

    let feed = Arc::new(MarketFeed::from_config(&config)?);
    info!("✓ Market feed initialized (Binance → CoinGecko → synthetic)");

    let narrator = build_narrator(&config.narrator);
    info!(
        "✓ Narrator: {}",
        narrator.primary_name().unwrap_or("report only")
    );

    let gateway = InsightGateway::from_credential(
        &config.narrator.api_url,
        config.narrator.api_key.as_deref(),
        &config.narrator.model,
        config.narrator.max_tokens,
        config.narrator.timeout(),
    );
    if !gateway.is_configured() {
        warn!("⚠ API key not set, /api/insight answers with the not-configured message");
    }

    let refresher = StatsRefresher::start(Arc::clone(&feed), config.refresh_interval());
    info!("✓ Stats refresher started");

    let port = config.port;
    let state = Arc::new(AppState {
        feed,
        narrator,
        gateway,
        config,
        refresher: Mutex::new(Some(refresher)),
    });

    let app = router(Arc::clone(&state));

    // Start server
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("🚀 Cycle Insight Service listening on port {}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let refresher = state.refresher.lock().ok().and_then(|mut r| r.take());
    if let Some(refresher) = refresher {
        refresher.stop().await;
    }

    Ok(())
}

mod handlers;
