use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Json,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::AppState;
use cycle_insight::{
    analyze_cycle_stage,
    highlights::{chart_window, highlight_periods, period_at, CycleOverlay, HighlightPeriod},
    indicators::{compute_ema, EMA_PERIOD},
    narrator::{InsightRequest, InsightResponse},
    report::format_analysis_report,
    types::{Candle, EmaPoint, MarketStats, SourceHealth},
    CycleAnalysis, Insight, Language, PanelMetrics,
};

/// Query params carrying an optional `lang`
#[derive(Debug, serde::Deserialize)]
pub struct LangQuery {
    lang: Option<String>,
}

impl LangQuery {
    fn language(&self, state: &AppState) -> Language {
        Language::from_query(self.lang.as_deref(), state.config.default_lang)
    }
}

/// Query params for the candle endpoint
#[derive(Debug, serde::Deserialize)]
pub struct CandleQuery {
    since: Option<String>,
}

/// GET /api/stats - Latest 24h ticker snapshot
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<MarketStats> {
    Json(state.feed.latest_stats().await)
}

/// GET /api/candles - Daily candles with the EMA15 overlay
/// `?since=chart` limits the series to the chart window
pub async fn get_candles(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CandleQuery>,
) -> Json<CandlesResponse> {
    let mut candles = state.feed.fetch_candles().await;
    if query.since.as_deref() == Some("chart") {
        candles = chart_window(&candles);
    }
    let ema = compute_ema(&candles, EMA_PERIOD);

    Json(CandlesResponse { candles, ema })
}

/// GET /api/analysis - Cycle verdict, panel metrics and the rule-based report
pub async fn get_analysis(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LangQuery>,
) -> Json<AnalysisResponse> {
    let lang = query.language(&state);
    let snapshot = state.feed.snapshot().await;

    let analysis = analyze_cycle_stage(&snapshot.stats, &snapshot.candles);
    let panel = PanelMetrics::compute(&snapshot.candles, snapshot.stats.current_price);

    let periods = highlight_periods(lang);
    let current_cycle = snapshot
        .candles
        .last()
        .and_then(|c| period_at(&periods, c.time))
        .cloned();

    Json(AnalysisResponse {
        report: format_analysis_report(&analysis, lang),
        analysis,
        panel,
        current_cycle,
        stats: snapshot.stats,
        lang,
    })
}

/// GET /api/cycles - Highlighted 100-day cycles
pub async fn get_cycles(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LangQuery>,
) -> Json<Vec<CycleOverlay>> {
    let periods = highlight_periods(query.language(&state));
    Json(periods.into_iter().map(CycleOverlay::from).collect())
}

/// POST /api/insight - Narrator gateway
/// Always answers 200 with `{insight}`; failures map to fixed messages
pub async fn post_insight(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Json<InsightResponse> {
    let mut body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            warn!("Unreadable insight request: {}", rejection);
            Value::Null
        }
    };

    let lang = body
        .get("lang")
        .and_then(Value::as_str)
        .and_then(Language::parse)
        .unwrap_or(state.config.default_lang);
    if let Some(fields) = body.as_object_mut() {
        fields.insert("lang".to_string(), Value::from(lang.as_str()));
    }

    match serde_json::from_value::<InsightRequest>(body) {
        Ok(req) => Json(state.gateway.insight(&req).await),
        Err(e) => {
            warn!("Malformed insight request: {}", e);
            Json(state.gateway.reject(lang))
        }
    }
}

/// POST /api/generate - Fresh analysis narrated with report fallback
pub async fn post_generate(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LangQuery>,
) -> Json<Insight> {
    let lang = query.language(&state);
    let snapshot = state.feed.snapshot().await;
    let analysis = analyze_cycle_stage(&snapshot.stats, &snapshot.candles);

    info!(
        "Generating insight: stage {} ({}%)",
        analysis.stage.as_str(),
        analysis.probability
    );

    Json(state.narrator.narrate(&analysis, &snapshot.stats, lang).await)
}

/// GET /health - Service health check
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let source_health = state.feed.health_check().await;

    // The synthetic fallback is always healthy; judge the live sources
    let live = &source_health[..source_health.len().saturating_sub(1)];
    let all_healthy = live.iter().all(|h| h.is_healthy);

    Json(HealthResponse {
        status: if all_healthy {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        refresher_running: state.refresher_running(),
        narrator: state.narrator.primary_name().unwrap_or("report").to_string(),
        gateway_configured: state.gateway.is_configured(),
        sources: source_health,
    })
}

// Response types
#[derive(Debug, serde::Serialize)]
pub struct CandlesResponse {
    pub candles: Vec<Candle>,
    pub ema: Vec<EmaPoint>,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub analysis: CycleAnalysis,
    pub panel: Option<PanelMetrics>,
    pub report: String,
    /// Highlighted cycle containing the latest candle
    pub current_cycle: Option<HighlightPeriod>,
    pub stats: MarketStats,
    pub lang: Language,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub refresher_running: bool,
    pub narrator: String,
    pub gateway_configured: bool,
    pub sources: Vec<SourceHealth>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use cycle_insight::{
        narrator::{InsightGateway, RemoteNarrator},
        AppConfig, BinanceClient, CoinGeckoClient, FallbackNarrator, MarketFeed,
    };
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DAY_MS: i64 = 86_400_000;
    /// 2024-01-01T00:00:00Z
    const START_MS: i64 = 1_704_067_200_000;

    fn state(
        feed: MarketFeed,
        narrator: FallbackNarrator,
        gateway: InsightGateway,
        default_lang: &str,
    ) -> Arc<AppState> {
        let vars = HashMap::from([(
            "CYCLE_INSIGHT_DEFAULT_LANG".to_string(),
            default_lang.to_string(),
        )]);
        Arc::new(AppState {
            feed: Arc::new(feed),
            narrator,
            gateway,
            config: AppConfig::from_vars(vars).unwrap(),
            refresher: Mutex::new(None),
        })
    }

    /// Serve the router on an ephemeral port, returning its base URL
    async fn serve(state: Arc<AppState>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, crate::router(state)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// Binance answering the ticker and `days` rising daily klines from 2024-01-01
    async fn mount_binance(server: &MockServer, days: usize) {
        let rows: Vec<Value> = (0..days)
            .map(|i| {
                let open_time = START_MS + i as i64 * DAY_MS;
                let close = format!("{:.2}", 100.0 + i as f64);
                json!([open_time, close, close, close, close, "1.0", open_time + DAY_MS - 1, "1000000.0"])
            })
            .collect();

        Mock::given(method("GET"))
            .and(path("/ticker/24hr"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "lastPrice": "140.00",
                "priceChange": "1.00",
                "priceChangePercent": "0.72",
                "highPrice": "141.00",
                "lowPrice": "138.00",
                "quoteVolume": "1000000.00"
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/klines"))
            .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(rows)))
            .mount(server)
            .await;
    }

    fn live_feed(binance: &MockServer, coingecko: &MockServer) -> MarketFeed {
        let mut feed = MarketFeed::new(100);
        feed.add_source(Arc::new(BinanceClient::new(&binance.uri()).unwrap()));
        feed.add_source(Arc::new(
            CoinGeckoClient::new(&coingecko.uri(), None).unwrap(),
        ));
        feed
    }

    fn insight_body(lang: &str) -> Value {
        let stats = cycle_insight::sources::synthetic::FALLBACK_STATS;
        json!({
            "analysis": CycleAnalysis::insufficient_data(),
            "stats": stats,
            "lang": lang
        })
    }

    #[tokio::test]
    async fn test_health_ignores_unused_fallback_source() {
        let binance = MockServer::start().await;
        mount_binance(&binance, 40).await;
        let coingecko = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&coingecko)
            .await;

        let base = serve(state(
            live_feed(&binance, &coingecko),
            FallbackNarrator::report_only(),
            InsightGateway::new(None),
            "en",
        ))
        .await;

        let analysis: Value = reqwest::get(format!("{}/api/analysis?lang=en", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(analysis["stats"]["currentPrice"], 140.0);
        assert_eq!(analysis["lang"], "en");
        // Last candle is 2024-02-09
        assert_eq!(analysis["currentCycle"]["label"], "Cycle 2");

        let health: Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["narrator"], "report");
        assert_eq!(health["gatewayConfigured"], false);
        assert_eq!(health["refresherRunning"], false);
        assert_eq!(health["sources"].as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn test_health_degraded_when_live_sources_fail() {
        let binance = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&binance)
            .await;
        let coingecko = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&coingecko)
            .await;

        let base = serve(state(
            live_feed(&binance, &coingecko),
            FallbackNarrator::report_only(),
            InsightGateway::new(None),
            "zh",
        ))
        .await;

        let stats: Value = reqwest::get(format!("{}/api/stats", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats["currentPrice"], 96_431.45);

        let health: Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "degraded");
    }

    #[tokio::test]
    async fn test_insight_without_credential() {
        let base = serve(state(
            MarketFeed::new(10),
            FallbackNarrator::report_only(),
            InsightGateway::new(None),
            "en",
        ))
        .await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{}/api/insight", base))
            .json(&insight_body("zh"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: InsightResponse = response.json().await.unwrap();
        assert_eq!(body.insight, "API密钥未配置，请检查环境变量设置。");

        let body: InsightResponse = client
            .post(format!("{}/api/insight", base))
            .json(&json!({"stats": {}}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(
            body.insight,
            "The AI analyst is not configured. Showing the rule-based report instead."
        );
    }

    #[tokio::test]
    async fn test_malformed_insight_body_gets_generic_message() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&upstream)
            .await;

        let gateway = InsightGateway::from_credential(
            &upstream.uri(),
            Some("sk-test"),
            "deepseek-chat",
            200,
            Duration::from_secs(5),
        );
        let base = serve(state(
            MarketFeed::new(10),
            FallbackNarrator::report_only(),
            gateway,
            "en",
        ))
        .await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{}/api/insight", base))
            .json(&json!({"stats": {}}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: InsightResponse = response.json().await.unwrap();
        assert_eq!(body.insight, "AI analysis is temporarily unavailable.");

        // Requested language still applies
        let body: InsightResponse = client
            .post(format!("{}/api/insight", base))
            .json(&json!({"lang": "zh", "stats": {}}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body.insight, "AI 分析服务暂时不可用。");

        // Not JSON at all
        let response = client
            .post(format!("{}/api/insight", base))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: InsightResponse = response.json().await.unwrap();
        assert_eq!(body.insight, "AI analysis is temporarily unavailable.");
        assert!(!body.insight.contains("deserialize"));
    }

    #[tokio::test]
    async fn test_lang_query_falls_back_to_configured_default() {
        let base = serve(state(
            MarketFeed::new(10),
            FallbackNarrator::report_only(),
            InsightGateway::new(None),
            "en",
        ))
        .await;

        let label = |query: &'static str| {
            let url = format!("{}/api/cycles{}", base, query);
            async move {
                let cycles: Value = reqwest::get(url).await.unwrap().json().await.unwrap();
                cycles[0]["label"].as_str().unwrap_or_default().to_string()
            }
        };

        assert_eq!(label("").await, "Cycle 1");
        assert_eq!(label("?lang=fr").await, "Cycle 1");
        assert_eq!(label("?lang=zh").await, "周期 1");
        assert_eq!(label("?lang=zh-CN").await, "周期 1");

        let cycles: Value = reqwest::get(format!("{}/api/cycles", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(cycles.as_array().map(Vec::len), Some(4));
        assert_eq!(cycles[0]["startDate"], "2023-10-14");
        assert_eq!(cycles[0]["midDate"], "2023-12-03");
    }

    #[tokio::test]
    async fn test_generate_makes_one_narrator_attempt() {
        let gateway = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/insight"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&gateway)
            .await;

        let remote = RemoteNarrator::new(
            &format!("{}/api/insight", gateway.uri()),
            Duration::from_secs(5),
        )
        .unwrap();
        let narrator = FallbackNarrator::new(Arc::new(remote), Duration::from_secs(5));
        let base = serve(state(
            MarketFeed::new(60),
            narrator,
            InsightGateway::new(None),
            "zh",
        ))
        .await;

        let insight: Insight = reqwest::Client::new()
            .post(format!("{}/api/generate?lang=en", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(insight.source, cycle_insight::InsightSource::Report);
        assert!(insight.insight.contains("BTC 100-Day Cycle Analysis"));
        gateway.verify().await;
    }

    #[tokio::test]
    async fn test_candles_carry_aligned_ema() {
        let binance = MockServer::start().await;
        mount_binance(&binance, 20).await;
        let coingecko = MockServer::start().await;

        let base = serve(state(
            live_feed(&binance, &coingecko),
            FallbackNarrator::report_only(),
            InsightGateway::new(None),
            "en",
        ))
        .await;

        let body: Value = reqwest::get(format!("{}/api/candles?since=chart", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["candles"].as_array().map(Vec::len), Some(20));
        assert_eq!(body["ema"].as_array().map(Vec::len), Some(20));
        assert_eq!(body["ema"][0]["time"], START_MS);
    }
}
