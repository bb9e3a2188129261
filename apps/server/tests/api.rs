use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::Value;
use tower::ServiceExt;
use tradebot_market_data::{
    AcquisitionConfig, AcquisitionCoordinator, MarketDataError, Quote, QuoteSource,
    RequestSpacing, SourceTier, SpacingMode,
};
use tradebot_server::{api::app_router, config::Config, load_acquisition_config, AppState};

struct MockSource {
    id: &'static str,
    tier: SourceTier,
    price: f64,
    healthy: AtomicBool,
    call_count: AtomicUsize,
}

impl MockSource {
    fn new(id: &'static str, tier: SourceTier, price: f64) -> Arc<Self> {
        Arc::new(Self {
            id,
            tier,
            price,
            healthy: AtomicBool::new(true),
            call_count: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl QuoteSource for MockSource {
    fn id(&self) -> &str {
        self.id
    }

    fn tier(&self) -> SourceTier {
        self.tier
    }

    fn spacing(&self) -> RequestSpacing {
        RequestSpacing {
            min_interval: Duration::ZERO,
            mode: SpacingMode::Wait,
        }
    }

    async fn fetch_quote(&self, symbol: &str, _timeout: Duration) -> Result<Quote, MarketDataError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.healthy.load(Ordering::SeqCst) {
            Ok(Quote::new(symbol, self.price, Utc::now(), self.id))
        } else {
            Err(MarketDataError::Transport {
                source_id: self.id.to_string(),
                message: "HTTP 500 Internal Server Error".to_string(),
            })
        }
    }
}

fn app(sources: &[Arc<MockSource>]) -> Router {
    let sources = sources
        .iter()
        .map(|s| s.clone() as Arc<dyn QuoteSource>)
        .collect();
    let coordinator = AcquisitionCoordinator::new(AcquisitionConfig::default(), sources);
    let config = Config::default();
    let state = Arc::new(AppState::new(
        Arc::new(coordinator),
        Duration::from_secs(2),
    ));
    app_router(state, &config)
}

async fn send(app: Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn healthz_works() {
    let app = app(&[]);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body, "ok".as_bytes());
}

#[tokio::test]
async fn quote_returns_live_price_with_origin() {
    let primary = MockSource::new("PRIMARY", SourceTier::Primary, 64_250.5);
    let app = app(&[primary.clone()]);

    let (status, json) = send(
        app,
        Method::GET,
        "/api/v1/quotes/btc-usd?priority=CRITICAL_EXIT&timeoutMs=1500",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["quote"]["symbol"], "BTCUSD");
    assert_eq!(json["quote"]["price"], 64_250.5);
    assert_eq!(json["quote"]["source"], "PRIMARY");
    assert_eq!(json["origin"]["kind"], "live");
    assert_eq!(json["origin"]["tier"], "PRIMARY");
    assert_eq!(primary.call_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_priority_is_bad_request() {
    let primary = MockSource::new("PRIMARY", SourceTier::Primary, 1.0);
    let app = app(&[primary.clone()]);

    let (status, json) = send(app, Method::GET, "/api/v1/quotes/ETHUSD?priority=URGENT").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], 400);
    assert_eq!(primary.call_count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn no_data_is_service_unavailable() {
    let primary = MockSource::new("PRIMARY", SourceTier::Primary, 1.0);
    primary.healthy.store(false, Ordering::SeqCst);
    let app = app(&[primary]);

    let (status, json) = send(app, Method::GET, "/api/v1/quotes/SOLUSD").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], 503);
    assert_eq!(json["message"], "No data available for SOLUSD");
}

#[tokio::test]
async fn emergency_exit_quote() {
    let primary = MockSource::new("PRIMARY", SourceTier::Primary, 3_010.0);
    let app = app(&[primary]);

    let (status, json) = send(app, Method::GET, "/api/v1/quotes/ETHUSD/emergency-exit").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["quote"]["price"], 3_010.0);
    assert_eq!(json["origin"]["kind"], "live");
}

#[tokio::test]
async fn status_lists_sources_and_budgets() {
    let primary = MockSource::new("PRIMARY", SourceTier::Primary, 1.0);
    let emergency = MockSource::new("LAST_RESORT", SourceTier::Emergency, 1.0);
    let app = app(&[primary, emergency]);

    let (status, json) = send(app, Method::GET, "/api/v1/status").await;

    assert_eq!(status, StatusCode::OK);
    let sources = json["sources"].as_array().unwrap();
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0]["id"], "PRIMARY");
    assert_eq!(sources[0]["state"], "CLOSED");
    assert_eq!(sources[1]["tier"], "EMERGENCY");
    assert_eq!(json["budgets"].as_array().unwrap().len(), 3);
    assert_eq!(json["cacheSize"], 0);
    assert!(json["generatedAt"].is_string());
}

#[tokio::test]
async fn reset_source_known_and_unknown() {
    let primary = MockSource::new("PRIMARY", SourceTier::Primary, 1.0);
    let app = app(&[primary]);

    let (status, json) = send(app.clone(), Method::POST, "/api/v1/sources/PRIMARY/reset").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sourceId"], "PRIMARY");
    assert_eq!(json["reset"], true);

    let (status, json) = send(app.clone(), Method::POST, "/api/v1/sources/NOPE/reset").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], 404);

    let (status, json) = send(app, Method::POST, "/api/v1/sources/reset").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["sources"][0]["state"], "CLOSED");
}

#[test]
fn acquisition_config_loads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sources.json");
    std::fs::write(
        &path,
        r#"{
            "sources": [{"kind": "coinbase"}, {"kind": "coingecko"}],
            "routes": {"default": ["COINBASE", "COINGECKO"]}
        }"#,
    )
    .unwrap();

    let config = Config {
        sources_config: Some(path),
        ..Config::default()
    };
    let acquisition = load_acquisition_config(&config).unwrap();
    assert_eq!(acquisition.sources.len(), 2);

    let defaults = load_acquisition_config(&Config::default()).unwrap();
    assert_eq!(defaults.sources.len(), 3);
}

#[test]
fn invalid_acquisition_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sources.json");
    std::fs::write(&path, r#"{"routes": {"default": ["MISSING"]}}"#).unwrap();

    let config = Config {
        sources_config: Some(path),
        ..Config::default()
    };
    let err = load_acquisition_config(&config).unwrap_err();
    assert!(err.to_string().contains("Invalid configuration"));
}
