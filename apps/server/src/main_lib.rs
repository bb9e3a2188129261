use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};
use tradebot_market_data::{AcquisitionConfig, AcquisitionCoordinator};

pub struct AppState {
    pub coordinator: Arc<AcquisitionCoordinator>,
    /// Deadline for quote requests without `timeoutMs`, and the cap for those with it.
    pub default_deadline: Duration,
}

impl AppState {
    pub fn new(coordinator: Arc<AcquisitionCoordinator>, default_deadline: Duration) -> Self {
        Self {
            coordinator,
            default_deadline,
        }
    }
}

pub fn init_tracing() {
    let log_format = std::env::var("TB_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

pub fn load_acquisition_config(config: &Config) -> anyhow::Result<AcquisitionConfig> {
    match &config.sources_config {
        Some(path) => {
            tracing::info!("Loading acquisition config from {}", path.display());
            Ok(AcquisitionConfig::from_path(path)?)
        }
        None => {
            tracing::info!("TB_SOURCES_CONFIG not set, using built-in source defaults");
            Ok(AcquisitionConfig::default())
        }
    }
}

pub async fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let acquisition = load_acquisition_config(config)?;
    let coordinator = AcquisitionCoordinator::from_config(acquisition)?;

    let status = coordinator.status();
    let ids: Vec<&str> = status.sources.iter().map(|s| s.id.as_str()).collect();
    tracing::info!("Market data sources: {}", ids.join(", "));

    // Leave headroom for the fallback path before the outer timeout fires
    let default_deadline = config.request_timeout.mul_f64(0.9);
    Ok(Arc::new(AppState::new(Arc::new(coordinator), default_deadline)))
}
