use std::{net::SocketAddr, path::PathBuf, time::Duration};

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

pub struct Config {
    pub listen_addr: SocketAddr,
    /// JSON acquisition config; built-in defaults when unset.
    pub sources_config: Option<PathBuf>,
    pub cors_allow: Vec<String>,
    /// Outer HTTP timeout and the default quote deadline.
    pub request_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let listen_addr: SocketAddr = std::env::var("TB_LISTEN_ADDR")
            .unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string())
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid TB_LISTEN_ADDR: {}", e))?;
        let sources_config = std::env::var("TB_SOURCES_CONFIG")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        let cors_allow = std::env::var("TB_CORS_ALLOW_ORIGINS")
            .unwrap_or_else(|_| "*".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let timeout_ms: u64 = std::env::var("TB_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS);
        let sweep_secs: u64 = std::env::var("TB_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
        Ok(Self {
            listen_addr,
            sources_config,
            cors_allow,
            request_timeout: Duration::from_millis(timeout_ms),
            sweep_interval: Duration::from_secs(sweep_secs),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            sources_config: None,
            cors_allow: vec!["*".to_string()],
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}
