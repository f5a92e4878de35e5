use serde::Serialize;
use starspin_execution::{EngineConfig, ScheduleConfig};
use std::path::PathBuf;

pub const DEFAULT_DATABASE_PATH: &str = "starspin.db";
pub const DEFAULT_HTTP_RATE_LIMIT_PER_SECOND: u64 = 20;
pub const DEFAULT_HTTP_RATE_LIMIT_BURST: u32 = 40;
pub const DEFAULT_HTTP_BODY_LIMIT_BYTES: usize = 64 * 1024;
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
pub const DEFAULT_STARS_PER_TON: f64 = 250.0;
pub const DEFAULT_DEDUPE_REDIS_PREFIX: &str = "starspin:dedupe:";

/// Everything the binary needs besides the engine's own tunables.
#[derive(Clone, Debug, Serialize)]
pub struct BackendConfig {
    pub database_path: PathBuf,
    /// `None` (or `0`) disables the per-IP HTTP limiter.
    pub http_rate_limit_per_second: Option<u64>,
    pub http_rate_limit_burst: Option<u32>,
    pub http_body_limit_bytes: Option<usize>,
    #[serde(skip)]
    pub admin_token: Option<String>,
    #[serde(skip)]
    pub webhook_token: Option<String>,
    #[serde(skip)]
    pub metrics_token: Option<String>,
    #[serde(skip)]
    pub telegram_bot_token: Option<String>,
    pub telegram_api_url: String,
    pub transfer_gateway_url: Option<String>,
    pub gift_fulfillment_url: Option<String>,
    pub exchange_rate_url: Option<String>,
    /// Used when no exchange-rate service is configured.
    pub fallback_stars_per_ton: f64,
    pub dedupe_redis_url: Option<String>,
    pub dedupe_redis_prefix: String,
    pub engine: EngineConfig,
    pub schedule: ScheduleConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            http_rate_limit_per_second: Some(DEFAULT_HTTP_RATE_LIMIT_PER_SECOND),
            http_rate_limit_burst: Some(DEFAULT_HTTP_RATE_LIMIT_BURST),
            http_body_limit_bytes: Some(DEFAULT_HTTP_BODY_LIMIT_BYTES),
            admin_token: None,
            webhook_token: None,
            metrics_token: None,
            telegram_bot_token: None,
            telegram_api_url: DEFAULT_TELEGRAM_API_URL.to_string(),
            transfer_gateway_url: None,
            gift_fulfillment_url: None,
            exchange_rate_url: None,
            fallback_stars_per_ton: DEFAULT_STARS_PER_TON,
            dedupe_redis_url: None,
            dedupe_redis_prefix: DEFAULT_DEDUPE_REDIS_PREFIX.to_string(),
            engine: EngineConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl BackendConfig {
    /// No HTTP limiter, no engine throttling; used by route tests.
    pub fn for_tests() -> Self {
        Self {
            http_rate_limit_per_second: None,
            http_rate_limit_burst: None,
            engine: EngineConfig::unthrottled(),
            ..Self::default()
        }
    }
}
