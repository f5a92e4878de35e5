//! HTTP surface of the starspin settlement engine.

use starspin_execution::Engine;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

mod api;
pub use api::Api;

pub mod collaborators;
pub mod config;
pub mod dedupe;
mod metrics;

pub use collaborators::build_collaborators;
pub use config::BackendConfig;
pub use dedupe::RedisDedupe;
pub use metrics::{HttpMetrics, HttpMetricsSnapshot, LatencySnapshot};

/// Shared state behind every route.
pub struct Backend {
    engine: Arc<Engine>,
    config: BackendConfig,
    http_metrics: HttpMetrics,
}

impl Backend {
    pub fn new(engine: Arc<Engine>, config: BackendConfig) -> Self {
        Self {
            engine,
            config,
            http_metrics: HttpMetrics::default(),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn http_metrics(&self) -> &HttpMetrics {
        &self.http_metrics
    }
}

/// Wall-clock unix milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
