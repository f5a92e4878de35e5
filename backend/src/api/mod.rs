use axum::{
    extract::{DefaultBodyLimit, Request, State as AxumState},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use governor::middleware::NoOpMiddleware;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::Backend;

mod http;

pub(crate) const USER_HEADER: &str = "x-telegram-user-id";
pub(crate) const IDEMPOTENCY_HEADER: &str = "idempotency-key";
pub(crate) const ADMIN_HEADER: &str = "x-admin-token";
pub(crate) const WEBHOOK_HEADER: &str = "x-webhook-token";
const REQUEST_ID_HEADER: &str = "x-request-id";

pub struct Api {
    backend: Arc<Backend>,
}

type IpGovernorConfig =
    tower_governor::governor::GovernorConfig<SmartIpKeyExtractor, NoOpMiddleware>;

fn default_governor_config() -> Option<IpGovernorConfig> {
    GovernorConfigBuilder::default()
        .key_extractor(SmartIpKeyExtractor)
        .finish()
}

impl Api {
    pub fn new(backend: Arc<Backend>) -> Self {
        Self { backend }
    }

    pub fn router(&self) -> Router {
        let allowed_origins = parse_allowed_origins("ALLOWED_HTTP_ORIGINS");
        let allow_any_origin = allowed_origins.contains("*");
        if allowed_origins.is_empty() {
            tracing::warn!("ALLOWED_HTTP_ORIGINS is empty; all browser origins will be rejected");
        }
        let cors_origins = allowed_origins
            .iter()
            .filter(|origin| *origin != "*")
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Invalid origin in ALLOWED_HTTP_ORIGINS: {}", origin);
                    None
                }
            })
            .collect::<Vec<_>>();

        let cors = if allow_any_origin {
            CorsLayer::new().allow_origin(AllowOrigin::any())
        } else {
            CorsLayer::new().allow_origin(AllowOrigin::list(cors_origins))
        }
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static(REQUEST_ID_HEADER),
            header::HeaderName::from_static(USER_HEADER),
            header::HeaderName::from_static(IDEMPOTENCY_HEADER),
        ])
        .expose_headers([
            header::HeaderName::from_static(REQUEST_ID_HEADER),
            header::RETRY_AFTER,
        ]);

        let config = self.backend.config();
        let governor_conf = match (
            config.http_rate_limit_per_second,
            config.http_rate_limit_burst,
        ) {
            (Some(rate_per_second), Some(burst_size)) if rate_per_second > 0 && burst_size > 0 => {
                let nanos_per_request = (1_000_000_000u64 / rate_per_second).max(1);
                GovernorConfigBuilder::default()
                    .period(Duration::from_nanos(nanos_per_request))
                    .burst_size(burst_size)
                    .key_extractor(SmartIpKeyExtractor)
                    .finish()
                    .or_else(|| {
                        tracing::warn!("invalid rate-limit config; falling back to defaults");
                        default_governor_config()
                    })
                    .map(Arc::new)
            }
            _ => None,
        };

        let router = Router::new()
            .route("/healthz", get(http::healthz))
            .route("/config", get(http::config))
            .route("/metrics", get(http::metrics))
            .route("/users/register", post(http::register))
            .route("/users/wallet", post(http::set_wallet))
            .route("/users/me", get(http::me))
            .route("/deposits", post(http::deposit))
            .route("/cases/:id/spin", post(http::spin_case))
            .route("/spins/:id/claim", post(http::claim_prize))
            .route("/spins/:id/reroll", post(http::reroll_prize))
            .route("/slots/:id/spin", post(http::spin_slot))
            .route("/slots/spins/:id/withdraw", post(http::withdraw_slot_gift))
            .route("/wheels/:id/join", post(http::join_wheel))
            .route("/wheels/:id/draw", post(http::draw_wheel))
            .route("/rewards", get(http::list_rewards))
            .route("/rewards/claim", post(http::claim_reward))
            .route("/referrals/withdraw", post(http::withdraw_referral))
            .route("/runs", post(http::start_run))
            .route("/runs/:id/finish", post(http::finish_run))
            .route("/runs/leaderboard/:period", get(http::leaderboard));

        let router = match governor_conf {
            Some(config) => router.layer(GovernorLayer { config }),
            None => router,
        };
        let router = router.layer(cors);
        let router = match config.http_body_limit_bytes {
            Some(limit) if limit > 0 => router.layer(DefaultBodyLimit::max(limit)),
            _ => router,
        };
        let router = router.layer(middleware::from_fn_with_state(
            self.backend.clone(),
            request_id_middleware,
        ));
        let router = router.layer(TraceLayer::new_for_http());

        router.with_state(self.backend.clone())
    }
}

fn parse_allowed_origins(var: &str) -> HashSet<String> {
    std::env::var(var)
        .unwrap_or_default()
        .split(',')
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

async fn request_id_middleware(
    AxumState(backend): AxumState<Arc<Backend>>,
    req: Request,
    next: Next,
) -> Response {
    let request_id = req
        .headers()
        .get(header::HeaderName::from_static(REQUEST_ID_HEADER))
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let mut response = next.run(req).await;
    let elapsed = start.elapsed();
    let metrics = backend.http_metrics();
    metrics.record(&path, elapsed);
    match response.status() {
        StatusCode::TOO_MANY_REQUESTS => metrics.inc_reject_rate_limit(),
        StatusCode::CONFLICT => metrics.inc_reject_conflict(),
        StatusCode::ACCEPTED => metrics.inc_accepted_partial(),
        status if status.is_server_error() => metrics.inc_server_error(),
        _ => {}
    }
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(
            header::HeaderName::from_static(REQUEST_ID_HEADER),
            header_value,
        );
    }
    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = elapsed.as_millis() as u64,
        "http.request"
    );
    response
}
