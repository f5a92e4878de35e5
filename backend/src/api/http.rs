use axum::{
    body::Bytes,
    extract::{Path, Query, State as AxumState},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use starspin_execution::{EngineError, SpinRequest};
use starspin_types::api::Response as Reply;
use starspin_types::{Currency, ErrorBody, GameId, Reason, UserId, WithdrawalStatus};
use std::sync::Arc;
use uuid::Uuid;

use super::{ADMIN_HEADER, IDEMPOTENCY_HEADER, USER_HEADER, WEBHOOK_HEADER};
use crate::metrics::HttpMetricsSnapshot;
use crate::{now_ms, Backend};

/// Rejection carrying the HTTP status and a stable reason code.
#[derive(Debug)]
pub(super) struct ApiError {
    status: StatusCode,
    body: ErrorBody,
    retry_after_ms: Option<u64>,
}

impl ApiError {
    fn new(status: StatusCode, reason: Reason, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody::new(reason, message),
            retry_after_ms: None,
        }
    }

    fn unauthorized(message: &str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, Reason::Unauthorized, message)
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, Reason::InvalidInput, message)
    }

    /// A wheel join short of tickets answers 400, unlike spins.
    fn wheel_join(err: EngineError) -> Self {
        match err {
            EngineError::InsufficientFunds { .. } => {
                Self::new(StatusCode::BAD_REQUEST, err.reason(), err.to_string())
            }
            err => err.into(),
        }
    }
}

fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::UserNotFound
        | EngineError::GameNotFound
        | EngineError::SpinNotFound
        | EngineError::NoPendingReward
        | EngineError::RunNotFound
        | EngineError::PeriodNotFound => StatusCode::NOT_FOUND,
        EngineError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
        EngineError::InvalidInput(_)
        | EngineError::InsufficientEarnings { .. }
        | EngineError::NoCandidates
        | EngineError::WheelNotReady
        | EngineError::BelowMinimum { .. }
        | EngineError::NoWallet => StatusCode::BAD_REQUEST,
        EngineError::PoolFull
        | EngineError::WheelClosed
        | EngineError::FreeSpinUnavailable
        | EngineError::DailyLimitReached => StatusCode::FORBIDDEN,
        EngineError::DuplicateIdempotencyKey
        | EngineError::WrongStatus { .. }
        | EngineError::AlreadyClaimed
        | EngineError::AlreadyJoined
        | EngineError::NoGiftAvailable(_)
        | EngineError::RequestInProgress
        | EngineError::NoActivePeriod
        | EngineError::RunNotActive => StatusCode::CONFLICT,
        EngineError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        EngineError::TransferFailed(_) | EngineError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = status_for(&err);
        let message = match &err {
            EngineError::Store(inner) => {
                tracing::error!(error = %inner, "store failure");
                "internal error".to_string()
            }
            err => err.to_string(),
        };
        Self {
            status,
            body: ErrorBody::new(err.reason(), message),
            retry_after_ms: match err {
                EngineError::RateLimited { retry_after_ms } => Some(retry_after_ms),
                _ => None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(ms) = self.retry_after_ms {
            let seconds = ms.div_ceil(1_000).max(1);
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

type ApiResult = Result<Response, ApiError>;

fn ok(reply: Reply) -> ApiResult {
    Ok(Json(reply).into_response())
}

fn accepted(reply: Reply) -> ApiResult {
    Ok((StatusCode::ACCEPTED, Json(reply)).into_response())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Caller identity, set by the upstream auth gateway.
fn caller(headers: &HeaderMap) -> Result<UserId, ApiError> {
    let value =
        header_str(headers, USER_HEADER).ok_or_else(|| ApiError::unauthorized("missing user"))?;
    match value.parse::<UserId>() {
        Ok(user) if user > 0 => Ok(user),
        _ => Err(ApiError::unauthorized("invalid user")),
    }
}

fn token_matches(headers: &HeaderMap, name: &str, expected: &str) -> bool {
    header_str(headers, name) == Some(expected)
}

/// Empty bodies decode as `T::default()`.
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|err| ApiError::bad_request(format!("invalid body: {err}")))
}

fn required_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|err| ApiError::bad_request(format!("invalid body: {err}")))
}

#[derive(Serialize)]
struct HealthzResponse {
    ok: bool,
}

pub(super) async fn healthz() -> impl IntoResponse {
    Json(HealthzResponse { ok: true })
}

pub(super) async fn config(AxumState(backend): AxumState<Arc<Backend>>) -> impl IntoResponse {
    Json(backend.config().clone())
}

#[derive(Serialize)]
struct MetricsResponse {
    http: HttpMetricsSnapshot,
    held_locks: usize,
}

fn metrics_auth_error(backend: &Backend, headers: &HeaderMap) -> Option<StatusCode> {
    let token = backend.config().metrics_token.as_deref().unwrap_or_default();
    if token.is_empty() {
        return None;
    }
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    if bearer == Some(token) || token_matches(headers, "x-metrics-token", token) {
        None
    } else {
        Some(StatusCode::UNAUTHORIZED)
    }
}

pub(super) async fn metrics(
    AxumState(backend): AxumState<Arc<Backend>>,
    headers: HeaderMap,
) -> Response {
    if let Some(status) = metrics_auth_error(&backend, &headers) {
        return status.into_response();
    }
    Json(MetricsResponse {
        http: backend.http_metrics().snapshot(),
        held_locks: backend.engine().guard().held_locks(),
    })
    .into_response()
}

#[derive(Default, Deserialize)]
pub(super) struct RegisterBody {
    referrer_id: Option<UserId>,
}

pub(super) async fn register(
    AxumState(backend): AxumState<Arc<Backend>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    let user = caller(&headers)?;
    let body: RegisterBody = optional_body(&body)?;
    let view = backend
        .engine()
        .register(user, body.referrer_id, now_ms())
        .await?;
    ok(Reply::Register(view))
}

#[derive(Deserialize)]
pub(super) struct WalletBody {
    address: String,
}

pub(super) async fn set_wallet(
    AxumState(backend): AxumState<Arc<Backend>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    let user = caller(&headers)?;
    let body: WalletBody = required_body(&body)?;
    let view = backend
        .engine()
        .set_wallet(user, &body.address, now_ms())
        .await?;
    ok(Reply::SetWallet(view))
}

pub(super) async fn me(
    AxumState(backend): AxumState<Arc<Backend>>,
    headers: HeaderMap,
) -> ApiResult {
    let user = caller(&headers)?;
    ok(Reply::Me(backend.engine().me(user, now_ms())?))
}

#[derive(Deserialize)]
pub(super) struct DepositBody {
    user_id: UserId,
    currency: Currency,
    amount: u64,
    external_id: String,
}

/// Payment webhook. The depositing user comes from the body, not the caller.
pub(super) async fn deposit(
    AxumState(backend): AxumState<Arc<Backend>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    if let Some(expected) = backend.config().webhook_token.as_deref() {
        if !token_matches(&headers, WEBHOOK_HEADER, expected) {
            return Err(ApiError::unauthorized("invalid webhook token"));
        }
    }
    let body: DepositBody = required_body(&body)?;
    let view = backend
        .engine()
        .deposit(
            body.user_id,
            body.currency,
            body.amount,
            &body.external_id,
            now_ms(),
        )
        .await?;
    ok(Reply::Deposit(view))
}

#[derive(Default, Deserialize)]
pub(super) struct SpinBody {
    idempotency_key: Option<String>,
    #[serde(default)]
    free: bool,
}

fn spin_request(
    headers: &HeaderMap,
    game_id: GameId,
    body: &Bytes,
) -> Result<SpinRequest, ApiError> {
    let user = caller(headers)?;
    let body: SpinBody = optional_body(body)?;
    let mut request = SpinRequest::new(user, game_id);
    request.idempotency_key = body
        .idempotency_key
        .or_else(|| header_str(headers, IDEMPOTENCY_HEADER).map(str::to_string));
    request.free = body.free;
    Ok(request)
}

pub(super) async fn spin_case(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(case_id): Path<GameId>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    let request = spin_request(&headers, case_id, &body)?;
    let view = backend.engine().spin_case(request, now_ms()).await?;
    ok(Reply::CaseSpin(view))
}

pub(super) async fn claim_prize(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(spin_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult {
    let user = caller(&headers)?;
    let view = backend
        .engine()
        .claim_prize(user, spin_id, now_ms())
        .await?;
    ok(Reply::ClaimPrize(view))
}

pub(super) async fn reroll_prize(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(spin_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult {
    let user = caller(&headers)?;
    let view = backend
        .engine()
        .reroll_prize(user, spin_id, now_ms())
        .await?;
    ok(Reply::RerollPrize(view))
}

pub(super) async fn spin_slot(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(slot_id): Path<GameId>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    let request = spin_request(&headers, slot_id, &body)?;
    let view = backend.engine().spin_slot(request, now_ms()).await?;
    ok(Reply::SlotSpin(view))
}

pub(super) async fn withdraw_slot_gift(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(spin_id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult {
    let user = caller(&headers)?;
    let view = backend
        .engine()
        .withdraw_slot_gift(user, spin_id, now_ms())
        .await?;
    ok(Reply::WithdrawSlotGift(view))
}

pub(super) async fn join_wheel(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(wheel_id): Path<GameId>,
    headers: HeaderMap,
) -> ApiResult {
    let user = caller(&headers)?;
    let view = backend
        .engine()
        .join_wheel(user, wheel_id, now_ms())
        .await
        .map_err(ApiError::wheel_join)?;
    ok(Reply::JoinWheel(view))
}

/// Operator-triggered draw; scheduled draws run in the task runner.
pub(super) async fn draw_wheel(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(wheel_id): Path<GameId>,
    headers: HeaderMap,
) -> ApiResult {
    let authorized = backend
        .config()
        .admin_token
        .as_deref()
        .is_some_and(|expected| token_matches(&headers, ADMIN_HEADER, expected));
    if !authorized {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            Reason::Unauthorized,
            "admin token required",
        ));
    }
    let view = backend.engine().draw_wheel(wheel_id, now_ms()).await?;
    ok(Reply::DrawWheel(view))
}

#[derive(Default, Deserialize)]
pub(super) struct RewardClaimBody {
    reward_id: Option<Uuid>,
}

pub(super) async fn claim_reward(
    AxumState(backend): AxumState<Arc<Backend>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    let user = caller(&headers)?;
    let body: RewardClaimBody = optional_body(&body)?;
    let view = backend
        .engine()
        .claim_pending_reward(user, body.reward_id, now_ms())
        .await?;
    if view.delivered {
        ok(Reply::ClaimPendingReward(view))
    } else {
        accepted(Reply::ClaimPendingReward(view))
    }
}

pub(super) async fn list_rewards(
    AxumState(backend): AxumState<Arc<Backend>>,
    headers: HeaderMap,
) -> ApiResult {
    let user = caller(&headers)?;
    let rewards = backend.engine().list_pending_rewards(user)?;
    ok(Reply::ListRewards { rewards })
}

#[derive(Default, Deserialize)]
pub(super) struct WithdrawBody {
    amount: Option<u64>,
}

pub(super) async fn withdraw_referral(
    AxumState(backend): AxumState<Arc<Backend>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    let user = caller(&headers)?;
    let body: WithdrawBody = optional_body(&body)?;
    let view = backend
        .engine()
        .withdraw_referral(user, body.amount, now_ms())
        .await?;
    if view.status == WithdrawalStatus::SentNeedsManualFix {
        accepted(Reply::WithdrawReferral(view))
    } else {
        ok(Reply::WithdrawReferral(view))
    }
}

pub(super) async fn start_run(
    AxumState(backend): AxumState<Arc<Backend>>,
    headers: HeaderMap,
) -> ApiResult {
    let user = caller(&headers)?;
    ok(Reply::StartRun(backend.engine().start_run(user, now_ms()).await?))
}

#[derive(Deserialize)]
pub(super) struct FinishRunBody {
    score: u64,
}

pub(super) async fn finish_run(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(run_id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    let user = caller(&headers)?;
    let body: FinishRunBody = required_body(&body)?;
    let run = backend
        .engine()
        .finish_run(user, run_id, body.score, now_ms())
        .await?;
    ok(Reply::FinishRun(run))
}

#[derive(Deserialize)]
pub(super) struct LeaderboardQuery {
    limit: Option<u32>,
}

pub(super) async fn leaderboard(
    AxumState(backend): AxumState<Arc<Backend>>,
    Path(period_id): Path<i64>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult {
    let view = backend.engine().leaderboard(period_id, query.limit)?;
    ok(Reply::Leaderboard(view))
}
