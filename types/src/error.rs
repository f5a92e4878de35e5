use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

#[derive(Debug, Clone, ThisError, PartialEq, Eq)]
#[error("invalid {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Coarse classification of failures, deciding whether a caller may retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or missing input; nothing changed.
    Validation,
    /// A real-world condition does not hold yet (not found, wrong status, no funds).
    Precondition,
    /// Racing or repeated request; re-check state instead of retrying blindly.
    Conflict,
    /// External value moved but bookkeeping could not follow.
    Reconciliation,
    /// Storage or collaborator fault.
    Internal,
}

/// Stable reason code surfaced to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    InvalidInput,
    /// Missing or malformed caller identity.
    Unauthorized,
    NotFound,
    GameNotFound,
    NoCandidates,
    InsufficientFunds,
    DuplicateIdempotencyKey,
    WrongStatus,
    AlreadyClaimed,
    NoPendingReward,
    NoGiftAvailable,
    PoolFull,
    AlreadyJoined,
    WheelClosed,
    WheelNotReady,
    RateLimited,
    RequestInProgress,
    FreeSpinUnavailable,
    BelowMinimum,
    NoWallet,
    TransferFailed,
    NoActivePeriod,
    DailyLimitReached,
    Storage,
}

crate::text_enum!(Reason {
    InvalidInput => "invalid_input",
    Unauthorized => "unauthorized",
    NotFound => "not_found",
    GameNotFound => "game_not_found",
    NoCandidates => "no_candidates",
    InsufficientFunds => "insufficient_funds",
    DuplicateIdempotencyKey => "duplicate_idempotency_key",
    WrongStatus => "wrong_status",
    AlreadyClaimed => "already_claimed",
    NoPendingReward => "no_pending_reward",
    NoGiftAvailable => "no_gift_available",
    PoolFull => "pool_full",
    AlreadyJoined => "already_joined",
    WheelClosed => "wheel_closed",
    WheelNotReady => "wheel_not_ready",
    RateLimited => "rate_limited",
    RequestInProgress => "request_in_progress",
    FreeSpinUnavailable => "free_spin_unavailable",
    BelowMinimum => "below_minimum",
    NoWallet => "no_wallet",
    TransferFailed => "transfer_failed",
    NoActivePeriod => "no_active_period",
    DailyLimitReached => "daily_limit_reached",
    Storage => "storage",
});

impl Reason {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Reason::InvalidInput
            | Reason::Unauthorized
            | Reason::NoCandidates
            | Reason::BelowMinimum => ErrorKind::Validation,
            Reason::NotFound
            | Reason::GameNotFound
            | Reason::InsufficientFunds
            | Reason::WrongStatus
            | Reason::NoPendingReward
            | Reason::NoGiftAvailable
            | Reason::PoolFull
            | Reason::WheelClosed
            | Reason::WheelNotReady
            | Reason::FreeSpinUnavailable
            | Reason::NoWallet
            | Reason::NoActivePeriod
            | Reason::DailyLimitReached => ErrorKind::Precondition,
            Reason::DuplicateIdempotencyKey
            | Reason::AlreadyClaimed
            | Reason::AlreadyJoined
            | Reason::RateLimited
            | Reason::RequestInProgress => ErrorKind::Conflict,
            Reason::TransferFailed | Reason::Storage => ErrorKind::Internal,
        }
    }
}

/// JSON body of every rejected request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: Reason,
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorBody {
    pub fn new(error: Reason, message: impl Into<String>) -> Self {
        Self {
            error,
            kind: error.kind(),
            message: message.into(),
        }
    }
}
