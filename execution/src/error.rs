use starspin_types::{Currency, ErrorKind, Reason, SpinStatus};
use thiserror::Error;

use crate::collaborators::CollaboratorError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("user not found")]
    UserNotFound,
    #[error("game not found or inactive")]
    GameNotFound,
    #[error("game has no eligible candidates")]
    NoCandidates,
    #[error("insufficient {currency}: need {needed}, have {available}")]
    InsufficientFunds {
        currency: Currency,
        needed: u64,
        available: u64,
    },
    #[error("insufficient referral earnings: need {needed}, have {available}")]
    InsufficientEarnings { needed: u64, available: u64 },
    #[error("idempotency key already used by another request")]
    DuplicateIdempotencyKey,
    #[error("spin not found")]
    SpinNotFound,
    #[error("spin is {found}, expected {expected}")]
    WrongStatus {
        expected: SpinStatus,
        found: SpinStatus,
    },
    #[error("reward already claimed")]
    AlreadyClaimed,
    #[error("no pending reward")]
    NoPendingReward,
    #[error("no {0} gift available")]
    NoGiftAvailable(String),
    #[error("wheel pool is full")]
    PoolFull,
    #[error("already joined this wheel")]
    AlreadyJoined,
    #[error("wheel is closed")]
    WheelClosed,
    #[error("wheel is not ready to draw")]
    WheelNotReady,
    #[error("rate limited, retry in {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("identical request already in progress")]
    RequestInProgress,
    #[error("free spin not available")]
    FreeSpinUnavailable,
    #[error("amount below minimum of {minimum}")]
    BelowMinimum { minimum: u64 },
    #[error("no wallet address on file")]
    NoWallet,
    #[error("transfer failed: {0}")]
    TransferFailed(CollaboratorError),
    #[error("no active period")]
    NoActivePeriod,
    #[error("daily attempt limit reached")]
    DailyLimitReached,
    #[error("run not found")]
    RunNotFound,
    #[error("run is no longer active")]
    RunNotActive,
    #[error("period not found")]
    PeriodNotFound,
    #[error("store: {0}")]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Stable reason code surfaced to clients.
    pub fn reason(&self) -> Reason {
        match self {
            EngineError::InvalidInput(_) => Reason::InvalidInput,
            EngineError::UserNotFound
            | EngineError::SpinNotFound
            | EngineError::RunNotFound
            | EngineError::PeriodNotFound => Reason::NotFound,
            EngineError::GameNotFound => Reason::GameNotFound,
            EngineError::NoCandidates => Reason::NoCandidates,
            EngineError::InsufficientFunds { .. } | EngineError::InsufficientEarnings { .. } => {
                Reason::InsufficientFunds
            }
            EngineError::DuplicateIdempotencyKey => Reason::DuplicateIdempotencyKey,
            EngineError::WrongStatus { .. } | EngineError::RunNotActive => Reason::WrongStatus,
            EngineError::AlreadyClaimed => Reason::AlreadyClaimed,
            EngineError::NoPendingReward => Reason::NoPendingReward,
            EngineError::NoGiftAvailable(_) => Reason::NoGiftAvailable,
            EngineError::PoolFull => Reason::PoolFull,
            EngineError::AlreadyJoined => Reason::AlreadyJoined,
            EngineError::WheelClosed => Reason::WheelClosed,
            EngineError::WheelNotReady => Reason::WheelNotReady,
            EngineError::RateLimited { .. } => Reason::RateLimited,
            EngineError::RequestInProgress => Reason::RequestInProgress,
            EngineError::FreeSpinUnavailable => Reason::FreeSpinUnavailable,
            EngineError::BelowMinimum { .. } => Reason::BelowMinimum,
            EngineError::NoWallet => Reason::NoWallet,
            EngineError::TransferFailed(_) => Reason::TransferFailed,
            EngineError::NoActivePeriod => Reason::NoActivePeriod,
            EngineError::DailyLimitReached => Reason::DailyLimitReached,
            EngineError::Store(_) => Reason::Storage,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.reason().kind()
    }
}
