//! External capabilities consumed by the engine.
//!
//! Every outbound call is bounded by the configured timeout; a timeout is a
//! failure, never a success.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use starspin_types::{PendingReward, UserId};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("timed out")]
    Timeout,
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("transport: {0}")]
    Transport(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Chain transaction hash or gateway reference.
    pub reference: String,
}

/// "Send amount to address": success or failure, no partial results.
pub trait ValueTransfer: Send + Sync {
    fn send<'a>(
        &'a self,
        address: &'a str,
        amount: u64,
        memo: &'a str,
    ) -> BoxFuture<'a, Result<TransferReceipt, CollaboratorError>>;
}

/// Best-effort message to a Telegram user.
pub trait Notifier: Send + Sync {
    fn notify<'a>(
        &'a self,
        user: UserId,
        message: &'a str,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>>;
}

/// Hands a confirmed gift reward to the fulfilment channel.
pub trait GiftFulfillment: Send + Sync {
    fn deliver<'a>(&'a self, reward: &'a PendingReward)
        -> BoxFuture<'a, Result<(), CollaboratorError>>;
}

pub trait ExchangeRate: Send + Sync {
    fn stars_per_ton(&self) -> BoxFuture<'_, Result<f64, CollaboratorError>>;
}

#[derive(Clone)]
pub struct Collaborators {
    transfer: Arc<dyn ValueTransfer>,
    notifier: Arc<dyn Notifier>,
    gifts: Arc<dyn GiftFulfillment>,
    rates: Arc<dyn ExchangeRate>,
    timeout: Duration,
}

impl Collaborators {
    pub fn new(
        transfer: Arc<dyn ValueTransfer>,
        notifier: Arc<dyn Notifier>,
        gifts: Arc<dyn GiftFulfillment>,
        rates: Arc<dyn ExchangeRate>,
        timeout: Duration,
    ) -> Self {
        Self {
            transfer,
            notifier,
            gifts,
            rates,
            timeout,
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, CollaboratorError>>,
    ) -> Result<T, CollaboratorError> {
        if self.timeout.is_zero() {
            return call.await;
        }
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or(Err(CollaboratorError::Timeout))
    }

    pub async fn send(
        &self,
        address: &str,
        amount: u64,
        memo: &str,
    ) -> Result<TransferReceipt, CollaboratorError> {
        self.bounded(self.transfer.send(address, amount, memo)).await
    }

    pub async fn deliver(&self, reward: &PendingReward) -> Result<(), CollaboratorError> {
        self.bounded(self.gifts.deliver(reward)).await
    }

    pub async fn stars_per_ton(&self) -> Result<f64, CollaboratorError> {
        self.bounded(self.rates.stars_per_ton()).await
    }

    /// Sends `message`, logging instead of returning failures.
    pub async fn notify_best_effort(&self, user: UserId, message: &str) {
        if let Err(err) = self.bounded(self.notifier.notify(user, message)).await {
            tracing::warn!(user_id = user, error = %err, "notification failed");
        }
    }
}
