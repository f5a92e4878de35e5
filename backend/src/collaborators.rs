//! HTTP-backed implementations of the engine's external capabilities.

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use starspin_execution::{
    CollaboratorError, Collaborators, ExchangeRate, GiftFulfillment, Notifier, TransferReceipt,
    ValueTransfer,
};
use starspin_types::{PendingReward, UserId};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::BackendConfig;

/// Wires HTTP collaborators for every configured endpoint and the local
/// fallbacks for the rest.
pub fn build_collaborators(config: &BackendConfig) -> Result<Collaborators, url::ParseError> {
    let client = Client::new();
    let notifier: Arc<dyn Notifier> = match config.telegram_bot_token.as_deref() {
        Some(token) => Arc::new(TelegramNotifier::new(
            client.clone(),
            &config.telegram_api_url,
            token,
        )?),
        None => {
            tracing::warn!("no telegram bot token; notifications are only logged");
            Arc::new(LogNotifier)
        }
    };
    let transfer: Arc<dyn ValueTransfer> = match config.transfer_gateway_url.as_deref() {
        Some(url) => Arc::new(GatewayTransfer::new(client.clone(), url)?),
        None => {
            tracing::warn!("no transfer gateway; referral withdrawals will fail");
            Arc::new(DisabledTransfer)
        }
    };
    let gifts: Arc<dyn GiftFulfillment> = match config.gift_fulfillment_url.as_deref() {
        Some(url) => Arc::new(HttpGiftFulfillment::new(client.clone(), url)?),
        None => Arc::new(ManualGiftFulfillment),
    };
    let rates: Arc<dyn ExchangeRate> = match config.exchange_rate_url.as_deref() {
        Some(url) => Arc::new(HttpExchangeRate::new(client, url)?),
        None => Arc::new(StaticRate(config.fallback_stars_per_ton)),
    };
    Ok(Collaborators::new(
        transfer,
        notifier,
        gifts,
        rates,
        Duration::from_millis(config.engine.external_timeout_ms),
    ))
}

fn transport(err: reqwest::Error) -> CollaboratorError {
    if err.is_timeout() {
        CollaboratorError::Timeout
    } else {
        CollaboratorError::Transport(err.to_string())
    }
}

async fn rejected_unless_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, CollaboratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CollaboratorError::Rejected(format!(
        "HTTP {}: {}",
        status.as_u16(),
        body.chars().take(200).collect::<String>()
    )))
}

/// Telegram Bot API `sendMessage`.
pub struct TelegramNotifier {
    client: Client,
    send_message: Url,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: UserId,
    text: &'a str,
}

impl TelegramNotifier {
    pub fn new(client: Client, api_url: &str, token: &str) -> Result<Self, url::ParseError> {
        // Tokens contain ':' and would parse as a scheme under `Url::join`.
        let send_message = Url::parse(&format!(
            "{}/bot{token}/sendMessage",
            api_url.trim_end_matches('/')
        ))?;
        Ok(Self {
            client,
            send_message,
        })
    }
}

impl Notifier for TelegramNotifier {
    fn notify<'a>(
        &'a self,
        user: UserId,
        message: &'a str,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.send_message.clone())
                .json(&SendMessage {
                    chat_id: user,
                    text: message,
                })
                .send()
                .await
                .map_err(transport)?;
            rejected_unless_success(response).await?;
            Ok(())
        })
    }
}

/// Logs messages instead of sending them; used when no bot token is set.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify<'a>(
        &'a self,
        user: UserId,
        message: &'a str,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            tracing::info!(user_id = user, message, "notification (not sent)");
            Ok(())
        })
    }
}

/// Payout gateway: `POST {base}/transfers` answering `{"reference": ...}`.
pub struct GatewayTransfer {
    client: Client,
    transfers: Url,
}

#[derive(Serialize)]
struct TransferRequest<'a> {
    address: &'a str,
    amount: u64,
    memo: &'a str,
}

impl GatewayTransfer {
    pub fn new(client: Client, base: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            transfers: Url::parse(base)?.join("transfers")?,
        })
    }
}

impl ValueTransfer for GatewayTransfer {
    fn send<'a>(
        &'a self,
        address: &'a str,
        amount: u64,
        memo: &'a str,
    ) -> BoxFuture<'a, Result<TransferReceipt, CollaboratorError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.transfers.clone())
                .json(&TransferRequest {
                    address,
                    amount,
                    memo,
                })
                .send()
                .await
                .map_err(transport)?;
            let response = rejected_unless_success(response).await?;
            response
                .json::<TransferReceipt>()
                .await
                .map_err(|err| CollaboratorError::Transport(format!("bad receipt: {err}")))
        })
    }
}

/// Rejects every transfer; used when no gateway is configured.
pub struct DisabledTransfer;

impl ValueTransfer for DisabledTransfer {
    fn send<'a>(
        &'a self,
        _address: &'a str,
        _amount: u64,
        _memo: &'a str,
    ) -> BoxFuture<'a, Result<TransferReceipt, CollaboratorError>> {
        Box::pin(async { Err(CollaboratorError::Rejected("transfer gateway not configured".into())) })
    }
}

/// Gift delivery bot: `POST {base}/gifts` with the confirmed reward.
pub struct HttpGiftFulfillment {
    client: Client,
    gifts: Url,
}

impl HttpGiftFulfillment {
    pub fn new(client: Client, base: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            gifts: Url::parse(base)?.join("gifts")?,
        })
    }
}

impl GiftFulfillment for HttpGiftFulfillment {
    fn deliver<'a>(
        &'a self,
        reward: &'a PendingReward,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.gifts.clone())
                .json(reward)
                .send()
                .await
                .map_err(transport)?;
            rejected_unless_success(response).await?;
            Ok(())
        })
    }
}

/// Leaves gift rewards `failed` for manual delivery.
pub struct ManualGiftFulfillment;

impl GiftFulfillment for ManualGiftFulfillment {
    fn deliver<'a>(
        &'a self,
        _reward: &'a PendingReward,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async { Err(CollaboratorError::Rejected("gift fulfilment not configured".into())) })
    }
}

/// `GET {url}` answering `{"stars_per_ton": ...}`.
pub struct HttpExchangeRate {
    client: Client,
    url: Url,
}

#[derive(Deserialize)]
struct RateResponse {
    stars_per_ton: f64,
}

impl HttpExchangeRate {
    pub fn new(client: Client, url: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            client,
            url: Url::parse(url)?,
        })
    }
}

impl ExchangeRate for HttpExchangeRate {
    fn stars_per_ton(&self) -> BoxFuture<'_, Result<f64, CollaboratorError>> {
        Box::pin(async move {
            let response = self
                .client
                .get(self.url.clone())
                .send()
                .await
                .map_err(transport)?;
            let rate = rejected_unless_success(response)
                .await?
                .json::<RateResponse>()
                .await
                .map_err(|err| CollaboratorError::Transport(format!("bad rate: {err}")))?;
            if rate.stars_per_ton.is_finite() && rate.stars_per_ton > 0.0 {
                Ok(rate.stars_per_ton)
            } else {
                Err(CollaboratorError::Rejected(format!(
                    "invalid rate {}",
                    rate.stars_per_ton
                )))
            }
        })
    }
}

pub struct StaticRate(pub f64);

impl ExchangeRate for StaticRate {
    fn stars_per_ton(&self) -> BoxFuture<'_, Result<f64, CollaboratorError>> {
        let rate = self.0;
        Box::pin(async move { Ok(rate) })
    }
}
