use starspin_types::api::{DepositView, UserView};
use starspin_types::constants::MAX_WALLET_ADDRESS_LEN;
use starspin_types::{Currency, Deposit, User, UserId};
use uuid::Uuid;

use crate::store::StoreError;
use crate::{Engine, EngineError};

impl Engine {
    fn user_view(&self, user: &User, now: u64) -> UserView {
        UserView {
            user_id: user.id,
            wallet_address: user.wallet_address.clone(),
            referrer_id: user.referrer_id,
            balances: user.balances(),
            free_spin_available: self.free_spin_available(user, now),
        }
    }

    /// Creates the user on first sight. The referrer is only recorded then,
    /// and only if it names another existing user.
    pub async fn register(
        &self,
        user: UserId,
        referrer: Option<UserId>,
        now: u64,
    ) -> Result<UserView, EngineError> {
        let _lock = self.guard.lock_user(user).await;
        if let Some(existing) = self.store.user(user)? {
            return Ok(self.user_view(&existing, now));
        }
        let referrer = match referrer.filter(|referrer| *referrer != user) {
            Some(referrer) if self.store.user(referrer)?.is_some() => Some(referrer),
            Some(referrer) => {
                tracing::debug!(
                    user_id = user,
                    referrer_id = referrer,
                    "unknown referrer ignored"
                );
                None
            }
            None => None,
        };
        let created = User::new(user, referrer, now);
        match self.store.insert_user(&created) {
            Ok(()) => {
                tracing::info!(user_id = user, referrer_id = referrer, "user registered");
                Ok(self.user_view(&created, now))
            }
            // Registered concurrently by another instance.
            Err(StoreError::Duplicate(_)) => {
                let existing = self.store.user(user)?.ok_or(EngineError::UserNotFound)?;
                Ok(self.user_view(&existing, now))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn set_wallet(
        &self,
        user: UserId,
        address: &str,
        now: u64,
    ) -> Result<UserView, EngineError> {
        let address = address.trim();
        if address.is_empty() || address.len() > MAX_WALLET_ADDRESS_LEN {
            return Err(EngineError::InvalidInput("invalid wallet address".into()));
        }
        let _lock = self.guard.lock_user(user).await;
        if !self.store.set_wallet(user, address)? {
            return Err(EngineError::UserNotFound);
        }
        self.me(user, now)
    }

    pub fn me(&self, user: UserId, now: u64) -> Result<UserView, EngineError> {
        let user = self.store.user(user)?.ok_or(EngineError::UserNotFound)?;
        Ok(self.user_view(&user, now))
    }

    /// Credits a confirmed payment once per `external_id`.
    pub async fn deposit(
        &self,
        user: UserId,
        currency: Currency,
        amount: u64,
        external_id: &str,
        now: u64,
    ) -> Result<DepositView, EngineError> {
        if amount == 0 {
            return Err(EngineError::InvalidInput("deposit amount must be positive".into()));
        }
        let external_id = external_id.trim();
        if external_id.is_empty() {
            return Err(EngineError::InvalidInput("missing external id".into()));
        }
        let _lock = self.guard.lock_user(user).await;
        if self.store.user(user)?.is_none() {
            return Err(EngineError::UserNotFound);
        }
        let deposit = Deposit {
            id: Uuid::new_v4(),
            user_id: user,
            currency,
            amount,
            external_id: external_id.to_string(),
            created_at: now,
        };
        let already_processed = match self.store.apply_deposit(&deposit) {
            Ok(balance) => {
                tracing::info!(
                    user_id = user,
                    %currency,
                    amount,
                    balance,
                    external_id,
                    "deposit credited"
                );
                false
            }
            Err(StoreError::Duplicate(_)) => {
                tracing::info!(user_id = user, external_id, "deposit already processed");
                true
            }
            Err(err) => return Err(err.into()),
        };
        Ok(DepositView {
            balances: self.ledger.balances(user)?,
            already_processed,
        })
    }
}
