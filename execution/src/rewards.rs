//! Pending reward fulfilment.
//!
//! `pending -> confirmed` is a compare-and-swap; delivery runs strictly after
//! the confirmation is durable, so a delivery failure can never double-send.
//! Such a failure moves the reward to `failed` for manual reconciliation and
//! leaves the balance side as it is. The claim still answers with
//! `delivered = false` when that mark itself cannot be written.

use starspin_types::api::RewardClaimView;
use starspin_types::{PendingReward, PrizeDescriptor, RewardStatus, UserId};
use uuid::Uuid;

use crate::{Engine, EngineError};

impl Engine {
    /// Claims `reward_id`, or the user's oldest pending reward when `None`.
    pub async fn claim_pending_reward(
        &self,
        user: UserId,
        reward_id: Option<Uuid>,
        now: u64,
    ) -> Result<RewardClaimView, EngineError> {
        let resource = reward_id.map_or_else(|| "next".to_string(), |id| id.to_string());
        self.guard.admit("reward_claim", user, &resource).await?;
        let lock = self.guard.lock_user(user).await;

        let mut reward = match reward_id {
            Some(id) => {
                let reward = self
                    .store
                    .reward(id)?
                    .filter(|reward| reward.user_id == user)
                    .ok_or(EngineError::NoPendingReward)?;
                if reward.status != RewardStatus::Pending {
                    return Err(EngineError::AlreadyClaimed);
                }
                reward
            }
            None => self
                .store
                .rewards_for_user(user, true)?
                .into_iter()
                .next()
                .ok_or(EngineError::NoPendingReward)?,
        };

        // Wheel gifts are reserved at claim time; case and slot gifts already hold an entry.
        let mut reserved = None;
        if let (PrizeDescriptor::Gift { gift_name }, None) = (&reward.prize, reward.gift_entry_id) {
            let reservation = self
                .store
                .reserve_gift(gift_name)?
                .ok_or_else(|| EngineError::NoGiftAvailable(gift_name.clone()))?;
            reserved = reservation.entry_id();
        }

        match self.store.confirm_reward(reward.id, reserved, now) {
            Ok(true) => {}
            Ok(false) => {
                self.release_gift(user, reserved);
                return Err(EngineError::AlreadyClaimed);
            }
            Err(err) => {
                self.release_gift(user, reserved);
                return Err(err.into());
            }
        }
        reward.status = RewardStatus::Confirmed;
        reward.gift_entry_id = reward.gift_entry_id.or(reserved);
        reward.updated_at = now;
        tracing::info!(
            user_id = user,
            reward_id = %reward.id,
            source = %reward.source,
            "reward confirmed"
        );

        let delivered = match reward.prize.currency_amount() {
            Some((currency, amount)) => self
                .ledger
                .credit(&lock, currency, amount)
                .map(|_| ())
                .map_err(|err| err.to_string()),
            None => self
                .collaborators
                .deliver(&reward)
                .await
                .map_err(|err| err.to_string()),
        };
        let delivered = match delivered {
            Ok(()) => true,
            Err(failure) => {
                tracing::error!(
                    user_id = user,
                    reward_id = %reward.id,
                    failure = %failure,
                    "reward delivery failed, needs manual reconciliation"
                );
                match self
                    .store
                    .fail_reward(reward.id, RewardStatus::Confirmed, &failure, now)
                {
                    Ok(true) => reward.status = RewardStatus::Failed,
                    Ok(false) => tracing::warn!(
                        user_id = user,
                        reward_id = %reward.id,
                        "reward left confirmed; failure mark did not apply"
                    ),
                    Err(err) => tracing::error!(
                        user_id = user,
                        reward_id = %reward.id,
                        error = %err,
                        "failed to mark reward failed"
                    ),
                }
                reward.failure = Some(failure);
                false
            }
        };

        if delivered {
            self.collaborators
                .notify_best_effort(user, &reward_message(&reward))
                .await;
        }

        Ok(RewardClaimView {
            reward,
            delivered,
            balances: self.ledger.balances(user)?,
        })
    }

    /// Rewards in any state, oldest first.
    pub fn list_pending_rewards(&self, user: UserId) -> Result<Vec<PendingReward>, EngineError> {
        Ok(self.store.rewards_for_user(user, false)?)
    }
}

fn reward_message(reward: &PendingReward) -> String {
    match &reward.prize {
        PrizeDescriptor::Gift { gift_name } => format!("Your {gift_name} gift is on its way!"),
        PrizeDescriptor::Stars { amount } => format!("{amount} stars were added to your balance."),
        PrizeDescriptor::Tickets { amount } => {
            format!("{amount} tickets were added to your balance.")
        }
    }
}
