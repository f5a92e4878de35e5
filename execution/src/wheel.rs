//! Pooled raffle: users pay to join, one uniform draw once the pool is full.

use starspin_types::api::{DrawView, JoinView};
use starspin_types::{
    Currency, GameId, PendingReward, RewardSource, UserId, WheelDef, WheelResult, WheelStatus,
};

use crate::guard::UserLock;
use crate::selector::WeightedTable;
use crate::store::JoinResult;
use crate::{Engine, EngineError};

impl Engine {
    fn wheel_def(&self, wheel_id: GameId) -> Result<WheelDef, EngineError> {
        self.store
            .wheel(wheel_id)?
            .ok_or(EngineError::GameNotFound)
    }

    pub async fn join_wheel(
        &self,
        user: UserId,
        wheel_id: GameId,
        now: u64,
    ) -> Result<JoinView, EngineError> {
        self.guard
            .admit("wheel_join", user, &wheel_id.to_string())
            .await?;
        let _wheel_lock = self.guard.lock_wheel(wheel_id).await;
        let lock = self.guard.lock_user(user).await;

        let wheel = self.wheel_def(wheel_id)?;
        if wheel.status != WheelStatus::Active {
            return Err(EngineError::WheelClosed);
        }
        let participants = self.store.wheel_participants(wheel_id)?;
        if participants.contains(&user) {
            return Err(EngineError::AlreadyJoined);
        }
        if participants.len() >= wheel.size as usize {
            return Err(EngineError::PoolFull);
        }
        let player = self.store.user(user)?.ok_or(EngineError::UserNotFound)?;
        if player.tickets < wheel.price {
            return Err(EngineError::InsufficientFunds {
                currency: Currency::Tickets,
                needed: wheel.price,
                available: player.tickets,
            });
        }

        self.ledger.debit(&lock, Currency::Tickets, wheel.price)?;
        let joined = match self
            .store
            .join_wheel(wheel_id, user, now, self.config.wheel_draw_delay_ms)
        {
            Ok(joined) => joined,
            Err(err) => {
                self.refund_entry(&lock, &wheel);
                return Err(err.into());
            }
        };
        let (count, filled) = match joined {
            JoinResult::Joined {
                participants,
                filled,
            } => (participants, filled),
            rejected => {
                self.refund_entry(&lock, &wheel);
                return Err(match rejected {
                    JoinResult::Full => EngineError::PoolFull,
                    JoinResult::AlreadyJoined => EngineError::AlreadyJoined,
                    _ => EngineError::WheelClosed,
                });
            }
        };

        if let Some(referrer) = player.referrer_id.filter(|_| wheel.price > 0) {
            self.referrals.propagate(
                referrer,
                user,
                wheel.price,
                self.config.wheel_referral_bps,
                "wheel",
            );
        }
        tracing::info!(
            user_id = user,
            wheel_id,
            participants = count,
            size = wheel.size,
            filled,
            "wheel joined"
        );

        Ok(JoinView {
            wheel: self.wheel_def(wheel_id)?,
            participants: count,
            filled,
            balances: self.ledger.balances(user)?,
        })
    }

    fn refund_entry(&self, lock: &UserLock, wheel: &WheelDef) {
        if let Err(err) = self.ledger.credit(lock, Currency::Tickets, wheel.price) {
            tracing::error!(
                user_id = lock.user_id(),
                wheel_id = wheel.id,
                price = wheel.price,
                error = %err,
                "wheel entry refund failed"
            );
        }
    }

    /// Draws the winner of a full, active wheel.
    pub async fn draw_wheel(&self, wheel_id: GameId, now: u64) -> Result<DrawView, EngineError> {
        let _wheel_lock = self.guard.lock_wheel(wheel_id).await;
        let wheel = self.wheel_def(wheel_id)?;
        if wheel.status != WheelStatus::Active {
            return Err(EngineError::WheelNotReady);
        }
        let participants = self.store.wheel_participants(wheel_id)?;
        if participants.len() < wheel.size as usize || participants.is_empty() {
            return Err(EngineError::WheelNotReady);
        }

        let draw = self.draw(&WeightedTable::uniform(participants.iter().copied()))?;
        let winner = draw.outcome.ok_or(EngineError::NoCandidates)?;
        let result = WheelResult {
            wheel_id,
            winner_id: winner,
            draw_value: draw.value,
            participants: participants.len() as u32,
            drawn_at: now,
        };
        let mut reward = PendingReward::new(RewardSource::Wheel, winner, wheel.prize.clone(), now);
        reward.wheel_id = Some(wheel_id);
        if !self.store.complete_wheel(&result, &reward)? {
            return Err(EngineError::WheelNotReady);
        }
        tracing::info!(
            wheel_id,
            winner_id = winner,
            draw_value = result.draw_value,
            participants = result.participants,
            reward_id = %reward.id,
            "wheel drawn"
        );

        let collaborators = self.collaborators.clone();
        tokio::spawn(async move {
            for participant in participants {
                let message = if participant == winner {
                    format!("You won wheel #{wheel_id}! Claim your prize in the app.")
                } else {
                    format!("Wheel #{wheel_id} has been drawn. Better luck next time!")
                };
                collaborators
                    .notify_best_effort(participant, &message)
                    .await;
            }
        });

        Ok(DrawView { result, reward })
    }

    /// Draws every filled wheel whose delay has elapsed.
    pub async fn run_due_wheel_draws(&self, now: u64) -> Result<Vec<DrawView>, EngineError> {
        let mut drawn = Vec::new();
        for wheel_id in self.store.due_wheels(now)? {
            match self.draw_wheel(wheel_id, now).await {
                Ok(view) => drawn.push(view),
                // Another caller drew it first.
                Err(EngineError::WheelNotReady) => {}
                Err(err) => {
                    tracing::warn!(wheel_id, error = %err, "scheduled wheel draw failed");
                }
            }
        }
        Ok(drawn)
    }
}
