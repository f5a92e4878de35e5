//! Case-opening engine: weighted draw over the case's items.

use starspin_types::api::{ClaimView, RerollView, SpinView};
use starspin_types::{
    CaseItem, Currency, ItemKind, PendingReward, RewardSource, SpinKind, SpinRecord, SpinStatus,
    User, UserId,
};
use uuid::Uuid;

use crate::guard::UserLock;
use crate::selector::WeightedTable;
use crate::spin::{Admission, SpinRequest};
use crate::{Engine, EngineError};

fn status_for(item: Option<&CaseItem>) -> SpinStatus {
    match item.map(|item| item.kind) {
        Some(ItemKind::Stars) => SpinStatus::WinStars,
        Some(ItemKind::Gift) => SpinStatus::Won,
        Some(ItemKind::Lose) | None => SpinStatus::Lose,
    }
}

impl Engine {
    /// Whether `user` may spin a case for free at `now`.
    pub fn free_spin_available(&self, user: &User, now: u64) -> bool {
        if user.first_deposit_at.is_none() {
            return false;
        }
        match user.last_free_spin_at {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.config.free_spin_cooldown_ms,
        }
    }

    pub async fn spin_case(&self, request: SpinRequest, now: u64) -> Result<SpinView, EngineError> {
        let key = match self.admit_spin(SpinKind::Case, &request).await? {
            Admission::Replay(spin) => return self.replayed(spin),
            Admission::Fresh(key) => key,
        };
        let lock = self.guard.lock_user(request.user_id).await;
        if let Some(spin) = self.settled_spin(&key, SpinKind::Case, &request)? {
            return self.replayed(spin);
        }

        let case = self
            .store
            .case(request.game_id)?
            .filter(|case| case.active)
            .ok_or(EngineError::GameNotFound)?;
        let table = WeightedTable::new(
            case.items
                .iter()
                .map(|item| (item.clone(), item.weight))
                .collect(),
        );
        if !table.is_eligible() {
            return Err(EngineError::NoCandidates);
        }
        let user = self
            .store
            .user(request.user_id)?
            .ok_or(EngineError::UserNotFound)?;

        let price = if request.free {
            self.take_free_spin(&user, request.game_id, now)?;
            0
        } else {
            if user.tickets < case.price {
                return Err(EngineError::InsufficientFunds {
                    currency: Currency::Tickets,
                    needed: case.price,
                    available: user.tickets,
                });
            }
            self.ledger.debit(&lock, Currency::Tickets, case.price)?;
            case.price
        };

        let draw = self.draw(&table)?;
        let item = draw.outcome.as_ref();
        let status = status_for(item);
        let spin = SpinRecord {
            id: Uuid::new_v4(),
            kind: SpinKind::Case,
            game_id: case.id,
            user_id: user.id,
            item_id: item.map(|item| item.id),
            prize: item.and_then(CaseItem::prize),
            payout_value: item.map_or(0, |item| item.payout_value),
            draw_value: draw.value,
            weight_total: draw.total,
            price_paid: price,
            currency: Currency::Tickets,
            free: request.free,
            status,
            idempotency_key: key,
            created_at: now,
            updated_at: now,
        };
        if let Some(previous) =
            self.record_spin(&lock, &spin, &request, Some((Currency::Tickets, price)))?
        {
            return self.replayed(previous);
        }

        if status == SpinStatus::WinStars {
            self.ledger
                .credit(&lock, Currency::Stars, spin.payout_value)?;
        }
        tracing::info!(
            user_id = user.id,
            case_id = case.id,
            spin_id = %spin.id,
            status = %spin.status,
            draw_value = spin.draw_value,
            weight_total = spin.weight_total,
            free = spin.free,
            "case spin settled"
        );

        if let Some(referrer) = user.referrer_id.filter(|_| price > 0) {
            self.referrals.spawn(
                referrer,
                user.id,
                price,
                self.config.case_referral_bps,
                "case",
            );
        }

        Ok(SpinView {
            balances: self.ledger.balances(user.id)?,
            spin,
            replayed: false,
        })
    }

    fn take_free_spin(&self, user: &User, case_id: i64, now: u64) -> Result<(), EngineError> {
        if self
            .config
            .free_case_id
            .is_some_and(|free_case| free_case != case_id)
        {
            return Err(EngineError::FreeSpinUnavailable);
        }
        if !self.free_spin_available(user, now) {
            return Err(EngineError::FreeSpinUnavailable);
        }
        if !self
            .store
            .stamp_free_spin(user.id, user.last_free_spin_at, now)?
        {
            return Err(EngineError::FreeSpinUnavailable);
        }
        Ok(())
    }

    fn open_case_spin(
        &self,
        lock: &UserLock,
        spin_id: Uuid,
    ) -> Result<SpinRecord, EngineError> {
        let spin = self
            .store
            .spin(spin_id)?
            .filter(|spin| spin.user_id == lock.user_id() && spin.kind == SpinKind::Case)
            .ok_or(EngineError::SpinNotFound)?;
        if spin.status != SpinStatus::Won {
            return Err(EngineError::WrongStatus {
                expected: SpinStatus::Won,
                found: spin.status,
            });
        }
        Ok(spin)
    }

    fn current_status(&self, spin_id: Uuid) -> Result<SpinStatus, EngineError> {
        Ok(self
            .store
            .spin(spin_id)?
            .ok_or(EngineError::SpinNotFound)?
            .status)
    }

    /// Reserves the won gift and hands it to pending-reward fulfilment.
    pub async fn claim_prize(
        &self,
        user: UserId,
        spin_id: Uuid,
        now: u64,
    ) -> Result<ClaimView, EngineError> {
        self.guard
            .admit("claim_prize", user, &spin_id.to_string())
            .await?;
        let lock = self.guard.lock_user(user).await;
        let mut spin = self.open_case_spin(&lock, spin_id)?;
        let prize = spin
            .prize
            .clone()
            .ok_or_else(|| EngineError::InvalidInput("spin has no prize".into()))?;

        let mut reward = PendingReward::new(RewardSource::Case, user, prize.clone(), now);
        reward.spin_id = Some(spin.id);
        if let Some(gift_name) = prize.gift_name() {
            let reservation = self
                .store
                .reserve_gift(gift_name)?
                .ok_or_else(|| EngineError::NoGiftAvailable(gift_name.to_string()))?;
            reward.gift_entry_id = reservation.entry_id();
        }

        match self
            .store
            .settle_spin_reward(spin.id, SpinStatus::Won, &reward)
        {
            Ok(true) => {}
            Ok(false) => {
                self.release_gift(user, reward.gift_entry_id);
                return Err(EngineError::WrongStatus {
                    expected: SpinStatus::Won,
                    found: self.current_status(spin.id)?,
                });
            }
            Err(err) => {
                self.release_gift(user, reward.gift_entry_id);
                return Err(err.into());
            }
        }
        spin.status = SpinStatus::RewardSent;
        spin.updated_at = now;
        tracing::info!(
            user_id = user,
            spin_id = %spin.id,
            reward_id = %reward.id,
            gift_entry_id = reward.gift_entry_id,
            "case prize claimed"
        );

        Ok(ClaimView {
            spin,
            reward,
            balances: self.ledger.balances(user)?,
        })
    }

    /// Converts a won gift into its ticket value.
    pub async fn reroll_prize(
        &self,
        user: UserId,
        spin_id: Uuid,
        now: u64,
    ) -> Result<RerollView, EngineError> {
        self.guard
            .admit("reroll_prize", user, &spin_id.to_string())
            .await?;
        let lock = self.guard.lock_user(user).await;
        let mut spin = self.open_case_spin(&lock, spin_id)?;
        if !self
            .store
            .transition_spin(spin.id, SpinStatus::Won, SpinStatus::Reroll, now)?
        {
            return Err(EngineError::WrongStatus {
                expected: SpinStatus::Won,
                found: self.current_status(spin.id)?,
            });
        }
        self.ledger
            .credit(&lock, Currency::Tickets, spin.payout_value)?;
        spin.status = SpinStatus::Reroll;
        spin.updated_at = now;
        tracing::info!(
            user_id = user,
            spin_id = %spin.id,
            credited = spin.payout_value,
            "case prize rerolled"
        );

        Ok(RerollView {
            credited: spin.payout_value,
            balances: self.ledger.balances(user)?,
            spin,
        })
    }
}
