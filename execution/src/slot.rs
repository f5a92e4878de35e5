//! Slot engine: static lookup table over the Telegram slot-machine dice.

use starspin_types::api::{ClaimView, SpinView};
use starspin_types::constants::{SLOT_FACES, SLOT_JACKPOT, SLOT_TRIPLES};
use starspin_types::{
    Currency, PendingReward, PrizeDescriptor, RewardSource, SlotDef, SpinKind, SpinRecord,
    SpinStatus, UserId,
};
use uuid::Uuid;

use crate::selector::LookupTable;
use crate::spin::{Admission, SpinRequest};
use crate::{Engine, EngineError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlotPayout {
    Jackpot(PrizeDescriptor),
    /// Stars for a non-jackpot triple.
    Triple(u64),
}

/// Face 64 pays the slot prize, the other triples pay `triple_payout` stars.
pub fn slot_table(slot: &SlotDef) -> LookupTable<SlotPayout> {
    let mut entries = vec![(SLOT_JACKPOT, SlotPayout::Jackpot(slot.prize.clone()))];
    if slot.triple_payout > 0 {
        entries.extend(
            SLOT_TRIPLES
                .iter()
                .map(|face| (*face, SlotPayout::Triple(slot.triple_payout))),
        );
    }
    LookupTable::new(SLOT_FACES, entries)
}

impl Engine {
    pub async fn spin_slot(&self, request: SpinRequest, now: u64) -> Result<SpinView, EngineError> {
        if request.free {
            return Err(EngineError::FreeSpinUnavailable);
        }
        let key = match self.admit_spin(SpinKind::Slot, &request).await? {
            Admission::Replay(spin) => return self.replayed(spin),
            Admission::Fresh(key) => key,
        };
        let lock = self.guard.lock_user(request.user_id).await;
        if let Some(spin) = self.settled_spin(&key, SpinKind::Slot, &request)? {
            return self.replayed(spin);
        }

        let slot = self
            .store
            .slot(request.game_id)?
            .filter(|slot| slot.active)
            .ok_or(EngineError::GameNotFound)?;
        let table = slot_table(&slot);
        let user = self
            .store
            .user(request.user_id)?
            .ok_or(EngineError::UserNotFound)?;
        if user.stars < slot.price {
            return Err(EngineError::InsufficientFunds {
                currency: Currency::Stars,
                needed: slot.price,
                available: user.stars,
            });
        }
        self.ledger.debit(&lock, Currency::Stars, slot.price)?;

        let draw = self.draw(&table)?;
        let (status, prize) = match draw.outcome {
            Some(SlotPayout::Jackpot(prize)) if prize.gift_name().is_some() => {
                (SpinStatus::WinGift, Some(prize))
            }
            Some(SlotPayout::Jackpot(prize)) => (SpinStatus::WinStars, Some(prize)),
            Some(SlotPayout::Triple(amount)) => {
                (SpinStatus::WinStars, Some(PrizeDescriptor::Stars { amount }))
            }
            None => (SpinStatus::Lose, None),
        };
        let spin = SpinRecord {
            id: Uuid::new_v4(),
            kind: SpinKind::Slot,
            game_id: slot.id,
            user_id: user.id,
            item_id: None,
            payout_value: prize
                .as_ref()
                .and_then(PrizeDescriptor::currency_amount)
                .map_or(0, |(_, amount)| amount),
            prize,
            draw_value: draw.value,
            weight_total: draw.total,
            price_paid: slot.price,
            currency: Currency::Stars,
            free: false,
            status,
            idempotency_key: key,
            created_at: now,
            updated_at: now,
        };
        if let Some(previous) =
            self.record_spin(&lock, &spin, &request, Some((Currency::Stars, slot.price)))?
        {
            return self.replayed(previous);
        }

        if let Some((currency, amount)) = spin
            .prize
            .as_ref()
            .and_then(PrizeDescriptor::currency_amount)
        {
            self.ledger.credit(&lock, currency, amount)?;
        }
        tracing::info!(
            user_id = user.id,
            slot_id = slot.id,
            spin_id = %spin.id,
            status = %spin.status,
            dice = spin.draw_value,
            "slot spin settled"
        );

        if let Some(referrer) = user.referrer_id.filter(|_| slot.price > 0) {
            self.referrals.spawn_stars(
                referrer,
                user.id,
                slot.price,
                self.config.slot_referral_bps,
                "slot",
            );
        }

        Ok(SpinView {
            balances: self.ledger.balances(user.id)?,
            spin,
            replayed: false,
        })
    }

    /// Pays the withdrawal fee, reserves the gift and creates the pending
    /// reward. Partial work is compensated in reverse order.
    pub async fn withdraw_slot_gift(
        &self,
        user: UserId,
        spin_id: Uuid,
        now: u64,
    ) -> Result<ClaimView, EngineError> {
        self.guard
            .admit("slot_withdraw", user, &spin_id.to_string())
            .await?;
        let lock = self.guard.lock_user(user).await;
        let mut spin = self
            .store
            .spin(spin_id)?
            .filter(|spin| spin.user_id == user && spin.kind == SpinKind::Slot)
            .ok_or(EngineError::SpinNotFound)?;
        if spin.status != SpinStatus::WinGift {
            return Err(EngineError::WrongStatus {
                expected: SpinStatus::WinGift,
                found: spin.status,
            });
        }
        let prize = spin
            .prize
            .clone()
            .ok_or_else(|| EngineError::InvalidInput("spin has no prize".into()))?;
        let gift_name = prize
            .gift_name()
            .ok_or_else(|| EngineError::InvalidInput("spin prize is not a gift".into()))?
            .to_string();

        let fee = self.config.slot_withdraw_fee_stars;
        self.ledger.debit(&lock, Currency::Stars, fee)?;
        let refund_fee = || {
            if let Err(err) = self.ledger.credit(&lock, Currency::Stars, fee) {
                tracing::error!(
                    user_id = user,
                    spin_id = %spin_id,
                    fee,
                    error = %err,
                    "withdrawal fee refund failed"
                );
            }
        };

        let reservation = match self.store.reserve_gift(&gift_name) {
            Ok(Some(reservation)) => reservation,
            Ok(None) => {
                refund_fee();
                return Err(EngineError::NoGiftAvailable(gift_name));
            }
            Err(err) => {
                refund_fee();
                return Err(err.into());
            }
        };

        let mut reward = PendingReward::new(RewardSource::Slot, user, prize, now);
        reward.spin_id = Some(spin.id);
        reward.gift_entry_id = reservation.entry_id();
        let settled = self
            .store
            .settle_spin_reward(spin.id, SpinStatus::WinGift, &reward);
        if !matches!(settled, Ok(true)) {
            self.release_gift(user, reward.gift_entry_id);
            refund_fee();
            if let Err(err) = settled {
                return Err(err.into());
            }
            return Err(EngineError::WrongStatus {
                expected: SpinStatus::WinGift,
                found: self
                    .store
                    .spin(spin.id)?
                    .ok_or(EngineError::SpinNotFound)?
                    .status,
            });
        }
        spin.status = SpinStatus::RewardSent;
        spin.updated_at = now;
        tracing::info!(
            user_id = user,
            spin_id = %spin.id,
            reward_id = %reward.id,
            fee,
            "slot gift withdrawn"
        );

        Ok(ClaimView {
            spin,
            reward,
            balances: self.ledger.balances(user)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::Selector;

    fn slot(triple_payout: u64) -> SlotDef {
        SlotDef {
            id: 1,
            name: "classic".into(),
            price: 10,
            active: true,
            prize: PrizeDescriptor::Gift {
                gift_name: "bear".into(),
            },
            triple_payout,
        }
    }

    #[test]
    fn table_maps_dice_faces() {
        let table = slot_table(&slot(5));
        assert!(matches!(table.resolve(64.0), Some(SlotPayout::Jackpot(_))));
        for face in SLOT_TRIPLES {
            assert_eq!(table.resolve(f64::from(face)), Some(SlotPayout::Triple(5)));
        }
        assert_eq!(table.resolve(2.0), None);
        assert_eq!(table.total(), 64.0);
    }

    #[test]
    fn zero_triple_payout_loses() {
        let table = slot_table(&slot(0));
        assert_eq!(table.resolve(22.0), None);
    }
}
