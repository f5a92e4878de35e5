//! Referral bonus propagation.
//!
//! Best-effort throughout: a failed bonus is logged and dropped, never
//! surfaced to the spender and never retried.

use starspin_types::constants::{BPS_DENOMINATOR, NANO_PER_TICKET};
use starspin_types::UserId;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::collaborators::Collaborators;
use crate::ledger::Ledger;

/// `amount * bps / 10_000`, floored.
pub fn ticket_bonus(amount: u64, bps: u64) -> u64 {
    let bonus = u128::from(amount) * u128::from(bps) / u128::from(BPS_DENOMINATOR);
    u64::try_from(bonus).unwrap_or(u64::MAX)
}

/// Converts a stars spend into ticket units at `stars_per_ton`, then applies `bps`.
pub fn slot_bonus(stars: u64, stars_per_ton: f64, bps: u64) -> u64 {
    if !stars_per_ton.is_finite() || stars_per_ton <= 0.0 {
        return 0;
    }
    let tickets = (stars as f64 / stars_per_ton * NANO_PER_TICKET as f64).floor();
    if !tickets.is_finite() || tickets <= 0.0 {
        return 0;
    }
    let tickets = if tickets >= u64::MAX as f64 {
        u64::MAX
    } else {
        tickets as u64
    };
    ticket_bonus(tickets, bps)
}

#[derive(Clone)]
pub struct Referrals {
    ledger: Ledger,
    collaborators: Arc<Collaborators>,
}

impl Referrals {
    pub fn new(ledger: Ledger, collaborators: Arc<Collaborators>) -> Self {
        Self {
            ledger,
            collaborators,
        }
    }

    /// Credits `ticket_bonus(amount, bps)` to `referrer`.
    pub fn propagate(
        &self,
        referrer: UserId,
        spender: UserId,
        amount: u64,
        bps: u64,
        source: &str,
    ) {
        let bonus = ticket_bonus(amount, bps);
        self.credit(referrer, spender, bonus, source);
    }

    /// Credits the stars-converted bonus; the exchange-rate lookup may fail.
    pub async fn propagate_stars(
        &self,
        referrer: UserId,
        spender: UserId,
        stars: u64,
        bps: u64,
        source: &str,
    ) {
        let rate = match self.collaborators.stars_per_ton().await {
            Ok(rate) => rate,
            Err(err) => {
                tracing::warn!(
                    referrer_id = referrer,
                    user_id = spender,
                    source,
                    error = %err,
                    "exchange rate unavailable, referral bonus dropped"
                );
                return;
            }
        };
        self.credit(referrer, spender, slot_bonus(stars, rate, bps), source);
    }

    fn credit(&self, referrer: UserId, spender: UserId, bonus: u64, source: &str) {
        if bonus == 0 {
            return;
        }
        match self.ledger.credit_referral(referrer, bonus) {
            Ok(earnings) => {
                tracing::info!(
                    referrer_id = referrer,
                    user_id = spender,
                    source,
                    bonus,
                    earnings,
                    "referral bonus credited"
                );
            }
            Err(err) => {
                tracing::warn!(
                    referrer_id = referrer,
                    user_id = spender,
                    source,
                    bonus,
                    error = %err,
                    "referral bonus failed"
                );
            }
        }
    }

    /// Runs [`Referrals::propagate`] off the request path.
    pub fn spawn(
        &self,
        referrer: UserId,
        spender: UserId,
        amount: u64,
        bps: u64,
        source: &'static str,
    ) -> JoinHandle<()> {
        let referrals = self.clone();
        tokio::spawn(async move {
            referrals.propagate(referrer, spender, amount, bps, source);
        })
    }

    /// Runs [`Referrals::propagate_stars`] off the request path.
    pub fn spawn_stars(
        &self,
        referrer: UserId,
        spender: UserId,
        stars: u64,
        bps: u64,
        source: &'static str,
    ) -> JoinHandle<()> {
        let referrals = self.clone();
        tokio::spawn(async move {
            referrals.propagate_stars(referrer, spender, stars, bps, source).await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_bonus_is_floored_percentage() {
        assert_eq!(ticket_bonus(1_000, 1_000), 100);
        assert_eq!(ticket_bonus(999, 1_000), 99);
        assert_eq!(ticket_bonus(9, 1_000), 0);
        assert_eq!(ticket_bonus(u64::MAX, 10_000), u64::MAX);
    }

    #[test]
    fn slot_bonus_converts_through_rate() {
        // 100 stars at 200 stars per TON is half a ticket; 5% of that.
        assert_eq!(slot_bonus(100, 200.0, 500), 25_000_000);
        assert_eq!(slot_bonus(100, 0.0, 500), 0);
        assert_eq!(slot_bonus(100, f64::NAN, 500), 0);
        assert_eq!(slot_bonus(0, 200.0, 500), 0);
    }
}
