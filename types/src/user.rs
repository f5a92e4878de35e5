use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Telegram user id.
pub type UserId = i64;

/// Spendable currencies tracked per user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    /// TON-denominated internal tickets (nano units).
    Tickets,
    /// Telegram Stars.
    Stars,
}

crate::text_enum!(Currency {
    Tickets => "tickets",
    Stars => "stars",
});

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub wallet_address: Option<String>,
    pub tickets: u64,
    pub stars: u64,
    pub referral_earnings: u64,
    /// Set once at registration, never rewritten.
    pub referrer_id: Option<UserId>,
    pub daily_attempts: u32,
    /// UTC day number the attempt counter belongs to.
    pub daily_attempts_day: u64,
    pub last_free_spin_at: Option<u64>,
    pub first_deposit_at: Option<u64>,
    pub created_at: u64,
}

impl User {
    pub fn new(id: UserId, referrer_id: Option<UserId>, now: u64) -> Self {
        Self {
            id,
            wallet_address: None,
            tickets: 0,
            stars: 0,
            referral_earnings: 0,
            referrer_id,
            daily_attempts: 0,
            daily_attempts_day: 0,
            last_free_spin_at: None,
            first_deposit_at: None,
            created_at: now,
        }
    }

    pub fn balance(&self, currency: Currency) -> u64 {
        match currency {
            Currency::Tickets => self.tickets,
            Currency::Stars => self.stars,
        }
    }

    pub fn balances(&self) -> Balances {
        Balances {
            tickets: self.tickets,
            stars: self.stars,
            referral_earnings: self.referral_earnings,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    pub tickets: u64,
    pub stars: u64,
    pub referral_earnings: u64,
}

/// A credited top-up, unique per external payment id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub id: Uuid,
    pub user_id: UserId,
    pub currency: Currency,
    pub amount: u64,
    /// Telegram payment charge id or chain transaction hash.
    pub external_id: String,
    pub created_at: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    Pending,
    Completed,
    Failed,
    /// Value left the hot wallet but the balance decrement did not apply.
    SentNeedsManualFix,
}

crate::text_enum!(WithdrawalStatus {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
    SentNeedsManualFix => "sent_needs_manual_fix",
});

/// Referral-earnings payout to the user's wallet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: Uuid,
    pub user_id: UserId,
    pub amount: u64,
    pub address: String,
    pub status: WithdrawalStatus,
    pub transfer_ref: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}
