use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::{GameId, PrizeDescriptor};
use crate::user::{Currency, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpinKind {
    Case,
    Slot,
}

crate::text_enum!(SpinKind {
    Case => "case",
    Slot => "slot",
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpinStatus {
    /// Case gift awaiting claim or reroll.
    Won,
    Lose,
    /// Currency prize already credited.
    WinStars,
    /// Slot gift awaiting withdrawal.
    WinGift,
    /// Prize converted into tickets.
    Reroll,
    /// Prize handed to pending-reward fulfilment.
    RewardSent,
}

crate::text_enum!(SpinStatus {
    Won => "won",
    Lose => "lose",
    WinStars => "win_stars",
    WinGift => "win_gift",
    Reroll => "reroll",
    RewardSent => "reward_sent",
});

impl SpinStatus {
    /// Statuses only move forward: an open prize may be sent or rerolled once.
    pub fn can_transition_to(&self, next: SpinStatus) -> bool {
        matches!(
            (self, next),
            (SpinStatus::Won, SpinStatus::RewardSent)
                | (SpinStatus::Won, SpinStatus::Reroll)
                | (SpinStatus::WinGift, SpinStatus::RewardSent)
        )
    }
}

/// Settled spin. Immutable apart from the forward status transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpinRecord {
    pub id: Uuid,
    pub kind: SpinKind,
    pub game_id: GameId,
    pub user_id: UserId,
    /// Chosen case item; `None` for slots and for "no win" draws.
    pub item_id: Option<i64>,
    pub prize: Option<PrizeDescriptor>,
    /// Tickets credited on reroll.
    pub payout_value: u64,
    pub draw_value: f64,
    pub weight_total: f64,
    pub price_paid: u64,
    pub currency: Currency,
    pub free: bool,
    pub status: SpinStatus,
    pub idempotency_key: String,
    pub created_at: u64,
    pub updated_at: u64,
}
