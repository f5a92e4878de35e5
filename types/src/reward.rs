use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::{GameId, PrizeDescriptor};
use crate::user::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardSource {
    Case,
    Slot,
    Wheel,
}

crate::text_enum!(RewardSource {
    Case => "case",
    Slot => "slot",
    Wheel => "wheel",
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardStatus {
    Pending,
    Confirmed,
    /// Confirmed but delivery failed; needs manual reconciliation.
    Failed,
}

crate::text_enum!(RewardStatus {
    Pending => "pending",
    Confirmed => "confirmed",
    Failed => "failed",
});

impl RewardStatus {
    pub fn can_transition_to(&self, next: RewardStatus) -> bool {
        matches!(
            (self, next),
            (RewardStatus::Pending, RewardStatus::Confirmed)
                | (RewardStatus::Pending, RewardStatus::Failed)
                | (RewardStatus::Confirmed, RewardStatus::Failed)
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingReward {
    pub id: Uuid,
    pub source: RewardSource,
    pub user_id: UserId,
    pub spin_id: Option<Uuid>,
    pub wheel_id: Option<GameId>,
    pub prize: PrizeDescriptor,
    /// Reserved gift-pool entry, if the pool is finite and one was taken.
    pub gift_entry_id: Option<i64>,
    pub status: RewardStatus,
    pub failure: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl PendingReward {
    pub fn new(source: RewardSource, user_id: UserId, prize: PrizeDescriptor, now: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            user_id,
            spin_id: None,
            wheel_id: None,
            prize,
            gift_entry_id: None,
            status: RewardStatus::Pending,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Outcome of taking one unit from a gift pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GiftReservation {
    Entry { id: i64, number: u64 },
    /// Infinite pools are never consumed.
    Infinite,
}

impl GiftReservation {
    pub fn entry_id(&self) -> Option<i64> {
        match self {
            GiftReservation::Entry { id, .. } => Some(*id),
            GiftReservation::Infinite => None,
        }
    }
}
