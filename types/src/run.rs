//! Run2048 leaderboard periods.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::user::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodStatus {
    Active,
    Finalized,
}

crate::text_enum!(PeriodStatus {
    Active => "active",
    Finalized => "finalized",
});

/// Scoring window `[starts_at, ends_at)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub id: i64,
    pub starts_at: u64,
    pub ends_at: u64,
    pub status: PeriodStatus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Active,
    Finished,
    /// Still active when its period was finalized.
    Expired,
}

crate::text_enum!(RunStatus {
    Active => "active",
    Finished => "finished",
    Expired => "expired",
});

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub period_id: i64,
    pub user_id: UserId,
    pub score: u64,
    pub status: RunStatus,
    pub started_at: u64,
    pub finished_at: Option<u64>,
}

/// Best score of one user within a period.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRow {
    pub user_id: UserId,
    pub best_score: u64,
    pub achieved_at: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 1-based competition rank; equal scores share a rank.
    pub rank: u32,
    pub user_id: UserId,
    pub score: u64,
}
