//! Query interface over the transactional relational store.
//!
//! Every mutation is either an insert guarded by a unique constraint
//! (reported as [`StoreError::Duplicate`]) or a condition-qualified update that
//! reports whether a row was affected. Callers treat `Ok(false)` / `Ok(None)`
//! from a conditional update as "somebody else got there first".

use starspin_types::{
    CaseDef, Currency, Deposit, GameId, GiftReservation, PendingReward, Period, RewardStatus,
    Run, ScoreRow, SlotDef, SpinRecord, SpinStatus, User, UserId, WheelDef, WheelResult,
    Withdrawal, WithdrawalStatus,
};
use thiserror::Error;
use uuid::Uuid;

mod sqlite;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the insert.
    #[error("duplicate {0}")]
    Duplicate(&'static str),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Result of the atomic "insert participant if there is room" statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinResult {
    Joined { participants: u32, filled: bool },
    Full,
    AlreadyJoined,
    Closed,
}

pub trait Store: Send + Sync {
    // Users
    fn insert_user(&self, user: &User) -> Result<(), StoreError>;
    fn user(&self, id: UserId) -> Result<Option<User>, StoreError>;
    fn set_wallet(&self, id: UserId, address: &str) -> Result<bool, StoreError>;
    /// Decrements only if the balance covers `amount`; returns the new balance.
    fn debit(&self, id: UserId, currency: Currency, amount: u64)
        -> Result<Option<u64>, StoreError>;
    fn credit(&self, id: UserId, currency: Currency, amount: u64)
        -> Result<Option<u64>, StoreError>;
    fn credit_referral(&self, id: UserId, amount: u64) -> Result<Option<u64>, StoreError>;
    /// Decrements referral earnings only if they cover `amount`.
    fn debit_referral(&self, id: UserId, amount: u64) -> Result<bool, StoreError>;
    /// Advances the free-spin stamp only if it still equals `previous`.
    fn stamp_free_spin(
        &self,
        id: UserId,
        previous: Option<u64>,
        now: u64,
    ) -> Result<bool, StoreError>;
    /// Consumes one attempt for `day`, resetting the counter on a new day.
    /// Returns the attempts used so far, or `None` once `limit` is reached.
    fn consume_daily_attempt(
        &self,
        id: UserId,
        day: u64,
        limit: u32,
    ) -> Result<Option<u32>, StoreError>;

    // Deposits
    /// Inserts the deposit and credits it in one transaction.
    fn apply_deposit(&self, deposit: &Deposit) -> Result<u64, StoreError>;

    // Game definitions
    fn insert_case(&self, case: &CaseDef) -> Result<(), StoreError>;
    fn case(&self, id: GameId) -> Result<Option<CaseDef>, StoreError>;
    fn insert_slot(&self, slot: &SlotDef) -> Result<(), StoreError>;
    fn slot(&self, id: GameId) -> Result<Option<SlotDef>, StoreError>;

    // Spins
    fn insert_spin(&self, spin: &SpinRecord) -> Result<(), StoreError>;
    fn spin(&self, id: Uuid) -> Result<Option<SpinRecord>, StoreError>;
    fn spin_by_key(&self, key: &str) -> Result<Option<SpinRecord>, StoreError>;
    fn transition_spin(
        &self,
        id: Uuid,
        from: SpinStatus,
        to: SpinStatus,
        now: u64,
    ) -> Result<bool, StoreError>;
    /// Moves the spin `from -> reward_sent` and records `reward` atomically.
    fn settle_spin_reward(
        &self,
        spin_id: Uuid,
        from: SpinStatus,
        reward: &PendingReward,
    ) -> Result<bool, StoreError>;

    // Gift pools
    fn insert_gift_pool(&self, gift_name: &str, infinite: bool) -> Result<(), StoreError>;
    fn insert_gift_entry(&self, gift_name: &str, number: u64) -> Result<i64, StoreError>;
    /// Marks one unused entry as used; `None` when the pool is exhausted or unknown.
    fn reserve_gift(&self, gift_name: &str) -> Result<Option<GiftReservation>, StoreError>;
    fn release_gift(&self, entry_id: i64) -> Result<bool, StoreError>;
    fn available_gifts(&self, gift_name: &str) -> Result<u64, StoreError>;

    // Pending rewards
    fn insert_reward(&self, reward: &PendingReward) -> Result<(), StoreError>;
    fn reward(&self, id: Uuid) -> Result<Option<PendingReward>, StoreError>;
    /// Oldest first.
    fn rewards_for_user(
        &self,
        user: UserId,
        pending_only: bool,
    ) -> Result<Vec<PendingReward>, StoreError>;
    /// `pending -> confirmed`, recording the gift entry taken at claim time.
    fn confirm_reward(
        &self,
        id: Uuid,
        gift_entry_id: Option<i64>,
        now: u64,
    ) -> Result<bool, StoreError>;
    /// `from -> failed`, refused unless `from` may fail.
    fn fail_reward(
        &self,
        id: Uuid,
        from: RewardStatus,
        failure: &str,
        now: u64,
    ) -> Result<bool, StoreError>;

    // Wheels
    fn insert_wheel(&self, wheel: &WheelDef) -> Result<(), StoreError>;
    fn wheel(&self, id: GameId) -> Result<Option<WheelDef>, StoreError>;
    fn wheel_participants(&self, id: GameId) -> Result<Vec<UserId>, StoreError>;
    /// Adds `user` while the wheel is active and below capacity; the filling
    /// join stamps `filled_at` and `draw_at = now + draw_delay_ms`.
    fn join_wheel(
        &self,
        id: GameId,
        user: UserId,
        now: u64,
        draw_delay_ms: u64,
    ) -> Result<JoinResult, StoreError>;
    /// `active -> completed`, recording the result and the winner's reward.
    fn complete_wheel(
        &self,
        result: &WheelResult,
        reward: &PendingReward,
    ) -> Result<bool, StoreError>;
    fn due_wheels(&self, now: u64) -> Result<Vec<GameId>, StoreError>;

    // Withdrawals
    fn insert_withdrawal(&self, withdrawal: &Withdrawal) -> Result<(), StoreError>;
    fn withdrawal(&self, id: Uuid) -> Result<Option<Withdrawal>, StoreError>;
    fn update_withdrawal(
        &self,
        id: Uuid,
        status: WithdrawalStatus,
        transfer_ref: Option<&str>,
        now: u64,
    ) -> Result<bool, StoreError>;

    // Run2048
    fn insert_period(&self, starts_at: u64, ends_at: u64) -> Result<Period, StoreError>;
    fn period(&self, id: i64) -> Result<Option<Period>, StoreError>;
    fn active_period(&self, now: u64) -> Result<Option<Period>, StoreError>;
    fn insert_run(&self, run: &Run) -> Result<(), StoreError>;
    fn run(&self, id: Uuid) -> Result<Option<Run>, StoreError>;
    fn finish_run(&self, id: Uuid, user: UserId, score: u64, now: u64)
        -> Result<bool, StoreError>;
    /// Finalizes every active period ended by `now` in one transaction:
    /// expires its active runs, snapshots best scores, opens the successor.
    /// Opens a first period at `now` when none exists.
    fn rollover_periods(&self, now: u64, period_ms: u64) -> Result<Vec<Period>, StoreError>;
    /// Snapshot written at finalization, best first.
    fn weekly_scores(&self, period_id: i64, limit: u32) -> Result<Vec<ScoreRow>, StoreError>;
    /// Best finished score per user for a period still in progress, best first.
    fn live_scores(&self, period_id: i64, limit: u32) -> Result<Vec<ScoreRow>, StoreError>;
}
