//! Response DTOs, one per externally visible operation.
//!
//! Serialized as `{"operation": "...", ...}` so clients can dispatch on the
//! operation name and the contract is checked at compile time.

use serde::{Deserialize, Serialize};

use crate::game::{WheelDef, WheelResult};
use crate::reward::PendingReward;
use crate::run::{LeaderboardEntry, Run};
use crate::spin::SpinRecord;
use crate::user::{Balances, UserId, Withdrawal, WithdrawalStatus};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserView {
    pub user_id: UserId,
    pub wallet_address: Option<String>,
    pub referrer_id: Option<UserId>,
    pub balances: Balances,
    pub free_spin_available: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepositView {
    pub balances: Balances,
    /// The external id was seen before; nothing was credited this time.
    pub already_processed: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpinView {
    pub spin: SpinRecord,
    pub balances: Balances,
    /// Served from an earlier request with the same idempotency key.
    pub replayed: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClaimView {
    pub spin: SpinRecord,
    pub reward: PendingReward,
    pub balances: Balances,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RerollView {
    pub spin: SpinRecord,
    pub credited: u64,
    pub balances: Balances,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JoinView {
    pub wheel: WheelDef,
    pub participants: u32,
    pub filled: bool,
    pub balances: Balances,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DrawView {
    pub result: WheelResult,
    pub reward: PendingReward,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RewardClaimView {
    pub reward: PendingReward,
    pub delivered: bool,
    pub balances: Balances,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalView {
    pub withdrawal: Withdrawal,
    pub status: WithdrawalStatus,
    pub balances: Balances,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardView {
    pub period_id: i64,
    pub finalized: bool,
    pub entries: Vec<LeaderboardEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Response {
    Register(UserView),
    SetWallet(UserView),
    Me(UserView),
    Deposit(DepositView),
    CaseSpin(SpinView),
    SlotSpin(SpinView),
    ClaimPrize(ClaimView),
    RerollPrize(RerollView),
    WithdrawSlotGift(ClaimView),
    JoinWheel(JoinView),
    DrawWheel(DrawView),
    ClaimPendingReward(RewardClaimView),
    ListRewards { rewards: Vec<PendingReward> },
    WithdrawReferral(WithdrawalView),
    StartRun(Run),
    FinishRun(Run),
    Leaderboard(LeaderboardView),
}
