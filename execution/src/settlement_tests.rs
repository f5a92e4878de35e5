use starspin_types::constants::{DAY_MS, NANO_PER_TICKET};
use starspin_types::{
    Currency, ItemKind, PeriodStatus, PrizeDescriptor, RewardSource, RewardStatus, RunStatus,
    SpinKind, SpinRecord, SpinStatus, WheelStatus, WithdrawalStatus,
};
use uuid::Uuid;

use crate::mocks::{eventually, gift, gift_item, item, Harness};
use crate::{EngineConfig, EngineError, SpinRequest, Store};

const USER: i64 = 3001;
const REFERRER: i64 = 3000;

async fn won_gift_spin(harness: &Harness, gift_name: &str) -> Uuid {
    harness.user(USER, 100, 0, None);
    harness.case(1, 10, vec![gift_item(1, gift_name, 1.0, 40)]);
    let view = harness
        .engine
        .spin_case(SpinRequest::new(USER, 1), 1_000)
        .await
        .unwrap();
    assert_eq!(view.spin.status, SpinStatus::Won);
    view.spin.id
}

fn slot_gift_spin(harness: &Harness, gift_name: &str) -> Uuid {
    let spin = SpinRecord {
        id: Uuid::new_v4(),
        kind: SpinKind::Slot,
        game_id: 9,
        user_id: USER,
        item_id: None,
        prize: Some(gift(gift_name)),
        payout_value: 0,
        draw_value: 64.0,
        weight_total: 64.0,
        price_paid: 10,
        currency: Currency::Stars,
        free: false,
        status: SpinStatus::WinGift,
        idempotency_key: format!("slot-{gift_name}"),
        created_at: 1_000,
        updated_at: 1_000,
    };
    harness.store.insert_spin(&spin).unwrap();
    spin.id
}

#[tokio::test]
async fn empty_gift_pool_keeps_spin_claimable() {
    let harness = Harness::new();
    harness.store.insert_gift_pool("bear", false).unwrap();
    let spin_id = won_gift_spin(&harness, "bear").await;

    let err = harness
        .engine
        .claim_prize(USER, spin_id, 2_000)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NoGiftAvailable(ref name) if name == "bear"));
    let spin = harness.store.spin(spin_id).unwrap().unwrap();
    assert_eq!(spin.status, SpinStatus::Won);
    assert!(harness.store.rewards_for_user(USER, false).unwrap().is_empty());

    harness.store.insert_gift_entry("bear", 17).unwrap();
    let claimed = harness
        .engine
        .claim_prize(USER, spin_id, 3_000)
        .await
        .unwrap();
    assert_eq!(claimed.spin.status, SpinStatus::RewardSent);
    assert_eq!(claimed.reward.status, RewardStatus::Pending);
    assert_eq!(claimed.reward.source, RewardSource::Case);
    assert!(claimed.reward.gift_entry_id.is_some());
    assert_eq!(harness.store.available_gifts("bear").unwrap(), 0);

    let err = harness
        .engine
        .claim_prize(USER, spin_id, 4_000)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::WrongStatus {
            found: SpinStatus::RewardSent,
            ..
        }
    ));
}

#[tokio::test]
async fn reroll_converts_gift_to_tickets_once() {
    let harness = Harness::new();
    harness.gifts("bear", 1);
    let spin_id = won_gift_spin(&harness, "bear").await;

    let view = harness
        .engine
        .reroll_prize(USER, spin_id, 2_000)
        .await
        .unwrap();
    assert_eq!(view.credited, 40);
    assert_eq!(view.spin.status, SpinStatus::Reroll);
    assert_eq!(view.balances.tickets, 130);

    let err = harness
        .engine
        .claim_prize(USER, spin_id, 3_000)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::WrongStatus { .. }));
    assert_eq!(harness.store.available_gifts("bear").unwrap(), 1);
}

#[tokio::test]
async fn drained_earnings_after_send_need_manual_fix() {
    let harness = Harness::new();
    harness.user(USER, 0, 0, None);
    let earnings = 3 * NANO_PER_TICKET;
    harness.store.credit_referral(USER, earnings).unwrap();
    harness
        .engine
        .set_wallet(USER, "UQ-wallet", 1_000)
        .await
        .unwrap();

    let store = harness.store.clone();
    harness.transfer.on_send(move || {
        store.debit_referral(USER, earnings).unwrap();
    });

    let view = harness
        .engine
        .withdraw_referral(USER, None, 2_000)
        .await
        .unwrap();
    assert_eq!(view.status, WithdrawalStatus::SentNeedsManualFix);
    assert_eq!(view.withdrawal.transfer_ref.as_deref(), Some("tx-0"));
    let record = harness
        .store
        .withdrawal(view.withdrawal.id)
        .unwrap()
        .unwrap();
    assert_eq!(record.status, WithdrawalStatus::SentNeedsManualFix);
    assert_eq!(harness.user_row(USER).referral_earnings, 0);
    assert_eq!(harness.transfer.sent().len(), 1);
}

#[tokio::test]
async fn referral_withdrawal_paths() {
    let harness = Harness::new();
    harness.user(USER, 0, 0, None);

    let err = harness
        .engine
        .withdraw_referral(USER, None, 1_000)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::BelowMinimum { .. }));

    harness
        .store
        .credit_referral(USER, 2 * NANO_PER_TICKET)
        .unwrap();
    let err = harness
        .engine
        .withdraw_referral(USER, None, 1_000)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NoWallet));

    harness
        .engine
        .set_wallet(USER, "UQ-wallet", 1_000)
        .await
        .unwrap();
    let err = harness
        .engine
        .withdraw_referral(USER, Some(5 * NANO_PER_TICKET), 1_000)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientEarnings { .. }));

    harness.transfer.fail(true);
    let err = harness
        .engine
        .withdraw_referral(USER, None, 2_000)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::TransferFailed(_)));
    assert_eq!(harness.user_row(USER).referral_earnings, 2 * NANO_PER_TICKET);

    harness.transfer.fail(false);
    let view = harness
        .engine
        .withdraw_referral(USER, Some(NANO_PER_TICKET), 3_000)
        .await
        .unwrap();
    assert_eq!(view.status, WithdrawalStatus::Completed);
    assert_eq!(view.balances.referral_earnings, NANO_PER_TICKET);
    let sent = harness.transfer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].address, "UQ-wallet");
    assert_eq!(sent[0].amount, NANO_PER_TICKET);
}

#[tokio::test]
async fn slot_withdrawal_refunds_fee_without_gift() {
    let harness = Harness::new();
    harness.user(USER, 0, 100, None);
    harness.store.insert_gift_pool("heart", false).unwrap();
    let spin_id = slot_gift_spin(&harness, "heart");

    let err = harness
        .engine
        .withdraw_slot_gift(USER, spin_id, 2_000)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NoGiftAvailable(_)));
    assert_eq!(harness.user_row(USER).stars, 100);
    assert_eq!(
        harness.store.spin(spin_id).unwrap().unwrap().status,
        SpinStatus::WinGift
    );

    harness.store.insert_gift_entry("heart", 1).unwrap();
    let view = harness
        .engine
        .withdraw_slot_gift(USER, spin_id, 3_000)
        .await
        .unwrap();
    let fee = harness.engine.config().slot_withdraw_fee_stars;
    assert_eq!(view.balances.stars, 100 - fee);
    assert_eq!(view.spin.status, SpinStatus::RewardSent);
    assert_eq!(view.reward.source, RewardSource::Slot);
}

#[tokio::test]
async fn slot_withdrawal_fee_must_be_covered() {
    let harness = Harness::new();
    harness.user(USER, 0, 1, None);
    harness.gifts("heart", 1);
    let spin_id = slot_gift_spin(&harness, "heart");

    let err = harness
        .engine
        .withdraw_slot_gift(USER, spin_id, 2_000)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientFunds {
            currency: Currency::Stars,
            ..
        }
    ));
    assert_eq!(harness.store.available_gifts("heart").unwrap(), 1);
}

#[tokio::test]
async fn wheel_draw_creates_claimable_reward() {
    let harness = Harness::new();
    harness.gifts("rocket", 1);
    harness.wheel(1, 10, 2, gift("rocket"));
    for player in [USER, USER + 1] {
        harness.user(player, 10, 0, None);
    }

    let first = harness.engine.join_wheel(USER, 1, 1_000).await.unwrap();
    assert!(!first.filled);
    let err = harness.engine.join_wheel(USER, 1, 1_001).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyJoined));
    let err = harness.engine.draw_wheel(1, 1_001).await.unwrap_err();
    assert!(matches!(err, EngineError::WheelNotReady));

    let second = harness.engine.join_wheel(USER + 1, 1, 2_000).await.unwrap();
    assert!(second.filled);
    assert_eq!(second.participants, 2);

    let delay = harness.engine.config().wheel_draw_delay_ms;
    assert!(harness
        .engine
        .run_due_wheel_draws(2_000 + delay - 1)
        .await
        .unwrap()
        .is_empty());
    let drawn = harness
        .engine
        .run_due_wheel_draws(2_000 + delay)
        .await
        .unwrap();
    assert_eq!(drawn.len(), 1);
    let winner = drawn[0].result.winner_id;
    let loser = if winner == USER { USER + 1 } else { USER };
    assert_eq!(drawn[0].reward.user_id, winner);

    let wheel = harness.store.wheel(1).unwrap().unwrap();
    assert_eq!(wheel.status, WheelStatus::Completed);
    assert_eq!(wheel.winner_id, Some(winner));
    let err = harness.engine.draw_wheel(1, 20_000).await.unwrap_err();
    assert!(matches!(err, EngineError::WheelNotReady));
    let err = harness.engine.join_wheel(loser, 1, 20_000).await.unwrap_err();
    assert!(matches!(err, EngineError::WheelClosed));

    let claim = harness
        .engine
        .claim_pending_reward(winner, None, 30_000)
        .await
        .unwrap();
    assert!(claim.delivered);
    assert_eq!(claim.reward.status, RewardStatus::Confirmed);
    assert!(claim.reward.gift_entry_id.is_some());
    assert_eq!(harness.gifts.delivered(), vec![claim.reward.id]);

    let err = harness
        .engine
        .claim_pending_reward(loser, None, 30_000)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NoPendingReward));
    assert!(eventually(|| harness.notifier.messages().len() >= 3).await);
}

#[tokio::test]
async fn failed_delivery_marks_reward_failed() {
    let harness = Harness::new();
    harness.user(USER, 0, 0, None);
    harness.store.insert_gift_pool("rocket", true).unwrap();
    let reward = starspin_types::PendingReward::new(RewardSource::Wheel, USER, gift("rocket"), 1_000);
    harness.store.insert_reward(&reward).unwrap();
    harness.gifts.fail(true);

    let claim = harness
        .engine
        .claim_pending_reward(USER, Some(reward.id), 2_000)
        .await
        .unwrap();
    assert!(!claim.delivered);
    assert_eq!(claim.reward.status, RewardStatus::Failed);
    let stored = harness.store.reward(reward.id).unwrap().unwrap();
    assert_eq!(stored.status, RewardStatus::Failed);
    assert!(stored.failure.is_some());
    assert!(harness.notifier.messages().is_empty());

    let err = harness
        .engine
        .claim_pending_reward(USER, Some(reward.id), 3_000)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::AlreadyClaimed));
}

#[tokio::test]
async fn referral_bonuses_follow_each_game() {
    let harness = Harness::new();
    harness.user(REFERRER, 0, 0, None);
    harness.user(USER, 1_000, 100, Some(REFERRER));
    harness.case(1, 500, vec![item(1, ItemKind::Lose, 1.0, 0)]);
    harness.wheel(2, 300, 5, PrizeDescriptor::Tickets { amount: 1_000 });
    harness.slot(3, 100, gift("bear"));

    harness
        .engine
        .spin_case(SpinRequest::new(USER, 1), 1_000)
        .await
        .unwrap();
    assert!(eventually(|| harness.user_row(REFERRER).referral_earnings == 50).await);

    harness.engine.join_wheel(USER, 2, 2_000).await.unwrap();
    assert_eq!(harness.user_row(REFERRER).referral_earnings, 80);

    harness
        .engine
        .spin_slot(SpinRequest::new(USER, 3), 3_000)
        .await
        .unwrap();
    // 100 stars at 200 stars per TON is 0.5 TON; 5% of that in ticket units.
    assert!(eventually(|| harness.user_row(REFERRER).referral_earnings == 80 + 25_000_000).await);

    let referrer = harness.user_row(REFERRER);
    assert_eq!(referrer.tickets, 0);
    assert_eq!(referrer.stars, 0);
}

#[tokio::test]
async fn register_keeps_first_referrer_only() {
    let harness = Harness::new();
    harness.user(REFERRER, 0, 0, None);

    let view = harness
        .engine
        .register(USER, Some(REFERRER), 1_000)
        .await
        .unwrap();
    assert_eq!(view.referrer_id, Some(REFERRER));
    let view = harness.engine.register(USER, Some(42), 2_000).await.unwrap();
    assert_eq!(view.referrer_id, Some(REFERRER));

    let view = harness
        .engine
        .register(USER + 1, Some(USER + 1), 1_000)
        .await
        .unwrap();
    assert_eq!(view.referrer_id, None);
    let view = harness
        .engine
        .register(USER + 2, Some(999_999), 1_000)
        .await
        .unwrap();
    assert_eq!(view.referrer_id, None);
}

#[tokio::test]
async fn free_spin_needs_deposit_and_cooldown() {
    let harness = Harness::new();
    harness.user(USER, 0, 0, None);
    harness.case(1, 100, vec![item(1, ItemKind::Stars, 1.0, 7)]);

    let err = harness
        .engine
        .spin_case(SpinRequest::new(USER, 1).free(), 1_000)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::FreeSpinUnavailable));

    harness
        .engine
        .deposit(USER, Currency::Tickets, 5, "tx-1", 1_000)
        .await
        .unwrap();
    assert!(harness.engine.me(USER, 1_000).unwrap().free_spin_available);

    let view = harness
        .engine
        .spin_case(SpinRequest::new(USER, 1).free(), 2_000)
        .await
        .unwrap();
    assert!(view.spin.free);
    assert_eq!(view.spin.price_paid, 0);
    assert_eq!(view.spin.status, SpinStatus::WinStars);
    assert_eq!(view.balances.tickets, 5);
    assert_eq!(view.balances.stars, 7);

    assert!(!harness.engine.me(USER, 2_001).unwrap().free_spin_available);
    let err = harness
        .engine
        .spin_case(SpinRequest::new(USER, 1).free(), 2_001)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::FreeSpinUnavailable));

    let later = 2_000 + harness.engine.config().free_spin_cooldown_ms;
    harness
        .engine
        .spin_case(SpinRequest::new(USER, 1).free(), later)
        .await
        .unwrap();

    let err = harness
        .engine
        .spin_slot(SpinRequest::new(USER, 1).free(), later)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::FreeSpinUnavailable));
}

#[tokio::test]
async fn runs_roll_over_into_leaderboards() {
    let harness = Harness::with_config(EngineConfig {
        run_daily_attempts: 2,
        ..EngineConfig::unthrottled()
    });
    let period_ms = harness.engine.config().run_period_ms;
    for player in [USER, USER + 1, USER + 2] {
        harness.user(player, 0, 0, None);
    }

    let err = harness.engine.start_run(USER, 1_000).await.unwrap_err();
    assert!(matches!(err, EngineError::NoActivePeriod));
    assert!(harness.engine.rollover(0).unwrap().is_empty());
    let period = harness.store.active_period(1_000).unwrap().unwrap();
    assert_eq!((period.starts_at, period.ends_at), (0, period_ms));

    let a1 = harness.engine.start_run(USER, 1_000).await.unwrap();
    let a2 = harness.engine.start_run(USER, 1_100).await.unwrap();
    let err = harness.engine.start_run(USER, 1_200).await.unwrap_err();
    assert!(matches!(err, EngineError::DailyLimitReached));
    let b = harness.engine.start_run(USER + 1, 1_300).await.unwrap();
    let c = harness.engine.start_run(USER + 2, 1_400).await.unwrap();

    harness.engine.finish_run(USER, a1.id, 512, 2_000).await.unwrap();
    harness.engine.finish_run(USER, a2.id, 2_048, 2_100).await.unwrap();
    harness.engine.finish_run(USER + 1, b.id, 512, 2_200).await.unwrap();
    let err = harness
        .engine
        .finish_run(USER + 1, c.id, 10, 2_300)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RunNotFound));
    let err = harness
        .engine
        .finish_run(USER, a1.id, 4_096, 2_400)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RunNotActive));

    let live = harness.engine.leaderboard(period.id, None).unwrap();
    assert!(!live.finalized);
    let ranked: Vec<(u32, i64, u64)> = live
        .entries
        .iter()
        .map(|entry| (entry.rank, entry.user_id, entry.score))
        .collect();
    assert_eq!(ranked, vec![(1, USER, 2_048), (2, USER + 1, 512)]);

    // A new day restores attempts.
    harness.engine.start_run(USER, DAY_MS + 1).await.unwrap();

    let finalized = harness.engine.rollover(period_ms).unwrap();
    assert_eq!(finalized.len(), 1);
    assert_eq!(finalized[0].status, PeriodStatus::Finalized);
    let run = harness.store.run(c.id).unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Expired);
    let err = harness
        .engine
        .finish_run(USER + 2, c.id, 99, period_ms + 1)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RunNotActive));

    let board = harness.engine.leaderboard(period.id, Some(1)).unwrap();
    assert!(board.finalized);
    assert_eq!(board.entries.len(), 1);
    assert_eq!(board.entries[0].user_id, USER);

    let next = harness.store.active_period(period_ms).unwrap().unwrap();
    assert_eq!(next.starts_at, period_ms);
    assert!(harness.engine.rollover(period_ms + 1).unwrap().is_empty());
}

#[tokio::test]
async fn failed_prize_settlement_returns_gift_to_pool() {
    let harness = Harness::new();
    harness.gifts("bear", 1);
    let spin_id = won_gift_spin(&harness, "bear").await;
    // A reward already bound to the spin makes the settlement insert fail.
    let mut stray =
        starspin_types::PendingReward::new(RewardSource::Case, USER, gift("bear"), 1_500);
    stray.spin_id = Some(spin_id);
    harness.store.insert_reward(&stray).unwrap();

    let err = harness
        .engine
        .claim_prize(USER, spin_id, 2_000)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Store(_)), "{err}");
    let spin = harness.store.spin(spin_id).unwrap().unwrap();
    assert_eq!(spin.status, SpinStatus::Won);
    assert_eq!(harness.store.available_gifts("bear").unwrap(), 1);
}

#[tokio::test]
async fn failed_confirmation_returns_wheel_gift_to_pool() {
    let harness = Harness::new();
    harness.user(USER, 0, 0, None);
    harness.gifts("rocket", 1);
    let reward =
        starspin_types::PendingReward::new(RewardSource::Wheel, USER, gift("rocket"), 1_000);
    harness.store.insert_reward(&reward).unwrap();
    harness
        .store
        .execute_batch(
            "CREATE TRIGGER confirm_fails BEFORE UPDATE OF status ON rewards
             WHEN NEW.status = 'confirmed'
             BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END;",
        )
        .unwrap();

    let err = harness
        .engine
        .claim_pending_reward(USER, Some(reward.id), 2_000)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Store(_)), "{err}");
    assert_eq!(harness.store.available_gifts("rocket").unwrap(), 1);
    let stored = harness.store.reward(reward.id).unwrap().unwrap();
    assert_eq!(stored.status, RewardStatus::Pending);

    harness.store.execute_batch("DROP TRIGGER confirm_fails;").unwrap();
    let claim = harness
        .engine
        .claim_pending_reward(USER, Some(reward.id), 3_000)
        .await
        .unwrap();
    assert!(claim.delivered);
    assert_eq!(harness.store.available_gifts("rocket").unwrap(), 0);
}

#[tokio::test]
async fn unwritable_failure_mark_still_reports_undelivered() {
    let harness = Harness::new();
    harness.user(USER, 0, 0, None);
    harness.store.insert_gift_pool("rocket", true).unwrap();
    let reward =
        starspin_types::PendingReward::new(RewardSource::Wheel, USER, gift("rocket"), 1_000);
    harness.store.insert_reward(&reward).unwrap();
    harness.gifts.fail(true);
    harness
        .store
        .execute_batch(
            "CREATE TRIGGER fail_mark_fails BEFORE UPDATE OF status ON rewards
             WHEN NEW.status = 'failed'
             BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END;",
        )
        .unwrap();

    let claim = harness
        .engine
        .claim_pending_reward(USER, Some(reward.id), 2_000)
        .await
        .unwrap();
    assert!(!claim.delivered);
    assert_eq!(claim.reward.status, RewardStatus::Confirmed);
    assert!(claim.reward.failure.is_some());
    let stored = harness.store.reward(reward.id).unwrap().unwrap();
    assert_eq!(stored.status, RewardStatus::Confirmed);
}
