use starspin_types::{Currency, ItemKind, SpinStatus};

use crate::mocks::{item, Harness};
use crate::{EngineConfig, EngineError, SpinRequest, Store};

const USER: i64 = 1001;

#[tokio::test]
async fn same_key_replays_without_second_debit() {
    let harness = Harness::new();
    harness.user(USER, 100, 0, None);
    harness.case(1, 100, vec![item(1, ItemKind::Lose, 1.0, 0)]);

    let first = harness
        .engine
        .spin_case(SpinRequest::new(USER, 1).with_key("spin-1"), 1_000)
        .await
        .unwrap();
    assert!(!first.replayed);
    assert_eq!(first.balances.tickets, 0);
    assert_eq!(first.spin.status, SpinStatus::Lose);

    let second = harness
        .engine
        .spin_case(SpinRequest::new(USER, 1).with_key("spin-1"), 2_000)
        .await
        .unwrap();
    assert!(second.replayed);
    assert_eq!(second.spin.id, first.spin.id);
    assert_eq!(second.balances.tickets, 0);
    assert_eq!(harness.user_row(USER).tickets, 0);
}

#[tokio::test]
async fn key_reused_for_other_game_is_rejected() {
    let harness = Harness::new();
    harness.user(USER, 1_000, 500, None);
    harness.case(1, 100, vec![item(1, ItemKind::Lose, 1.0, 0)]);
    harness.case(2, 100, vec![item(2, ItemKind::Lose, 1.0, 0)]);
    harness.slot(3, 10, crate::mocks::gift("bear"));

    harness
        .engine
        .spin_case(SpinRequest::new(USER, 1).with_key("shared"), 1_000)
        .await
        .unwrap();

    let err = harness
        .engine
        .spin_case(SpinRequest::new(USER, 2).with_key("shared"), 1_001)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateIdempotencyKey));

    let err = harness
        .engine
        .spin_slot(SpinRequest::new(USER, 3).with_key("shared"), 1_002)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateIdempotencyKey));

    // Another user cannot read the spin back through the key either.
    harness.user(USER + 1, 1_000, 0, None);
    let err = harness
        .engine
        .spin_case(SpinRequest::new(USER + 1, 1).with_key("shared"), 1_003)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateIdempotencyKey));

    let user = harness.user_row(USER);
    assert_eq!(user.tickets, 900);
    assert_eq!(user.stars, 500);
}

#[tokio::test]
async fn ineligible_game_fails_the_same_way_twice() {
    let harness = Harness::new();
    harness.user(USER, 100, 0, None);
    harness.case(
        1,
        50,
        vec![
            item(1, ItemKind::Lose, 0.0, 0),
            item(2, ItemKind::Stars, 0.0, 10),
        ],
    );

    for attempt in 0..2 {
        let err = harness
            .engine
            .spin_case(SpinRequest::new(USER, 1).with_key("empty"), 1_000 + attempt)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoCandidates));
        assert_eq!(harness.user_row(USER).tickets, 100);
        assert!(harness.store.spin_by_key("empty").unwrap().is_none());
    }
}

#[tokio::test]
async fn insufficient_balance_records_nothing() {
    let harness = Harness::new();
    harness.user(USER, 99, 0, None);
    harness.case(1, 100, vec![item(1, ItemKind::Lose, 1.0, 0)]);

    let err = harness
        .engine
        .spin_case(SpinRequest::new(USER, 1).with_key("poor"), 1_000)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::InsufficientFunds {
            currency: Currency::Tickets,
            needed: 100,
            available: 99,
        }
    ));
    assert!(harness.store.spin_by_key("poor").unwrap().is_none());
    assert_eq!(harness.user_row(USER).tickets, 99);
}

#[tokio::test]
async fn deposit_is_credited_once_per_external_id() {
    let harness = Harness::new();
    harness.user(USER, 0, 0, None);

    let first = harness
        .engine
        .deposit(USER, Currency::Stars, 250, "invoice-7", 1_000)
        .await
        .unwrap();
    assert!(!first.already_processed);
    assert_eq!(first.balances.stars, 250);

    let second = harness
        .engine
        .deposit(USER, Currency::Stars, 250, "invoice-7", 2_000)
        .await
        .unwrap();
    assert!(second.already_processed);
    assert_eq!(second.balances.stars, 250);
    assert_eq!(harness.user_row(USER).first_deposit_at, Some(1_000));
}

#[tokio::test]
async fn dedupe_window_rejects_rapid_repeat() {
    let harness = Harness::with_config(EngineConfig {
        dedupe_window_ms: 60_000,
        ..EngineConfig::unthrottled()
    });
    harness.user(USER, 0, 0, None);
    let spin_id = uuid::Uuid::new_v4();

    let err = harness
        .engine
        .reroll_prize(USER, spin_id, 1_000)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SpinNotFound));

    let err = harness
        .engine
        .reroll_prize(USER, spin_id, 1_001)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RequestInProgress));

    // A different resource is admitted.
    let err = harness
        .engine
        .reroll_prize(USER, uuid::Uuid::new_v4(), 1_002)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SpinNotFound));
}

#[tokio::test]
async fn rate_limit_rejects_burst() {
    let harness = Harness::with_config(EngineConfig {
        rate_limit_per_second: 1,
        rate_limit_per_minute: 0,
        ..EngineConfig::unthrottled()
    });
    harness.user(USER, 1_000, 0, None);
    harness.case(1, 1, vec![item(1, ItemKind::Lose, 1.0, 0)]);

    harness
        .engine
        .spin_case(SpinRequest::new(USER, 1), 1_000)
        .await
        .unwrap();
    let err = harness
        .engine
        .spin_case(SpinRequest::new(USER, 1), 1_001)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::RateLimited { retry_after_ms } if retry_after_ms > 0));
    assert_eq!(harness.user_row(USER).tickets, 999);
}
