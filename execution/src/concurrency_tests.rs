use futures::future::join_all;
use starspin_types::{ItemKind, PendingReward, PrizeDescriptor, RewardSource, RewardStatus};

use crate::mocks::{gift, item, Harness};
use crate::{EngineConfig, EngineError, SpinRequest, Store};

const USER: i64 = 2001;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_confirm_exactly_once() {
    let harness = Harness::new();
    harness.user(USER, 0, 0, None);
    let reward = PendingReward::new(
        RewardSource::Wheel,
        USER,
        PrizeDescriptor::Stars { amount: 50 },
        1_000,
    );
    harness.store.insert_reward(&reward).unwrap();

    let claims = (0..8).map(|_| {
        let engine = harness.engine.clone();
        let id = reward.id;
        tokio::spawn(async move { engine.claim_pending_reward(USER, Some(id), 2_000).await })
    });
    let results: Vec<_> = join_all(claims)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let confirmed = results.iter().filter(|result| result.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|result| matches!(result, Err(EngineError::AlreadyClaimed)))
        .count();
    assert_eq!(confirmed, 1);
    assert_eq!(rejected, 7);
    assert_eq!(harness.user_row(USER).stars, 50);
    assert_eq!(
        harness.store.reward(reward.id).unwrap().unwrap().status,
        RewardStatus::Confirmed
    );
    assert_eq!(harness.engine.guard().held_locks(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_spins_never_overdraw() {
    let harness = Harness::new();
    harness.user(USER, 100, 0, None);
    harness.case(1, 30, vec![item(1, ItemKind::Lose, 1.0, 0)]);

    let spins = (0..10).map(|_| {
        let engine = harness.engine.clone();
        tokio::spawn(async move { engine.spin_case(SpinRequest::new(USER, 1), 1_000).await })
    });
    let results: Vec<_> = join_all(spins)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 3);
    assert!(results.iter().all(|result| matches!(
        result,
        Ok(_) | Err(EngineError::InsufficientFunds { .. })
    )));
    assert_eq!(harness.user_row(USER).tickets, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_respect_capacity() {
    let harness = Harness::new();
    harness.wheel(1, 10, 3, gift("rocket"));
    let players: Vec<i64> = (0..6).map(|n| USER + n).collect();
    for player in &players {
        harness.user(*player, 10, 0, None);
    }

    let joins = players.iter().map(|player| {
        let engine = harness.engine.clone();
        let player = *player;
        tokio::spawn(async move { (player, engine.join_wheel(player, 1, 1_000).await) })
    });
    let results: Vec<_> = join_all(joins)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let joined: Vec<i64> = results
        .iter()
        .filter(|(_, result)| result.is_ok())
        .map(|(player, _)| *player)
        .collect();
    assert_eq!(joined.len(), 3);
    for (player, result) in &results {
        let tickets = harness.user_row(*player).tickets;
        match result {
            Ok(_) => assert_eq!(tickets, 0),
            Err(err) => {
                assert!(matches!(err, EngineError::PoolFull), "{err}");
                assert_eq!(tickets, 10);
            }
        }
    }
    assert_eq!(harness.store.wheel_participants(1).unwrap().len(), 3);
    let wheel = harness.store.wheel(1).unwrap().unwrap();
    assert_eq!(wheel.filled_at, Some(1_000));
    assert_eq!(
        wheel.draw_at,
        Some(1_000 + harness.engine.config().wheel_draw_delay_ms)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_same_key_spins_debit_once() {
    let harness = Harness::new();
    harness.user(USER, 500, 0, None);
    harness.case(1, 100, vec![item(1, ItemKind::Lose, 1.0, 0)]);

    let spins = (0..8).map(|_| {
        let engine = harness.engine.clone();
        tokio::spawn(async move {
            engine
                .spin_case(SpinRequest::new(USER, 1).with_key("burst"), 1_000)
                .await
        })
    });
    let views: Vec<_> = join_all(spins)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(views.iter().filter(|view| !view.replayed).count(), 1);
    assert!(views.iter().all(|view| view.spin.id == views[0].spin.id));
    assert_eq!(harness.user_row(USER).tickets, 400);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_gift_claims_take_distinct_entries() {
    let harness = Harness::new();
    harness.gifts("bear", 2);
    let players: Vec<i64> = (0..4).map(|n| USER + n).collect();
    for player in &players {
        harness.user(*player, 100, 0, None);
    }
    harness.case(1, 10, vec![crate::mocks::gift_item(1, "bear", 1.0, 5)]);

    let mut spins = Vec::new();
    for player in &players {
        let view = harness
            .engine
            .spin_case(SpinRequest::new(*player, 1), 1_000)
            .await
            .unwrap();
        spins.push((*player, view.spin.id));
    }

    let claims = spins.into_iter().map(|(player, spin_id)| {
        let engine = harness.engine.clone();
        tokio::spawn(async move { engine.claim_prize(player, spin_id, 2_000).await })
    });
    let results: Vec<_> = join_all(claims)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let mut entries: Vec<i64> = results
        .iter()
        .filter_map(|result| result.as_ref().ok())
        .filter_map(|view| view.reward.gift_entry_id)
        .collect();
    entries.sort_unstable();
    entries.dedup();
    assert_eq!(entries.len(), 2);
    assert_eq!(
        results
            .iter()
            .filter(|result| matches!(result, Err(EngineError::NoGiftAvailable(_))))
            .count(),
        2
    );
    assert_eq!(harness.store.available_gifts("bear").unwrap(), 0);
}

// With the default dedupe window, concurrent repeats are turned away before
// they reach the store.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn default_window_rejects_concurrent_claims_in_progress() {
    let harness = Harness::with_config(EngineConfig::default());
    harness.user(USER, 0, 0, None);
    let reward = PendingReward::new(
        RewardSource::Wheel,
        USER,
        PrizeDescriptor::Stars { amount: 50 },
        1_000,
    );
    harness.store.insert_reward(&reward).unwrap();

    let claims = (0..4).map(|_| {
        let engine = harness.engine.clone();
        let id = reward.id;
        tokio::spawn(async move { engine.claim_pending_reward(USER, Some(id), 2_000).await })
    });
    let results: Vec<_> = join_all(claims)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|result| matches!(result, Err(EngineError::RequestInProgress)))
            .count(),
        3
    );
    assert_eq!(harness.user_row(USER).stars, 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn default_window_same_key_spins_debit_once() {
    let harness = Harness::with_config(EngineConfig::default());
    harness.user(USER, 500, 0, None);
    harness.case(1, 100, vec![item(1, ItemKind::Lose, 1.0, 0)]);

    let spins = (0..4).map(|_| {
        let engine = harness.engine.clone();
        tokio::spawn(async move {
            engine
                .spin_case(SpinRequest::new(USER, 1).with_key("burst"), 1_000)
                .await
        })
    });
    let results: Vec<_> = join_all(spins)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let fresh: Vec<_> = results
        .iter()
        .filter_map(|result| result.as_ref().ok())
        .filter(|view| !view.replayed)
        .collect();
    assert_eq!(fresh.len(), 1);
    for result in &results {
        match result {
            Ok(view) => assert_eq!(view.spin.id, fresh[0].spin.id),
            Err(err) => assert!(matches!(err, EngineError::RequestInProgress), "{err}"),
        }
    }
    assert_eq!(harness.user_row(USER).tickets, 400);
}
