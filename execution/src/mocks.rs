//! In-memory collaborators and fixtures for engine tests.

use futures::future::BoxFuture;
use starspin_types::{
    CaseDef, CaseItem, GameId, ItemKind, PendingReward, PrizeDescriptor, SlotDef, User, UserId,
    WheelDef, WheelStatus,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::collaborators::{
    CollaboratorError, Collaborators, ExchangeRate, GiftFulfillment, Notifier, TransferReceipt,
    ValueTransfer,
};
use crate::{Engine, EngineConfig, SqliteStore, Store};

type Hook = Box<dyn Fn() + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentTransfer {
    pub address: String,
    pub amount: u64,
    pub memo: String,
}

/// Records every send; can be told to fail or to run a hook mid-send.
#[derive(Default)]
pub struct MockTransfer {
    sent: Mutex<Vec<SentTransfer>>,
    fail: AtomicBool,
    on_send: Mutex<Option<Hook>>,
    next_ref: AtomicU64,
}

impl MockTransfer {
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Runs `hook` after the send is accepted, before it returns.
    pub fn on_send(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_send.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn sent(&self) -> Vec<SentTransfer> {
        self.sent.lock().unwrap().clone()
    }
}

impl ValueTransfer for MockTransfer {
    fn send<'a>(
        &'a self,
        address: &'a str,
        amount: u64,
        memo: &'a str,
    ) -> BoxFuture<'a, Result<TransferReceipt, CollaboratorError>> {
        Box::pin(async move {
            if self.fail.load(Ordering::SeqCst) {
                return Err(CollaboratorError::Rejected("gateway down".into()));
            }
            self.sent.lock().unwrap().push(SentTransfer {
                address: address.to_string(),
                amount,
                memo: memo.to_string(),
            });
            if let Some(hook) = self.on_send.lock().unwrap().as_ref() {
                hook();
            }
            let reference = self.next_ref.fetch_add(1, Ordering::SeqCst);
            Ok(TransferReceipt {
                reference: format!("tx-{reference}"),
            })
        })
    }
}

#[derive(Default)]
pub struct MockNotifier {
    messages: Mutex<Vec<(UserId, String)>>,
    fail: AtomicBool,
}

impl MockNotifier {
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<(UserId, String)> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for MockNotifier {
    fn notify<'a>(
        &'a self,
        user: UserId,
        message: &'a str,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            if self.fail.load(Ordering::SeqCst) {
                return Err(CollaboratorError::Transport("bot blocked".into()));
            }
            self.messages.lock().unwrap().push((user, message.to_string()));
            Ok(())
        })
    }
}

#[derive(Default)]
pub struct MockGifts {
    delivered: Mutex<Vec<Uuid>>,
    fail: AtomicBool,
}

impl MockGifts {
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn delivered(&self) -> Vec<Uuid> {
        self.delivered.lock().unwrap().clone()
    }
}

impl GiftFulfillment for MockGifts {
    fn deliver<'a>(
        &'a self,
        reward: &'a PendingReward,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            if self.fail.load(Ordering::SeqCst) {
                return Err(CollaboratorError::Rejected("gift bot offline".into()));
            }
            self.delivered.lock().unwrap().push(reward.id);
            Ok(())
        })
    }
}

/// Exchange rate pinned to one value; a non-positive value fails the lookup.
pub struct FixedRate(pub f64);

impl ExchangeRate for FixedRate {
    fn stars_per_ton(&self) -> BoxFuture<'_, Result<f64, CollaboratorError>> {
        let rate = self.0;
        Box::pin(async move {
            if rate > 0.0 {
                Ok(rate)
            } else {
                Err(CollaboratorError::Transport("rate feed unavailable".into()))
            }
        })
    }
}

pub const TEST_STARS_PER_TON: f64 = 200.0;

/// An engine over an in-memory store plus handles to its mock collaborators.
pub struct Harness {
    pub engine: Arc<Engine>,
    pub store: Arc<SqliteStore>,
    pub transfer: Arc<MockTransfer>,
    pub notifier: Arc<MockNotifier>,
    pub gifts: Arc<MockGifts>,
}

impl Harness {
    /// Unthrottled configuration with a fixed draw seed.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::unthrottled())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let transfer = Arc::new(MockTransfer::default());
        let notifier = Arc::new(MockNotifier::default());
        let gifts = Arc::new(MockGifts::default());
        let collaborators = Collaborators::new(
            transfer.clone(),
            notifier.clone(),
            gifts.clone(),
            Arc::new(FixedRate(TEST_STARS_PER_TON)),
            Duration::from_millis(config.external_timeout_ms),
        );
        let engine = Engine::new(store.clone(), collaborators, config).with_seed(7);
        Self {
            engine: Arc::new(engine),
            store,
            transfer,
            notifier,
            gifts,
        }
    }

    pub fn user(&self, id: UserId, tickets: u64, stars: u64, referrer: Option<UserId>) {
        self.store
            .insert_user(&User {
                tickets,
                stars,
                ..User::new(id, referrer, 0)
            })
            .unwrap();
    }

    pub fn user_row(&self, id: UserId) -> User {
        self.store.user(id).unwrap().unwrap()
    }

    pub fn case(&self, id: GameId, price: u64, items: Vec<CaseItem>) {
        self.store
            .insert_case(&CaseDef {
                id,
                name: format!("case-{id}"),
                price,
                active: true,
                items: items
                    .into_iter()
                    .map(|item| CaseItem {
                        case_id: id,
                        ..item
                    })
                    .collect(),
            })
            .unwrap();
    }

    pub fn slot(&self, id: GameId, price: u64, prize: PrizeDescriptor) {
        self.store
            .insert_slot(&SlotDef {
                id,
                name: format!("slot-{id}"),
                price,
                active: true,
                prize,
                triple_payout: 0,
            })
            .unwrap();
    }

    pub fn wheel(&self, id: GameId, price: u64, size: u32, prize: PrizeDescriptor) {
        self.store
            .insert_wheel(&WheelDef {
                id,
                price,
                size,
                prize,
                status: WheelStatus::Active,
                filled_at: None,
                draw_at: None,
                winner_id: None,
                created_at: 0,
            })
            .unwrap();
    }

    pub fn gifts(&self, gift_name: &str, count: u64) {
        self.store.insert_gift_pool(gift_name, false).unwrap();
        for number in 1..=count {
            self.store.insert_gift_entry(gift_name, number).unwrap();
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn item(id: i64, kind: ItemKind, weight: f64, payout_value: u64) -> CaseItem {
    CaseItem {
        id,
        case_id: 0,
        name: format!("item-{id}"),
        kind,
        weight,
        payout_value,
        gift_name: None,
    }
}

pub fn gift_item(id: i64, gift_name: &str, weight: f64, payout_value: u64) -> CaseItem {
    CaseItem {
        gift_name: Some(gift_name.to_string()),
        ..item(id, ItemKind::Gift, weight, payout_value)
    }
}

pub fn gift(gift_name: &str) -> PrizeDescriptor {
    PrizeDescriptor::Gift {
        gift_name: gift_name.to_string(),
    }
}

/// Polls until `check` holds; spawned referral credits land asynchronously.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
