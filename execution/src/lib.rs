//! Starspin settlement engine.
//!
//! This crate contains the prize-allocation protocol shared by the case, slot
//! and wheel games, the single-balance ledger, pending-reward fulfilment,
//! referral propagation, Run2048 scoring periods and the settlement task
//! runner. HTTP and storage engines are collaborators: the engine talks to
//! them through [`Store`] and the traits in [`collaborators`].
//!
//! ## Invariants
//! - Balances never go negative; every spendable-balance mutation holds the
//!   owner's [`guard::UserLock`].
//! - A spin is recorded before any prize derived from it is credited.
//! - Status transitions (spin, reward, wheel) are compare-and-swap updates in
//!   the store; a lost race surfaces as a conflict, never a silent success.
//! - Do not read the wall clock inside the engine: operations take `now`
//!   (unix milliseconds) from the caller.
//!
//! ## Minimal usage
//! ```rust,ignore
//! # async fn example(collaborators: starspin_execution::Collaborators) -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use starspin_execution::{Engine, EngineConfig, SpinRequest, SqliteStore};
//!
//! let store = Arc::new(SqliteStore::open_in_memory()?);
//! let engine = Engine::new(store, collaborators, EngineConfig::default());
//! engine.register(42, None, 1_000).await?;
//! let view = engine.spin_case(SpinRequest::new(42, 1), 2_000).await?;
//! println!("{}", view.spin.status);
//! # Ok(())
//! # }
//! ```

pub mod collaborators;
pub mod config;
pub mod guard;
pub mod ledger;
pub mod referral;
pub mod selector;
pub mod store;
pub mod tasks;

mod case;
mod error;
mod rewards;
mod runs;
mod slot;
mod spin;
mod users;
mod wheel;
mod withdrawal;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

#[cfg(test)]
mod concurrency_tests;
#[cfg(test)]
mod idempotency_tests;
#[cfg(test)]
mod settlement_tests;

pub use collaborators::{
    CollaboratorError, Collaborators, ExchangeRate, GiftFulfillment, Notifier, TransferReceipt,
    ValueTransfer,
};
pub use config::EngineConfig;
pub use error::EngineError;
pub use guard::{Guard, RateLimit, RequestDedupe};
pub use runs::rank_scores;
pub use slot::{slot_table, SlotPayout};
pub use spin::SpinRequest;
pub use store::{JoinResult, SqliteStore, Store, StoreError};
pub use tasks::{settlement_tasks, ScheduleConfig, Task, TaskRunner};

use rand::{rngs::StdRng, SeedableRng};
use starspin_types::UserId;
use std::sync::{Arc, Mutex};

use crate::ledger::Ledger;
use crate::referral::Referrals;
use crate::selector::{Draw, Selector};

pub struct Engine {
    store: Arc<dyn Store>,
    ledger: Ledger,
    guard: Guard,
    referrals: Referrals,
    collaborators: Arc<Collaborators>,
    config: EngineConfig,
    rng: Mutex<StdRng>,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, collaborators: Collaborators, config: EngineConfig) -> Self {
        let ledger = Ledger::new(store.clone());
        let collaborators = Arc::new(collaborators);
        Self {
            referrals: Referrals::new(ledger.clone(), collaborators.clone()),
            guard: Guard::in_memory(&config),
            store,
            ledger,
            collaborators,
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Replaces the in-process guard, e.g. with a shared dedupe store.
    pub fn with_guard(mut self, guard: Guard) -> Self {
        self.guard = guard;
        self
    }

    /// Makes draws reproducible.
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock().unwrap_or_else(|e| e.into_inner()) = StdRng::seed_from_u64(seed);
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn guard(&self) -> &Guard {
        &self.guard
    }

    pub fn collaborators(&self) -> &Arc<Collaborators> {
        &self.collaborators
    }

    /// Returns a reserved gift entry to its pool. Failures are logged, since
    /// callers release on their own error paths.
    fn release_gift(&self, user: UserId, entry: Option<i64>) {
        let Some(entry) = entry else {
            return;
        };
        if let Err(err) = self.store.release_gift(entry) {
            tracing::error!(
                user_id = user,
                gift_entry_id = entry,
                error = %err,
                "gift release failed"
            );
        }
    }

    fn draw<S: Selector>(&self, selector: &S) -> Result<Draw<S::Outcome>, EngineError> {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        selector.draw(&mut *rng)
    }
}
