use starspin_types::{Balances, Currency, UserId};
use std::sync::Arc;

use crate::guard::UserLock;
use crate::store::Store;
use crate::EngineError;

/// Single-balance-field ledger over the user row.
///
/// Spendable balances change only while the caller holds the owner's
/// [`UserLock`]; the store additionally refuses any decrement that would go
/// negative.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Returns the new balance.
    pub fn debit(
        &self,
        lock: &UserLock,
        currency: Currency,
        amount: u64,
    ) -> Result<u64, EngineError> {
        let user = lock.user_id();
        match self.store.debit(user, currency, amount)? {
            Some(balance) => {
                tracing::debug!(user_id = user, %currency, amount, balance, "debited");
                Ok(balance)
            }
            None => {
                let available = self
                    .store
                    .user(user)?
                    .ok_or(EngineError::UserNotFound)?
                    .balance(currency);
                Err(EngineError::InsufficientFunds {
                    currency,
                    needed: amount,
                    available,
                })
            }
        }
    }

    pub fn credit(
        &self,
        lock: &UserLock,
        currency: Currency,
        amount: u64,
    ) -> Result<u64, EngineError> {
        let user = lock.user_id();
        let balance = self
            .store
            .credit(user, currency, amount)?
            .ok_or(EngineError::UserNotFound)?;
        tracing::debug!(user_id = user, %currency, amount, balance, "credited");
        Ok(balance)
    }

    /// Unlocked: one atomic increment on a balance the referrer cannot spend
    /// concurrently beyond what the conditional decrement allows.
    pub fn credit_referral(&self, referrer: UserId, amount: u64) -> Result<u64, EngineError> {
        self.store
            .credit_referral(referrer, amount)?
            .ok_or(EngineError::UserNotFound)
    }

    pub fn debit_referral(&self, lock: &UserLock, amount: u64) -> Result<bool, EngineError> {
        Ok(self.store.debit_referral(lock.user_id(), amount)?)
    }

    pub fn balances(&self, user: UserId) -> Result<Balances, EngineError> {
        Ok(self
            .store
            .user(user)?
            .ok_or(EngineError::UserNotFound)?
            .balances())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::guard::Guard;
    use crate::store::SqliteStore;
    use starspin_types::User;

    fn setup(tickets: u64) -> (Ledger, Guard) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let mut user = User::new(1, None, 0);
        user.tickets = tickets;
        store.insert_user(&user).unwrap();
        (Ledger::new(store), Guard::in_memory(&EngineConfig::unthrottled()))
    }

    #[tokio::test]
    async fn debit_reports_shortfall() {
        let (ledger, guard) = setup(30);
        let lock = guard.lock_user(1).await;
        assert_eq!(ledger.debit(&lock, Currency::Tickets, 20).unwrap(), 10);
        match ledger.debit(&lock, Currency::Tickets, 20) {
            Err(EngineError::InsufficientFunds {
                needed, available, ..
            }) => {
                assert_eq!(needed, 20);
                assert_eq!(available, 10);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(ledger.credit(&lock, Currency::Stars, 7).unwrap(), 7);
        assert_eq!(ledger.balances(1).unwrap().tickets, 10);
    }

    #[tokio::test]
    async fn unknown_user_cannot_be_credited() {
        let (ledger, guard) = setup(0);
        let lock = guard.lock_user(2).await;
        assert!(matches!(
            ledger.credit(&lock, Currency::Tickets, 1),
            Err(EngineError::UserNotFound)
        ));
        assert!(matches!(
            ledger.credit_referral(2, 1),
            Err(EngineError::UserNotFound)
        ));
    }
}
