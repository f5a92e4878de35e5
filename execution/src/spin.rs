//! "Pay and draw" scaffolding shared by the case and slot engines.

use starspin_types::api::SpinView;
use starspin_types::constants::MAX_IDEMPOTENCY_KEY_LEN;
use starspin_types::{Currency, GameId, SpinKind, SpinRecord, UserId};
use uuid::Uuid;

use crate::guard::UserLock;
use crate::store::StoreError;
use crate::{Engine, EngineError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpinRequest {
    pub user_id: UserId,
    pub game_id: GameId,
    /// Generated when absent; retries without a key are not deduplicated.
    pub idempotency_key: Option<String>,
    /// Waive the price (cases only).
    pub free: bool,
}

impl SpinRequest {
    pub fn new(user_id: UserId, game_id: GameId) -> Self {
        Self {
            user_id,
            game_id,
            idempotency_key: None,
            free: false,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn free(mut self) -> Self {
        self.free = true;
        self
    }
}

pub(crate) enum Admission {
    /// The key was settled before; return the recorded spin.
    Replay(SpinRecord),
    Fresh(String),
}

fn normalize_key(key: Option<&str>) -> Result<String, EngineError> {
    match key.map(str::trim) {
        None => Ok(Uuid::new_v4().to_string()),
        Some("") => Err(EngineError::InvalidInput("empty idempotency key".into())),
        Some(key) if key.len() > MAX_IDEMPOTENCY_KEY_LEN => Err(EngineError::InvalidInput(
            format!("idempotency key longer than {MAX_IDEMPOTENCY_KEY_LEN} bytes"),
        )),
        Some(key) => Ok(key.to_string()),
    }
}

/// A key may only be replayed by the request that first used it.
fn replay_of(
    previous: SpinRecord,
    kind: SpinKind,
    request: &SpinRequest,
) -> Result<SpinRecord, EngineError> {
    if previous.kind == kind
        && previous.user_id == request.user_id
        && previous.game_id == request.game_id
    {
        Ok(previous)
    } else {
        Err(EngineError::DuplicateIdempotencyKey)
    }
}

fn op_name(kind: SpinKind) -> &'static str {
    match kind {
        SpinKind::Case => "case_spin",
        SpinKind::Slot => "slot_spin",
    }
}

impl Engine {
    /// Rate limit, idempotency lookup, then short-horizon dedupe.
    pub(crate) async fn admit_spin(
        &self,
        kind: SpinKind,
        request: &SpinRequest,
    ) -> Result<Admission, EngineError> {
        self.guard.check_rate(request.user_id)?;
        let key = normalize_key(request.idempotency_key.as_deref())?;
        if let Some(previous) = self.store.spin_by_key(&key)? {
            return replay_of(previous, kind, request).map(Admission::Replay);
        }
        self.guard
            .begin(op_name(kind), request.user_id, &request.game_id.to_string())
            .await?;
        Ok(Admission::Fresh(key))
    }

    /// Repeats the key lookup once the user lock is held.
    pub(crate) fn settled_spin(
        &self,
        key: &str,
        kind: SpinKind,
        request: &SpinRequest,
    ) -> Result<Option<SpinRecord>, EngineError> {
        self.store
            .spin_by_key(key)?
            .map(|previous| replay_of(previous, kind, request))
            .transpose()
    }

    /// Persists `spin`. When the unique key loses a race the charged price is
    /// refunded and the winning spin returned instead.
    pub(crate) fn record_spin(
        &self,
        lock: &UserLock,
        spin: &SpinRecord,
        request: &SpinRequest,
        charged: Option<(Currency, u64)>,
    ) -> Result<Option<SpinRecord>, EngineError> {
        let refund = |reason: &str| {
            if let Some((currency, amount)) = charged.filter(|(_, amount)| *amount > 0) {
                match self.ledger.credit(lock, currency, amount) {
                    Ok(_) => tracing::info!(
                        user_id = lock.user_id(),
                        %currency,
                        amount,
                        reason,
                        "spin price refunded"
                    ),
                    Err(err) => tracing::error!(
                        user_id = lock.user_id(),
                        %currency,
                        amount,
                        error = %err,
                        "spin refund failed"
                    ),
                }
            }
        };
        match self.store.insert_spin(spin) {
            Ok(()) => Ok(None),
            Err(StoreError::Duplicate(_)) => {
                refund("duplicate idempotency key");
                let previous = self
                    .store
                    .spin_by_key(&spin.idempotency_key)?
                    .ok_or(EngineError::DuplicateIdempotencyKey)?;
                replay_of(previous, spin.kind, request).map(Some)
            }
            Err(err) => {
                refund("spin not recorded");
                Err(err.into())
            }
        }
    }

    pub(crate) fn replayed(&self, spin: SpinRecord) -> Result<SpinView, EngineError> {
        tracing::debug!(user_id = spin.user_id, spin_id = %spin.id, "spin replayed");
        Ok(SpinView {
            balances: self.ledger.balances(spin.user_id)?,
            spin,
            replayed: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_trimmed_and_bounded() {
        assert_eq!(normalize_key(Some(" abc ")).unwrap(), "abc");
        assert!(normalize_key(Some("  ")).is_err());
        assert!(normalize_key(Some(&"k".repeat(MAX_IDEMPOTENCY_KEY_LEN + 1))).is_err());
        assert_ne!(normalize_key(None).unwrap(), normalize_key(None).unwrap());
    }
}
