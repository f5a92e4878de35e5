use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use starspin_types::{
    CaseDef, CaseItem, Currency, Deposit, GameId, GiftReservation, PendingReward, Period,
    PeriodStatus, RewardStatus, Run, ScoreRow, SlotDef, SpinRecord, SpinStatus, User, UserId,
    WheelDef, WheelResult, WheelStatus, Withdrawal, WithdrawalStatus,
};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{JoinResult, Store, StoreError};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        wallet_address TEXT,
        tickets INTEGER NOT NULL DEFAULT 0 CHECK (tickets >= 0),
        stars INTEGER NOT NULL DEFAULT 0 CHECK (stars >= 0),
        referral_earnings INTEGER NOT NULL DEFAULT 0 CHECK (referral_earnings >= 0),
        referrer_id INTEGER,
        daily_attempts INTEGER NOT NULL DEFAULT 0,
        daily_attempts_day INTEGER NOT NULL DEFAULT 0,
        last_free_spin_at INTEGER,
        first_deposit_at INTEGER,
        created_at INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS deposits (
        id TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL,
        currency TEXT NOT NULL,
        amount INTEGER NOT NULL,
        external_id TEXT NOT NULL UNIQUE,
        created_at INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS cases (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        price INTEGER NOT NULL,
        active INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS case_items (
        id INTEGER PRIMARY KEY,
        case_id INTEGER NOT NULL REFERENCES cases (id),
        name TEXT NOT NULL,
        kind TEXT NOT NULL,
        weight REAL NOT NULL CHECK (weight >= 0),
        payout_value INTEGER NOT NULL,
        gift_name TEXT
    );
    CREATE TABLE IF NOT EXISTS slots (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        price INTEGER NOT NULL,
        active INTEGER NOT NULL,
        prize TEXT NOT NULL,
        triple_payout INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS spins (
        id TEXT PRIMARY KEY,
        kind TEXT NOT NULL,
        game_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        item_id INTEGER,
        prize TEXT,
        payout_value INTEGER NOT NULL,
        draw_value REAL NOT NULL,
        weight_total REAL NOT NULL,
        price_paid INTEGER NOT NULL,
        currency TEXT NOT NULL,
        free INTEGER NOT NULL,
        status TEXT NOT NULL,
        idempotency_key TEXT NOT NULL UNIQUE,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS gift_pools (
        gift_name TEXT PRIMARY KEY,
        infinite INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS gift_entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        gift_name TEXT NOT NULL REFERENCES gift_pools (gift_name),
        number INTEGER NOT NULL,
        used INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS rewards (
        id TEXT PRIMARY KEY,
        source TEXT NOT NULL,
        user_id INTEGER NOT NULL,
        spin_id TEXT UNIQUE,
        wheel_id INTEGER UNIQUE,
        prize TEXT NOT NULL,
        gift_entry_id INTEGER UNIQUE,
        status TEXT NOT NULL,
        failure TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS wheels (
        id INTEGER PRIMARY KEY,
        price INTEGER NOT NULL,
        size INTEGER NOT NULL CHECK (size > 0),
        prize TEXT NOT NULL,
        status TEXT NOT NULL,
        filled_at INTEGER,
        draw_at INTEGER,
        winner_id INTEGER,
        created_at INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS wheel_participants (
        wheel_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        joined_at INTEGER NOT NULL,
        PRIMARY KEY (wheel_id, user_id)
    );
    CREATE TABLE IF NOT EXISTS wheel_results (
        wheel_id INTEGER PRIMARY KEY,
        winner_id INTEGER NOT NULL,
        draw_value REAL NOT NULL,
        participants INTEGER NOT NULL,
        drawn_at INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS withdrawals (
        id TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL,
        amount INTEGER NOT NULL,
        address TEXT NOT NULL,
        status TEXT NOT NULL,
        transfer_ref TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS periods (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        starts_at INTEGER NOT NULL,
        ends_at INTEGER NOT NULL,
        status TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS runs (
        id TEXT PRIMARY KEY,
        period_id INTEGER NOT NULL REFERENCES periods (id),
        user_id INTEGER NOT NULL,
        score INTEGER NOT NULL,
        status TEXT NOT NULL,
        started_at INTEGER NOT NULL,
        finished_at INTEGER
    );
    CREATE TABLE IF NOT EXISTS weekly_scores (
        period_id INTEGER NOT NULL,
        user_id INTEGER NOT NULL,
        best_score INTEGER NOT NULL,
        achieved_at INTEGER NOT NULL,
        PRIMARY KEY (period_id, user_id)
    );
    CREATE INDEX IF NOT EXISTS rewards_user_status ON rewards (user_id, status);
    CREATE INDEX IF NOT EXISTS wheels_due ON wheels (status, draw_at);
    CREATE INDEX IF NOT EXISTS runs_period ON runs (period_id, status);
";

const USER_COLUMNS: &str = "id, wallet_address, tickets, stars, referral_earnings, referrer_id, \
     daily_attempts, daily_attempts_day, last_free_spin_at, first_deposit_at, created_at";
const SPIN_COLUMNS: &str = "id, kind, game_id, user_id, item_id, prize, payout_value, draw_value, \
     weight_total, price_paid, currency, free, status, idempotency_key, created_at, updated_at";
const REWARD_COLUMNS: &str = "id, source, user_id, spin_id, wheel_id, prize, gift_entry_id, \
     status, failure, created_at, updated_at";
const WHEEL_COLUMNS: &str =
    "id, price, size, prize, status, filled_at, draw_at, winner_id, created_at";
const RUN_COLUMNS: &str = "id, period_id, user_id, score, status, started_at, finished_at";

/// [`Store`] backed by a single SQLite connection.
///
/// The connection sits behind a mutex, so each trait call is one serialized
/// unit of work; multi-statement routines additionally run in a transaction.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs raw SQL, e.g. to install failure triggers in tests.
    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<(), StoreError> {
        Ok(self.conn().execute_batch(sql)?)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn insert_err(what: &'static str) -> impl Fn(rusqlite::Error) -> StoreError {
    move |err| {
        if is_unique_violation(&err) {
            StoreError::Duplicate(what)
        } else {
            StoreError::Sqlite(err)
        }
    }
}

fn conversion<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

fn text<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|err| conversion(idx, err))
}

fn opt_text<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| raw.parse().map_err(|err| conversion(idx, err)))
        .transpose()
}

fn json<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|err| conversion(idx, err))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|err| StoreError::Corrupt(err.to_string()))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        wallet_address: row.get(1)?,
        tickets: row.get(2)?,
        stars: row.get(3)?,
        referral_earnings: row.get(4)?,
        referrer_id: row.get(5)?,
        daily_attempts: row.get(6)?,
        daily_attempts_day: row.get(7)?,
        last_free_spin_at: row.get(8)?,
        first_deposit_at: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn spin_from_row(row: &Row<'_>) -> rusqlite::Result<SpinRecord> {
    let prize: Option<String> = row.get(5)?;
    let prize = prize
        .map(|raw| serde_json::from_str(&raw).map_err(|err| conversion(5, err)))
        .transpose()?;
    Ok(SpinRecord {
        id: text(row, 0)?,
        kind: text(row, 1)?,
        game_id: row.get(2)?,
        user_id: row.get(3)?,
        item_id: row.get(4)?,
        prize,
        payout_value: row.get(6)?,
        draw_value: row.get(7)?,
        weight_total: row.get(8)?,
        price_paid: row.get(9)?,
        currency: text(row, 10)?,
        free: row.get(11)?,
        status: text(row, 12)?,
        idempotency_key: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn reward_from_row(row: &Row<'_>) -> rusqlite::Result<PendingReward> {
    Ok(PendingReward {
        id: text(row, 0)?,
        source: text(row, 1)?,
        user_id: row.get(2)?,
        spin_id: opt_text(row, 3)?,
        wheel_id: row.get(4)?,
        prize: json(row, 5)?,
        gift_entry_id: row.get(6)?,
        status: text(row, 7)?,
        failure: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn wheel_from_row(row: &Row<'_>) -> rusqlite::Result<WheelDef> {
    Ok(WheelDef {
        id: row.get(0)?,
        price: row.get(1)?,
        size: row.get(2)?,
        prize: json(row, 3)?,
        status: text(row, 4)?,
        filled_at: row.get(5)?,
        draw_at: row.get(6)?,
        winner_id: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn period_from_row(row: &Row<'_>) -> rusqlite::Result<Period> {
    Ok(Period {
        id: row.get(0)?,
        starts_at: row.get(1)?,
        ends_at: row.get(2)?,
        status: text(row, 3)?,
    })
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<Run> {
    Ok(Run {
        id: text(row, 0)?,
        period_id: row.get(1)?,
        user_id: row.get(2)?,
        score: row.get(3)?,
        status: text(row, 4)?,
        started_at: row.get(5)?,
        finished_at: row.get(6)?,
    })
}

fn score_from_row(row: &Row<'_>) -> rusqlite::Result<ScoreRow> {
    Ok(ScoreRow {
        user_id: row.get(0)?,
        best_score: row.get(1)?,
        achieved_at: row.get(2)?,
    })
}

fn insert_reward_tx(tx: &Transaction<'_>, reward: &PendingReward) -> Result<(), StoreError> {
    tx.execute(
        &format!("INSERT INTO rewards ({REWARD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
        params![
            reward.id.to_string(),
            reward.source.as_str(),
            reward.user_id,
            reward.spin_id.map(|id| id.to_string()),
            reward.wheel_id,
            to_json(&reward.prize)?,
            reward.gift_entry_id,
            reward.status.as_str(),
            reward.failure,
            reward.created_at,
            reward.updated_at,
        ],
    )
    .map_err(insert_err("reward"))?;
    Ok(())
}

/// Best finished score per user, earliest achievement breaking ties.
const BEST_SCORES: &str = "
    SELECT r.user_id, r.score, MIN(r.finished_at)
    FROM runs r
    WHERE r.period_id = ?1 AND r.status = 'finished'
      AND r.score = (
          SELECT MAX(r2.score) FROM runs r2
          WHERE r2.period_id = r.period_id AND r2.user_id = r.user_id AND r2.status = 'finished'
      )
    GROUP BY r.user_id";

impl Store for SqliteStore {
    fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        self.conn()
            .execute(
                &format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
                params![
                    user.id,
                    user.wallet_address,
                    user.tickets,
                    user.stars,
                    user.referral_earnings,
                    user.referrer_id,
                    user.daily_attempts,
                    user.daily_attempts_day,
                    user.last_free_spin_at,
                    user.first_deposit_at,
                    user.created_at,
                ],
            )
            .map_err(insert_err("user"))?;
        Ok(())
    }

    fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                user_from_row,
            )
            .optional()?)
    }

    fn set_wallet(&self, id: UserId, address: &str) -> Result<bool, StoreError> {
        let changed = self.conn().execute(
            "UPDATE users SET wallet_address = ?2 WHERE id = ?1",
            params![id, address],
        )?;
        Ok(changed == 1)
    }

    fn debit(
        &self,
        id: UserId,
        currency: Currency,
        amount: u64,
    ) -> Result<Option<u64>, StoreError> {
        let sql = match currency {
            Currency::Tickets => {
                "UPDATE users SET tickets = tickets - ?2 WHERE id = ?1 AND tickets >= ?2 RETURNING tickets"
            }
            Currency::Stars => {
                "UPDATE users SET stars = stars - ?2 WHERE id = ?1 AND stars >= ?2 RETURNING stars"
            }
        };
        Ok(self
            .conn()
            .query_row(sql, params![id, amount], |row| row.get(0))
            .optional()?)
    }

    fn credit(
        &self,
        id: UserId,
        currency: Currency,
        amount: u64,
    ) -> Result<Option<u64>, StoreError> {
        let sql = match currency {
            Currency::Tickets => {
                "UPDATE users SET tickets = tickets + ?2 WHERE id = ?1 RETURNING tickets"
            }
            Currency::Stars => "UPDATE users SET stars = stars + ?2 WHERE id = ?1 RETURNING stars",
        };
        Ok(self
            .conn()
            .query_row(sql, params![id, amount], |row| row.get(0))
            .optional()?)
    }

    fn credit_referral(&self, id: UserId, amount: u64) -> Result<Option<u64>, StoreError> {
        Ok(self
            .conn()
            .query_row(
                "UPDATE users SET referral_earnings = referral_earnings + ?2 WHERE id = ?1 RETURNING referral_earnings",
                params![id, amount],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn debit_referral(&self, id: UserId, amount: u64) -> Result<bool, StoreError> {
        let changed = self.conn().execute(
            "UPDATE users SET referral_earnings = referral_earnings - ?2 WHERE id = ?1 AND referral_earnings >= ?2",
            params![id, amount],
        )?;
        Ok(changed == 1)
    }

    fn stamp_free_spin(
        &self,
        id: UserId,
        previous: Option<u64>,
        now: u64,
    ) -> Result<bool, StoreError> {
        let changed = self.conn().execute(
            "UPDATE users SET last_free_spin_at = ?3 WHERE id = ?1 AND last_free_spin_at IS ?2",
            params![id, previous, now],
        )?;
        Ok(changed == 1)
    }

    fn consume_daily_attempt(
        &self,
        id: UserId,
        day: u64,
        limit: u32,
    ) -> Result<Option<u32>, StoreError> {
        Ok(self
            .conn()
            .query_row(
                "UPDATE users SET
                     daily_attempts = CASE WHEN daily_attempts_day = ?2 THEN daily_attempts + 1 ELSE 1 END,
                     daily_attempts_day = ?2
                 WHERE id = ?1 AND (daily_attempts_day != ?2 OR daily_attempts < ?3)
                 RETURNING daily_attempts",
                params![id, day, limit],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn apply_deposit(&self, deposit: &Deposit) -> Result<u64, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO deposits (id, user_id, currency, amount, external_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                deposit.id.to_string(),
                deposit.user_id,
                deposit.currency.as_str(),
                deposit.amount,
                deposit.external_id,
                deposit.created_at,
            ],
        )
        .map_err(insert_err("deposit"))?;
        let sql = match deposit.currency {
            Currency::Tickets => {
                "UPDATE users SET tickets = tickets + ?2, first_deposit_at = COALESCE(first_deposit_at, ?3)
                 WHERE id = ?1 RETURNING tickets"
            }
            Currency::Stars => {
                "UPDATE users SET stars = stars + ?2, first_deposit_at = COALESCE(first_deposit_at, ?3)
                 WHERE id = ?1 RETURNING stars"
            }
        };
        let balance: Option<u64> = tx
            .query_row(
                sql,
                params![deposit.user_id, deposit.amount, deposit.created_at],
                |row| row.get(0),
            )
            .optional()?;
        let Some(balance) = balance else {
            return Err(StoreError::Corrupt(format!(
                "deposit for unknown user {}",
                deposit.user_id
            )));
        };
        tx.commit()?;
        Ok(balance)
    }

    fn insert_case(&self, case: &CaseDef) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO cases (id, name, price, active) VALUES (?1, ?2, ?3, ?4)",
            params![case.id, case.name, case.price, case.active],
        )
        .map_err(insert_err("case"))?;
        for item in &case.items {
            tx.execute(
                "INSERT INTO case_items (id, case_id, name, kind, weight, payout_value, gift_name)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    item.id,
                    case.id,
                    item.name,
                    item.kind.as_str(),
                    item.weight,
                    item.payout_value,
                    item.gift_name,
                ],
            )
            .map_err(insert_err("case item"))?;
        }
        tx.commit()?;
        Ok(())
    }

    fn case(&self, id: GameId) -> Result<Option<CaseDef>, StoreError> {
        let conn = self.conn();
        let header = conn
            .query_row(
                "SELECT id, name, price, active FROM cases WHERE id = ?1",
                params![id],
                |row| {
                    Ok(CaseDef {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        price: row.get(2)?,
                        active: row.get(3)?,
                        items: Vec::new(),
                    })
                },
            )
            .optional()?;
        let Some(mut case) = header else {
            return Ok(None);
        };
        let mut stmt = conn.prepare(
            "SELECT id, case_id, name, kind, weight, payout_value, gift_name
             FROM case_items WHERE case_id = ?1 ORDER BY id",
        )?;
        let items = stmt.query_map(params![id], |row| {
            Ok(CaseItem {
                id: row.get(0)?,
                case_id: row.get(1)?,
                name: row.get(2)?,
                kind: text(row, 3)?,
                weight: row.get(4)?,
                payout_value: row.get(5)?,
                gift_name: row.get(6)?,
            })
        })?;
        for item in items {
            case.items.push(item?);
        }
        Ok(Some(case))
    }

    fn insert_slot(&self, slot: &SlotDef) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO slots (id, name, price, active, prize, triple_payout)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    slot.id,
                    slot.name,
                    slot.price,
                    slot.active,
                    to_json(&slot.prize)?,
                    slot.triple_payout,
                ],
            )
            .map_err(insert_err("slot"))?;
        Ok(())
    }

    fn slot(&self, id: GameId) -> Result<Option<SlotDef>, StoreError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT id, name, price, active, prize, triple_payout FROM slots WHERE id = ?1",
                params![id],
                |row| {
                    Ok(SlotDef {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        price: row.get(2)?,
                        active: row.get(3)?,
                        prize: json(row, 4)?,
                        triple_payout: row.get(5)?,
                    })
                },
            )
            .optional()?)
    }

    fn insert_spin(&self, spin: &SpinRecord) -> Result<(), StoreError> {
        let prize = spin.prize.as_ref().map(to_json).transpose()?;
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO spins ({SPIN_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
                ),
                params![
                    spin.id.to_string(),
                    spin.kind.as_str(),
                    spin.game_id,
                    spin.user_id,
                    spin.item_id,
                    prize,
                    spin.payout_value,
                    spin.draw_value,
                    spin.weight_total,
                    spin.price_paid,
                    spin.currency.as_str(),
                    spin.free,
                    spin.status.as_str(),
                    spin.idempotency_key,
                    spin.created_at,
                    spin.updated_at,
                ],
            )
            .map_err(insert_err("idempotency key"))?;
        Ok(())
    }

    fn spin(&self, id: Uuid) -> Result<Option<SpinRecord>, StoreError> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {SPIN_COLUMNS} FROM spins WHERE id = ?1"),
                params![id.to_string()],
                spin_from_row,
            )
            .optional()?)
    }

    fn spin_by_key(&self, key: &str) -> Result<Option<SpinRecord>, StoreError> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {SPIN_COLUMNS} FROM spins WHERE idempotency_key = ?1"),
                params![key],
                spin_from_row,
            )
            .optional()?)
    }

    fn transition_spin(
        &self,
        id: Uuid,
        from: SpinStatus,
        to: SpinStatus,
        now: u64,
    ) -> Result<bool, StoreError> {
        if !from.can_transition_to(to) {
            return Ok(false);
        }
        let changed = self.conn().execute(
            "UPDATE spins SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
            params![id.to_string(), from.as_str(), to.as_str(), now],
        )?;
        Ok(changed == 1)
    }

    fn settle_spin_reward(
        &self,
        spin_id: Uuid,
        from: SpinStatus,
        reward: &PendingReward,
    ) -> Result<bool, StoreError> {
        if !from.can_transition_to(SpinStatus::RewardSent) {
            return Ok(false);
        }
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE spins SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
            params![
                spin_id.to_string(),
                from.as_str(),
                SpinStatus::RewardSent.as_str(),
                reward.created_at,
            ],
        )?;
        if changed != 1 {
            return Ok(false);
        }
        insert_reward_tx(&tx, reward)?;
        tx.commit()?;
        Ok(true)
    }

    fn insert_gift_pool(&self, gift_name: &str, infinite: bool) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO gift_pools (gift_name, infinite) VALUES (?1, ?2)
             ON CONFLICT (gift_name) DO UPDATE SET infinite = excluded.infinite",
            params![gift_name, infinite],
        )?;
        Ok(())
    }

    fn insert_gift_entry(&self, gift_name: &str, number: u64) -> Result<i64, StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO gift_pools (gift_name, infinite) VALUES (?1, 0)",
            params![gift_name],
        )?;
        conn.execute(
            "INSERT INTO gift_entries (gift_name, number, used) VALUES (?1, ?2, 0)",
            params![gift_name, number],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn reserve_gift(&self, gift_name: &str) -> Result<Option<GiftReservation>, StoreError> {
        let conn = self.conn();
        let infinite: Option<bool> = conn
            .query_row(
                "SELECT infinite FROM gift_pools WHERE gift_name = ?1",
                params![gift_name],
                |row| row.get(0),
            )
            .optional()?;
        match infinite {
            None => Ok(None),
            Some(true) => Ok(Some(GiftReservation::Infinite)),
            Some(false) => Ok(conn
                .query_row(
                    "UPDATE gift_entries SET used = 1
                     WHERE id = (
                         SELECT id FROM gift_entries WHERE gift_name = ?1 AND used = 0
                         ORDER BY id LIMIT 1
                     ) AND used = 0
                     RETURNING id, number",
                    params![gift_name],
                    |row| {
                        Ok(GiftReservation::Entry {
                            id: row.get(0)?,
                            number: row.get(1)?,
                        })
                    },
                )
                .optional()?),
        }
    }

    fn release_gift(&self, entry_id: i64) -> Result<bool, StoreError> {
        let changed = self.conn().execute(
            "UPDATE gift_entries SET used = 0 WHERE id = ?1 AND used = 1",
            params![entry_id],
        )?;
        Ok(changed == 1)
    }

    fn available_gifts(&self, gift_name: &str) -> Result<u64, StoreError> {
        Ok(self.conn().query_row(
            "SELECT COUNT(*) FROM gift_entries WHERE gift_name = ?1 AND used = 0",
            params![gift_name],
            |row| row.get(0),
        )?)
    }

    fn insert_reward(&self, reward: &PendingReward) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        insert_reward_tx(&tx, reward)?;
        tx.commit()?;
        Ok(())
    }

    fn reward(&self, id: Uuid) -> Result<Option<PendingReward>, StoreError> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {REWARD_COLUMNS} FROM rewards WHERE id = ?1"),
                params![id.to_string()],
                reward_from_row,
            )
            .optional()?)
    }

    fn rewards_for_user(
        &self,
        user: UserId,
        pending_only: bool,
    ) -> Result<Vec<PendingReward>, StoreError> {
        let conn = self.conn();
        let sql = if pending_only {
            format!("SELECT {REWARD_COLUMNS} FROM rewards WHERE user_id = ?1 AND status = 'pending' ORDER BY created_at, id")
        } else {
            format!("SELECT {REWARD_COLUMNS} FROM rewards WHERE user_id = ?1 ORDER BY created_at, id")
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user], reward_from_row)?;
        let mut rewards = Vec::new();
        for row in rows {
            rewards.push(row?);
        }
        Ok(rewards)
    }

    fn confirm_reward(
        &self,
        id: Uuid,
        gift_entry_id: Option<i64>,
        now: u64,
    ) -> Result<bool, StoreError> {
        let changed = self.conn().execute(
            "UPDATE rewards SET status = 'confirmed', updated_at = ?3,
                 gift_entry_id = COALESCE(gift_entry_id, ?2)
             WHERE id = ?1 AND status = 'pending'",
            params![id.to_string(), gift_entry_id, now],
        )?;
        Ok(changed == 1)
    }

    fn fail_reward(
        &self,
        id: Uuid,
        from: RewardStatus,
        failure: &str,
        now: u64,
    ) -> Result<bool, StoreError> {
        if !from.can_transition_to(RewardStatus::Failed) {
            return Ok(false);
        }
        let changed = self.conn().execute(
            "UPDATE rewards SET status = 'failed', failure = ?3, updated_at = ?4
             WHERE id = ?1 AND status = ?2",
            params![id.to_string(), from.as_str(), failure, now],
        )?;
        Ok(changed == 1)
    }

    fn insert_wheel(&self, wheel: &WheelDef) -> Result<(), StoreError> {
        self.conn()
            .execute(
                &format!("INSERT INTO wheels ({WHEEL_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
                params![
                    wheel.id,
                    wheel.price,
                    wheel.size,
                    to_json(&wheel.prize)?,
                    wheel.status.as_str(),
                    wheel.filled_at,
                    wheel.draw_at,
                    wheel.winner_id,
                    wheel.created_at,
                ],
            )
            .map_err(insert_err("wheel"))?;
        Ok(())
    }

    fn wheel(&self, id: GameId) -> Result<Option<WheelDef>, StoreError> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {WHEEL_COLUMNS} FROM wheels WHERE id = ?1"),
                params![id],
                wheel_from_row,
            )
            .optional()?)
    }

    fn wheel_participants(&self, id: GameId) -> Result<Vec<UserId>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT user_id FROM wheel_participants WHERE wheel_id = ?1 ORDER BY joined_at, rowid",
        )?;
        let rows = stmt.query_map(params![id], |row| row.get(0))?;
        let mut participants = Vec::new();
        for row in rows {
            participants.push(row?);
        }
        Ok(participants)
    }

    fn join_wheel(
        &self,
        id: GameId,
        user: UserId,
        now: u64,
        draw_delay_ms: u64,
    ) -> Result<JoinResult, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let header: Option<(String, u32)> = tx
            .query_row(
                "SELECT status, size FROM wheels WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((status, size)) = header else {
            return Ok(JoinResult::Closed);
        };
        if status != WheelStatus::Active.as_str() {
            return Ok(JoinResult::Closed);
        }
        let count: u32 = tx.query_row(
            "SELECT COUNT(*) FROM wheel_participants WHERE wheel_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if count >= size {
            return Ok(JoinResult::Full);
        }
        match tx.execute(
            "INSERT INTO wheel_participants (wheel_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
            params![id, user, now],
        ) {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => return Ok(JoinResult::AlreadyJoined),
            Err(err) => return Err(err.into()),
        }
        let participants = count + 1;
        let filled = participants == size;
        if filled {
            tx.execute(
                "UPDATE wheels SET filled_at = ?2, draw_at = ?3 WHERE id = ?1",
                params![id, now, now.saturating_add(draw_delay_ms)],
            )?;
        }
        tx.commit()?;
        Ok(JoinResult::Joined {
            participants,
            filled,
        })
    }

    fn complete_wheel(
        &self,
        result: &WheelResult,
        reward: &PendingReward,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE wheels SET status = 'completed', winner_id = ?2 WHERE id = ?1 AND status = 'active'",
            params![result.wheel_id, result.winner_id],
        )?;
        if changed != 1 {
            return Ok(false);
        }
        tx.execute(
            "INSERT INTO wheel_results (wheel_id, winner_id, draw_value, participants, drawn_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                result.wheel_id,
                result.winner_id,
                result.draw_value,
                result.participants,
                result.drawn_at,
            ],
        )
        .map_err(insert_err("wheel result"))?;
        insert_reward_tx(&tx, reward)?;
        tx.commit()?;
        Ok(true)
    }

    fn due_wheels(&self, now: u64) -> Result<Vec<GameId>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id FROM wheels WHERE status = 'active' AND draw_at IS NOT NULL AND draw_at <= ?1
             ORDER BY draw_at, id",
        )?;
        let rows = stmt.query_map(params![now], |row| row.get(0))?;
        let mut due = Vec::new();
        for row in rows {
            due.push(row?);
        }
        Ok(due)
    }

    fn insert_withdrawal(&self, withdrawal: &Withdrawal) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO withdrawals (id, user_id, amount, address, status, transfer_ref, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    withdrawal.id.to_string(),
                    withdrawal.user_id,
                    withdrawal.amount,
                    withdrawal.address,
                    withdrawal.status.as_str(),
                    withdrawal.transfer_ref,
                    withdrawal.created_at,
                    withdrawal.updated_at,
                ],
            )
            .map_err(insert_err("withdrawal"))?;
        Ok(())
    }

    fn withdrawal(&self, id: Uuid) -> Result<Option<Withdrawal>, StoreError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT id, user_id, amount, address, status, transfer_ref, created_at, updated_at
                 FROM withdrawals WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok(Withdrawal {
                        id: text(row, 0)?,
                        user_id: row.get(1)?,
                        amount: row.get(2)?,
                        address: row.get(3)?,
                        status: text(row, 4)?,
                        transfer_ref: row.get(5)?,
                        created_at: row.get(6)?,
                        updated_at: row.get(7)?,
                    })
                },
            )
            .optional()?)
    }

    fn update_withdrawal(
        &self,
        id: Uuid,
        status: WithdrawalStatus,
        transfer_ref: Option<&str>,
        now: u64,
    ) -> Result<bool, StoreError> {
        let changed = self.conn().execute(
            "UPDATE withdrawals SET status = ?2, transfer_ref = COALESCE(?3, transfer_ref), updated_at = ?4
             WHERE id = ?1 AND status = 'pending'",
            params![id.to_string(), status.as_str(), transfer_ref, now],
        )?;
        Ok(changed == 1)
    }

    fn insert_period(&self, starts_at: u64, ends_at: u64) -> Result<Period, StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO periods (starts_at, ends_at, status) VALUES (?1, ?2, 'active')",
            params![starts_at, ends_at],
        )?;
        Ok(Period {
            id: conn.last_insert_rowid(),
            starts_at,
            ends_at,
            status: PeriodStatus::Active,
        })
    }

    fn period(&self, id: i64) -> Result<Option<Period>, StoreError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT id, starts_at, ends_at, status FROM periods WHERE id = ?1",
                params![id],
                period_from_row,
            )
            .optional()?)
    }

    fn active_period(&self, now: u64) -> Result<Option<Period>, StoreError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT id, starts_at, ends_at, status FROM periods
                 WHERE status = 'active' AND starts_at <= ?1 AND ends_at > ?1
                 ORDER BY starts_at DESC LIMIT 1",
                params![now],
                period_from_row,
            )
            .optional()?)
    }

    fn insert_run(&self, run: &Run) -> Result<(), StoreError> {
        self.conn()
            .execute(
                &format!("INSERT INTO runs ({RUN_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                params![
                    run.id.to_string(),
                    run.period_id,
                    run.user_id,
                    run.score,
                    run.status.as_str(),
                    run.started_at,
                    run.finished_at,
                ],
            )
            .map_err(insert_err("run"))?;
        Ok(())
    }

    fn run(&self, id: Uuid) -> Result<Option<Run>, StoreError> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1"),
                params![id.to_string()],
                run_from_row,
            )
            .optional()?)
    }

    fn finish_run(
        &self,
        id: Uuid,
        user: UserId,
        score: u64,
        now: u64,
    ) -> Result<bool, StoreError> {
        let changed = self.conn().execute(
            "UPDATE runs SET status = 'finished', score = ?3, finished_at = ?4
             WHERE id = ?1 AND user_id = ?2 AND status = 'active'",
            params![id.to_string(), user, score, now],
        )?;
        Ok(changed == 1)
    }

    fn rollover_periods(&self, now: u64, period_ms: u64) -> Result<Vec<Period>, StoreError> {
        let period_ms = period_ms.max(1);
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let ended = {
            let mut stmt = tx.prepare(
                "SELECT id, starts_at, ends_at, status FROM periods
                 WHERE status = 'active' AND ends_at <= ?1 ORDER BY ends_at",
            )?;
            let rows = stmt.query_map(params![now], period_from_row)?;
            let mut ended = Vec::new();
            for row in rows {
                ended.push(row?);
            }
            ended
        };

        let mut latest_end = None;
        for period in &ended {
            tx.execute(
                "UPDATE runs SET status = 'expired' WHERE period_id = ?1 AND status = 'active'",
                params![period.id],
            )?;
            tx.execute(
                &format!(
                    "INSERT OR REPLACE INTO weekly_scores (period_id, user_id, best_score, achieved_at)
                     SELECT ?1, user_id, score, achieved_at FROM ({BEST_SCORES})"
                ),
                params![period.id],
            )?;
            tx.execute(
                "UPDATE periods SET status = 'finalized' WHERE id = ?1",
                params![period.id],
            )?;
            latest_end = Some(latest_end.map_or(period.ends_at, |end: u64| end.max(period.ends_at)));
        }

        let still_active: u32 = tx.query_row(
            "SELECT COUNT(*) FROM periods WHERE status = 'active'",
            [],
            |row| row.get(0),
        )?;
        if still_active == 0 {
            let starts_at = match latest_end {
                // Skip windows that elapsed entirely while nobody swept.
                Some(end) if now >= end => end + (now - end) / period_ms * period_ms,
                Some(end) => end,
                None => now,
            };
            tx.execute(
                "INSERT INTO periods (starts_at, ends_at, status) VALUES (?1, ?2, 'active')",
                params![starts_at, starts_at.saturating_add(period_ms)],
            )?;
        }
        tx.commit()?;

        Ok(ended
            .into_iter()
            .map(|period| Period {
                status: PeriodStatus::Finalized,
                ..period
            })
            .collect())
    }

    fn weekly_scores(&self, period_id: i64, limit: u32) -> Result<Vec<ScoreRow>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT user_id, best_score, achieved_at FROM weekly_scores WHERE period_id = ?1
             ORDER BY best_score DESC, achieved_at ASC, user_id ASC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![period_id, limit], score_from_row)?;
        let mut scores = Vec::new();
        for row in rows {
            scores.push(row?);
        }
        Ok(scores)
    }

    fn live_scores(&self, period_id: i64, limit: u32) -> Result<Vec<ScoreRow>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT user_id, score, achieved_at FROM (
                 SELECT user_id, score, achieved_at FROM ({BEST_SCORES})
             ) ORDER BY score DESC, achieved_at ASC, user_id ASC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![period_id, limit], score_from_row)?;
        let mut scores = Vec::new();
        for row in rows {
            scores.push(row?);
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use starspin_types::{PrizeDescriptor, RewardSource};

    fn store_with_user(id: UserId, tickets: u64) -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut user = User::new(id, None, 0);
        user.tickets = tickets;
        store.insert_user(&user).unwrap();
        store
    }

    #[test]
    fn debit_refuses_to_overdraw() {
        let store = store_with_user(1, 100);
        assert_eq!(store.debit(1, Currency::Tickets, 60).unwrap(), Some(40));
        assert_eq!(store.debit(1, Currency::Tickets, 60).unwrap(), None);
        assert_eq!(store.user(1).unwrap().unwrap().tickets, 40);
        assert_eq!(store.debit(2, Currency::Tickets, 1).unwrap(), None);
    }

    #[test]
    fn duplicate_user_is_reported() {
        let store = store_with_user(1, 0);
        let err = store.insert_user(&User::new(1, None, 0)).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate("user")));
    }

    #[test]
    fn deposit_credits_once_per_external_id() {
        let store = store_with_user(1, 0);
        let deposit = Deposit {
            id: Uuid::new_v4(),
            user_id: 1,
            currency: Currency::Stars,
            amount: 50,
            external_id: "charge-1".to_string(),
            created_at: 10,
        };
        assert_eq!(store.apply_deposit(&deposit).unwrap(), 50);
        let retried = Deposit {
            id: Uuid::new_v4(),
            ..deposit
        };
        assert!(matches!(
            store.apply_deposit(&retried),
            Err(StoreError::Duplicate("deposit"))
        ));
        let user = store.user(1).unwrap().unwrap();
        assert_eq!(user.stars, 50);
        assert_eq!(user.first_deposit_at, Some(10));
    }

    #[test]
    fn gift_reservation_consumes_each_entry_once() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_gift_pool("bear", false).unwrap();
        let first = store.insert_gift_entry("bear", 7).unwrap();
        assert_eq!(
            store.reserve_gift("bear").unwrap(),
            Some(GiftReservation::Entry { id: first, number: 7 })
        );
        assert_eq!(store.reserve_gift("bear").unwrap(), None);
        assert!(store.release_gift(first).unwrap());
        assert!(!store.release_gift(first).unwrap());
        assert_eq!(store.available_gifts("bear").unwrap(), 1);
        assert_eq!(store.reserve_gift("unknown").unwrap(), None);
    }

    #[test]
    fn infinite_pool_is_never_consumed() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_gift_pool("rose", true).unwrap();
        for _ in 0..3 {
            assert_eq!(
                store.reserve_gift("rose").unwrap(),
                Some(GiftReservation::Infinite)
            );
        }
    }

    #[test]
    fn reward_confirmation_is_compare_and_swap() {
        let store = store_with_user(1, 0);
        let reward = PendingReward::new(
            RewardSource::Wheel,
            1,
            PrizeDescriptor::Stars { amount: 5 },
            1,
        );
        store.insert_reward(&reward).unwrap();
        assert!(store.confirm_reward(reward.id, None, 2).unwrap());
        assert!(!store.confirm_reward(reward.id, None, 3).unwrap());
        let stored = store.reward(reward.id).unwrap().unwrap();
        assert_eq!(stored.status, RewardStatus::Confirmed);
        assert!(store.rewards_for_user(1, true).unwrap().is_empty());
    }

    #[test]
    fn reward_failure_follows_status_rules() {
        let store = store_with_user(1, 0);
        let reward = PendingReward::new(
            RewardSource::Case,
            1,
            PrizeDescriptor::Stars { amount: 5 },
            1,
        );
        store.insert_reward(&reward).unwrap();
        // Stored status is pending, so a confirmed -> failed update misses.
        assert!(!store
            .fail_reward(reward.id, RewardStatus::Confirmed, "lost", 2)
            .unwrap());
        assert!(store.confirm_reward(reward.id, None, 2).unwrap());
        assert!(store
            .fail_reward(reward.id, RewardStatus::Confirmed, "lost", 3)
            .unwrap());
        assert!(!store
            .fail_reward(reward.id, RewardStatus::Failed, "again", 4)
            .unwrap());
        let stored = store.reward(reward.id).unwrap().unwrap();
        assert_eq!(stored.status, RewardStatus::Failed);
        assert_eq!(stored.failure.as_deref(), Some("lost"));
    }

    #[test]
    fn daily_attempts_reset_on_new_day() {
        let store = store_with_user(1, 0);
        assert_eq!(store.consume_daily_attempt(1, 5, 2).unwrap(), Some(1));
        assert_eq!(store.consume_daily_attempt(1, 5, 2).unwrap(), Some(2));
        assert_eq!(store.consume_daily_attempt(1, 5, 2).unwrap(), None);
        assert_eq!(store.consume_daily_attempt(1, 6, 2).unwrap(), Some(1));
    }

    #[test]
    fn free_spin_stamp_requires_previous_value() {
        let store = store_with_user(1, 0);
        assert!(store.stamp_free_spin(1, None, 100).unwrap());
        assert!(!store.stamp_free_spin(1, None, 200).unwrap());
        assert!(store.stamp_free_spin(1, Some(100), 200).unwrap());
    }

    #[test]
    fn join_wheel_enforces_capacity_and_uniqueness() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert_wheel(&WheelDef {
                id: 9,
                price: 1,
                size: 2,
                prize: PrizeDescriptor::Stars { amount: 10 },
                status: WheelStatus::Active,
                filled_at: None,
                draw_at: None,
                winner_id: None,
                created_at: 0,
            })
            .unwrap();
        assert_eq!(
            store.join_wheel(9, 1, 10, 500).unwrap(),
            JoinResult::Joined {
                participants: 1,
                filled: false
            }
        );
        assert_eq!(store.join_wheel(9, 1, 11, 500).unwrap(), JoinResult::AlreadyJoined);
        assert_eq!(
            store.join_wheel(9, 2, 12, 500).unwrap(),
            JoinResult::Joined {
                participants: 2,
                filled: true
            }
        );
        assert_eq!(store.join_wheel(9, 3, 13, 500).unwrap(), JoinResult::Full);
        assert_eq!(store.wheel(9).unwrap().unwrap().draw_at, Some(512));
        assert_eq!(store.due_wheels(511).unwrap(), Vec::<GameId>::new());
        assert_eq!(store.due_wheels(512).unwrap(), vec![9]);
    }
}
