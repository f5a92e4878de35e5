//! Run2048 scoring periods and leaderboards.

use starspin_types::api::LeaderboardView;
use starspin_types::constants::DAY_MS;
use starspin_types::{LeaderboardEntry, Period, PeriodStatus, Run, RunStatus, ScoreRow, UserId};
use uuid::Uuid;

use crate::{Engine, EngineError};

/// Competition ranking ("1224") over rows already sorted best first.
pub fn rank_scores(rows: &[ScoreRow]) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = Vec::with_capacity(rows.len());
    for (position, row) in rows.iter().enumerate() {
        let rank = match entries.last() {
            Some(previous) if previous.score == row.best_score => previous.rank,
            _ => position as u32 + 1,
        };
        entries.push(LeaderboardEntry {
            rank,
            user_id: row.user_id,
            score: row.best_score,
        });
    }
    entries
}

impl Engine {
    /// Starts a run in the active period, consuming one of today's attempts.
    pub async fn start_run(&self, user: UserId, now: u64) -> Result<Run, EngineError> {
        self.guard.check_rate(user)?;
        let _lock = self.guard.lock_user(user).await;
        if self.store.user(user)?.is_none() {
            return Err(EngineError::UserNotFound);
        }
        let period = self
            .store
            .active_period(now)?
            .ok_or(EngineError::NoActivePeriod)?;
        let attempts = self
            .store
            .consume_daily_attempt(user, now / DAY_MS, self.config.run_daily_attempts)?
            .ok_or(EngineError::DailyLimitReached)?;
        let run = Run {
            id: Uuid::new_v4(),
            period_id: period.id,
            user_id: user,
            score: 0,
            status: RunStatus::Active,
            started_at: now,
            finished_at: None,
        };
        self.store.insert_run(&run)?;
        tracing::info!(
            user_id = user,
            run_id = %run.id,
            period_id = period.id,
            attempts,
            "run started"
        );
        Ok(run)
    }

    pub async fn finish_run(
        &self,
        user: UserId,
        run_id: Uuid,
        score: u64,
        now: u64,
    ) -> Result<Run, EngineError> {
        self.guard.check_rate(user)?;
        let _lock = self.guard.lock_user(user).await;
        let mut run = self
            .store
            .run(run_id)?
            .filter(|run| run.user_id == user)
            .ok_or(EngineError::RunNotFound)?;
        if run.status != RunStatus::Active {
            return Err(EngineError::RunNotActive);
        }
        let period = self
            .store
            .period(run.period_id)?
            .ok_or(EngineError::PeriodNotFound)?;
        if period.status != PeriodStatus::Active || now >= period.ends_at {
            return Err(EngineError::NoActivePeriod);
        }
        if !self.store.finish_run(run.id, user, score, now)? {
            return Err(EngineError::RunNotActive);
        }
        run.status = RunStatus::Finished;
        run.score = score;
        run.finished_at = Some(now);
        tracing::info!(user_id = user, run_id = %run.id, score, "run finished");
        Ok(run)
    }

    /// Finalizes ended periods and opens their successor in one transaction.
    pub fn rollover(&self, now: u64) -> Result<Vec<Period>, EngineError> {
        let finalized = self
            .store
            .rollover_periods(now, self.config.run_period_ms)?;
        for period in &finalized {
            tracing::info!(
                period_id = period.id,
                ends_at = period.ends_at,
                "period finalized"
            );
        }
        Ok(finalized)
    }

    pub fn leaderboard(
        &self,
        period_id: i64,
        limit: Option<u32>,
    ) -> Result<LeaderboardView, EngineError> {
        let period = self
            .store
            .period(period_id)?
            .ok_or(EngineError::PeriodNotFound)?;
        let limit = limit
            .unwrap_or(self.config.leaderboard_limit)
            .min(self.config.leaderboard_limit);
        let finalized = period.status == PeriodStatus::Finalized;
        let rows = if finalized {
            self.store.weekly_scores(period_id, limit)?
        } else {
            self.store.live_scores(period_id, limit)?
        };
        Ok(LeaderboardView {
            period_id,
            finalized,
            entries: rank_scores(&rows),
        })
    }
}
