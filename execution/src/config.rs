use serde::{Deserialize, Serialize};
use starspin_types::{constants::DAY_MS, constants::NANO_PER_TICKET, GameId};

pub const DEFAULT_CASE_REFERRAL_BPS: u64 = 1_000;
pub const DEFAULT_WHEEL_REFERRAL_BPS: u64 = 1_000;
pub const DEFAULT_SLOT_REFERRAL_BPS: u64 = 500;
pub const DEFAULT_FREE_SPIN_COOLDOWN_MS: u64 = DAY_MS;
pub const DEFAULT_SLOT_WITHDRAW_FEE_STARS: u64 = 25;
pub const DEFAULT_REFERRAL_MIN_WITHDRAW: u64 = NANO_PER_TICKET;
pub const DEFAULT_WHEEL_DRAW_DELAY_MS: u64 = 10_000;
pub const DEFAULT_DEDUPE_WINDOW_MS: u64 = 1_500;
pub const DEFAULT_RATE_LIMIT_PER_SECOND: u32 = 5;
pub const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 60;
pub const DEFAULT_EXTERNAL_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_RUN_DAILY_ATTEMPTS: u32 = 5;
pub const DEFAULT_RUN_PERIOD_MS: u64 = 7 * DAY_MS;
pub const DEFAULT_LEADERBOARD_LIMIT: u32 = 100;

/// Tunables of the settlement engine.
///
/// A value of `0` for a rate limit or the dedupe window disables that check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub case_referral_bps: u64,
    pub wheel_referral_bps: u64,
    /// Applied after converting the stars price to tickets.
    pub slot_referral_bps: u64,
    pub free_spin_cooldown_ms: u64,
    /// Restricts free spins to one case when set.
    pub free_case_id: Option<GameId>,
    pub slot_withdraw_fee_stars: u64,
    pub referral_min_withdraw: u64,
    pub wheel_draw_delay_ms: u64,
    pub dedupe_window_ms: u64,
    pub rate_limit_per_second: u32,
    pub rate_limit_per_minute: u32,
    pub external_timeout_ms: u64,
    pub run_daily_attempts: u32,
    pub run_period_ms: u64,
    pub leaderboard_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            case_referral_bps: DEFAULT_CASE_REFERRAL_BPS,
            wheel_referral_bps: DEFAULT_WHEEL_REFERRAL_BPS,
            slot_referral_bps: DEFAULT_SLOT_REFERRAL_BPS,
            free_spin_cooldown_ms: DEFAULT_FREE_SPIN_COOLDOWN_MS,
            free_case_id: None,
            slot_withdraw_fee_stars: DEFAULT_SLOT_WITHDRAW_FEE_STARS,
            referral_min_withdraw: DEFAULT_REFERRAL_MIN_WITHDRAW,
            wheel_draw_delay_ms: DEFAULT_WHEEL_DRAW_DELAY_MS,
            dedupe_window_ms: DEFAULT_DEDUPE_WINDOW_MS,
            rate_limit_per_second: DEFAULT_RATE_LIMIT_PER_SECOND,
            rate_limit_per_minute: DEFAULT_RATE_LIMIT_PER_MINUTE,
            external_timeout_ms: DEFAULT_EXTERNAL_TIMEOUT_MS,
            run_daily_attempts: DEFAULT_RUN_DAILY_ATTEMPTS,
            run_period_ms: DEFAULT_RUN_PERIOD_MS,
            leaderboard_limit: DEFAULT_LEADERBOARD_LIMIT,
        }
    }
}

impl EngineConfig {
    /// Configuration for tests: no rate limits, no dedupe window.
    pub fn unthrottled() -> Self {
        Self {
            dedupe_window_ms: 0,
            rate_limit_per_second: 0,
            rate_limit_per_minute: 0,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"slot_withdraw_fee_stars": 10}"#).unwrap();
        assert_eq!(config.slot_withdraw_fee_stars, 10);
        assert_eq!(config.case_referral_bps, DEFAULT_CASE_REFERRAL_BPS);
        assert_eq!(config.free_case_id, None);
    }
}
