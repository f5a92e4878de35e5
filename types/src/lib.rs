//! Common types used throughout starspin.
//!
//! Records mirror the rows of the relational store one-to-one. Enumerations
//! that are persisted as text expose `as_str` and `FromStr` so the storage and
//! HTTP layers agree on a single spelling.

pub mod api;
pub mod constants;
pub mod error;
pub mod game;
pub mod reward;
pub mod run;
pub mod spin;
pub mod user;

pub use error::{ErrorBody, ErrorKind, ParseEnumError, Reason};
pub use game::{
    CaseDef, CaseItem, GameId, ItemKind, PrizeDescriptor, SlotDef, WheelDef, WheelResult,
    WheelStatus,
};
pub use reward::{GiftReservation, PendingReward, RewardSource, RewardStatus};
pub use run::{LeaderboardEntry, Period, PeriodStatus, Run, RunStatus, ScoreRow};
pub use spin::{SpinKind, SpinRecord, SpinStatus};
pub use user::{Balances, Currency, Deposit, User, UserId, Withdrawal, WithdrawalStatus};

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum persisted as text.
#[macro_export]
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::ParseEnumError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok(Self::$variant),)+
                    other => Err($crate::ParseEnumError {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}
