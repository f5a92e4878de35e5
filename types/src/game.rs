use serde::{Deserialize, Serialize};

use crate::user::{Currency, UserId};

/// Administrator-assigned id of a case, slot or wheel definition.
pub type GameId = i64;

/// What a won outcome hands to the user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrizeDescriptor {
    /// One unit from the named gift pool.
    Gift { gift_name: String },
    Stars { amount: u64 },
    Tickets { amount: u64 },
}

impl PrizeDescriptor {
    /// Currency and amount for prizes settled through the ledger.
    pub fn currency_amount(&self) -> Option<(Currency, u64)> {
        match self {
            PrizeDescriptor::Gift { .. } => None,
            PrizeDescriptor::Stars { amount } => Some((Currency::Stars, *amount)),
            PrizeDescriptor::Tickets { amount } => Some((Currency::Tickets, *amount)),
        }
    }

    pub fn gift_name(&self) -> Option<&str> {
        match self {
            PrizeDescriptor::Gift { gift_name } => Some(gift_name),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Gift,
    Stars,
    Lose,
}

crate::text_enum!(ItemKind {
    Gift => "gift",
    Stars => "stars",
    Lose => "lose",
});

/// Weighted candidate of a case.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaseItem {
    pub id: i64,
    pub case_id: GameId,
    pub name: String,
    pub kind: ItemKind,
    /// Relative weight; `0.0` keeps the item visible but never drawn.
    pub weight: f64,
    /// Stars credited for `stars` items, tickets credited on reroll of `gift` items.
    pub payout_value: u64,
    pub gift_name: Option<String>,
}

impl CaseItem {
    pub fn prize(&self) -> Option<PrizeDescriptor> {
        match self.kind {
            ItemKind::Gift => Some(PrizeDescriptor::Gift {
                gift_name: self.gift_name.clone().unwrap_or_else(|| self.name.clone()),
            }),
            ItemKind::Stars => Some(PrizeDescriptor::Stars {
                amount: self.payout_value,
            }),
            ItemKind::Lose => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaseDef {
    pub id: GameId,
    pub name: String,
    /// Ticket price of one spin.
    pub price: u64,
    pub active: bool,
    pub items: Vec<CaseItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDef {
    pub id: GameId,
    pub name: String,
    /// Stars price of one spin.
    pub price: u64,
    pub active: bool,
    /// Awarded on the jackpot face.
    pub prize: PrizeDescriptor,
    /// Stars awarded on the other triples; `0` turns them into losses.
    pub triple_payout: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WheelStatus {
    Active,
    Completed,
}

crate::text_enum!(WheelStatus {
    Active => "active",
    Completed => "completed",
});

/// Fixed-size pooled raffle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelDef {
    pub id: GameId,
    /// Ticket entry price.
    pub price: u64,
    pub size: u32,
    pub prize: PrizeDescriptor,
    pub status: WheelStatus,
    pub filled_at: Option<u64>,
    /// When the sweep should run the draw; set by the filling join.
    pub draw_at: Option<u64>,
    pub winner_id: Option<UserId>,
    pub created_at: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WheelResult {
    pub wheel_id: GameId,
    pub winner_id: UserId,
    pub draw_value: f64,
    pub participants: u32,
    pub drawn_at: u64,
}
