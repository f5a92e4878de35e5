/// Ticket minor units per whole ticket (tickets are TON-denominated nano units).
pub const NANO_PER_TICKET: u64 = 1_000_000_000;

/// Basis-point denominator used for referral rates.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Milliseconds in one UTC day.
pub const DAY_MS: u64 = 24 * 60 * 60 * 1_000;

/// Telegram slot-machine dice yield a value in `1..=SLOT_FACES`.
pub const SLOT_FACES: u32 = 64;

/// Dice value for three sevens.
pub const SLOT_JACKPOT: u32 = 64;

/// Dice values for the three non-seven triples (bar, grapes, lemon).
pub const SLOT_TRIPLES: [u32; 3] = [1, 22, 43];

/// Maximum accepted idempotency key length.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// Maximum accepted wallet address length.
pub const MAX_WALLET_ADDRESS_LEN: usize = 128;
