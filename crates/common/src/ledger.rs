//! # Ledger Documents
//!
//! Document types persisted by a [`LedgerStore`](crate::store::LedgerStore):
//!
//! - [`User`]: identity, balances, referral edges, and mining session state.
//! - [`Claim`]: immutable payout record created by the claim processor.
//!
//! ## Invariants
//!
//! 1. `mined_balance` and `referred_balance` are never negative. The store
//!    rejects any write that would violate this.
//! 2. `referral_code` is assigned once at signup and never changes.
//! 3. `reference_from` never names the user's own referral code.
//! 4. `mining == true` implies `mining_started_at.is_some()` for sessions
//!    started by the accrual supervisor. Legacy documents flagged mining
//!    without a session timestamp are repaired at recovery.
//!
//! ## Amounts
//!
//! All monetary figures are [`Decimal`] fixed-point values. Rounding is
//! applied only where a figure is persisted or displayed, via
//! [`round_amount`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ════════════════════════════════════════════════════════════════════════════
// IDENTIFIERS
// ════════════════════════════════════════════════════════════════════════════

/// Primary key of a [`User`] document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Primary key of a [`Claim`] document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimId(Uuid);

impl ClaimId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClaimId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ClaimId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// AMOUNTS
// ════════════════════════════════════════════════════════════════════════════

/// Round `value` to `dp` decimal places, halves away from zero.
pub fn round_amount(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// `amount * percent / 100` at full precision.
pub fn percent_of(amount: Decimal, percent: Decimal) -> Decimal {
    amount * percent / Decimal::ONE_HUNDRED
}

// ════════════════════════════════════════════════════════════════════════════
// USER
// ════════════════════════════════════════════════════════════════════════════

/// Balance of a direct referral captured when a referral claim is made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferredSnapshot {
    /// The referred user whose balance was captured.
    pub user_id: UserId,
    /// Mined balance of that user at snapshot time.
    pub balance: Decimal,
}

/// A user account together with its ledger state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Seven-digit public account number.
    pub user_number: u32,
    pub username: String,
    pub email: String,
    /// Wallet address; unique when present.
    #[serde(default)]
    pub address: Option<String>,
    /// Balance accrued by the timed mining process.
    pub mined_balance: Decimal,
    /// Balance accrued from referral bonuses.
    pub referred_balance: Decimal,
    pub mining: bool,
    /// Start of the current accrual session, if one is active.
    #[serde(default)]
    pub mining_started_at: Option<DateTime<Utc>>,
    /// Ticks already credited in the current accrual session.
    #[serde(default)]
    pub mining_ticks: u32,
    pub verified: bool,
    /// Pending one-time password, cleared on verification.
    #[serde(default)]
    pub otp: Option<u32>,
    pub referral_code: String,
    /// Referral code of the upstream referrer.
    #[serde(default)]
    pub reference_from: Option<String>,
    /// Downstream referred users, in signup order.
    #[serde(default)]
    pub reference_to: Vec<UserId>,
    #[serde(default)]
    pub referred_claimed_at: Vec<ReferredSnapshot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a freshly signed-up user: zero balances, not mining, unverified.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        referral_code: impl Into<String>,
        user_number: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: UserId::new(),
            user_number,
            username: username.into(),
            email: email.into(),
            address: None,
            mined_balance: Decimal::ZERO,
            referred_balance: Decimal::ZERO,
            mining: false,
            mining_started_at: None,
            mining_ticks: 0,
            verified: false,
            otp: None,
            referral_code: referral_code.into(),
            reference_from: None,
            reference_to: Vec::new(),
            referred_claimed_at: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Upstream referral code, treating an empty string as absent.
    pub fn referrer_code(&self) -> Option<&str> {
        self.reference_from.as_deref().filter(|code| !code.is_empty())
    }

    /// Set mining state for a new accrual session.
    pub fn begin_session(&mut self, now: DateTime<Utc>) {
        self.mining = true;
        self.mining_started_at = Some(now);
        self.mining_ticks = 0;
        self.updated_at = now;
    }

    /// Clear mining state. The mined balance is left untouched.
    pub fn end_session(&mut self, now: DateTime<Utc>) {
        self.mining = false;
        self.mining_started_at = None;
        self.mining_ticks = 0;
        self.updated_at = now;
    }

    /// True when the user is mining in the session that began at `started_at`.
    pub fn in_session(&self, started_at: DateTime<Utc>) -> bool {
        self.mining && self.mining_started_at == Some(started_at)
    }

    pub fn has_negative_balance(&self) -> bool {
        self.mined_balance < Decimal::ZERO || self.referred_balance < Decimal::ZERO
    }
}

// ════════════════════════════════════════════════════════════════════════════
// CLAIM
// ════════════════════════════════════════════════════════════════════════════

/// Which balance a standard claim finalizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    Mined,
    Referred,
}

impl fmt::Display for ClaimKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mined => f.write_str("mined"),
            Self::Referred => f.write_str("referred"),
        }
    }
}

/// Record of a reward payout request.
///
/// The amount is fixed at creation. Only `extra_referred_reward` (milestone
/// path) and `is_release` (settlement status) change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub user: UserId,
    pub amount: Decimal,
    pub is_mined: bool,
    pub is_referred: bool,
    pub is_release: bool,
    pub extra_referred_reward: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Claim {
    /// Standard claim finalizing `amount` from the `kind` balance.
    pub fn new(user: UserId, kind: ClaimKind, amount: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            id: ClaimId::new(),
            user,
            amount,
            is_mined: kind == ClaimKind::Mined,
            is_referred: kind == ClaimKind::Referred,
            is_release: false,
            extra_referred_reward: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Zero-amount record that only carries a milestone reward.
    pub fn milestone_holder(user: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: ClaimId::new(),
            user,
            amount: Decimal::ZERO,
            is_mined: false,
            is_referred: false,
            is_release: false,
            extra_referred_reward: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Source balance of a standard claim; `None` for milestone holders.
    pub fn kind(&self) -> Option<ClaimKind> {
        match (self.is_mined, self.is_referred) {
            (true, false) => Some(ClaimKind::Mined),
            (false, true) => Some(ClaimKind::Referred),
            _ => None,
        }
    }
}
