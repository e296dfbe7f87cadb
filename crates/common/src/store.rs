//! # Ledger Store Abstraction
//!
//! [`LedgerStore`] is the document store the rewards engine persists
//! through. It exposes find-by-id, find-by-filter, and an atomic
//! [`UnitOfWork`] commit over [`User`] and [`Claim`] documents.
//!
//! ```text
//! ┌──────────────────┐
//! │   LedgerStore    │  <- trait
//! └────────┬─────────┘
//!          │
//!    ┌─────┴──────┐
//!    │            │
//! ┌──▼────────┐ ┌─▼────────────┐
//! │MemoryStore│ │JsonFileStore │
//! └───────────┘ └──────────────┘
//! ```
//!
//! ## Atomicity
//!
//! `commit` applies every document in the unit of work or none of them.
//! Unique constraints (username, email, referral code, user number,
//! wallet address) and the non-negative balance invariant are checked
//! before anything is written.

use thiserror::Error;

use crate::ledger::{Claim, ClaimId, User, UserId};

// ════════════════════════════════════════════════════════════════════════════
// STORE ERROR
// ════════════════════════════════════════════════════════════════════════════

/// Errors surfaced by a [`LedgerStore`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A unique field collides with another document.
    #[error("duplicate {field}: {value}")]
    Conflict { field: &'static str, value: String },

    /// A document violates a ledger invariant.
    #[error("invalid document: {0}")]
    Invalid(String),

    /// Backing file I/O failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// Backing file could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The store refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

// ════════════════════════════════════════════════════════════════════════════
// FILTERS
// ════════════════════════════════════════════════════════════════════════════

/// Selection criteria for [`LedgerStore::find_users`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserFilter {
    /// Users with `mining == true`.
    Mining,
    Username(String),
    Email(String),
    Address(String),
    ReferralCode(String),
    UserNumber(u32),
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        match self {
            Self::Mining => user.mining,
            Self::Username(name) => &user.username == name,
            Self::Email(email) => &user.email == email,
            Self::Address(addr) => user.address.as_deref() == Some(addr.as_str()),
            Self::ReferralCode(code) => &user.referral_code == code,
            Self::UserNumber(n) => user.user_number == *n,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// UNIT OF WORK
// ════════════════════════════════════════════════════════════════════════════

/// A batch of document upserts committed atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitOfWork {
    users: Vec<User>,
    claims: Vec<Claim>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an insert-or-replace of `user`. A later stage of the same id wins.
    pub fn save_user(&mut self, user: User) -> &mut Self {
        self.users.retain(|u| u.id != user.id);
        self.users.push(user);
        self
    }

    /// Stage an insert-or-replace of `claim`.
    pub fn save_claim(&mut self, claim: Claim) -> &mut Self {
        self.claims.retain(|c| c.id != claim.id);
        self.claims.push(claim);
        self
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.claims.is_empty()
    }

    pub(crate) fn into_parts(self) -> (Vec<User>, Vec<Claim>) {
        (self.users, self.claims)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// STORE TRAIT
// ════════════════════════════════════════════════════════════════════════════

/// Document store over users and claims.
///
/// Implementations must be safe to share across threads. Reads return
/// owned copies; callers mutate the copy and write it back through
/// [`commit`](Self::commit).
pub trait LedgerStore: Send + Sync {
    /// Find a user by primary key.
    fn user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// All users matching `filter`, ordered by creation time.
    fn find_users(&self, filter: &UserFilter) -> Result<Vec<User>, StoreError>;

    /// Find a claim by primary key.
    fn claim(&self, id: ClaimId) -> Result<Option<Claim>, StoreError>;

    /// Claims owned by `user`, oldest first.
    fn claims_for_user(&self, user: UserId) -> Result<Vec<Claim>, StoreError>;

    /// Atomically apply every upsert in `work`.
    fn commit(&self, work: UnitOfWork) -> Result<(), StoreError>;

    /// First user matching `filter`.
    fn find_user(&self, filter: &UserFilter) -> Result<Option<User>, StoreError> {
        Ok(self.find_users(filter)?.into_iter().next())
    }

    fn user_by_referral_code(&self, code: &str) -> Result<Option<User>, StoreError> {
        self.find_user(&UserFilter::ReferralCode(code.to_string()))
    }

    fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.find_user(&UserFilter::Email(email.to_string()))
    }

    fn save_user(&self, user: &User) -> Result<(), StoreError> {
        let mut work = UnitOfWork::new();
        work.save_user(user.clone());
        self.commit(work)
    }

    fn save_claim(&self, claim: &Claim) -> Result<(), StoreError> {
        let mut work = UnitOfWork::new();
        work.save_claim(claim.clone());
        self.commit(work)
    }
}
