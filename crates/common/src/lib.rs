//! # KSN Common Crate
//!
//! Ledger documents, the document-store abstraction, reward schedules, and
//! configuration shared by the KSN rewards backend.
//!
//! ## Modules
//! - `ledger`: `User` and `Claim` documents, ids, amount rounding
//! - `store`: `LedgerStore` trait, `UnitOfWork`, `StoreError`
//! - `memory_store`: in-memory store for tests and development
//! - `file_store`: JSON file store
//! - `schedule`: referral bonus table and milestone ladder
//! - `clock`: wall-clock abstraction
//! - `config`: TOML configuration
//!
//! ## Store Architecture
//! ```text
//! ┌─────────────────┐
//! │   LedgerStore   │  <- Abstract trait
//! └────────┬────────┘
//!          │
//!    ┌─────┴──────┐
//!    │            │
//! ┌──▼────────┐ ┌─▼────────────┐
//! │MemoryStore│ │JsonFileStore │
//! └───────────┘ └──────────────┘
//! ```

pub mod clock;
pub mod config;
pub mod file_store;
pub mod ledger;
pub mod memory_store;
pub mod schedule;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AccrualConfig, ClaimConfig, Config, ConfigError, ReferralConfig, StoreConfig};
pub use file_store::JsonFileStore;
pub use ledger::{round_amount, percent_of, Claim, ClaimId, ClaimKind, ReferredSnapshot, User, UserId};
pub use memory_store::MemoryStore;
pub use schedule::{BonusBand, BonusSchedule, MilestoneBracket, MilestoneLadder};
pub use store::{LedgerStore, StoreError, UnitOfWork, UserFilter};
