//! # KSN Node Crate
//!
//! Rewards engine of the KSN backend: timed mining accrual, multi-level
//! referral bonuses, milestone rewards, and claim processing over a
//! [`LedgerStore`](ksn_common::LedgerStore).
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                             KsnNode                                │
//! ├───────────────────────────────────────────────────────────────────┤
//! │                                                                    │
//! │  ┌──────────────────┐     ticks      ┌──────────────────────────┐  │
//! │  │ AccrualSupervisor│───────────────▶│       User Ledger        │  │
//! │  └──────────────────┘                │  (LedgerStore + locks)   │  │
//! │                                      └────────────┬─────────────┘  │
//! │                                                   │                │
//! │                              ┌────────────────────┼─────────────┐  │
//! │                              ▼                    ▼             │  │
//! │                     ┌────────────────┐   ┌────────────────┐     │  │
//! │                     │ ReferralGraph  │──▶│RewardCalculator│     │  │
//! │                     └────────────────┘   └───────┬────────┘     │  │
//! │                              │                   │              │  │
//! │                              ▼                   ▼              │  │
//! │                    ┌──────────────────┐  ┌────────────────┐     │  │
//! │                    │MilestoneEvaluator│  │ ClaimProcessor │─────┘  │
//! │                    └──────────────────┘  └────────────────┘        │
//! │                                                                    │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Concurrency
//!
//! Every balance mutation happens under the per-user locks of
//! [`UserLocks`]. Operations spanning several users (a mined claim and its
//! upstream chain) lock them in ascending id order and commit one
//! [`UnitOfWork`](ksn_common::UnitOfWork), so a claim either lands
//! completely or not at all.
//!
//! # Modules
//!
//! | Module | Role |
//! |--------|------|
//! | `accrual` | Per-user mining tasks, cancellation, restart recovery |
//! | `referral_graph` | Iterative upstream/downstream traversal |
//! | `reward_calculator` | Level bonus distribution and team table |
//! | `milestone` | Tenure and team-size milestone rewards |
//! | `claim_processor` | Mined and referred claim state machine |
//! | `registry` | Signup, OTP verification, dashboard snapshots |
//! | `locks` | Per-user lock registry |
//! | `service` | Component wiring |

pub mod accrual;
pub mod claim_processor;
pub mod error;
pub mod locks;
pub mod milestone;
pub mod referral_graph;
pub mod registry;
pub mod reward_calculator;
pub mod service;

pub use accrual::{AccrualOutcome, AccrualSupervisor, ActiveSession, RecoveryReport};
pub use claim_processor::{ClaimProcessor, ClaimReceipt};
pub use error::{Result, RewardError};
pub use locks::{LockSet, UserLocks};
pub use milestone::{MilestoneEvaluator, MilestoneOutcome};
pub use referral_graph::{Ancestor, DanglingPolicy, Descendant, ReferralCounts, ReferralGraph};
pub use registry::{LogNotifier, MiningSnapshot, Notifier, NotifyError, Registry, SignUp};
pub use reward_calculator::{
    LevelBonus, ReferralRow, ReferralTable, RewardCalculator, UpstreamDistribution,
};
pub use service::KsnNode;
