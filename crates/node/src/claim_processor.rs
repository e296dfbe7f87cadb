//! # Claim Processor
//!
//! Converts an accumulated balance into an immutable [`Claim`].
//!
//! ```text
//!            claim_mined / claim_referred
//!  eligible ─────────────────────────────▶ claimed
//!     │                                       │
//!     │ balance < min_claim                   └─ balance reset to 0
//!     ▼
//!  ThresholdNotMet (nothing written)
//! ```
//!
//! ## Sequence
//!
//! 1. Load the claimant, check verification and threshold.
//! 2. Resolve every other user the claim touches (upstream chain or
//!    mining direct referrals).
//! 3. Lock all of them in ascending id order.
//! 4. Re-read and re-check under the locks.
//! 5. Stage the claim and every balance change; commit once.
//!
//! A failure at any step leaves the ledger untouched.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use ksn_common::{
    Claim, ClaimId, ClaimKind, Clock, LedgerStore, ReferredSnapshot, UnitOfWork, User, UserId,
};

use crate::error::{Result, RewardError};
use crate::locks::UserLocks;
use crate::reward_calculator::{RewardCalculator, UpstreamDistribution};

/// Result of a successful claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimReceipt {
    pub claim: Claim,
    /// Upstream bonuses paid out by a mined claim.
    pub distribution: Option<UpstreamDistribution>,
}

pub struct ClaimProcessor {
    store: Arc<dyn LedgerStore>,
    locks: Arc<UserLocks>,
    clock: Arc<dyn Clock>,
    calculator: Arc<RewardCalculator>,
    min_claim: Decimal,
}

impl ClaimProcessor {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        locks: Arc<UserLocks>,
        clock: Arc<dyn Clock>,
        calculator: Arc<RewardCalculator>,
        min_claim: Decimal,
    ) -> Self {
        Self {
            store,
            locks,
            clock,
            calculator,
            min_claim,
        }
    }

    fn load(&self, id: UserId) -> Result<User> {
        self.store
            .user(id)?
            .ok_or_else(|| RewardError::UserNotFound(id.to_string()))
    }

    fn check(&self, user: &User, kind: ClaimKind) -> Result<Decimal> {
        if !user.verified {
            return Err(RewardError::NotVerified(user.id));
        }
        let balance = match kind {
            ClaimKind::Mined => user.mined_balance,
            ClaimKind::Referred => user.referred_balance,
        };
        if balance < self.min_claim {
            return Err(RewardError::ThresholdNotMet {
                required: self.min_claim,
                actual: balance,
            });
        }
        Ok(balance)
    }

    pub fn claim(&self, user: UserId, kind: ClaimKind) -> Result<ClaimReceipt> {
        match kind {
            ClaimKind::Mined => self.claim_mined(user),
            ClaimKind::Referred => self.claim_referred(user),
        }
    }

    /// Finalize the mined balance and pay the upstream level bonus.
    ///
    /// A claimant without a referrer produces an empty distribution.
    pub fn claim_mined(&self, user_id: UserId) -> Result<ClaimReceipt> {
        let snapshot = self.load(user_id)?;
        self.check(&snapshot, ClaimKind::Mined)?;
        let chain = self.calculator.upstream_chain(&snapshot)?;

        let _guard = self
            .locks
            .lock_many(std::iter::once(user_id).chain(chain.iter().map(|a| a.user.id)));

        let mut user = self.load(user_id)?;
        let amount = self.check(&user, ClaimKind::Mined)?;
        let now = self.clock.now();

        let claim = Claim::new(user_id, ClaimKind::Mined, amount, now);
        let mut work = UnitOfWork::new();
        let distribution = self.calculator.stage_upstream(&mut user, &chain, &mut work, now)?;
        work.save_claim(claim.clone());
        self.store.commit(work)?;

        info!(
            user = %user_id,
            claim = %claim.id,
            amount = %amount,
            bonus = %distribution.total(),
            "mined balance claimed"
        );
        Ok(ClaimReceipt { claim, distribution: Some(distribution) })
    }

    /// Finalize the referred balance and snapshot mining direct referrals.
    pub fn claim_referred(&self, user_id: UserId) -> Result<ClaimReceipt> {
        let snapshot = self.load(user_id)?;
        self.check(&snapshot, ClaimKind::Referred)?;

        let _guard = self
            .locks
            .lock_many(std::iter::once(user_id).chain(snapshot.reference_to.iter().copied()));

        let mut user = self.load(user_id)?;
        let amount = self.check(&user, ClaimKind::Referred)?;
        let now = self.clock.now();

        let mut captured = Vec::new();
        for id in &user.reference_to {
            match self.store.user(*id)? {
                Some(referral) if referral.mining => captured.push(ReferredSnapshot {
                    user_id: referral.id,
                    balance: referral.mined_balance,
                }),
                Some(_) => {}
                None => warn!(user = %user_id, referral = %id, "skipping dangling referral in snapshot"),
            }
        }

        user.referred_claimed_at.extend(captured);
        user.referred_balance = Decimal::ZERO;
        user.updated_at = now;

        let claim = Claim::new(user_id, ClaimKind::Referred, amount, now);
        let mut work = UnitOfWork::new();
        work.save_user(user).save_claim(claim.clone());
        self.store.commit(work)?;

        info!(user = %user_id, claim = %claim.id, amount = %amount, "referred balance claimed");
        Ok(ClaimReceipt { claim, distribution: None })
    }

    /// Claims owned by `user`, oldest first.
    pub fn claims_for(&self, user: UserId) -> Result<Vec<Claim>> {
        self.load(user)?;
        Ok(self.store.claims_for_user(user)?)
    }

    /// Mark a claim as settled. Releasing twice is a no-op.
    pub fn release_claim(&self, claim_id: ClaimId) -> Result<Claim> {
        let mut claim = self
            .store
            .claim(claim_id)?
            .ok_or_else(|| RewardError::ClaimNotFound(claim_id.to_string()))?;
        if claim.is_release {
            return Ok(claim);
        }
        claim.is_release = true;
        claim.updated_at = self.clock.now();
        self.store.save_claim(&claim)?;
        info!(claim = %claim_id, user = %claim.user, "claim released");
        Ok(claim)
    }
}
