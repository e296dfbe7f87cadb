//! # Milestone Rewards
//!
//! One-off payouts for long-standing users with large referral trees.
//! The reward is recorded on a claim as `extra_referred_reward`, never
//! credited to a balance.
//!
//! ## Target claim
//!
//! 1. The user's latest unreleased claim, if any.
//! 2. Otherwise a new zero-amount holder claim.
//!
//! Re-evaluating rewrites the same field with the same value, so repeated
//! calls converge on one record.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use ksn_common::{Claim, ClaimId, Clock, LedgerStore, MilestoneBracket, MilestoneLadder, UserId};

use crate::error::{Result, RewardError};
use crate::locks::UserLocks;
use crate::referral_graph::{ReferralCounts, ReferralGraph};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MilestoneOutcome {
    /// Zero when no bracket matched.
    pub reward: Decimal,
    pub bracket: Option<MilestoneBracket>,
    pub counts: ReferralCounts,
    /// Whole days since signup.
    pub age_days: i64,
    /// Claim that carries the reward.
    pub claim: Option<ClaimId>,
}

pub struct MilestoneEvaluator {
    store: Arc<dyn LedgerStore>,
    locks: Arc<UserLocks>,
    clock: Arc<dyn Clock>,
    ladder: MilestoneLadder,
    max_depth: u32,
}

impl MilestoneEvaluator {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        locks: Arc<UserLocks>,
        clock: Arc<dyn Clock>,
        ladder: MilestoneLadder,
        max_depth: u32,
    ) -> Self {
        Self { store, locks, clock, ladder, max_depth }
    }

    pub fn evaluate_milestone(&self, user_id: UserId) -> Result<MilestoneOutcome> {
        let _guard = self.locks.lock(user_id);

        let user = self
            .store
            .user(user_id)?
            .ok_or_else(|| RewardError::UserNotFound(user_id.to_string()))?;

        let counts = ReferralGraph::new(self.store.as_ref(), self.max_depth).count_referrals(&user)?;
        let now = self.clock.now();
        let age_days = (now - user.created_at).num_days().max(0);

        let Some(bracket) = self.ladder.select(age_days, counts.direct, counts.indirect).cloned() else {
            return Ok(MilestoneOutcome {
                reward: Decimal::ZERO,
                bracket: None,
                counts,
                age_days,
                claim: None,
            });
        };

        let mut claim = self
            .store
            .claims_for_user(user_id)?
            .into_iter()
            .filter(|c| !c.is_release)
            .max_by_key(|c| c.created_at)
            .unwrap_or_else(|| Claim::milestone_holder(user_id, now));

        if claim.extra_referred_reward != bracket.payout {
            claim.extra_referred_reward = bracket.payout;
            claim.updated_at = now;
            self.store.save_claim(&claim)?;
            info!(
                user = %user_id,
                claim = %claim.id,
                reward = %bracket.payout,
                "recorded milestone reward"
            );
        }

        Ok(MilestoneOutcome {
            reward: bracket.payout,
            bracket: Some(bracket),
            counts,
            age_days,
            claim: Some(claim.id),
        })
    }
}
