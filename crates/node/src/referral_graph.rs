//! # Referral Graph Traversal
//!
//! The referral graph is not stored separately: edges are the
//! `reference_from` (upstream referral code) and `reference_to` (downstream
//! user ids) fields of each [`User`].
//!
//! ```text
//!        A            level 2 ancestor of C
//!        │
//!        B            level 1 ancestor of C
//!        │
//!        C            root
//!      ┌─┴─┐
//!      D   E          level 1 descendants of C
//!      │
//!      F              level 2 descendant of C
//! ```
//!
//! ## Guarantees
//!
//! - Traversals are iterative with an explicit work list; stack depth does
//!   not grow with the graph.
//! - A visited set makes every walk fail fast with
//!   [`RewardError::CycleDetected`] on the first revisit.
//! - Walks deeper than `max_depth` fail with [`RewardError::DepthExceeded`].
//! - Nothing here writes to the store.

use std::collections::HashSet;

use serde::Serialize;
use tracing::warn;

use ksn_common::{LedgerStore, User, UserId};

use crate::error::{Result, RewardError};

/// A user above the root, `level` hops up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ancestor {
    pub level: u32,
    pub user: User,
}

/// A user below the walk origin, `level` hops down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descendant {
    pub level: u32,
    pub user: User,
}

/// How a downward walk treats `reference_to` ids with no stored user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DanglingPolicy {
    /// Log and continue.
    Skip,
    /// Abort with [`RewardError::UserNotFound`].
    Fail,
}

/// Direct and transitive referral counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReferralCounts {
    /// Size of `reference_to`.
    pub direct: u64,
    /// Every descendant below the direct level.
    pub indirect: u64,
}

/// Read-only view over the referral edges in a [`LedgerStore`].
pub struct ReferralGraph<'a> {
    store: &'a dyn LedgerStore,
    max_depth: u32,
}

impl<'a> ReferralGraph<'a> {
    pub fn new(store: &'a dyn LedgerStore, max_depth: u32) -> Self {
        Self { store, max_depth }
    }

    /// The full upstream chain of `root`, nearest referrer first.
    ///
    /// Stops at the first user without a referrer.
    ///
    /// # Errors
    ///
    /// - [`RewardError::InvalidReference`] if any upstream code is unknown.
    /// - [`RewardError::CycleDetected`] if the chain revisits a user.
    /// - [`RewardError::DepthExceeded`] beyond `max_depth` levels.
    pub fn ancestors(&self, root: &User) -> Result<Vec<Ancestor>> {
        let mut visited: HashSet<UserId> = HashSet::from([root.id]);
        let mut chain = Vec::new();
        let mut current = root.clone();
        let mut level = 1u32;

        while let Some(code) = current.referrer_code() {
            if level > self.max_depth {
                return Err(RewardError::DepthExceeded(self.max_depth));
            }
            let referrer = self
                .store
                .user_by_referral_code(code)?
                .ok_or_else(|| RewardError::InvalidReference(code.to_string()))?;
            if !visited.insert(referrer.id) {
                return Err(RewardError::CycleDetected(referrer.id));
            }
            chain.push(Ancestor { level, user: referrer.clone() });
            current = referrer;
            level += 1;
        }

        Ok(chain)
    }

    /// Every user below `origin`, depth-first in `reference_to` order.
    ///
    /// `origin_level` is the level of `origin` itself, so its children are
    /// reported at `origin_level + 1`.
    pub fn descendants(
        &self,
        origin: &User,
        origin_level: u32,
        dangling: DanglingPolicy,
    ) -> Result<Vec<Descendant>> {
        let mut visited: HashSet<UserId> = HashSet::from([origin.id]);
        let mut found = Vec::new();

        // Reversed so pops come out in insertion order.
        let mut stack: Vec<(UserId, u32)> = origin
            .reference_to
            .iter()
            .rev()
            .map(|id| (*id, origin_level + 1))
            .collect();

        while let Some((id, level)) = stack.pop() {
            if level > self.max_depth {
                return Err(RewardError::DepthExceeded(self.max_depth));
            }
            if !visited.insert(id) {
                return Err(RewardError::CycleDetected(id));
            }
            let Some(user) = self.store.user(id)? else {
                match dangling {
                    DanglingPolicy::Skip => {
                        warn!(user = %id, parent_level = level - 1, "skipping dangling referral");
                        continue;
                    }
                    DanglingPolicy::Fail => return Err(RewardError::UserNotFound(id.to_string())),
                }
            };
            stack.extend(user.reference_to.iter().rev().map(|child| (*child, level + 1)));
            found.push(Descendant { level, user });
        }

        Ok(found)
    }

    /// Direct and indirect referral counts for `user`.
    ///
    /// Every referenced id must resolve; a dangling id fails the count.
    pub fn count_referrals(&self, user: &User) -> Result<ReferralCounts> {
        let all = self.descendants(user, 0, DanglingPolicy::Fail)?;
        let direct = user.reference_to.len() as u64;
        let indirect = all.iter().filter(|d| d.level > 1).count() as u64;
        Ok(ReferralCounts { direct, indirect })
    }
}
