//! # Reward Calculator
//!
//! Two views over the same [`BonusSchedule`]:
//!
//! ```text
//!   upstream (claim time)                 downstream (report)
//!   ─────────────────────                 ───────────────────
//!   A  +5% of C.mined   level 2           owner
//!   │                                       ├─ D   modified = 10% of D.mined
//!   B  +10% of C.mined  level 1             │   └─ F  level 2: pct(2) of F.mined
//!   │                                       └─ E   ...
//!   C  mined claim
//! ```
//!
//! - [`RewardCalculator::compute_level_bonus`] resolves the upstream chain
//!   of a root and prices each level. Pure read.
//! - [`RewardCalculator::distribute_level_bonus`] applies that distribution
//!   and resets the root in one unit of work.
//! - [`RewardCalculator::build_referral_table`] walks each direct
//!   referral's subtree. Pure read.
//!
//! Bonuses are computed at full precision and credited unrounded. Table
//! figures are rounded to 8 decimal places for display.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use ksn_common::{
    percent_of, round_amount, BonusSchedule, Clock, LedgerStore, UnitOfWork, User, UserId,
};

use crate::error::{Result, RewardError};
use crate::locks::UserLocks;
use crate::referral_graph::{Ancestor, DanglingPolicy, ReferralGraph};

/// Decimal places of every figure in a [`ReferralTable`].
pub const TABLE_PRECISION: u32 = 8;

// ════════════════════════════════════════════════════════════════════════════
// RESULT TYPES
// ════════════════════════════════════════════════════════════════════════════

/// Bonus owed to one upstream referrer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelBonus {
    pub level: u32,
    pub beneficiary: UserId,
    pub username: String,
    pub percentage: Decimal,
    pub amount: Decimal,
}

/// Upstream bonuses generated by one root's mined balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamDistribution {
    pub root: UserId,
    /// Mined balance the percentages apply to.
    pub base: Decimal,
    /// Ordered by level, nearest referrer first.
    pub bonuses: Vec<LevelBonus>,
}

impl UpstreamDistribution {
    pub fn total(&self) -> Decimal {
        self.bonuses.iter().map(|b| b.amount).sum()
    }
}

/// One direct referral and its team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferralRow {
    pub username: String,
    pub mined_amount: Decimal,
    /// Direct share of `mined_amount`.
    pub modified_amount: Decimal,
    /// Users below this referral.
    pub team_members: usize,
    pub team_earning: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReferralTable {
    pub rows: Vec<ReferralRow>,
    pub total_direct_earning: Decimal,
    pub total_indirect_earning: Decimal,
}

// ════════════════════════════════════════════════════════════════════════════
// CALCULATOR
// ════════════════════════════════════════════════════════════════════════════

pub struct RewardCalculator {
    store: Arc<dyn LedgerStore>,
    locks: Arc<UserLocks>,
    clock: Arc<dyn Clock>,
    schedule: BonusSchedule,
    max_depth: u32,
    direct_share_percent: Decimal,
}

impl RewardCalculator {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        locks: Arc<UserLocks>,
        clock: Arc<dyn Clock>,
        schedule: BonusSchedule,
        max_depth: u32,
        direct_share_percent: Decimal,
    ) -> Self {
        Self {
            store,
            locks,
            clock,
            schedule,
            max_depth,
            direct_share_percent,
        }
    }

    fn graph(&self) -> ReferralGraph<'_> {
        ReferralGraph::new(self.store.as_ref(), self.max_depth)
    }

    fn load(&self, id: UserId) -> Result<User> {
        self.store
            .user(id)?
            .ok_or_else(|| RewardError::UserNotFound(id.to_string()))
    }

    /// Resolve the upstream chain of `root`. Empty when `root` has no referrer.
    pub fn upstream_chain(&self, root: &User) -> Result<Vec<Ancestor>> {
        self.graph().ancestors(root)
    }

    /// Price a distribution of `root`'s current mined balance over `chain`.
    pub fn price(&self, root: &User, chain: &[Ancestor]) -> UpstreamDistribution {
        let base = root.mined_balance;
        let bonuses = chain
            .iter()
            .map(|ancestor| {
                let percentage = self.schedule.percentage(ancestor.level);
                LevelBonus {
                    level: ancestor.level,
                    beneficiary: ancestor.user.id,
                    username: ancestor.user.username.clone(),
                    percentage,
                    amount: percent_of(base, percentage),
                }
            })
            .collect();
        UpstreamDistribution { root: root.id, base, bonuses }
    }

    /// Compute, without applying, the bonus every ancestor of `root` would
    /// receive from its current mined balance.
    ///
    /// # Errors
    ///
    /// Any traversal failure aborts the whole chain:
    /// [`RewardError::InvalidReference`], [`RewardError::CycleDetected`],
    /// [`RewardError::DepthExceeded`].
    pub fn compute_level_bonus(&self, root: UserId) -> Result<UpstreamDistribution> {
        let user = self.load(root)?;
        let chain = self.upstream_chain(&user)?;
        Ok(self.price(&user, &chain))
    }

    /// Credit every ancestor of `root` and reset its mined balance and
    /// mining state, atomically.
    pub fn distribute_level_bonus(&self, root: UserId) -> Result<UpstreamDistribution> {
        let snapshot = self.load(root)?;
        let chain = self.upstream_chain(&snapshot)?;

        let _guard = self
            .locks
            .lock_many(std::iter::once(root).chain(chain.iter().map(|a| a.user.id)));

        let mut root_user = self.load(root)?;
        let mut work = UnitOfWork::new();
        let distribution = self.stage_upstream(&mut root_user, &chain, &mut work, self.clock.now())?;
        self.store.commit(work)?;

        info!(
            user = %root,
            levels = distribution.bonuses.len(),
            total = %distribution.total(),
            "distributed level bonus"
        );
        Ok(distribution)
    }

    /// Stage an upstream distribution into `work`.
    ///
    /// Must be called with `root` and every chain member locked. Ancestors
    /// are re-read so credits land on current balances. `root` is reset in
    /// place and staged as well.
    pub(crate) fn stage_upstream(
        &self,
        root: &mut User,
        chain: &[Ancestor],
        work: &mut UnitOfWork,
        now: DateTime<Utc>,
    ) -> Result<UpstreamDistribution> {
        let distribution = self.price(root, chain);

        for bonus in &distribution.bonuses {
            let mut beneficiary = self.load(bonus.beneficiary)?;
            beneficiary.referred_balance += bonus.amount;
            beneficiary.updated_at = now;
            debug!(
                user = %beneficiary.id,
                level = bonus.level,
                amount = %bonus.amount,
                "staged level bonus"
            );
            work.save_user(beneficiary);
        }

        root.mined_balance = Decimal::ZERO;
        root.end_session(now);
        work.save_user(root.clone());

        Ok(distribution)
    }

    /// Team earnings table for `owner`'s direct referrals.
    ///
    /// Dangling referral ids are skipped.
    pub fn build_referral_table(&self, owner: UserId) -> Result<ReferralTable> {
        let owner = self.load(owner)?;
        let graph = self.graph();
        let mut table = ReferralTable::default();

        for id in &owner.reference_to {
            let Some(direct) = self.store.user(*id)? else {
                warn!(owner = %owner.id, user = %id, "skipping dangling direct referral");
                continue;
            };

            let modified = round_amount(
                percent_of(direct.mined_balance, self.direct_share_percent),
                TABLE_PRECISION,
            );

            // The direct referral sits at level 1 relative to the owner.
            let team = graph.descendants(&direct, 1, DanglingPolicy::Skip)?;
            let earning: Decimal = team
                .iter()
                .map(|member| {
                    percent_of(member.user.mined_balance, self.schedule.percentage(member.level))
                })
                .sum();
            let earning = round_amount(earning, TABLE_PRECISION);

            table.total_direct_earning += modified;
            table.total_indirect_earning += earning;
            table.rows.push(ReferralRow {
                username: direct.username,
                mined_amount: direct.mined_balance,
                modified_amount: modified,
                team_members: team.len(),
                team_earning: earning,
            });
        }

        table.total_direct_earning = round_amount(table.total_direct_earning, TABLE_PRECISION);
        table.total_indirect_earning = round_amount(table.total_indirect_earning, TABLE_PRECISION);
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ksn_common::{ManualClock, MemoryStore};

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    struct Harness {
        store: Arc<MemoryStore>,
        calc: RewardCalculator,
        seq: u32,
    }

    impl Harness {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let calc = RewardCalculator::new(
                store.clone(),
                Arc::new(UserLocks::new()),
                Arc::new(ManualClock::new(Utc::now())),
                BonusSchedule::default(),
                64,
                Decimal::from(10),
            );
            Self { store, calc, seq: 2_000_000 }
        }

        fn add(&mut self, name: &str, referrer: Option<UserId>, mined: &str) -> UserId {
            self.seq += 1;
            let mut user = User::new(
                name,
                format!("{}@example.com", name),
                format!("REF{}", self.seq),
                self.seq,
                Utc::now(),
            );
            user.mined_balance = d(mined);
            if let Some(parent_id) = referrer {
                let mut parent = self.get(parent_id);
                user.reference_from = Some(parent.referral_code.clone());
                parent.reference_to.push(user.id);
                self.store.save_user(&parent).unwrap();
            }
            self.store.save_user(&user).unwrap();
            user.id
        }

        fn get(&self, id: UserId) -> User {
            self.store
                .user(id)
                .unwrap()
                .expect("missing user")
        }
    }

    #[test]
    fn chain_of_three_distributes_by_level() {
        let mut h = Harness::new();
        let a = h.add("a", None, "0");
        let b = h.add("b", Some(a), "0");
        let c = h.add("c", Some(b), "10");

        let preview = h.calc.compute_level_bonus(c).unwrap();
        assert_eq!(preview.bonuses.len(), 2);
        assert_eq!(preview.bonuses[0].beneficiary, b);
        assert_eq!(preview.bonuses[0].amount, d("1"));
        assert_eq!(preview.bonuses[1].beneficiary, a);
        assert_eq!(preview.bonuses[1].amount, d("0.5"));
        assert_eq!(preview.total(), d("1.5"));
        // Preview writes nothing.
        assert_eq!(h.get(c).mined_balance, d("10"));

        h.calc.distribute_level_bonus(c).unwrap();
        assert_eq!(h.get(a).referred_balance, d("0.5"));
        assert_eq!(h.get(b).referred_balance, d("1"));
        let c = h.get(c);
        assert_eq!(c.mined_balance, Decimal::ZERO);
        assert!(!c.mining);
    }

    #[test]
    fn unresolved_code_credits_nobody() {
        let mut h = Harness::new();
        let a = h.add("a", None, "0");
        let b = h.add("b", Some(a), "0");
        let c = h.add("c", Some(b), "10");

        // Break the chain above B.
        let mut bu = h.get(b);
        bu.reference_from = Some("GONE".into());
        h.store.save_user(&bu).unwrap();

        assert_eq!(
            h.calc.distribute_level_bonus(c),
            Err(RewardError::InvalidReference("GONE".into()))
        );
        assert_eq!(h.get(b).referred_balance, Decimal::ZERO);
        assert_eq!(h.get(c).mined_balance, d("10"));
    }

    #[test]
    fn levels_past_schedule_earn_nothing() {
        let mut h = Harness::new();
        let mut prev = h.add("u0", None, "0");
        for i in 1..=24 {
            prev = h.add(&format!("u{}", i), Some(prev), "0");
        }
        let root = h.add("root", Some(prev), "100");

        let dist = h.calc.compute_level_bonus(root).unwrap();
        assert_eq!(dist.bonuses.len(), 25);
        assert_eq!(dist.bonuses[20].level, 21);
        assert_eq!(dist.bonuses[20].amount, d("3"));
        assert!(dist.bonuses[21..].iter().all(|b| b.amount.is_zero()));
    }

    #[test]
    fn referral_table_rows_and_totals() {
        let mut h = Harness::new();
        let owner = h.add("owner", None, "0");
        let d1 = h.add("d1", Some(owner), "20");
        let _d2 = h.add("d2", Some(owner), "3.33333333");
        let t1 = h.add("t1", Some(d1), "10");
        let _t2 = h.add("t2", Some(t1), "100");

        let table = h.calc.build_referral_table(owner).unwrap();
        assert_eq!(table.rows.len(), 2);

        let row = &table.rows[0];
        assert_eq!(row.username, "d1");
        assert_eq!(row.mined_amount, d("20"));
        assert_eq!(row.modified_amount, d("2"));
        assert_eq!(row.team_members, 2);
        // t1 at level 2 (5%), t2 at level 3 (3%).
        assert_eq!(row.team_earning, d("3.5"));

        let row = &table.rows[1];
        assert_eq!(row.modified_amount, d("0.33333333"));
        assert_eq!(row.team_members, 0);
        assert_eq!(row.team_earning, Decimal::ZERO);

        assert_eq!(table.total_direct_earning, d("2.33333333"));
        assert_eq!(table.total_indirect_earning, d("3.5"));
    }

    #[test]
    fn referral_table_skips_dangling_ids() {
        let mut h = Harness::new();
        let owner = h.add("owner", None, "0");
        let _d1 = h.add("d1", Some(owner), "10");
        let mut ou = h.get(owner);
        ou.reference_to.push(UserId::new());
        h.store.save_user(&ou).unwrap();

        let table = h.calc.build_referral_table(owner).unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.total_direct_earning, d("1"));
    }
}
