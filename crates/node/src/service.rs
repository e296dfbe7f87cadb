//! Wiring of the rewards components around one store.
//!
//! ```text
//!                ┌──────────────┐
//!                │   KsnNode    │
//!                └──────┬───────┘
//!   ┌──────────┬────────┼──────────┬────────────┐
//!   ▼          ▼        ▼          ▼            ▼
//! Registry  Accrual  Reward     Milestone    Claim
//!           Supervisor Calculator Evaluator  Processor
//!   └──────────┴────────┴──────────┴────────────┘
//!              shared LedgerStore + UserLocks + Clock
//! ```

use std::sync::Arc;

use ksn_common::{Clock, Config, LedgerStore};

use crate::accrual::AccrualSupervisor;
use crate::claim_processor::ClaimProcessor;
use crate::locks::UserLocks;
use crate::milestone::MilestoneEvaluator;
use crate::registry::{Notifier, Registry};
use crate::reward_calculator::RewardCalculator;

pub struct KsnNode {
    pub config: Config,
    pub store: Arc<dyn LedgerStore>,
    pub registry: Registry,
    pub accrual: AccrualSupervisor,
    pub rewards: Arc<RewardCalculator>,
    pub milestones: MilestoneEvaluator,
    pub claims: ClaimProcessor,
}

impl KsnNode {
    pub fn new(
        config: Config,
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let locks = Arc::new(UserLocks::new());
        let max_depth = config.referral.max_depth;

        let registry = Registry::new(
            Arc::clone(&store),
            Arc::clone(&locks),
            Arc::clone(&clock),
            notifier,
            max_depth,
        );
        let accrual = AccrualSupervisor::new(
            Arc::clone(&store),
            Arc::clone(&locks),
            Arc::clone(&clock),
            config.accrual.clone(),
        );
        let rewards = Arc::new(RewardCalculator::new(
            Arc::clone(&store),
            Arc::clone(&locks),
            Arc::clone(&clock),
            config.referral.bonus.clone(),
            max_depth,
            config.referral.direct_share_percent,
        ));
        let milestones = MilestoneEvaluator::new(
            Arc::clone(&store),
            Arc::clone(&locks),
            Arc::clone(&clock),
            config.milestones.clone(),
            max_depth,
        );
        let claims = ClaimProcessor::new(
            Arc::clone(&store),
            locks,
            clock,
            Arc::clone(&rewards),
            config.claims.min_claim,
        );

        Self {
            config,
            store,
            registry,
            accrual,
            rewards,
            milestones,
            claims,
        }
    }
}
