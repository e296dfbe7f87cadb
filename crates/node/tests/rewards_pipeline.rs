//! End-to-end tests over the public `ksn_node` API.
//!
//! Signup → verify → mine → table → claim, persisted through a JSON
//! ledger file and reopened to check durability.

use std::sync::Arc;
use std::thread;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use ksn_common::{Clock, Config, JsonFileStore, LedgerStore, ManualClock, MemoryStore, User, UserId};
use ksn_node::{
    AccrualOutcome, KsnNode, Notifier, NotifyError, ReferralCounts, RewardError, SignUp,
};

fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// Hands out a fixed code so tests can verify.
struct StaticOtp;

const OTP: u32 = 123_456;

#[async_trait]
impl Notifier for StaticOtp {
    async fn send_otp(&self, _email: &str) -> Result<u32, NotifyError> {
        Ok(OTP)
    }
}

fn fast_config() -> Config {
    let mut config = Config::default();
    config.accrual.increment = d("1");
    config
}

async fn enroll(node: &KsnNode, name: &str, referrer: Option<&User>) -> User {
    let user = node
        .registry
        .sign_up(SignUp {
            username: name.to_string(),
            email: format!("{}@example.com", name),
            address: None,
            referral_code: referrer.map(|r| r.referral_code.clone()),
        })
        .await
        .expect("signup");
    node.registry
        .verify(&user.email, OTP)
        .expect("verify")
}

#[tokio::test(start_paused = true)]
async fn signup_mine_claim_pipeline() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ledger.json");
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));

    let store = Arc::new(JsonFileStore::open(&path).unwrap());
    let node = KsnNode::new(fast_config(), store, clock.clone(), Arc::new(StaticOtp));

    let a = enroll(&node, "alice", None).await;
    let b = enroll(&node, "bob", Some(&a)).await;
    let c = enroll(&node, "carol", Some(&b)).await;

    assert_eq!(
        node.registry.count_referrals(a.id),
        Ok(ReferralCounts { direct: 1, indirect: 1 })
    );

    // Nothing mined yet.
    assert!(matches!(
        node.claims.claim_mined(c.id),
        Err(RewardError::ThresholdNotMet { .. })
    ));

    node.accrual.start_accrual(c.id).unwrap();
    assert!(node.registry.mining_data(c.id).map(|s| s.is_mining).unwrap_or(false));
    assert_eq!(
        node.accrual.wait(c.id).await,
        Some(AccrualOutcome::Completed { ticks: 12 })
    );
    let snap = node.registry.mining_data(c.id).unwrap();
    assert_eq!(snap.mined, d("12"));
    assert!(!snap.is_mining);

    let table = node.rewards.build_referral_table(a.id).unwrap();
    assert_eq!(table.rows.len(), 1);
    assert_eq!(table.rows[0].username, "bob");
    assert_eq!(table.rows[0].team_members, 1);
    assert_eq!(table.rows[0].team_earning, d("0.6"));

    let receipt = node.claims.claim_mined(c.id).unwrap();
    assert_eq!(receipt.claim.amount, d("12"));

    drop(node);

    // Everything survived on disk.
    let reopened = Arc::new(JsonFileStore::open(&path).unwrap());
    let load = |id: UserId| {
        reopened
            .user(id)
            .unwrap()
            .expect("missing")
    };
    assert_eq!(load(a.id).referred_balance, d("0.6"));
    assert_eq!(load(b.id).referred_balance, d("1.2"));
    assert_eq!(load(c.id).mined_balance, Decimal::ZERO);
    assert_eq!(reopened.claims_for_user(c.id).map(|v| v.len()), Ok(1));

    let node = KsnNode::new(fast_config(), reopened, clock, Arc::new(StaticOtp));
    let outcome = node.milestones.evaluate_milestone(a.id).unwrap();
    assert_eq!(outcome.reward, Decimal::ZERO);
}

#[tokio::test]
async fn concurrent_claims_credit_shared_referrer_exactly() {
    let store: Arc<dyn LedgerStore> = Arc::new(MemoryStore::new());
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
    let node = Arc::new(KsnNode::new(Config::default(), store.clone(), clock, Arc::new(StaticOtp)));

    let parent = enroll(&node, "parent", None).await;
    let mut children = Vec::new();
    for i in 0..8 {
        let child = enroll(&node, &format!("child{}", i), Some(&parent)).await;
        let mut seeded = child.clone();
        seeded.mined_balance = d("10");
        store.save_user(&seeded).unwrap();
        children.push(child.id);
    }

    let handles: Vec<_> = children
        .iter()
        .map(|id| {
            let node = Arc::clone(&node);
            let id = *id;
            thread::spawn(move || node.claims.claim_mined(id).map(|r| r.claim.amount))
        })
        .collect();
    for h in handles {
        let amount = h.join().expect("claim thread panicked");
        assert_eq!(amount, Ok(d("10")));
    }

    let parent = store.user(parent.id).unwrap().expect("parent");
    assert_eq!(parent.referred_balance, d("8"));

    let receipt = node.claims.claim_referred(parent.id).unwrap();
    assert_eq!(receipt.claim.amount, d("8"));
    assert_eq!(node.claims.claims_for(parent.id).map(|c| c.len()), Ok(1));
}

#[tokio::test]
async fn cyclic_graph_surfaces_cycle() {
    let store: Arc<dyn LedgerStore> = Arc::new(MemoryStore::new());
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
    let node = KsnNode::new(Config::default(), store.clone(), clock, Arc::new(StaticOtp));

    let a = enroll(&node, "a", None).await;
    let b = enroll(&node, "b", Some(&a)).await;

    // Corrupt A to point back at B: A → B → A.
    let mut a_doc = store.user(a.id).unwrap().expect("a");
    a_doc.reference_from = Some(b.referral_code.clone());
    store.save_user(&a_doc).unwrap();

    let mut b_doc = store.user(b.id).unwrap().expect("b");
    b_doc.mined_balance = d("20");
    store.save_user(&b_doc).unwrap();

    assert_eq!(
        node.rewards.compute_level_bonus(b.id).map(|x| x.total()),
        Err(RewardError::CycleDetected(b.id))
    );
    assert_eq!(
        node.claims.claim_mined(b.id).map(|r| r.claim.id),
        Err(RewardError::CycleDetected(b.id))
    );
    assert_eq!(
        store.user(b.id).ok().flatten().map(|u| u.mined_balance),
        Some(d("20"))
    );
}
