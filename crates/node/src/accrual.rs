//! # Mining Accrual Supervisor
//!
//! Owns one background task per mining user. Each task credits a fixed
//! increment on a fixed interval until the session window closes.
//!
//! ## Session Timeline
//!
//! ```text
//!  start           tick 1          tick 2                  tick N   window end
//!    │───interval────│───interval────│─── ... ───────────────│──────────│
//!    mining = true                                                 mining = false
//! ```
//!
//! A session is identified by its `mining_started_at` timestamp. Every tick
//! re-reads the user under its lock and only writes while that same
//! session is still active, so a claim or a cancel that clears the flag
//! ends the task at its next tick.
//!
//! ## Failure Semantics
//!
//! A persistence error during a tick stops that session immediately and is
//! reported as [`AccrualOutcome::Failed`]. The stored mining flag is left as
//! it was; [`AccrualSupervisor::recover`] picks the session up on the next
//! start.
//!
//! ## Restart
//!
//! Sessions survive a restart through the persisted `mining_started_at`
//! and `mining_ticks`. `recover` credits every tick that fell due while
//! nothing was running and reattaches a task for the rest of the window.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use ksn_common::{round_amount, AccrualConfig, Clock, LedgerStore, User, UserFilter, UserId};

use crate::error::{Result, RewardError};
use crate::locks::UserLocks;

// ════════════════════════════════════════════════════════════════════════════
// PUBLIC TYPES
// ════════════════════════════════════════════════════════════════════════════

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AccrualOutcome {
    /// The window closed and the mining flag was cleared.
    Completed { ticks: u32 },
    /// The session was ended elsewhere (claim, another session).
    Stopped { ticks: u32 },
    /// Aborted through [`AccrualSupervisor::cancel`] or shutdown.
    Cancelled,
    /// A tick could not be persisted.
    Failed { ticks: u32, error: String },
}

/// A session with a live task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveSession {
    pub user: UserId,
    pub started_at: DateTime<Utc>,
}

/// Summary of [`AccrualSupervisor::recover`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Sessions reattached for the rest of their window.
    pub resumed: usize,
    /// Sessions whose window had already closed.
    pub completed: usize,
    /// Users flagged mining with no session timestamp, given a new window.
    pub restarted: usize,
    /// Ticks credited for time spent without a task.
    pub credited_ticks: u64,
}

// ════════════════════════════════════════════════════════════════════════════
// SUPERVISOR
// ════════════════════════════════════════════════════════════════════════════

/// Outcomes kept for [`AccrualSupervisor::take_finished`]. The oldest is
/// dropped when a new one arrives at capacity.
pub const FINISHED_CAPACITY: usize = 1024;

struct TaskEntry {
    started_at: DateTime<Utc>,
    handle: JoinHandle<()>,
    outcome: watch::Receiver<Option<AccrualOutcome>>,
}

struct Shared {
    store: Arc<dyn LedgerStore>,
    locks: Arc<UserLocks>,
    clock: Arc<dyn Clock>,
    config: AccrualConfig,
    tasks: Mutex<HashMap<UserId, TaskEntry>>,
    finished: Mutex<VecDeque<(UserId, AccrualOutcome)>>,
}

/// Spawns, tracks, and reconciles accrual tasks.
///
/// Spawning requires a running tokio runtime.
#[derive(Clone)]
pub struct AccrualSupervisor {
    shared: Arc<Shared>,
}

impl AccrualSupervisor {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        locks: Arc<UserLocks>,
        clock: Arc<dyn Clock>,
        config: AccrualConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                locks,
                clock,
                config,
                tasks: Mutex::new(HashMap::new()),
                finished: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// Begin a session for `user_id` and return its start timestamp.
    ///
    /// # Errors
    ///
    /// - [`RewardError::UserNotFound`]
    /// - [`RewardError::NotVerified`]
    /// - [`RewardError::AlreadyInProgress`] if the user is already mining.
    pub fn start_accrual(&self, user_id: UserId) -> Result<DateTime<Utc>> {
        let started_at = {
            let _guard = self.shared.locks.lock(user_id);
            let mut user = self.shared.load(user_id)?;
            if !user.verified {
                return Err(RewardError::NotVerified(user_id));
            }
            if user.mining {
                return Err(RewardError::AlreadyInProgress(user_id));
            }
            let now = self.shared.clock.now();
            user.begin_session(now);
            self.shared.store.save_user(&user)?;
            now
        };

        info!(
            user = %user_id,
            ticks = self.shared.config.total_ticks(),
            interval_secs = self.shared.config.tick_interval_secs,
            "mining session started"
        );
        self.spawn(user_id, started_at, 0, Duration::ZERO);
        Ok(started_at)
    }

    fn spawn(&self, user: UserId, started_at: DateTime<Utc>, credited: u32, elapsed: Duration) {
        let (tx, rx) = watch::channel(None);
        let shared = Arc::clone(&self.shared);

        // Hold the registry lock across spawn so the task cannot deregister
        // before it is registered.
        let mut tasks = self.shared.tasks.lock();
        let handle = tokio::spawn(async move {
            let outcome = shared.run_session(user, started_at, credited, elapsed).await;
            match &outcome {
                AccrualOutcome::Completed { ticks } => {
                    info!(user = %user, ticks, "mining session completed")
                }
                AccrualOutcome::Stopped { ticks } => {
                    warn!(user = %user, ticks, "mining session ended externally")
                }
                AccrualOutcome::Failed { ticks, error } => {
                    error!(user = %user, ticks, error = %error, "mining session failed")
                }
                AccrualOutcome::Cancelled => {}
            }
            shared.record_finished(user, outcome.clone());
            let _ = tx.send(Some(outcome));

            let mut tasks = shared.tasks.lock();
            if tasks.get(&user).map(|e| e.started_at) == Some(started_at) {
                tasks.remove(&user);
            }
        });
        tasks.insert(user, TaskEntry { started_at, handle, outcome: rx });
    }

    /// Sessions with a live task, ordered by user id.
    pub fn list(&self) -> Vec<ActiveSession> {
        let mut sessions: Vec<ActiveSession> = self
            .shared
            .tasks
            .lock()
            .iter()
            .map(|(user, entry)| ActiveSession { user: *user, started_at: entry.started_at })
            .collect();
        sessions.sort_by_key(|s| s.user);
        sessions
    }

    pub fn is_running(&self, user: UserId) -> bool {
        self.shared.tasks.lock().contains_key(&user)
    }

    /// Abort the task for `user_id` and clear its mining flag.
    ///
    /// Returns `false` when there was neither a task nor a flag to clear.
    pub fn cancel(&self, user_id: UserId) -> Result<bool> {
        let entry = self.shared.tasks.lock().remove(&user_id);
        if let Some(entry) = &entry {
            entry.handle.abort();
        }

        let cleared = {
            let _guard = self.shared.locks.lock(user_id);
            let mut user = self.shared.load(user_id)?;
            if user.mining {
                user.end_session(self.shared.clock.now());
                self.shared.store.save_user(&user)?;
                true
            } else {
                false
            }
        };

        if entry.is_some() || cleared {
            info!(user = %user_id, "mining session cancelled");
        }
        Ok(entry.is_some() || cleared)
    }

    /// Wait for the running session of `user` to end.
    ///
    /// `None` if no task is tracked for the user.
    pub async fn wait(&self, user: UserId) -> Option<AccrualOutcome> {
        let mut rx = self.shared.tasks.lock().get(&user).map(|e| e.outcome.clone())?;
        let outcome = match rx.wait_for(|o| o.is_some()).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        Some(outcome.unwrap_or(AccrualOutcome::Cancelled))
    }

    /// Drain outcomes of sessions that ended since the last call, oldest
    /// first. At most [`FINISHED_CAPACITY`] are retained between calls.
    pub fn take_finished(&self) -> Vec<(UserId, AccrualOutcome)> {
        self.shared.finished.lock().drain(..).collect()
    }

    /// Abort every task. Mining flags stay set for the next `recover`.
    pub fn shutdown(&self) {
        let tasks: Vec<(UserId, TaskEntry)> = self.shared.tasks.lock().drain().collect();
        for (_, entry) in &tasks {
            entry.handle.abort();
        }
        info!(aborted = tasks.len(), "accrual supervisor shut down");
    }

    /// Reconcile persisted sessions after a restart.
    pub fn recover(&self) -> Result<RecoveryReport> {
        let shared = &self.shared;
        let cfg = &shared.config;
        let total = cfg.total_ticks();
        let mut report = RecoveryReport::default();

        for candidate in shared.store.find_users(&UserFilter::Mining)? {
            if self.is_running(candidate.id) {
                continue;
            }
            let _guard = shared.locks.lock(candidate.id);
            let mut user = shared.load(candidate.id)?;
            if !user.mining {
                continue;
            }
            let now = shared.clock.now();

            let Some(started_at) = user.mining_started_at else {
                user.begin_session(now);
                shared.store.save_user(&user)?;
                self.spawn(user.id, now, 0, Duration::ZERO);
                warn!(user = %user.id, "mining flag without session, started a new window");
                report.restarted += 1;
                continue;
            };

            let elapsed = (now - started_at).to_std().unwrap_or(Duration::ZERO);
            let due = elapsed
                .as_secs()
                .checked_div(cfg.tick_interval_secs)
                .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX))
                .min(total);
            let missing = due.saturating_sub(user.mining_ticks);
            for _ in 0..missing {
                shared.credit(&mut user);
            }
            report.credited_ticks += u64::from(missing);

            if elapsed >= cfg.duration() {
                let ticks = user.mining_ticks;
                user.end_session(now);
                shared.store.save_user(&user)?;
                info!(user = %user.id, ticks, credited = missing, "recovered expired mining session");
                report.completed += 1;
            } else {
                user.updated_at = now;
                shared.store.save_user(&user)?;
                self.spawn(user.id, started_at, user.mining_ticks, elapsed);
                info!(user = %user.id, ticks = user.mining_ticks, credited = missing, "resumed mining session");
                report.resumed += 1;
            }
        }

        Ok(report)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TASK BODY
// ════════════════════════════════════════════════════════════════════════════

impl Shared {
    fn load(&self, id: UserId) -> Result<User> {
        self.store
            .user(id)?
            .ok_or_else(|| RewardError::UserNotFound(id.to_string()))
    }

    fn record_finished(&self, user: UserId, outcome: AccrualOutcome) {
        let mut finished = self.finished.lock();
        if finished.len() == FINISHED_CAPACITY {
            if let Some((dropped, _)) = finished.pop_front() {
                debug!(user = %dropped, "finished outcome evicted before it was taken");
            }
        }
        finished.push_back((user, outcome));
    }

    fn credit(&self, user: &mut User) {
        user.mined_balance = round_amount(user.mined_balance + self.config.increment, self.config.precision);
        user.mining_ticks += 1;
    }

    /// Tick schedule of one session. `credited` ticks are already on the
    /// ledger and `elapsed` of the window has passed.
    async fn run_session(
        &self,
        user: UserId,
        started_at: DateTime<Utc>,
        credited: u32,
        elapsed: Duration,
    ) -> AccrualOutcome {
        let base = Instant::now();
        let interval = self.config.tick_interval();
        let mut ticks = credited;

        for k in (credited + 1)..=self.config.total_ticks() {
            sleep_until(base + (interval * k).saturating_sub(elapsed)).await;
            match self.apply_tick(user, started_at) {
                Ok(Some(n)) => ticks = n,
                Ok(None) => return AccrualOutcome::Stopped { ticks },
                Err(e) => return AccrualOutcome::Failed { ticks, error: e.to_string() },
            }
        }

        sleep_until(base + self.config.duration().saturating_sub(elapsed)).await;
        match self.finish_session(user, started_at) {
            Ok(true) => AccrualOutcome::Completed { ticks },
            Ok(false) => AccrualOutcome::Stopped { ticks },
            Err(e) => AccrualOutcome::Failed { ticks, error: e.to_string() },
        }
    }

    /// Credit one tick. `None` when the session is no longer current.
    fn apply_tick(&self, user_id: UserId, started_at: DateTime<Utc>) -> Result<Option<u32>> {
        let _guard = self.locks.lock(user_id);
        let Some(mut user) = self.store.user(user_id)? else {
            return Ok(None);
        };
        if !user.in_session(started_at) {
            return Ok(None);
        }
        self.credit(&mut user);
        user.updated_at = self.clock.now();
        self.store.save_user(&user)?;
        debug!(user = %user_id, tick = user.mining_ticks, balance = %user.mined_balance, "mining tick");
        Ok(Some(user.mining_ticks))
    }

    fn finish_session(&self, user_id: UserId, started_at: DateTime<Utc>) -> Result<bool> {
        let _guard = self.locks.lock(user_id);
        let Some(mut user) = self.store.user(user_id)? else {
            return Ok(false);
        };
        if !user.in_session(started_at) {
            return Ok(false);
        }
        user.end_session(self.clock.now());
        self.store.save_user(&user)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    use chrono::Duration as ChronoDuration;
    use ksn_common::{Claim, ClaimId, ManualClock, MemoryStore, StoreError, UnitOfWork};
    use rust_decimal::Decimal;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    /// Store that starts refusing commits after a budget is spent.
    struct FlakyStore {
        inner: MemoryStore,
        commits_left: AtomicI32,
    }

    impl LedgerStore for FlakyStore {
        fn user(&self, id: UserId) -> std::result::Result<Option<User>, StoreError> {
            self.inner.user(id)
        }
        fn find_users(&self, filter: &UserFilter) -> std::result::Result<Vec<User>, StoreError> {
            self.inner.find_users(filter)
        }
        fn claim(&self, id: ClaimId) -> std::result::Result<Option<Claim>, StoreError> {
            self.inner.claim(id)
        }
        fn claims_for_user(&self, user: UserId) -> std::result::Result<Vec<Claim>, StoreError> {
            self.inner.claims_for_user(user)
        }
        fn commit(&self, work: UnitOfWork) -> std::result::Result<(), StoreError> {
            if self.commits_left.fetch_sub(1, Ordering::SeqCst) <= 0 {
                return Err(StoreError::Unavailable("commit budget spent".into()));
            }
            self.inner.commit(work)
        }
    }

    fn verified_user(store: &dyn LedgerStore, n: u32) -> User {
        let mut user = User::new(
            format!("miner{}", n),
            format!("miner{}@example.com", n),
            format!("MINE{:04}", n),
            5_000_000 + n,
            Utc::now(),
        );
        user.verified = true;
        store.save_user(&user).unwrap();
        user
    }

    fn supervisor(store: Arc<dyn LedgerStore>, clock: Arc<ManualClock>) -> AccrualSupervisor {
        AccrualSupervisor::new(store, Arc::new(UserLocks::new()), clock, AccrualConfig::default())
    }

    fn reload(store: &dyn LedgerStore, id: UserId) -> User {
        store
            .user(id)
            .unwrap()
            .expect("missing user")
    }

    #[tokio::test(start_paused = true)]
    async fn full_session_credits_every_tick() {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryStore::new());
        let sup = supervisor(store.clone(), Arc::new(ManualClock::new(Utc::now())));
        let user = verified_user(store.as_ref(), 1);

        sup.start_accrual(user.id).unwrap();
        assert!(reload(store.as_ref(), user.id).mining);
        assert_eq!(sup.list().len(), 1);

        let outcome = sup.wait(user.id).await;
        assert_eq!(outcome, Some(AccrualOutcome::Completed { ticks: 12 }));

        let after = reload(store.as_ref(), user.id);
        assert!(!after.mining);
        // 0.000125 rounds to 0.00013 on every tick.
        assert_eq!(after.mined_balance, d("0.00156"));
        assert!(sup.list().is_empty());
        assert_eq!(sup.take_finished().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_land_on_interval() {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryStore::new());
        let sup = supervisor(store.clone(), Arc::new(ManualClock::new(Utc::now())));
        let user = verified_user(store.as_ref(), 2);

        sup.start_accrual(user.id).unwrap();
        tokio::time::sleep(Duration::from_secs(35)).await;

        let mid = reload(store.as_ref(), user.id);
        assert_eq!(mid.mining_ticks, 3);
        assert_eq!(mid.mined_balance, d("0.00039"));
        assert!(mid.mining);
    }

    #[tokio::test(start_paused = true)]
    async fn start_preconditions() {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryStore::new());
        let sup = supervisor(store.clone(), Arc::new(ManualClock::new(Utc::now())));

        let ghost = UserId::new();
        assert_eq!(sup.start_accrual(ghost), Err(RewardError::UserNotFound(ghost.to_string())));

        let mut unverified = verified_user(store.as_ref(), 3);
        unverified.verified = false;
        store.save_user(&unverified).unwrap();
        assert_eq!(sup.start_accrual(unverified.id), Err(RewardError::NotVerified(unverified.id)));

        let user = verified_user(store.as_ref(), 4);
        sup.start_accrual(user.id).unwrap();
        assert_eq!(sup.start_accrual(user.id), Err(RewardError::AlreadyInProgress(user.id)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_clears_flag_and_stops_ticks() {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryStore::new());
        let sup = supervisor(store.clone(), Arc::new(ManualClock::new(Utc::now())));
        let user = verified_user(store.as_ref(), 5);

        sup.start_accrual(user.id).unwrap();
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(sup.cancel(user.id), Ok(true));
        assert!(!sup.is_running(user.id));

        tokio::time::sleep(Duration::from_secs(200)).await;
        let after = reload(store.as_ref(), user.id);
        assert!(!after.mining);
        assert_eq!(after.mined_balance, d("0.00026"));
        assert_eq!(sup.cancel(user.id), Ok(false));
    }

    #[tokio::test(start_paused = true)]
    async fn external_clear_stops_session() {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryStore::new());
        let sup = supervisor(store.clone(), Arc::new(ManualClock::new(Utc::now())));
        let user = verified_user(store.as_ref(), 6);

        sup.start_accrual(user.id).unwrap();
        tokio::time::sleep(Duration::from_secs(15)).await;

        let mut u = reload(store.as_ref(), user.id);
        u.end_session(Utc::now());
        store.save_user(&u).unwrap();

        assert_eq!(sup.wait(user.id).await, Some(AccrualOutcome::Stopped { ticks: 1 }));
        assert_eq!(reload(store.as_ref(), user.id).mined_balance, d("0.00013"));
    }

    #[tokio::test(start_paused = true)]
    async fn persistence_failure_is_fail_stop() {
        let flaky = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            commits_left: AtomicI32::new(i32::MAX),
        });
        let store: Arc<dyn LedgerStore> = flaky.clone();
        let sup = supervisor(store.clone(), Arc::new(ManualClock::new(Utc::now())));
        let user = verified_user(store.as_ref(), 7);

        // Session start plus two ticks.
        flaky.commits_left.store(3, Ordering::SeqCst);
        sup.start_accrual(user.id).unwrap();

        let outcome = sup.wait(user.id).await;
        assert!(matches!(outcome, Some(AccrualOutcome::Failed { ticks: 2, .. })));

        let after = reload(store.as_ref(), user.id);
        assert_eq!(after.mined_balance, d("0.00026"));
        // Flag is left stale for recovery.
        assert!(after.mining);
    }

    #[tokio::test(start_paused = true)]
    async fn recover_reconciles_persisted_sessions() {
        let now = Utc::now();
        let clock = Arc::new(ManualClock::new(now));
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryStore::new());
        let sup = supervisor(store.clone(), clock.clone());

        // 45s into a window with ticks 1 and 2 on the ledger.
        let mut midway = verified_user(store.as_ref(), 8);
        midway.begin_session(now - ChronoDuration::seconds(45));
        midway.mining_ticks = 2;
        midway.mined_balance = d("0.00026");
        store.save_user(&midway).unwrap();

        // Window closed long ago, nothing credited.
        let mut expired = verified_user(store.as_ref(), 9);
        expired.begin_session(now - ChronoDuration::minutes(10));
        store.save_user(&expired).unwrap();

        // Flag without a session.
        let mut legacy = verified_user(store.as_ref(), 10);
        legacy.mining = true;
        store.save_user(&legacy).unwrap();

        let report = sup.recover().unwrap();
        assert_eq!(
            report,
            RecoveryReport { resumed: 1, completed: 1, restarted: 1, credited_ticks: 14 }
        );

        let exp = reload(store.as_ref(), expired.id);
        assert!(!exp.mining);
        assert_eq!(exp.mined_balance, d("0.00156"));

        let mid = reload(store.as_ref(), midway.id);
        assert_eq!(mid.mining_ticks, 4);
        assert_eq!(mid.mined_balance, d("0.00052"));

        assert_eq!(sup.wait(midway.id).await, Some(AccrualOutcome::Completed { ticks: 12 }));
        assert_eq!(reload(store.as_ref(), midway.id).mined_balance, d("0.00156"));

        assert_eq!(sup.wait(legacy.id).await, Some(AccrualOutcome::Completed { ticks: 12 }));

        // Nothing left to reconcile.
        assert_eq!(sup.recover(), Ok(RecoveryReport::default()));
    }

    #[tokio::test(start_paused = true)]
    async fn rounding_drift_stays_within_half_unit_per_tick() {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryStore::new());
        let config = AccrualConfig {
            increment: d("0.0000123456"),
            ..AccrualConfig::default()
        };
        let sup = AccrualSupervisor::new(
            store.clone(),
            Arc::new(UserLocks::new()),
            Arc::new(ManualClock::new(Utc::now())),
            config.clone(),
        );
        let user = verified_user(store.as_ref(), 12);

        sup.start_accrual(user.id).unwrap();
        assert_eq!(sup.wait(user.id).await, Some(AccrualOutcome::Completed { ticks: 12 }));

        let after = reload(store.as_ref(), user.id);
        let ticks = Decimal::from(after.mining_ticks);
        let exact = config.increment * ticks;
        let half_unit = Decimal::new(5, config.precision + 1);
        assert!(after.mined_balance.scale() <= config.precision);
        assert!((after.mined_balance - exact).abs() <= ticks * half_unit);
    }

    #[test]
    fn finished_outcomes_are_bounded() {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryStore::new());
        let sup = supervisor(store, Arc::new(ManualClock::new(Utc::now())));

        let users: Vec<UserId> = (0..FINISHED_CAPACITY + 3).map(|_| UserId::new()).collect();
        for (i, user) in users.iter().enumerate() {
            let ticks = u32::try_from(i).unwrap();
            sup.shared.record_finished(*user, AccrualOutcome::Stopped { ticks });
        }

        let taken = sup.take_finished();
        assert_eq!(taken.len(), FINISHED_CAPACITY);
        assert_eq!(taken[0], (users[3], AccrualOutcome::Stopped { ticks: 3 }));
        assert!(sup.take_finished().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_keeps_flags() {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryStore::new());
        let sup = supervisor(store.clone(), Arc::new(ManualClock::new(Utc::now())));
        let user = verified_user(store.as_ref(), 11);

        sup.start_accrual(user.id).unwrap();
        sup.shutdown();
        assert!(sup.list().is_empty());
        assert!(reload(store.as_ref(), user.id).mining);
    }
}
