//! # Per-User Lock Registry
//!
//! Every read-modify-write of a user's balances happens while that user's
//! lock is held. Operations touching several users (a mined claim credits
//! the whole upstream chain) lock them all in ascending id order, so two
//! such operations can never deadlock.
//!
//! Locks are plain `parking_lot` mutexes: they are taken and released
//! inside synchronous sections and are never held across an `.await`.
//! A user's slot is dropped from the registry once no guard or waiter
//! references it.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};

use ksn_common::UserId;

type Slots = Mutex<HashMap<UserId, Arc<Mutex<()>>>>;

/// Lazily populated map of one mutex per user.
#[derive(Debug, Default)]
pub struct UserLocks {
    slots: Arc<Slots>,
}

/// Guards for a set of users; released on drop.
#[must_use = "the locks are released as soon as the guard set is dropped"]
pub struct LockSet {
    users: Vec<UserId>,
    guards: Vec<ArcMutexGuard<RawMutex, ()>>,
    slots: Arc<Slots>,
}

impl LockSet {
    /// Users covered by this set, ascending.
    pub fn users(&self) -> &[UserId] {
        &self.users
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        self.guards.clear();
        // Slots are only cloned under the registry lock, so a count of one
        // means nobody holds or waits on it.
        let mut map = self.slots.lock();
        for id in &self.users {
            if map.get(id).is_some_and(|slot| Arc::strong_count(slot) == 1) {
                map.remove(id);
            }
        }
    }
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock a single user.
    pub fn lock(&self, user: UserId) -> LockSet {
        self.lock_many([user])
    }

    /// Lock every user in `users` (duplicates collapse) in ascending id order.
    pub fn lock_many(&self, users: impl IntoIterator<Item = UserId>) -> LockSet {
        let ordered: BTreeSet<UserId> = users.into_iter().collect();

        // Resolve slots first so the registry mutex is not held while waiting.
        let slots: Vec<Arc<Mutex<()>>> = {
            let mut map = self.slots.lock();
            ordered
                .iter()
                .map(|id| Arc::clone(map.entry(*id).or_default()))
                .collect()
        };

        let guards = slots.iter().map(|slot| slot.lock_arc()).collect();
        LockSet {
            users: ordered.into_iter().collect(),
            guards,
            slots: Arc::clone(&self.slots),
        }
    }

    /// Number of users currently locked or waited on.
    pub fn tracked(&self) -> usize {
        self.slots.lock().len()
    }
}
