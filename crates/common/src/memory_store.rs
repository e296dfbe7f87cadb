//! In-memory [`LedgerStore`] and the ledger state shared with
//! [`JsonFileStore`](crate::file_store::JsonFileStore).

use std::collections::{BTreeMap, HashSet};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::ledger::{Claim, ClaimId, User, UserId};
use crate::store::{LedgerStore, StoreError, UnitOfWork, UserFilter};

// ════════════════════════════════════════════════════════════════════════════
// LEDGER STATE
// ════════════════════════════════════════════════════════════════════════════

/// On-disk form of the ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct LedgerSnapshot {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub claims: Vec<Claim>,
}

/// Previous values of every document touched by one commit.
#[derive(Debug, Default)]
pub(crate) struct Undo {
    users: Vec<(UserId, Option<User>)>,
    claims: Vec<(ClaimId, Option<Claim>)>,
}

/// Users keyed by id, claims in insertion order.
#[derive(Debug, Clone, Default)]
pub(crate) struct LedgerState {
    users: BTreeMap<UserId, User>,
    claims: Vec<Claim>,
}

impl LedgerState {
    pub(crate) fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        Self {
            users: snapshot.users.into_iter().map(|u| (u.id, u)).collect(),
            claims: snapshot.claims,
        }
    }

    pub(crate) fn to_snapshot(&self) -> LedgerSnapshot {
        let mut users: Vec<User> = self.users.values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        LedgerSnapshot {
            users,
            claims: self.claims.clone(),
        }
    }

    pub(crate) fn user(&self, id: UserId) -> Option<User> {
        self.users.get(&id).cloned()
    }

    pub(crate) fn find_users(&self, filter: &UserFilter) -> Vec<User> {
        let mut found: Vec<User> = self
            .users
            .values()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect();
        found.sort_by_key(|u| u.created_at);
        found
    }

    pub(crate) fn claim(&self, id: ClaimId) -> Option<Claim> {
        self.claims.iter().find(|c| c.id == id).cloned()
    }

    pub(crate) fn claims_for_user(&self, user: UserId) -> Vec<Claim> {
        self.claims.iter().filter(|c| c.user == user).cloned().collect()
    }

    /// Validate and apply `work`. Nothing is written when validation fails.
    pub(crate) fn apply(&mut self, work: UnitOfWork) -> Result<Undo, StoreError> {
        self.validate(&work)?;

        let (users, claims) = work.into_parts();
        let mut undo = Undo::default();

        for user in users {
            let previous = self.users.insert(user.id, user.clone());
            undo.users.push((user.id, previous));
        }

        for claim in claims {
            let previous = match self.claims.iter_mut().find(|c| c.id == claim.id) {
                Some(slot) => Some(std::mem::replace(slot, claim.clone())),
                None => {
                    self.claims.push(claim.clone());
                    None
                }
            };
            undo.claims.push((claim.id, previous));
        }

        Ok(undo)
    }

    /// Restore the documents recorded in `undo`.
    pub(crate) fn revert(&mut self, undo: Undo) {
        for (id, previous) in undo.claims.into_iter().rev() {
            match previous {
                Some(claim) => {
                    if let Some(slot) = self.claims.iter_mut().find(|c| c.id == id) {
                        *slot = claim;
                    }
                }
                None => self.claims.retain(|c| c.id != id),
            }
        }
        for (id, previous) in undo.users.into_iter().rev() {
            match previous {
                Some(user) => {
                    self.users.insert(id, user);
                }
                None => {
                    self.users.remove(&id);
                }
            }
        }
    }

    fn validate(&self, work: &UnitOfWork) -> Result<(), StoreError> {
        let incoming: HashSet<UserId> = work.users().iter().map(|u| u.id).collect();

        for user in work.users() {
            if user.has_negative_balance() {
                return Err(StoreError::Invalid(format!("negative balance for user {}", user.id)));
            }
            if user.referrer_code() == Some(user.referral_code.as_str()) {
                return Err(StoreError::Invalid(format!("user {} references itself", user.id)));
            }

            // Unique fields unchanged since the last write need no scan.
            if let Some(stored) = self.users.get(&user.id) {
                if same_unique_fields(stored, user) {
                    continue;
                }
            }

            let others = self
                .users
                .values()
                .filter(|other| !incoming.contains(&other.id))
                .chain(work.users().iter().filter(|other| other.id != user.id));
            for other in others {
                check_unique(user, other)?;
            }
        }

        for claim in work.claims() {
            if claim.amount < rust_decimal::Decimal::ZERO {
                return Err(StoreError::Invalid(format!("negative amount on claim {}", claim.id)));
            }
            if !self.users.contains_key(&claim.user) && !incoming.contains(&claim.user) {
                return Err(StoreError::Invalid(format!(
                    "claim {} references unknown user {}",
                    claim.id, claim.user
                )));
            }
        }

        Ok(())
    }
}

fn same_unique_fields(a: &User, b: &User) -> bool {
    a.username == b.username
        && a.email == b.email
        && a.referral_code == b.referral_code
        && a.user_number == b.user_number
        && a.address == b.address
}

fn check_unique(user: &User, other: &User) -> Result<(), StoreError> {
    let conflict = |field: &'static str, value: &str| StoreError::Conflict {
        field,
        value: value.to_string(),
    };

    if user.username == other.username {
        return Err(conflict("username", &user.username));
    }
    if user.email == other.email {
        return Err(conflict("email", &user.email));
    }
    if user.referral_code == other.referral_code {
        return Err(conflict("referral code", &user.referral_code));
    }
    if user.user_number == other.user_number {
        return Err(conflict("user number", &user.user_number.to_string()));
    }
    if let (Some(a), Some(b)) = (&user.address, &other.address) {
        if a == b {
            return Err(conflict("address", a));
        }
    }
    Ok(())
}

// ════════════════════════════════════════════════════════════════════════════
// MEMORY STORE
// ════════════════════════════════════════════════════════════════════════════

/// Volatile [`LedgerStore`] for tests and development.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<LedgerState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    pub fn user_count(&self) -> usize {
        self.state.read().users.len()
    }

    /// Number of stored claims.
    pub fn claim_count(&self) -> usize {
        self.state.read().claims.len()
    }
}

impl LedgerStore for MemoryStore {
    fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().user(id))
    }

    fn find_users(&self, filter: &UserFilter) -> Result<Vec<User>, StoreError> {
        Ok(self.state.read().find_users(filter))
    }

    fn claim(&self, id: ClaimId) -> Result<Option<Claim>, StoreError> {
        Ok(self.state.read().claim(id))
    }

    fn claims_for_user(&self, user: UserId) -> Result<Vec<Claim>, StoreError> {
        Ok(self.state.read().claims_for_user(user))
    }

    fn commit(&self, work: UnitOfWork) -> Result<(), StoreError> {
        if work.is_empty() {
            return Ok(());
        }
        self.state.write().apply(work).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::ClaimKind;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    fn user(name: &str, code: &str, number: u32) -> User {
        User::new(name, format!("{}@example.com", name), code, number, Utc::now())
    }

    #[test]
    fn save_and_find() {
        let store = MemoryStore::new();
        let alice = user("alice", "CODEAAAA", 1_000_001);
        store.save_user(&alice).expect("save failed");

        assert_eq!(store.user(alice.id).ok().flatten(), Some(alice.clone()));
        assert_eq!(
            store.user_by_referral_code("CODEAAAA").ok().flatten().map(|u| u.id),
            Some(alice.id)
        );
        assert_eq!(
            store.user_by_email("alice@example.com").ok().flatten().map(|u| u.id),
            Some(alice.id)
        );
    }

    #[test]
    fn duplicate_email_is_conflict() {
        let store = MemoryStore::new();
        let alice = user("alice", "CODEAAAA", 1_000_001);
        let mut clone = user("alice2", "CODEBBBB", 1_000_002);
        clone.email = alice.email.clone();

        assert!(store.save_user(&alice).is_ok());
        let err = store.save_user(&clone);
        assert_eq!(
            err,
            Err(StoreError::Conflict { field: "email", value: "alice@example.com".into() })
        );
        assert_eq!(store.user_count(), 1);
    }

    #[test]
    fn conflicting_batch_writes_nothing() {
        let store = MemoryStore::new();
        let a = user("a", "CODEAAAA", 1_000_001);
        let b = user("b", "CODEAAAA", 1_000_002);

        let mut work = UnitOfWork::new();
        work.save_user(a).save_user(b);
        assert!(matches!(store.commit(work), Err(StoreError::Conflict { .. })));
        assert_eq!(store.user_count(), 0);
    }

    #[test]
    fn negative_balance_rejected() {
        let store = MemoryStore::new();
        let mut a = user("a", "CODEAAAA", 1_000_001);
        a.referred_balance = Decimal::new(-1, 2);
        assert!(matches!(store.save_user(&a), Err(StoreError::Invalid(_))));
    }

    #[test]
    fn claim_requires_known_user() {
        let store = MemoryStore::new();
        let claim = Claim::new(UserId::new(), ClaimKind::Mined, Decimal::new(5, 0), Utc::now());
        assert!(matches!(store.save_claim(&claim), Err(StoreError::Invalid(_))));
    }

    #[test]
    fn claims_listed_oldest_first_and_upserted() {
        let store = MemoryStore::new();
        let a = user("a", "CODEAAAA", 1_000_001);
        store.save_user(&a).unwrap();

        let t0 = Utc::now();
        let first = Claim::new(a.id, ClaimKind::Mined, Decimal::new(5, 0), t0);
        let mut second = Claim::new(a.id, ClaimKind::Referred, Decimal::new(6, 0), t0 + Duration::seconds(1));
        assert!(store.save_claim(&first).is_ok());
        assert!(store.save_claim(&second).is_ok());

        second.is_release = true;
        assert!(store.save_claim(&second).is_ok());

        let claims = store.claims_for_user(a.id).unwrap();
        assert_eq!(claims.len(), 2);
        assert_eq!(claims[0].id, first.id);
        assert!(claims[1].is_release);
        assert_eq!(store.claim_count(), 2);
    }

    #[test]
    fn revert_restores_previous_documents() {
        let mut state = LedgerState::default();
        let mut a = user("a", "CODEAAAA", 1_000_001);
        let mut work = UnitOfWork::new();
        work.save_user(a.clone());
        assert!(state.apply(work).is_ok());

        a.mined_balance = Decimal::new(3, 0);
        let claim = Claim::new(a.id, ClaimKind::Mined, Decimal::new(3, 0), Utc::now());
        let mut work = UnitOfWork::new();
        work.save_user(a.clone()).save_claim(claim);
        let undo = state.apply(work).unwrap();

        state.revert(undo);
        assert_eq!(state.user(a.id).map(|u| u.mined_balance), Some(Decimal::ZERO));
        assert!(state.claims_for_user(a.id).is_empty());
    }
}
