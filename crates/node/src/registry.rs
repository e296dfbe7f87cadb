//! # Registry
//!
//! Account lifecycle at the boundary of the rewards engine: signup with an
//! optional referral code, one-time-password verification, and read-only
//! snapshots for the mining dashboard.
//!
//! OTP delivery is behind the [`Notifier`] trait. [`LogNotifier`] writes
//! the code to the log and is meant for development only.

use std::sync::Arc;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use ksn_common::{Clock, LedgerStore, UnitOfWork, User, UserFilter, UserId};

use crate::error::{Result, RewardError};
use crate::locks::UserLocks;
use crate::referral_graph::{ReferralCounts, ReferralGraph};

const REFERRAL_CODE_LEN: usize = 8;
const USER_NUMBER_RANGE: std::ops::RangeInclusive<u32> = 1_000_000..=9_999_999;
const OTP_RANGE: std::ops::RangeInclusive<u32> = 100_000..=999_999;

// ════════════════════════════════════════════════════════════════════════════
// NOTIFIER
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct NotifyError(pub String);

/// Outbound channel for one-time passwords.
///
/// Implementations generate the code, deliver it, and return it so the
/// registry can store it. No retries.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_otp(&self, email: &str) -> std::result::Result<u32, NotifyError>;
}

/// Logs the code instead of delivering it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_otp(&self, email: &str) -> std::result::Result<u32, NotifyError> {
        let code = rand::thread_rng().gen_range(OTP_RANGE);
        info!(email = %email, otp = code, "one-time password issued");
        Ok(code)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// REQUESTS / SNAPSHOTS
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignUp {
    pub username: String,
    pub email: String,
    pub address: Option<String>,
    /// Referral code of the inviting user.
    pub referral_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MiningSnapshot {
    pub mined: Decimal,
    pub referred: Decimal,
    pub is_mining: bool,
}

// ════════════════════════════════════════════════════════════════════════════
// REGISTRY
// ════════════════════════════════════════════════════════════════════════════

pub struct Registry {
    store: Arc<dyn LedgerStore>,
    locks: Arc<UserLocks>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    max_depth: u32,
}

impl Registry {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        locks: Arc<UserLocks>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        max_depth: u32,
    ) -> Self {
        Self { store, locks, clock, notifier, max_depth }
    }

    pub fn user(&self, id: UserId) -> Result<User> {
        self.store
            .user(id)?
            .ok_or_else(|| RewardError::UserNotFound(id.to_string()))
    }

    pub fn user_by_email(&self, email: &str) -> Result<User> {
        self.store
            .user_by_email(email)?
            .ok_or_else(|| RewardError::UserNotFound(email.to_string()))
    }

    fn ensure_free(&self, filter: UserFilter, field: &str, value: &str) -> Result<()> {
        if self.store.find_user(&filter)?.is_some() {
            return Err(RewardError::Conflict(format!("{} '{}' is already in use", field, value)));
        }
        Ok(())
    }

    /// Fresh referral code and user number, unique at the time of the call.
    fn allocate_identifiers(&self) -> Result<(String, u32)> {
        let mut rng = rand::thread_rng();
        let code = loop {
            let candidate: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(REFERRAL_CODE_LEN)
                .map(char::from)
                .collect();
            if self.store.user_by_referral_code(&candidate)?.is_none() {
                break candidate;
            }
        };
        let number = loop {
            let candidate = rng.gen_range(USER_NUMBER_RANGE);
            if self.store.find_user(&UserFilter::UserNumber(candidate))?.is_none() {
                break candidate;
            }
        };
        Ok((code, number))
    }

    /// Create an unverified account and send its first OTP.
    ///
    /// # Errors
    ///
    /// - [`RewardError::InvalidReference`] for an unknown referral code.
    /// - [`RewardError::Conflict`] for a taken username, email, or address.
    /// - [`RewardError::Notification`] if the OTP cannot be sent; nothing
    ///   is persisted in that case.
    pub async fn sign_up(&self, request: SignUp) -> Result<User> {
        let referral_code = request.referral_code.filter(|code| !code.is_empty());
        let referrer = match &referral_code {
            Some(code) => Some(
                self.store
                    .user_by_referral_code(code)?
                    .ok_or_else(|| RewardError::InvalidReference(code.clone()))?,
            ),
            None => None,
        };

        self.ensure_free(UserFilter::Username(request.username.clone()), "username", &request.username)?;
        self.ensure_free(UserFilter::Email(request.email.clone()), "email", &request.email)?;
        if let Some(address) = &request.address {
            self.ensure_free(UserFilter::Address(address.clone()), "address", address)?;
        }

        let (code, number) = self.allocate_identifiers()?;
        let otp = self
            .notifier
            .send_otp(&request.email)
            .await
            .map_err(|e| RewardError::Notification(e.0))?;

        let mut user = User::new(request.username, request.email, code, number, self.clock.now());
        user.address = request.address;
        user.otp = Some(otp);
        user.reference_from = referral_code;

        let mut work = UnitOfWork::new();
        let _guard = self
            .locks
            .lock_many(std::iter::once(user.id).chain(referrer.as_ref().map(|r| r.id)));
        if let Some(referrer) = referrer {
            let mut referrer = self.user(referrer.id)?;
            referrer.reference_to.push(user.id);
            referrer.updated_at = user.created_at;
            work.save_user(referrer);
        }
        work.save_user(user.clone());
        self.store.commit(work)?;

        info!(
            user = %user.id,
            username = %user.username,
            referred_by = user.referrer_code().unwrap_or("-"),
            "user signed up"
        );
        Ok(user)
    }

    /// Mark the account verified if `otp` matches the pending code.
    pub fn verify(&self, email: &str, otp: u32) -> Result<User> {
        let id = self.user_by_email(email)?.id;
        let _guard = self.locks.lock(id);
        let mut user = self.user(id)?;
        if user.verified {
            return Err(RewardError::AlreadyVerified(email.to_string()));
        }
        if user.otp != Some(otp) {
            debug!(user = %id, "otp mismatch");
            return Err(RewardError::InvalidOtp);
        }
        user.verified = true;
        user.otp = None;
        user.updated_at = self.clock.now();
        self.store.save_user(&user)?;
        info!(user = %id, "user verified");
        Ok(user)
    }

    /// Issue a new OTP for an unverified account, replacing the pending one.
    pub async fn resend_otp(&self, email: &str) -> Result<()> {
        let user = self.user_by_email(email)?;
        if user.verified {
            return Err(RewardError::AlreadyVerified(email.to_string()));
        }
        let otp = self
            .notifier
            .send_otp(email)
            .await
            .map_err(|e| RewardError::Notification(e.0))?;

        let _guard = self.locks.lock(user.id);
        let mut user = self.user(user.id)?;
        user.otp = Some(otp);
        user.updated_at = self.clock.now();
        self.store.save_user(&user)?;
        Ok(())
    }

    pub fn mining_data(&self, id: UserId) -> Result<MiningSnapshot> {
        let user = self.user(id)?;
        Ok(MiningSnapshot {
            mined: user.mined_balance,
            referred: user.referred_balance,
            is_mining: user.mining,
        })
    }

    pub fn count_referrals(&self, id: UserId) -> Result<ReferralCounts> {
        let user = self.user(id)?;
        ReferralGraph::new(self.store.as_ref(), self.max_depth).count_referrals(&user)
    }
}
