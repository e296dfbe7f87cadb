//! Error taxonomy for rewards operations.
//!
//! Every operation surfaces the first error it meets and abandons the rest
//! of its work. Nothing is retried internally; callers map each variant to
//! their own presentation.

use rust_decimal::Decimal;
use thiserror::Error;

use ksn_common::{StoreError, UserId};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RewardError {
    /// No user with the given id or email.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// Claim id does not exist.
    #[error("claim not found: {0}")]
    ClaimNotFound(String),

    #[error("user {0} is not verified")]
    NotVerified(UserId),

    /// An accrual session is already running for this user.
    #[error("user {0} is already mining")]
    AlreadyInProgress(UserId),

    /// Balance below the claimable minimum.
    #[error("balance {actual} is below the minimum of {required}")]
    ThresholdNotMet { required: Decimal, actual: Decimal },

    /// A referral code does not resolve to a user.
    #[error("referring user not found for code {0}")]
    InvalidReference(String),

    /// Traversal reached the same user twice.
    #[error("referral cycle detected at user {0}")]
    CycleDetected(UserId),

    #[error("referral chain exceeds maximum depth of {0}")]
    DepthExceeded(u32),

    /// A unique field is already taken.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("user {0} is already verified")]
    AlreadyVerified(String),

    #[error("one-time password does not match")]
    InvalidOtp,

    /// The outbound notification channel failed.
    #[error("notification failed: {0}")]
    Notification(String),

    #[error("persistence failure: {0}")]
    Persistence(StoreError),
}

impl From<StoreError> for RewardError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { field, value } => {
                RewardError::Conflict(format!("{} '{}' is already in use", field, value))
            }
            other => RewardError::Persistence(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, RewardError>;
