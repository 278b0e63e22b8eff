//! Billing error types.

use nova_firestore::{FirestoreError, TxnError};
use nova_models::{LimitCheck, LimitDimension, PlanTier};
use thiserror::Error;

/// Result type for billing operations.
pub type BillingResult<T> = Result<T, BillingError>;

/// Errors that can occur in billing operations.
///
/// Every variant except `Contention` and `Store` is a clean rejection:
/// the ledger is exactly as it was before the call.
#[derive(Debug, Error)]
pub enum BillingError {
    /// Effective balance below the computed or declared cost.
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits { balance: i64, required: i64 },

    /// Requested parameter exceeds an absolute ceiling no plan lifts.
    #[error("{dimension} {requested} exceeds the absolute maximum of {max}")]
    HardCapExceeded {
        dimension: LimitDimension,
        requested: u32,
        max: u32,
    },

    /// Requested parameter exceeds the resolved plan's ceiling.
    #[error("{dimension} {requested} exceeds the {plan} plan limit of {allowed}")]
    PlanLimitExceeded {
        plan: PlanTier,
        dimension: LimitDimension,
        requested: String,
        allowed: String,
    },

    /// Add-on key not in the catalog.
    #[error("unknown addon: {key}")]
    UnknownAddon { key: String },

    /// Pack id not in the catalog.
    #[error("unknown pack: {id}")]
    UnknownPack { id: String },

    /// Plan id is not purchasable.
    #[error("unknown plan: {plan_id}")]
    UnknownPlan { plan_id: String },

    /// No price for that plan and period combination.
    #[error("plan {plan} is not sold for a {period_days}-day period")]
    BadPeriod { plan: PlanTier, period_days: u32 },

    /// Operation requires an existing ledger and none exists.
    #[error("user record not found: {uid}")]
    UserNotFound { uid: String },

    /// Every transaction attempt lost its commit race. Safe to retry.
    #[error("ledger busy after {attempts} attempts, retry later")]
    Contention { attempts: u32 },

    /// The document store failed.
    #[error("store error: {0}")]
    Store(#[from] FirestoreError),
}

impl BillingError {
    /// True for failures the caller can simply retry.
    pub fn is_transient(&self) -> bool {
        match self {
            BillingError::Contention { .. } => true,
            BillingError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<TxnError<BillingError>> for BillingError {
    fn from(e: TxnError<BillingError>) -> Self {
        match e {
            TxnError::Aborted(err) => err,
            TxnError::Contention { attempts } => BillingError::Contention { attempts },
            TxnError::Store(err) => BillingError::Store(err),
        }
    }
}

/// Convert a failed limit check into its typed error.
pub fn limit_violation(check: LimitCheck) -> Option<BillingError> {
    match check {
        LimitCheck::Ok => None,
        LimitCheck::HardCap {
            dimension,
            requested,
            max,
        } => Some(BillingError::HardCapExceeded {
            dimension,
            requested,
            max,
        }),
        LimitCheck::PlanCap {
            dimension,
            plan,
            requested,
            allowed,
        } => Some(BillingError::PlanLimitExceeded {
            plan,
            dimension,
            requested,
            allowed,
        }),
    }
}
