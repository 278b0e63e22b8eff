//! Billing and entitlement engines.
//!
//! Every mutation of a user ledger lives here, each expressed as one
//! optimistic transaction against the document store:
//! - [`debit::DebitEngine`] charges generations (and applies the
//!   one-shot trial grant)
//! - [`purchase::PurchaseEngine`] sells add-ons, packs, plans, and
//!   credit top-ups
//! - [`sweep::Reconciler`] nulls expired grants and downgrades lapsed
//!   plans
//! - [`dedup::DedupScanner`] reattaches retried generation requests to
//!   a recent pending creation

pub mod debit;
pub mod dedup;
pub mod error;
pub mod purchase;
pub mod sweep;

pub use debit::{DebitEngine, DebitOutcome};
pub use dedup::{DedupScanner, DEDUP_SCAN_LIMIT, DEDUP_WINDOW_MINUTES};
pub use error::{BillingError, BillingResult};
pub use purchase::{AddonOutcome, CreditPackOutcome, PackOutcome, PlanOutcome, PurchaseEngine};
pub use sweep::{Reconciler, SweepReport};
