//! Shared data models for the GeNova backend.
//!
//! This crate provides Serde-serializable types for:
//! - Plan tiers and generation limits
//! - Credit cost calculation
//! - The purchase catalog (add-ons, packs, plans)
//! - The per-user billing ledger and entitlement clock
//! - Creation records and retry deduplication keys

pub mod catalog;
pub mod clock;
pub mod cost;
pub mod creation;
pub mod entitlements;
pub mod generation;
pub mod ledger;
pub mod plan;

// Re-export common types
pub use catalog::{
    AddonSku, Catalog, CreditPackSku, PackSku, BUNDLED_ENTITLEMENT_DAYS, TRIAL_CREDITS,
};
pub use clock::StoredInstant;
pub use cost::{CostBreakdown, GenerationCostCalculator};
pub use creation::{CreationRecord, CreationStatus, DedupKey};
pub use entitlements::{EntitlementKind, Entitlements};
pub use generation::{GenerationParams, GenerationRequest};
pub use ledger::{EntitlementSnapshot, LastResult, UserLedger};
pub use plan::{
    enforce_limits, LimitCheck, LimitDimension, PlanLimits, PlanTier, ResolutionTier,
    HARD_MAX_DURATION_SECS, HARD_MAX_FRAME_RATE,
};
