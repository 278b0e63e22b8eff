//! Add-on, pack, plan, and credit-pack purchase engine.
//!
//! Catalog lookups happen before the transaction; anything unknown is
//! rejected without touching the store. Each purchase is then one ledger
//! transaction, so a debit can never commit without its grant.
//!
//! Creation policy differs per shape: plan and add-on purchases require an
//! existing record, a pack purchase treats an absent record as an empty
//! free ledger (it will fail on balance before ever creating anything),
//! and a credit-pack top-up lazily provisions without the trial grant,
//! which only the debit path may apply.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use nova_firestore::{LedgerDecision, LedgerRepository};
use nova_models::{
    catalog::BUNDLED_ENTITLEMENT_DAYS, Catalog, EntitlementKind, PlanTier, UserLedger,
};
use tracing::info;

use crate::error::{BillingError, BillingResult};

#[derive(Debug, Clone)]
pub struct AddonOutcome {
    pub new_expiry: DateTime<Utc>,
    pub new_balance: i64,
}

#[derive(Debug, Clone)]
pub struct PackOutcome {
    /// True when the pack was already owned or included with the plan;
    /// nothing was charged.
    pub already_owned: bool,
    pub new_balance: i64,
}

#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub new_balance: i64,
    pub plan_until: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreditPackOutcome {
    pub new_balance: i64,
}

/// Engine for the four purchase shapes.
pub struct PurchaseEngine {
    ledger: LedgerRepository,
    catalog: Arc<Catalog>,
}

impl PurchaseEngine {
    pub fn new(ledger: LedgerRepository, catalog: Arc<Catalog>) -> Self {
        Self { ledger, catalog }
    }

    /// Buy a time-bounded add-on. Repeat purchases stack: the new expiry
    /// extends from the current one when it is still in the future.
    pub async fn buy_discrete_addon(
        &self,
        uid: &str,
        addon_key: &str,
        now: DateTime<Utc>,
    ) -> BillingResult<AddonOutcome> {
        let sku = self
            .catalog
            .addon(addon_key)
            .cloned()
            .ok_or_else(|| BillingError::UnknownAddon {
                key: addon_key.to_string(),
            })?;

        let outcome: Result<AddonOutcome, _> = self
            .ledger
            .transact_ledger(uid, now, |existing| {
                let Some(current) = existing else {
                    return LedgerDecision::Abort(BillingError::UserNotFound {
                        uid: uid.to_string(),
                    });
                };
                let mut ledger = current.clone();

                if ledger.credits < sku.cost {
                    return LedgerDecision::Abort(BillingError::InsufficientCredits {
                        balance: ledger.credits,
                        required: sku.cost,
                    });
                }

                ledger.credits -= sku.cost;
                let new_expiry = ledger.entitlements.extend(sku.grants, sku.days, now);

                let outcome = AddonOutcome {
                    new_expiry,
                    new_balance: ledger.credits,
                };
                LedgerDecision::Commit {
                    ledger,
                    value: outcome,
                }
            })
            .await
            .map_err(BillingError::from);

        let outcome = outcome?;
        info!(
            uid,
            addon = addon_key,
            new_balance = outcome.new_balance,
            new_expiry = %outcome.new_expiry,
            "purchased addon"
        );
        Ok(outcome)
    }

    /// Buy a permanent style pack. Owning it already, or being on a plan
    /// that includes it, succeeds as a free no-op.
    pub async fn buy_permanent_pack(
        &self,
        uid: &str,
        pack_id: &str,
        now: DateTime<Utc>,
    ) -> BillingResult<PackOutcome> {
        let sku = self
            .catalog
            .pack(pack_id)
            .cloned()
            .ok_or_else(|| BillingError::UnknownPack {
                id: pack_id.to_string(),
            })?;

        let outcome: Result<PackOutcome, _> = self
            .ledger
            .transact_ledger(uid, now, |existing| {
                let (mut ledger, _) = UserLedger::ensure_record(existing, false, now);

                if ledger.pack_usable(sku.id, sku.included_from, now) {
                    return LedgerDecision::ReadOnly(PackOutcome {
                        already_owned: true,
                        new_balance: ledger.credits,
                    });
                }

                if ledger.credits < sku.cost {
                    return LedgerDecision::Abort(BillingError::InsufficientCredits {
                        balance: ledger.credits,
                        required: sku.cost,
                    });
                }

                ledger.credits -= sku.cost;
                ledger.entitlements.grant_pack(sku.id);

                let outcome = PackOutcome {
                    already_owned: false,
                    new_balance: ledger.credits,
                };
                LedgerDecision::Commit {
                    ledger,
                    value: outcome,
                }
            })
            .await
            .map_err(BillingError::from);

        let outcome = outcome?;
        info!(
            uid,
            pack = pack_id,
            already_owned = outcome.already_owned,
            new_balance = outcome.new_balance,
            "purchased pack"
        );
        Ok(outcome)
    }

    /// Buy a plan for a period.
    ///
    /// The plan window is a hard reset to `now + periodDays`, never
    /// stacked onto the previous window. Pro and studio also stack the
    /// four bundled grants by a fixed 30 days; studio additionally pins
    /// `promptBuilderUntil` to the new plan window, every other plan
    /// clears it in the same transaction.
    pub async fn buy_plan(
        &self,
        uid: &str,
        plan_id: &str,
        period_days: u32,
        now: DateTime<Utc>,
    ) -> BillingResult<PlanOutcome> {
        let tier = PlanTier::purchasable_from_str(plan_id).ok_or_else(|| {
            BillingError::UnknownPlan {
                plan_id: plan_id.to_string(),
            }
        })?;
        let price = self
            .catalog
            .plan_price(tier, period_days)
            .ok_or(BillingError::BadPeriod {
                plan: tier,
                period_days,
            })?;

        let outcome: Result<PlanOutcome, _> = self
            .ledger
            .transact_ledger(uid, now, |existing| {
                let Some(current) = existing else {
                    return LedgerDecision::Abort(BillingError::UserNotFound {
                        uid: uid.to_string(),
                    });
                };
                let mut ledger = current.clone();

                if ledger.credits < price {
                    return LedgerDecision::Abort(BillingError::InsufficientCredits {
                        balance: ledger.credits,
                        required: price,
                    });
                }

                let plan_until = now + Duration::days(period_days as i64);
                ledger.credits -= price;
                ledger.plan = tier;
                ledger.plan_until = Some(plan_until);
                ledger.plan_period = Some(format!("{}d", period_days));

                if tier.bundles_entitlements() {
                    for kind in EntitlementKind::ALL {
                        ledger
                            .entitlements
                            .extend(kind, BUNDLED_ENTITLEMENT_DAYS, now);
                    }
                }

                ledger.entitlements.prompt_builder_until = if tier == PlanTier::Studio {
                    Some(plan_until)
                } else {
                    None
                };

                let outcome = PlanOutcome {
                    new_balance: ledger.credits,
                    plan_until,
                };
                LedgerDecision::Commit {
                    ledger,
                    value: outcome,
                }
            })
            .await
            .map_err(BillingError::from);

        let outcome = outcome?;
        info!(
            uid,
            plan = plan_id,
            period_days,
            new_balance = outcome.new_balance,
            plan_until = %outcome.plan_until,
            "purchased plan"
        );
        Ok(outcome)
    }

    /// Add a credit pack to the balance. Pure top-up: no cost, lazily
    /// provisions an absent record, never grants the trial.
    pub async fn buy_credit_pack(
        &self,
        uid: &str,
        pack_id: &str,
        now: DateTime<Utc>,
    ) -> BillingResult<CreditPackOutcome> {
        let sku = self
            .catalog
            .credit_pack(pack_id)
            .cloned()
            .ok_or_else(|| BillingError::UnknownPack {
                id: pack_id.to_string(),
            })?;

        let outcome: Result<CreditPackOutcome, _> = self
            .ledger
            .transact_ledger(uid, now, |existing| {
                let (mut ledger, _) = UserLedger::ensure_record(existing, false, now);

                ledger.credits += sku.credits;

                let outcome = CreditPackOutcome {
                    new_balance: ledger.credits,
                };
                LedgerDecision::Commit {
                    ledger,
                    value: outcome,
                }
            })
            .await
            .map_err(BillingError::from);

        let outcome = outcome?;
        info!(
            uid,
            pack = pack_id,
            added = sku.credits,
            new_balance = outcome.new_balance,
            "added credit pack"
        );
        Ok(outcome)
    }
}
