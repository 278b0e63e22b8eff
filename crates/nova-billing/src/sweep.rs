//! Expiry reconciliation sweep.
//!
//! One transaction per user: null every stored instant that the
//! transaction's own read shows at or past `now`, downgrade a lapsed
//! plan to free, and re-derive `promptBuilderUntil` from the plan. A
//! field is only nulled when this read shows it expired, so a racing
//! purchase that just extended it either commits first (and the sweep's
//! conflict retry re-reads the new expiry) or commits after (and keeps
//! its own later value).
//!
//! Callers run this fire-and-forget: a failed sweep is logged, never
//! surfaced, and the next request sweeps again.

use chrono::{DateTime, Utc};
use nova_firestore::{LedgerDecision, LedgerRepository};
use nova_models::{clock, EntitlementKind, PlanTier};
use tracing::{debug, info};

use crate::error::{BillingError, BillingResult};

/// What a sweep changed. Field names are the stored document fields.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub plan_downgraded: bool,
    pub changed_fields: Vec<&'static str>,
}

impl SweepReport {
    pub fn is_noop(&self) -> bool {
        !self.plan_downgraded && self.changed_fields.is_empty()
    }
}

fn stored_field(kind: EntitlementKind) -> &'static str {
    match kind {
        EntitlementKind::NoWatermark => "noWatermarkUntil",
        EntitlementKind::AdFree => "adFreeUntil",
        EntitlementKind::Templates => "templatesUntil",
        EntitlementKind::ProPrompt => "proPromptUntil",
    }
}

/// Expiry sweep engine.
pub struct Reconciler {
    ledger: LedgerRepository,
}

impl Reconciler {
    pub fn new(ledger: LedgerRepository) -> Self {
        Self { ledger }
    }

    /// Sweep one user record. An absent record or a record with nothing
    /// expired performs no write at all.
    pub async fn reconcile(&self, uid: &str, now: DateTime<Utc>) -> BillingResult<SweepReport> {
        let report: Result<SweepReport, _> = self
            .ledger
            .transact_ledger(uid, now, |existing| {
                let Some(current) = existing else {
                    return LedgerDecision::ReadOnly(SweepReport::default());
                };
                let mut ledger = current.clone();
                let mut report = SweepReport::default();

                if let Some(until) = ledger.plan_until {
                    if until <= now {
                        ledger.plan = PlanTier::Free;
                        ledger.plan_until = None;
                        report.plan_downgraded = true;
                        report.changed_fields.push("planUntil");
                    }
                }

                for kind in EntitlementKind::ALL {
                    if let Some(until) = ledger.entitlements.until(kind) {
                        if until <= now {
                            ledger.entitlements.set_until(kind, None);
                            report.changed_fields.push(stored_field(kind));
                        }
                    }
                }

                // Re-derive the plan shadow each sweep, even when nothing
                // expired, so a drifted value converges.
                let shadow = if ledger.plan == PlanTier::Studio
                    && clock::is_active(ledger.plan_until, now)
                {
                    ledger.plan_until
                } else {
                    None
                };
                if ledger.entitlements.prompt_builder_until != shadow {
                    ledger.entitlements.prompt_builder_until = shadow;
                    report.changed_fields.push("promptBuilderUntil");
                }

                if report.is_noop() {
                    return LedgerDecision::ReadOnly(report);
                }
                LedgerDecision::Commit {
                    ledger,
                    value: report,
                }
            })
            .await
            .map_err(BillingError::from);

        let report = report?;
        if report.is_noop() {
            debug!(uid, "sweep found nothing expired");
        } else {
            info!(
                uid,
                plan_downgraded = report.plan_downgraded,
                changed = ?report.changed_fields,
                "swept expired grants"
            );
        }
        Ok(report)
    }
}
