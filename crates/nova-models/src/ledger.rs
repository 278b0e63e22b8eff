//! Per-user billing ledger record and its derived views.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::catalog::TRIAL_CREDITS;
use crate::clock;
use crate::creation::CreationStatus;
use crate::entitlements::{EntitlementKind, Entitlements};
use crate::plan::PlanTier;

/// Most recent asynchronous generation outcome, surfaced to the client.
///
/// Not part of the billing invariants; written with a plain merge after
/// finalization and marked seen by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LastResult {
    pub creation_id: String,
    pub status: CreationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub seen_by_user: bool,
    pub updated_at: DateTime<Utc>,
}

/// One user's billing ledger.
///
/// The stored document is the single shared mutable resource of the
/// billing core; every balance or entitlement mutation goes through a
/// store transaction. Plan and entitlement activity are always derived
/// against the wall clock at read time, so an expired instant is
/// inactive even before any sweep clears it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UserLedger {
    pub credits: i64,
    pub plan: PlanTier,
    pub plan_until: Option<DateTime<Utc>>,
    /// Display-only label of the last purchased period, e.g. "30d".
    pub plan_period: Option<String>,
    pub trial_credits_granted: bool,
    #[serde(default)]
    pub entitlements: Entitlements,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<LastResult>,
    /// Opt-out flag for generation-complete push notifications. Owned by
    /// the client app, never touched by billing writes.
    #[serde(default = "default_notify")]
    pub notify_generation_done: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_notify() -> bool {
    true
}

impl UserLedger {
    /// Minimal record shape for lazy creation.
    ///
    /// `credits` starts at zero; the trial grant is the debit engine's
    /// decision, not part of the record shape.
    pub fn new_minimal(now: DateTime<Utc>) -> Self {
        Self {
            credits: 0,
            plan: PlanTier::Free,
            plan_until: None,
            plan_period: None,
            trial_credits_granted: false,
            entitlements: Entitlements::default(),
            last_result: None,
            notify_generation_done: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Single lazy-creation policy for every call site that may run
    /// against an absent record.
    ///
    /// Returns the working copy and whether this call applied the
    /// one-shot trial grant. Only the debit path passes `grant_trial`;
    /// top-ups and pack purchases must not burn trial eligibility. An
    /// existing record that predates the latch gets the grant backfilled
    /// the same way.
    pub fn ensure_record(
        existing: Option<&UserLedger>,
        grant_trial: bool,
        now: DateTime<Utc>,
    ) -> (UserLedger, bool) {
        let mut ledger = existing
            .cloned()
            .unwrap_or_else(|| UserLedger::new_minimal(now));
        if grant_trial && !ledger.trial_credits_granted {
            ledger.credits += TRIAL_CREDITS;
            ledger.trial_credits_granted = true;
            (ledger, true)
        } else {
            (ledger, false)
        }
    }

    /// The plan currently in force.
    ///
    /// A paid plan with an absent or passed `plan_until` is logically
    /// free regardless of the stored tier.
    pub fn effective_plan(&self, now: DateTime<Utc>) -> PlanTier {
        if self.plan == PlanTier::Free {
            return PlanTier::Free;
        }
        if clock::is_active(self.plan_until, now) {
            self.plan
        } else {
            PlanTier::Free
        }
    }

    /// Whether a discrete entitlement is active right now.
    pub fn entitlement_active(&self, kind: EntitlementKind, now: DateTime<Utc>) -> bool {
        self.entitlements.is_active(kind, now)
    }

    /// Whether generated output must carry a watermark.
    ///
    /// Derived, never stored: pro and studio subscribers and holders of
    /// an active no-watermark grant render clean output.
    pub fn watermark_required(&self, now: DateTime<Utc>) -> bool {
        let plan = self.effective_plan(now);
        if plan == PlanTier::Pro || plan == PlanTier::Studio {
            return false;
        }
        !self.entitlement_active(EntitlementKind::NoWatermark, now)
    }

    /// Whether the prompt builder is usable: studio plan in force and the
    /// shadow expiry still ahead.
    pub fn prompt_builder_active(&self, now: DateTime<Utc>) -> bool {
        self.effective_plan(now) == PlanTier::Studio
            && clock::is_active(self.entitlements.prompt_builder_until, now)
    }

    /// Whether a pack is usable: owned outright or included with the
    /// current effective plan.
    pub fn pack_usable(&self, pack_id: &str, included_from: PlanTier, now: DateTime<Utc>) -> bool {
        self.entitlements.owns_pack(pack_id) || self.effective_plan(now) >= included_from
    }
}

/// Snapshot of entitlement activity returned alongside debit results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EntitlementSnapshot {
    pub no_watermark: bool,
    pub ad_free: bool,
    pub templates: bool,
    pub pro_prompt: bool,
    pub prompt_builder: bool,
}

impl EntitlementSnapshot {
    /// Evaluate every grant against the clock.
    pub fn of(ledger: &UserLedger, now: DateTime<Utc>) -> Self {
        Self {
            no_watermark: ledger.entitlement_active(EntitlementKind::NoWatermark, now),
            ad_free: ledger.entitlement_active(EntitlementKind::AdFree, now),
            templates: ledger.entitlement_active(EntitlementKind::Templates, now),
            pro_prompt: ledger.entitlement_active(EntitlementKind::ProPrompt, now),
            prompt_builder: ledger.prompt_builder_active(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ledger_at(now: DateTime<Utc>) -> UserLedger {
        UserLedger::new_minimal(now)
    }

    #[test]
    fn test_minimal_record_shape() {
        let now = Utc::now();
        let ledger = ledger_at(now);
        assert_eq!(ledger.credits, 0);
        assert_eq!(ledger.plan, PlanTier::Free);
        assert!(!ledger.trial_credits_granted);
        assert!(ledger.plan_until.is_none());
        assert!(ledger.notify_generation_done);
    }

    #[test]
    fn test_ensure_record_trial_policy() {
        let now = Utc::now();

        // Absent record, no trial wanted: bare minimal ledger.
        let (ledger, granted) = UserLedger::ensure_record(None, false, now);
        assert_eq!(ledger.credits, 0);
        assert!(!ledger.trial_credits_granted);
        assert!(!granted);

        // Absent record, trial wanted: granted and latched.
        let (ledger, granted) = UserLedger::ensure_record(None, true, now);
        assert_eq!(ledger.credits, TRIAL_CREDITS);
        assert!(ledger.trial_credits_granted);
        assert!(granted);

        // Existing record without the latch: backfilled on top.
        let mut legacy = ledger_at(now);
        legacy.credits = 2;
        let (ledger, granted) = UserLedger::ensure_record(Some(&legacy), true, now);
        assert_eq!(ledger.credits, 2 + TRIAL_CREDITS);
        assert!(granted);

        // Latched record: never granted twice.
        let (ledger2, granted) = UserLedger::ensure_record(Some(&ledger), true, now);
        assert_eq!(ledger2.credits, ledger.credits);
        assert!(!granted);
    }

    #[test]
    fn test_effective_plan_requires_active_until() {
        let now = Utc::now();
        let mut ledger = ledger_at(now);
        ledger.plan = PlanTier::Pro;

        // No expiry stored: logically free.
        assert_eq!(ledger.effective_plan(now), PlanTier::Free);

        ledger.plan_until = Some(now + Duration::days(10));
        assert_eq!(ledger.effective_plan(now), PlanTier::Pro);

        ledger.plan_until = Some(now - Duration::seconds(1));
        assert_eq!(ledger.effective_plan(now), PlanTier::Free);
    }

    #[test]
    fn test_watermark_from_plan() {
        let now = Utc::now();
        let mut ledger = ledger_at(now);
        assert!(ledger.watermark_required(now));

        ledger.plan = PlanTier::Pro;
        ledger.plan_until = Some(now + Duration::days(30));
        assert!(!ledger.watermark_required(now));

        // Plan lapses: watermark returns without any sweep.
        ledger.plan_until = Some(now - Duration::days(1));
        assert!(ledger.watermark_required(now));
    }

    #[test]
    fn test_watermark_from_addon() {
        let now = Utc::now();
        let mut ledger = ledger_at(now);
        ledger
            .entitlements
            .set_until(EntitlementKind::NoWatermark, Some(now + Duration::days(7)));
        assert!(!ledger.watermark_required(now));
    }

    #[test]
    fn test_basic_plan_still_watermarks() {
        let now = Utc::now();
        let mut ledger = ledger_at(now);
        ledger.plan = PlanTier::Basic;
        ledger.plan_until = Some(now + Duration::days(30));
        assert!(ledger.watermark_required(now));
    }

    #[test]
    fn test_prompt_builder_needs_studio_and_active_instant() {
        let now = Utc::now();
        let mut ledger = ledger_at(now);
        ledger.entitlements.prompt_builder_until = Some(now + Duration::days(30));

        // Instant set but plan is not studio.
        assert!(!ledger.prompt_builder_active(now));

        ledger.plan = PlanTier::Studio;
        ledger.plan_until = Some(now + Duration::days(30));
        assert!(ledger.prompt_builder_active(now));

        // Studio lapsed: prompt builder off even with instant still ahead.
        ledger.plan_until = Some(now - Duration::days(1));
        assert!(!ledger.prompt_builder_active(now));
    }

    #[test]
    fn test_pack_usable_via_plan_or_ownership() {
        let now = Utc::now();
        let mut ledger = ledger_at(now);

        assert!(!ledger.pack_usable("cinematic_pack", PlanTier::Pro, now));

        ledger.entitlements.grant_pack("cinematic_pack");
        assert!(ledger.pack_usable("cinematic_pack", PlanTier::Pro, now));

        let mut subscriber = ledger_at(now);
        subscriber.plan = PlanTier::Studio;
        subscriber.plan_until = Some(now + Duration::days(30));
        assert!(subscriber.pack_usable("cinematic_pack", PlanTier::Pro, now));
    }

    #[test]
    fn test_entitlement_snapshot() {
        let now = Utc::now();
        let mut ledger = ledger_at(now);
        ledger
            .entitlements
            .set_until(EntitlementKind::AdFree, Some(now + Duration::days(3)));
        ledger
            .entitlements
            .set_until(EntitlementKind::Templates, Some(now - Duration::days(3)));

        let snap = EntitlementSnapshot::of(&ledger, now);
        assert!(snap.ad_free);
        assert!(!snap.templates);
        assert!(!snap.no_watermark);
        assert!(!snap.prompt_builder);
    }
}
