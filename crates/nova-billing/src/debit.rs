//! Trial grant and generation debit engine.
//!
//! One ledger transaction covers the whole decision: lazily create the
//! record, apply the one-shot trial grant, check limits, compute cost, and
//! debit. A rejection at any step aborts the transaction, so a failed
//! request leaves no trace, not even the trial latch.

use chrono::{DateTime, Utc};
use nova_firestore::{LedgerDecision, LedgerRepository};
use nova_models::{
    enforce_limits, CostBreakdown, EntitlementSnapshot, GenerationCostCalculator,
    GenerationParams, PlanTier, UserLedger,
};
use tracing::info;

use crate::error::{limit_violation, BillingError, BillingResult};

/// What a successful debit returns to the caller.
#[derive(Debug, Clone)]
pub struct DebitOutcome {
    /// Plan in force when the debit committed.
    pub plan: PlanTier,
    /// Credits charged.
    pub cost: u32,
    pub breakdown: CostBreakdown,
    /// Derived per call, never stored: false only for pro/studio plans or
    /// an active no-watermark grant.
    pub watermark_required: bool,
    pub new_balance: i64,
    pub entitlements: EntitlementSnapshot,
    /// Whether this call applied the one-shot trial grant.
    pub trial_granted: bool,
}

/// Engine for `debitForGeneration`.
pub struct DebitEngine {
    ledger: LedgerRepository,
}

impl DebitEngine {
    pub fn new(ledger: LedgerRepository) -> Self {
        Self { ledger }
    }

    /// Charge a user for a generation request.
    ///
    /// A brand-new user is materialized with the trial balance and charged
    /// in the same transaction; an existing user who never received the
    /// trial gets it backfilled the same way. Limit checks run before any
    /// cost math, so an over-limit request never spends credits.
    pub async fn debit_for_generation(
        &self,
        uid: &str,
        params: &GenerationParams,
        now: DateTime<Utc>,
    ) -> BillingResult<DebitOutcome> {
        let outcome: Result<DebitOutcome, _> = self
            .ledger
            .transact_ledger(uid, now, |existing| {
                let (mut ledger, trial_granted) = UserLedger::ensure_record(existing, true, now);

                let plan = ledger.effective_plan(now);
                let check = enforce_limits(
                    plan,
                    params.duration_secs,
                    params.frame_rate,
                    params.resolution,
                );
                if let Some(violation) = limit_violation(check) {
                    return LedgerDecision::Abort(violation);
                }

                let breakdown = GenerationCostCalculator::new(
                    params.duration_secs,
                    params.frame_rate,
                    params.resolution,
                    params.model.clone(),
                )
                .calculate();
                let cost = breakdown.total;

                if ledger.credits < cost as i64 {
                    return LedgerDecision::Abort(BillingError::InsufficientCredits {
                        balance: ledger.credits,
                        required: cost as i64,
                    });
                }

                ledger.credits -= cost as i64;

                let outcome = DebitOutcome {
                    plan,
                    cost,
                    breakdown: breakdown.clone(),
                    watermark_required: ledger.watermark_required(now),
                    new_balance: ledger.credits,
                    entitlements: EntitlementSnapshot::of(&ledger, now),
                    trial_granted,
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
            cost = outcome.cost,
            new_balance = outcome.new_balance,
            trial_granted = outcome.trial_granted,
            plan = %outcome.plan,
            "debited generation"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nova_firestore::InMemoryStore;
    use nova_models::{catalog::TRIAL_CREDITS, ResolutionTier};
    use std::sync::Arc;

    fn engine_with_store() -> (DebitEngine, LedgerRepository) {
        let store = Arc::new(InMemoryStore::new());
        let repo = LedgerRepository::new(store);
        (DebitEngine::new(repo.clone()), repo)
    }

    fn cheap_params() -> GenerationParams {
        GenerationParams {
            prompt: "a quiet lake at dawn".to_string(),
            model: "kling".to_string(),
            duration_secs: 5,
            frame_rate: 30,
            resolution: ResolutionTier::Hd720,
            file_name: None,
            client_creation_id: None,
        }
    }

    #[tokio::test]
    async fn test_new_user_trial_grant_and_debit() {
        let (engine, repo) = engine_with_store();
        let now = Utc::now();

        let outcome = engine
            .debit_for_generation("u1", &cheap_params(), now)
            .await
            .unwrap();

        assert_eq!(outcome.cost, 1);
        assert_eq!(outcome.new_balance, TRIAL_CREDITS - 1);
        assert!(outcome.trial_granted);
        assert_eq!(outcome.plan, PlanTier::Free);
        assert!(outcome.watermark_required);

        let stored = repo.get("u1").await.unwrap().unwrap();
        assert_eq!(stored.credits, TRIAL_CREDITS - 1);
        assert!(stored.trial_credits_granted);
    }

    #[tokio::test]
    async fn test_trial_backfill_for_legacy_record() {
        let (engine, repo) = engine_with_store();
        let now = Utc::now();

        // A record that predates the trial latch: latch false, 2 credits.
        let _: Result<(), nova_firestore::TxnError<String>> = repo
            .transact_ledger("u1", now, |_| {
                let mut ledger = UserLedger::new_minimal(now);
                ledger.credits = 2;
                LedgerDecision::Commit { ledger, value: () }
            })
            .await;

        let outcome = engine
            .debit_for_generation("u1", &cheap_params(), now)
            .await
            .unwrap();
        assert!(outcome.trial_granted);
        assert_eq!(outcome.new_balance, 2 + TRIAL_CREDITS - 1);
    }

    #[tokio::test]
    async fn test_insufficient_credits_leaves_no_trace() {
        let (engine, repo) = engine_with_store();
        let now = Utc::now();

        let mut params = cheap_params();
        params.duration_secs = 20;
        params.frame_rate = 60;
        params.resolution = ResolutionTier::Uhd4k;
        params.model = "veo".to_string();

        // Seed a studio user so limits pass but balance is too small.
        let _: Result<(), nova_firestore::TxnError<String>> = repo
            .transact_ledger("u1", now, |_| {
                let mut ledger = UserLedger::new_minimal(now);
                ledger.credits = 3;
                ledger.trial_credits_granted = true;
                ledger.plan = PlanTier::Studio;
                ledger.plan_until = Some(now + chrono::Duration::days(30));
                LedgerDecision::Commit { ledger, value: () }
            })
            .await;

        let err = engine
            .debit_for_generation("u1", &params, now)
            .await
            .unwrap_err();
        match err {
            BillingError::InsufficientCredits { balance, required } => {
                assert_eq!(balance, 3);
                assert_eq!(required, 30); // 4 units * 1.5 * 2.5 * 2.0
            }
            other => panic!("expected InsufficientCredits, got {:?}", other),
        }

        let stored = repo.get("u1").await.unwrap().unwrap();
        assert_eq!(stored.credits, 3);
    }

    #[tokio::test]
    async fn test_limit_violation_never_creates_record() {
        let (engine, repo) = engine_with_store();
        let now = Utc::now();

        let mut params = cheap_params();
        params.resolution = ResolutionTier::Uhd4k;

        let err = engine
            .debit_for_generation("new-user", &params, now)
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::PlanLimitExceeded { .. }));

        // The aborted transaction must not have materialized the record,
        // so the trial stays available for a later valid request.
        assert!(repo.get("new-user").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_hard_cap_precedes_plan_limits() {
        let (engine, _) = engine_with_store();
        let now = Utc::now();

        let mut params = cheap_params();
        params.duration_secs = 25;

        let err = engine
            .debit_for_generation("u1", &params, now)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BillingError::HardCapExceeded { requested: 25, max: 20, .. }
        ));
    }

    #[tokio::test]
    async fn test_watermark_clear_for_active_pro_plan() {
        let (engine, repo) = engine_with_store();
        let now = Utc::now();

        let _: Result<(), nova_firestore::TxnError<String>> = repo
            .transact_ledger("u1", now, |_| {
                let mut ledger = UserLedger::new_minimal(now);
                ledger.credits = 10;
                ledger.trial_credits_granted = true;
                ledger.plan = PlanTier::Pro;
                ledger.plan_until = Some(now + chrono::Duration::days(10));
                LedgerDecision::Commit { ledger, value: () }
            })
            .await;

        let outcome = engine
            .debit_for_generation("u1", &cheap_params(), now)
            .await
            .unwrap();
        assert_eq!(outcome.plan, PlanTier::Pro);
        assert!(!outcome.watermark_required);
    }

    #[tokio::test]
    async fn test_expired_plan_debits_as_free() {
        let (engine, repo) = engine_with_store();
        let now = Utc::now();

        let _: Result<(), nova_firestore::TxnError<String>> = repo
            .transact_ledger("u1", now, |_| {
                let mut ledger = UserLedger::new_minimal(now);
                ledger.credits = 50;
                ledger.trial_credits_granted = true;
                ledger.plan = PlanTier::Pro;
                ledger.plan_until = Some(now - chrono::Duration::days(1));
                LedgerDecision::Commit { ledger, value: () }
            })
            .await;

        let mut params = cheap_params();
        params.duration_secs = 10; // over the free 5s cap, fine for pro

        let err = engine
            .debit_for_generation("u1", &params, now)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BillingError::PlanLimitExceeded { plan: PlanTier::Free, .. }
        ));
    }
}
