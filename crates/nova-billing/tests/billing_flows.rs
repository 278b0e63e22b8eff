//! End-to-end billing flows against the in-memory store.
//!
//! These exercise the engines the way the request layer drives them:
//! debit, purchase, top-up, and sweep interleaved on one user record,
//! including concurrent callers racing the optimistic transaction loop.

use std::sync::Arc;

use chrono::{Duration, Utc};
use nova_billing::{BillingError, DebitEngine, PurchaseEngine, Reconciler};
use nova_firestore::{InMemoryStore, LedgerDecision, LedgerRepository, TxnOptions};
use nova_models::{
    catalog::TRIAL_CREDITS, Catalog, EntitlementKind, GenerationParams, PlanTier, ResolutionTier,
    UserLedger,
};

struct Stack {
    debit: DebitEngine,
    purchase: PurchaseEngine,
    sweeper: Reconciler,
    ledger: LedgerRepository,
}

fn stack() -> Stack {
    // Tight retry pacing so contention tests converge quickly.
    let store = Arc::new(InMemoryStore::new());
    let ledger = LedgerRepository::with_options(
        store,
        TxnOptions {
            max_attempts: 50,
            base_delay_ms: 1,
        },
    );
    Stack {
        debit: DebitEngine::new(ledger.clone()),
        purchase: PurchaseEngine::new(ledger.clone(), Arc::new(Catalog::default())),
        sweeper: Reconciler::new(ledger.clone()),
        ledger,
    }
}

fn cheap_params() -> GenerationParams {
    GenerationParams {
        prompt: "city timelapse".to_string(),
        model: "kling".to_string(),
        duration_secs: 5,
        frame_rate: 30,
        resolution: ResolutionTier::Hd720,
        file_name: None,
        client_creation_id: None,
    }
}

async fn seed(stack: &Stack, uid: &str, build: impl Fn(&mut UserLedger)) {
    let now = Utc::now();
    let _: Result<(), nova_firestore::TxnError<String>> = stack
        .ledger
        .transact_ledger(uid, now, |_| {
            let mut ledger = UserLedger::new_minimal(now);
            ledger.trial_credits_granted = true;
            build(&mut ledger);
            LedgerDecision::Commit { ledger, value: () }
        })
        .await;
}

#[tokio::test]
async fn test_first_generation_grants_trial_and_charges_one() {
    let stack = stack();
    let now = Utc::now();

    let outcome = stack
        .debit
        .debit_for_generation("newcomer", &cheap_params(), now)
        .await
        .unwrap();

    assert!(outcome.trial_granted);
    assert_eq!(outcome.cost, 1);
    assert_eq!(outcome.new_balance, TRIAL_CREDITS - 1);

    let stored = stack.ledger.get("newcomer").await.unwrap().unwrap();
    assert_eq!(stored.credits, TRIAL_CREDITS - 1);
    assert!(stored.trial_credits_granted);
}

#[tokio::test]
async fn test_insufficient_balance_rejected_without_mutation() {
    let stack = stack();
    let now = Utc::now();
    seed(&stack, "u1", |l| {
        l.credits = 3;
        l.plan = PlanTier::Pro;
        l.plan_until = Some(now + Duration::days(30));
    })
    .await;

    // Within pro limits but costs 17, far past the 3 on hand.
    let mut params = cheap_params();
    params.duration_secs = 15;
    params.frame_rate = 60;
    params.resolution = ResolutionTier::Uhd4k;
    params.model = "runway".to_string();

    let err = stack
        .debit
        .debit_for_generation("u1", &params, now)
        .await
        .unwrap_err();
    assert!(matches!(err, BillingError::InsufficientCredits { balance: 3, .. }));

    let stored = stack.ledger.get("u1").await.unwrap().unwrap();
    assert_eq!(stored.credits, 3);
}

#[tokio::test]
async fn test_free_plan_resolution_cap_blocks_before_spend() {
    let stack = stack();
    let now = Utc::now();
    seed(&stack, "u1", |l| l.credits = 100).await;

    let mut params = cheap_params();
    params.resolution = ResolutionTier::Uhd4k;

    let err = stack
        .debit
        .debit_for_generation("u1", &params, now)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BillingError::PlanLimitExceeded { plan: PlanTier::Free, .. }
    ));

    // Balance untouched even though it could have covered the cost.
    let stored = stack.ledger.get("u1").await.unwrap().unwrap();
    assert_eq!(stored.credits, 100);
}

#[tokio::test]
async fn test_addon_extends_from_future_expiry() {
    let stack = stack();
    let now = Utc::now();
    let existing = now + Duration::days(10);
    seed(&stack, "u1", |l| {
        l.credits = 100;
        l.entitlements
            .set_until(EntitlementKind::NoWatermark, Some(existing));
    })
    .await;

    let outcome = stack
        .purchase
        .buy_discrete_addon("u1", "no_watermark_30d", now)
        .await
        .unwrap();

    // Stacks onto the live grant: 10 remaining + 30 bought.
    assert_eq!((outcome.new_expiry - now).num_days(), 40);
    assert_eq!(outcome.new_balance, 60);
}

#[tokio::test]
async fn test_full_account_lifecycle() {
    let stack = stack();
    let now = Utc::now();

    // Day one: trial covers the first clip.
    let debit = stack
        .debit
        .debit_for_generation("u1", &cheap_params(), now)
        .await
        .unwrap();
    assert_eq!(debit.new_balance, 4);

    // Top up, then subscribe.
    let topup = stack
        .purchase
        .buy_credit_pack("u1", "credits_120", now)
        .await
        .unwrap();
    assert_eq!(topup.new_balance, 124);

    let plan = stack.purchase.buy_plan("u1", "basic", 30, now).await.unwrap();
    assert_eq!(plan.new_balance, 24);

    // Basic unlocks 10s 1080p: 2 units * 1.5 resolution = 3 credits.
    let mut params = cheap_params();
    params.duration_secs = 10;
    params.resolution = ResolutionTier::Hd1080;

    let debit = stack
        .debit
        .debit_for_generation("u1", &params, now)
        .await
        .unwrap();
    assert_eq!(debit.plan, PlanTier::Basic);
    assert_eq!(debit.cost, 3);
    assert_eq!(debit.new_balance, 21);
    assert!(!debit.trial_granted);
}

#[tokio::test]
async fn test_expired_grant_inactive_before_any_sweep() {
    let stack = stack();
    let now = Utc::now();
    seed(&stack, "u1", |l| {
        l.credits = 50;
        l.plan = PlanTier::Studio;
        l.plan_until = Some(now - Duration::hours(1));
        l.entitlements
            .set_until(EntitlementKind::AdFree, Some(now - Duration::hours(1)));
    })
    .await;

    // No sweep has run; the debit still sees everything as lapsed.
    let outcome = stack
        .debit
        .debit_for_generation("u1", &cheap_params(), now)
        .await
        .unwrap();
    assert_eq!(outcome.plan, PlanTier::Free);
    assert!(!outcome.entitlements.ad_free);
    assert!(outcome.watermark_required);

    // The sweep then makes storage agree with what readers already saw.
    let report = stack.sweeper.reconcile("u1", now).await.unwrap();
    assert!(report.plan_downgraded);
    let stored = stack.ledger.get("u1").await.unwrap().unwrap();
    assert_eq!(stored.plan, PlanTier::Free);
    assert!(stored.entitlements.ad_free_until.is_none());
}

#[tokio::test]
async fn test_sweep_then_purchase_restores_plan() {
    let stack = stack();
    let now = Utc::now();
    seed(&stack, "u1", |l| {
        l.credits = 600;
        l.plan = PlanTier::Studio;
        l.plan_until = Some(now - Duration::days(1));
    })
    .await;

    stack.sweeper.reconcile("u1", now).await.unwrap();
    let outcome = stack.purchase.buy_plan("u1", "studio", 30, now).await.unwrap();

    let stored = stack.ledger.get("u1").await.unwrap().unwrap();
    assert_eq!(stored.plan, PlanTier::Studio);
    assert_eq!(stored.plan_until, Some(outcome.plan_until));
    assert_eq!(
        stored.entitlements.prompt_builder_until,
        Some(outcome.plan_until)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_debits_grant_trial_exactly_once() {
    let stack = Arc::new(stack());
    let now = Utc::now();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let stack = stack.clone();
        handles.push(tokio::spawn(async move {
            stack
                .debit
                .debit_for_generation("newcomer", &cheap_params(), now)
                .await
        }));
    }

    let mut successes = 0;
    let mut trial_grants = 0;
    let mut rejections = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(outcome) => {
                successes += 1;
                if outcome.trial_granted {
                    trial_grants += 1;
                }
            }
            Err(BillingError::InsufficientCredits { .. }) => rejections += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    // Trial covers exactly five one-credit clips; the grant itself lands
    // exactly once no matter how the eight calls interleave.
    assert_eq!(successes, TRIAL_CREDITS as usize);
    assert_eq!(rejections, 8 - TRIAL_CREDITS as usize);
    assert_eq!(trial_grants, 1);

    let stored = stack.ledger.get("newcomer").await.unwrap().unwrap();
    assert_eq!(stored.credits, 0);
    assert!(stored.trial_credits_granted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_purchases_never_overdraw() {
    let stack = Arc::new(stack());
    let now = Utc::now();
    seed(&stack, "u1", |l| l.credits = 35).await;

    // Four racing 15-credit buys against 35 credits: two fit.
    let mut handles = Vec::new();
    for _ in 0..4 {
        let stack = stack.clone();
        handles.push(tokio::spawn(async move {
            stack
                .purchase
                .buy_discrete_addon("u1", "no_watermark_7d", now)
                .await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(BillingError::InsufficientCredits { .. }) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    assert_eq!(successes, 2);

    let stored = stack.ledger.get("u1").await.unwrap().unwrap();
    assert_eq!(stored.credits, 5);
    assert!(stored.credits >= 0);
    let until = stored
        .entitlements
        .until(EntitlementKind::NoWatermark)
        .unwrap();
    assert_eq!((until - now).num_days(), 14);
}
