//! Account view and reconciliation handlers.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use nova_models::{EntitlementKind, LastResult, PlanTier, UserLedger};
use serde::Serialize;
use tracing::info;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// One entitlement grant as the client sees it.
#[derive(Serialize)]
pub struct EntitlementView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
    pub active: bool,
}

/// Full account view.
///
/// `plan` is the stored tier; `effective_plan` is what is actually in
/// force against the clock. The two differ for a lapsed subscription
/// that no sweep has cleared yet.
#[derive(Serialize)]
pub struct AccountResponse {
    pub uid: String,
    pub credits: i64,
    pub plan: PlanTier,
    pub effective_plan: PlanTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_until: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_period: Option<String>,
    pub trial_credits_granted: bool,
    pub watermark_required: bool,
    pub prompt_builder_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_builder_until: Option<DateTime<Utc>>,
    pub entitlements: BTreeMap<&'static str, EntitlementView>,
    pub packs_owned: Vec<String>,
    pub notify_generation_done: bool,
}

impl AccountResponse {
    fn of(uid: &str, ledger: &UserLedger, now: DateTime<Utc>) -> Self {
        let mut entitlements = BTreeMap::new();
        for kind in EntitlementKind::ALL {
            entitlements.insert(
                kind.as_str(),
                EntitlementView {
                    until: ledger.entitlements.until(kind),
                    active: ledger.entitlement_active(kind, now),
                },
            );
        }

        Self {
            uid: uid.to_string(),
            credits: ledger.credits,
            plan: ledger.plan,
            effective_plan: ledger.effective_plan(now),
            plan_until: ledger.plan_until,
            plan_period: ledger.plan_period.clone(),
            trial_credits_granted: ledger.trial_credits_granted,
            watermark_required: ledger.watermark_required(now),
            prompt_builder_active: ledger.prompt_builder_active(now),
            prompt_builder_until: ledger.entitlements.prompt_builder_until,
            entitlements,
            packs_owned: ledger.entitlements.packs_owned.iter().cloned().collect(),
            notify_generation_done: ledger.notify_generation_done,
        }
    }
}

/// Get the caller's account state.
///
/// A user with no ledger yet gets the minimal free view without a
/// record being provisioned; the first debit or purchase creates it.
pub async fn get_account(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let now = Utc::now();
    let ledger = state
        .ledger
        .get(&user.uid)
        .await?
        .unwrap_or_else(|| UserLedger::new_minimal(now));

    Ok(Json(AccountResponse::of(&user.uid, &ledger, now)))
}

/// Clear expired plan and entitlement state for the caller.
///
/// Reads already treat expired grants as inactive, so this only tidies
/// the stored record. Always 204, even when there was nothing to do.
pub async fn reconcile_account(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<StatusCode, ApiError> {
    let report = state.reconciler.reconcile(&user.uid, Utc::now()).await?;
    if !report.is_noop() {
        info!(
            uid = %user.uid,
            plan_downgraded = report.plan_downgraded,
            changed = ?report.changed_fields,
            "reconcile cleared expired state"
        );
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Get the most recent generation outcome.
pub async fn get_last_result(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<LastResult>, ApiError> {
    let ledger = state.ledger.get(&user.uid).await?;
    match ledger.and_then(|l| l.last_result) {
        Some(last) => Ok(Json(last)),
        None => Err(ApiError::not_found("No generation result available")),
    }
}

/// Mark the most recent generation outcome as seen.
pub async fn mark_result_seen(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<StatusCode, ApiError> {
    let updated = state.ledger.mark_last_result_seen(&user.uid, Utc::now()).await?;
    if updated {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("No generation result available"))
    }
}
