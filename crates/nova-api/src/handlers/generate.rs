//! Video generation handler.
//!
//! The billable part of a generation request is synchronous: dedup scan,
//! limit checks, cost, and debit all resolve before the response. The
//! generation itself runs in a spawned finalizer task that uploads the
//! output and merges the last result onto the user document.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use nova_models::{
    CostBreakdown, CreationRecord, CreationStatus, EntitlementSnapshot, GenerationParams,
    GenerationRequest, PlanTier, UserLedger,
};
use serde::Serialize;
use tracing::{debug, error};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::metrics::{record_generation, record_generation_rejected};
use crate::services::finalize::spawn_finalizer;
use crate::state::AppState;

/// Longest accepted prompt, in characters.
pub const MAX_PROMPT_CHARS: usize = 2000;

#[derive(Serialize)]
pub struct GenerateResponse {
    pub creation_id: String,
    pub status: CreationStatus,
    /// True when a recent identical request was matched and no new
    /// charge was made.
    pub duplicate: bool,
    pub plan: PlanTier,
    pub cost: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<CostBreakdown>,
    pub watermark_required: bool,
    pub new_balance: i64,
    pub entitlements: EntitlementSnapshot,
    pub trial_granted: bool,
}

/// Accept a generation request: dedup, debit, record, and hand off to
/// the finalizer.
pub async fn generate_video(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<GenerationRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let now = Utc::now();
    let params = GenerationParams::from_request(payload);

    if params.prompt.is_empty() {
        return Err(ApiError::validation("Prompt is required"));
    }
    if params.prompt.chars().count() > MAX_PROMPT_CHARS {
        return Err(ApiError::validation(format!(
            "Prompt exceeds {} characters",
            MAX_PROMPT_CHARS
        )));
    }

    // A retried request reattaches to its still-pending record instead
    // of being charged again.
    if let Some(existing_id) = state
        .dedup
        .find_recent_pending(&user.uid, &params.dedup_key(), now)
        .await?
    {
        debug!(uid = %user.uid, creation_id = %existing_id, "duplicate generation request");
        let status = state
            .creations
            .get(&user.uid, &existing_id)
            .await?
            .map(|r| r.status)
            .unwrap_or(CreationStatus::Pending);
        let ledger = state
            .ledger
            .get(&user.uid)
            .await?
            .unwrap_or_else(|| UserLedger::new_minimal(now));

        return Ok(Json(GenerateResponse {
            creation_id: existing_id,
            status,
            duplicate: true,
            plan: ledger.effective_plan(now),
            cost: 0,
            breakdown: None,
            watermark_required: ledger.watermark_required(now),
            new_balance: ledger.credits,
            entitlements: EntitlementSnapshot::of(&ledger, now),
            trial_granted: false,
        }));
    }

    let outcome = match state.debit.debit_for_generation(&user.uid, &params, now).await {
        Ok(outcome) => outcome,
        Err(e) => {
            let err = ApiError::from(e);
            if let Some(code) = err.code() {
                record_generation_rejected(code);
            }
            return Err(err);
        }
    };

    let creation_id = Uuid::new_v4().to_string();
    let record = CreationRecord::new_pending(&creation_id, outcome.cost as i64, now)
        .with_params(
            &params.model,
            params.duration_secs,
            params.frame_rate,
            params.resolution.as_str(),
        )
        .with_prompt(&params.prompt)
        .with_optional_client_id(params.client_creation_id.clone())
        .with_optional_file_name(params.file_name.clone());

    if let Err(e) = state.creations.create(&user.uid, &record).await {
        // The debit has already committed; credits are not refunded.
        // The client sees a store failure and may retry.
        error!(
            uid = %user.uid,
            creation_id = %creation_id,
            "failed to record creation after debit: {}", e
        );
        return Err(e.into());
    }

    record_generation(&params.model, params.resolution.as_str(), outcome.cost);
    spawn_finalizer(state.clone(), user.uid.clone(), creation_id.clone());

    Ok(Json(GenerateResponse {
        creation_id,
        status: CreationStatus::Pending,
        duplicate: false,
        plan: outcome.plan,
        cost: outcome.cost,
        breakdown: Some(outcome.breakdown),
        watermark_required: outcome.watermark_required,
        new_balance: outcome.new_balance,
        entitlements: outcome.entitlements,
        trial_granted: outcome.trial_granted,
    }))
}
