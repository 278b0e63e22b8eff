//! Store purchase handlers.
//!
//! Thin bindings over the purchase engine: each handler deserializes
//! one request shape, runs exactly one ledger transaction, and maps the
//! outcome back to JSON. All rejection logic lives in the engine.

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::metrics::record_purchase;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct BuyAddonRequest {
    pub addon_key: String,
}

#[derive(Serialize)]
pub struct BuyAddonResponse {
    pub new_expiry: DateTime<Utc>,
    pub new_balance: i64,
}

/// Buy a time-bounded add-on. Repeat purchases stack.
pub async fn buy_addon(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<BuyAddonRequest>,
) -> Result<Json<BuyAddonResponse>, ApiError> {
    let outcome = state
        .purchases
        .buy_discrete_addon(&user.uid, &payload.addon_key, Utc::now())
        .await?;

    record_purchase("addon", &payload.addon_key);
    Ok(Json(BuyAddonResponse {
        new_expiry: outcome.new_expiry,
        new_balance: outcome.new_balance,
    }))
}

#[derive(Deserialize)]
pub struct BuyPackRequest {
    pub pack_id: String,
}

#[derive(Serialize)]
pub struct BuyPackResponse {
    pub already_owned: bool,
    pub new_balance: i64,
}

/// Buy a permanent style pack. Owning it already, or being on a plan
/// that includes it, succeeds without a charge.
pub async fn buy_pack(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<BuyPackRequest>,
) -> Result<Json<BuyPackResponse>, ApiError> {
    let outcome = state
        .purchases
        .buy_permanent_pack(&user.uid, &payload.pack_id, Utc::now())
        .await?;

    if !outcome.already_owned {
        record_purchase("pack", &payload.pack_id);
    }
    Ok(Json(BuyPackResponse {
        already_owned: outcome.already_owned,
        new_balance: outcome.new_balance,
    }))
}

#[derive(Deserialize)]
pub struct BuyPlanRequest {
    pub plan_id: String,
    pub period_days: u32,
}

#[derive(Serialize)]
pub struct BuyPlanResponse {
    pub new_balance: i64,
    pub plan_until: DateTime<Utc>,
}

/// Buy a plan for a period. The plan window is a hard reset, never
/// stacked onto the previous one.
pub async fn buy_plan(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<BuyPlanRequest>,
) -> Result<Json<BuyPlanResponse>, ApiError> {
    let outcome = state
        .purchases
        .buy_plan(&user.uid, &payload.plan_id, payload.period_days, Utc::now())
        .await?;

    record_purchase("plan", &payload.plan_id);
    Ok(Json(BuyPlanResponse {
        new_balance: outcome.new_balance,
        plan_until: outcome.plan_until,
    }))
}

#[derive(Deserialize)]
pub struct BuyCreditsRequest {
    pub pack_id: String,
}

#[derive(Serialize)]
pub struct BuyCreditsResponse {
    pub new_balance: i64,
}

/// Add a credit pack to the balance.
pub async fn buy_credits(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<BuyCreditsRequest>,
) -> Result<Json<BuyCreditsResponse>, ApiError> {
    let outcome = state
        .purchases
        .buy_credit_pack(&user.uid, &payload.pack_id, Utc::now())
        .await?;

    record_purchase("credits", &payload.pack_id);
    Ok(Json(BuyCreditsResponse {
        new_balance: outcome.new_balance,
    }))
}
