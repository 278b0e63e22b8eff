//! Generation finalizer.
//!
//! Runs strictly after the debit transaction has committed: stages the
//! output in object storage, flips the creation record to its terminal
//! status, merges `last_result` onto the user document, and notifies
//! the user. A failure here marks the creation failed and is surfaced
//! through `last_result`; credits are never refunded.

use std::collections::HashMap;

use chrono::Utc;
use nova_delivery::{EmailTemplate, OutboundEmail, PushMessage};
use nova_firestore::ledger_repo::parse_ledger;
use nova_firestore::{FromFirestoreValue, USERS_COLLECTION};
use nova_models::{CreationStatus, LastResult};
use tracing::{error, info, warn};

use crate::metrics::record_finalize;
use crate::state::AppState;

/// Hand a charged creation to the background finalizer.
pub fn spawn_finalizer(state: AppState, uid: String, creation_id: String) {
    tokio::spawn(async move {
        run(state, uid, creation_id).await;
    });
}

/// Drive one creation to done or failed.
pub async fn run(state: AppState, uid: String, creation_id: String) {
    match complete_creation(&state, &uid, &creation_id).await {
        Ok(video_url) => {
            record_finalize("done");
            notify(&state, &uid, &creation_id, video_url.as_deref()).await;
        }
        Err(e) => {
            warn!(uid = %uid, creation_id = %creation_id, "finalization failed: {}", e);
            record_finalize("failed");
            mark_failed(&state, &uid, &creation_id, &e).await;
        }
    }
}

/// Produce the output and commit the terminal record state.
///
/// The generation backend is stubbed with a fixed placeholder clip and
/// a configurable delay. Without object storage the creation still
/// completes, just without a URL.
async fn complete_creation(
    state: &AppState,
    uid: &str,
    creation_id: &str,
) -> Result<Option<String>, String> {
    state
        .creations
        .set_status(uid, creation_id, CreationStatus::Processing, Utc::now())
        .await
        .map_err(|e| format!("status update failed: {}", e))?;

    tokio::time::sleep(state.config.finalize_delay).await;

    let video_url = match &state.storage {
        Some(storage) => {
            let bytes = tokio::fs::read(&state.config.placeholder_video_path)
                .await
                .map_err(|e| {
                    format!(
                        "placeholder {} unreadable: {}",
                        state.config.placeholder_video_path, e
                    )
                })?;
            let key = format!("users/{}/creations/{}.mp4", uid, creation_id);
            storage
                .upload_bytes(&key, bytes, "video/mp4")
                .await
                .map_err(|e| format!("upload failed: {}", e))?;
            Some(storage.public_url(&key))
        }
        None => None,
    };

    let now = Utc::now();
    match &video_url {
        Some(url) => {
            state
                .creations
                .finalize_done(uid, creation_id, url, now)
                .await
        }
        None => {
            state
                .creations
                .set_status(uid, creation_id, CreationStatus::Done, now)
                .await
        }
    }
    .map_err(|e| format!("finalize write failed: {}", e))?;

    let last = LastResult {
        creation_id: creation_id.to_string(),
        status: CreationStatus::Done,
        url: video_url.clone(),
        error: None,
        seen_by_user: false,
        updated_at: now,
    };
    state
        .ledger
        .merge_last_result(uid, &last, now)
        .await
        .map_err(|e| format!("last result merge failed: {}", e))?;

    info!(uid = %uid, creation_id = %creation_id, "creation finalized");
    Ok(video_url)
}

async fn mark_failed(state: &AppState, uid: &str, creation_id: &str, reason: &str) {
    let now = Utc::now();
    if let Err(e) = state
        .creations
        .finalize_failed(uid, creation_id, reason, now)
        .await
    {
        error!(uid = %uid, creation_id = %creation_id, "failed to mark creation failed: {}", e);
    }

    let last = LastResult {
        creation_id: creation_id.to_string(),
        status: CreationStatus::Failed,
        url: None,
        error: Some(reason.to_string()),
        seen_by_user: false,
        updated_at: now,
    };
    if let Err(e) = state.ledger.merge_last_result(uid, &last, now).await {
        error!(uid = %uid, creation_id = %creation_id, "failed to merge failed result: {}", e);
    }
}

/// Best-effort completion notification.
///
/// The push token and email address are client-written fields on the
/// user document, read raw because they live outside the billing
/// record. Delivery failures are logged and swallowed.
async fn notify(state: &AppState, uid: &str, creation_id: &str, video_url: Option<&str>) {
    let snap = match state.store.get(USERS_COLLECTION, uid).await {
        Ok(Some(snap)) => snap,
        Ok(None) => return,
        Err(e) => {
            warn!(uid = %uid, "could not read user for notification: {}", e);
            return;
        }
    };

    if !parse_ledger(&snap.fields).notify_generation_done {
        return;
    }

    let token = snap
        .field("fcmToken")
        .and_then(String::from_firestore_value)
        .filter(|t| !t.is_empty());
    if let (Some(sender), Some(token)) = (&state.push, token) {
        let mut data = HashMap::new();
        data.insert("creationId".to_string(), creation_id.to_string());
        let message = PushMessage {
            device_token: token,
            title: "Your video is ready".to_string(),
            body: "Tap to watch your new creation.".to_string(),
            data,
        };
        if let Err(e) = sender.send(&message).await {
            warn!(uid = %uid, "push notification failed: {}", e);
        }
    }

    let address = snap
        .field("email")
        .and_then(String::from_firestore_value)
        .filter(|a| !a.is_empty());
    if let (Some(sender), Some(address)) = (&state.email, address) {
        let html = EmailTemplate {
            title: "Your video is ready".to_string(),
            message: "Your GeNova creation has finished rendering.".to_string(),
            button_text: "Watch now".to_string(),
            button_url: video_url.unwrap_or_default().to_string(),
        }
        .render();
        let email = OutboundEmail {
            to: address,
            subject: "Your video is ready".to_string(),
            html,
        };
        if let Err(e) = sender.send(&email).await {
            warn!(uid = %uid, "completion email failed: {}", e);
        }
    }
}
