//! Per-user creation records.
//!
//! Each accepted generation gets one document under
//! `users/{uid}/creations`, written once at charge time and patched as the
//! pipeline progresses. The newest records double as the dedup scan
//! window, so `createdAt` ordering is the only query this collection
//! needs.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nova_models::{CreationRecord, CreationStatus};

use crate::error::FirestoreResult;
use crate::ledger_repo::decode_instant;
use crate::store::{DocumentStore, Snapshot};
use crate::types::{ToFirestoreValue, Value};

/// Subcollection id under a user document.
pub const CREATIONS_COLLECTION: &str = "creations";

fn collection_path(uid: &str) -> String {
    format!("users/{}/{}", uid, CREATIONS_COLLECTION)
}

fn parent_path(uid: &str) -> String {
    format!("users/{}", uid)
}

// =============================================================================
// Field Codec
// =============================================================================

fn decode_str(value: &Value) -> Option<String> {
    match value {
        Value::StringValue(s) => Some(s.clone()),
        _ => None,
    }
}

fn decode_u32(value: &Value) -> Option<u32> {
    match value {
        Value::IntegerValue(s) => s.parse().ok(),
        Value::DoubleValue(f) => Some(*f as u32),
        _ => None,
    }
}

fn decode_i64(value: &Value) -> Option<i64> {
    match value {
        Value::IntegerValue(s) => s.parse().ok(),
        Value::DoubleValue(f) => Some(*f as i64),
        _ => None,
    }
}

fn parse_creation(snapshot: &Snapshot) -> CreationRecord {
    let fields = &snapshot.fields;
    let get_str = |key: &str| fields.get(key).and_then(decode_str);
    let get_u32 = |key: &str| fields.get(key).and_then(decode_u32);

    CreationRecord {
        id: snapshot.doc_id.clone(),
        client_creation_id: get_str("clientCreationId"),
        file_name: get_str("fileName"),
        model: get_str("model"),
        duration_secs: get_u32("durationSecs"),
        frame_rate: get_u32("frameRate"),
        resolution: get_str("resolution"),
        prompt: get_str("prompt"),
        status: get_str("status")
            .and_then(|s| CreationStatus::from_str(&s))
            .unwrap_or(CreationStatus::Pending),
        cost: fields.get("cost").and_then(decode_i64).unwrap_or(0),
        video_url: get_str("videoUrl"),
        error: get_str("error"),
        created_at: fields
            .get("createdAt")
            .and_then(decode_instant)
            .unwrap_or_else(Utc::now),
        updated_at: fields
            .get("updatedAt")
            .and_then(decode_instant)
            .unwrap_or_else(Utc::now),
    }
}

fn record_to_fields(record: &CreationRecord) -> HashMap<String, Value> {
    let mut fields = HashMap::new();

    let mut put_opt_str = |key: &str, value: &Option<String>| {
        if let Some(v) = value {
            fields.insert(key.to_string(), v.to_firestore_value());
        }
    };
    put_opt_str("clientCreationId", &record.client_creation_id);
    put_opt_str("fileName", &record.file_name);
    put_opt_str("model", &record.model);
    put_opt_str("resolution", &record.resolution);
    put_opt_str("prompt", &record.prompt);
    put_opt_str("videoUrl", &record.video_url);
    put_opt_str("error", &record.error);

    if let Some(d) = record.duration_secs {
        fields.insert("durationSecs".to_string(), d.to_firestore_value());
    }
    if let Some(f) = record.frame_rate {
        fields.insert("frameRate".to_string(), f.to_firestore_value());
    }

    fields.insert(
        "status".to_string(),
        record.status.as_str().to_firestore_value(),
    );
    fields.insert("cost".to_string(), record.cost.to_firestore_value());
    fields.insert(
        "createdAt".to_string(),
        record.created_at.to_firestore_value(),
    );
    fields.insert(
        "updatedAt".to_string(),
        record.updated_at.to_firestore_value(),
    );
    fields
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for per-user creation records.
#[derive(Clone)]
pub struct CreationsRepository {
    store: Arc<dyn DocumentStore>,
}

impl CreationsRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Persist a newly accepted creation.
    pub async fn create(&self, uid: &str, record: &CreationRecord) -> FirestoreResult<()> {
        self.store
            .create(&collection_path(uid), &record.id, record_to_fields(record))
            .await?;
        Ok(())
    }

    /// Fetch a single creation record.
    pub async fn get(
        &self,
        uid: &str,
        creation_id: &str,
    ) -> FirestoreResult<Option<CreationRecord>> {
        let snap = self.store.get(&collection_path(uid), creation_id).await?;
        Ok(snap.map(|s| parse_creation(&s)))
    }

    /// Most recent creations, newest first.
    pub async fn recent(&self, uid: &str, limit: i32) -> FirestoreResult<Vec<CreationRecord>> {
        let snaps = self
            .store
            .query_recent(&parent_path(uid), CREATIONS_COLLECTION, "createdAt", limit)
            .await?;
        Ok(snaps.iter().map(parse_creation).collect())
    }

    /// Move a creation to a new pipeline status.
    pub async fn set_status(
        &self,
        uid: &str,
        creation_id: &str,
        status: CreationStatus,
        now: DateTime<Utc>,
    ) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), status.as_str().to_firestore_value());
        fields.insert("updatedAt".to_string(), now.to_firestore_value());
        self.store
            .patch(
                &collection_path(uid),
                creation_id,
                fields,
                Some(vec!["status".to_string(), "updatedAt".to_string()]),
                None,
            )
            .await?;
        Ok(())
    }

    /// Finalize a creation with its output URL.
    pub async fn finalize_done(
        &self,
        uid: &str,
        creation_id: &str,
        video_url: &str,
        now: DateTime<Utc>,
    ) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert(
            "status".to_string(),
            CreationStatus::Done.as_str().to_firestore_value(),
        );
        fields.insert("videoUrl".to_string(), video_url.to_firestore_value());
        fields.insert("updatedAt".to_string(), now.to_firestore_value());
        self.store
            .patch(
                &collection_path(uid),
                creation_id,
                fields,
                Some(vec![
                    "status".to_string(),
                    "videoUrl".to_string(),
                    "updatedAt".to_string(),
                ]),
                None,
            )
            .await?;
        Ok(())
    }

    /// Finalize a creation as failed.
    pub async fn finalize_failed(
        &self,
        uid: &str,
        creation_id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> FirestoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert(
            "status".to_string(),
            CreationStatus::Failed.as_str().to_firestore_value(),
        );
        fields.insert("error".to_string(), error.to_firestore_value());
        fields.insert("updatedAt".to_string(), now.to_firestore_value());
        self.store
            .patch(
                &collection_path(uid),
                creation_id,
                fields,
                Some(vec![
                    "status".to_string(),
                    "error".to_string(),
                    "updatedAt".to_string(),
                ]),
                None,
            )
            .await?;
        Ok(())
    }
}
