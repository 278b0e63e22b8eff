//! In-memory document store.
//!
//! Implements [`DocumentStore`] over a process-local map with the same
//! revision semantics as Firestore: every write bumps an opaque revision
//! tag, conditional patches compare against it, and creates fail on an
//! existing id. Backs unit tests and `FIRESTORE_BACKEND=memory` for local
//! development; nothing survives a restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::DateTime;

use crate::error::{FirestoreError, FirestoreResult};
use crate::store::{DocumentStore, Snapshot};
use crate::types::Value;

#[derive(Clone)]
struct StoredDoc {
    fields: HashMap<String, Value>,
    revision: u64,
}

/// Process-local [`DocumentStore`].
#[derive(Default)]
pub struct InMemoryStore {
    docs: Mutex<HashMap<String, StoredDoc>>,
    next_revision: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn path(collection: &str, doc_id: &str) -> String {
        format!("{}/{}", collection, doc_id)
    }

    fn bump(&self) -> u64 {
        self.next_revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn snapshot(doc_id: &str, doc: &StoredDoc) -> Snapshot {
        Snapshot {
            doc_id: doc_id.to_string(),
            fields: doc.fields.clone(),
            update_time: Some(format!("rev-{}", doc.revision)),
        }
    }

    fn parse_revision(tag: &str) -> Option<u64> {
        tag.strip_prefix("rev-").and_then(|s| s.parse().ok())
    }

    /// Number of stored documents, for test assertions.
    pub fn len(&self) -> usize {
        self.docs.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, collection: &str, doc_id: &str) -> FirestoreResult<Option<Snapshot>> {
        // Yield so concurrent transactions actually interleave under test.
        tokio::task::yield_now().await;

        let path = Self::path(collection, doc_id);
        let docs = self
            .docs
            .lock()
            .map_err(|_| FirestoreError::request_failed("store lock poisoned"))?;
        Ok(docs.get(&path).map(|d| Self::snapshot(doc_id, d)))
    }

    async fn create(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> FirestoreResult<Snapshot> {
        tokio::task::yield_now().await;

        let path = Self::path(collection, doc_id);
        let revision = self.bump();
        let mut docs = self
            .docs
            .lock()
            .map_err(|_| FirestoreError::request_failed("store lock poisoned"))?;

        if docs.contains_key(&path) {
            return Err(FirestoreError::AlreadyExists(path));
        }

        let doc = StoredDoc { fields, revision };
        let snap = Self::snapshot(doc_id, &doc);
        docs.insert(path, doc);
        Ok(snap)
    }

    async fn patch(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        mask: Option<Vec<String>>,
        expected_update_time: Option<&str>,
    ) -> FirestoreResult<Snapshot> {
        tokio::task::yield_now().await;

        let path = Self::path(collection, doc_id);
        let revision = self.bump();
        let mut docs = self
            .docs
            .lock()
            .map_err(|_| FirestoreError::request_failed("store lock poisoned"))?;

        let doc = docs
            .get_mut(&path)
            .ok_or_else(|| FirestoreError::not_found(path.clone()))?;

        if let Some(expected) = expected_update_time {
            if Self::parse_revision(expected) != Some(doc.revision) {
                return Err(FirestoreError::PreconditionFailed(format!(
                    "{} expected {} but stored rev-{}",
                    path, expected, doc.revision
                )));
            }
        }

        match mask {
            Some(mask) => {
                // Firestore mask semantics: a masked field absent from the
                // body is deleted from the document.
                for field in mask {
                    match fields.get(&field) {
                        Some(value) => {
                            doc.fields.insert(field, value.clone());
                        }
                        None => {
                            doc.fields.remove(&field);
                        }
                    }
                }
            }
            None => {
                for (field, value) in fields {
                    doc.fields.insert(field, value);
                }
            }
        }

        doc.revision = revision;
        Ok(Self::snapshot(doc_id, doc))
    }

    async fn query_recent(
        &self,
        parent_path: &str,
        collection_id: &str,
        order_by_field: &str,
        limit: i32,
    ) -> FirestoreResult<Vec<Snapshot>> {
        tokio::task::yield_now().await;

        let prefix = if parent_path.is_empty() {
            format!("{}/", collection_id)
        } else {
            format!("{}/{}/", parent_path, collection_id)
        };

        let docs = self
            .docs
            .lock()
            .map_err(|_| FirestoreError::request_failed("store lock poisoned"))?;

        let mut matched: Vec<Snapshot> = docs
            .iter()
            .filter_map(|(path, doc)| {
                let rest = path.strip_prefix(&prefix)?;
                // Direct children only; no slash left in the id.
                if rest.contains('/') {
                    return None;
                }
                Some(Self::snapshot(rest, doc))
            })
            .collect();

        matched.sort_by(|a, b| {
            let ka = sort_key(a.field(order_by_field));
            let kb = sort_key(b.field(order_by_field));
            kb.partial_cmp(&ka).unwrap_or(std::cmp::Ordering::Equal)
        });
        matched.truncate(limit.max(0) as usize);
        Ok(matched)
    }
}

/// Millis since epoch for ordering, tolerating the value shapes timestamps
/// are stored in.
fn sort_key(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::TimestampValue(s)) | Some(Value::StringValue(s)) => {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.timestamp_millis() as f64)
                .unwrap_or(f64::MIN)
        }
        Some(Value::IntegerValue(s)) => s.parse().unwrap_or(f64::MIN),
        Some(Value::DoubleValue(f)) => *f,
        _ => f64::MIN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToFirestoreValue;
    use chrono::{Duration, Utc};

    fn fields_with(entries: &[(&str, Value)]) -> HashMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = InMemoryStore::new();
        store
            .create(
                "users",
                "u1",
                fields_with(&[("credits", 5i64.to_firestore_value())]),
            )
            .await
            .unwrap();

        let snap = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(
            snap.field("credits"),
            Some(&Value::IntegerValue("5".to_string()))
        );
        assert!(snap.update_time.is_some());
    }

    #[tokio::test]
    async fn test_create_duplicate_fails() {
        let store = InMemoryStore::new();
        store.create("users", "u1", HashMap::new()).await.unwrap();
        let err = store.create("users", "u1", HashMap::new()).await;
        assert!(matches!(err, Err(FirestoreError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_patch_with_stale_revision_fails() {
        let store = InMemoryStore::new();
        let first = store.create("users", "u1", HashMap::new()).await.unwrap();

        // A second write invalidates the first revision.
        store
            .patch(
                "users",
                "u1",
                fields_with(&[("credits", 1i64.to_firestore_value())]),
                None,
                first.update_time.as_deref(),
            )
            .await
            .unwrap();

        let err = store
            .patch(
                "users",
                "u1",
                fields_with(&[("credits", 2i64.to_firestore_value())]),
                None,
                first.update_time.as_deref(),
            )
            .await;
        assert!(matches!(err, Err(FirestoreError::PreconditionFailed(_))));
    }

    #[tokio::test]
    async fn test_patch_mask_limits_write_and_deletes_absent() {
        let store = InMemoryStore::new();
        store
            .create(
                "users",
                "u1",
                fields_with(&[
                    ("credits", 5i64.to_firestore_value()),
                    ("plan", "free".to_firestore_value()),
                ]),
            )
            .await
            .unwrap();

        store
            .patch(
                "users",
                "u1",
                fields_with(&[("credits", 9i64.to_firestore_value())]),
                Some(vec!["credits".to_string(), "plan".to_string()]),
                None,
            )
            .await
            .unwrap();

        let snap = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(
            snap.field("credits"),
            Some(&Value::IntegerValue("9".to_string()))
        );
        assert!(snap.field("plan").is_none());
    }

    #[tokio::test]
    async fn test_query_recent_orders_newest_first() {
        let store = InMemoryStore::new();
        let now = Utc::now();

        for (id, age_mins) in [("old", 30), ("new", 1), ("mid", 10)] {
            store
                .create(
                    "users/u1/creations",
                    id,
                    fields_with(&[(
                        "createdAt",
                        (now - Duration::minutes(age_mins)).to_firestore_value(),
                    )]),
                )
                .await
                .unwrap();
        }

        let recent = store
            .query_recent("users/u1", "creations", "createdAt", 2)
            .await
            .unwrap();
        let ids: Vec<&str> = recent.iter().map(|s| s.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid"]);
    }

    #[tokio::test]
    async fn test_query_recent_skips_nested_collections() {
        let store = InMemoryStore::new();
        store
            .create("users/u1/creations", "c1", HashMap::new())
            .await
            .unwrap();
        store
            .create("users/u2/creations", "c2", HashMap::new())
            .await
            .unwrap();

        let recent = store
            .query_recent("users/u1", "creations", "createdAt", 10)
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].doc_id, "c1");
    }
}
