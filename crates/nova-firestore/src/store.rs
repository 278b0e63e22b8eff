//! Document store abstraction and optimistic single-document transactions.
//!
//! All billing invariants live in one ledger document per user, so "atomic"
//! here means: read a snapshot, decide against that snapshot, commit with a
//! revision precondition, and start over if a concurrent writer got there
//! first. The [`transact`] loop packages that cycle; callers supply a pure
//! decision function and never see the retry mechanics.
//!
//! [`DocumentStore`] is the seam between the decision logic and the real
//! Firestore client, which also lets tests and local development run against
//! the in-memory store in [`crate::memory`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::{record_txn_conflict, record_txn_exhausted};
use crate::types::{
    CollectionSelector, Document, FieldReference, Order, StructuredQuery, Value,
};

/// Maximum attempts for an optimistic transaction.
pub const MAX_TXN_ATTEMPTS: u32 = 5;

/// Base delay between conflicting attempts (milliseconds). Backoff is
/// linear: base * attempt number.
pub const TXN_BASE_DELAY_MS: u64 = 50;

// =============================================================================
// Snapshot
// =============================================================================

/// A point-in-time view of a document.
///
/// `update_time` is the revision tag the store hands back on read; a commit
/// against the snapshot succeeds only while the stored document still
/// carries the same tag.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub doc_id: String,
    pub fields: HashMap<String, Value>,
    pub update_time: Option<String>,
}

impl Snapshot {
    pub fn from_document(fallback_id: &str, doc: Document) -> Self {
        let doc_id = doc
            .doc_id()
            .map(str::to_string)
            .unwrap_or_else(|| fallback_id.to_string());
        Self {
            doc_id,
            fields: doc.fields.unwrap_or_default(),
            update_time: doc.update_time,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

// =============================================================================
// DocumentStore
// =============================================================================

/// Minimal document-store surface the billing layer runs on.
///
/// `collection` is a slash-separated path relative to the database root,
/// so subcollections pass naturally: `users/u1/creations`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document, `None` if absent.
    async fn get(&self, collection: &str, doc_id: &str) -> FirestoreResult<Option<Snapshot>>;

    /// Create a document, failing with `AlreadyExists` when the id is taken.
    async fn create(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> FirestoreResult<Snapshot>;

    /// Merge fields into a document. With a mask, only the listed fields
    /// change. With `expected_update_time`, the write fails with
    /// `PreconditionFailed` unless the stored revision still matches.
    async fn patch(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        mask: Option<Vec<String>>,
        expected_update_time: Option<&str>,
    ) -> FirestoreResult<Snapshot>;

    /// Most recent documents of a collection, newest first by the given
    /// timestamp field.
    async fn query_recent(
        &self,
        parent_path: &str,
        collection_id: &str,
        order_by_field: &str,
        limit: i32,
    ) -> FirestoreResult<Vec<Snapshot>>;
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    async fn get(&self, collection: &str, doc_id: &str) -> FirestoreResult<Option<Snapshot>> {
        let doc = self.get_document(collection, doc_id).await?;
        Ok(doc.map(|d| Snapshot::from_document(doc_id, d)))
    }

    async fn create(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> FirestoreResult<Snapshot> {
        let doc = self.create_document(collection, doc_id, fields).await?;
        Ok(Snapshot::from_document(doc_id, doc))
    }

    async fn patch(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        mask: Option<Vec<String>>,
        expected_update_time: Option<&str>,
    ) -> FirestoreResult<Snapshot> {
        let doc = self
            .patch_document(collection, doc_id, fields, mask, expected_update_time)
            .await?;
        Ok(Snapshot::from_document(doc_id, doc))
    }

    async fn query_recent(
        &self,
        parent_path: &str,
        collection_id: &str,
        order_by_field: &str,
        limit: i32,
    ) -> FirestoreResult<Vec<Snapshot>> {
        let query = StructuredQuery {
            from: vec![CollectionSelector {
                collection_id: collection_id.to_string(),
                all_descendants: None,
            }],
            r#where: None,
            order_by: Some(vec![Order {
                field: FieldReference {
                    field_path: order_by_field.to_string(),
                },
                direction: "DESCENDING".to_string(),
            }]),
            start_at: None,
            limit: Some(limit),
        };

        let docs = self.run_query(parent_path, query).await?;
        Ok(docs
            .into_iter()
            .map(|d| Snapshot::from_document("", d))
            .collect())
    }
}

// =============================================================================
// Optimistic Transactions
// =============================================================================

/// Outcome of one decision pass over a snapshot.
#[derive(Debug)]
pub enum TxnDecision<T, E> {
    /// Write `fields` (restricted to `mask` when present) and return `value`
    /// once the commit sticks.
    Commit {
        fields: HashMap<String, Value>,
        mask: Option<Vec<String>>,
        value: T,
    },
    /// Nothing to write; return `value` immediately.
    ReadOnly(T),
    /// Domain rejection decided from the snapshot. Never retried.
    Abort(E),
}

/// Why a transaction did not produce a value.
#[derive(Debug)]
pub enum TxnError<E> {
    /// The decision function rejected the operation.
    Aborted(E),
    /// Every attempt lost its commit race.
    Contention { attempts: u32 },
    /// The store itself failed.
    Store(FirestoreError),
}

impl<E: std::fmt::Display> std::fmt::Display for TxnError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxnError::Aborted(e) => write!(f, "transaction aborted: {}", e),
            TxnError::Contention { attempts } => {
                write!(f, "transaction lost {} consecutive commit races", attempts)
            }
            TxnError::Store(e) => write!(f, "store error: {}", e),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for TxnError<E> {}

/// Transaction tuning knobs.
#[derive(Debug, Clone)]
pub struct TxnOptions {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for TxnOptions {
    fn default() -> Self {
        Self {
            max_attempts: MAX_TXN_ATTEMPTS,
            base_delay_ms: TXN_BASE_DELAY_MS,
        }
    }
}

/// Run a read-decide-commit cycle until it commits cleanly, aborts, or
/// exhausts its attempts.
///
/// The decision function must be effect-free: it can run on a stale
/// snapshot and be called again after a lost race. Slow work (uploads,
/// notifications) belongs before or after the transaction, never inside.
///
/// An absent document plus a `Commit` decision becomes a create; losing a
/// create race (`AlreadyExists`) re-reads like any other conflict, so two
/// racing first-writers resolve to one create plus one retried patch.
pub async fn transact<S, T, E, F>(
    store: &S,
    collection: &str,
    doc_id: &str,
    options: &TxnOptions,
    mut decide: F,
) -> Result<T, TxnError<E>>
where
    S: DocumentStore + ?Sized,
    F: FnMut(Option<&Snapshot>) -> TxnDecision<T, E>,
{
    for attempt in 0..options.max_attempts {
        let snapshot = store
            .get(collection, doc_id)
            .await
            .map_err(TxnError::Store)?;

        match decide(snapshot.as_ref()) {
            TxnDecision::ReadOnly(value) => return Ok(value),
            TxnDecision::Abort(e) => return Err(TxnError::Aborted(e)),
            TxnDecision::Commit {
                fields,
                mask,
                value,
            } => {
                let commit = match &snapshot {
                    None => store.create(collection, doc_id, fields).await,
                    Some(snap) => {
                        // A snapshot without a revision tag cannot be
                        // committed against safely.
                        let Some(update_time) = snap.update_time.as_deref() else {
                            return Err(TxnError::Store(FirestoreError::invalid_response(
                                format!("{}/{} snapshot missing updateTime", collection, doc_id),
                            )));
                        };
                        store
                            .patch(collection, doc_id, fields, mask, Some(update_time))
                            .await
                    }
                };

                match commit {
                    Ok(_) => return Ok(value),
                    Err(e) if e.is_commit_conflict() => {
                        record_txn_conflict(collection);
                        debug!(
                            collection,
                            doc_id,
                            attempt = attempt + 1,
                            "optimistic commit lost, re-reading"
                        );
                        let delay =
                            Duration::from_millis(options.base_delay_ms * (attempt as u64 + 1));
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    Err(e) => return Err(TxnError::Store(e)),
                }
            }
        }
    }

    record_txn_exhausted(collection);
    warn!(
        collection,
        doc_id,
        attempts = options.max_attempts,
        "transaction exhausted its attempts"
    );
    Err(TxnError::Contention {
        attempts: options.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;
    use crate::types::ToFirestoreValue;

    fn count_fields(n: i64) -> HashMap<String, Value> {
        let mut fields = HashMap::new();
        fields.insert("count".to_string(), n.to_firestore_value());
        fields
    }

    fn read_count(snapshot: Option<&Snapshot>) -> i64 {
        snapshot
            .and_then(|s| s.field("count"))
            .and_then(|v| match v {
                Value::IntegerValue(s) => s.parse().ok(),
                _ => None,
            })
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_transact_creates_absent_document() {
        let store = InMemoryStore::new();

        let result: Result<i64, TxnError<String>> =
            transact(&store, "counters", "c1", &TxnOptions::default(), |snap| {
                assert!(snap.is_none());
                TxnDecision::Commit {
                    fields: count_fields(1),
                    mask: None,
                    value: 1,
                }
            })
            .await;

        assert_eq!(result.unwrap(), 1);
        let snap = store.get("counters", "c1").await.unwrap().unwrap();
        assert_eq!(read_count(Some(&snap)), 1);
    }

    #[tokio::test]
    async fn test_transact_read_only_writes_nothing() {
        let store = InMemoryStore::new();

        let result: Result<&str, TxnError<String>> =
            transact(&store, "counters", "c1", &TxnOptions::default(), |_| {
                TxnDecision::ReadOnly("nothing")
            })
            .await;

        assert_eq!(result.unwrap(), "nothing");
        assert!(store.get("counters", "c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transact_abort_propagates() {
        let store = InMemoryStore::new();

        let result: Result<(), TxnError<String>> =
            transact(&store, "counters", "c1", &TxnOptions::default(), |_| {
                TxnDecision::Abort("rejected".to_string())
            })
            .await;

        match result {
            Err(TxnError::Aborted(msg)) => assert_eq!(msg, "rejected"),
            other => panic!("expected abort, got {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_all_land() {
        let store = std::sync::Arc::new(InMemoryStore::new());

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = std::sync::Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let options = TxnOptions {
                    max_attempts: 50,
                    base_delay_ms: 1,
                };
                transact::<_, i64, String, _>(&*store, "counters", "shared", &options, |snap| {
                    let next = read_count(snap) + 1;
                    TxnDecision::Commit {
                        fields: count_fields(next),
                        mask: None,
                        value: next,
                    }
                })
                .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let snap = store.get("counters", "shared").await.unwrap().unwrap();
        assert_eq!(read_count(Some(&snap)), 10);
    }
}
