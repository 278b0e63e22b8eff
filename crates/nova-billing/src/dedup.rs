//! Soft dedup of retried generation requests.
//!
//! A retried request is matched against the user's recent creations by
//! metadata agreement alone. False negatives are fine (a duplicate
//! record gets created); false positives are only guarded by the
//! metadata itself, so two genuinely identical back-to-back requests
//! inside the window will attach to the same pending record.

use chrono::{DateTime, Duration, Utc};
use nova_firestore::CreationsRepository;
use nova_models::DedupKey;
use tracing::debug;

use crate::error::BillingResult;

/// How many of the newest records one scan inspects.
pub const DEDUP_SCAN_LIMIT: i32 = 25;

/// Age cutoff for a reusable record.
pub const DEDUP_WINDOW_MINUTES: i64 = 10;

/// Scans recent creations for a pending record a retry can reattach to.
pub struct DedupScanner {
    creations: CreationsRepository,
}

impl DedupScanner {
    pub fn new(creations: CreationsRepository) -> Self {
        Self { creations }
    }

    /// Return the newest pending-like creation inside the window whose
    /// metadata agrees with `key`, or `None`.
    ///
    /// Records come back newest-first, so the scan stops at the first
    /// one older than the window. Finalized records never match.
    pub async fn find_recent_pending(
        &self,
        uid: &str,
        key: &DedupKey,
        now: DateTime<Utc>,
    ) -> BillingResult<Option<String>> {
        let cutoff = now - Duration::minutes(DEDUP_WINDOW_MINUTES);
        let records = self.creations.recent(uid, DEDUP_SCAN_LIMIT).await?;

        for record in records {
            if record.created_at <= cutoff {
                break;
            }
            if !record.status.is_pending_like() {
                continue;
            }
            if key.matches(&record) {
                debug!(uid, creation_id = %record.id, "matched pending creation");
                return Ok(Some(record.id));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use nova_firestore::InMemoryStore;
    use nova_models::{CreationRecord, CreationStatus};

    fn setup() -> (DedupScanner, CreationsRepository) {
        let store = Arc::new(InMemoryStore::new());
        let repo = CreationsRepository::new(store);
        (DedupScanner::new(repo.clone()), repo)
    }

    fn key_for(model: &str, duration: u32) -> DedupKey {
        DedupKey {
            model: Some(model.to_string()),
            duration_secs: Some(duration),
            ..DedupKey::default()
        }
    }

    #[tokio::test]
    async fn test_matches_pending_record_in_window() {
        let (scanner, repo) = setup();
        let now = Utc::now();

        let record = CreationRecord::new_pending("c1", 2, now - Duration::minutes(3))
            .with_params("kling", 10, 30, "720p");
        repo.create("u1", &record).await.unwrap();

        let found = scanner
            .find_recent_pending("u1", &key_for("kling", 10), now)
            .await
            .unwrap();
        assert_eq!(found.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_disagreeing_metadata_is_no_match() {
        let (scanner, repo) = setup();
        let now = Utc::now();

        let record = CreationRecord::new_pending("c1", 2, now - Duration::minutes(3))
            .with_params("kling", 10, 30, "720p");
        repo.create("u1", &record).await.unwrap();

        let found = scanner
            .find_recent_pending("u1", &key_for("runway", 10), now)
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_absent_fields_are_wildcards() {
        let (scanner, repo) = setup();
        let now = Utc::now();

        // Record stored without any params at all.
        let record = CreationRecord::new_pending("c1", 2, now - Duration::minutes(1));
        repo.create("u1", &record).await.unwrap();

        let found = scanner
            .find_recent_pending("u1", &key_for("kling", 10), now)
            .await
            .unwrap();
        assert_eq!(found.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_finalized_record_never_matches() {
        let (scanner, repo) = setup();
        let now = Utc::now();

        let mut record = CreationRecord::new_pending("c1", 2, now - Duration::minutes(2))
            .with_params("kling", 10, 30, "720p");
        record.status = CreationStatus::Done;
        repo.create("u1", &record).await.unwrap();

        let found = scanner
            .find_recent_pending("u1", &key_for("kling", 10), now)
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_record_outside_window_is_skipped() {
        let (scanner, repo) = setup();
        let now = Utc::now();

        let record = CreationRecord::new_pending("c1", 2, now - Duration::minutes(30))
            .with_params("kling", 10, 30, "720p");
        repo.create("u1", &record).await.unwrap();

        let found = scanner
            .find_recent_pending("u1", &key_for("kling", 10), now)
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_newest_matching_record_wins() {
        let (scanner, repo) = setup();
        let now = Utc::now();

        let older = CreationRecord::new_pending("old", 2, now - Duration::minutes(8))
            .with_params("kling", 10, 30, "720p");
        let newer = CreationRecord::new_pending("new", 2, now - Duration::minutes(1))
            .with_params("kling", 10, 30, "720p");
        repo.create("u1", &older).await.unwrap();
        repo.create("u1", &newer).await.unwrap();

        let found = scanner
            .find_recent_pending("u1", &key_for("kling", 10), now)
            .await
            .unwrap();
        assert_eq!(found.as_deref(), Some("new"));
    }
}
