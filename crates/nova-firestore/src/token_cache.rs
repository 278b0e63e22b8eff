//! Cached OAuth tokens for Firestore access.
//!
//! Every ledger read and commit goes over the REST API with a bearer token,
//! so token churn shows up directly as request latency. The cache refreshes
//! ahead of expiry, single-flights concurrent refreshes, and falls back to a
//! still-usable token when the refresh itself fails.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gcp_auth::TokenProvider;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};

/// Refresh this long before the token actually expires.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// TTL assumed when the provider reports no usable expiry.
/// OAuth access tokens are typically valid for 60 minutes.
const FALLBACK_TTL: Duration = Duration::from_secs(50 * 60);

/// OAuth scope for Firestore. The datastore scope covers the Firestore
/// REST API.
pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    /// Fresh enough to hand out without triggering a refresh.
    fn fresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN < self.expires_at
    }

    /// Not yet expired, even if a refresh is already due.
    fn usable(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Thread-safe token cache with single-flight refresh.
pub struct TokenCache {
    auth: Arc<dyn TokenProvider>,
    cache: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(auth: Arc<dyn TokenProvider>) -> Self {
        Self {
            auth,
            cache: RwLock::new(None),
        }
    }

    /// Drop the cached token so the next call fetches a new one.
    /// Called after an UNAUTHENTICATED response from Firestore.
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
    }

    /// Get a valid access token, refreshing if necessary.
    ///
    /// Fast path returns the cached token under the read lock. The slow
    /// path takes the write lock and double-checks before refreshing, so a
    /// burst of requests produces one refresh rather than one each.
    pub async fn get_token(&self) -> FirestoreResult<String> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fresh() {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let mut cache = self.cache.write().await;

        // Another task may have refreshed while we waited for the lock.
        if let Some(cached) = cache.as_ref() {
            if cached.fresh() {
                return Ok(cached.access_token.clone());
            }
        }

        self.refresh(&mut cache).await
    }

    async fn refresh(&self, cache: &mut Option<CachedToken>) -> FirestoreResult<String> {
        match self.auth.token(&[FIRESTORE_SCOPE]).await {
            Ok(token) => {
                let access_token = token.as_str().to_string();

                // Prefer the provider's expiry; treat an already-expired
                // token as immediately stale so the next call retries.
                let expires_at = {
                    let now = Utc::now();
                    let exp = token.expires_at();
                    if exp > now {
                        match (exp - now).to_std() {
                            Ok(ttl) => Instant::now() + ttl,
                            Err(_) => Instant::now() + FALLBACK_TTL,
                        }
                    } else {
                        Instant::now()
                    }
                };

                *cache = Some(CachedToken {
                    access_token: access_token.clone(),
                    expires_at,
                });

                debug!("refreshed Firestore auth token");
                Ok(access_token)
            }
            Err(e) => {
                // A not-yet-expired token beats failing the request outright.
                if let Some(cached) = cache.as_ref() {
                    if cached.usable() {
                        warn!("token refresh failed, reusing current token: {}", e);
                        return Ok(cached.access_token.clone());
                    }
                }

                Err(FirestoreError::auth_error(format!(
                    "failed to obtain auth token: {}",
                    e
                )))
            }
        }
    }
}
