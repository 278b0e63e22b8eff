//! Firestore REST API client.
//!
//! Production-grade client with:
//! - Token caching with refresh margin
//! - HTTP client tuning (pooling, timeouts)
//! - Exponential backoff with jitter
//! - Observability (tracing spans, metrics)
//!
//! Billing state lives in Firestore documents, so every commit here is a
//! single-document write. Multi-step invariants are enforced by the
//! optimistic loop in [`crate::store`], built on `patch_document` with an
//! updateTime precondition.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use tracing::{info_span, Instrument};

use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_request;
use crate::retry::RetryConfig;
use crate::token_cache::TokenCache;
use crate::types::{Document, RunQueryRequest, RunQueryResponse, StructuredQuery, Value};

// =============================================================================
// Configuration
// =============================================================================

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    /// GCP project ID
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Retry configuration
    pub retry: RetryConfig,
}

impl FirestoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> FirestoreResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .or_else(|_| std::env::var("FIREBASE_PROJECT_ID"))
            .map_err(|_| {
                FirestoreError::auth_error(
                    "GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set to access Firestore",
                )
            })?;

        if project_id.is_empty() {
            return Err(FirestoreError::auth_error(
                "GCP_PROJECT_ID or FIREBASE_PROJECT_ID cannot be empty",
            ));
        }

        let connect_timeout_secs: u64 = std::env::var("FIRESTORE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            project_id,
            database_id: std::env::var("FIRESTORE_DATABASE_ID")
                .unwrap_or_else(|_| "(default)".to_string()),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            retry: RetryConfig::from_env(),
        })
    }
}

// =============================================================================
// Client
// =============================================================================

/// Firestore REST API client.
pub struct FirestoreClient {
    http: Client,
    config: FirestoreConfig,
    base_url: String,
    token_cache: Arc<TokenCache>,
}

impl Clone for FirestoreClient {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            config: self.config.clone(),
            base_url: self.base_url.clone(),
            token_cache: Arc::clone(&self.token_cache),
        }
    }
}

impl FirestoreClient {
    /// Create a new Firestore client.
    pub async fn new(config: FirestoreConfig) -> FirestoreResult<Self> {
        let auth = Self::create_auth_provider()?;

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("nova-firestore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FirestoreError::Network)?;

        let base_url = format!(
            "https://firestore.googleapis.com/v1/projects/{}/databases/{}/documents",
            config.project_id, config.database_id
        );

        Ok(Self {
            http,
            config,
            base_url,
            token_cache: Arc::new(TokenCache::new(auth)),
        })
    }

    fn create_auth_provider() -> FirestoreResult<Arc<dyn TokenProvider>> {
        let service_account = CustomServiceAccount::from_env().map_err(|e| {
            FirestoreError::auth_error(format!("Failed to load service account: {}", e))
        })?;

        match service_account {
            Some(sa) => Ok(Arc::new(sa)),
            None => Err(FirestoreError::auth_error(
                "GOOGLE_APPLICATION_CREDENTIALS not set. \
                 Set it to the path of your service account JSON file.",
            )),
        }
    }

    /// Create from environment variables.
    pub async fn from_env() -> FirestoreResult<Self> {
        let config = FirestoreConfig::from_env()?;
        Self::new(config).await
    }

    async fn get_token(&self) -> FirestoreResult<String> {
        self.token_cache.get_token().await
    }

    fn is_access_token_expired(body: &str) -> bool {
        body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
    }

    /// Build document path.
    fn document_path(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, doc_id)
    }

    /// Send a request, transparently refreshing the token once on an
    /// UNAUTHENTICATED response. Requests are rebuilt rather than cloned
    /// so the fresh bearer token is actually used.
    async fn send_with_reauth<B>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> FirestoreResult<reqwest::Response>
    where
        B: Serialize + ?Sized,
    {
        let build = |token: &str| {
            let mut req = self.http.request(method.clone(), url).bearer_auth(token);
            if let Some(b) = body {
                req = req.json(b);
            }
            req
        };

        let token = self.get_token().await?;
        let response = build(&token).send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            let text = response.text().await.unwrap_or_default();
            if Self::is_access_token_expired(&text) {
                self.token_cache.invalidate().await;
                let token = self.get_token().await?;
                return Ok(build(&token).send().await?);
            }
            return Err(FirestoreError::from_http_status(
                status.as_u16(),
                format!("{} failed: {}", url, text),
            ));
        }

        Ok(response)
    }

    // =========================================================================
    // CRUD Operations
    // =========================================================================

    /// Get a document. Returns `None` when it does not exist.
    pub async fn get_document(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> FirestoreResult<Option<Document>> {
        let url = self.document_path(collection, doc_id);

        self.execute_request("get_document", collection, Some(doc_id), async {
            let response = self
                .send_with_reauth::<Document>(Method::GET, &url, None)
                .await?;

            match response.status() {
                StatusCode::OK => {
                    let doc: Document = response.json().await?;
                    Ok(Some(doc))
                }
                StatusCode::NOT_FOUND => Ok(None),
                status => Err(Self::handle_error_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Create a document. Fails with `AlreadyExists` if the id is taken,
    /// which the transaction loop treats as losing a create race.
    pub async fn create_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> FirestoreResult<Document> {
        let url = format!("{}/{}?documentId={}", self.base_url, collection, doc_id);
        let body = Document::new(fields);

        self.execute_request("create_document", collection, Some(doc_id), async {
            let response = self
                .send_with_reauth(Method::POST, &url, Some(&body))
                .await?;

            match response.status() {
                StatusCode::OK | StatusCode::CREATED => {
                    let doc: Document = response.json().await?;
                    Ok(doc)
                }
                StatusCode::CONFLICT => Err(FirestoreError::AlreadyExists(format!(
                    "{}/{}",
                    collection, doc_id
                ))),
                status => Err(Self::handle_error_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Patch a document (merge semantics).
    ///
    /// With an `update_mask`, only the listed fields are written; fields
    /// outside the mask keep their stored value. With `update_time`, the
    /// write carries a currentDocument.updateTime precondition and fails
    /// with `PreconditionFailed` if another writer committed in between.
    pub async fn patch_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_mask: Option<Vec<String>>,
        update_time: Option<&str>,
    ) -> FirestoreResult<Document> {
        let mut url = self.document_path(collection, doc_id);
        let mut params: Vec<String> = Vec::new();

        if let Some(mask) = update_mask {
            params.extend(mask.iter().map(|f| format!("updateMask.fieldPaths={}", f)));
        }
        if let Some(ts) = update_time {
            params.push(format!(
                "currentDocument.updateTime={}",
                urlencoding::encode(ts)
            ));
        }
        if !params.is_empty() {
            url = format!("{}?{}", url, params.join("&"));
        }

        let body = Document::new(fields);

        self.execute_request("patch_document", collection, Some(doc_id), async {
            let response = self
                .send_with_reauth(Method::PATCH, &url, Some(&body))
                .await?;

            match response.status() {
                StatusCode::OK => {
                    let doc: Document = response.json().await?;
                    Ok(doc)
                }
                StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT => {
                    let text = response.text().await.unwrap_or_default();
                    Err(FirestoreError::PreconditionFailed(format!(
                        "Precondition failed: {}",
                        text
                    )))
                }
                StatusCode::NOT_FOUND => Err(FirestoreError::not_found(format!(
                    "{}/{}",
                    collection, doc_id
                ))),
                status => Err(Self::handle_error_response(status, &url, response).await),
            }
        })
        .await
    }

    // =========================================================================
    // Query Operations
    // =========================================================================

    /// Run a structured query on a collection.
    ///
    /// The `parent_path` should be the path containing the collection, e.g.
    /// "users/USER_ID" for querying "users/USER_ID/creations". Pass "" to
    /// query a top-level collection.
    pub async fn run_query(
        &self,
        parent_path: &str,
        query: StructuredQuery,
    ) -> FirestoreResult<Vec<Document>> {
        let url = if parent_path.is_empty() {
            format!("{}:runQuery", self.base_url)
        } else {
            format!("{}/{}:runQuery", self.base_url, parent_path)
        };
        let request = RunQueryRequest {
            structured_query: query,
        };

        let span_target = if parent_path.is_empty() {
            "(root)"
        } else {
            parent_path
        };

        self.execute_request("run_query", span_target, None, async {
            let response = self
                .send_with_reauth(Method::POST, &url, Some(&request))
                .await?;

            match response.status() {
                StatusCode::OK => {
                    let body = response.text().await.unwrap_or_default();
                    // runQuery returns a JSON array of RunQueryResponse objects
                    let responses: Vec<RunQueryResponse> = serde_json::from_str(&body)
                        .map_err(|e| {
                            FirestoreError::request_failed(format!(
                                "Failed to parse runQuery response: {} (body prefix: {})",
                                e,
                                &body[..body.len().min(200)]
                            ))
                        })?;

                    let docs: Vec<Document> =
                        responses.into_iter().filter_map(|r| r.document).collect();

                    Ok(docs)
                }
                status => Err(Self::handle_error_response(status, &url, response).await),
            }
        })
        .await
    }

    /// Execute with retry.
    pub async fn with_retry<T, F, Fut>(&self, operation: &str, op: F) -> FirestoreResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = FirestoreResult<T>>,
    {
        crate::retry::with_retry(&self.config.retry, operation, op).await
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    /// Execute a request with tracing and metrics.
    async fn execute_request<T, F>(
        &self,
        operation: &str,
        collection: &str,
        doc_id: Option<&str>,
        fut: F,
    ) -> FirestoreResult<T>
    where
        F: std::future::Future<Output = FirestoreResult<T>>,
    {
        let span = if let Some(id) = doc_id {
            info_span!("firestore_request", operation = %operation, collection = %collection, doc_id = %id)
        } else {
            info_span!("firestore_request", operation = %operation, collection = %collection)
        };

        let start = Instant::now();
        let result = fut.instrument(span).await;
        let latency_ms = start.elapsed().as_millis() as f64;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, latency_ms);

        result
    }

    async fn handle_error_response(
        status: StatusCode,
        url: &str,
        response: reqwest::Response,
    ) -> FirestoreError {
        let body = response.text().await.unwrap_or_default();
        FirestoreError::from_http_status(status.as_u16(), format!("{} failed: {}", url, body))
    }
}
