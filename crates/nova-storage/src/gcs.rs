//! Google Cloud Storage JSON API client.
//!
//! Holds the generated video objects. The billing core never touches
//! this: uploads happen in the finalizer, strictly after the debit
//! transaction has committed.

use std::sync::Arc;
use std::time::Duration;

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};

/// OAuth scope for object reads and writes.
const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

const API_BASE: &str = "https://storage.googleapis.com/storage/v1";
const UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the storage client.
#[derive(Debug, Clone)]
pub struct GcsConfig {
    /// Bucket holding generated objects
    pub bucket: String,
    /// Request timeout
    pub timeout: Duration,
}

impl GcsConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let bucket = std::env::var("GCS_BUCKET")
            .or_else(|_| std::env::var("FIREBASE_STORAGE_BUCKET"))
            .map_err(|_| {
                StorageError::config_error("GCS_BUCKET or FIREBASE_STORAGE_BUCKET not set")
            })?;
        if bucket.is_empty() {
            return Err(StorageError::config_error("GCS_BUCKET is empty"));
        }

        let timeout_secs = std::env::var("GCS_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);

        Ok(Self {
            bucket,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

// =============================================================================
// Client
// =============================================================================

/// Cloud Storage client over the JSON API.
pub struct GcsClient {
    http: Client,
    auth: Arc<dyn TokenProvider>,
    bucket: String,
}

impl Clone for GcsClient {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            auth: Arc::clone(&self.auth),
            bucket: self.bucket.clone(),
        }
    }
}

impl GcsClient {
    /// Create a new storage client.
    pub fn new(config: GcsConfig) -> StorageResult<Self> {
        let auth = create_auth_provider()?;

        let http = Client::builder()
            .timeout(config.timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("nova-storage/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(StorageError::Network)?;

        Ok(Self {
            http,
            auth,
            bucket: config.bucket,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Self::new(GcsConfig::from_env()?)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn bearer(&self) -> StorageResult<String> {
        // gcp_auth caches tokens per scope set internally.
        let token = self
            .auth
            .token(&[STORAGE_SCOPE])
            .await
            .map_err(|e| StorageError::auth_error(format!("Failed to fetch token: {}", e)))?;
        Ok(format!("Bearer {}", token.as_str()))
    }

    /// Upload raw bytes as one object.
    pub async fn upload_bytes(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<()> {
        debug!(key, bytes = data.len(), "uploading object");

        let url = format!(
            "{}/b/{}/o?uploadType=media&name={}",
            UPLOAD_BASE,
            self.bucket,
            urlencoding::encode(key)
        );
        let response = self
            .http
            .post(&url)
            .header("Authorization", self.bearer().await?)
            .header("Content-Type", content_type)
            .body(data)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::upload_failed(format!(
                "{}: {}",
                status, body
            )));
        }

        info!(key, "uploaded object");
        Ok(())
    }

    /// Check that the bucket is reachable with the current credentials.
    pub async fn probe(&self) -> StorageResult<()> {
        let url = format!("{}/b/{}?fields=name", API_BASE, self.bucket);
        let response = self
            .http
            .get(&url)
            .header("Authorization", self.bearer().await?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StorageError::config_error(format!(
                "bucket {} not reachable: {}",
                self.bucket,
                response.status()
            )));
        }
        Ok(())
    }

    /// Public HTTPS URL for an object in a public bucket.
    pub fn public_url(&self, key: &str) -> String {
        public_url(&self.bucket, key)
    }
}

fn create_auth_provider() -> StorageResult<Arc<dyn TokenProvider>> {
    let service_account = CustomServiceAccount::from_env().map_err(|e| {
        StorageError::auth_error(format!("Failed to load service account: {}", e))
    })?;

    match service_account {
        Some(sa) => Ok(Arc::new(sa)),
        None => Err(StorageError::auth_error(
            "GOOGLE_APPLICATION_CREDENTIALS not set. \
             Set it to the path of your service account JSON file.",
        )),
    }
}

/// Public HTTPS URL for an object. Path segments stay readable; only
/// characters that need escaping inside a segment are encoded.
pub fn public_url(bucket: &str, key: &str) -> String {
    let encoded = urlencoding::encode(key).replace("%2F", "/");
    format!("https://storage.googleapis.com/{}/{}", bucket, encoded)
}
