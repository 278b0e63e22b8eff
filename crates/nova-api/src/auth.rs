//! Firebase ID token authentication.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::Utc;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// Google JWKS URL for Firebase Auth.
const GOOGLE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Firebase token issuer prefix.
const FIREBASE_ISSUER_PREFIX: &str = "https://securetoken.google.com/";

/// JWKS cache TTL.
const JWKS_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Decoded Firebase ID token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirebaseClaims {
    /// User ID
    pub sub: String,
    /// Email (if available)
    pub email: Option<String>,
    /// Email verified
    pub email_verified: Option<bool>,
    /// Issuer
    pub iss: String,
    /// Audience (Firebase project ID)
    pub aud: String,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
}

/// Authenticated user extracted from request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
}

impl From<FirebaseClaims> for AuthUser {
    fn from(claims: FirebaseClaims) -> Self {
        Self {
            uid: claims.sub,
            email: claims.email,
        }
    }
}

/// JWKS response from Google.
#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<JwkKey>,
}

#[derive(Debug, Clone, Deserialize)]
struct JwkKey {
    kid: String,
    n: String,
    e: String,
}

/// Cached JWKS keys.
///
/// Keys are fetched lazily on first verification and refreshed once the
/// TTL passes, so constructing the cache never touches the network.
pub struct JwksCache {
    http: Client,
    keys: RwLock<HashMap<String, DecodingKey>>,
    last_refresh: RwLock<Option<Instant>>,
    project_id: String,
}

impl JwksCache {
    /// Create a new JWKS cache pinned to one Firebase project.
    pub fn new(project_id: impl Into<String>) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ApiError::internal(format!("Failed to build JWKS client: {}", e)))?;

        Ok(Self {
            http,
            keys: RwLock::new(HashMap::new()),
            last_refresh: RwLock::new(None),
            project_id: project_id.into(),
        })
    }

    /// Refresh JWKS keys from Google.
    async fn refresh_keys(&self) -> Result<(), ApiError> {
        debug!("Refreshing JWKS keys");

        let response = self
            .http
            .get(GOOGLE_JWKS_URL)
            .send()
            .await
            .map_err(|e| ApiError::internal(format!("JWKS fetch failed: {}", e)))?;
        let jwks: JwksResponse = response
            .json()
            .await
            .map_err(|e| ApiError::internal(format!("JWKS parse failed: {}", e)))?;

        let mut keys = HashMap::new();
        for jwk in jwks.keys {
            let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
                .map_err(|e| ApiError::internal(format!("Bad JWKS key: {}", e)))?;
            keys.insert(jwk.kid, key);
        }

        let key_count = keys.len();
        *self.keys.write().await = keys;
        *self.last_refresh.write().await = Some(Instant::now());

        debug!("Refreshed {} JWKS keys", key_count);
        Ok(())
    }

    /// Get decoding key for a key ID.
    async fn get_key(&self, kid: &str) -> Option<DecodingKey> {
        let needs_refresh = {
            let last = self.last_refresh.read().await;
            match *last {
                None => true,
                Some(at) => at.elapsed() > JWKS_CACHE_TTL,
            }
        };

        if needs_refresh {
            if let Err(e) = self.refresh_keys().await {
                warn!("Failed to refresh JWKS keys: {}", e);
            }
        }

        self.keys.read().await.get(kid).cloned()
    }

    /// Verify a Firebase ID token.
    pub async fn verify_token(&self, token: &str) -> Result<FirebaseClaims, ApiError> {
        let header = decode_header(token)
            .map_err(|e| ApiError::unauthorized(format!("Invalid token header: {}", e)))?;

        let kid = header
            .kid
            .ok_or_else(|| ApiError::unauthorized("Token missing key ID"))?;

        let key = self
            .get_key(&kid)
            .await
            .ok_or_else(|| ApiError::unauthorized("Unknown key ID"))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[format!("{}{}", FIREBASE_ISSUER_PREFIX, self.project_id)]);
        validation.set_audience(&[&self.project_id]);

        let token_data = decode::<FirebaseClaims>(token, &key, &validation)
            .map_err(|e| ApiError::unauthorized(format!("Token validation failed: {}", e)))?;

        Ok(token_data.claims)
    }
}

/// Kick off a background expiry sweep for the authenticated user.
///
/// Runs after every authenticated request; a failed sweep is logged and
/// never surfaced, the next read still sees expired grants as inactive.
fn spawn_reconcile(state: &AppState, uid: &str) {
    let reconciler = state.reconciler.clone();
    let uid = uid.to_string();
    tokio::spawn(async move {
        match reconciler.reconcile(&uid, Utc::now()).await {
            Ok(report) if !report.is_noop() => {
                debug!(uid = %uid, fields = ?report.changed_fields, "background sweep applied");
            }
            Ok(_) => {}
            Err(e) => warn!(uid = %uid, "background sweep failed: {}", e),
        }
    });
}

/// Axum extractor for authenticated user.
#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if state.config.debug_auth_active() {
            let uid = parts
                .headers
                .get("X-Debug-Uid")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("dev-user")
                .to_string();
            let user = AuthUser { uid, email: None };
            spawn_reconcile(state, &user.uid);
            return Ok(user);
        }

        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::unauthorized("Invalid Authorization header format"))?;

        let claims = state.jwks.verify_token(token).await?;

        let user = AuthUser::from(claims);
        spawn_reconcile(state, &user.uid);
        Ok(user)
    }
}
