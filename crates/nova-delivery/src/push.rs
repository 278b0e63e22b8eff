//! FCM HTTP v1 push sender.
//!
//! Sends to one device token at a time. Whether to send at all is the
//! caller's decision: the per-category notification preference lives on
//! the user record and is checked before calling in here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{DeliveryError, DeliveryResult};

/// OAuth scope for FCM sends.
const MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";

/// Configuration for the push sender.
#[derive(Debug, Clone)]
pub struct PushConfig {
    /// Firebase project the device tokens belong to
    pub project_id: String,
    /// Request timeout
    pub timeout: Duration,
}

impl PushConfig {
    /// Create config from environment variables.
    pub fn from_env() -> DeliveryResult<Self> {
        let project_id = std::env::var("FIREBASE_PROJECT_ID")
            .or_else(|_| std::env::var("GCP_PROJECT_ID"))
            .map_err(|_| {
                DeliveryError::config_error("FIREBASE_PROJECT_ID or GCP_PROJECT_ID not set")
            })?;

        let timeout_secs = std::env::var("PUSH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(15);

        Ok(Self {
            project_id,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// One push notification addressed to a device token.
#[derive(Debug, Clone)]
pub struct PushMessage {
    pub device_token: String,
    pub title: String,
    pub body: String,
    /// Opaque key/value payload handed to the app.
    pub data: HashMap<String, String>,
}

impl PushMessage {
    /// FCM v1 request body for this message.
    fn to_payload(&self) -> serde_json::Value {
        json!({
            "message": {
                "token": self.device_token,
                "notification": {
                    "title": self.title,
                    "body": self.body,
                },
                "data": self.data,
            }
        })
    }
}

/// FCM HTTP v1 client.
pub struct PushSender {
    http: Client,
    auth: Arc<dyn TokenProvider>,
    endpoint: String,
}

impl PushSender {
    /// Create a new push sender.
    pub fn new(config: PushConfig) -> DeliveryResult<Self> {
        let auth = create_auth_provider()?;

        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("nova-delivery/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(DeliveryError::Network)?;

        let endpoint = format!(
            "https://fcm.googleapis.com/v1/projects/{}/messages:send",
            config.project_id
        );

        Ok(Self {
            http,
            auth,
            endpoint,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> DeliveryResult<Self> {
        Self::new(PushConfig::from_env()?)
    }

    /// Send one notification. A dead or unregistered token is reported
    /// as an error; callers log and move on.
    pub async fn send(&self, message: &PushMessage) -> DeliveryResult<()> {
        debug!(title = %message.title, "sending push");

        let token = self
            .auth
            .token(&[MESSAGING_SCOPE])
            .await
            .map_err(|e| DeliveryError::auth_error(format!("Failed to fetch token: {}", e)))?;

        let response = self
            .http
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", token.as_str()))
            .json(&message.to_payload())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "push rejected");
            return Err(DeliveryError::push_failed(format!("{}: {}", status, body)));
        }

        debug!("push accepted");
        Ok(())
    }
}

fn create_auth_provider() -> DeliveryResult<Arc<dyn TokenProvider>> {
    let service_account = CustomServiceAccount::from_env().map_err(|e| {
        DeliveryError::auth_error(format!("Failed to load service account: {}", e))
    })?;

    match service_account {
        Some(sa) => Ok(Arc::new(sa)),
        None => Err(DeliveryError::auth_error(
            "GOOGLE_APPLICATION_CREDENTIALS not set. \
             Set it to the path of your service account JSON file.",
        )),
    }
}
