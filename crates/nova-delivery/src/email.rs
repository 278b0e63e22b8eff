//! Transactional email delivery.
//!
//! Posts rendered HTML to a provider HTTP API, with an optional second
//! provider used as fallback when the primary rejects the request.

use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{DeliveryError, DeliveryResult};

/// Configuration for the email sender.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Primary provider endpoint, e.g. `https://api.resend.com/emails`
    pub primary_url: String,
    /// API key for the primary provider
    pub primary_key: String,
    /// Optional fallback provider endpoint
    pub fallback_url: Option<String>,
    /// API key for the fallback provider
    pub fallback_key: Option<String>,
    /// Sender address shown to recipients
    pub from_address: String,
    /// Request timeout
    pub timeout: Duration,
}

impl EmailConfig {
    /// Create config from environment variables.
    pub fn from_env() -> DeliveryResult<Self> {
        let primary_url = std::env::var("EMAIL_PRIMARY_URL")
            .map_err(|_| DeliveryError::config_error("EMAIL_PRIMARY_URL not set"))?;
        let primary_key = std::env::var("EMAIL_PRIMARY_KEY")
            .map_err(|_| DeliveryError::config_error("EMAIL_PRIMARY_KEY not set"))?;

        Ok(Self {
            primary_url,
            primary_key,
            fallback_url: std::env::var("EMAIL_FALLBACK_URL").ok(),
            fallback_key: std::env::var("EMAIL_FALLBACK_KEY").ok(),
            from_address: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "GeNova <no-reply@genova.app>".to_string()),
            timeout: Duration::from_secs(
                std::env::var("EMAIL_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(15),
            ),
        })
    }

    /// Fallback endpoint and key, if both are configured.
    fn fallback(&self) -> Option<(&str, &str)> {
        match (self.fallback_url.as_deref(), self.fallback_key.as_deref()) {
            (Some(url), Some(key)) => Some((url, key)),
            _ => None,
        }
    }
}

/// A single outbound message.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    /// Recipient address
    pub to: String,
    /// Subject line
    pub subject: String,
    /// Rendered HTML body
    pub html: String,
}

/// Client for transactional email providers.
pub struct EmailSender {
    http: Client,
    config: EmailConfig,
}

impl EmailSender {
    /// Create a new sender.
    pub fn new(config: EmailConfig) -> DeliveryResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(DeliveryError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> DeliveryResult<Self> {
        Self::new(EmailConfig::from_env()?)
    }

    /// Send one message. The fallback provider is tried only after the
    /// primary fails; if both fail the combined error is returned.
    pub async fn send(&self, email: &OutboundEmail) -> DeliveryResult<()> {
        let primary_err = match self
            .send_via(&self.config.primary_url, &self.config.primary_key, email)
            .await
        {
            Ok(()) => {
                debug!("Email sent to {} via primary provider", email.to);
                return Ok(());
            }
            Err(e) => e,
        };

        match self.config.fallback() {
            Some((url, key)) => {
                warn!(
                    "Primary email provider failed for {}, trying fallback: {}",
                    email.to, primary_err
                );
                match self.send_via(url, key, email).await {
                    Ok(()) => {
                        debug!("Email sent to {} via fallback provider", email.to);
                        Ok(())
                    }
                    Err(fallback_err) => Err(DeliveryError::email_failed(format!(
                        "primary: {}; fallback: {}",
                        primary_err, fallback_err
                    ))),
                }
            }
            None => Err(primary_err),
        }
    }

    async fn send_via(&self, url: &str, key: &str, email: &OutboundEmail) -> DeliveryResult<()> {
        let payload = json!({
            "from": self.config.from_address,
            "to": [email.to],
            "subject": email.subject,
            "html": email.html,
        });

        let response = self
            .http
            .post(url)
            .bearer_auth(key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::email_failed(format!(
                "provider returned {}: {}",
                status, body
            )));
        }

        Ok(())
    }
}
