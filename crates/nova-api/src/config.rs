//! API configuration.

use std::time::Duration;

/// Which document store backs the billing core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Real Firestore over REST.
    Firestore,
    /// In-process store for local development and tests.
    Memory,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second
    pub rate_limit_rps: u32,
    /// Rate limit burst
    pub rate_limit_burst: u32,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Document store backend
    pub store_backend: StoreBackend,
    /// Skip token verification and trust the X-Debug-Uid header.
    /// Never honored in production.
    pub auth_disabled: bool,
    /// Local MP4 the finalizer copies to object storage as the output.
    pub placeholder_video_path: String,
    /// How long the finalizer pretends to generate before finishing.
    pub finalize_delay: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            rate_limit_burst: 20,
            max_body_size: 1024 * 1024, // 1MB, requests are small JSON bodies
            environment: "development".to_string(),
            store_backend: StoreBackend::Firestore,
            auth_disabled: false,
            placeholder_video_path: "assets/placeholder.mp4".to_string(),
            finalize_delay: Duration::from_secs(2),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: std::env::var("RATE_LIMIT_RPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.rate_limit_rps),
            rate_limit_burst: std::env::var("RATE_LIMIT_BURST")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.rate_limit_burst),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            store_backend: match std::env::var("STORE_BACKEND").as_deref() {
                Ok("memory") => StoreBackend::Memory,
                _ => StoreBackend::Firestore,
            },
            auth_disabled: std::env::var("AUTH_DISABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            placeholder_video_path: std::env::var("PLACEHOLDER_VIDEO_PATH")
                .unwrap_or(defaults.placeholder_video_path),
            finalize_delay: Duration::from_millis(
                std::env::var("FINALIZE_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.finalize_delay.as_millis() as u64),
            ),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }

    /// Whether the debug identity bypass is in effect.
    pub fn debug_auth_active(&self) -> bool {
        self.auth_disabled && !self.is_production()
    }
}
