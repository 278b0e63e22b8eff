//! Outbound notification delivery.
//!
//! This crate provides:
//! - Push notifications over FCM HTTP v1
//! - Transactional email with a primary/fallback provider pair
//! - The shared HTML email template

pub mod email;
pub mod error;
pub mod push;
pub mod template;

pub use email::{EmailConfig, EmailSender, OutboundEmail};
pub use error::{DeliveryError, DeliveryResult};
pub use push::{PushConfig, PushMessage, PushSender};
pub use template::{escape_html, safe_url, EmailTemplate};
