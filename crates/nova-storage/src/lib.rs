//! Object storage for generated videos.
//!
//! Thin Cloud Storage collaborator used by the generation finalizer;
//! nothing in here participates in billing transactions.

pub mod error;
pub mod gcs;

pub use error::{StorageError, StorageResult};
pub use gcs::{public_url, GcsClient, GcsConfig};
