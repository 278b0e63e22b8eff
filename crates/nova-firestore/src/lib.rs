//! Firestore REST API client and billing document store.
//!
//! This crate provides:
//! - A REST client with token caching, retry logic, and metrics
//! - The [`store::DocumentStore`] seam with an in-memory implementation
//!   for tests and local development
//! - Optimistic single-document transactions
//! - Typed repositories for user ledgers and creation records

pub mod client;
pub mod creations_repo;
pub mod error;
pub mod ledger_repo;
pub mod memory;
pub mod metrics;
pub mod retry;
pub mod store;
pub mod token_cache;
pub mod types;


pub use client::{FirestoreClient, FirestoreConfig};
pub use creations_repo::{CreationsRepository, CREATIONS_COLLECTION};
pub use error::{FirestoreError, FirestoreResult};
pub use ledger_repo::{LedgerDecision, LedgerRepository, USERS_COLLECTION};
pub use memory::InMemoryStore;
pub use retry::RetryConfig;
pub use store::{transact, DocumentStore, Snapshot, TxnDecision, TxnError, TxnOptions};
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
