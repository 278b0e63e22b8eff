//! Business logic services.

pub mod finalize;

pub use finalize::spawn_finalizer;
