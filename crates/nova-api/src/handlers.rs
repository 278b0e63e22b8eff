//! Request handlers.

pub mod account;
pub mod generate;
pub mod health;
pub mod store;

pub use account::*;
pub use generate::*;
pub use health::*;
pub use store::*;
