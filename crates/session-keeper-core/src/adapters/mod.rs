//! # Persistence Adapters
//!
//! Infrastructure implementations of the secret persistence interface.

pub mod file_persistence;
pub mod memory_persistence;

pub use file_persistence::FileSecretPersistence;
pub use memory_persistence::InMemorySecretPersistence;
