//! Credential storage implementations.

pub mod fs;

#[cfg(feature = "memory")]
pub mod memory;

pub use fs::FileCredentialStore;

#[cfg(feature = "memory")]
pub use memory::MemoryCredentialStore;
