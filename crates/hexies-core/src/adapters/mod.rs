//! Concrete implementations of the collaborator traits

pub mod file_cache;
pub mod memory_cache;
#[cfg(feature = "remote-backend")]
pub mod remote_backend;

pub use file_cache::FileCatalogCache;
pub use memory_cache::MemoryCatalogCache;
#[cfg(feature = "remote-backend")]
pub use remote_backend::{RemoteBackendClient, RemoteBackendConfig};
