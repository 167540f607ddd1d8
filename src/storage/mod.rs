//! Filesystem state: paths, configuration, credentials, and the snapshot
//! cache.

pub mod cache;
pub mod config;
pub mod credentials;
pub mod paths;

pub use cache::SnapshotCache;
pub use config::{Config, Role};
pub use credentials::{CredentialKind, CredentialSource, CredentialStore, Discovery};
pub use paths::AppPaths;
