//! Client SDK for the Locker secrets service.
//!
//! Secrets and environments are end-to-end encrypted with the project's
//! working keys and cached locally in SQLite. [`SecretsClient`] serves reads
//! from the cache once the sync engine has caught it up with the service.

mod client;
pub mod config;
mod environments;
pub mod error;
mod secrets;
pub mod storage;
pub mod sync;
pub mod transport;
pub mod types;

pub use client::SecretsClient;
pub use config::{ClientConfig, Credential};
pub use error::{Error, ErrorKind, Result, ResultExt};
pub use storage::{CacheStore, EnvironmentFilter, SecretFilter, SqliteStore};
pub use sync::{SyncKind, SyncState};
pub use transport::{HttpTransport, Method, Transport, TransportError};
pub use types::{
    Environment, EnvironmentInput, EnvironmentResponse, Profile, Secret, SecretInput,
    SecretResponse,
};

pub use locker_crypto as crypto;
