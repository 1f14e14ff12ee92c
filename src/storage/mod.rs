//! Local cache repository.
//!
//! [`CacheStore`] is the typed interface the sync engine writes through;
//! [`SqliteStore`] is the on-disk implementation.

mod sqlite;

pub use sqlite::{SqliteStore, CURRENT_SCHEMA_VERSION};

use rusqlite::types::Value;

use crate::error::Result;
use crate::sync::{RevisionState, SyncKind};
use crate::types::{Environment, Profile, Secret};

// ============================================================================
// Predicates
// ============================================================================

/// Row selector for the secrets table.
#[derive(Debug, Clone, PartialEq)]
pub enum SecretFilter {
    All,
    /// Every row for a name hash, in any environment.
    Hash(String),
    /// The uniqueness key. `environment_hash: None` matches only unbound rows.
    Key {
        secret_hash: String,
        environment_hash: Option<String>,
    },
    EnvironmentHash(String),
    EnvironmentId(String),
    Id(String),
}

impl SecretFilter {
    pub fn key(secret_hash: impl Into<String>, environment_hash: Option<String>) -> Self {
        SecretFilter::Key {
            secret_hash: secret_hash.into(),
            environment_hash,
        }
    }

    pub(crate) fn to_sql(&self) -> (&'static str, Vec<Value>) {
        match self {
            SecretFilter::All => ("1 = 1", vec![]),
            SecretFilter::Hash(hash) => ("secret_hash = ?", vec![Value::Text(hash.clone())]),
            SecretFilter::Key {
                secret_hash,
                environment_hash,
            } => (
                "secret_hash = ? AND environment_hash IS ?",
                vec![
                    Value::Text(secret_hash.clone()),
                    environment_hash.clone().map_or(Value::Null, Value::Text),
                ],
            ),
            SecretFilter::EnvironmentHash(hash) => {
                ("environment_hash = ?", vec![Value::Text(hash.clone())])
            }
            SecretFilter::EnvironmentId(id) => ("environment_id = ?", vec![Value::Text(id.clone())]),
            SecretFilter::Id(id) => ("id = ?", vec![Value::Text(id.clone())]),
        }
    }
}

/// Row selector for the environments table.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvironmentFilter {
    All,
    Hash(String),
    Id(String),
}

impl EnvironmentFilter {
    pub(crate) fn to_sql(&self) -> (&'static str, Vec<Value>) {
        match self {
            EnvironmentFilter::All => ("1 = 1", vec![]),
            EnvironmentFilter::Hash(hash) => ("hash = ?", vec![Value::Text(hash.clone())]),
            EnvironmentFilter::Id(id) => ("id = ?", vec![Value::Text(id.clone())]),
        }
    }
}

// ============================================================================
// CacheStore
// ============================================================================

/// Typed repository over the cache tables.
///
/// Upserts replace any row sharing the record's uniqueness key or id, so a
/// server response always wins over what was cached.
pub trait CacheStore: Send {
    fn upsert_secrets(&self, secrets: &[Secret]) -> Result<()>;
    fn find_secrets(&self, filter: &SecretFilter) -> Result<Vec<Secret>>;
    fn count_secrets(&self, filter: &SecretFilter) -> Result<u64>;
    fn delete_secrets(&self, filter: &SecretFilter) -> Result<usize>;

    fn find_secret(&self, filter: &SecretFilter) -> Result<Option<Secret>> {
        Ok(self.find_secrets(filter)?.into_iter().next())
    }

    fn upsert_environments(&self, environments: &[Environment]) -> Result<()>;
    fn find_environments(&self, filter: &EnvironmentFilter) -> Result<Vec<Environment>>;
    fn count_environments(&self, filter: &EnvironmentFilter) -> Result<u64>;
    fn delete_environments(&self, filter: &EnvironmentFilter) -> Result<usize>;

    fn find_environment(&self, filter: &EnvironmentFilter) -> Result<Option<Environment>> {
        Ok(self.find_environments(filter)?.into_iter().next())
    }

    fn profile(&self) -> Result<Option<Profile>>;
    fn upsert_profile(&self, profile: &Profile) -> Result<()>;

    /// Stored revision state; zeroed when never written.
    fn revision_state(&self, kind: SyncKind) -> Result<RevisionState>;
    fn set_revision_state(&self, kind: SyncKind, state: &RevisionState) -> Result<()>;

    /// Last deletion epoch seen from the service; 0 when never written.
    fn deletion_epoch(&self) -> Result<f64>;
    fn set_deletion_epoch(&self, epoch: f64) -> Result<()>;

    /// Delete every secret and environment row and their revision state.
    fn purge_records(&self) -> Result<()>;
}
