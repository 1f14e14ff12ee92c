//! The high-level client: profile, key unwrapping and per-operation
//! preparation shared by the secret and environment operations.

use std::sync::Arc;

use locker_crypto::{derive_root_keys, name_hash, unwrap_working_keys, KeyPair};
use tracing::debug;

use crate::config::{ClientConfig, Credential};
use crate::error::{Error, Result, ResultExt};
use crate::storage::{CacheStore, SqliteStore};
use crate::sync::{FetchOutcome, FetchScope, Operation, SyncEngine, SyncKind, SyncOptions, SyncState};
use crate::transport::{Endpoints, HttpTransport, Transport};
use crate::types::Profile;

/// Client for the Locker secrets service.
///
/// Reads are served from the local cache once the sync engine has brought it
/// up to date; writes go to the service first and the authoritative response
/// is cached. A client is not meant to be shared between threads without
/// external locking.
pub struct SecretsClient {
    credential: Credential,
    engine: SyncEngine,
}

/// Everything an operation body needs after preparation.
pub(crate) struct Prepared {
    /// Name hash of the operation's target; empty for list operations.
    pub hash: String,
    /// Project id salting every name hash.
    pub salt: i64,
    pub keys: KeyPair,
    pub outcome: FetchOutcome,
}

impl Prepared {
    pub fn hash_of(&self, name: &str) -> String {
        name_hash(name, self.salt)
    }
}

impl SecretsClient {
    /// Connect over HTTPS with the on-disk cache at [`ClientConfig::cache_path`].
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config).context("create HTTP transport")?;
        let store = SqliteStore::open(config.cache_path()).context("open cache")?;
        Ok(Self::with_parts(config, Arc::new(transport), Box::new(store)))
    }

    /// Build a client over caller-supplied transport and store.
    pub fn with_parts(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        store: Box<dyn CacheStore>,
    ) -> Self {
        let options = SyncOptions {
            cooldown: config.cooldown,
            force_fetch: config.force_fetch,
        };
        let engine = SyncEngine::new(transport, store, Endpoints::new(&config.api_base), options);
        Self {
            credential: config.credential,
            engine,
        }
    }

    pub fn sync_state(&self, kind: SyncKind) -> SyncState {
        self.engine.sync_state(kind)
    }

    pub fn store(&self) -> &dyn CacheStore {
        self.engine.store()
    }

    pub(crate) fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub(crate) fn engine_mut(&mut self) -> &mut SyncEngine {
        &mut self.engine
    }

    // ========================================================================
    // Preparation
    // ========================================================================

    /// Prepare `kind` for an operation on `name`, or on the whole kind when
    /// `name` is empty.
    pub(crate) fn prepare(&mut self, op: Operation, kind: SyncKind, name: &str) -> Result<Prepared> {
        let profile = self.engine.ensure_profile().context("load profile")?;
        if name.is_empty() {
            return self.prepare_with(op, kind, &profile, String::new(), FetchScope::All);
        }
        let hash = name_hash(name, profile.project_id);
        let scope = FetchScope::Hash(hash.clone());
        self.prepare_with(op, kind, &profile, hash, scope)
    }

    /// Prepare `kind` for an operation over an explicit scope.
    pub(crate) fn prepare_in(
        &mut self,
        op: Operation,
        kind: SyncKind,
        scope: FetchScope,
    ) -> Result<Prepared> {
        let profile = self.engine.ensure_profile().context("load profile")?;
        self.prepare_with(op, kind, &profile, String::new(), scope)
    }

    fn prepare_with(
        &mut self,
        op: Operation,
        kind: SyncKind,
        profile: &Profile,
        hash: String,
        scope: FetchScope,
    ) -> Result<Prepared> {
        let outcome = self
            .engine
            .prepare_data(op, &scope, kind)
            .context(format!("sync {}", kind))?;
        let keys = self.working_keys(&profile.key)?;
        debug!(op = op.as_str(), %kind, ?scope, empty = outcome.empty, "prepared");
        Ok(Prepared {
            hash,
            salt: profile.project_id,
            keys,
            outcome,
        })
    }

    fn working_keys(&self, blob: &str) -> Result<KeyPair> {
        if blob.is_empty() {
            return Err(Error::InvalidAccessKey("profile has no key".into()));
        }
        let stretched = derive_root_keys(self.credential.secret()).context("stretch access key")?;
        unwrap_working_keys(blob, &stretched).context("unwrap project key")
    }
}
