//! Client configuration and access credentials.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Default API base for the hosted service.
pub const DEFAULT_API_BASE: &str = "https://api.locker.io/locker_secrets";

/// Environment variable holding the access key id.
pub const ACCESS_KEY_ID_ENV: &str = "LOCKER_ACCESS_KEY_ID";

/// Environment variable holding the base64 secret access key.
pub const ACCESS_KEY_SECRET_ENV: &str = "LOCKER_ACCESS_KEY_SECRET";

/// Minimum time between two live revision-date probes for one kind.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(120);

const DEFAULT_USER_AGENT: &str = concat!("Locker Secrets Rust SDK/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Credential
// ============================================================================

/// Access key pair issued by the service.
///
/// The id doubles as the bearer token and as the cache file name. The secret
/// is decoded once here and wiped when the credential is dropped.
#[derive(Clone)]
pub struct Credential {
    access_key_id: String,
    secret: Zeroizing<Vec<u8>>,
}

#[derive(Deserialize)]
struct CredentialFile {
    access_key_id: String,
    secret_access_key: String,
}

impl Credential {
    /// Build a credential from an id and a base64-encoded secret.
    pub fn new(access_key_id: impl Into<String>, secret_access_key: &str) -> Result<Self> {
        let access_key_id = access_key_id.into();
        if access_key_id.trim().is_empty() {
            return Err(Error::InvalidAccessKey("access key id is empty".into()));
        }
        // The id names the cache file inside the working directory.
        if access_key_id.contains("..")
            || access_key_id
                .chars()
                .any(|c| matches!(c, '/' | '\\' | '\0'))
        {
            return Err(Error::InvalidAccessKey(format!(
                "access key id {:?} is not a valid file name",
                access_key_id
            )));
        }
        if secret_access_key.trim().is_empty() {
            return Err(Error::InvalidAccessKey("secret access key is empty".into()));
        }
        let secret = STANDARD
            .decode(secret_access_key.trim())
            .map_err(|e| Error::InvalidAccessKey(format!("secret access key is not base64: {}", e)))?;
        Ok(Self {
            access_key_id,
            secret: Zeroizing::new(secret),
        })
    }

    /// Read `LOCKER_ACCESS_KEY_ID` and `LOCKER_ACCESS_KEY_SECRET`.
    pub fn from_env() -> Result<Self> {
        let id = std::env::var(ACCESS_KEY_ID_ENV)
            .map_err(|_| Error::InvalidAccessKey(format!("{} is not set", ACCESS_KEY_ID_ENV)))?;
        let secret = Zeroizing::new(
            std::env::var(ACCESS_KEY_SECRET_ENV).map_err(|_| {
                Error::InvalidAccessKey(format!("{} is not set", ACCESS_KEY_SECRET_ENV))
            })?,
        );
        Self::new(id, &secret)
    }

    /// Parse `{"access_key_id": "...", "secret_access_key": "..."}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: CredentialFile = serde_json::from_str(json)
            .map_err(|e| Error::InvalidAccessKey(format!("invalid credential file: {}", e)))?;
        let secret = Zeroizing::new(file.secret_access_key);
        Self::new(file.access_key_id, &secret)
    }

    /// Read a JSON credential file from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::PathFailure(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Decoded secret bytes, the input to key stretching.
    pub fn secret(&self) -> &[u8] {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ClientConfig
// ============================================================================

/// Settings for a [`crate::SecretsClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub credential: Credential,
    /// Service base URL, without trailing slash (default: [`DEFAULT_API_BASE`]).
    pub api_base: String,
    /// Extra headers sent with every request.
    pub headers: BTreeMap<String, String>,
    /// Skip TLS certificate validation (default: false).
    pub accept_invalid_certs: bool,
    /// Directory holding the cache database (default: `$HOME/.locker`).
    pub working_dir: PathBuf,
    /// Revision probe cooldown (default: 120s).
    pub cooldown: Duration,
    /// Force a fetch on every get/list regardless of revision state (default: false).
    pub force_fetch: bool,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            api_base: DEFAULT_API_BASE.to_string(),
            headers: BTreeMap::new(),
            accept_invalid_certs: false,
            working_dir: default_working_dir(),
            cooldown: DEFAULT_COOLDOWN,
            force_fetch: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Credential from the environment, everything else default.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(Credential::from_env()?))
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_force_fetch(mut self, force: bool) -> Self {
        self.force_fetch = force;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// `<working_dir>/<access_key_id>-data.db`
    pub fn cache_path(&self) -> PathBuf {
        self.working_dir
            .join(format!("{}-data.db", self.credential.access_key_id()))
    }
}

fn default_working_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join(".locker")
}
