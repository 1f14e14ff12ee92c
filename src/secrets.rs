//! Secret operations on [`SecretsClient`].

use locker_crypto::{decrypt_fields, decrypt_to_string, encrypt_fields, FieldMode};
use tracing::{debug, info};

use crate::client::{Prepared, SecretsClient};
use crate::error::{Error, Result, ResultExt};
use crate::storage::SecretFilter;
use crate::sync::{FetchScope, Operation, RevisionState, SyncKind};
use crate::transport::Method;
use crate::types::{Secret, SecretInput, SecretResponse};

const NOT_FOUND: &str = "no secret found with provided name and env";

impl SecretsClient {
    /// Fetch one secret by key, decrypted.
    ///
    /// With `environment`, the secret bound to that environment is returned,
    /// falling back to the unbound secret of the same key when the
    /// environment has none.
    pub fn get_secret(&mut self, key: &str, environment: Option<&str>) -> Result<Secret> {
        if key.is_empty() {
            return Err(Error::InvalidInput("secret key must not be empty".into()));
        }
        let prepared = self.prepare(Operation::Get, SyncKind::Secrets, key)?;
        let mut secret = self.lookup_secret(&prepared, environment)?;
        decrypt_fields(&mut secret, &prepared.keys)?;
        Ok(secret)
    }

    /// List secrets, optionally only those bound to `environment`, decrypted.
    pub fn list_secrets(&mut self, environment: Option<&str>) -> Result<Vec<Secret>> {
        let prepared = self.prepare(Operation::List, SyncKind::Secrets, "")?;
        let filter = match environment.filter(|env| !env.is_empty()) {
            Some(env) => SecretFilter::EnvironmentHash(prepared.hash_of(env)),
            None => SecretFilter::All,
        };
        let mut secrets = self.list_cached(&prepared, &filter, FetchScope::All)?;
        for secret in &mut secrets {
            decrypt_fields(secret, &prepared.keys)?;
        }
        Ok(secrets)
    }

    /// List the secrets bound to the environment called `name`, decrypted.
    pub fn list_secrets_in_environment(&mut self, name: &str) -> Result<Vec<Secret>> {
        let environment = self
            .get_environment(name)
            .context(format!("resolve environment {:?}", name))?;
        let scope = FetchScope::EnvironmentId(environment.id.clone());
        let prepared = self.prepare_in(Operation::List, SyncKind::Secrets, scope.clone())?;
        let filter = SecretFilter::EnvironmentId(environment.id);
        let mut secrets = self.list_cached(&prepared, &filter, scope)?;
        for secret in &mut secrets {
            decrypt_fields(secret, &prepared.keys)?;
        }
        Ok(secrets)
    }

    /// Create a secret and return the service's record, decrypted.
    ///
    /// `input.environment_name`, when set, is resolved to an environment id
    /// first.
    pub fn create_secret(&mut self, mut input: SecretInput) -> Result<SecretResponse> {
        let key = match input.key.as_deref() {
            Some(key) if !key.is_empty() && input.value.is_some() => key.to_string(),
            _ => {
                return Err(Error::InvalidInput(
                    "secret's name and value must not be empty".into(),
                ))
            }
        };

        let prepared = self.prepare(Operation::Create, SyncKind::Secrets, &key)?;
        if input.environment_name.as_deref() == Some("") {
            input.environment_name = None;
        }
        if let Some(name) = input.environment_name.clone() {
            let environment = self
                .get_environment(&name)
                .context(format!("resolve environment {:?}", name))?;
            input.environment_id = Some(environment.id);
        }

        let plain_value = input.value.clone().unwrap_or_default();
        encrypt_fields(&mut input, &prepared.keys, FieldMode::Create)?;
        input.hash = prepared.hash.clone();

        let body = serde_json::to_vec(&input)?;
        let url = self.engine().endpoints().secrets();
        let mut response: SecretResponse = self
            .engine()
            .send(Method::Post, &url, &body)
            .context("create secret")?;

        let row = Secret::from(&response);
        if row.environment_hash.is_none() {
            self.evict_unbound_duplicate(&prepared, &row, &plain_value)?;
        }
        self.store().upsert_secrets(&[row])?;

        decrypt_fields(&mut response, &prepared.keys)?;
        info!(id = %response.id, "secret created");
        Ok(response)
    }

    /// Update the secret `key` (in `environment`, if given).
    ///
    /// Only the fields set on `input` change. `environment_name: Some("")`
    /// unbinds the secret from its environment.
    pub fn update_secret(
        &mut self,
        key: &str,
        environment: Option<&str>,
        mut input: SecretInput,
    ) -> Result<SecretResponse> {
        if key.is_empty() {
            return Err(Error::InvalidInput("secret key must not be empty".into()));
        }
        if input.is_empty() {
            return Err(Error::InvalidInput(
                "there must be at least one field in update data".into(),
            ));
        }

        let prepared = self.prepare(Operation::Update, SyncKind::Secrets, key)?;
        let current = self
            .lookup_secret(&prepared, environment)
            .context("resolve secret")?;

        if let Some(name) = input.environment_name.clone() {
            let environment_id = if name.is_empty() {
                String::new()
            } else {
                self.get_environment(&name)
                    .context(format!("resolve environment {:?}", name))?
                    .id
            };
            input.environment_id = Some(environment_id);
        }

        let new_key = input.key.clone().unwrap_or_else(|| key.to_string());
        encrypt_fields(&mut input, &prepared.keys, FieldMode::Update)?;
        input.hash = prepared.hash_of(&new_key);

        let body = serde_json::to_vec(&input)?;
        let url = self.engine().endpoints().secret(&current.id);
        let mut response: SecretResponse = match self.engine().send(Method::Put, &url, &body) {
            Ok(response) => response,
            Err(err) if err.status() == Some(404) => {
                info!(id = %current.id, "secret gone from service, dropping cached row");
                self.store().delete_secrets(&SecretFilter::Id(current.id))?;
                return Err(Error::NotFound(NOT_FOUND.into()));
            }
            Err(err) => return Err(err).context("update secret"),
        };

        self.store().upsert_secrets(&[Secret::from(&response)])?;
        decrypt_fields(&mut response, &prepared.keys)?;
        Ok(response)
    }

    // ========================================================================
    // Cache lookups
    // ========================================================================

    /// Find the cached row for the prepared key, fetching that key from
    /// revision zero on a miss. The row is returned still encrypted.
    fn lookup_secret(&mut self, prepared: &Prepared, environment: Option<&str>) -> Result<Secret> {
        let environment_hash = environment
            .filter(|env| !env.is_empty())
            .map(|env| prepared.hash_of(env));
        let exact = SecretFilter::key(prepared.hash.as_str(), environment_hash.clone());

        if prepared.outcome.empty {
            self.store().delete_secrets(&exact)?;
        }
        if let Some(secret) = self.store().find_secret(&exact)? {
            return Ok(secret);
        }

        debug!("secret not cached, fetching by hash");
        self.engine_mut().fetch_data_from_server(
            &FetchScope::Hash(prepared.hash.clone()),
            &RevisionState::default(),
            SyncKind::Secrets,
        )?;

        if let Some(secret) = self.store().find_secret(&exact)? {
            return Ok(secret);
        }
        if environment_hash.is_some() {
            let unbound = SecretFilter::key(prepared.hash.as_str(), None);
            if let Some(secret) = self.store().find_secret(&unbound)? {
                return Ok(secret);
            }
        }
        Err(Error::NotFound(NOT_FOUND.into()))
    }

    /// Cached rows matching `filter`; on an empty result, one fetch of
    /// `scope` from revision zero and a retry.
    fn list_cached(
        &mut self,
        prepared: &Prepared,
        filter: &SecretFilter,
        scope: FetchScope,
    ) -> Result<Vec<Secret>> {
        if prepared.outcome.empty {
            self.store().delete_secrets(filter)?;
        }
        let secrets = self.store().find_secrets(filter)?;
        if !secrets.is_empty() {
            return Ok(secrets);
        }

        self.engine_mut()
            .fetch_data_from_server(&scope, &RevisionState::default(), SyncKind::Secrets)?;
        let secrets = self.store().find_secrets(filter)?;
        if secrets.is_empty() {
            return Err(Error::NotFound("no secrets found".into()));
        }
        Ok(secrets)
    }

    /// Drop a cached unbound row for the same key whose value differs from
    /// the one just created. The service's new row replaces it.
    fn evict_unbound_duplicate(
        &self,
        prepared: &Prepared,
        created: &Secret,
        plain_value: &str,
    ) -> Result<()> {
        let unbound = SecretFilter::key(created.secret_hash.as_str(), None);
        let Some(existing) = self.store().find_secret(&unbound)? else {
            return Ok(());
        };
        if existing.id == created.id {
            return Ok(());
        }
        if decrypt_to_string(&existing.value, &prepared.keys)? != plain_value {
            debug!(id = %existing.id, "evicting unbound secret with stale value");
            self.store().delete_secrets(&SecretFilter::Id(existing.id))?;
        }
        Ok(())
    }
}
