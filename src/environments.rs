//! Environment operations on [`SecretsClient`].

use locker_crypto::{decrypt_fields, encrypt_fields, FieldMode};
use tracing::info;

use crate::client::{Prepared, SecretsClient};
use crate::error::{Error, Result, ResultExt};
use crate::storage::EnvironmentFilter;
use crate::sync::{FetchScope, Operation, RevisionState, SyncKind};
use crate::transport::Method;
use crate::types::{Environment, EnvironmentInput, EnvironmentResponse};

impl SecretsClient {
    /// Fetch one environment by name, decrypted.
    pub fn get_environment(&mut self, name: &str) -> Result<Environment> {
        if name.is_empty() {
            return Err(Error::InvalidInput("environment name must not be empty".into()));
        }
        let prepared = self.prepare(Operation::Get, SyncKind::Environments, name)?;
        let mut environment = self.lookup_environment(&prepared)?;
        decrypt_fields(&mut environment, &prepared.keys)?;
        Ok(environment)
    }

    /// List every environment, decrypted.
    pub fn list_environments(&mut self) -> Result<Vec<Environment>> {
        let prepared = self.prepare(Operation::List, SyncKind::Environments, "")?;
        if prepared.outcome.empty {
            self.store().delete_environments(&EnvironmentFilter::All)?;
        }

        let mut environments = self.store().find_environments(&EnvironmentFilter::All)?;
        if environments.is_empty() {
            self.engine_mut().fetch_data_from_server(
                &FetchScope::All,
                &RevisionState::default(),
                SyncKind::Environments,
            )?;
            environments = self.store().find_environments(&EnvironmentFilter::All)?;
            if environments.is_empty() {
                return Err(Error::NotFound("no environment found".into()));
            }
        }

        for environment in &mut environments {
            decrypt_fields(environment, &prepared.keys)?;
        }
        Ok(environments)
    }

    /// Create an environment and return the service's record, decrypted.
    pub fn create_environment(&mut self, mut input: EnvironmentInput) -> Result<EnvironmentResponse> {
        let name = match input.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                return Err(Error::InvalidInput(
                    "environment's name must not be empty".into(),
                ))
            }
        };

        let prepared = self.prepare(Operation::Create, SyncKind::Environments, &name)?;
        encrypt_fields(&mut input, &prepared.keys, FieldMode::Create)?;
        input.hash = prepared.hash.clone();

        let body = serde_json::to_vec(&input)?;
        let url = self.engine().endpoints().environments();
        let mut response: EnvironmentResponse = self
            .engine()
            .send(Method::Post, &url, &body)
            .context("create environment")?;

        self.store().upsert_environments(&[Environment::from(&response)])?;
        decrypt_fields(&mut response, &prepared.keys)?;
        info!(id = %response.id, "environment created");
        Ok(response)
    }

    /// Update the environment called `name`. Only the fields set on `input`
    /// change; a new `name` rehashes the environment.
    pub fn update_environment(
        &mut self,
        name: &str,
        mut input: EnvironmentInput,
    ) -> Result<EnvironmentResponse> {
        if name.is_empty() {
            return Err(Error::InvalidInput("environment name must not be empty".into()));
        }
        if input.is_empty() {
            return Err(Error::InvalidInput(
                "there must be at least one field in update data".into(),
            ));
        }

        let prepared = self.prepare(Operation::Update, SyncKind::Environments, name)?;
        let current = self
            .lookup_environment(&prepared)
            .context("resolve environment")?;

        let new_name = input.name.clone().unwrap_or_else(|| name.to_string());
        encrypt_fields(&mut input, &prepared.keys, FieldMode::Update)?;
        input.hash = prepared.hash_of(&new_name);

        let body = serde_json::to_vec(&input)?;
        let url = self.engine().endpoints().environment(&current.id);
        let mut response: EnvironmentResponse = match self.engine().send(Method::Put, &url, &body)
        {
            Ok(response) => response,
            Err(err) if err.status() == Some(404) => {
                info!(id = %current.id, "environment gone from service, dropping cached row");
                self.store()
                    .delete_environments(&EnvironmentFilter::Id(current.id))?;
                return Err(Error::NotFound("no environment found with provided name".into()));
            }
            Err(err) => return Err(err).context("update environment"),
        };

        self.store()
            .upsert_environments(&[Environment::from(&response)])?;
        decrypt_fields(&mut response, &prepared.keys)?;
        Ok(response)
    }

    /// Cached row for the prepared name, fetched from revision zero on a
    /// miss. Still encrypted.
    fn lookup_environment(&mut self, prepared: &Prepared) -> Result<Environment> {
        let filter = EnvironmentFilter::Hash(prepared.hash.clone());
        if prepared.outcome.empty {
            self.store().delete_environments(&filter)?;
        }
        if let Some(environment) = self.store().find_environment(&filter)? {
            return Ok(environment);
        }

        self.engine_mut().fetch_data_from_server(
            &FetchScope::Hash(prepared.hash.clone()),
            &RevisionState::default(),
            SyncKind::Environments,
        )?;
        self.store()
            .find_environment(&filter)?
            .ok_or_else(|| Error::NotFound("no environment found with provided name".into()))
    }
}
