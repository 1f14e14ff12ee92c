//! Records exchanged with the service and held in the local cache.
//!
//! Sensitive string fields hold envelope strings on the wire and at rest.
//! Every type here implements [`SensitiveFields`] so the field codec can
//! seal or open it in place.

use locker_crypto::{CryptoError, Field, FieldVisitor, SensitiveFields};
use serde::{Deserialize, Serialize};

// ============================================================================
// Cache records
// ============================================================================

/// A secret as listed by the service and stored in the cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Secret {
    pub object: String,
    pub id: String,
    pub creation_date: f64,
    pub revision_date: f64,
    pub updated_date: Option<f64>,
    pub deleted_date: Option<f64>,
    pub last_use_date: Option<f64>,
    pub project_id: i64,
    pub environment_id: Option<String>,
    pub environment_name: Option<String>,
    /// `None` for secrets not bound to an environment.
    pub environment_hash: Option<String>,
    pub key: String,
    pub secret_hash: String,
    pub value: String,
    pub description: String,
}

impl SensitiveFields for Secret {
    fn visit_fields(&mut self, visit: &mut FieldVisitor<'_>) -> Result<(), CryptoError> {
        visit("object", Field::Text(&mut self.object))?;
        visit("id", Field::Text(&mut self.id))?;
        visit("environment_id", Field::OptionalText(&mut self.environment_id))?;
        visit("environment_name", Field::OptionalText(&mut self.environment_name))?;
        visit("environment_hash", Field::OptionalText(&mut self.environment_hash))?;
        visit("key", Field::Text(&mut self.key))?;
        visit("secret_hash", Field::Text(&mut self.secret_hash))?;
        visit("value", Field::Text(&mut self.value))?;
        visit("description", Field::Text(&mut self.description))
    }
}

/// An environment as listed by the service and stored in the cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Environment {
    pub object: String,
    pub id: String,
    pub name: String,
    pub hash: String,
    pub external_url: String,
    pub description: String,
    pub creation_date: f64,
    pub revision_date: f64,
    pub updated_date: Option<f64>,
    pub project_id: i64,
}

impl SensitiveFields for Environment {
    fn visit_fields(&mut self, visit: &mut FieldVisitor<'_>) -> Result<(), CryptoError> {
        visit("object", Field::Text(&mut self.object))?;
        visit("id", Field::Text(&mut self.id))?;
        visit("name", Field::Text(&mut self.name))?;
        visit("hash", Field::Text(&mut self.hash))?;
        visit("external_url", Field::Text(&mut self.external_url))?;
        visit("description", Field::Text(&mut self.description))
    }
}

/// The access key's profile. `project_id` salts every name hash and `key`
/// is the wrapped working key blob.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    pub id: String,
    pub client_id: String,
    pub key: String,
    pub activated: bool,
    pub editable: bool,
    pub restrict_ip: Vec<String>,
    pub creation_date: f64,
    pub revision_date: f64,
    pub expiration_date: Option<f64>,
    pub project_id: i64,
    pub projects: Vec<String>,
}

// ============================================================================
// Wire responses
// ============================================================================

/// One page of a paginated list response.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(default)]
    pub revision_date: f64,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

impl<T> Page<T> {
    /// Cursor for the next page, `None` on the final page.
    pub fn next_cursor(&self) -> Option<&str> {
        self.next.as_deref().filter(|next| !next.is_empty())
    }
}

/// `GET /v1/profile` body.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileResponse {
    #[serde(default)]
    pub object: String,
    pub profile: ProfileBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileBody {
    pub object: String,
    pub id: String,
    pub client_id: String,
    pub key: String,
    pub activated: bool,
    pub editable: bool,
    pub restrict_ip: Vec<String>,
    pub creation_date: f64,
    pub revision_date: f64,
    pub expiration_date: Option<f64>,
    pub project_id: i64,
    pub projects: Vec<String>,
}

impl From<ProfileResponse> for Profile {
    fn from(response: ProfileResponse) -> Self {
        let p = response.profile;
        Profile {
            id: p.id,
            client_id: p.client_id,
            key: p.key,
            activated: p.activated,
            editable: p.editable,
            restrict_ip: p.restrict_ip,
            creation_date: p.creation_date,
            revision_date: p.revision_date,
            expiration_date: p.expiration_date,
            project_id: p.project_id,
            projects: p.projects,
        }
    }
}

/// Plaintext copy of a secret's sensitive fields, echoed by create/update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretData {
    pub key: String,
    pub value: String,
    pub description: String,
}

impl SensitiveFields for SecretData {
    fn visit_fields(&mut self, visit: &mut FieldVisitor<'_>) -> Result<(), CryptoError> {
        visit("key", Field::Text(&mut self.key))?;
        visit("value", Field::Text(&mut self.value))?;
        visit("description", Field::Text(&mut self.description))
    }
}

/// Create/update response for a secret.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretResponse {
    pub object: String,
    pub id: String,
    pub creation_date: f64,
    pub revision_date: f64,
    pub updated_date: Option<f64>,
    pub deleted_date: Option<f64>,
    pub last_use_date: Option<f64>,
    pub key: String,
    pub secret_hash: String,
    pub value: String,
    pub description: String,
    pub data: SecretData,
    pub project_id: i64,
    pub environment_id: Option<String>,
    pub environment_name: Option<String>,
    pub environment_hash: Option<String>,
}

impl SensitiveFields for SecretResponse {
    fn visit_fields(&mut self, visit: &mut FieldVisitor<'_>) -> Result<(), CryptoError> {
        visit("object", Field::Text(&mut self.object))?;
        visit("id", Field::Text(&mut self.id))?;
        visit("key", Field::Text(&mut self.key))?;
        visit("secret_hash", Field::Text(&mut self.secret_hash))?;
        visit("value", Field::Text(&mut self.value))?;
        visit("description", Field::Text(&mut self.description))?;
        visit("data", Field::Nested(&mut self.data))?;
        visit("environment_id", Field::OptionalText(&mut self.environment_id))?;
        visit("environment_name", Field::OptionalText(&mut self.environment_name))?;
        visit("environment_hash", Field::OptionalText(&mut self.environment_hash))
    }
}

impl From<&SecretResponse> for Secret {
    fn from(r: &SecretResponse) -> Self {
        Secret {
            object: r.object.clone(),
            id: r.id.clone(),
            creation_date: r.creation_date,
            revision_date: r.revision_date,
            updated_date: r.updated_date,
            deleted_date: r.deleted_date,
            last_use_date: r.last_use_date,
            project_id: r.project_id,
            environment_id: r.environment_id.clone(),
            environment_name: r.environment_name.clone(),
            environment_hash: r.environment_hash.clone(),
            key: r.key.clone(),
            secret_hash: r.secret_hash.clone(),
            value: r.value.clone(),
            description: r.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentData {
    pub name: String,
    pub external_url: String,
    pub description: String,
}

impl SensitiveFields for EnvironmentData {
    fn visit_fields(&mut self, visit: &mut FieldVisitor<'_>) -> Result<(), CryptoError> {
        visit("name", Field::Text(&mut self.name))?;
        visit("external_url", Field::Text(&mut self.external_url))?;
        visit("description", Field::Text(&mut self.description))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectRef {
    pub id: i64,
    pub name: String,
}

impl SensitiveFields for ProjectRef {
    fn visit_fields(&mut self, visit: &mut FieldVisitor<'_>) -> Result<(), CryptoError> {
        visit("name", Field::Text(&mut self.name))
    }
}

/// Create/update response for an environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentResponse {
    pub object: String,
    pub id: String,
    pub creation_date: f64,
    pub revision_date: f64,
    pub updated_date: Option<f64>,
    pub name: String,
    pub hash: String,
    pub external_url: String,
    pub description: String,
    pub data: EnvironmentData,
    pub project_id: i64,
    pub project: ProjectRef,
}

impl SensitiveFields for EnvironmentResponse {
    fn visit_fields(&mut self, visit: &mut FieldVisitor<'_>) -> Result<(), CryptoError> {
        visit("object", Field::Text(&mut self.object))?;
        visit("id", Field::Text(&mut self.id))?;
        visit("name", Field::Text(&mut self.name))?;
        visit("hash", Field::Text(&mut self.hash))?;
        visit("external_url", Field::Text(&mut self.external_url))?;
        visit("description", Field::Text(&mut self.description))?;
        visit("data", Field::Nested(&mut self.data))?;
        visit("project", Field::Nested(&mut self.project))
    }
}

impl From<&EnvironmentResponse> for Environment {
    fn from(r: &EnvironmentResponse) -> Self {
        Environment {
            object: r.object.clone(),
            id: r.id.clone(),
            name: r.name.clone(),
            hash: r.hash.clone(),
            external_url: r.external_url.clone(),
            description: r.description.clone(),
            creation_date: r.creation_date,
            revision_date: r.revision_date,
            updated_date: r.updated_date,
            project_id: r.project_id,
        }
    }
}

// ============================================================================
// Request payloads
// ============================================================================

/// Create/update payload for a secret.
///
/// On update, `None` fields are left untouched server-side. Setting
/// `environment_name` to `Some("")` clears the environment binding.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SecretInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_name: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hash: String,
}

impl SecretInput {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_environment(mut self, environment_name: impl Into<String>) -> Self {
        self.environment_name = Some(environment_name.into());
        self
    }

    /// True when no caller-settable field is present.
    pub fn is_empty(&self) -> bool {
        self.key.is_none()
            && self.value.is_none()
            && self.description.is_none()
            && self.environment_name.is_none()
    }
}

impl SensitiveFields for SecretInput {
    fn visit_fields(&mut self, visit: &mut FieldVisitor<'_>) -> Result<(), CryptoError> {
        visit("key", Field::OptionalText(&mut self.key))?;
        visit("value", Field::OptionalText(&mut self.value))?;
        visit("description", Field::OptionalText(&mut self.description))?;
        visit("environment_id", Field::OptionalText(&mut self.environment_id))?;
        visit("environment_name", Field::OptionalText(&mut self.environment_name))
    }
}

/// Create/update payload for an environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnvironmentInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub hash: String,
}

impl EnvironmentInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_external_url(mut self, url: impl Into<String>) -> Self {
        self.external_url = Some(url.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.external_url.is_none() && self.description.is_none()
    }
}

impl SensitiveFields for EnvironmentInput {
    fn visit_fields(&mut self, visit: &mut FieldVisitor<'_>) -> Result<(), CryptoError> {
        visit("name", Field::OptionalText(&mut self.name))?;
        visit("external_url", Field::OptionalText(&mut self.external_url))?;
        visit("description", Field::OptionalText(&mut self.description))
    }
}

/// Error body returned by the service for non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerErrorMessage {
    pub code: String,
    pub message: String,
}
