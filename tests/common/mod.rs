//! In-process fake of the secrets service, driven through the `Transport` seam.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use locker_secrets::crypto::{
    decrypt_to_string, derive_root_keys, encrypt_to_string, name_hash, wrap_working_keys, KeyPair,
};
use locker_secrets::storage::SqliteStore;
use locker_secrets::sync::{SyncEngine, SyncOptions};
use locker_secrets::transport::{server_error_message, Endpoints};
use locker_secrets::types::{EnvironmentData, ProjectRef, SecretData};
use locker_secrets::{
    ClientConfig, Credential, Environment, EnvironmentResponse, Method, Secret, SecretResponse,
    SecretsClient, Transport, TransportError,
};
use serde_json::{json, Value};

// ============================================================================
// Fixtures
// ============================================================================

pub const BASE: &str = "http://fake.locker.test/locker_secrets";
pub const ACCESS_KEY_ID: &str = "ak-test";
/// base64("0123456789abcdef0123456789abcdef")
pub const SECRET: &str = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=";
pub const PROJECT_ID: i64 = 42;
pub const START_REVISION: f64 = 1_000.0;

pub fn working_keys() -> KeyPair {
    KeyPair::new([0x11; 32], [0x22; 32])
}

pub fn hash(name: &str) -> String {
    name_hash(name, PROJECT_ID)
}

pub fn seal(plaintext: &str) -> String {
    encrypt_to_string(plaintext, &working_keys()).expect("encrypt")
}

pub fn open(envelope: &str) -> String {
    decrypt_to_string(envelope, &working_keys()).expect("decrypt")
}

pub fn config() -> ClientConfig {
    ClientConfig::new(Credential::new(ACCESS_KEY_ID, SECRET).expect("credential"))
        .with_api_base(BASE)
}

/// Client over the fake service and an in-memory cache.
pub fn client(service: &Arc<FakeService>) -> SecretsClient {
    client_with(service, config())
}

pub fn client_with(service: &Arc<FakeService>, config: ClientConfig) -> SecretsClient {
    let store = SqliteStore::open_in_memory().expect("open in-memory store");
    SecretsClient::with_parts(config, service.clone(), Box::new(store))
}

/// Bare sync engine over the fake service and an in-memory cache.
pub fn engine(service: &Arc<FakeService>, cooldown: Duration) -> SyncEngine {
    let store = SqliteStore::open_in_memory().expect("open in-memory store");
    SyncEngine::new(
        service.clone(),
        Box::new(store),
        Endpoints::new(BASE),
        SyncOptions {
            cooldown,
            force_fetch: false,
        },
    )
}

// ============================================================================
// FakeService
// ============================================================================

pub struct State {
    pub secrets: Vec<Secret>,
    pub environments: Vec<Environment>,
    pub revision: f64,
    pub deletion_epoch: f64,
    /// Server-side cap on page size.
    pub page_size: usize,
    /// List requests for this page number fail with a 500.
    pub fail_page: Option<u32>,
    pub revision_probe_down: bool,
    pub deletion_probe_down: bool,
    /// Ids still listed but answering writes with 404.
    pub vanished: HashSet<String>,
    pub requests: Vec<String>,
    next_id: u64,
}

pub struct FakeService {
    key_blob: String,
    state: Mutex<State>,
}

type Reply = Result<(Vec<u8>, u16), TransportError>;

fn reply(status: u16, body: Value) -> Reply {
    let body = body.to_string().into_bytes();
    if status >= 300 {
        return Err(TransportError::Status {
            status,
            message: server_error_message(&body),
        });
    }
    Ok((body, status))
}

fn text(value: impl ToString) -> Reply {
    Ok((value.to_string().into_bytes(), 200))
}

fn error(status: u16, code: &str, message: &str) -> Reply {
    reply(status, json!({ "code": code, "message": message }))
}

fn split_url(url: &str) -> (String, Vec<(String, String)>) {
    let rest = url.strip_prefix(BASE).unwrap_or(url);
    let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
    let params = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (k.to_string(), v.to_string())
        })
        .collect();
    (path.to_string(), params)
}

fn param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

fn field(body: &Value, name: &str) -> Option<String> {
    body.get(name).and_then(Value::as_str).map(str::to_string)
}

impl FakeService {
    pub fn new() -> Arc<Self> {
        let secret = b"0123456789abcdef0123456789abcdef";
        let stretched = derive_root_keys(secret).expect("stretch");
        let key_blob = wrap_working_keys(&working_keys(), &stretched).expect("wrap");
        Arc::new(Self {
            key_blob,
            state: Mutex::new(State {
                secrets: Vec::new(),
                environments: Vec::new(),
                revision: START_REVISION,
                deletion_epoch: 0.0,
                page_size: 2000,
                fail_page: None,
                revision_probe_down: false,
                deletion_probe_down: false,
                vanished: HashSet::new(),
                requests: Vec::new(),
                next_id: 0,
            }),
        })
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn requests(&self) -> Vec<String> {
        self.state().requests.clone()
    }

    /// Number of logged requests starting with `prefix`, e.g. `"GET /v1/profile"`.
    pub fn count_requests(&self, prefix: &str) -> usize {
        self.state()
            .requests
            .iter()
            .filter(|r| r.starts_with(prefix))
            .count()
    }

    pub fn clear_requests(&self) {
        self.state().requests.clear();
    }

    pub fn revision(&self) -> f64 {
        self.state().revision
    }

    // ------------------------------------------------------------------------
    // Seeding, as another client of the same project would
    // ------------------------------------------------------------------------

    pub fn seed_environment(&self, name: &str) -> String {
        let mut state = self.state();
        state.revision += 1.0;
        state.next_id += 1;
        let environment = Environment {
            object: "environment".into(),
            id: format!("env-{}", state.next_id),
            name: seal(name),
            hash: hash(name),
            external_url: seal(""),
            description: seal(""),
            creation_date: state.revision,
            revision_date: state.revision,
            updated_date: None,
            project_id: PROJECT_ID,
        };
        let id = environment.id.clone();
        state.environments.push(environment);
        id
    }

    pub fn seed_secret(&self, key: &str, value: &str, environment: Option<&str>) -> String {
        let mut state = self.state();
        let bound = environment.map(|name| {
            let env_hash = hash(name);
            state
                .environments
                .iter()
                .find(|e| e.hash == env_hash)
                .cloned()
                .expect("seeded secret's environment exists")
        });
        state.revision += 1.0;
        state.next_id += 1;
        let secret = Secret {
            object: "secret".into(),
            id: format!("sec-{}", state.next_id),
            creation_date: state.revision,
            revision_date: state.revision,
            project_id: PROJECT_ID,
            environment_id: bound.as_ref().map(|e| e.id.clone()),
            environment_name: bound.as_ref().map(|e| e.name.clone()),
            environment_hash: bound.as_ref().map(|e| e.hash.clone()),
            key: seal(key),
            secret_hash: hash(key),
            value: seal(value),
            description: seal(""),
            ..Secret::default()
        };
        let id = secret.id.clone();
        state.secrets.push(secret);
        id
    }

    /// Purge every secret named `key` and advance the deletion epoch.
    pub fn purge_secret(&self, key: &str) {
        let mut state = self.state();
        let secret_hash = hash(key);
        state.secrets.retain(|s| s.secret_hash != secret_hash);
        state.deletion_epoch = state.revision + 0.5;
    }

    // ------------------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------------------

    fn handle_get(&self, url: &str) -> Reply {
        let (path, params) = split_url(url);
        let mut state = self.state();
        state.requests.push(format!("GET {}", url.strip_prefix(BASE).unwrap_or(url)));

        match path.as_str() {
            "/v1/profile" => reply(
                200,
                json!({
                    "object": "profile",
                    "profile": {
                        "object": "profile",
                        "id": "profile-1",
                        "client_id": "client-1",
                        "key": self.key_blob,
                        "activated": true,
                        "editable": true,
                        "restrict_ip": [],
                        "creation_date": 1.0,
                        "revision_date": 1.0,
                        "expiration_date": null,
                        "project_id": PROJECT_ID,
                        "projects": ["p1"]
                    }
                }),
            ),
            "/v1/sync/revision_date" if state.revision_probe_down => {
                Err(TransportError::Network("connection reset".into()))
            }
            "/v1/sync/revision_date" => text(state.revision),
            "/v1/sync/deleted_item_date" if state.deletion_probe_down => {
                Err(TransportError::Network("connection reset".into()))
            }
            "/v1/sync/deleted_item_date" => text(state.deletion_epoch),
            "/v1/sync/secrets/count" => text(state.secrets.len()),
            "/v1/sync/environments/count" => text(state.environments.len()),
            "/v1/secrets" | "/v1/environments" => {
                let page: u32 = param(&params, "page").and_then(|p| p.parse().ok()).unwrap_or(1);
                if state.fail_page == Some(page) {
                    return error(500, "0000", "internal error");
                }
                let since: f64 = param(&params, "revision_date")
                    .and_then(|r| r.parse().ok())
                    .unwrap_or(0.0);
                let hash_filter = param(&params, "hash").unwrap_or("");
                let env_filter = param(&params, "environment_id");

                let rows: Vec<Value> = if path == "/v1/secrets" {
                    state
                        .secrets
                        .iter()
                        .filter(|s| s.revision_date > since)
                        .filter(|s| hash_filter.is_empty() || s.secret_hash == hash_filter)
                        .filter(|s| {
                            env_filter.map_or(true, |id| s.environment_id.as_deref() == Some(id))
                        })
                        .map(|s| serde_json::to_value(s).unwrap())
                        .collect()
                } else {
                    state
                        .environments
                        .iter()
                        .filter(|e| e.revision_date > since)
                        .filter(|e| hash_filter.is_empty() || e.hash == hash_filter)
                        .map(|e| serde_json::to_value(e).unwrap())
                        .collect()
                };

                let size: usize = param(&params, "size")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2000)
                    .min(state.page_size);
                let start = (page as usize - 1) * size;
                let end = (start + size).min(rows.len());
                let next = (end < rows.len()).then(|| {
                    let query: Vec<String> = params
                        .iter()
                        .map(|(k, v)| {
                            if k == "page" {
                                format!("page={}", page + 1)
                            } else {
                                format!("{}={}", k, v)
                            }
                        })
                        .collect();
                    format!("{}?{}", path, query.join("&"))
                });
                reply(
                    200,
                    json!({
                        "count": rows.len(),
                        "next": next,
                        "previous": null,
                        "revision_date": state.revision,
                        "results": rows.get(start.min(rows.len())..end).unwrap_or(&[]),
                    }),
                )
            }
            _ => error(404, "0003", "not found"),
        }
    }

    fn handle_send(&self, method: Method, url: &str, body: &[u8]) -> Reply {
        let (path, _) = split_url(url);
        let body: Value = serde_json::from_slice(body).expect("JSON request body");
        let mut state = self.state();
        state.requests.push(format!("{} {}", method.as_str(), path));

        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        match (method, segments.as_slice()) {
            (Method::Post, ["v1", "secrets"]) => Self::create_secret(&mut state, &body),
            (Method::Put, ["v1", "secrets", id]) => Self::update_secret(&mut state, id, &body),
            (Method::Post, ["v1", "environments"]) => Self::create_environment(&mut state, &body),
            (Method::Put, ["v1", "environments", id]) => {
                Self::update_environment(&mut state, id, &body)
            }
            _ => error(404, "0003", "not found"),
        }
    }

    fn bind(state: &State, secret: &mut Secret, environment_id: Option<String>) -> Result<(), Reply> {
        match environment_id.filter(|id| !id.is_empty()) {
            Some(id) => {
                let Some(env) = state.environments.iter().find(|e| e.id == id) else {
                    return Err(error(400, "0002", "environment not found"));
                };
                secret.environment_id = Some(env.id.clone());
                secret.environment_name = Some(env.name.clone());
                secret.environment_hash = Some(env.hash.clone());
            }
            None => {
                secret.environment_id = None;
                secret.environment_name = None;
                secret.environment_hash = None;
            }
        }
        Ok(())
    }

    fn secret_response(secret: &Secret) -> SecretResponse {
        SecretResponse {
            object: secret.object.clone(),
            id: secret.id.clone(),
            creation_date: secret.creation_date,
            revision_date: secret.revision_date,
            updated_date: secret.updated_date,
            deleted_date: None,
            last_use_date: None,
            key: secret.key.clone(),
            secret_hash: secret.secret_hash.clone(),
            value: secret.value.clone(),
            description: secret.description.clone(),
            data: SecretData {
                key: secret.key.clone(),
                value: secret.value.clone(),
                description: secret.description.clone(),
            },
            project_id: secret.project_id,
            environment_id: secret.environment_id.clone(),
            environment_name: secret.environment_name.clone(),
            environment_hash: secret.environment_hash.clone(),
        }
    }

    fn create_secret(state: &mut State, body: &Value) -> Reply {
        let secret_hash = field(body, "hash").unwrap_or_default();
        let mut secret = Secret {
            object: "secret".into(),
            project_id: PROJECT_ID,
            key: field(body, "key").unwrap_or_default(),
            value: field(body, "value").unwrap_or_default(),
            description: field(body, "description").unwrap_or_default(),
            secret_hash,
            ..Secret::default()
        };
        if let Err(reply) = Self::bind(state, &mut secret, field(body, "environment_id")) {
            return reply;
        }
        // Uniqueness is on (hash, environment); unbound rows never collide.
        if secret.environment_id.is_some()
            && state.secrets.iter().any(|s| {
                s.secret_hash == secret.secret_hash && s.environment_id == secret.environment_id
            })
        {
            return error(400, "0004", "hash already exists");
        }

        state.revision += 1.0;
        state.next_id += 1;
        secret.id = format!("sec-{}", state.next_id);
        secret.creation_date = state.revision;
        secret.revision_date = state.revision;
        let response = Self::secret_response(&secret);
        state.secrets.push(secret);
        reply(201, serde_json::to_value(response).unwrap())
    }

    fn update_secret(state: &mut State, id: &str, body: &Value) -> Reply {
        if state.vanished.contains(id) {
            return error(404, "0003", "secret not found");
        }
        let Some(index) = state.secrets.iter().position(|s| s.id == id) else {
            return error(404, "0003", "secret not found");
        };
        let mut secret = state.secrets[index].clone();
        if let Some(key) = field(body, "key") {
            secret.key = key;
        }
        if let Some(value) = field(body, "value") {
            secret.value = value;
        }
        if let Some(description) = field(body, "description") {
            secret.description = description;
        }
        if let Some(secret_hash) = field(body, "hash") {
            secret.secret_hash = secret_hash;
        }
        if let Some(environment_id) = field(body, "environment_id") {
            if let Err(reply) = Self::bind(state, &mut secret, Some(environment_id)) {
                return reply;
            }
        }

        state.revision += 1.0;
        secret.revision_date = state.revision;
        secret.updated_date = Some(state.revision);
        let response = Self::secret_response(&secret);
        state.secrets[index] = secret;
        reply(200, serde_json::to_value(response).unwrap())
    }

    fn environment_response(environment: &Environment) -> EnvironmentResponse {
        EnvironmentResponse {
            object: environment.object.clone(),
            id: environment.id.clone(),
            creation_date: environment.creation_date,
            revision_date: environment.revision_date,
            updated_date: environment.updated_date,
            name: environment.name.clone(),
            hash: environment.hash.clone(),
            external_url: environment.external_url.clone(),
            description: environment.description.clone(),
            data: EnvironmentData {
                name: environment.name.clone(),
                external_url: environment.external_url.clone(),
                description: environment.description.clone(),
            },
            project_id: environment.project_id,
            project: ProjectRef {
                id: PROJECT_ID,
                name: seal("project"),
            },
        }
    }

    fn create_environment(state: &mut State, body: &Value) -> Reply {
        let env_hash = field(body, "hash").unwrap_or_default();
        if state.environments.iter().any(|e| e.hash == env_hash) {
            return error(400, "0004", "hash already exists");
        }
        state.revision += 1.0;
        state.next_id += 1;
        let environment = Environment {
            object: "environment".into(),
            id: format!("env-{}", state.next_id),
            name: field(body, "name").unwrap_or_default(),
            hash: env_hash,
            external_url: field(body, "external_url").unwrap_or_default(),
            description: field(body, "description").unwrap_or_default(),
            creation_date: state.revision,
            revision_date: state.revision,
            updated_date: None,
            project_id: PROJECT_ID,
        };
        let response = Self::environment_response(&environment);
        state.environments.push(environment);
        reply(201, serde_json::to_value(response).unwrap())
    }

    fn update_environment(state: &mut State, id: &str, body: &Value) -> Reply {
        if state.vanished.contains(id) {
            return error(404, "0003", "environment not found");
        }
        let Some(index) = state.environments.iter().position(|e| e.id == id) else {
            return error(404, "0003", "environment not found");
        };
        state.revision += 1.0;
        let revision = state.revision;
        let environment = &mut state.environments[index];
        if let Some(name) = field(body, "name") {
            environment.name = name;
        }
        if let Some(external_url) = field(body, "external_url") {
            environment.external_url = external_url;
        }
        if let Some(description) = field(body, "description") {
            environment.description = description;
        }
        if let Some(env_hash) = field(body, "hash") {
            environment.hash = env_hash;
        }
        environment.revision_date = revision;
        environment.updated_date = Some(revision);
        let response = Self::environment_response(environment);
        reply(200, serde_json::to_value(response).unwrap())
    }
}

impl Transport for FakeService {
    fn get(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.handle_get(url).map(|(body, _)| body)
    }

    fn send(
        &self,
        method: Method,
        url: &str,
        body: &[u8],
        _timeout: Duration,
    ) -> Result<(Vec<u8>, u16), TransportError> {
        self.handle_send(method, url, body)
    }
}
