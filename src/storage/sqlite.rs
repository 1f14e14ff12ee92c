//! SQLite implementation of [`CacheStore`].

use std::path::Path;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::info;

use super::{CacheStore, EnvironmentFilter, SecretFilter};
use crate::error::{Error, Result};
use crate::sync::{RevisionState, SyncKind};
use crate::types::{Environment, Profile, Secret};

/// Bumping this drops and rebuilds every cache table on next open.
pub const CURRENT_SCHEMA_VERSION: i64 = 2;

const CACHE_TABLES: &[&str] = &[
    "secrets",
    "environments",
    "profiles",
    "revision_dates",
    "deletion_dates",
];

/// Tables left behind by earlier cache layouts, dropped on every migrate.
const LEGACY_TABLES: &[&str] = &["secret", "environment", "profile", "date"];

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    slot    INTEGER PRIMARY KEY CHECK (slot = 0),
    version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS secrets (
    id               TEXT PRIMARY KEY,
    object           TEXT NOT NULL DEFAULT '',
    creation_date    REAL NOT NULL DEFAULT 0,
    revision_date    REAL NOT NULL DEFAULT 0,
    updated_date     REAL,
    deleted_date     REAL,
    last_use_date    REAL,
    project_id       INTEGER NOT NULL DEFAULT 0,
    environment_id   TEXT,
    environment_name TEXT,
    environment_hash TEXT,
    key              TEXT NOT NULL,
    secret_hash      TEXT NOT NULL,
    value            TEXT NOT NULL,
    description      TEXT NOT NULL DEFAULT ''
);
CREATE UNIQUE INDEX IF NOT EXISTS secrets_hash_tuple
    ON secrets (secret_hash, environment_hash);

CREATE TABLE IF NOT EXISTS environments (
    id            TEXT PRIMARY KEY,
    object        TEXT NOT NULL DEFAULT '',
    name          TEXT NOT NULL,
    hash          TEXT NOT NULL UNIQUE,
    external_url  TEXT NOT NULL DEFAULT '',
    description   TEXT NOT NULL DEFAULT '',
    creation_date REAL NOT NULL DEFAULT 0,
    revision_date REAL NOT NULL DEFAULT 0,
    updated_date  REAL,
    project_id    INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS profiles (
    slot            INTEGER PRIMARY KEY CHECK (slot = 0),
    id              TEXT NOT NULL,
    client_id       TEXT NOT NULL,
    key             TEXT NOT NULL,
    activated       INTEGER NOT NULL,
    editable        INTEGER NOT NULL,
    restrict_ip     TEXT NOT NULL,
    creation_date   REAL NOT NULL,
    revision_date   REAL NOT NULL,
    expiration_date REAL,
    project_id      INTEGER NOT NULL,
    projects        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS revision_dates (
    kind         TEXT PRIMARY KEY,
    revision     REAL NOT NULL DEFAULT 0,
    last_sync    REAL NOT NULL DEFAULT 0,
    last_checked REAL NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS deletion_dates (
    slot  INTEGER PRIMARY KEY CHECK (slot = 0),
    epoch REAL NOT NULL DEFAULT 0
);
";

const SECRET_COLUMNS: &str = "id, object, creation_date, revision_date, updated_date, \
     deleted_date, last_use_date, project_id, environment_id, environment_name, \
     environment_hash, key, secret_hash, value, description";

const ENVIRONMENT_COLUMNS: &str = "id, object, name, hash, external_url, description, \
     creation_date, revision_date, updated_date, project_id";

/// Cache store backed by one SQLite file per access key.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (creating if needed) the cache file at `path` and migrate it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::PathFailure(format!("{}: {}", parent.display(), e)))?;
        }
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Stored schema version; 0 when the marker table or row is absent.
    pub fn schema_version(&self) -> Result<i64> {
        let marked: bool = self.conn.query_row(
            "SELECT EXISTS (
                 SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'
             )",
            [],
            |row| row.get(0),
        )?;
        if !marked {
            return Ok(0);
        }
        let version = self
            .conn
            .query_row("SELECT version FROM schema_version WHERE slot = 0", [], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(version.unwrap_or(0))
    }

    /// Bring the schema to [`CURRENT_SCHEMA_VERSION`].
    ///
    /// Returns `true` when the cache tables were dropped and rebuilt.
    pub fn migrate(&self) -> Result<bool> {
        let stored = self.schema_version()?;
        let tx = self.conn.unchecked_transaction()?;
        for table in LEGACY_TABLES {
            tx.execute_batch(&format!("DROP TABLE IF EXISTS {};", table))?;
        }

        let rebuild = stored < CURRENT_SCHEMA_VERSION;
        if rebuild {
            info!(from = stored, to = CURRENT_SCHEMA_VERSION, "rebuilding cache schema");
            for table in CACHE_TABLES {
                tx.execute_batch(&format!("DROP TABLE IF EXISTS {};", table))?;
            }
        }
        tx.execute_batch(SCHEMA)?;
        if rebuild {
            tx.execute(
                "INSERT INTO schema_version (slot, version) VALUES (0, ?1)
                 ON CONFLICT(slot) DO UPDATE SET version = excluded.version",
                params![CURRENT_SCHEMA_VERSION],
            )?;
        }
        tx.commit()?;
        Ok(rebuild)
    }
}

fn secret_from_row(row: &Row<'_>) -> rusqlite::Result<Secret> {
    Ok(Secret {
        id: row.get(0)?,
        object: row.get(1)?,
        creation_date: row.get(2)?,
        revision_date: row.get(3)?,
        updated_date: row.get(4)?,
        deleted_date: row.get(5)?,
        last_use_date: row.get(6)?,
        project_id: row.get(7)?,
        environment_id: row.get(8)?,
        environment_name: row.get(9)?,
        environment_hash: row.get(10)?,
        key: row.get(11)?,
        secret_hash: row.get(12)?,
        value: row.get(13)?,
        description: row.get(14)?,
    })
}

fn environment_from_row(row: &Row<'_>) -> rusqlite::Result<Environment> {
    Ok(Environment {
        id: row.get(0)?,
        object: row.get(1)?,
        name: row.get(2)?,
        hash: row.get(3)?,
        external_url: row.get(4)?,
        description: row.get(5)?,
        creation_date: row.get(6)?,
        revision_date: row.get(7)?,
        updated_date: row.get(8)?,
        project_id: row.get(9)?,
    })
}

fn split_list(joined: String) -> Vec<String> {
    if joined.is_empty() {
        Vec::new()
    } else {
        joined.split(',').map(str::to_string).collect()
    }
}

impl CacheStore for SqliteStore {
    fn upsert_secrets(&self, secrets: &[Secret]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut evict = tx.prepare_cached(
                "DELETE FROM secrets
                 WHERE (secret_hash = ?1 AND environment_hash IS ?2) OR id = ?3",
            )?;
            let mut insert = tx.prepare_cached(&format!(
                "INSERT INTO secrets ({}) VALUES
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                SECRET_COLUMNS
            ))?;
            for s in secrets {
                evict.execute(params![s.secret_hash, s.environment_hash, s.id])?;
                insert.execute(params![
                    s.id,
                    s.object,
                    s.creation_date,
                    s.revision_date,
                    s.updated_date,
                    s.deleted_date,
                    s.last_use_date,
                    s.project_id,
                    s.environment_id,
                    s.environment_name,
                    s.environment_hash,
                    s.key,
                    s.secret_hash,
                    s.value,
                    s.description,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn find_secrets(&self, filter: &SecretFilter) -> Result<Vec<Secret>> {
        let (clause, values) = filter.to_sql();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM secrets WHERE {} ORDER BY creation_date, id",
            SECRET_COLUMNS, clause
        ))?;
        let rows = stmt.query_map(params_from_iter(values), secret_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn count_secrets(&self, filter: &SecretFilter) -> Result<u64> {
        let (clause, values) = filter.to_sql();
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM secrets WHERE {}", clause),
            params_from_iter(values),
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn delete_secrets(&self, filter: &SecretFilter) -> Result<usize> {
        let (clause, values) = filter.to_sql();
        Ok(self.conn.execute(
            &format!("DELETE FROM secrets WHERE {}", clause),
            params_from_iter(values),
        )?)
    }

    fn upsert_environments(&self, environments: &[Environment]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut evict =
                tx.prepare_cached("DELETE FROM environments WHERE hash = ?1 OR id = ?2")?;
            let mut insert = tx.prepare_cached(&format!(
                "INSERT INTO environments ({}) VALUES
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                ENVIRONMENT_COLUMNS
            ))?;
            for e in environments {
                evict.execute(params![e.hash, e.id])?;
                insert.execute(params![
                    e.id,
                    e.object,
                    e.name,
                    e.hash,
                    e.external_url,
                    e.description,
                    e.creation_date,
                    e.revision_date,
                    e.updated_date,
                    e.project_id,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn find_environments(&self, filter: &EnvironmentFilter) -> Result<Vec<Environment>> {
        let (clause, values) = filter.to_sql();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM environments WHERE {} ORDER BY creation_date, id",
            ENVIRONMENT_COLUMNS, clause
        ))?;
        let rows = stmt.query_map(params_from_iter(values), environment_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn count_environments(&self, filter: &EnvironmentFilter) -> Result<u64> {
        let (clause, values) = filter.to_sql();
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM environments WHERE {}", clause),
            params_from_iter(values),
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn delete_environments(&self, filter: &EnvironmentFilter) -> Result<usize> {
        let (clause, values) = filter.to_sql();
        let tx = self.conn.unchecked_transaction()?;
        // Secrets bound to a deleted environment go with it.
        tx.execute(
            &format!(
                "DELETE FROM secrets WHERE environment_id IN (SELECT id FROM environments WHERE {})",
                clause
            ),
            params_from_iter(values.iter()),
        )?;
        let deleted = tx.execute(
            &format!("DELETE FROM environments WHERE {}", clause),
            params_from_iter(values.iter()),
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    fn profile(&self) -> Result<Option<Profile>> {
        let profile = self
            .conn
            .query_row(
                "SELECT id, client_id, key, activated, editable, restrict_ip, creation_date,
                        revision_date, expiration_date, project_id, projects
                 FROM profiles WHERE slot = 0",
                [],
                |row| {
                    Ok(Profile {
                        id: row.get(0)?,
                        client_id: row.get(1)?,
                        key: row.get(2)?,
                        activated: row.get(3)?,
                        editable: row.get(4)?,
                        restrict_ip: split_list(row.get(5)?),
                        creation_date: row.get(6)?,
                        revision_date: row.get(7)?,
                        expiration_date: row.get(8)?,
                        project_id: row.get(9)?,
                        projects: split_list(row.get(10)?),
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }

    fn upsert_profile(&self, p: &Profile) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO profiles (slot, id, client_id, key, activated, editable,
                 restrict_ip, creation_date, revision_date, expiration_date, project_id, projects)
             VALUES (0, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                p.id,
                p.client_id,
                p.key,
                p.activated,
                p.editable,
                p.restrict_ip.join(","),
                p.creation_date,
                p.revision_date,
                p.expiration_date,
                p.project_id,
                p.projects.join(","),
            ],
        )?;
        Ok(())
    }

    fn revision_state(&self, kind: SyncKind) -> Result<RevisionState> {
        let state = self
            .conn
            .query_row(
                "SELECT revision, last_sync, last_checked FROM revision_dates WHERE kind = ?1",
                params![kind.as_str()],
                |row| {
                    Ok(RevisionState {
                        revision: row.get(0)?,
                        last_sync: row.get(1)?,
                        last_checked: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(state.unwrap_or_default())
    }

    fn set_revision_state(&self, kind: SyncKind, state: &RevisionState) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO revision_dates (kind, revision, last_sync, last_checked)
             VALUES (?1, ?2, ?3, ?4)",
            params![kind.as_str(), state.revision, state.last_sync, state.last_checked],
        )?;
        Ok(())
    }

    fn deletion_epoch(&self) -> Result<f64> {
        let epoch = self
            .conn
            .query_row("SELECT epoch FROM deletion_dates WHERE slot = 0", [], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(epoch.unwrap_or(0.0))
    }

    fn set_deletion_epoch(&self, epoch: f64) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO deletion_dates (slot, epoch) VALUES (0, ?1)",
            params![epoch],
        )?;
        Ok(())
    }

    fn purge_records(&self) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM secrets", [])?;
        tx.execute("DELETE FROM environments", [])?;
        tx.execute(
            "DELETE FROM revision_dates WHERE kind IN (?1, ?2)",
            params![SyncKind::Secrets.as_str(), SyncKind::Environments.as_str()],
        )?;
        tx.commit()?;
        Ok(())
    }
}
