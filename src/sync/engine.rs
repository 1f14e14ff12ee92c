//! Fetch decisions and paginated page walks against the service.
//!
//! Every get/list runs [`SyncEngine::prepare_data`] first. It compares
//! local and remote counts, probes the revision counter (rate-limited by the
//! cooldown), checks the deletion epoch for list scope, and walks pages into
//! the cache when the local view may be behind.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::types::{
    FetchDecision, FetchOutcome, FetchScope, Operation, RevisionSource, RevisionState, SyncKind,
    SyncState,
};
use crate::config::DEFAULT_COOLDOWN;
use crate::error::{Error, Result};
use crate::storage::{CacheStore, EnvironmentFilter, SecretFilter};
use crate::transport::{
    Endpoints, Method, Transport, FETCH_TIMEOUT, REVISION_PROBE_TIMEOUT, WRITE_TIMEOUT,
};
use crate::types::{Environment, Page, Profile, ProfileResponse, Secret};

/// Tuning for [`SyncEngine`].
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Minimum interval between live revision probes per kind (default: 120s).
    pub cooldown: Duration,
    /// Fetch on every prepare regardless of revision state (default: false).
    pub force_fetch: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            force_fetch: false,
        }
    }
}

#[derive(Deserialize)]
struct PageCount {
    #[serde(default)]
    count: u64,
}

/// Current time as fractional unix seconds.
pub fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

fn parse_number(body: &[u8], what: &str) -> Result<f64> {
    std::str::from_utf8(body)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .ok_or_else(|| {
            Error::MalformedData(format!(
                "error parsing {}: {:?}",
                what,
                String::from_utf8_lossy(body)
            ))
        })
}

/// Keeps the local cache consistent with the service.
pub struct SyncEngine {
    transport: Arc<dyn Transport>,
    store: Box<dyn CacheStore>,
    endpoints: Endpoints,
    options: SyncOptions,
    states: HashMap<SyncKind, SyncState>,
}

impl SyncEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Box<dyn CacheStore>,
        endpoints: Endpoints,
        options: SyncOptions,
    ) -> Self {
        Self {
            transport,
            store,
            endpoints,
            options,
            states: HashMap::new(),
        }
    }

    pub fn store(&self) -> &dyn CacheStore {
        self.store.as_ref()
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn sync_state(&self, kind: SyncKind) -> SyncState {
        self.states.get(&kind).copied().unwrap_or_default()
    }

    fn set_state(&mut self, kind: SyncKind, state: SyncState) {
        let previous = self.states.insert(kind, state).unwrap_or_default();
        if previous != state {
            debug!(%kind, from = ?previous, to = ?state, "sync state");
        }
    }

    fn mark_stale(&mut self, kind: SyncKind) {
        let next = self.sync_state(kind).on_stale();
        self.set_state(kind, next);
    }

    // ========================================================================
    // Remote probes
    // ========================================================================

    /// Authoritative row count for `kind`; `None` for kinds without one.
    pub fn remote_count(&self, kind: SyncKind) -> Result<Option<u64>> {
        let Some(url) = self.endpoints.count(kind) else {
            return Ok(None);
        };
        let body = self.transport.get(&url, FETCH_TIMEOUT)?;
        let count = parse_number(&body, "data count")?;
        if count < 0.0 || count.fract() != 0.0 {
            return Err(Error::MalformedData(format!("invalid data count: {}", count)));
        }
        Ok(Some(count as u64))
    }

    fn local_count(&self, kind: SyncKind) -> Result<u64> {
        match kind {
            SyncKind::Secrets => self.store.count_secrets(&SecretFilter::All),
            SyncKind::Environments => self.store.count_environments(&EnvironmentFilter::All),
            SyncKind::Profile => Ok(u64::from(self.store.profile()?.is_some())),
        }
    }

    /// Decide whether `kind` must be fetched before serving `scope`.
    ///
    /// A count mismatch always forces a fetch from revision zero, even inside
    /// the cooldown window. The count covers the whole kind because the
    /// remote count is unscoped.
    pub fn evaluate_fetch(&mut self, scope: &FetchScope, kind: SyncKind) -> Result<FetchDecision> {
        if let Some(remote) = self.remote_count(kind)? {
            let local = self.local_count(kind)?;
            if local != remote {
                debug!(%kind, ?scope, local, remote, "count mismatch, forcing full resync");
                self.mark_stale(kind);
                return Ok(FetchDecision {
                    force_fetch: true,
                    revision: RevisionState::default(),
                    source: RevisionSource::CountMismatch,
                });
            }
        }

        let (revision, newer, source) = self.evaluate_date(kind)?;
        let force_fetch = newer || self.options.force_fetch;
        if force_fetch {
            self.mark_stale(kind);
        }
        debug!(%kind, ?scope, force_fetch, ?source, "fetch decision");
        Ok(FetchDecision {
            force_fetch,
            revision,
            source,
        })
    }

    /// Compare the stored revision state for `kind` with the service.
    ///
    /// Returns the stored state, whether the service is ahead of it, and
    /// where the answer came from. Inside the cooldown window no request is
    /// made. A successful probe records the check time; a failed probe falls
    /// back to the stored state and forces a fetch only if the kind was never
    /// checked.
    pub fn evaluate_date(&self, kind: SyncKind) -> Result<(RevisionState, bool, RevisionSource)> {
        let local = self.store.revision_state(kind)?;
        if local.within_cooldown(self.options.cooldown.as_secs_f64(), now_secs()) {
            return Ok((local, false, RevisionSource::Cooldown));
        }

        let body = match self
            .transport
            .get(&self.endpoints.revision_date(), REVISION_PROBE_TIMEOUT)
        {
            Ok(body) => body,
            Err(err) => {
                warn!(%kind, error = %err, "revision probe failed, using local revision state");
                return Ok((local, !local.has_checked(), RevisionSource::Fallback));
            }
        };
        let remote = parse_number(&body, "revision date")?;
        self.store.set_revision_state(
            kind,
            &RevisionState {
                last_checked: now_secs(),
                ..local
            },
        )?;
        let newer = remote > local.revision || !local.has_checked();
        Ok((local, newer, RevisionSource::Remote))
    }

    /// Check the service's deletion epoch and purge the cache if it advanced.
    ///
    /// Returns `true` when records were purged and a full resync is needed.
    /// A failed probe is logged and treated as "no change".
    pub fn evaluate_deleted_date(&mut self) -> Result<bool> {
        let body = match self
            .transport
            .get(&self.endpoints.deleted_item_date(), FETCH_TIMEOUT)
        {
            Ok(body) => body,
            Err(err) => {
                warn!(error = %err, "deletion epoch probe failed, keeping cached records");
                return Ok(false);
            }
        };
        let remote = parse_number(&body, "deleted date")?;
        let local = self.store.deletion_epoch()?;

        if remote > local {
            info!(local, remote, "deletion epoch advanced, purging cached records");
            self.store.purge_records()?;
            self.store.set_deletion_epoch(remote)?;
            self.mark_stale(SyncKind::Secrets);
            self.mark_stale(SyncKind::Environments);
            return Ok(true);
        }

        self.store.set_deletion_epoch(remote)?;
        Ok(false)
    }

    // ========================================================================
    // Page walk
    // ========================================================================

    /// Bring the cache up to date for `scope` before running `op`.
    ///
    /// List scope always walks (incrementally unless a resync is forced);
    /// narrower scopes walk only when [`Self::evaluate_fetch`] says so.
    pub fn prepare_data(
        &mut self,
        op: Operation,
        scope: &FetchScope,
        kind: SyncKind,
    ) -> Result<FetchOutcome> {
        let mut decision = self.evaluate_fetch(scope, kind)?;
        if scope.is_list() && self.evaluate_deleted_date()? {
            decision.force_fetch = true;
            decision.revision = RevisionState::default();
        }

        if decision.force_fetch || scope.is_list() {
            debug!(op = op.as_str(), %kind, revision = decision.revision.revision, "fetching");
            return self.fetch_data_from_server(scope, &decision.revision, kind);
        }
        Ok(FetchOutcome::default())
    }

    /// Make sure the profile row exists, fetching it on first use.
    pub fn ensure_profile(&mut self) -> Result<Profile> {
        if let Some(profile) = self.store.profile()? {
            return Ok(profile);
        }
        self.fetch_data_from_server(&FetchScope::All, &RevisionState::default(), SyncKind::Profile)?;
        self.store
            .profile()?
            .ok_or_else(|| Error::NotFound("profile".into()))
    }

    /// Walk every page for `kind` in `scope` changed since `revision`,
    /// upserting each page into the cache.
    ///
    /// When the first page is empty the walk restarts once from revision
    /// zero; if that is empty too the outcome is flagged `empty`. The final
    /// page of any walk records the check time; only an unscoped walk also
    /// advances the stored revision.
    pub fn fetch_data_from_server(
        &mut self,
        scope: &FetchScope,
        revision: &RevisionState,
        kind: SyncKind,
    ) -> Result<FetchOutcome> {
        let prior = self.sync_state(kind);
        self.set_state(kind, SyncState::Syncing);
        let result = self.walk_pages(scope, revision, kind);
        let previously_synced = matches!(prior, SyncState::Synced | SyncState::Stale);
        self.set_state(
            kind,
            SyncState::Syncing.on_walk_end(result.is_ok(), previously_synced),
        );
        if let Err(err) = &result {
            warn!(%kind, error = %err, "page walk failed");
        }
        result
    }

    fn walk_pages(
        &self,
        scope: &FetchScope,
        revision: &RevisionState,
        kind: SyncKind,
    ) -> Result<FetchOutcome> {
        let mut outcome = FetchOutcome::default();
        let mut body = self
            .transport
            .get(&self.endpoints.list(kind, scope, revision.revision), FETCH_TIMEOUT)?;

        if kind != SyncKind::Profile && serde_json::from_slice::<PageCount>(&body)?.count == 0 {
            if revision.revision != 0.0 {
                debug!(%kind, "empty first page, retrying from revision zero");
                body = self
                    .transport
                    .get(&self.endpoints.list(kind, scope, 0.0), FETCH_TIMEOUT)?;
            }
            outcome.empty = serde_json::from_slice::<PageCount>(&body)?.count == 0;
        }

        loop {
            outcome.pages += 1;
            let (next, records) = self.apply_page(kind, scope, &body)?;
            outcome.records += records;
            match next {
                Some(cursor) => {
                    body = self
                        .transport
                        .get(&self.endpoints.next_page(&cursor), FETCH_TIMEOUT)?;
                }
                None => break,
            }
        }

        debug!(
            %kind,
            pages = outcome.pages,
            records = outcome.records,
            empty = outcome.empty,
            "page walk complete"
        );
        Ok(outcome)
    }

    /// Upsert one page. Returns the next cursor and the number of records.
    fn apply_page(
        &self,
        kind: SyncKind,
        scope: &FetchScope,
        body: &[u8],
    ) -> Result<(Option<String>, usize)> {
        match kind {
            SyncKind::Secrets => {
                let page: Page<Secret> = serde_json::from_slice(body)?;
                self.store.upsert_secrets(&page.results)?;
                self.finish_page(kind, scope, &page)
            }
            SyncKind::Environments => {
                let page: Page<Environment> = serde_json::from_slice(body)?;
                self.store.upsert_environments(&page.results)?;
                self.finish_page(kind, scope, &page)
            }
            SyncKind::Profile => {
                let response: ProfileResponse = serde_json::from_slice(body)?;
                self.store.upsert_profile(&response.into())?;
                Ok((None, 1))
            }
        }
    }

    fn finish_page<T>(
        &self,
        kind: SyncKind,
        scope: &FetchScope,
        page: &Page<T>,
    ) -> Result<(Option<String>, usize)> {
        let next = page.next_cursor().map(str::to_string);
        if next.is_none() {
            let mut state = self.store.revision_state(kind)?;
            state.last_checked = now_secs();
            if scope.is_list() {
                state.revision = page.revision_date;
                state.last_sync = state.last_checked;
            }
            self.store.set_revision_state(kind, &state)?;
        }
        Ok((next, page.results.len()))
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Send a JSON write and decode the response.
    pub fn send<T: DeserializeOwned>(&self, method: Method, url: &str, body: &[u8]) -> Result<T> {
        let (body, _status) = self.transport.send(method, url, body, WRITE_TIMEOUT)?;
        Ok(serde_json::from_slice(&body)?)
    }
}
