//! Sync engine vocabulary: record kinds, scopes, revision state, and the
//! per-kind sync state machine.

use std::fmt;

// ============================================================================
// Kinds and scopes
// ============================================================================

/// A family of records synced as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncKind {
    Secrets,
    Environments,
    Profile,
}

impl SyncKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncKind::Secrets => "secrets",
            SyncKind::Environments => "environments",
            SyncKind::Profile => "profile",
        }
    }
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which rows a fetch or lookup covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchScope {
    /// The whole kind. List operations use this scope.
    All,
    /// Rows for one name hash.
    Hash(String),
    /// Secrets bound to one environment id.
    EnvironmentId(String),
}

impl FetchScope {
    pub fn is_list(&self) -> bool {
        matches!(self, FetchScope::All)
    }
}

/// The high-level operation a sync step runs on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Get,
    List,
    Create,
    Update,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::List => "list",
            Operation::Create => "create",
            Operation::Update => "update",
        }
    }
}

// ============================================================================
// Revision state
// ============================================================================

/// Persisted sync progress for one kind.
///
/// `revision` and `last_sync` are written only after a complete unscoped
/// page walk, so an interrupted walk leaves them in place. `last_checked`
/// moves on every successful revision probe and every complete walk, and
/// drives the cooldown.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RevisionState {
    /// Server revision counter at the end of the last complete walk.
    pub revision: f64,
    /// Unix seconds of the last complete walk; 0 if none.
    pub last_sync: f64,
    /// Unix seconds the service was last consulted for this kind; 0 if never.
    pub last_checked: f64,
}

impl RevisionState {
    pub fn has_synced(&self) -> bool {
        self.last_sync > 0.0
    }

    pub fn has_checked(&self) -> bool {
        self.last_checked > 0.0
    }

    /// True while `now` is inside the cooldown window after the last check.
    pub fn within_cooldown(&self, cooldown: f64, now: f64) -> bool {
        self.has_checked() && now < self.last_checked + cooldown
    }
}

/// Where [`FetchDecision::revision`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionSource {
    /// Within the cooldown window; no probe was made.
    Cooldown,
    /// The live revision probe answered.
    Remote,
    /// The probe failed; local state was trusted.
    Fallback,
    /// Local and remote counts disagreed; revision reset to zero.
    CountMismatch,
}

/// Outcome of `evaluate_fetch`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchDecision {
    pub force_fetch: bool,
    /// Revision state to fetch from.
    pub revision: RevisionState,
    pub source: RevisionSource,
}

/// Outcome of a page walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    /// The service has no rows in scope, even from revision zero.
    pub empty: bool,
    pub pages: usize,
    pub records: usize,
}

// ============================================================================
// State machine
// ============================================================================

/// In-memory sync state of one kind.
///
/// `Unsynced → Syncing → Synced`, `Synced → Stale` when staleness is
/// detected, `Stale → Syncing` on the next fetch. A failed walk returns to
/// `Stale` (or `Unsynced` if it never completed before).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncState {
    #[default]
    Unsynced,
    Stale,
    Syncing,
    Synced,
}

impl SyncState {
    /// State after staleness is detected.
    pub fn on_stale(self) -> Self {
        match self {
            SyncState::Synced => SyncState::Stale,
            other => other,
        }
    }

    /// State after a page walk ends.
    pub fn on_walk_end(self, succeeded: bool, previously_synced: bool) -> Self {
        match (succeeded, previously_synced) {
            (true, _) => SyncState::Synced,
            (false, true) => SyncState::Stale,
            (false, false) => SyncState::Unsynced,
        }
    }
}
