pub mod engine;
pub mod types;

pub use engine::{now_secs, SyncEngine, SyncOptions};
pub use types::{
    FetchDecision, FetchOutcome, FetchScope, Operation, RevisionSource, RevisionState, SyncKind,
    SyncState,
};
