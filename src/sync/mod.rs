//! Source → replica reconciliation.

pub mod commits;
pub mod engine;
pub mod gap;
pub mod items;
pub mod pull_requests;
pub mod replica;

pub use commits::{CommitFields, CommitReconciler};
pub use engine::{
    EngineControl, EngineStatus, Reconciler, ReconciliationEngine, Signal, TickOutcome,
    within_active_hours,
};
pub use gap::{detect_unreviewed_commits, is_gap_candidate};
pub use items::{ExchangeItem, ReplicaMeta, snapshots_match};
pub use pull_requests::{PullRequestFields, PullRequestReconciler};
pub use replica::{CANONICAL_ID_PROPERTY, ReplicaFields, WorkflowReplica};
