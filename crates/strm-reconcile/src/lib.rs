//! strm-reconcile
//!
//! Reconciler: merges the ledger's authoritative stream set into the local
//! repository.
//!
//! - [`merge`] is the whole conflict policy, as a pure function.
//! - [`SnapshotWatermark`] rejects snapshots older than one already merged.
//! - [`Reconciler::sync`] runs one pass and returns a [`SyncReport`].
//!
//! Ledger records that break a domain invariant ([`RecordRules`]) are
//! refused and reported, never stored.
//!
//! Local-only records are never deleted; past the staleness threshold they
//! are flagged in the report.

mod merge;
mod reconciler;
mod report;
mod rules;
mod watermark;

pub use merge::{merge, MergeOutcome};
pub use reconciler::Reconciler;
pub use report::SyncReport;
pub use rules::RecordRules;
pub use watermark::{SnapshotFreshness, SnapshotWatermark};
