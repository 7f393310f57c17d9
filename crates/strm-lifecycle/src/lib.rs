//! strm-lifecycle
//!
//! Lifecycle Engine. All transitions follow one discipline: validate
//! locally, submit to the ledger, and only after confirmation write the local
//! record. A failure at any step before confirmation leaves the repository
//! exactly as it was. The engine never retries a refused transaction.
//!
//! A [`PostCommit`] hook, when installed, runs after every local commit while
//! the record's write gate is still held, so callers never observe the
//! committed record before it has been checked against the ledger.

mod engine;
mod error;
mod transition;
mod validate;

pub use engine::{LifecycleEngine, PostCommit};
pub use error::{ErrorKind, RemoteFailureKind, StreamError};
pub use transition::{
    admit, apply_confirmed, ConfirmedTransition, Intent, PendingTransition, Plan,
};
pub use validate::{validate_spec, LifecyclePolicy};
