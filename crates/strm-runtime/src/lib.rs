//! strm-runtime
//!
//! Service facade over the lifecycle engine, reconciler and repository,
//! plus the startup sequence and the periodic reconcile loop.
//!
//! Startup order: load config → connect ledger gateway → initial sync →
//! serve. A process that cannot complete the initial sync does not serve.
//! Every committed write is reconciled against the ledger before it is
//! visible; a periodic pass covers changes made directly on-chain.

mod boot;
mod health;
mod service;
mod tick;

pub use boot::{build_ledger_client, start_from_config_files};
pub use health::ReconcileHealth;
pub use service::{gateway_settings, init_ledger, RunningService, StreamService};
pub use tick::spawn_reconcile_loop;

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the default
/// `info` filter. Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .try_init();
}
