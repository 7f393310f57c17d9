//! strm-ledger
//!
//! Ledger Gateway: the single path from this process to the external ledger.
//!
//! - [`LedgerClient`] is the transport seam (HTTP bridge in production, the
//!   paper ledger in tests). Implementations classify their own failures.
//! - [`LedgerGateway`] owns one client plus fixed settings. It assigns a
//!   transaction reference to every submit and resolves ambiguous outcomes
//!   (timeout after broadcast) by polling the ledger for that reference
//!   before reporting failure, so callers never see "maybe committed".
//! - Lifecycle is explicit: [`LedgerGateway::connect`] (readiness probe) before
//!   use, [`LedgerGateway::shutdown`] on teardown. No module-level state.

mod client;
mod error;
mod gateway;
mod http;
mod types;

pub use client::LedgerClient;
pub use error::{LedgerError, LedgerErrorKind};
pub use gateway::{GatewaySettings, LedgerGateway};
pub use http::{HttpLedgerClient, HttpLedgerConfig};
pub use types::{
    CreateStreamOp, LedgerInfo, LedgerOp, LedgerTx, StreamSnapshot, TxFailure, TxReceipt, TxStatus,
};
