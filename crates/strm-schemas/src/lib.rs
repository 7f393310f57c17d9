//! strm-schemas
//!
//! Shared data model for the stream lifecycle engine: the stored [`Stream`]
//! record, the creation request, the ledger-side view, the derived
//! [`Progress`] snapshot and the event bus payload.
//!
//! Nothing here performs IO. Derived state (status, released amount, ratio)
//! is never stored on [`Stream`]; see `strm-progress`.

mod amount;
mod events;
mod stream;
mod time;

pub use amount::{Amount, AmountParseError, AMOUNT_DECIMALS, AMOUNT_SCALE};
pub use events::{FieldChange, StreamEvent};
pub use stream::{
    Progress, ProgressRatio, RemoteStream, Stream, StreamFilter, StreamSpec, StreamStatus,
};
pub use time::{Clock, ManualClock, SystemClock};
