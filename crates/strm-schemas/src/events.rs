//! Event bus payload.
//!
//! One event per committed transition. Repeating an idempotent operation
//! (e.g. a second cancel) publishes nothing.

use serde::{Deserialize, Serialize};

use crate::{Amount, Stream};

/// A single field the reconciler changed on a local record.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub local: String,
    pub remote: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Created {
        stream: Stream,
    },
    Canceled {
        stream_id: String,
        sender: String,
        canceled_at: i64,
    },
    Rescheduled {
        stream_id: String,
        old_start_at: i64,
        new_start_at: i64,
    },
    Claimed {
        stream_id: String,
        recipient: String,
        amount: Amount,
    },
    /// Reconciler applied ledger values to an existing record.
    Reconciled {
        stream_id: String,
        changes: Vec<FieldChange>,
    },
    /// Reconciler inserted a record that existed only on the ledger.
    Recovered {
        stream: Stream,
    },
}

impl StreamEvent {
    pub fn stream_id(&self) -> &str {
        match self {
            StreamEvent::Created { stream } | StreamEvent::Recovered { stream } => &stream.id,
            StreamEvent::Canceled { stream_id, .. }
            | StreamEvent::Rescheduled { stream_id, .. }
            | StreamEvent::Claimed { stream_id, .. }
            | StreamEvent::Reconciled { stream_id, .. } => stream_id,
        }
    }
}
