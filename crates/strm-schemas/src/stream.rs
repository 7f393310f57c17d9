use serde::{Deserialize, Serialize};

use crate::Amount;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Derived disbursement status. Never stored; computed from schedule + time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Scheduled,
    Active,
    Completed,
    Canceled,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamStatus::Scheduled => "scheduled",
            StreamStatus::Active => "active",
            StreamStatus::Completed => "completed",
            StreamStatus::Canceled => "canceled",
        }
    }

    /// `true` once the stream can no longer change disbursement.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamStatus::Completed | StreamStatus::Canceled)
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Exact `elapsed / duration` ratio in `[0, 1]`.
///
/// Kept as a rational so callers can compare it exactly; [`as_f64`]
/// is for display only.
///
/// [`as_f64`]: ProgressRatio::as_f64
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgressRatio {
    pub elapsed: u64,
    pub duration: u64,
}

impl ProgressRatio {
    pub fn zero(duration: u64) -> Self {
        Self {
            elapsed: 0,
            duration,
        }
    }

    pub fn one(duration: u64) -> Self {
        Self {
            elapsed: duration,
            duration,
        }
    }

    pub fn as_f64(&self) -> f64 {
        if self.duration == 0 {
            return 0.0;
        }
        self.elapsed as f64 / self.duration as f64
    }
}

/// Snapshot returned by the progress calculator for a `(stream, now)` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub status: StreamStatus,
    pub released_amount: Amount,
    pub progress_ratio: ProgressRatio,
}

// ---------------------------------------------------------------------------
// Creation request
// ---------------------------------------------------------------------------

/// Already shape-checked creation request handed in by the boundary layer.
///
/// `start_at = None` means "start now" (resolved against the engine clock).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSpec {
    pub sender: String,
    pub recipient: String,
    pub asset_code: String,
    pub total_amount: Amount,
    pub duration_seconds: u64,
    #[serde(default)]
    pub start_at: Option<i64>,
}

// ---------------------------------------------------------------------------
// Stored record
// ---------------------------------------------------------------------------

/// The local replica of one stream.
///
/// Only the immutable schedule, the cancellation timestamp, the claimed total
/// and bookkeeping are stored. Status, released amount and ratio are derived.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    /// Ledger-assigned identifier; Repository key and ledger correlation key.
    pub id: String,
    pub sender: String,
    pub recipient: String,
    pub asset_code: String,
    pub total_amount: Amount,
    pub duration_seconds: u64,
    /// UNIX seconds. Mutable only while the derived status is `scheduled`.
    pub start_at: i64,
    /// Set exactly once; never cleared.
    pub canceled_at: Option<i64>,
    /// Total already withdrawn by the recipient.
    #[serde(default)]
    pub claimed_amount: Amount,
    /// Ledger sequence of the last remote state applied to this record.
    pub version: u64,
    /// Clock time of the last reconcile pass that saw this record on the ledger.
    pub last_synced_at: Option<i64>,
    /// Clock time at which this replica first recorded the stream.
    pub recorded_at: i64,
}

impl Stream {
    /// UNIX seconds at which disbursement finishes.
    pub fn end_at(&self) -> i64 {
        self.start_at.saturating_add(self.duration_seconds as i64)
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled_at.is_some()
    }

    /// Build a local record from the ledger-side view (used by recovery).
    pub fn from_remote(remote: &RemoteStream, now: i64) -> Self {
        Self {
            id: remote.id.clone(),
            sender: remote.sender.clone(),
            recipient: remote.recipient.clone(),
            asset_code: remote.asset_code.clone(),
            total_amount: remote.total_amount,
            duration_seconds: remote.duration_seconds,
            start_at: remote.start_at,
            canceled_at: remote.canceled_at,
            claimed_amount: remote.claimed_amount,
            version: remote.ledger_seq,
            last_synced_at: Some(now),
            recorded_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Ledger-side record
// ---------------------------------------------------------------------------

/// Stream state as reported by the ledger contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStream {
    pub id: String,
    pub sender: String,
    pub recipient: String,
    pub asset_code: String,
    pub total_amount: Amount,
    pub duration_seconds: u64,
    pub start_at: i64,
    #[serde(default)]
    pub canceled_at: Option<i64>,
    #[serde(default)]
    pub claimed_amount: Amount,
    /// Ledger sequence at which this view was read.
    pub ledger_seq: u64,
}

// ---------------------------------------------------------------------------
// Listing filter
// ---------------------------------------------------------------------------

/// Optional conjunctive filter for listing streams.
///
/// `status` is matched against the derived status at call time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFilter {
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub asset_code: Option<String>,
    #[serde(default)]
    pub status: Option<StreamStatus>,
}

impl StreamFilter {
    /// Match the stored (non-derived) fields only.
    pub fn matches_record(&self, s: &Stream) -> bool {
        self.sender.as_deref().map_or(true, |v| v == s.sender)
            && self.recipient.as_deref().map_or(true, |v| v == s.recipient)
            && self
                .asset_code
                .as_deref()
                .map_or(true, |v| v.eq_ignore_ascii_case(&s.asset_code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote() -> RemoteStream {
        RemoteStream {
            id: "s-1".to_string(),
            sender: "GSENDER".to_string(),
            recipient: "GRECIP".to_string(),
            asset_code: "USDC".to_string(),
            total_amount: Amount::from_units(100).unwrap(),
            duration_seconds: 3_600,
            start_at: 1_000,
            canceled_at: None,
            claimed_amount: Amount::ZERO,
            ledger_seq: 42,
        }
    }

    #[test]
    fn from_remote_copies_schedule_and_version() {
        let s = Stream::from_remote(&remote(), 5_000);
        assert_eq!(s.id, "s-1");
        assert_eq!(s.version, 42);
        assert_eq!(s.last_synced_at, Some(5_000));
        assert_eq!(s.end_at(), 4_600);
        assert!(!s.is_canceled());
    }

    #[test]
    fn filter_matches_asset_case_insensitively() {
        let s = Stream::from_remote(&remote(), 0);
        let f = StreamFilter {
            asset_code: Some("usdc".to_string()),
            ..Default::default()
        };
        assert!(f.matches_record(&s));
        let f = StreamFilter {
            sender: Some("GOTHER".to_string()),
            ..Default::default()
        };
        assert!(!f.matches_record(&s));
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&StreamStatus::Canceled).unwrap();
        assert_eq!(json, "\"canceled\"");
    }
}
