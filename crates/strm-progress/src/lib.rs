//! strm-progress
//!
//! Progress Calculator: `(stream, now) -> Progress`.
//!
//! - Linear release, no compounding.
//! - Amounts are integer base units; the only rounding is the floor to the
//!   ledger's native precision.
//! - A canceled stream is frozen at what had been released by
//!   `min(canceled_at, end_at)`.
//!
//! Deterministic, pure logic. No IO, no clock, no shared state; safe to call
//! from any number of readers.

use strm_schemas::{Amount, Progress, ProgressRatio, Stream, StreamStatus};

/// Derive the disbursement snapshot of `stream` at UNIX second `now`.
pub fn calculate_progress(stream: &Stream, now: i64) -> Progress {
    let duration = stream.duration_seconds;

    // Cancellation is checked before the schedule so a stream canceled before
    // it started reports `canceled` with nothing released, never `scheduled`;
    // a repeat cancel on it must see the same terminal state as the first.
    if let Some(canceled_at) = stream.canceled_at {
        let cutoff = canceled_at.min(stream.end_at());
        let elapsed = elapsed_within(stream, cutoff);
        return Progress {
            status: StreamStatus::Canceled,
            released_amount: released_for(stream.total_amount, elapsed, duration),
            progress_ratio: ProgressRatio { elapsed, duration },
        };
    }

    if now < stream.start_at {
        return Progress {
            status: StreamStatus::Scheduled,
            released_amount: Amount::ZERO,
            progress_ratio: ProgressRatio::zero(duration),
        };
    }

    if now >= stream.end_at() {
        return Progress {
            status: StreamStatus::Completed,
            released_amount: released_for(stream.total_amount, duration, duration),
            progress_ratio: ProgressRatio::one(duration),
        };
    }

    let elapsed = elapsed_within(stream, now);
    Progress {
        status: StreamStatus::Active,
        released_amount: released_for(stream.total_amount, elapsed, duration),
        progress_ratio: ProgressRatio { elapsed, duration },
    }
}

/// Derived status only.
pub fn status_of(stream: &Stream, now: i64) -> StreamStatus {
    calculate_progress(stream, now).status
}

/// Released but not yet claimed, floored at zero.
pub fn withdrawable_amount(stream: &Stream, now: i64) -> Amount {
    calculate_progress(stream, now)
        .released_amount
        .saturating_sub_floor_zero(stream.claimed_amount)
}

/// Seconds of disbursement between `start_at` and `t`, clamped to `[0, duration]`.
fn elapsed_within(stream: &Stream, t: i64) -> u64 {
    let raw = t.saturating_sub(stream.start_at);
    if raw <= 0 {
        return 0;
    }
    (raw as u64).min(stream.duration_seconds)
}

/// `floor(total * elapsed / duration)`, clamped to `[0, total]`.
///
/// Split as `total = q*duration + r` so the intermediate product never
/// exceeds `r * elapsed < duration^2`, which always fits in `i128`.
///
/// A non-positive `total` releases nothing.
fn released_for(total: Amount, elapsed: u64, duration: u64) -> Amount {
    if !total.is_positive() {
        return Amount::ZERO;
    }
    if duration == 0 || elapsed >= duration {
        return total;
    }
    let d = duration as i128;
    let e = elapsed as i128;
    let q = total.base().div_euclid(d);
    let r = total.base().rem_euclid(d);
    let base = q * e + (r * e).div_euclid(d);
    Amount::from_base(base).clamp_to(Amount::ZERO, total)
}
