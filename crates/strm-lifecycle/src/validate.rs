//! Domain re-validation of creation requests.
//!
//! The boundary layer has already checked shape; these checks hold regardless
//! of who calls the engine. All of them are local: a request that fails here
//! never reaches the ledger.

use std::collections::BTreeSet;

use strm_config::{StreamConfig, MIN_DURATION_FLOOR_SECS};
use strm_ledger::CreateStreamOp;
use strm_schemas::StreamSpec;

use crate::StreamError;

/// Rules the engine enforces on every creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecyclePolicy {
    /// Upper-cased.
    pub allowed_assets: BTreeSet<String>,
    pub min_duration_secs: u64,
}

impl LifecyclePolicy {
    pub fn from_config(cfg: &StreamConfig) -> Self {
        Self {
            allowed_assets: cfg.allowed_assets.clone(),
            min_duration_secs: cfg.min_duration_secs.max(MIN_DURATION_FLOOR_SECS),
        }
    }

    pub fn new<I, S>(assets: I, min_duration_secs: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_assets: assets
                .into_iter()
                .map(|a| a.as_ref().trim().to_ascii_uppercase())
                .collect(),
            min_duration_secs: min_duration_secs.max(MIN_DURATION_FLOOR_SECS),
        }
    }
}

fn account(field: &'static str, raw: &str) -> Result<String, StreamError> {
    let v = raw.trim();
    if v.is_empty() {
        return Err(StreamError::validation(field, "must not be empty"));
    }
    Ok(v.to_string())
}

/// Check `spec` against `policy` at engine time `now` and build the contract call.
///
/// A missing `start_at` means "now". The asset code is normalised to upper case.
pub fn validate_spec(
    spec: &StreamSpec,
    policy: &LifecyclePolicy,
    now: i64,
) -> Result<CreateStreamOp, StreamError> {
    let sender = account("sender", &spec.sender)?;
    let recipient = account("recipient", &spec.recipient)?;
    if sender == recipient {
        return Err(StreamError::validation(
            "recipient",
            "recipient must differ from sender",
        ));
    }

    let asset_code = spec.asset_code.trim().to_ascii_uppercase();
    if !policy.allowed_assets.contains(&asset_code) {
        return Err(StreamError::validation(
            "asset_code",
            format!("asset '{asset_code}' is not allow-listed"),
        ));
    }

    if !spec.total_amount.is_positive() {
        return Err(StreamError::validation(
            "total_amount",
            "must be greater than zero",
        ));
    }

    if spec.duration_seconds < policy.min_duration_secs {
        return Err(StreamError::validation(
            "duration_seconds",
            format!("must be at least {}", policy.min_duration_secs),
        ));
    }
    let duration = i64::try_from(spec.duration_seconds)
        .map_err(|_| StreamError::validation("duration_seconds", "out of range"))?;

    let start_at = spec.start_at.unwrap_or(now);
    if start_at < now {
        return Err(StreamError::validation(
            "start_at",
            "must not be in the past",
        ));
    }
    if start_at.checked_add(duration).is_none() {
        return Err(StreamError::validation(
            "start_at",
            "start_at + duration_seconds overflows",
        ));
    }

    Ok(CreateStreamOp {
        sender,
        recipient,
        asset_code,
        total_amount: spec.total_amount,
        duration_seconds: spec.duration_seconds,
        start_at,
    })
}
