//! Domain invariants a ledger record must hold before it is stored locally.
//!
//! The contract is authoritative for state, not for shape: a record that
//! breaks an invariant the engine relies on is refused and reported, never
//! inserted or merged.

use std::collections::BTreeSet;

use strm_schemas::RemoteStream;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRules {
    /// Upper-cased.
    pub allowed_assets: BTreeSet<String>,
    pub min_duration_secs: u64,
}

impl RecordRules {
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
            min_duration_secs,
        }
    }

    /// `Err` names the first violated invariant.
    pub fn check(&self, remote: &RemoteStream) -> Result<(), String> {
        if !remote.total_amount.is_positive() {
            return Err(format!("total_amount {} is not positive", remote.total_amount));
        }
        if remote.duration_seconds < self.min_duration_secs {
            return Err(format!(
                "duration_seconds {} is below {}",
                remote.duration_seconds, self.min_duration_secs
            ));
        }
        let asset = remote.asset_code.trim().to_ascii_uppercase();
        if !self.allowed_assets.contains(&asset) {
            return Err(format!("asset '{asset}' is not allow-listed"));
        }
        let overflows = i64::try_from(remote.duration_seconds)
            .ok()
            .and_then(|d| remote.start_at.checked_add(d))
            .is_none();
        if overflows {
            return Err("start_at + duration_seconds overflows".to_string());
        }
        if remote.claimed_amount.base() < 0 || remote.claimed_amount > remote.total_amount {
            return Err(format!(
                "claimed_amount {} is outside [0, {}]",
                remote.claimed_amount, remote.total_amount
            ));
        }
        Ok(())
    }
}
