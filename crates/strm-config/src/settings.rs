//! Typed view of the merged configuration document.

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde_json::Value;

/// Hard floor for stream durations; config may raise it, never lower it.
pub const MIN_DURATION_FLOOR_SECS: u64 = 60;

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_CONFIRM_ATTEMPTS: u32 = 5;
const DEFAULT_CONFIRM_BACKOFF_MS: u64 = 500;
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 30;
const DEFAULT_STALENESS_THRESHOLD_SECS: i64 = 600;

const PAPER_ENDPOINT: &str = "paper://local";
const PAPER_CONTRACT_ID: &str = "paper-stream-contract";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerMode {
    /// In-process deterministic ledger; no network, no signing key.
    Paper,
    Testnet,
    Mainnet,
}

impl LedgerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerMode::Paper => "PAPER",
            LedgerMode::Testnet => "TESTNET",
            LedgerMode::Mainnet => "MAINNET",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PAPER" => Ok(LedgerMode::Paper),
            "TESTNET" => Ok(LedgerMode::Testnet),
            "MAINNET" | "PUBLIC" => Ok(LedgerMode::Mainnet),
            other => bail!(
                "CONFIG_INVALID /ledger/mode: '{other}'; expected one of: PAPER | TESTNET | MAINNET"
            ),
        }
    }

    pub fn requires_signing_key(&self) -> bool {
        !matches!(self, LedgerMode::Paper)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSettings {
    pub mode: LedgerMode,
    pub endpoint: String,
    pub contract_id: String,
    /// Public account that signs submitted transactions.
    pub source_account: Option<String>,
    /// NAME of the env var holding the signing key (never the key itself).
    pub signing_key_env: String,
    pub request_timeout: Duration,
    pub confirm_attempts: u32,
    pub confirm_backoff: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileSettings {
    pub interval: Duration,
    /// Local-only records older than this are flagged by the reconciler.
    pub staleness_threshold_secs: i64,
}

/// Settings the engine reads, extracted from the merged config JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Upper-cased asset codes.
    pub allowed_assets: BTreeSet<String>,
    pub min_duration_secs: u64,
    pub ledger: LedgerSettings,
    pub reconcile: ReconcileSettings,
}

impl StreamConfig {
    pub fn from_json(config: &Value) -> Result<Self> {
        let allowed_assets = read_assets(config)?;

        let min_duration_secs =
            read_u64(config, "/streams/min_duration_secs")?.unwrap_or(MIN_DURATION_FLOOR_SECS);
        if min_duration_secs < MIN_DURATION_FLOOR_SECS {
            bail!(
                "CONFIG_INVALID /streams/min_duration_secs: {min_duration_secs} is below the \
                 floor of {MIN_DURATION_FLOOR_SECS}"
            );
        }

        let mode = match read_str(config, "/ledger/mode") {
            Some(m) => LedgerMode::parse(&m)?,
            None => LedgerMode::Paper,
        };

        let endpoint = match (read_str(config, "/ledger/endpoint"), mode) {
            (Some(e), _) => e,
            (None, LedgerMode::Paper) => PAPER_ENDPOINT.to_string(),
            (None, m) => bail!("CONFIG_MISSING /ledger/endpoint (required in mode={})", m.as_str()),
        };
        let contract_id = match (read_str(config, "/ledger/contract_id"), mode) {
            (Some(c), _) => c,
            (None, LedgerMode::Paper) => PAPER_CONTRACT_ID.to_string(),
            (None, m) => bail!(
                "CONFIG_MISSING /ledger/contract_id (required in mode={})",
                m.as_str()
            ),
        };
        let source_account = read_str(config, "/ledger/source_account");
        if mode.requires_signing_key() && source_account.is_none() {
            bail!(
                "CONFIG_MISSING /ledger/source_account (required in mode={})",
                mode.as_str()
            );
        }

        let signing_key_env = read_str(config, "/ledger/keys_env/signing_key")
            .unwrap_or_else(|| crate::secrets::DEFAULT_SIGNING_KEY_ENV.to_string());

        let confirm_attempts = read_u64(config, "/ledger/confirm_attempts")?
            .map(|v| u32::try_from(v).context("CONFIG_INVALID /ledger/confirm_attempts"))
            .transpose()?
            .unwrap_or(DEFAULT_CONFIRM_ATTEMPTS);

        let ledger = LedgerSettings {
            mode,
            endpoint,
            contract_id,
            source_account,
            signing_key_env,
            request_timeout: Duration::from_millis(
                read_u64(config, "/ledger/request_timeout_ms")?
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
            ),
            confirm_attempts,
            confirm_backoff: Duration::from_millis(
                read_u64(config, "/ledger/confirm_backoff_ms")?
                    .unwrap_or(DEFAULT_CONFIRM_BACKOFF_MS),
            ),
        };

        let interval_secs = read_u64(config, "/reconcile/interval_secs")?
            .unwrap_or(DEFAULT_RECONCILE_INTERVAL_SECS);
        if interval_secs == 0 {
            bail!("CONFIG_INVALID /reconcile/interval_secs: must be > 0");
        }
        let staleness_threshold_secs = read_u64(config, "/reconcile/staleness_threshold_secs")?
            .map(|v| i64::try_from(v).context("CONFIG_INVALID /reconcile/staleness_threshold_secs"))
            .transpose()?
            .unwrap_or(DEFAULT_STALENESS_THRESHOLD_SECS);

        Ok(Self {
            allowed_assets,
            min_duration_secs,
            ledger,
            reconcile: ReconcileSettings {
                interval: Duration::from_secs(interval_secs),
                staleness_threshold_secs,
            },
        })
    }

    pub fn is_asset_allowed(&self, code: &str) -> bool {
        self.allowed_assets
            .contains(&code.trim().to_ascii_uppercase())
    }
}

fn read_assets(config: &Value) -> Result<BTreeSet<String>> {
    let Some(raw) = config.pointer("/assets/allowed") else {
        bail!("CONFIG_MISSING /assets/allowed");
    };
    let Some(items) = raw.as_array() else {
        bail!("CONFIG_INVALID /assets/allowed: expected a list of asset codes");
    };
    let mut out = BTreeSet::new();
    for (i, item) in items.iter().enumerate() {
        let code = item
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .with_context(|| format!("CONFIG_INVALID /assets/allowed/{i}: expected a non-empty string"))?;
        out.insert(code.to_ascii_uppercase());
    }
    if out.is_empty() {
        bail!("CONFIG_INVALID /assets/allowed: at least one asset code is required");
    }
    Ok(out)
}

fn read_str(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn read_u64(config: &Value, pointer: &str) -> Result<Option<u64>> {
    match config.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .with_context(|| format!("CONFIG_INVALID {pointer}: expected a non-negative integer")),
    }
}
