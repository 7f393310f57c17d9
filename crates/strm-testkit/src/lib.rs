//! Shared fixtures for cross-crate scenario tests.

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use strm_config::{load_layered_yaml_from_strings, StreamConfig};
use strm_ledger::StreamSnapshot;
use strm_ledger_paper::PaperLedger;
use strm_runtime::StreamService;
use strm_schemas::{Amount, ManualClock, StreamSpec};

/// Fixed epoch all scenarios start from.
pub const T0: i64 = 1_700_000_000;

pub const TEST_CONFIG_YAML: &str = r#"
assets:
  allowed: [USDC, XLM, EURC]
ledger:
  mode: PAPER
  request_timeout_ms: 1000
  confirm_attempts: 2
  confirm_backoff_ms: 1
reconcile:
  interval_secs: 30
  staleness_threshold_secs: 600
streams:
  min_duration_secs: 60
"#;

pub fn test_config() -> Result<StreamConfig> {
    let loaded = load_layered_yaml_from_strings(&[TEST_CONFIG_YAML])?;
    StreamConfig::from_json(&loaded.config_json)
}

/// Builder for creation requests with sensible defaults
/// (150 USDC over one day, starting now).
#[derive(Debug, Clone)]
pub struct SpecBuilder {
    spec: StreamSpec,
}

impl Default for SpecBuilder {
    fn default() -> Self {
        Self {
            spec: StreamSpec {
                sender: "GSENDER".to_string(),
                recipient: "GRECIP".to_string(),
                asset_code: "USDC".to_string(),
                total_amount: Amount::from_base(150 * strm_schemas::AMOUNT_SCALE),
                duration_seconds: 86_400,
                start_at: None,
            },
        }
    }
}

impl SpecBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sender(mut self, v: &str) -> Self {
        self.spec.sender = v.to_string();
        self
    }

    pub fn recipient(mut self, v: &str) -> Self {
        self.spec.recipient = v.to_string();
        self
    }

    pub fn asset(mut self, v: &str) -> Self {
        self.spec.asset_code = v.to_string();
        self
    }

    pub fn total_units(mut self, units: i64) -> Self {
        self.spec.total_amount = Amount::from_base(i128::from(units) * strm_schemas::AMOUNT_SCALE);
        self
    }

    pub fn total(mut self, amount: Amount) -> Self {
        self.spec.total_amount = amount;
        self
    }

    pub fn duration(mut self, secs: u64) -> Self {
        self.spec.duration_seconds = secs;
        self
    }

    pub fn start_at(mut self, ts: i64) -> Self {
        self.spec.start_at = Some(ts);
        self
    }

    pub fn build(self) -> StreamSpec {
        self.spec
    }
}

/// A started service over a paper ledger, sharing one manual clock.
pub struct TestBed {
    pub clock: Arc<ManualClock>,
    pub ledger: Arc<PaperLedger>,
    pub service: Arc<StreamService>,
}

impl TestBed {
    pub async fn start() -> Result<Self> {
        let clock = Arc::new(ManualClock::new(T0));
        let ledger = Arc::new(PaperLedger::new("paper-stream-contract", clock.clone()));
        Self::start_with(clock, ledger).await
    }

    /// Start over a ledger the caller may have pre-populated.
    pub async fn start_with(clock: Arc<ManualClock>, ledger: Arc<PaperLedger>) -> Result<Self> {
        let service = StreamService::start(test_config()?, ledger.clone(), clock.clone()).await?;
        Ok(Self {
            clock,
            ledger,
            service,
        })
    }

    /// Same ledger and clock, fresh process (empty repository).
    pub async fn restart(&self) -> Result<Self> {
        self.service.shutdown();
        Self::start_with(self.clock.clone(), self.ledger.clone()).await
    }
}

pub fn load_snapshot_json(path: &str) -> Result<StreamSnapshot> {
    let s = fs::read_to_string(path).with_context(|| format!("read snapshot: {path}"))?;
    let snap: StreamSnapshot = serde_json::from_str(&s).context("parse snapshot json")?;
    Ok(snap)
}
