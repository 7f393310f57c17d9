//! Process-level wiring from configuration files.

use std::sync::Arc;

use anyhow::{Context, Result};
use strm_config::{
    load_layered_yaml, report_unused_keys, resolve_secrets_for_mode, LedgerMode, ResolvedSecrets,
    StreamConfig, UnusedKeyPolicy,
};
use strm_ledger::{HttpLedgerClient, HttpLedgerConfig, LedgerClient};
use strm_ledger_paper::PaperLedger;
use strm_schemas::Clock;
use tracing::{info, warn};

use crate::{RunningService, StreamService};

/// Build the ledger transport the configured mode calls for.
pub fn build_ledger_client(
    cfg: &StreamConfig,
    secrets: &ResolvedSecrets,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn LedgerClient>> {
    match cfg.ledger.mode {
        LedgerMode::Paper => Ok(Arc::new(PaperLedger::new(
            cfg.ledger.contract_id.clone(),
            clock,
        ))),
        LedgerMode::Testnet | LedgerMode::Mainnet => {
            let client = HttpLedgerClient::new(HttpLedgerConfig {
                endpoint: cfg.ledger.endpoint.clone(),
                contract_id: cfg.ledger.contract_id.clone(),
                source_account: cfg.ledger.source_account.clone(),
                signing_key: secrets.signing_key.clone(),
                request_timeout: cfg.ledger.request_timeout,
            })
            .context("ledger http client init failed")?;
            Ok(Arc::new(client))
        }
    }
}

/// Load layered config, resolve secrets, connect, run the initial sync and
/// start the periodic reconcile loop.
pub async fn start_from_config_files(
    paths: &[&str],
    unused_keys: UnusedKeyPolicy,
    clock: Arc<dyn Clock>,
) -> Result<RunningService> {
    let loaded = load_layered_yaml(paths).context("config load failed")?;
    let unused = report_unused_keys(&loaded.config_json, unused_keys)?;
    for p in &unused.unused_leaf_pointers {
        warn!(pointer = %p, "config key is not read by anything");
    }

    let cfg = StreamConfig::from_json(&loaded.config_json)?;
    let secrets = resolve_secrets_for_mode(&loaded.config_json, cfg.ledger.mode)?;
    info!(
        config_hash = %loaded.config_hash,
        mode = cfg.ledger.mode.as_str(),
        contract_id = %cfg.ledger.contract_id,
        secrets = ?secrets,
        "configuration loaded"
    );

    let client = build_ledger_client(&cfg, &secrets, clock.clone())?;
    StreamService::serve(cfg, client, clock).await
}
