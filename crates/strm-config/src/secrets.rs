//! Runtime secret resolution.
//!
//! # Contract
//! - Config YAML stores only **env var NAMES** (`ledger.keys_env.signing_key`).
//! - At startup, callers invoke [`resolve_secrets_for_mode`] once and pass the
//!   result into constructors; no other code reads these env vars.
//! - `Debug` on [`ResolvedSecrets`] redacts values.
//! - Error messages reference the env var **NAME**, never the value.
//!
//! | Mode    | Required                 |
//! |---------|--------------------------|
//! | MAINNET | ledger signing key       |
//! | TESTNET | ledger signing key       |
//! | PAPER   | nothing                  |

use anyhow::{bail, Result};
use serde_json::Value;

use crate::LedgerMode;

/// Env var consulted when the config does not name one.
pub const DEFAULT_SIGNING_KEY_ENV: &str = "STRM_LEDGER_SIGNING_KEY";

/// Secrets resolved from the environment for one process.
/// **Values are redacted in `Debug` output.**
#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Ledger transaction signing key. `None` if the named env var was absent or empty.
    pub signing_key: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "signing_key",
                &self.signing_key.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

fn signing_key_var(config_json: &Value) -> String {
    config_json
        .pointer("/ledger/keys_env/signing_key")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SIGNING_KEY_ENV)
        .to_string()
}

/// Returns `None` if the variable is unset or blank.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve all secrets needed by `mode`.
///
/// # Errors
/// `SECRETS_MISSING` naming the env var when a required secret is absent.
pub fn resolve_secrets_for_mode(config_json: &Value, mode: LedgerMode) -> Result<ResolvedSecrets> {
    let var = signing_key_var(config_json);
    let signing_key = resolve_env(&var);

    if mode.requires_signing_key() && signing_key.is_none() {
        bail!(
            "SECRETS_MISSING mode={}: required env var '{}' (ledger signing key) is not set or empty",
            mode.as_str(),
            var,
        );
    }

    Ok(ResolvedSecrets { signing_key })
}
