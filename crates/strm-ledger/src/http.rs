//! HTTP bridge to the ledger contract RPC.
//!
//! Routes (all JSON):
//! - `GET  {endpoint}/v1/health`
//! - `POST {endpoint}/v1/contracts/{contract_id}/transactions`
//! - `GET  {endpoint}/v1/contracts/{contract_id}/transactions/{tx_ref}`
//! - `GET  {endpoint}/v1/contracts/{contract_id}/streams`
//!
//! The signing key is passed in by the caller and never logged.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{
    LedgerClient, LedgerError, LedgerInfo, LedgerOp, LedgerTx, StreamSnapshot, TxReceipt, TxStatus,
};

#[derive(Clone)]
pub struct HttpLedgerConfig {
    pub endpoint: String,
    pub contract_id: String,
    pub source_account: Option<String>,
    pub signing_key: Option<String>,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for HttpLedgerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLedgerConfig")
            .field("endpoint", &self.endpoint)
            .field("contract_id", &self.contract_id)
            .field("source_account", &self.source_account)
            .field("signing_key", &self.signing_key.as_ref().map(|_| "<REDACTED>"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct HttpLedgerClient {
    cfg: HttpLedgerConfig,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct SubmitBody<'a> {
    tx_ref: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_account: Option<&'a str>,
    op: &'a LedgerOp,
    #[serde(skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

impl HttpLedgerClient {
    pub fn new(cfg: HttpLedgerConfig) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| LedgerError::Transport(format!("http client init failed: {e}")))?;
        Ok(Self { cfg, http })
    }

    fn base(&self) -> &str {
        self.cfg.endpoint.trim_end_matches('/')
    }

    fn contract_url(&self, tail: &str) -> String {
        format!("{}/v1/contracts/{}/{}", self.base(), self.cfg.contract_id, tail)
    }

    /// `hex(sha256(signing_key || tx_ref || op json))`, absent without a key.
    fn sign(&self, tx_ref: &str, op: &LedgerOp) -> Result<Option<String>, LedgerError> {
        let Some(key) = self.cfg.signing_key.as_deref() else {
            return Ok(None);
        };
        let payload = serde_json::to_vec(op).map_err(|e| LedgerError::Decode(e.to_string()))?;
        let mut h = Sha256::new();
        h.update(key.as_bytes());
        h.update(tx_ref.as_bytes());
        h.update(&payload);
        Ok(Some(hex::encode(h.finalize())))
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, LedgerError> {
        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<T>()
                .await
                .map_err(|e| LedgerError::Decode(e.to_string()));
        }
        Err(Self::status_error(status, resp).await)
    }

    async fn status_error(status: StatusCode, resp: reqwest::Response) -> LedgerError {
        if status.is_server_error() {
            return LedgerError::Transport(format!("ledger http status {}", status.as_u16()));
        }
        let body = resp.json::<ErrorBody>().await.unwrap_or(ErrorBody {
            code: format!("HTTP_{}", status.as_u16()),
            message: String::new(),
        });
        if status == StatusCode::CONFLICT {
            LedgerError::ConflictingState {
                code: body.code,
                message: body.message,
            }
        } else {
            LedgerError::Rejected {
                code: body.code,
                message: body.message,
            }
        }
    }
}

fn transport(e: reqwest::Error) -> LedgerError {
    if e.is_timeout() {
        LedgerError::Timeout
    } else if e.is_decode() {
        LedgerError::Decode(e.to_string())
    } else {
        LedgerError::Transport(e.to_string())
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn ping(&self) -> Result<LedgerInfo, LedgerError> {
        let url = format!("{}/v1/health", self.base());
        let resp = self.http.get(url).send().await.map_err(transport)?;
        Self::decode(resp).await
    }

    async fn submit(&self, tx: &LedgerTx) -> Result<TxReceipt, LedgerError> {
        let body = SubmitBody {
            tx_ref: &tx.tx_ref,
            source_account: self.cfg.source_account.as_deref(),
            op: &tx.op,
            signature: self.sign(&tx.tx_ref, &tx.op)?,
        };
        debug!(tx_ref = %tx.tx_ref, op = tx.op.name(), "POST transaction");
        let resp = self
            .http
            .post(self.contract_url("transactions"))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        Self::decode(resp).await
    }

    async fn transaction_status(&self, tx_ref: &str) -> Result<TxStatus, LedgerError> {
        let resp = self
            .http
            .get(self.contract_url(&format!("transactions/{tx_ref}")))
            .send()
            .await
            .map_err(transport)?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(TxStatus::NotFound);
        }
        Self::decode(resp).await
    }

    async fn query_streams(&self) -> Result<StreamSnapshot, LedgerError> {
        let resp = self
            .http
            .get(self.contract_url("streams"))
            .send()
            .await
            .map_err(transport)?;
        Self::decode(resp).await
    }
}
