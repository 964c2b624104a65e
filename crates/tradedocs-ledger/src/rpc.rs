//! JSON-RPC implementation of [`DocumentLedger`] against a registry node.
//!
//! The node fronts the document-registry contract and exposes
//! `registry_*` methods; transaction methods return only once the
//! transaction is confirmed.  Contract encoding itself lives in the node,
//! outside this repository.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use tradedocs_shared::constants::GAS_PRICE_REFRESH;

use crate::client::{CreateReceipt, DocumentLedger, TxReceipt};
use crate::error::LedgerError;
use crate::events::{EventSubscription, LedgerEvent};
use crate::gas::{limit_with_margin, GasPriceCache};
use crate::address;

/// Interval between head checks on the live subscription pump.
const LIVE_POLL_INTERVAL: Duration = Duration::from_secs(2);

struct Inner {
    http: reqwest::Client,
    endpoint: String,
    gas: GasPriceCache,
}

/// [`DocumentLedger`] over a registry node's JSON-RPC endpoint.
#[derive(Clone)]
pub struct RpcLedger {
    inner: Arc<Inner>,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

impl RpcLedger {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                http: reqwest::Client::new(),
                endpoint: endpoint.into(),
                gas: GasPriceCache::new(),
            }),
        }
    }

    /// Spawn the periodic gas price refresh task.  The cache serves
    /// [`crate::gas::DEFAULT_GAS_PRICE`] until the first successful refresh.
    pub fn spawn_gas_refresher(&self) -> JoinHandle<()> {
        let ledger = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(GAS_PRICE_REFRESH);
            loop {
                interval.tick().await;
                ledger.refresh_gas_price().await;
            }
        })
    }

    async fn refresh_gas_price(&self) {
        match self.call::<u64>("registry_gasPrice", json!([])).await {
            Ok(observed) => {
                self.inner.gas.update_observed(observed);
                debug!(price = self.inner.gas.get(), "refreshed gas price");
            }
            Err(e) => {
                warn!(error = %e, "gas price refresh failed, keeping cached value");
            }
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, LedgerError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response: RpcResponse<T> = self
            .inner
            .http
            .post(&self.inner.endpoint)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(map_rpc_error(err.code, &err.message));
        }

        response
            .result
            .ok_or_else(|| LedgerError::MalformedResponse(format!("{method}: empty result")))
    }

    /// The configured signing account, or [`LedgerError::NoSigningAccount`].
    async fn signer(&self) -> Result<String, LedgerError> {
        let accounts: Vec<String> = self.call("registry_accounts", json!([])).await?;
        accounts
            .into_iter()
            .next()
            .ok_or(LedgerError::NoSigningAccount)
    }

    async fn estimate_gas(&self, call: Value) -> Result<u64, LedgerError> {
        self.call::<u64>("registry_estimateGas", json!([call]))
            .await
            .map_err(|e| match e {
                LedgerError::Transport(t) => LedgerError::Transport(t),
                other => LedgerError::GasEstimation(other.to_string()),
            })
    }
}

/// RPC errors carrying a revert reason are distinguished from plumbing
/// failures so the job error message reflects the real cause.
fn map_rpc_error(code: i64, message: &str) -> LedgerError {
    if message.to_lowercase().contains("revert") {
        LedgerError::Reverted(message.to_string())
    } else {
        LedgerError::Rpc(format!("{message} (code {code})"))
    }
}

#[async_trait]
impl DocumentLedger for RpcLedger {
    async fn create_document(
        &self,
        category: u8,
        document_hash: &str,
        expires_at: i64,
    ) -> Result<CreateReceipt, LedgerError> {
        let from = self.signer().await?;
        let call = json!({
            "method": "createDocument",
            "from": from,
            "category": category,
            "documentHash": document_hash,
            "expiresAt": expires_at,
        });
        let estimate = self.estimate_gas(call.clone()).await?;

        let mut tx = call;
        tx["gas"] = json!(limit_with_margin(estimate));
        tx["gasPrice"] = json!(self.inner.gas.get());

        self.call("registry_createDocument", json!([tx])).await
    }

    async fn verify_document(
        &self,
        document_id: &str,
        document_hash: &str,
    ) -> Result<TxReceipt, LedgerError> {
        let from = self.signer().await?;
        let call = json!({
            "method": "verifyDocument",
            "from": from,
            "documentId": document_id,
            "documentHash": document_hash,
        });
        let estimate = self.estimate_gas(call.clone()).await?;

        let mut tx = call;
        tx["gas"] = json!(limit_with_margin(estimate));
        tx["gasPrice"] = json!(self.inner.gas.get());

        self.call("registry_verifyDocument", json!([tx])).await
    }

    async fn transfer_document(
        &self,
        document_id: &str,
        new_holder: &str,
    ) -> Result<TxReceipt, LedgerError> {
        address::ensure_address(new_holder)?;

        let from = self.signer().await?;
        let call = json!({
            "method": "transferDocument",
            "from": from,
            "documentId": document_id,
            "newHolder": new_holder,
        });
        let estimate = self.estimate_gas(call.clone()).await?;

        let mut tx = call;
        tx["gas"] = json!(limit_with_margin(estimate));
        tx["gasPrice"] = json!(self.inner.gas.get());

        self.call("registry_transferDocument", json!([tx])).await
    }

    async fn block_number(&self) -> Result<u64, LedgerError> {
        self.call("registry_blockNumber", json!([])).await
    }

    async fn events_in_range(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.call(
            "registry_getEvents",
            json!([{"fromBlock": from, "toBlock": to}]),
        )
        .await
    }

    async fn subscribe(&self) -> Result<EventSubscription, LedgerError> {
        let mut last_seen = self.block_number().await?;
        let ledger = self.clone();
        let (tx, rx) = mpsc::channel(64);

        let pump = tokio::spawn(async move {
            loop {
                tokio::time::sleep(LIVE_POLL_INTERVAL).await;

                let head = match ledger.block_number().await {
                    Ok(head) => head,
                    Err(e) => {
                        warn!(error = %e, "subscription head check failed");
                        continue;
                    }
                };
                if head <= last_seen {
                    continue;
                }

                match ledger.events_in_range(last_seen + 1, head).await {
                    Ok(events) => {
                        for event in events {
                            if tx.send(event).await.is_err() {
                                // Subscriber went away.
                                return;
                            }
                        }
                        last_seen = head;
                    }
                    Err(e) => {
                        warn!(error = %e, "subscription event fetch failed");
                    }
                }
            }
        });

        Ok(EventSubscription::new(rx, pump))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revert_messages_map_to_reverted() {
        assert!(matches!(
            map_rpc_error(-32000, "execution reverted: document does not exist"),
            LedgerError::Reverted(_)
        ));
        assert!(matches!(
            map_rpc_error(-32601, "method not found"),
            LedgerError::Rpc(_)
        ));
    }

    #[test]
    fn default_gas_price_served_before_first_refresh() {
        let ledger = RpcLedger::new("http://localhost:8545");
        assert_eq!(ledger.inner.gas.get(), crate::gas::DEFAULT_GAS_PRICE);
    }
}
