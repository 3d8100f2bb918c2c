use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::bundler::TransactionSet;
use crate::error::{Result, TradeError};
use crate::rpc::{ChainClient, SignatureStatus};

/// Atomic multi-transaction submission.
#[async_trait]
pub trait BundleRelay: Send + Sync {
    /// Submits base58 signed transactions in order; returns the relay's bundle id.
    async fn send_bundle(&self, encoded: Vec<String>) -> Result<String>;
}

#[derive(Clone)]
pub struct JitoRelay {
    url: String,
    http: Client,
}

impl JitoRelay {
    /// `base_url` is the block-engine API root; bundles go to `<base_url>/bundles`.
    pub fn new(base_url: &str) -> Self {
        Self {
            url: format!("{}/bundles", base_url.trim_end_matches('/')),
            http: Client::new(),
        }
    }
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: [&'a [String]; 1],
}

#[async_trait]
impl BundleRelay for JitoRelay {
    async fn send_bundle(&self, encoded: Vec<String>) -> Result<String> {
        let resp = self
            .http
            .post(&self.url)
            .json(&JsonRpcRequest {
                jsonrpc: "2.0",
                id: 1,
                method: "sendBundle",
                params: [encoded.as_slice()],
            })
            .send()
            .await
            .map_err(|e| TradeError::SubmissionFailed(format!("relay unreachable: {e}")))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let json: Value = serde_json::from_str(&body).map_err(|_| {
            TradeError::SubmissionFailed(format!("relay HTTP {status}: {body}"))
        })?;
        bundle_id_from_response(&json)
    }
}

/// `{ result: id }` (or `{ result: { bundleId } }`) on success, `{ error: { message } }` otherwise.
pub fn bundle_id_from_response(resp: &Value) -> Result<String> {
    if let Some(err) = resp.get("error") {
        let msg = err
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| err.to_string());
        return Err(TradeError::SubmissionFailed(format!("relay error: {msg}")));
    }
    match resp.get("result") {
        Some(Value::String(id)) => Ok(id.clone()),
        Some(obj) => obj
            .get("bundleId")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| TradeError::SubmissionFailed(format!("relay result has no bundle id: {resp}"))),
        None => Err(TradeError::SubmissionFailed(format!("relay response has no result: {resp}"))),
    }
}

/// Bounded confirmation polling.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TipDelivery {
    /// No tip transaction in the set.
    None,
    /// Tip rode in the same atomic bundle as the swap.
    Bundled,
    /// Sent separately and confirmed.
    Confirmed(Signature),
    /// Sent separately and not confirmed; the swap still landed.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    /// Confirmed swap signature.
    pub signature: Signature,
    pub bundle_id: Option<String>,
    /// False when swap and tip went out as independent transactions.
    pub atomic: bool,
    pub tip: TipDelivery,
}

pub struct SubmissionRelay {
    chain: Arc<dyn ChainClient>,
    relay: Option<Arc<dyn BundleRelay>>,
    policy: ConfirmPolicy,
    skip_preflight: bool,
}

impl SubmissionRelay {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        relay: Option<Arc<dyn BundleRelay>>,
        policy: ConfirmPolicy,
        skip_preflight: bool,
    ) -> Self {
        Self {
            chain,
            relay,
            policy,
            skip_preflight,
        }
    }

    pub fn has_relay(&self) -> bool {
        self.relay.is_some()
    }

    pub async fn submit(&self, set: &TransactionSet) -> Result<SubmissionReceipt> {
        self.dispatch(set, None).await
    }

    /// Like `submit`, but confirmation polling also stops at `deadline` if that comes first.
    pub async fn submit_until(&self, set: &TransactionSet, deadline: Instant) -> Result<SubmissionReceipt> {
        self.dispatch(set, Some(deadline)).await
    }

    async fn dispatch(&self, set: &TransactionSet, external: Option<Instant>) -> Result<SubmissionReceipt> {
        match &self.relay {
            Some(relay) => {
                self.submit_bundle(relay.as_ref(), set, self.deadline_within(external))
                    .await
            }
            None => self.submit_direct(set, external).await,
        }
    }

    /// A fresh confirmation budget, never past `external`.
    fn deadline_within(&self, external: Option<Instant>) -> Instant {
        let own = Instant::now() + self.policy.timeout;
        external.map_or(own, |d| d.min(own))
    }

    async fn submit_bundle(
        &self,
        relay: &dyn BundleRelay,
        set: &TransactionSet,
        deadline: Instant,
    ) -> Result<SubmissionReceipt> {
        let encoded = set.iter().map(encode_base58).collect::<Result<Vec<_>>>()?;
        let bundle_id = relay.send_bundle(encoded).await?;
        let signature = set.tracking_signature();
        info!(%bundle_id, %signature, transactions = set.len(), "relay.bundle_sent");

        // The bundle lands whole or not at all, so the swap signature stands in for it.
        self.confirm(&signature, deadline).await?;
        info!(%signature, "relay.bundle_confirmed");

        Ok(SubmissionReceipt {
            signature,
            bundle_id: Some(bundle_id),
            atomic: true,
            tip: if set.tip().is_some() {
                TipDelivery::Bundled
            } else {
                TipDelivery::None
            },
        })
    }

    /// Swap and tip each get their own confirmation budget.
    async fn submit_direct(&self, set: &TransactionSet, external: Option<Instant>) -> Result<SubmissionReceipt> {
        if set.len() > 1 {
            warn!(
                transactions = set.len(),
                "relay.non_atomic: swap and tip sent as independent transactions, tip inclusion not guaranteed"
            );
        }

        let signature = self.chain.send_transaction(set.swap(), self.skip_preflight).await?;
        info!(%signature, "relay.swap_sent");
        self.confirm(&signature, self.deadline_within(external)).await?;
        info!(%signature, "relay.swap_confirmed");

        let tip = match set.tip() {
            None => TipDelivery::None,
            Some(tip_tx) => match self.send_and_confirm(tip_tx, self.deadline_within(external)).await {
                Ok(tip_sig) => TipDelivery::Confirmed(tip_sig),
                Err(e) => {
                    warn!(%signature, error = %e, "relay.tip_failed_after_swap");
                    TipDelivery::Failed(e.to_string())
                }
            },
        };

        Ok(SubmissionReceipt {
            signature,
            bundle_id: None,
            atomic: set.len() == 1,
            tip,
        })
    }

    async fn send_and_confirm(&self, tx: &VersionedTransaction, deadline: Instant) -> Result<Signature> {
        let signature = self.chain.send_transaction(tx, self.skip_preflight).await?;
        self.confirm(&signature, deadline).await?;
        Ok(signature)
    }

    async fn confirm(&self, signature: &Signature, deadline: Instant) -> Result<()> {
        let started = Instant::now();
        loop {
            match self.chain.signature_status(signature).await {
                Ok(SignatureStatus::Confirmed) => return Ok(()),
                Ok(SignatureStatus::Failed(err)) => {
                    return Err(TradeError::SubmissionFailed(format!(
                        "{signature} failed on chain: {err}"
                    )))
                }
                Ok(SignatureStatus::Pending) => {}
                // A flaky status call is not a verdict on the transaction.
                Err(e) => debug!(%signature, error = %e, "relay.status_poll_failed"),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(TradeError::ConfirmationTimeout {
                    signature: signature.to_string(),
                    waited_ms: now.duration_since(started).as_millis() as u64,
                });
            }
            tokio::time::sleep(self.policy.poll_interval.min(deadline - now)).await;
        }
    }
}

fn encode_base58(tx: &VersionedTransaction) -> Result<String> {
    let bytes = bincode::serialize(tx)
        .map_err(|e| TradeError::SubmissionFailed(format!("serialize transaction: {e}")))?;
    Ok(bs58::encode(bytes).into_string())
}
