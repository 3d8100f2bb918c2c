use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_client::rpc_request::RpcRequest;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;

use crate::error::{Result, TradeError};

/// On-chain status of a sent transaction at "confirmed" commitment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    Pending,
    Confirmed,
    Failed(String),
}

/// The node calls the trade path needs.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn latest_blockhash(&self) -> Result<Hash>;

    async fn mint_decimals(&self, mint: &Pubkey) -> Result<u8>;

    async fn send_transaction(&self, tx: &VersionedTransaction, skip_preflight: bool) -> Result<Signature>;

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureStatus>;
}

#[derive(Clone)]
pub struct RpcChain {
    rpc: Arc<RpcClient>,
}

impl RpcChain {
    pub fn new(url: String) -> Self {
        Self {
            rpc: Arc::new(RpcClient::new_with_commitment(url, CommitmentConfig::confirmed())),
        }
    }
}

#[async_trait]
impl ChainClient for RpcChain {
    async fn latest_blockhash(&self) -> Result<Hash> {
        let (hash, _) = self
            .rpc
            .get_latest_blockhash_with_commitment(CommitmentConfig::finalized())
            .await
            .map_err(|e| TradeError::NodeUnavailable(format!("getLatestBlockhash: {e}")))?;
        Ok(hash)
    }

    async fn mint_decimals(&self, mint: &Pubkey) -> Result<u8> {
        let resp: Value = self
            .rpc
            .send(
                RpcRequest::GetAccountInfo,
                json!([mint.to_string(), { "encoding": "jsonParsed", "commitment": "confirmed" }]),
            )
            .await
            .map_err(|e| TradeError::AssetMetadataUnavailable(format!("{mint}: {e}")))?;
        decimals_from_parsed_account(mint, &resp)
    }

    async fn send_transaction(&self, tx: &VersionedTransaction, skip_preflight: bool) -> Result<Signature> {
        self.rpc
            .send_transaction_with_config(
                tx,
                RpcSendTransactionConfig {
                    skip_preflight,
                    preflight_commitment: Some(CommitmentConfig::confirmed().commitment),
                    ..RpcSendTransactionConfig::default()
                },
            )
            .await
            .map_err(|e| TradeError::SubmissionFailed(e.to_string()))
    }

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureStatus> {
        let status = self
            .rpc
            .get_signature_status_with_commitment(signature, CommitmentConfig::confirmed())
            .await
            .map_err(|e| TradeError::NodeUnavailable(format!("getSignatureStatuses: {e}")))?;
        Ok(match status {
            None => SignatureStatus::Pending,
            Some(Ok(())) => SignatureStatus::Confirmed,
            Some(Err(e)) => SignatureStatus::Failed(e.to_string()),
        })
    }
}

/// Reads `value.data.parsed.info.decimals` from a jsonParsed getAccountInfo result.
pub fn decimals_from_parsed_account(mint: &Pubkey, resp: &Value) -> Result<u8> {
    resp.pointer("/value/data/parsed/info/decimals")
        .and_then(Value::as_u64)
        .and_then(|d| u8::try_from(d).ok())
        .ok_or_else(|| {
            TradeError::AssetMetadataUnavailable(format!("no mint decimals for {mint}: {resp}"))
        })
}
