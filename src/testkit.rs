//! In-process fakes for the network seams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::json;
use solana_sdk::hash::Hash;
use solana_sdk::message::{Message, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::system_instruction;
use solana_sdk::transaction::VersionedTransaction;

use crate::error::{Result, TradeError};
use crate::jupiter::{Quote, QuoteRequest, SwapAggregator};
use crate::price::{PriceQuote, PriceSource};
use crate::relay::BundleRelay;
use crate::rpc::{ChainClient, SignatureStatus};

pub struct FakeAggregator {
    pub quote_calls: AtomicUsize,
    pub swap_calls: AtomicUsize,
    pub last_amount: Mutex<Option<u64>>,
    pub last_slippage: Mutex<Option<u16>>,
    quote_error: Option<String>,
    payer: Option<Pubkey>,
    out_amount: u64,
    output_decimals: Option<u8>,
}

impl FakeAggregator {
    pub fn new() -> Self {
        Self {
            quote_calls: AtomicUsize::new(0),
            swap_calls: AtomicUsize::new(0),
            last_amount: Mutex::new(None),
            last_slippage: Mutex::new(None),
            quote_error: None,
            payer: None,
            out_amount: 1_000_000_000,
            output_decimals: Some(6),
        }
    }

    pub fn failing_quote(msg: &str) -> Self {
        Self {
            quote_error: Some(msg.to_string()),
            ..Self::new()
        }
    }

    /// Swap transactions will name `payer` as fee payer regardless of the requester.
    pub fn with_payer(mut self, payer: Pubkey) -> Self {
        self.payer = Some(payer);
        self
    }

    pub fn with_output(mut self, out_amount: u64, output_decimals: Option<u8>) -> Self {
        self.out_amount = out_amount;
        self.output_decimals = output_decimals;
        self
    }
}

#[async_trait]
impl SwapAggregator for FakeAggregator {
    async fn quote(&self, req: &QuoteRequest) -> Result<Quote> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_amount.lock().unwrap() = Some(req.amount);
        *self.last_slippage.lock().unwrap() = Some(req.slippage_bps);
        if let Some(msg) = &self.quote_error {
            return Err(TradeError::QuoteUnavailable(msg.clone()));
        }
        Quote::from_json(json!({
            "inAmount": req.amount.to_string(),
            "outAmount": self.out_amount.to_string(),
            "outputDecimals": self.output_decimals,
        }))
    }

    async fn swap_transaction(&self, _quote: &Quote, user: &Pubkey) -> Result<String> {
        self.swap_calls.fetch_add(1, Ordering::SeqCst);
        let payer = self.payer.unwrap_or(*user);
        let ix = system_instruction::transfer(&payer, &Pubkey::new_unique(), 1);
        let msg = Message::new_with_blockhash(&[ix], Some(&payer), &Hash::new_unique());
        let tx = VersionedTransaction {
            signatures: vec![Signature::default(); usize::from(msg.header.num_required_signatures)],
            message: VersionedMessage::Legacy(msg),
        };
        let bytes = bincode::serialize(&tx).unwrap();
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmMode {
    Confirm,
    Never,
    FailOnChain,
}

pub struct FakeChain {
    pub blockhash_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub sent: Mutex<Vec<Signature>>,
    polls: Mutex<HashMap<Signature, usize>>,
    pending_polls: usize,
    decimals: Option<u8>,
    fail_send_at: Option<usize>,
    confirm: ConfirmMode,
}

impl FakeChain {
    pub fn new() -> Self {
        Self {
            blockhash_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            polls: Mutex::new(HashMap::new()),
            pending_polls: 0,
            decimals: None,
            fail_send_at: None,
            confirm: ConfirmMode::Confirm,
        }
    }

    pub fn with_decimals(mut self, decimals: u8) -> Self {
        self.decimals = Some(decimals);
        self
    }

    /// The `n`th send (0-based) is rejected by the node.
    pub fn failing_send_at(mut self, n: usize) -> Self {
        self.fail_send_at = Some(n);
        self
    }

    pub fn confirming(mut self, mode: ConfirmMode) -> Self {
        self.confirm = mode;
        self
    }

    /// Every signature reports Pending for its first `n` status calls.
    pub fn pending_for(mut self, n: usize) -> Self {
        self.pending_polls = n;
        self
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn latest_blockhash(&self) -> Result<Hash> {
        self.blockhash_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Hash::new_unique())
    }

    async fn mint_decimals(&self, mint: &Pubkey) -> Result<u8> {
        self.decimals
            .ok_or_else(|| TradeError::AssetMetadataUnavailable(format!("no mint account {mint}")))
    }

    async fn send_transaction(&self, tx: &VersionedTransaction, _skip_preflight: bool) -> Result<Signature> {
        let mut sent = self.sent.lock().unwrap();
        if self.fail_send_at == Some(sent.len()) {
            sent.push(Signature::default());
            return Err(TradeError::SubmissionFailed("node rejected transaction".into()));
        }
        let sig = tx.signatures[0];
        sent.push(sig);
        Ok(sig)
    }

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut polls = self.polls.lock().unwrap();
            let seen = polls.entry(*signature).or_insert(0);
            *seen += 1;
            if *seen <= self.pending_polls {
                return Ok(SignatureStatus::Pending);
            }
        }
        Ok(match self.confirm {
            ConfirmMode::Confirm => SignatureStatus::Confirmed,
            ConfirmMode::Never => SignatureStatus::Pending,
            ConfirmMode::FailOnChain => SignatureStatus::Failed("InstructionError(0, Custom(1))".into()),
        })
    }
}

pub struct FakeRelay {
    pub bundles: Mutex<Vec<Vec<String>>>,
    reply: std::result::Result<String, String>,
}

impl FakeRelay {
    pub fn accepting(bundle_id: &str) -> Self {
        Self {
            bundles: Mutex::new(Vec::new()),
            reply: Ok(bundle_id.to_string()),
        }
    }

    pub fn rejecting(msg: &str) -> Self {
        Self {
            bundles: Mutex::new(Vec::new()),
            reply: Err(msg.to_string()),
        }
    }
}

#[async_trait]
impl BundleRelay for FakeRelay {
    async fn send_bundle(&self, encoded: Vec<String>) -> Result<String> {
        self.bundles.lock().unwrap().push(encoded);
        self.reply.clone().map_err(TradeError::SubmissionFailed)
    }
}

/// Fixed prices per mint; unknown mints fail like a bad feed response.
pub struct FakePrices {
    prices: Mutex<HashMap<String, f64>>,
}

impl FakePrices {
    pub fn new() -> Self {
        Self {
            prices: Mutex::new(HashMap::new()),
        }
    }

    pub fn set(&self, mint: &str, price: f64) {
        self.prices.lock().unwrap().insert(mint.to_string(), price);
    }
}

#[async_trait]
impl PriceSource for FakePrices {
    async fn price(&self, mint: &str) -> Result<PriceQuote> {
        self.prices
            .lock()
            .unwrap()
            .get(mint)
            .map(|p| PriceQuote {
                price_in_base_asset: *p,
                price_in_fiat: *p * 150.0,
            })
            .ok_or_else(|| TradeError::PriceFormatInvalid(format!("no price for {mint}")))
    }
}
