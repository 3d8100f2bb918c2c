use std::sync::Arc;

use solana_sdk::message::{Message, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::signer::Signer;
use solana_sdk::system_instruction;
use solana_sdk::transaction::VersionedTransaction;
use tracing::{debug, info};

use crate::amount::{lamports, to_base_units};
use crate::domain::{Direction, TradeIntent};
use crate::error::{Result, TradeError};
use crate::jupiter::{decode_swap_transaction, Quote, QuoteRequest, SwapAggregator};
use crate::rpc::ChainClient;

/// Unsigned swap message plus an optional tip transfer, same fee payer.
#[derive(Debug, Clone)]
pub struct SignableTransactionSet {
    fee_payer: Pubkey,
    messages: Vec<VersionedMessage>,
}

impl SignableTransactionSet {
    fn new(fee_payer: Pubkey, swap: VersionedMessage) -> Self {
        Self {
            fee_payer,
            messages: vec![swap],
        }
    }

    fn push_tip(&mut self, tip: VersionedMessage) {
        self.messages.push(tip);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn fee_payer(&self) -> &Pubkey {
        &self.fee_payer
    }

    /// Signs every message with `signer`; one failure fails the whole set.
    pub fn sign(self, signer: &dyn Signer) -> Result<TransactionSet> {
        if signer.pubkey() != self.fee_payer {
            return Err(TradeError::SigningFailed(format!(
                "signer {} is not fee payer {}",
                signer.pubkey(),
                self.fee_payer
            )));
        }
        let transactions = self
            .messages
            .into_iter()
            .map(|message| {
                VersionedTransaction::try_new(message, &[signer])
                    .map_err(|e| TradeError::SigningFailed(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(TransactionSet { transactions })
    }
}

/// Signed, ordered transactions ready for submission. The swap is always first.
#[derive(Debug, Clone)]
pub struct TransactionSet {
    transactions: Vec<VersionedTransaction>,
}

impl TransactionSet {
    pub fn swap(&self) -> &VersionedTransaction {
        &self.transactions[0]
    }

    pub fn tip(&self) -> Option<&VersionedTransaction> {
        self.transactions.get(1)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &VersionedTransaction> {
        self.transactions.iter()
    }

    /// First signature of the swap transaction.
    pub fn tracking_signature(&self) -> Signature {
        self.swap().signatures.first().copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct Bundle {
    pub quote: Quote,
    pub transactions: TransactionSet,
}

pub struct TransactionBundler {
    aggregator: Arc<dyn SwapAggregator>,
    chain: Arc<dyn ChainClient>,
    tip_account: Pubkey,
    relay_available: bool,
    allow_unbundled_tip: bool,
}

impl TransactionBundler {
    pub fn new(
        aggregator: Arc<dyn SwapAggregator>,
        chain: Arc<dyn ChainClient>,
        tip_account: Pubkey,
        relay_available: bool,
        allow_unbundled_tip: bool,
    ) -> Self {
        Self {
            aggregator,
            chain,
            tip_account,
            relay_available,
            allow_unbundled_tip,
        }
    }

    pub async fn build_buy_bundle(
        &self,
        intent: &TradeIntent,
        fee_payer: &dyn Signer,
        tip_lamports: Option<u64>,
    ) -> Result<Bundle> {
        expect_direction(intent, Direction::Buy)?;
        let amount = lamports(intent.amount)?;
        self.build(intent, amount, fee_payer, tip_lamports).await
    }

    /// Resolves the traded mint's decimals before converting the human amount.
    pub async fn build_sell_bundle(
        &self,
        intent: &TradeIntent,
        fee_payer: &dyn Signer,
        tip_lamports: Option<u64>,
    ) -> Result<Bundle> {
        expect_direction(intent, Direction::Sell)?;
        self.check_tip_policy(tip_lamports)?;
        let decimals = self.chain.mint_decimals(intent.input_mint()).await?;
        let amount = to_base_units(intent.amount, decimals)?;
        self.build(intent, amount, fee_payer, tip_lamports).await
    }

    fn check_tip_policy(&self, tip_lamports: Option<u64>) -> Result<()> {
        let tipping = tip_lamports.is_some_and(|t| t > 0);
        if tipping && !self.relay_available && !self.allow_unbundled_tip {
            return Err(TradeError::TipRequiresRelay);
        }
        Ok(())
    }

    async fn build(
        &self,
        intent: &TradeIntent,
        amount: u64,
        fee_payer: &dyn Signer,
        tip_lamports: Option<u64>,
    ) -> Result<Bundle> {
        self.check_tip_policy(tip_lamports)?;
        let payer = fee_payer.pubkey();

        // 1) Quote
        let quote = self
            .aggregator
            .quote(&QuoteRequest::exact_in(
                intent.input_mint(),
                intent.output_mint(),
                amount,
                intent.slippage_bps,
            ))
            .await?;
        debug!(in_amount = quote.in_amount, out_amount = quote.out_amount, "bundler.quote");

        // 2) Swap transaction for exactly that quote
        let encoded = self.aggregator.swap_transaction(&quote, &payer).await?;
        let swap = decode_swap_transaction(&encoded)?;
        let mut set = SignableTransactionSet::new(payer, swap.message);

        // 3) Tip against a fresh blockhash
        if let Some(tip) = tip_lamports.filter(|t| *t > 0) {
            let blockhash = self.chain.latest_blockhash().await?;
            let ix = system_instruction::transfer(&payer, &self.tip_account, tip);
            let msg = Message::new_with_blockhash(&[ix], Some(&payer), &blockhash);
            set.push_tip(VersionedMessage::Legacy(msg));
            info!(tip_lamports = tip, tip_account = %self.tip_account, "bundler.tip_added");
        }

        // 4) Sign
        let transactions = set.sign(fee_payer)?;
        Ok(Bundle {
            quote,
            transactions,
        })
    }
}

fn expect_direction(intent: &TradeIntent, direction: Direction) -> Result<()> {
    if intent.direction != direction {
        return Err(TradeError::InvalidIntent(format!(
            "expected a {direction:?} intent, got {:?}",
            intent.direction
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{FakeAggregator, FakeChain};
    use rust_decimal_macros::dec;
    use solana_sdk::signature::Keypair;
    use std::sync::atomic::Ordering;

    fn bundler(
        aggregator: Arc<FakeAggregator>,
        chain: Arc<FakeChain>,
        relay_available: bool,
    ) -> TransactionBundler {
        TransactionBundler::new(aggregator, chain, Pubkey::new_unique(), relay_available, false)
    }

    fn buy_intent() -> TradeIntent {
        TradeIntent::buy(Pubkey::new_unique(), dec!(0.01), 1000).unwrap()
    }

    #[tokio::test]
    async fn no_tip_builds_single_transaction() {
        let kp = Keypair::new();
        let agg = Arc::new(FakeAggregator::new());
        let b = bundler(agg.clone(), Arc::new(FakeChain::new()), true);

        let bundle = b.build_buy_bundle(&buy_intent(), &kp, None).await.unwrap();
        assert_eq!(bundle.transactions.len(), 1);
        assert!(bundle.transactions.tip().is_none());
        assert_eq!(*agg.last_amount.lock().unwrap(), Some(10_000_000));
        assert_eq!(*agg.last_slippage.lock().unwrap(), Some(1000));

        let zero = b.build_buy_bundle(&buy_intent(), &kp, Some(0)).await.unwrap();
        assert_eq!(zero.transactions.len(), 1);
    }

    #[tokio::test]
    async fn tip_with_relay_builds_two_signed_transactions() {
        let kp = Keypair::new();
        let chain = Arc::new(FakeChain::new());
        let b = bundler(Arc::new(FakeAggregator::new()), chain.clone(), true);

        let bundle = b.build_buy_bundle(&buy_intent(), &kp, Some(100_000)).await.unwrap();
        let set = &bundle.transactions;
        assert_eq!(set.len(), 2);
        assert_eq!(chain.blockhash_calls.load(Ordering::SeqCst), 1);

        let tip = set.tip().unwrap();
        assert_eq!(tip.message.static_account_keys()[0], kp.pubkey());
        assert_eq!(set.swap().message.static_account_keys()[0], kp.pubkey());
        for tx in set.iter() {
            assert!(tx.verify_with_results().iter().all(|ok| *ok));
        }
        assert_eq!(set.tracking_signature(), set.swap().signatures[0]);
    }

    #[tokio::test]
    async fn tip_without_relay_is_refused_before_quoting() {
        let kp = Keypair::new();
        let agg = Arc::new(FakeAggregator::new());
        let b = bundler(agg.clone(), Arc::new(FakeChain::new()), false);

        let err = b.build_buy_bundle(&buy_intent(), &kp, Some(100_000)).await.unwrap_err();
        assert_eq!(err, TradeError::TipRequiresRelay);
        assert_eq!(agg.quote_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unbundled_tip_allowed_when_configured() {
        let kp = Keypair::new();
        let b = TransactionBundler::new(
            Arc::new(FakeAggregator::new()),
            Arc::new(FakeChain::new()),
            Pubkey::new_unique(),
            false,
            true,
        );
        let bundle = b.build_buy_bundle(&buy_intent(), &kp, Some(5_000)).await.unwrap();
        assert_eq!(bundle.transactions.len(), 2);
    }

    #[tokio::test]
    async fn quote_failure_stops_before_swap_build() {
        let kp = Keypair::new();
        let agg = Arc::new(FakeAggregator::failing_quote("HTTP 429 Too Many Requests: slow down"));
        let b = bundler(agg.clone(), Arc::new(FakeChain::new()), true);

        let err = b.build_buy_bundle(&buy_intent(), &kp, Some(100_000)).await.unwrap_err();
        assert!(matches!(err, TradeError::QuoteUnavailable(ref m) if m.contains("429")));
        assert_eq!(agg.swap_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sell_resolves_decimals_first() {
        let kp = Keypair::new();
        let agg = Arc::new(FakeAggregator::new());
        let chain = Arc::new(FakeChain::new().with_decimals(6));
        let b = bundler(agg.clone(), chain, true);

        let intent = TradeIntent::sell(Pubkey::new_unique(), dec!(1.5), 500).unwrap();
        b.build_sell_bundle(&intent, &kp, None).await.unwrap();
        assert_eq!(*agg.last_amount.lock().unwrap(), Some(1_500_000));
    }

    #[tokio::test]
    async fn sell_without_decimals_fails_before_quoting() {
        let kp = Keypair::new();
        let agg = Arc::new(FakeAggregator::new());
        let b = bundler(agg.clone(), Arc::new(FakeChain::new()), true);

        let intent = TradeIntent::sell(Pubkey::new_unique(), dec!(1.5), 500).unwrap();
        let err = b.build_sell_bundle(&intent, &kp, None).await.unwrap_err();
        assert!(matches!(err, TradeError::AssetMetadataUnavailable(_)));
        assert_eq!(agg.quote_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn wrong_signer_fails_signing() {
        let payer = Keypair::new();
        let other = Keypair::new();
        let agg = Arc::new(FakeAggregator::new().with_payer(payer.pubkey()));
        let b = bundler(agg, Arc::new(FakeChain::new()), true);

        let err = b.build_buy_bundle(&buy_intent(), &other, None).await.unwrap_err();
        assert!(matches!(err, TradeError::SigningFailed(_)));
    }

    #[tokio::test]
    async fn direction_mismatch_is_rejected() {
        let kp = Keypair::new();
        let b = bundler(Arc::new(FakeAggregator::new()), Arc::new(FakeChain::new()), true);
        let sell = TradeIntent::sell(Pubkey::new_unique(), dec!(1), 500).unwrap();
        assert!(matches!(
            b.build_buy_bundle(&sell, &kp, None).await,
            Err(TradeError::InvalidIntent(_))
        ));
    }
}
