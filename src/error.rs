use thiserror::Error;

/// Every failure a trade attempt or a position mutation can surface.
///
/// Variants are built where upstream responses are parsed, so callers match on
/// the kind instead of inspecting messages. The upstream text is kept verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TradeError {
    #[error("quote unavailable: {0}")]
    QuoteUnavailable(String),

    #[error("swap transaction could not be built: {0}")]
    SwapBuildFailed(String),

    #[error("asset metadata unavailable: {0}")]
    AssetMetadataUnavailable(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("node unavailable: {0}")]
    NodeUnavailable(String),

    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    #[error("transaction {signature} not confirmed within {waited_ms}ms")]
    ConfirmationTimeout { signature: String, waited_ms: u64 },

    #[error("tip configured but no priority relay is available")]
    TipRequiresRelay,

    #[error("invalid trade intent: {0}")]
    InvalidIntent(String),

    #[error("position not found: {0}")]
    PositionNotFound(String),

    #[error("invalid price format: {0}")]
    PriceFormatInvalid(String),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, TradeError>;

/// What a failed trade means for the user's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundsMoved {
    /// Nothing reached the chain.
    Unmoved,
    /// Something was sent but its fate is unknown.
    Uncertain,
    /// Not a trade-path failure.
    NotApplicable,
}

impl TradeError {
    pub fn funds_moved(&self) -> FundsMoved {
        match self {
            TradeError::QuoteUnavailable(_)
            | TradeError::SwapBuildFailed(_)
            | TradeError::AssetMetadataUnavailable(_)
            | TradeError::SigningFailed(_)
            | TradeError::NodeUnavailable(_)
            | TradeError::SubmissionFailed(_)
            | TradeError::TipRequiresRelay
            | TradeError::InvalidIntent(_) => FundsMoved::Unmoved,
            TradeError::ConfirmationTimeout { .. } => FundsMoved::Uncertain,
            TradeError::PositionNotFound(_)
            | TradeError::PriceFormatInvalid(_)
            | TradeError::Storage(_) => FundsMoved::NotApplicable,
        }
    }
}

impl From<diesel::result::Error> for TradeError {
    fn from(e: diesel::result::Error) -> Self {
        TradeError::Storage(e.to_string())
    }
}
