//! Error types for the index-vault engine.
//!
//! Every settlement, valuation and registry operation returns a
//! [`VaultError`]. Errors are reported synchronously and never retried
//! internally: the caller fixes the triggering condition (fresher prices,
//! a smaller amount) and resubmits.

use thiserror::Error;

use crate::pricing::PricingError;
use crate::registry::AssetTypeId;
use crate::settlement::CustodyError;
use crate::storage::DbError;

/// Convenience alias used across the crate.
pub type VaultResult<T> = Result<T, VaultError>;

/// Errors that can occur during vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The asset type is not in the supported-asset registry.
    #[error("asset not supported: {0}")]
    NotSupportedAsset(AssetTypeId),

    /// No vault is registered under this symbol.
    #[error("vault not found: {0}")]
    VaultNotFound(String),

    /// A vault with this symbol already exists.
    #[error("duplicate vault: symbol '{0}' is already registered")]
    DuplicateVault(String),

    /// Vault name or symbol is empty or too long.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// The caller's wallet cannot cover the requested deposit.
    #[error("insufficient balance: available {available}, requested {requested} (asset {asset})")]
    InsufficientBalance {
        /// Asset being deposited.
        asset: AssetTypeId,
        /// Wallet balance at the time of the check.
        available: u64,
        /// Amount the caller tried to deposit.
        requested: u64,
    },

    /// A guarded multiply or a narrowing conversion ran out of headroom.
    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    /// The computed mint or burn quantity is zero.
    #[error("amount too small: computed quantity is zero")]
    AmountTooSmall,

    /// The withdrawal waterfall ran out of candidate assets.
    #[error("insufficient liquidity: target {target} usd, covered {covered} usd")]
    InsufficientLiquidity {
        /// USD value owed to the withdrawer.
        target: u128,
        /// USD value the candidate assets could cover.
        covered: u128,
    },

    /// A creator-gated operation was invoked by someone else.
    #[error("caller {caller} is not the vault creator")]
    NotCreator {
        /// Identity that attempted the operation.
        caller: String,
    },

    /// A price quote with a non-positive mantissa.
    #[error("invalid price for {asset}: mantissa {mantissa}")]
    InvalidPrice {
        /// Asset the quote was supplied for.
        asset: AssetTypeId,
        /// The offending mantissa.
        mantissa: i64,
    },

    /// The number of quotes does not match the number of assets priced.
    #[error("price count mismatch: expected {expected}, got {got}")]
    PriceCountMismatch {
        /// Quotes required.
        expected: usize,
        /// Quotes supplied.
        got: usize,
    },

    /// Redemption percentage outside `1..=10000` basis points.
    #[error("invalid redemption percentage: {0} bps")]
    InvalidPercentage(u64),

    /// Withdrawal candidate list is empty or too long.
    #[error("invalid asset list: {0}")]
    InvalidAssetList(String),

    /// The same asset appears twice in a withdrawal candidate list.
    #[error("duplicate asset in candidate list: {0}")]
    DuplicateAsset(AssetTypeId),

    /// The asset is already in the supported-asset registry.
    #[error("asset already supported: {0}")]
    AssetAlreadySupported(AssetTypeId),

    /// A swap returned less than the caller's minimum.
    #[error("slippage exceeded: received {received}, minimum {minimum}")]
    SlippageExceeded {
        /// Amount the router delivered.
        received: u64,
        /// Minimum the caller accepted.
        minimum: u64,
    },

    /// The pricing gateway could not supply a usable quote.
    #[error("pricing error: {0}")]
    Pricing(#[from] PricingError),

    /// The custody layer rejected the settlement instructions.
    #[error("custody error: {0}")]
    Custody(#[from] CustodyError),

    /// Persistence failed.
    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

impl VaultError {
    /// Short machine-readable tag, used for metrics labels and API bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            VaultError::NotSupportedAsset(_) => "not_supported_asset",
            VaultError::VaultNotFound(_) => "vault_not_found",
            VaultError::DuplicateVault(_) => "duplicate_vault",
            VaultError::InvalidName(_) => "invalid_name",
            VaultError::InsufficientBalance { .. } => "insufficient_balance",
            VaultError::ArithmeticOverflow => "arithmetic_overflow",
            VaultError::AmountTooSmall => "amount_too_small",
            VaultError::InsufficientLiquidity { .. } => "insufficient_liquidity",
            VaultError::NotCreator { .. } => "not_creator",
            VaultError::InvalidPrice { .. } => "invalid_price",
            VaultError::PriceCountMismatch { .. } => "price_count_mismatch",
            VaultError::InvalidPercentage(_) => "invalid_percentage",
            VaultError::InvalidAssetList(_) => "invalid_asset_list",
            VaultError::DuplicateAsset(_) => "duplicate_asset",
            VaultError::AssetAlreadySupported(_) => "asset_already_supported",
            VaultError::SlippageExceeded { .. } => "slippage_exceeded",
            VaultError::Pricing(_) => "pricing",
            VaultError::Custody(_) => "custody",
            VaultError::Storage(_) => "storage",
        }
    }
}
