//! # Share Issuance
//!
//! Sizes the shares minted for a single-asset deposit:
//!
//! ```text
//! deposit_usd = value(amount, decimals, quote)
//! minted      = floor(deposit_usd * 10^SHARES_DECIMALS / NAV)
//! ```
//!
//! Issuance never mutates the ledger. The settlement service applies the
//! mint, the custody transfer and the balance update together.

use serde::{Deserialize, Serialize};

use crate::config::ONE_SHARE;
use crate::error::{VaultError, VaultResult};
use crate::ledger::VaultLedger;
use crate::math::{mul_div, to_u64};
use crate::pricing::{PriceQuote, PriceSnapshot};
use crate::registry::AssetTypeId;
use crate::valuation::{asset_usd_value, compute_nav};

/// Result of sizing a deposit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintQuote {
    /// Shares to mint to the depositor.
    pub minted_shares: u64,
    /// USD value of the deposit at AUM precision.
    pub deposit_usd_value: u128,
    /// NAV the deposit was priced at.
    pub nav: u128,
}

/// Computes the shares minted for depositing `deposit_amount` of
/// `deposit_asset` into `ledger`.
///
/// `all_prices` must cover every asset already in the ledger (NAV is taken
/// before the deposit lands); `deposit_asset_price` prices the incoming
/// asset, which may not be in the ledger yet.
///
/// # Errors
///
/// - [`VaultError::AmountTooSmall`] for a zero deposit, a zero NAV, or a
///   deposit too small to mint a single unit. Dust deposits must not move
///   custody without minting, or the AUM/share relationship drifts.
/// - Any valuation error ([`VaultError::InvalidPrice`],
///   [`VaultError::ArithmeticOverflow`], ...).
pub fn calc_mint_shares(
    deposit_asset: &AssetTypeId,
    deposit_amount: u64,
    deposit_asset_decimals: u8,
    all_prices: &PriceSnapshot,
    deposit_asset_price: &PriceQuote,
    ledger: &VaultLedger,
    shares_supply: u64,
) -> VaultResult<MintQuote> {
    if deposit_amount == 0 {
        return Err(VaultError::AmountTooSmall);
    }

    let deposit_usd_value = asset_usd_value(
        deposit_asset,
        deposit_amount,
        deposit_asset_decimals,
        deposit_asset_price,
    )?;

    let nav = compute_nav(ledger, all_prices, Some(shares_supply))?;
    if nav == 0 {
        return Err(VaultError::AmountTooSmall);
    }

    let minted_shares = to_u64(mul_div(deposit_usd_value, ONE_SHARE, nav)?)?;
    if minted_shares == 0 {
        return Err(VaultError::AmountTooSmall);
    }

    tracing::debug!(
        vault = ledger.symbol(),
        asset = %deposit_asset,
        deposit_amount,
        deposit_usd_value,
        nav,
        minted_shares,
        "mint sized"
    );

    Ok(MintQuote {
        minted_shares,
        deposit_usd_value,
        nav,
    })
}
