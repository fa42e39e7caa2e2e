//! # Valuation
//!
//! Turns custodied balances and a price snapshot into USD figures:
//!
//! ```text
//! value(asset) = balance * mantissa * 10^(AUM_PRECISION + exponent - decimals)
//! AUM          = Σ value(asset)                      (8 fractional digits)
//! NAV          = AUM * 10^SHARES_DECIMALS / supply   (1 USD when supply = 0)
//! ```
//!
//! Everything here is a pure function over already-fetched quotes. Any
//! failure aborts the whole valuation; a partial AUM is never returned.

use serde::{Deserialize, Serialize};

use crate::config::{AUM_PRECISION, ONE_SHARE};
use crate::error::{VaultError, VaultResult};
use crate::ledger::VaultLedger;
use crate::math::{check_headroom, guarded_scaled_multiply_divide, mul_div, split_exponent};
use crate::pricing::{PriceQuote, PriceSnapshot};
use crate::registry::AssetTypeId;

/// USD value of `balance` smallest units of an asset, at AUM precision.
///
/// # Errors
///
/// - [`VaultError::InvalidPrice`] if the mantissa is zero or negative.
/// - [`VaultError::ArithmeticOverflow`] if
///   `u128::MAX / 10^AUM_PRECISION / balance` does not exceed the mantissa,
///   or if the rescale itself overflows.
pub fn asset_usd_value(
    asset: &AssetTypeId,
    balance: u64,
    decimals: u8,
    quote: &PriceQuote,
) -> VaultResult<u128> {
    if quote.mantissa <= 0 {
        return Err(VaultError::InvalidPrice {
            asset: asset.clone(),
            mantissa: quote.mantissa,
        });
    }
    let balance = balance as u128;
    let mantissa = quote.mantissa as u128;

    check_headroom(balance, mantissa, AUM_PRECISION)?;

    let net = AUM_PRECISION as i64 + quote.exponent as i64 - decimals as i64;
    let (scale_mul, scale_div) = split_exponent(net)?;
    guarded_scaled_multiply_divide(balance, mantissa, scale_mul, scale_div)
}

/// Total USD value of every asset position in the ledger.
pub fn compute_aum(ledger: &VaultLedger, prices: &PriceSnapshot) -> VaultResult<u128> {
    let mut aum: u128 = 0;
    for entry in ledger.entries() {
        let quote = prices.require(&entry.type_id)?;
        let value = asset_usd_value(&entry.type_id, entry.balance, entry.decimals, quote)?;
        aum = aum.checked_add(value).ok_or(VaultError::ArithmeticOverflow)?;
    }
    tracing::debug!(vault = ledger.symbol(), aum, "aum computed");
    Ok(aum)
}

/// USD value of one share at shares precision.
///
/// An absent or zero supply yields exactly one dollar (`10^SHARES_DECIMALS`),
/// seeding the first deposit at a 1:1 USD-to-share rate. A zero AUM with a
/// nonzero supply yields zero, which issuance rejects downstream.
pub fn compute_nav(
    ledger: &VaultLedger,
    prices: &PriceSnapshot,
    shares_supply: Option<u64>,
) -> VaultResult<u128> {
    match shares_supply {
        None | Some(0) => Ok(ONE_SHARE),
        Some(supply) => {
            let aum = compute_aum(ledger, prices)?;
            mul_div(aum, ONE_SHARE, supply as u128)
        }
    }
}

// ---------------------------------------------------------------------------
// Valuation report
// ---------------------------------------------------------------------------

/// USD value of a single position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetValuation {
    pub type_id: AssetTypeId,
    pub balance: u64,
    pub decimals: u8,
    pub usd_value: u128,
}

/// A full valuation of a vault against one price snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Valuation {
    /// Vault symbol.
    pub symbol: String,
    /// Sum of all position values.
    pub aum: u128,
    /// USD per share at shares precision.
    pub nav: u128,
    /// Shares supply the NAV was computed against.
    pub shares_supply: u64,
    /// Per-position breakdown in ledger order.
    pub assets: Vec<AssetValuation>,
}

impl Valuation {
    /// Values every position and derives AUM and NAV from the same figures.
    pub fn compute(
        ledger: &VaultLedger,
        prices: &PriceSnapshot,
        shares_supply: u64,
    ) -> VaultResult<Self> {
        let mut assets = Vec::with_capacity(ledger.entries().len());
        let mut aum: u128 = 0;
        for entry in ledger.entries() {
            let quote = prices.require(&entry.type_id)?;
            let usd_value = asset_usd_value(&entry.type_id, entry.balance, entry.decimals, quote)?;
            aum = aum
                .checked_add(usd_value)
                .ok_or(VaultError::ArithmeticOverflow)?;
            assets.push(AssetValuation {
                type_id: entry.type_id.clone(),
                balance: entry.balance,
                decimals: entry.decimals,
                usd_value,
            });
        }

        let nav = if shares_supply == 0 {
            ONE_SHARE
        } else {
            mul_div(aum, ONE_SHARE, shares_supply as u128)?
        };

        Ok(Self {
            symbol: ledger.symbol().to_string(),
            aum,
            nav,
            shares_supply,
            assets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weth() -> AssetTypeId {
        AssetTypeId::from("0x1::coin::WETH")
    }

    fn usdc() -> AssetTypeId {
        AssetTypeId::from("0x1::coin::USDC")
    }

    fn eth_quote() -> PriceQuote {
        // $3000.00000000
        PriceQuote::new(300_000_000_000, -8)
    }

    fn usdc_quote() -> PriceQuote {
        // $1.000000
        PriceQuote::new(1_000_000, -6)
    }

    fn two_asset_vault() -> (VaultLedger, PriceSnapshot) {
        let mut ledger = VaultLedger::new("alice", "Index", "IDX").unwrap();
        ledger.credit(&weth(), 8, 100_000_000).unwrap(); // 1.0 WETH
        ledger.credit(&usdc(), 6, 2_500_000_000).unwrap(); // 2500 USDC
        let prices = PriceSnapshot::bind(&ledger.asset_ids(), vec![eth_quote(), usdc_quote()])
            .unwrap();
        (ledger, prices)
    }

    #[test]
    fn one_eth_at_3000_is_3000_usd() {
        let value = asset_usd_value(&weth(), 100_000_000, 8, &eth_quote()).unwrap();
        assert_eq!(value, 300_000_000_000);
    }

    #[test]
    fn rescales_across_decimals_and_exponents() {
        // 2500 USDC (6 decimals) at $1 with exponent -6.
        let value = asset_usd_value(&usdc(), 2_500_000_000, 6, &usdc_quote()).unwrap();
        assert_eq!(value, 250_000_000_000);

        // Positive exponent: 3 units (0 decimals) at 2 * 10^3 = $6000.
        let quote = PriceQuote::new(2, 3);
        let value = asset_usd_value(&usdc(), 3, 0, &quote).unwrap();
        assert_eq!(value, 6_000 * 100_000_000);
    }

    #[test]
    fn sub_cent_values_floor() {
        // 1 wei-like unit of an 18-decimal asset at $3000 rounds to zero.
        let value = asset_usd_value(&weth(), 1, 18, &eth_quote()).unwrap();
        assert_eq!(value, 0);
    }

    #[test]
    fn non_positive_price_is_a_hard_failure() {
        for mantissa in [0, -5] {
            let quote = PriceQuote::new(mantissa, -8);
            let result = asset_usd_value(&weth(), 1, 8, &quote);
            assert!(matches!(result, Err(VaultError::InvalidPrice { .. })));
        }
    }

    #[test]
    fn overflow_guard_trips() {
        let quote = PriceQuote::new(i64::MAX, 0);
        let result = asset_usd_value(&weth(), u64::MAX, 0, &quote);
        assert!(matches!(result, Err(VaultError::ArithmeticOverflow)));
    }

    #[test]
    fn positive_exponent_rescale_is_headroom_checked() {
        // Clears the AUM-precision check but not the 10^28 rescale.
        let quote = PriceQuote::new(1, 20);
        let result = asset_usd_value(&weth(), u64::MAX, 0, &quote);
        assert!(matches!(result, Err(VaultError::ArithmeticOverflow)));

        // Same scale with a small balance stays in range.
        let value = asset_usd_value(&weth(), 3, 0, &quote).unwrap();
        assert_eq!(value, 3 * 10u128.pow(28));
    }

    #[test]
    fn aum_is_additive() {
        let (ledger, prices) = two_asset_vault();
        let aum = compute_aum(&ledger, &prices).unwrap();
        let eth = asset_usd_value(&weth(), 100_000_000, 8, &eth_quote()).unwrap();
        let usd = asset_usd_value(&usdc(), 2_500_000_000, 6, &usdc_quote()).unwrap();
        assert_eq!(aum, eth + usd);
        assert_eq!(aum, 550_000_000_000);
    }

    #[test]
    fn aum_aborts_on_any_bad_price() {
        let (ledger, _) = two_asset_vault();
        let prices = PriceSnapshot::bind(
            &ledger.asset_ids(),
            vec![eth_quote(), PriceQuote::new(0, -6)],
        )
        .unwrap();
        assert!(compute_aum(&ledger, &prices).is_err());
    }

    #[test]
    fn aum_requires_a_quote_per_entry() {
        let (ledger, _) = two_asset_vault();
        let prices = PriceSnapshot::bind(&[weth()], vec![eth_quote()]).unwrap();
        assert!(matches!(
            compute_aum(&ledger, &prices),
            Err(VaultError::PriceCountMismatch { .. })
        ));
    }

    #[test]
    fn nav_defaults_to_one_dollar_without_supply() {
        let (ledger, prices) = two_asset_vault();
        assert_eq!(compute_nav(&ledger, &prices, None).unwrap(), ONE_SHARE);
        assert_eq!(compute_nav(&ledger, &prices, Some(0)).unwrap(), ONE_SHARE);
    }

    #[test]
    fn nav_divides_aum_by_supply() {
        let (ledger, prices) = two_asset_vault();
        // $5500 AUM over 2750 shares = $2 per share.
        let nav = compute_nav(&ledger, &prices, Some(2_750 * 100_000_000)).unwrap();
        assert_eq!(nav, 200_000_000);
    }

    #[test]
    fn nav_of_empty_vault_with_supply_is_zero() {
        let ledger = VaultLedger::new("alice", "Index", "IDX").unwrap();
        let prices = PriceSnapshot::default();
        assert_eq!(compute_nav(&ledger, &prices, Some(100)).unwrap(), 0);
    }

    #[test]
    fn valuation_report_matches_engine() {
        let (ledger, prices) = two_asset_vault();
        let supply = 5_500 * 100_000_000;
        let report = Valuation::compute(&ledger, &prices, supply).unwrap();
        assert_eq!(report.aum, compute_aum(&ledger, &prices).unwrap());
        assert_eq!(report.nav, compute_nav(&ledger, &prices, Some(supply)).unwrap());
        assert_eq!(report.assets.len(), 2);
        assert_eq!(report.assets[0].type_id, weth());
    }
}
