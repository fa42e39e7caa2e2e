//! # Redemption Waterfall
//!
//! Converts a shares burn into a payout drawn from up to three candidate
//! assets, in the order the caller names them:
//!
//! ```text
//! burned    = floor(holder_shares * bps / 10_000)
//! target    = burned * NAV / 10^SHARES_DECIMALS
//! for asset in candidates:
//!     if value(asset) >= remaining:
//!         pay floor(balance * remaining / value(asset)); stop
//!     else:
//!         pay the whole balance; remaining -= value(asset)
//! remaining > 0  =>  InsufficientLiquidity, nothing paid
//! ```
//!
//! The caller's order is policy and is never rebalanced by size or price.
//! The fractional step floors, so rounding always favors the vault.

use serde::{Deserialize, Serialize};

use crate::config::{BPS_DENOMINATOR, MAX_WITHDRAW_ASSETS, ONE_SHARE};
use crate::error::{VaultError, VaultResult};
use crate::ledger::VaultLedger;
use crate::math::{mul_div, to_u64};
use crate::pricing::PriceSnapshot;
use crate::registry::{AssetRegistry, AssetTypeId};
use crate::valuation::{asset_usd_value, compute_nav};

/// One asset paid out by a withdrawal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutLeg {
    pub asset: AssetTypeId,
    /// Amount in the asset's smallest unit.
    pub amount: u64,
    pub decimals: u8,
    /// USD value of `amount`, at AUM precision.
    pub usd_value: u128,
}

/// Everything a withdrawal will settle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalPlan {
    /// Assets paid out, in waterfall order. One to three legs.
    pub legs: Vec<PayoutLeg>,
    /// Shares burned from the holder.
    pub shares_burned: u64,
    /// USD value owed for the burned shares.
    pub total_usd_value: u128,
    /// NAV used for the conversion.
    pub nav: u128,
    /// `true` when the holder redeemed 100% of their shares.
    pub full_exit: bool,
}

impl WithdrawalPlan {
    /// Sum of the USD values of every leg.
    pub fn paid_usd_value(&self) -> u128 {
        self.legs.iter().map(|l| l.usd_value).sum()
    }
}

/// Checks a withdrawal candidate list: 1–3 entries, all supported, no
/// duplicates.
pub fn validate_candidates(candidates: &[AssetTypeId], registry: &AssetRegistry) -> VaultResult<()> {
    if candidates.is_empty() {
        return Err(VaultError::InvalidAssetList(
            "at least one candidate asset is required".into(),
        ));
    }
    if candidates.len() > MAX_WITHDRAW_ASSETS {
        return Err(VaultError::InvalidAssetList(format!(
            "at most {} candidate assets, got {}",
            MAX_WITHDRAW_ASSETS,
            candidates.len()
        )));
    }
    for (i, asset) in candidates.iter().enumerate() {
        registry.require(asset)?;
        if candidates[..i].contains(asset) {
            return Err(VaultError::DuplicateAsset(asset.clone()));
        }
    }
    Ok(())
}

/// `floor(holder_shares * bps / 10_000)`.
///
/// # Errors
///
/// [`VaultError::InvalidPercentage`] outside `1..=10000`;
/// [`VaultError::AmountTooSmall`] when the result is zero.
pub fn shares_to_burn(holder_shares: u64, percentage_bps: u64) -> VaultResult<u64> {
    if percentage_bps == 0 || percentage_bps > BPS_DENOMINATOR {
        return Err(VaultError::InvalidPercentage(percentage_bps));
    }
    let burned = to_u64(mul_div(
        holder_shares as u128,
        percentage_bps as u128,
        BPS_DENOMINATOR as u128,
    )?)?;
    if burned == 0 {
        return Err(VaultError::AmountTooSmall);
    }
    Ok(burned)
}

/// Plans a withdrawal of `percentage_bps` of `holder_shares`.
///
/// `all_prices` must cover every ledger entry. Candidates the vault holds
/// nothing of (or whose holding is worth less than the USD precision) are
/// passed over without being recorded.
///
/// # Errors
///
/// Candidate validation errors, [`VaultError::AmountTooSmall`] for a zero
/// burn, target or payout, [`VaultError::InsufficientLiquidity`] when the
/// candidates cannot cover the target, and any valuation error.
pub fn calc_withdraw_amounts(
    holder_shares: u64,
    percentage_bps: u64,
    candidates: &[AssetTypeId],
    registry: &AssetRegistry,
    all_prices: &PriceSnapshot,
    ledger: &VaultLedger,
    shares_supply: u64,
) -> VaultResult<WithdrawalPlan> {
    validate_candidates(candidates, registry)?;
    let shares_burned = shares_to_burn(holder_shares, percentage_bps)?;

    let nav = compute_nav(ledger, all_prices, Some(shares_supply))?;
    let total_usd_value = mul_div(shares_burned as u128, nav, ONE_SHARE)?;
    if total_usd_value == 0 {
        return Err(VaultError::AmountTooSmall);
    }

    let mut legs = Vec::with_capacity(candidates.len());
    let mut remaining = total_usd_value;

    for asset in candidates {
        let Some(entry) = ledger.entry(asset) else {
            continue;
        };
        if entry.balance == 0 {
            continue;
        }
        let quote = all_prices.require(asset)?;
        let value = asset_usd_value(asset, entry.balance, entry.decimals, quote)?;
        if value == 0 {
            continue;
        }

        if value >= remaining {
            let amount = to_u64(mul_div(entry.balance as u128, remaining, value)?)?;
            if amount > 0 {
                // Value of the floored amount, not of the remaining target.
                let usd_value = asset_usd_value(asset, amount, entry.decimals, quote)?;
                legs.push(PayoutLeg {
                    asset: asset.clone(),
                    amount,
                    decimals: entry.decimals,
                    usd_value,
                });
            }
            remaining = 0;
            break;
        }

        legs.push(PayoutLeg {
            asset: asset.clone(),
            amount: entry.balance,
            decimals: entry.decimals,
            usd_value: value,
        });
        remaining -= value;
    }

    if remaining > 0 {
        return Err(VaultError::InsufficientLiquidity {
            target: total_usd_value,
            covered: total_usd_value - remaining,
        });
    }
    if legs.is_empty() {
        return Err(VaultError::AmountTooSmall);
    }

    tracing::debug!(
        vault = ledger.symbol(),
        shares_burned,
        total_usd_value,
        legs = legs.len(),
        "withdrawal planned"
    );

    Ok(WithdrawalPlan {
        legs,
        shares_burned,
        total_usd_value,
        nav,
        full_exit: percentage_bps == BPS_DENOMINATOR,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::PriceQuote;
    use crate::registry::AssetDescriptor;

    fn a() -> AssetTypeId {
        AssetTypeId::from("A")
    }
    fn b() -> AssetTypeId {
        AssetTypeId::from("B")
    }
    fn c() -> AssetTypeId {
        AssetTypeId::from("C")
    }
    fn d() -> AssetTypeId {
        AssetTypeId::from("D")
    }

    fn registry() -> AssetRegistry {
        AssetRegistry::from_descriptors([
            AssetDescriptor::new("A", "A", "Asset A", 8, "fa"),
            AssetDescriptor::new("B", "B", "Asset B", 8, "fb"),
            AssetDescriptor::new("C", "C", "Asset C", 8, "fc"),
            AssetDescriptor::new("D", "D", "Asset D", 0, "fd"),
        ])
        .unwrap()
    }

    /// Three assets priced at $1 with 8 decimals, so balance == USD value.
    fn vault(balances: [u64; 3]) -> (VaultLedger, PriceSnapshot) {
        let mut ledger = VaultLedger::new("alice", "Index", "IDX").unwrap();
        ledger.credit(&a(), 8, balances[0]).unwrap();
        ledger.credit(&b(), 8, balances[1]).unwrap();
        ledger.credit(&c(), 8, balances[2]).unwrap();
        let one_dollar = PriceQuote::new(100_000_000, -8);
        let prices =
            PriceSnapshot::bind(&ledger.asset_ids(), vec![one_dollar; 3]).unwrap();
        (ledger, prices)
    }

    fn total(balances: [u64; 3]) -> u64 {
        balances.iter().sum()
    }

    #[test]
    fn burn_floors_basis_points() {
        assert_eq!(shares_to_burn(10_000, 10_000).unwrap(), 10_000);
        assert_eq!(shares_to_burn(10_000, 1).unwrap(), 1);
        assert_eq!(shares_to_burn(3, 5_000).unwrap(), 1);
        assert!(matches!(
            shares_to_burn(1, 1),
            Err(VaultError::AmountTooSmall)
        ));
        assert!(matches!(
            shares_to_burn(100, 0),
            Err(VaultError::InvalidPercentage(0))
        ));
        assert!(matches!(
            shares_to_burn(100, 10_001),
            Err(VaultError::InvalidPercentage(10_001))
        ));
    }

    #[test]
    fn candidate_list_validation() {
        let reg = registry();
        assert!(validate_candidates(&[a()], &reg).is_ok());
        assert!(matches!(
            validate_candidates(&[], &reg),
            Err(VaultError::InvalidAssetList(_))
        ));
        assert!(matches!(
            validate_candidates(&[a(), b(), c(), d()], &reg),
            Err(VaultError::InvalidAssetList(_))
        ));
        assert!(matches!(
            validate_candidates(&[a(), b(), a()], &reg),
            Err(VaultError::DuplicateAsset(_))
        ));
        assert!(matches!(
            validate_candidates(&[a(), AssetTypeId::from("Z")], &reg),
            Err(VaultError::NotSupportedAsset(_))
        ));
    }

    #[test]
    fn first_asset_covers_everything() {
        let balances = [1_000, 1_000, 1_000];
        let (ledger, prices) = vault(balances);
        let supply = total(balances);

        // Holder owns 600 shares at $1 NAV and redeems half.
        let plan =
            calc_withdraw_amounts(600, 5_000, &[a(), b(), c()], &registry(), &prices, &ledger, supply)
                .unwrap();
        assert_eq!(plan.shares_burned, 300);
        assert_eq!(plan.total_usd_value, 300);
        assert_eq!(plan.legs.len(), 1);
        assert_eq!(plan.legs[0].asset, a());
        assert_eq!(plan.legs[0].amount, 300);
        assert!(!plan.full_exit);
    }

    #[test]
    fn second_asset_only_when_first_falls_short() {
        let balances = [100, 1_000, 1_000];
        let (ledger, prices) = vault(balances);
        let supply = total(balances);

        let plan =
            calc_withdraw_amounts(250, 10_000, &[a(), b(), c()], &registry(), &prices, &ledger, supply)
                .unwrap();
        assert_eq!(plan.legs.len(), 2);
        assert_eq!((plan.legs[0].asset.clone(), plan.legs[0].amount), (a(), 100));
        assert_eq!((plan.legs[1].asset.clone(), plan.legs[1].amount), (b(), 150));
        assert_eq!(plan.paid_usd_value(), 250);
        assert!(plan.full_exit);
    }

    #[test]
    fn third_asset_only_when_first_two_fall_short() {
        let balances = [100, 100, 1_000];
        let (ledger, prices) = vault(balances);
        let supply = total(balances);

        let plan =
            calc_withdraw_amounts(500, 10_000, &[a(), b(), c()], &registry(), &prices, &ledger, supply)
                .unwrap();
        let amounts: Vec<u64> = plan.legs.iter().map(|l| l.amount).collect();
        assert_eq!(amounts, vec![100, 100, 300]);
    }

    #[test]
    fn caller_order_is_respected() {
        let balances = [1_000, 1_000, 1_000];
        let (ledger, prices) = vault(balances);
        let supply = total(balances);

        let plan =
            calc_withdraw_amounts(200, 10_000, &[c(), a()], &registry(), &prices, &ledger, supply)
                .unwrap();
        assert_eq!(plan.legs.len(), 1);
        assert_eq!(plan.legs[0].asset, c());
    }

    #[test]
    fn exhausted_candidates_fail_with_no_plan() {
        let balances = [100, 100, 100];
        let (ledger, prices) = vault(balances);
        // Holder claims 301 shares against a vault worth $300 at NAV $1.
        let supply = total(balances);

        let result =
            calc_withdraw_amounts(301, 10_000, &[a(), b(), c()], &registry(), &prices, &ledger, supply);
        assert!(matches!(
            result,
            Err(VaultError::InsufficientLiquidity {
                target: 301,
                covered: 300
            })
        ));
    }

    #[test]
    fn uncovered_by_subset_of_assets() {
        let balances = [100, 100, 1_000];
        let (ledger, prices) = vault(balances);
        let supply = total(balances);

        let result =
            calc_withdraw_amounts(500, 10_000, &[a(), b()], &registry(), &prices, &ledger, supply);
        assert!(matches!(
            result,
            Err(VaultError::InsufficientLiquidity { .. })
        ));
    }

    #[test]
    fn empty_and_unheld_candidates_are_skipped() {
        let balances = [0, 1_000, 1_000];
        let (ledger, prices) = vault(balances);
        let supply = total(balances);

        let plan = calc_withdraw_amounts(
            100,
            10_000,
            &[d(), a(), b()],
            &registry(),
            &prices,
            &ledger,
            supply,
        )
        .unwrap();
        assert_eq!(plan.legs.len(), 1);
        assert_eq!(plan.legs[0].asset, b());
    }

    #[test]
    fn fractional_step_floors_in_favor_of_vault() {
        // Ten whole units worth $3 each.
        let mut ledger = VaultLedger::new("alice", "Index", "IDX").unwrap();
        ledger.credit(&d(), 0, 10).unwrap();
        let prices =
            PriceSnapshot::bind(&ledger.asset_ids(), vec![PriceQuote::new(3, 0)]).unwrap();
        // $30 AUM over 30 shares: NAV $1.
        let supply = 3_000_000_000;

        // Redeem $5: 5 / 3 = 1.67 units, floored to 1.
        let plan = calc_withdraw_amounts(
            500_000_000,
            10_000,
            &[d()],
            &registry(),
            &prices,
            &ledger,
            supply,
        )
        .unwrap();
        assert_eq!(plan.legs[0].asset, d());
        assert_eq!(plan.legs[0].amount, 1);
        assert_eq!(plan.total_usd_value, 500_000_000);

        // The leg reports what one $3 unit is worth, not the $5 target.
        let quote = prices.require(&d()).unwrap();
        for leg in &plan.legs {
            assert_eq!(
                leg.usd_value,
                asset_usd_value(&leg.asset, leg.amount, leg.decimals, quote).unwrap()
            );
        }
        assert_eq!(plan.legs[0].usd_value, 300_000_000);
        assert_eq!(plan.paid_usd_value(), 300_000_000);
        assert!(plan.paid_usd_value() <= plan.total_usd_value);
    }

    #[test]
    fn partial_leg_value_matches_paid_amount_across_legs() {
        let mut ledger = VaultLedger::new("alice", "Index", "IDX").unwrap();
        ledger.credit(&a(), 8, 100).unwrap();
        ledger.credit(&d(), 0, 10).unwrap();
        let prices = PriceSnapshot::bind(
            &ledger.asset_ids(),
            vec![PriceQuote::new(100_000_000, -8), PriceQuote::new(3, 0)],
        )
        .unwrap();
        // AUM = 100 + 3_000_000_000 USD units; supply equal to AUM keeps NAV at $1.
        let supply = 3_000_000_100;

        let plan = calc_withdraw_amounts(
            500_000_100,
            10_000,
            &[a(), d()],
            &registry(),
            &prices,
            &ledger,
            supply,
        )
        .unwrap();
        assert_eq!(plan.legs.len(), 2);
        assert_eq!(plan.legs[0].usd_value, 100);
        assert_eq!(plan.legs[1].amount, 1);
        assert_eq!(plan.legs[1].usd_value, 300_000_000);
        assert_eq!(plan.paid_usd_value(), 300_000_100);
        assert!(plan.paid_usd_value() <= plan.total_usd_value);
    }

    #[test]
    fn dust_payout_rejected() {
        // A target of one USD unit buys no whole unit of a $3 asset.
        let mut ledger = VaultLedger::new("alice", "Index", "IDX").unwrap();
        ledger.credit(&d(), 0, 10).unwrap();
        let prices =
            PriceSnapshot::bind(&ledger.asset_ids(), vec![PriceQuote::new(3, 0)]).unwrap();
        let result = calc_withdraw_amounts(
            1,
            10_000,
            &[d()],
            &registry(),
            &prices,
            &ledger,
            3_000_000_000,
        );
        assert!(matches!(result, Err(VaultError::AmountTooSmall)));
    }
}
