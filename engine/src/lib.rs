// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Index Vault: Valuation and Settlement Engine
//!
//! Accounting core for multi-asset index vaults. A vault custodies a basket
//! of assets and issues a pooled shares token against it. This crate prices
//! the basket (AUM), derives the value of one share (NAV), sizes share
//! issuance on deposit, and splits redemptions across up to three assets
//! with an ordered withdrawal waterfall.
//!
//! All arithmetic is unsigned fixed-point over `u128` with explicit
//! headroom checks. Given the same ledger and the same price quotes, every
//! result is bit-exact.
//!
//! ## Architecture
//!
//! - **math**: overflow-checked scaled multiply/divide.
//! - **registry**: supported-asset catalog.
//! - **ledger**: per-vault balances, holders and identity.
//! - **pricing**: gateway trait and per-operation price snapshots.
//! - **valuation**: AUM and NAV.
//! - **issuance**: deposit to minted shares.
//! - **redemption**: shares burn to an ordered multi-asset payout.
//! - **settlement**: instructions handed to the external token layer.
//! - **service**: end-to-end deposit, withdrawal and swap orchestration.
//! - **storage**: sled persistence for the registry and ledgers.
//! - **config**: precisions and protocol limits.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use index_vault::prelude::*;
//!
//! let custody = Arc::new(InMemoryCustody::new());
//! let service = SettlementService::new(custody.clone());
//! service
//!     .register_asset(AssetDescriptor::new("0x1::coin::WETH", "WETH", "Wrapped Ether", 8, "eth-usd"))
//!     .unwrap();
//! service.create_vault("alice", "Blue Chip Index", "BCI").unwrap();
//!
//! let prices = StaticPriceFeed::new();
//! prices.publish("eth-usd", 300_000_000_000, -8);
//!
//! let weth = AssetTypeId::from("0x1::coin::WETH");
//! custody.fund("bob", &weth, 100_000_000).unwrap();
//! let receipt = service.deposit("BCI", "bob", &weth, 100_000_000, &prices).unwrap();
//! assert_eq!(receipt.minted_shares, 3_000 * ONE_SHARE as u64);
//! ```

pub mod config;
pub mod error;
pub mod issuance;
pub mod ledger;
pub mod math;
pub mod pricing;
pub mod redemption;
pub mod registry;
pub mod service;
pub mod settlement;
pub mod storage;
pub mod valuation;

pub use error::{VaultError, VaultResult};

/// The types most callers need.
pub mod prelude {
    pub use crate::config::{AUM_PRECISION, ONE_SHARE, SHARES_DECIMALS};
    pub use crate::error::{VaultError, VaultResult};
    pub use crate::ledger::VaultLedger;
    pub use crate::pricing::{PriceQuote, PriceSnapshot, PricingGateway, StaticPriceFeed};
    pub use crate::registry::{AssetDescriptor, AssetRegistry, AssetTypeId, FeedId};
    pub use crate::service::{DepositReceipt, SettlementService, WithdrawalReceipt};
    pub use crate::settlement::{CustodyLedger, InMemoryCustody, SettlementInstruction, SwapRouter};
    pub use crate::storage::VaultDb;
    pub use crate::valuation::Valuation;
}
