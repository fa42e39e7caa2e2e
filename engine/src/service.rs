//! # Settlement Service
//!
//! Runs deposits, withdrawals and rebalancing swaps end to end. Each
//! operation is one unit of work against one vault:
//!
//! ```text
//! lock vault ─► guards ─► price snapshot ─► engine math ─► stage clone
//!            ─► persist staged ─► custody.apply(batch) ─► commit
//!                                      │
//!                                      └─ on error: persist previous, abort
//! ```
//!
//! ## Concurrency
//!
//! - Vault handles live in a `DashMap<symbol, Arc<Mutex<VaultLedger>>>`.
//!   An operation clones the `Arc` out of the map and holds the vault's
//!   mutex for its whole duration, so operations on one vault are
//!   serialized while different vaults settle in parallel.
//! - The registry sits behind a `parking_lot::RwLock`. Settlement takes
//!   read locks; only `register_asset` writes.
//! - Lock order is vault, then registry.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{VaultError, VaultResult};
use crate::issuance::calc_mint_shares;
use crate::ledger::{HolderRecord, VaultAssetEntry, VaultLedger};
use crate::pricing::{fetch_snapshot, PricingGateway};
use crate::redemption::{calc_withdraw_amounts, PayoutLeg};
use crate::registry::{AssetDescriptor, AssetRegistry, AssetTypeId};
use crate::settlement::{CustodyLedger, SettlementInstruction, SwapRouter};
use crate::storage::VaultDb;
use crate::valuation::Valuation;

// ---------------------------------------------------------------------------
// Receipts and views
// ---------------------------------------------------------------------------

/// Outcome of a committed deposit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositReceipt {
    pub receipt_id: Uuid,
    pub vault: String,
    pub holder: String,
    pub asset: AssetTypeId,
    pub amount: u64,
    pub minted_shares: u64,
    pub deposit_usd_value: u128,
    /// NAV before the deposit landed.
    pub nav: u128,
    pub settled_at: DateTime<Utc>,
}

/// Outcome of a committed withdrawal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalReceipt {
    pub receipt_id: Uuid,
    pub vault: String,
    pub holder: String,
    pub shares_burned: u64,
    pub total_usd_value: u128,
    pub nav: u128,
    pub payouts: Vec<PayoutLeg>,
    /// `true` if the withdrawal was a full exit and the holder record was
    /// dropped.
    pub holder_removed: bool,
    pub settled_at: DateTime<Utc>,
}

/// Outcome of a committed rebalancing swap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapReceipt {
    pub receipt_id: Uuid,
    pub vault: String,
    pub from: AssetTypeId,
    pub amount_in: u64,
    pub to: AssetTypeId,
    pub amount_out: u64,
    pub settled_at: DateTime<Utc>,
}

/// One row of the vault list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSummary {
    pub symbol: String,
    pub name: String,
    pub creator: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub asset_count: usize,
    pub holder_count: usize,
}

impl VaultSummary {
    fn of(ledger: &VaultLedger) -> Self {
        Self {
            symbol: ledger.symbol().to_string(),
            name: ledger.name().to_string(),
            creator: ledger.creator().to_string(),
            address: ledger.address().to_string(),
            created_at: ledger.created_at(),
            asset_count: ledger.entries().len(),
            holder_count: ledger.holder_count(),
        }
    }
}

/// A vault's identity plus its asset positions in ledger order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultComposition {
    pub symbol: String,
    pub name: String,
    pub creator: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub assets: Vec<VaultAssetEntry>,
}

/// A holder record joined with the holder's current shares balance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderView {
    pub holder: String,
    pub last_deposit: DateTime<Utc>,
    pub shares: u64,
}

// ---------------------------------------------------------------------------
// SettlementService
// ---------------------------------------------------------------------------

type VaultHandle = Arc<Mutex<VaultLedger>>;

/// Owns every vault of a deployment and settles operations against them.
pub struct SettlementService {
    registry: RwLock<AssetRegistry>,
    vaults: DashMap<String, VaultHandle>,
    custody: Arc<dyn CustodyLedger>,
    db: Option<VaultDb>,
}

impl SettlementService {
    /// Creates an in-memory service with an empty registry.
    pub fn new(custody: Arc<dyn CustodyLedger>) -> Self {
        Self {
            registry: RwLock::new(AssetRegistry::new()),
            vaults: DashMap::new(),
            custody,
            db: None,
        }
    }

    /// Creates an empty service that persists to `db`.
    pub fn with_db(custody: Arc<dyn CustodyLedger>, db: VaultDb) -> Self {
        Self {
            db: Some(db),
            ..Self::new(custody)
        }
    }

    /// Rebuilds a service from everything stored in `db`.
    pub fn restore(custody: Arc<dyn CustodyLedger>, db: VaultDb) -> VaultResult<Self> {
        let registry = db.load_registry()?;
        let vaults = DashMap::new();
        for ledger in db.load_vaults()? {
            for entry in ledger.entries() {
                if !registry.is_supported(&entry.type_id) {
                    tracing::warn!(
                        vault = ledger.symbol(),
                        asset = %entry.type_id,
                        "restored vault holds an asset missing from the registry"
                    );
                }
            }
            vaults.insert(ledger.symbol().to_string(), Arc::new(Mutex::new(ledger)));
        }
        tracing::info!(
            assets = registry.len(),
            vaults = vaults.len(),
            "settlement state restored"
        );
        Ok(Self {
            registry: RwLock::new(registry),
            vaults,
            custody,
            db: Some(db),
        })
    }

    /// The custody layer this service settles against.
    pub fn custody(&self) -> &Arc<dyn CustodyLedger> {
        &self.custody
    }

    fn vault(&self, symbol: &str) -> VaultResult<VaultHandle> {
        self.vaults
            .get(symbol)
            .map(|h| Arc::clone(h.value()))
            .ok_or_else(|| VaultError::VaultNotFound(symbol.to_string()))
    }

    /// Persists `staged`, applies `instructions` to custody, then swaps
    /// `staged` into `ledger`. If custody fails, the stored copy is reset
    /// to `ledger` and the error is returned.
    fn settle(
        &self,
        ledger: &mut VaultLedger,
        staged: VaultLedger,
        instructions: &[SettlementInstruction],
    ) -> VaultResult<()> {
        if let Some(db) = &self.db {
            db.put_vault(&staged)?;
        }
        if let Err(err) = self.custody.apply(instructions) {
            if let Some(db) = &self.db {
                if let Err(db_err) = db.put_vault(ledger) {
                    tracing::error!(
                        vault = ledger.symbol(),
                        error = %db_err,
                        "failed to restore persisted ledger after custody rejection"
                    );
                }
            }
            return Err(err.into());
        }
        *ledger = staged;
        Ok(())
    }

    // -- Registry -----------------------------------------------------------

    /// Adds a supported asset.
    pub fn register_asset(&self, descriptor: AssetDescriptor) -> VaultResult<()> {
        let mut registry = self.registry.write();
        if registry.is_supported(&descriptor.type_id) {
            return Err(VaultError::AssetAlreadySupported(descriptor.type_id));
        }
        if let Some(db) = &self.db {
            db.put_asset(&descriptor)?;
        }
        tracing::info!(
            asset = %descriptor.type_id,
            symbol = %descriptor.symbol,
            decimals = descriptor.decimals,
            "asset supported"
        );
        registry.add(descriptor)
    }

    pub fn is_supported(&self, asset: &AssetTypeId) -> bool {
        self.registry.read().is_supported(asset)
    }

    // -- Vault lifecycle ----------------------------------------------------

    /// Creates an empty vault owned by `creator`.
    ///
    /// # Errors
    ///
    /// [`VaultError::InvalidName`] for a bad name or symbol and
    /// [`VaultError::DuplicateVault`] if the symbol is taken. A rejected
    /// duplicate leaves the existing vault untouched.
    pub fn create_vault(&self, creator: &str, name: &str, symbol: &str) -> VaultResult<VaultSummary> {
        let ledger = VaultLedger::new(creator, name, symbol)?;
        match self.vaults.entry(symbol.to_string()) {
            Entry::Occupied(_) => {
                tracing::warn!(symbol, creator, "vault symbol already registered");
                Err(VaultError::DuplicateVault(symbol.to_string()))
            }
            Entry::Vacant(slot) => {
                if let Some(db) = &self.db {
                    db.put_vault(&ledger)?;
                }
                let summary = VaultSummary::of(&ledger);
                slot.insert(Arc::new(Mutex::new(ledger)));
                tracing::info!(symbol, creator, address = %summary.address, "vault created");
                Ok(summary)
            }
        }
    }

    // -- Deposit ------------------------------------------------------------

    /// Deposits `amount` of `asset` from `holder`'s wallet and mints shares
    /// at the vault's current NAV.
    pub fn deposit(
        &self,
        symbol: &str,
        holder: &str,
        asset: &AssetTypeId,
        amount: u64,
        gateway: &dyn PricingGateway,
    ) -> VaultResult<DepositReceipt> {
        self.deposit_inner(symbol, holder, asset, amount, gateway)
            .map_err(|err| {
                tracing::warn!(vault = symbol, holder, asset = %asset, amount, error = %err, "deposit rejected");
                err
            })
    }

    fn deposit_inner(
        &self,
        symbol: &str,
        holder: &str,
        asset: &AssetTypeId,
        amount: u64,
        gateway: &dyn PricingGateway,
    ) -> VaultResult<DepositReceipt> {
        let handle = self.vault(symbol)?;
        let mut ledger = handle.lock();

        let (decimals, prices) = {
            let registry = self.registry.read();
            let decimals = registry.require(asset)?.decimals;
            if amount == 0 {
                return Err(VaultError::AmountTooSmall);
            }
            let available = self.custody.wallet_balance(holder, asset);
            if available < amount {
                return Err(VaultError::InsufficientBalance {
                    asset: asset.clone(),
                    available,
                    requested: amount,
                });
            }
            let mut priced = ledger.asset_ids();
            priced.push(asset.clone());
            (decimals, fetch_snapshot(gateway, &registry, &priced)?)
        };

        let deposit_price = *prices.require(asset)?;
        let supply = self.custody.shares_supply(symbol);
        let quote = calc_mint_shares(
            asset,
            amount,
            decimals,
            &prices,
            &deposit_price,
            &ledger,
            supply,
        )?;

        let settled_at = Utc::now();
        let mut staged = ledger.clone();
        staged.credit(asset, decimals, amount)?;
        staged.record_deposit(holder, settled_at);

        self.settle(
            &mut ledger,
            staged,
            &[
                SettlementInstruction::Collect {
                    vault: symbol.to_string(),
                    holder: holder.to_string(),
                    asset: asset.clone(),
                    amount,
                },
                SettlementInstruction::Mint {
                    vault: symbol.to_string(),
                    holder: holder.to_string(),
                    amount: quote.minted_shares,
                },
            ],
        )?;

        tracing::info!(
            vault = symbol,
            holder,
            asset = %asset,
            amount,
            minted_shares = quote.minted_shares,
            usd_value = quote.deposit_usd_value,
            "deposit settled"
        );

        Ok(DepositReceipt {
            receipt_id: Uuid::new_v4(),
            vault: symbol.to_string(),
            holder: holder.to_string(),
            asset: asset.clone(),
            amount,
            minted_shares: quote.minted_shares,
            deposit_usd_value: quote.deposit_usd_value,
            nav: quote.nav,
            settled_at,
        })
    }

    // -- Withdrawal ---------------------------------------------------------

    /// Burns `percentage_bps` of `holder`'s shares and pays the value out
    /// of `candidates`, in order.
    pub fn withdraw(
        &self,
        symbol: &str,
        holder: &str,
        percentage_bps: u64,
        candidates: &[AssetTypeId],
        gateway: &dyn PricingGateway,
    ) -> VaultResult<WithdrawalReceipt> {
        self.withdraw_inner(symbol, holder, percentage_bps, candidates, gateway)
            .map_err(|err| {
                tracing::warn!(vault = symbol, holder, percentage_bps, error = %err, "withdrawal rejected");
                err
            })
    }

    fn withdraw_inner(
        &self,
        symbol: &str,
        holder: &str,
        percentage_bps: u64,
        candidates: &[AssetTypeId],
        gateway: &dyn PricingGateway,
    ) -> VaultResult<WithdrawalReceipt> {
        let handle = self.vault(symbol)?;
        let mut ledger = handle.lock();

        let plan = {
            let registry = self.registry.read();
            let prices = fetch_snapshot(gateway, &registry, &ledger.asset_ids())?;
            let holder_shares = self.custody.shares_balance(symbol, holder);
            let supply = self.custody.shares_supply(symbol);
            calc_withdraw_amounts(
                holder_shares,
                percentage_bps,
                candidates,
                &registry,
                &prices,
                &ledger,
                supply,
            )?
        };

        let mut staged = ledger.clone();
        for leg in &plan.legs {
            staged.debit(&leg.asset, leg.amount)?;
        }
        let holder_removed = plan.full_exit && staged.remove_holder(holder);

        self.settle(
            &mut ledger,
            staged,
            &[
                SettlementInstruction::Burn {
                    vault: symbol.to_string(),
                    holder: holder.to_string(),
                    amount: plan.shares_burned,
                },
                SettlementInstruction::Payout {
                    vault: symbol.to_string(),
                    holder: holder.to_string(),
                    assets: plan
                        .legs
                        .iter()
                        .map(|l| (l.asset.clone(), l.amount))
                        .collect(),
                },
            ],
        )?;

        tracing::info!(
            vault = symbol,
            holder,
            shares_burned = plan.shares_burned,
            usd_value = plan.total_usd_value,
            legs = plan.legs.len(),
            holder_removed,
            "withdrawal settled"
        );

        Ok(WithdrawalReceipt {
            receipt_id: Uuid::new_v4(),
            vault: symbol.to_string(),
            holder: holder.to_string(),
            shares_burned: plan.shares_burned,
            total_usd_value: plan.total_usd_value,
            nav: plan.nav,
            payouts: plan.legs,
            holder_removed,
            settled_at: Utc::now(),
        })
    }

    // -- Rebalancing --------------------------------------------------------

    /// Swaps part of one vault position into another asset. Only the vault
    /// creator may rebalance.
    ///
    /// The router is asked for a quote first and nothing executes if the
    /// quote is below `min_out`. Once the router has executed, the ledger
    /// always follows what it reports. A router that delivers less than
    /// `min_out` after quoting enough still has its trade recorded, and the
    /// call returns [`VaultError::SlippageExceeded`].
    #[allow(clippy::too_many_arguments)]
    pub fn swap(
        &self,
        symbol: &str,
        caller: &str,
        from: &AssetTypeId,
        amount_in: u64,
        to: &AssetTypeId,
        min_out: u64,
        router: &dyn SwapRouter,
    ) -> VaultResult<SwapReceipt> {
        let handle = self.vault(symbol)?;
        let mut ledger = handle.lock();

        if ledger.creator() != caller {
            tracing::warn!(vault = symbol, caller, "swap by non-creator rejected");
            return Err(VaultError::NotCreator {
                caller: caller.to_string(),
            });
        }

        let to_decimals = {
            let registry = self.registry.read();
            registry.require(from)?;
            registry.require(to)?.decimals
        };
        if from == to {
            return Err(VaultError::InvalidAssetList(
                "swap requires two distinct assets".into(),
            ));
        }
        if amount_in == 0 {
            return Err(VaultError::AmountTooSmall);
        }

        let mut staged = ledger.clone();
        staged.debit(from, amount_in)?;

        let quoted = router.quote(from, amount_in, to)?;
        if quoted < min_out {
            tracing::warn!(vault = symbol, quoted, min_out, "swap rejected on quote");
            return Err(VaultError::SlippageExceeded {
                received: quoted,
                minimum: min_out,
            });
        }

        let amount_out = router.swap(ledger.address(), from, amount_in, to, min_out)?;
        if amount_out > 0 {
            staged.credit(to, to_decimals, amount_out)?;
        }

        // The router has already moved funds, so memory follows it even if
        // the write below fails.
        *ledger = staged;
        if let Some(db) = &self.db {
            if let Err(err) = db.put_vault(&ledger) {
                tracing::error!(vault = symbol, error = %err, "swap committed but not persisted");
                return Err(err.into());
            }
        }

        if amount_out < min_out {
            tracing::error!(
                vault = symbol,
                from = %from,
                amount_in,
                to = %to,
                quoted,
                amount_out,
                min_out,
                "router delivered below minimum; executed trade recorded"
            );
            return Err(VaultError::SlippageExceeded {
                received: amount_out,
                minimum: min_out,
            });
        }

        tracing::info!(
            vault = symbol,
            from = %from,
            amount_in,
            to = %to,
            amount_out,
            "swap settled"
        );

        Ok(SwapReceipt {
            receipt_id: Uuid::new_v4(),
            vault: symbol.to_string(),
            from: from.clone(),
            amount_in,
            to: to.clone(),
            amount_out,
            settled_at: Utc::now(),
        })
    }

    // -- Queries ------------------------------------------------------------

    /// Supported assets in the order they were added.
    pub fn list_supported_assets(&self) -> Vec<AssetDescriptor> {
        self.registry.read().list().to_vec()
    }

    /// Every vault, ordered by symbol.
    pub fn list_vaults(&self) -> Vec<VaultSummary> {
        let handles: Vec<VaultHandle> = self
            .vaults
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let mut summaries: Vec<VaultSummary> = handles
            .iter()
            .map(|h| VaultSummary::of(&h.lock()))
            .collect();
        summaries.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        summaries
    }

    pub fn vault_count(&self) -> usize {
        self.vaults.len()
    }

    /// Identity and asset positions of one vault.
    pub fn vault_composition(&self, symbol: &str) -> VaultResult<VaultComposition> {
        let handle = self.vault(symbol)?;
        let ledger = handle.lock();
        Ok(VaultComposition {
            symbol: ledger.symbol().to_string(),
            name: ledger.name().to_string(),
            creator: ledger.creator().to_string(),
            address: ledger.address().to_string(),
            created_at: ledger.created_at(),
            assets: ledger.entries().to_vec(),
        })
    }

    /// Current holders of a vault with their shares balances.
    pub fn vault_holders(&self, symbol: &str) -> VaultResult<Vec<HolderView>> {
        let handle = self.vault(symbol)?;
        let ledger = handle.lock();
        Ok(ledger
            .holders()
            .map(|HolderRecord { holder, last_deposit }| HolderView {
                holder: holder.clone(),
                last_deposit: *last_deposit,
                shares: self.custody.shares_balance(symbol, holder),
            })
            .collect())
    }

    /// Values a vault against a fresh snapshot.
    pub fn valuation(&self, symbol: &str, gateway: &dyn PricingGateway) -> VaultResult<Valuation> {
        let handle = self.vault(symbol)?;
        let ledger = handle.lock();
        let prices = {
            let registry = self.registry.read();
            fetch_snapshot(gateway, &registry, &ledger.asset_ids())?
        };
        Valuation::compute(&ledger, &prices, self.custody.shares_supply(symbol))
    }
}
