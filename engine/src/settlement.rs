//! # Settlement Instructions and Custody
//!
//! The engine never moves tokens itself. It computes what must happen and
//! hands a batch of [`SettlementInstruction`]s to a [`CustodyLedger`],
//! which applies the whole batch or none of it.
//!
//! | Instruction | Effect                                             |
//! |-------------|----------------------------------------------------|
//! | `Collect`   | holder wallet → vault (deposit inflow)             |
//! | `Mint`      | new shares to holder, supply grows                 |
//! | `Burn`      | shares destroyed from holder, supply shrinks       |
//! | `Payout`    | vault → holder wallet, one or more assets          |
//!
//! Vault-side asset balances are the [`VaultLedger`](crate::ledger::VaultLedger)'s
//! business. Custody tracks holder wallets and the shares token of each
//! vault (keyed by vault symbol).

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::registry::AssetTypeId;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors reported by the custody layer or a swap router.
#[derive(Debug, Error)]
pub enum CustodyError {
    /// A wallet cannot cover a transfer out of it.
    #[error("insufficient funds: {owner} holds {available} of {asset}, needs {requested}")]
    InsufficientFunds {
        owner: String,
        asset: AssetTypeId,
        available: u64,
        requested: u64,
    },

    /// A holder cannot cover a shares burn.
    #[error("insufficient shares in {vault}: {holder} holds {available}, burn of {requested}")]
    InsufficientShares {
        vault: String,
        holder: String,
        available: u64,
        requested: u64,
    },

    /// A credit would push a balance or supply past `u64::MAX`.
    #[error("custody balance overflow")]
    Overflow,

    /// The external service could not be reached or refused the batch.
    #[error("custody unavailable: {0}")]
    Unavailable(String),

    /// A swap router failed to execute.
    #[error("swap failed: {0}")]
    SwapFailed(String),
}

// ---------------------------------------------------------------------------
// Instructions
// ---------------------------------------------------------------------------

/// One side effect on the external token layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SettlementInstruction {
    /// Moves a deposit from the holder's wallet into the vault.
    Collect {
        vault: String,
        holder: String,
        asset: AssetTypeId,
        amount: u64,
    },
    /// Mints vault shares to the holder.
    Mint {
        vault: String,
        holder: String,
        amount: u64,
    },
    /// Burns vault shares held by the holder.
    Burn {
        vault: String,
        holder: String,
        amount: u64,
    },
    /// Pays assets out of the vault into the holder's wallet.
    Payout {
        vault: String,
        holder: String,
        assets: Vec<(AssetTypeId, u64)>,
    },
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// The external token layer: holder wallets and per-vault shares tokens.
pub trait CustodyLedger: Send + Sync {
    /// Balance of `asset` in `owner`'s wallet.
    fn wallet_balance(&self, owner: &str, asset: &AssetTypeId) -> u64;

    /// Total shares outstanding for a vault.
    fn shares_supply(&self, vault: &str) -> u64;

    /// Shares of a vault held by `holder`.
    fn shares_balance(&self, vault: &str, holder: &str) -> u64;

    /// Applies a batch atomically. On error nothing in the batch took
    /// effect.
    fn apply(&self, instructions: &[SettlementInstruction]) -> Result<(), CustodyError>;
}

/// DEX execution used by creator-initiated rebalancing.
pub trait SwapRouter: Send + Sync {
    /// Expected output for selling `amount_in` of `from`. Moves nothing.
    fn quote(&self, from: &AssetTypeId, amount_in: u64, to: &AssetTypeId) -> Result<u64, CustodyError>;

    /// Sells `amount_in` of `from` held at `vault_address` for `to`.
    /// Returns the amount of `to` received.
    fn swap(
        &self,
        vault_address: &str,
        from: &AssetTypeId,
        amount_in: u64,
        to: &AssetTypeId,
        min_out: u64,
    ) -> Result<u64, CustodyError>;
}

// ---------------------------------------------------------------------------
// InMemoryCustody
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default)]
struct SharesToken {
    supply: u64,
    balances: HashMap<String, u64>,
}

#[derive(Clone, Debug, Default)]
struct CustodyState {
    wallets: HashMap<(String, AssetTypeId), u64>,
    shares: HashMap<String, SharesToken>,
}

impl CustodyState {
    fn credit_wallet(&mut self, owner: &str, asset: &AssetTypeId, amount: u64) -> Result<u64, CustodyError> {
        let balance = self
            .wallets
            .entry((owner.to_string(), asset.clone()))
            .or_insert(0);
        *balance = balance.checked_add(amount).ok_or(CustodyError::Overflow)?;
        Ok(*balance)
    }

    fn debit_wallet(&mut self, owner: &str, asset: &AssetTypeId, amount: u64) -> Result<u64, CustodyError> {
        let key = (owner.to_string(), asset.clone());
        let available = self.wallets.get(&key).copied().unwrap_or(0);
        if available < amount {
            return Err(CustodyError::InsufficientFunds {
                owner: owner.to_string(),
                asset: asset.clone(),
                available,
                requested: amount,
            });
        }
        let remaining = available - amount;
        self.wallets.insert(key, remaining);
        Ok(remaining)
    }

    fn mint(&mut self, vault: &str, holder: &str, amount: u64) -> Result<(), CustodyError> {
        let token = self.shares.entry(vault.to_string()).or_default();
        token.supply = token.supply.checked_add(amount).ok_or(CustodyError::Overflow)?;
        let balance = token.balances.entry(holder.to_string()).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(CustodyError::Overflow)?;
        Ok(())
    }

    fn burn(&mut self, vault: &str, holder: &str, amount: u64) -> Result<(), CustodyError> {
        let token = self.shares.entry(vault.to_string()).or_default();
        let available = token.balances.get(holder).copied().unwrap_or(0);
        if available < amount {
            return Err(CustodyError::InsufficientShares {
                vault: vault.to_string(),
                holder: holder.to_string(),
                available,
                requested: amount,
            });
        }
        let remaining = available - amount;
        if remaining == 0 {
            token.balances.remove(holder);
        } else {
            token.balances.insert(holder.to_string(), remaining);
        }
        // supply >= any single balance, so this cannot underflow.
        token.supply -= amount;
        Ok(())
    }

    fn execute(&mut self, instruction: &SettlementInstruction) -> Result<(), CustodyError> {
        match instruction {
            SettlementInstruction::Collect {
                holder,
                asset,
                amount,
                ..
            } => self.debit_wallet(holder, asset, *amount).map(|_| ()),
            SettlementInstruction::Mint {
                vault,
                holder,
                amount,
            } => self.mint(vault, holder, *amount),
            SettlementInstruction::Burn {
                vault,
                holder,
                amount,
            } => self.burn(vault, holder, *amount),
            SettlementInstruction::Payout { holder, assets, .. } => {
                for (asset, amount) in assets {
                    self.credit_wallet(holder, asset, *amount)?;
                }
                Ok(())
            }
        }
    }
}

/// Process-local custody. Wallets and shares tokens live in one map guarded
/// by a single mutex; a batch runs against a copy that replaces the live
/// state only when every instruction succeeded.
#[derive(Debug, Default)]
pub struct InMemoryCustody {
    state: Mutex<CustodyState>,
}

impl InMemoryCustody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits a wallet out of thin air. Devnet faucet and test setup only.
    pub fn fund(&self, owner: &str, asset: &AssetTypeId, amount: u64) -> Result<u64, CustodyError> {
        self.state.lock().credit_wallet(owner, asset, amount)
    }

    /// Holders of a vault's shares with their balances, ordered by holder.
    pub fn shareholders(&self, vault: &str) -> Vec<(String, u64)> {
        let state = self.state.lock();
        let mut holders: Vec<(String, u64)> = state
            .shares
            .get(vault)
            .map(|t| t.balances.iter().map(|(h, b)| (h.clone(), *b)).collect())
            .unwrap_or_default();
        holders.sort();
        holders
    }
}

impl CustodyLedger for InMemoryCustody {
    fn wallet_balance(&self, owner: &str, asset: &AssetTypeId) -> u64 {
        self.state
            .lock()
            .wallets
            .get(&(owner.to_string(), asset.clone()))
            .copied()
            .unwrap_or(0)
    }

    fn shares_supply(&self, vault: &str) -> u64 {
        self.state
            .lock()
            .shares
            .get(vault)
            .map(|t| t.supply)
            .unwrap_or(0)
    }

    fn shares_balance(&self, vault: &str, holder: &str) -> u64 {
        self.state
            .lock()
            .shares
            .get(vault)
            .and_then(|t| t.balances.get(holder).copied())
            .unwrap_or(0)
    }

    fn apply(&self, instructions: &[SettlementInstruction]) -> Result<(), CustodyError> {
        let mut state = self.state.lock();
        let mut staged = state.clone();
        for instruction in instructions {
            staged.execute(instruction)?;
        }
        *state = staged;
        Ok(())
    }
}
