//! # Vault Ledger
//!
//! Per-vault book of record: which assets the vault custodies and how much
//! of each, who holds its shares, and the identity the vault was created
//! with.
//!
//! The ledger only changes through settlement. Engines read it; the
//! settlement service stages a clone, mutates the clone, and swaps it in
//! once every guard and side effect has succeeded.
//!
//! ## Asset entries
//!
//! Entries keep their insertion order (price snapshots and reports follow
//! it) and are indexed by [`AssetTypeId`] for O(1) lookup. An entry is
//! created lazily on the first deposit of an asset and is never removed,
//! even when its balance drains to zero.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::config::{MAX_VAULT_NAME_LENGTH, MAX_VAULT_SYMBOL_LENGTH};
use crate::error::{VaultError, VaultResult};
use crate::registry::AssetTypeId;

// ---------------------------------------------------------------------------
// VaultAssetEntry
// ---------------------------------------------------------------------------

/// One asset position held by a vault.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultAssetEntry {
    /// Asset type, copied from the registry descriptor.
    pub type_id: AssetTypeId,
    /// Native decimals, copied from the registry descriptor.
    pub decimals: u8,
    /// Custodied balance in the asset's smallest unit.
    pub balance: u64,
}

// ---------------------------------------------------------------------------
// HolderRecord
// ---------------------------------------------------------------------------

/// A shares holder of a vault.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderRecord {
    /// Holder identity (account address).
    pub holder: String,
    /// Time of the holder's most recent deposit.
    pub last_deposit: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Checks a vault display name and symbol against the length bounds.
pub fn validate_vault_identity(name: &str, symbol: &str) -> VaultResult<()> {
    if name.is_empty() {
        return Err(VaultError::InvalidName("name must not be empty".into()));
    }
    if name.len() > MAX_VAULT_NAME_LENGTH {
        return Err(VaultError::InvalidName(format!(
            "name exceeds {} bytes",
            MAX_VAULT_NAME_LENGTH
        )));
    }
    if symbol.is_empty() {
        return Err(VaultError::InvalidName("symbol must not be empty".into()));
    }
    if symbol.len() > MAX_VAULT_SYMBOL_LENGTH {
        return Err(VaultError::InvalidName(format!(
            "symbol exceeds {} bytes",
            MAX_VAULT_SYMBOL_LENGTH
        )));
    }
    Ok(())
}

/// Derives the vault's custody address: `hex(BLAKE3(creator || 0x00 || symbol))`.
///
/// Deterministic, so a vault's address can be recomputed from its creator
/// and symbol alone.
pub fn derive_vault_address(creator: &str, symbol: &str) -> String {
    let mut preimage = Vec::with_capacity(creator.len() + symbol.len() + 1);
    preimage.extend_from_slice(creator.as_bytes());
    preimage.push(0x00);
    preimage.extend_from_slice(symbol.as_bytes());
    hex::encode(blake3::hash(&preimage).as_bytes())
}

// ---------------------------------------------------------------------------
// VaultLedger
// ---------------------------------------------------------------------------

/// Complete state of one vault.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultLedger {
    /// Identity that created the vault. Gates rebalancing swaps.
    creator: String,
    /// When the vault was created.
    created_at: DateTime<Utc>,
    /// Custody address derived from creator and symbol.
    address: String,
    /// Display name.
    name: String,
    /// Unique symbol; also the shares token ticker.
    symbol: String,
    /// Asset positions in insertion order.
    entries: Vec<VaultAssetEntry>,
    /// Position of each entry in `entries`.
    index: HashMap<AssetTypeId, usize>,
    /// Current shares holders keyed by identity.
    holders: BTreeMap<String, HolderRecord>,
}

impl VaultLedger {
    /// Creates an empty vault after validating its name and symbol.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidName`] if either is empty or too long.
    pub fn new(creator: &str, name: &str, symbol: &str) -> VaultResult<Self> {
        validate_vault_identity(name, symbol)?;
        Ok(Self {
            creator: creator.to_string(),
            created_at: Utc::now(),
            address: derive_vault_address(creator, symbol),
            name: name.to_string(),
            symbol: symbol.to_string(),
            entries: Vec::new(),
            index: HashMap::new(),
            holders: BTreeMap::new(),
        })
    }

    pub fn creator(&self) -> &str {
        &self.creator
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Asset positions in ledger order.
    pub fn entries(&self) -> &[VaultAssetEntry] {
        &self.entries
    }

    /// Asset type ids in ledger order. Price snapshots are fetched in this
    /// order.
    pub fn asset_ids(&self) -> Vec<AssetTypeId> {
        self.entries.iter().map(|e| e.type_id.clone()).collect()
    }

    /// The entry for an asset, if the vault has ever held it.
    pub fn entry(&self, asset: &AssetTypeId) -> Option<&VaultAssetEntry> {
        self.index.get(asset).map(|&i| &self.entries[i])
    }

    /// Custodied balance of an asset; zero if never held.
    pub fn balance_of(&self, asset: &AssetTypeId) -> u64 {
        self.entry(asset).map(|e| e.balance).unwrap_or(0)
    }

    /// Adds `amount` to an asset position, creating the entry on first use.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::ArithmeticOverflow`] if the balance would
    /// exceed `u64::MAX`.
    pub fn credit(&mut self, asset: &AssetTypeId, decimals: u8, amount: u64) -> VaultResult<u64> {
        let position = match self.index.get(asset) {
            Some(&i) => i,
            None => {
                self.entries.push(VaultAssetEntry {
                    type_id: asset.clone(),
                    decimals,
                    balance: 0,
                });
                let i = self.entries.len() - 1;
                self.index.insert(asset.clone(), i);
                i
            }
        };

        let entry = &mut self.entries[position];
        entry.balance = entry
            .balance
            .checked_add(amount)
            .ok_or(VaultError::ArithmeticOverflow)?;
        Ok(entry.balance)
    }

    /// Subtracts `amount` from an asset position.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InsufficientBalance`] if the vault holds less
    /// than `amount` (or never held the asset).
    pub fn debit(&mut self, asset: &AssetTypeId, amount: u64) -> VaultResult<u64> {
        let available = self.balance_of(asset);
        if available < amount {
            return Err(VaultError::InsufficientBalance {
                asset: asset.clone(),
                available,
                requested: amount,
            });
        }
        match self.index.get(asset) {
            Some(&i) => {
                self.entries[i].balance = available - amount;
                Ok(self.entries[i].balance)
            }
            // Only reachable with amount == 0 on an unknown asset.
            None => Ok(0),
        }
    }

    /// Current holders, ordered by identity.
    pub fn holders(&self) -> impl Iterator<Item = &HolderRecord> {
        self.holders.values()
    }

    /// Number of current holders.
    pub fn holder_count(&self) -> usize {
        self.holders.len()
    }

    /// Returns `true` if `holder` currently holds shares.
    pub fn is_holder(&self, holder: &str) -> bool {
        self.holders.contains_key(holder)
    }

    /// Records a deposit by `holder`, inserting the holder on first deposit.
    pub fn record_deposit(&mut self, holder: &str, at: DateTime<Utc>) {
        self.holders
            .entry(holder.to_string())
            .and_modify(|r| r.last_deposit = at)
            .or_insert_with(|| HolderRecord {
                holder: holder.to_string(),
                last_deposit: at,
            });
    }

    /// Removes a holder after a full redemption. Returns whether the holder
    /// was present.
    pub fn remove_holder(&mut self, holder: &str) -> bool {
        self.holders.remove(holder).is_some()
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

    #[test]
    fn new_vault_is_empty() {
        let ledger = VaultLedger::new("alice", "Blue Chip Index", "BCI").unwrap();
        assert_eq!(ledger.symbol(), "BCI");
        assert_eq!(ledger.creator(), "alice");
        assert!(ledger.entries().is_empty());
        assert_eq!(ledger.holder_count(), 0);
        assert_eq!(ledger.address().len(), 64);
    }

    #[test]
    fn address_is_deterministic() {
        assert_eq!(
            derive_vault_address("alice", "BCI"),
            derive_vault_address("alice", "BCI")
        );
        assert_ne!(
            derive_vault_address("alice", "BCI"),
            derive_vault_address("bob", "BCI")
        );
        // The separator keeps "ab"+"c" apart from "a"+"bc".
        assert_ne!(
            derive_vault_address("ab", "c"),
            derive_vault_address("a", "bc")
        );
    }

    #[test]
    fn name_and_symbol_bounds() {
        assert!(matches!(
            VaultLedger::new("alice", "", "BCI"),
            Err(VaultError::InvalidName(_))
        ));
        assert!(matches!(
            VaultLedger::new("alice", "Index", ""),
            Err(VaultError::InvalidName(_))
        ));
        let long_symbol = "X".repeat(MAX_VAULT_SYMBOL_LENGTH + 1);
        assert!(VaultLedger::new("alice", "Index", &long_symbol).is_err());
        let long_name = "N".repeat(MAX_VAULT_NAME_LENGTH + 1);
        assert!(VaultLedger::new("alice", &long_name, "BCI").is_err());

        let max_symbol = "X".repeat(MAX_VAULT_SYMBOL_LENGTH);
        assert!(VaultLedger::new("alice", "Index", &max_symbol).is_ok());
    }

    #[test]
    fn credit_creates_entries_in_order() {
        let mut ledger = VaultLedger::new("alice", "Index", "IDX").unwrap();
        ledger.credit(&usdc(), 6, 500).unwrap();
        ledger.credit(&weth(), 8, 100).unwrap();
        ledger.credit(&usdc(), 6, 250).unwrap();

        assert_eq!(ledger.asset_ids(), vec![usdc(), weth()]);
        assert_eq!(ledger.balance_of(&usdc()), 750);
        assert_eq!(ledger.entry(&weth()).unwrap().decimals, 8);
    }

    #[test]
    fn credit_overflow_rejected() {
        let mut ledger = VaultLedger::new("alice", "Index", "IDX").unwrap();
        ledger.credit(&weth(), 8, u64::MAX).unwrap();
        let result = ledger.credit(&weth(), 8, 1);
        assert!(matches!(result, Err(VaultError::ArithmeticOverflow)));
        assert_eq!(ledger.balance_of(&weth()), u64::MAX);
    }

    #[test]
    fn debit_keeps_entry_at_zero() {
        let mut ledger = VaultLedger::new("alice", "Index", "IDX").unwrap();
        ledger.credit(&weth(), 8, 100).unwrap();
        assert_eq!(ledger.debit(&weth(), 100).unwrap(), 0);
        assert!(ledger.entry(&weth()).is_some());
    }

    #[test]
    fn debit_more_than_held_rejected() {
        let mut ledger = VaultLedger::new("alice", "Index", "IDX").unwrap();
        ledger.credit(&weth(), 8, 100).unwrap();
        let result = ledger.debit(&weth(), 101);
        assert!(matches!(
            result,
            Err(VaultError::InsufficientBalance {
                available: 100,
                requested: 101,
                ..
            })
        ));
        assert!(ledger.debit(&usdc(), 1).is_err());
    }

    #[test]
    fn holder_lifecycle() {
        let mut ledger = VaultLedger::new("alice", "Index", "IDX").unwrap();
        let t1 = Utc::now();
        ledger.record_deposit("bob", t1);
        ledger.record_deposit("carol", t1);
        let t2 = t1 + chrono::Duration::seconds(10);
        ledger.record_deposit("bob", t2);

        assert_eq!(ledger.holder_count(), 2);
        let bob = ledger.holders().find(|h| h.holder == "bob").unwrap();
        assert_eq!(bob.last_deposit, t2);

        assert!(ledger.remove_holder("bob"));
        assert!(!ledger.remove_holder("bob"));
        assert!(!ledger.is_holder("bob"));
        assert!(ledger.is_holder("carol"));
    }

    #[test]
    fn ledger_serialization_roundtrip() {
        let mut ledger = VaultLedger::new("alice", "Index", "IDX").unwrap();
        ledger.credit(&weth(), 8, 42).unwrap();
        ledger.record_deposit("bob", Utc::now());

        let bytes = bincode::serialize(&ledger).expect("serialize");
        let recovered: VaultLedger = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(recovered, ledger);
        assert_eq!(recovered.balance_of(&weth()), 42);
    }
}
