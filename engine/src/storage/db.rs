//! # VaultDb: Persistent Storage Engine
//!
//! Built on sled's embedded key-value store. Each concern gets its own
//! named tree:
//!
//! | Tree     | Key                      | Value                      |
//! |----------|--------------------------|----------------------------|
//! | `assets` | `position` (8B BE)       | `bincode(AssetDescriptor)` |
//! | `vaults` | `symbol` (UTF-8)         | `bincode(VaultLedger)`     |
//!
//! Asset positions are big-endian u64 so sled's lexicographic order is the
//! order assets were supported in, which is the order the registry
//! enumerates them.

use sled::{Db, Tree};
use std::path::Path;

use crate::ledger::VaultLedger;
use crate::registry::{AssetDescriptor, AssetRegistry};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type DbResult<T> = Result<T, DbError>;

fn encode<T: serde::Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// VaultDb
// ---------------------------------------------------------------------------

/// Persistent store for the registry and vault ledgers.
///
/// Cheap to clone; all clones share the same sled instance.
#[derive(Debug, Clone)]
pub struct VaultDb {
    db: Db,
    assets: Tree,
    vaults: Tree,
}

impl VaultDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database removed when dropped.
    pub fn open_temporary() -> DbResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let assets = db.open_tree("assets")?;
        let vaults = db.open_tree("vaults")?;
        Ok(Self { db, assets, vaults })
    }

    // -- Registry -----------------------------------------------------------

    /// Appends a supported asset after the ones already stored.
    ///
    /// Callers serialize registry writes; the position is taken from the
    /// current tree length.
    pub fn put_asset(&self, descriptor: &AssetDescriptor) -> DbResult<()> {
        let position = self.assets.len() as u64;
        self.assets
            .insert(position.to_be_bytes(), encode(descriptor)?)?;
        Ok(())
    }

    /// Rebuilds the registry in the order assets were supported.
    pub fn load_registry(&self) -> DbResult<AssetRegistry> {
        let mut descriptors = Vec::with_capacity(self.assets.len());
        for record in self.assets.iter() {
            let (_position, bytes) = record?;
            descriptors.push(decode::<AssetDescriptor>(&bytes)?);
        }
        AssetRegistry::from_descriptors(descriptors)
            .map_err(|e| DbError::Corrupt(e.to_string()))
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    // -- Vaults -------------------------------------------------------------

    /// Writes a ledger, replacing any previous version under its symbol.
    pub fn put_vault(&self, ledger: &VaultLedger) -> DbResult<()> {
        self.vaults
            .insert(ledger.symbol().as_bytes(), encode(ledger)?)?;
        Ok(())
    }

    /// Reads one ledger by symbol.
    pub fn get_vault(&self, symbol: &str) -> DbResult<Option<VaultLedger>> {
        match self.vaults.get(symbol.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every stored ledger, ordered by symbol.
    pub fn load_vaults(&self) -> DbResult<Vec<VaultLedger>> {
        let mut ledgers = Vec::with_capacity(self.vaults.len());
        for record in self.vaults.iter() {
            let (key, bytes) = record?;
            let ledger: VaultLedger = decode(&bytes)?;
            if ledger.symbol().as_bytes() != key.as_ref() {
                return Err(DbError::Corrupt(format!(
                    "vault stored under {} has symbol {}",
                    String::from_utf8_lossy(&key),
                    ledger.symbol()
                )));
            }
            ledgers.push(ledger);
        }
        Ok(ledgers)
    }

    pub fn vault_count(&self) -> usize {
        self.vaults.len()
    }

    /// Blocks until all pending writes are durable.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}
