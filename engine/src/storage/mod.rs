//! # Storage Module
//!
//! Persistence for the supported-asset registry and every vault ledger.
//!
//! ```text
//! db.rs  VaultDb: sled trees `assets` and `vaults`, bincode values
//! ```
//!
//! Ledgers are written whole on every settlement. The settlement service
//! writes the staged ledger before custody runs and writes the previous
//! ledger back if custody rejects the batch, so the store never holds a
//! state custody has not seen.

pub mod db;

pub use db::{DbError, DbResult, VaultDb};
