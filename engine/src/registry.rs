//! # Asset Registry
//!
//! The catalog of assets a vault may hold. Every asset is described once by
//! an [`AssetDescriptor`] and referenced everywhere else by its
//! [`AssetTypeId`], the join key between registry, ledgers, price
//! snapshots and settlement instructions.
//!
//! Descriptors are immutable once supported. There is one registry per
//! deployment; vault operations only ever read it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{VaultError, VaultResult};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Globally unique asset type identifier, e.g. `0x1::coin::WETH`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetTypeId(String);

impl AssetTypeId {
    /// Wraps a type identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AssetTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetTypeId({})", self.0)
    }
}

impl fmt::Display for AssetTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetTypeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifier of an external price feed (typically a hex feed id).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedId(String);

impl FeedId {
    /// Wraps a feed identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeedId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for FeedId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// AssetDescriptor
// ---------------------------------------------------------------------------

/// Metadata for a supported asset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    /// Join key used everywhere assets are compared.
    pub type_id: AssetTypeId,
    /// Ticker symbol (e.g., "WETH").
    pub symbol: String,
    /// Human-readable name (e.g., "Wrapped Ether").
    pub name: String,
    /// Native decimal precision of the asset's smallest unit.
    pub decimals: u8,
    /// Price feed that quotes this asset in USD.
    pub price_feed_id: FeedId,
}

impl AssetDescriptor {
    /// Builds a descriptor.
    pub fn new(
        type_id: impl Into<String>,
        symbol: impl Into<String>,
        name: impl Into<String>,
        decimals: u8,
        price_feed_id: impl Into<String>,
    ) -> Self {
        Self {
            type_id: AssetTypeId::new(type_id),
            symbol: symbol.into(),
            name: name.into(),
            decimals,
            price_feed_id: FeedId::new(price_feed_id),
        }
    }
}

// ---------------------------------------------------------------------------
// AssetRegistry
// ---------------------------------------------------------------------------

/// Supported-asset catalog with O(1) lookup by type id and stable,
/// insertion-ordered enumeration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AssetRegistry {
    /// Descriptors in the order they were supported.
    assets: Vec<AssetDescriptor>,
    /// Position of each descriptor in `assets`.
    index: HashMap<AssetTypeId, usize>,
}

impl AssetRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from a list of descriptors, rejecting duplicates.
    pub fn from_descriptors(
        descriptors: impl IntoIterator<Item = AssetDescriptor>,
    ) -> VaultResult<Self> {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.add(descriptor)?;
        }
        Ok(registry)
    }

    /// Adds a supported asset.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::AssetAlreadySupported`] if the type id is
    /// already present. Descriptors are never overwritten.
    pub fn add(&mut self, descriptor: AssetDescriptor) -> VaultResult<()> {
        if self.index.contains_key(&descriptor.type_id) {
            return Err(VaultError::AssetAlreadySupported(descriptor.type_id));
        }
        self.index
            .insert(descriptor.type_id.clone(), self.assets.len());
        self.assets.push(descriptor);
        Ok(())
    }

    /// Returns the descriptor for a type id, if supported.
    pub fn get(&self, type_id: &AssetTypeId) -> Option<&AssetDescriptor> {
        self.index.get(type_id).map(|&i| &self.assets[i])
    }

    /// Returns the descriptor or [`VaultError::NotSupportedAsset`].
    pub fn require(&self, type_id: &AssetTypeId) -> VaultResult<&AssetDescriptor> {
        self.get(type_id)
            .ok_or_else(|| VaultError::NotSupportedAsset(type_id.clone()))
    }

    /// Returns `true` if the asset is supported.
    pub fn is_supported(&self, type_id: &AssetTypeId) -> bool {
        self.index.contains_key(type_id)
    }

    /// All supported assets in insertion order.
    pub fn list(&self) -> &[AssetDescriptor] {
        &self.assets
    }

    /// Number of supported assets.
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Returns `true` if nothing is supported yet.
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
