//! # Pricing Gateway
//!
//! Price ingestion is kept apart from valuation. A [`PricingGateway`]
//! supplies raw quotes; the service binds them to the assets being priced
//! in a [`PriceSnapshot`], and every valuation function is a pure function
//! over that snapshot. A single operation fetches exactly one snapshot and
//! never re-fetches mid-computation.
//!
//! Missing or stale quotes surface as a [`PricingError`], never as a zero
//! price.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::error::{VaultError, VaultResult};
use crate::registry::{AssetRegistry, AssetTypeId, FeedId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures reported by a pricing gateway.
#[derive(Debug, Error)]
pub enum PricingError {
    /// The gateway has no quote for this feed.
    #[error("price unavailable for feed {0}")]
    Unavailable(String),

    /// The latest quote is older than the gateway's maximum age.
    #[error("stale price for feed {feed}: {age_secs}s old (max {max_age_secs}s)")]
    Stale {
        /// The feed whose quote is stale.
        feed: String,
        /// Age of the quote in seconds.
        age_secs: i64,
        /// Configured maximum age in seconds.
        max_age_secs: i64,
    },

    /// The gateway returned a different number of quotes than requested.
    #[error("gateway returned {got} quotes for {requested} feeds")]
    IncompleteResponse {
        /// Number of feeds requested.
        requested: usize,
        /// Number of quotes returned.
        got: usize,
    },
}

// ---------------------------------------------------------------------------
// PriceQuote
// ---------------------------------------------------------------------------

/// A USD price `mantissa × 10^exponent`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Signed mantissa, as oracles publish it. Must be positive to be usable.
    pub mantissa: i64,
    /// Decimal exponent, usually negative.
    pub exponent: i32,
    /// When the oracle published this quote.
    pub publish_time: DateTime<Utc>,
}

impl PriceQuote {
    /// Builds a quote stamped with the current time.
    pub fn new(mantissa: i64, exponent: i32) -> Self {
        Self {
            mantissa,
            exponent,
            publish_time: Utc::now(),
        }
    }

    /// Builds a quote with an explicit publish time.
    pub fn at(mantissa: i64, exponent: i32, publish_time: DateTime<Utc>) -> Self {
        Self {
            mantissa,
            exponent,
            publish_time,
        }
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// Source of current asset prices.
///
/// Implementations return exactly one quote per requested feed, in request
/// order.
pub trait PricingGateway: Send + Sync {
    /// Fetches the latest quote for each feed.
    fn fetch_quotes(&self, feed_ids: &[FeedId]) -> Result<Vec<PriceQuote>, PricingError>;
}

/// In-memory gateway holding the latest published quote per feed.
///
/// Used by tests and by the node binary, where prices are pushed through
/// the API rather than pulled from an oracle network.
#[derive(Debug)]
pub struct StaticPriceFeed {
    quotes: RwLock<HashMap<FeedId, PriceQuote>>,
    max_age: Option<Duration>,
}

impl StaticPriceFeed {
    /// Creates a feed that never reports quotes as stale.
    pub fn new() -> Self {
        Self {
            quotes: RwLock::new(HashMap::new()),
            max_age: None,
        }
    }

    /// Creates a feed that rejects quotes older than `max_age`.
    pub fn with_max_age(max_age: std::time::Duration) -> Self {
        Self {
            quotes: RwLock::new(HashMap::new()),
            max_age: Duration::from_std(max_age).ok(),
        }
    }

    /// Publishes a quote stamped with the current time.
    pub fn publish(&self, feed: impl Into<FeedId>, mantissa: i64, exponent: i32) {
        self.publish_quote(feed, PriceQuote::new(mantissa, exponent));
    }

    /// Publishes a fully specified quote, replacing the previous one.
    pub fn publish_quote(&self, feed: impl Into<FeedId>, quote: PriceQuote) {
        self.quotes.write().insert(feed.into(), quote);
    }

    /// Returns the latest quote for a feed without any staleness check.
    pub fn latest(&self, feed: &FeedId) -> Option<PriceQuote> {
        self.quotes.read().get(feed).copied()
    }
}

impl Default for StaticPriceFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl PricingGateway for StaticPriceFeed {
    fn fetch_quotes(&self, feed_ids: &[FeedId]) -> Result<Vec<PriceQuote>, PricingError> {
        let quotes = self.quotes.read();
        let now = Utc::now();
        feed_ids
            .iter()
            .map(|feed| {
                let quote = quotes
                    .get(feed)
                    .copied()
                    .ok_or_else(|| PricingError::Unavailable(feed.to_string()))?;
                if let Some(max_age) = self.max_age {
                    let age = now - quote.publish_time;
                    if age > max_age {
                        return Err(PricingError::Stale {
                            feed: feed.to_string(),
                            age_secs: age.num_seconds(),
                            max_age_secs: max_age.num_seconds(),
                        });
                    }
                }
                Ok(quote)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// PriceSnapshot
// ---------------------------------------------------------------------------

/// Quotes bound to the assets they price, valid for one operation.
#[derive(Clone, Debug, Default)]
pub struct PriceSnapshot {
    quotes: HashMap<AssetTypeId, PriceQuote>,
}

impl PriceSnapshot {
    /// Binds `quotes[i]` to `assets[i]`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::PriceCountMismatch`] when the lengths differ.
    pub fn bind(assets: &[AssetTypeId], quotes: Vec<PriceQuote>) -> VaultResult<Self> {
        if assets.len() != quotes.len() {
            return Err(VaultError::PriceCountMismatch {
                expected: assets.len(),
                got: quotes.len(),
            });
        }
        Ok(Self {
            quotes: assets.iter().cloned().zip(quotes).collect(),
        })
    }

    /// Returns the quote for an asset, if it was part of the snapshot.
    pub fn get(&self, asset: &AssetTypeId) -> Option<&PriceQuote> {
        self.quotes.get(asset)
    }

    /// Returns the quote for an asset or [`VaultError::PriceCountMismatch`]
    /// when the snapshot does not cover it.
    pub fn require(&self, asset: &AssetTypeId) -> VaultResult<&PriceQuote> {
        self.quotes.get(asset).ok_or(VaultError::PriceCountMismatch {
            expected: self.quotes.len() + 1,
            got: self.quotes.len(),
        })
    }

    /// Number of priced assets.
    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    /// Returns `true` if nothing is priced.
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

/// Fetches one snapshot covering `assets`, resolving feed ids through the
/// registry. Duplicate assets are priced once.
pub fn fetch_snapshot(
    gateway: &dyn PricingGateway,
    registry: &AssetRegistry,
    assets: &[AssetTypeId],
) -> VaultResult<PriceSnapshot> {
    let mut unique: Vec<AssetTypeId> = Vec::with_capacity(assets.len());
    for asset in assets {
        if !unique.contains(asset) {
            unique.push(asset.clone());
        }
    }

    let feed_ids = unique
        .iter()
        .map(|asset| registry.require(asset).map(|d| d.price_feed_id.clone()))
        .collect::<VaultResult<Vec<_>>>()?;

    let quotes = gateway.fetch_quotes(&feed_ids)?;
    if quotes.len() != feed_ids.len() {
        return Err(PricingError::IncompleteResponse {
            requested: feed_ids.len(),
            got: quotes.len(),
        }
        .into());
    }

    tracing::debug!(assets = unique.len(), "price snapshot fetched");
    PriceSnapshot::bind(&unique, quotes)
}
