//! # Engine Configuration & Constants
//!
//! Every precision, bound and denominator the vault math depends on lives
//! here. Changing a precision after vaults have been seeded silently
//! re-prices every share in existence, so treat these as consensus values.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Fixed-Point Precision
// ---------------------------------------------------------------------------

/// Fractional digits of every USD figure the engine produces (AUM, NAV,
/// per-asset values). 8 digits: `100_000_000` is one dollar.
pub const AUM_PRECISION: u32 = 8;

/// Fractional digits of the vault shares token.
pub const SHARES_DECIMALS: u32 = 8;

/// One whole share in smallest units. Also the default NAV of an empty vault
/// (one dollar per share, expressed at shares precision).
pub const ONE_SHARE: u128 = 100_000_000;

/// Largest power of ten representable in `u128` (10^38).
pub const MAX_POW10_EXPONENT: u32 = 38;

// ---------------------------------------------------------------------------
// Redemption
// ---------------------------------------------------------------------------

/// Basis-point denominator for redemption percentages. 10_000 = 100%.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Maximum number of candidate assets a single withdrawal may drain.
pub const MAX_WITHDRAW_ASSETS: usize = 3;

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

/// Maximum vault display-name length in bytes.
pub const MAX_VAULT_NAME_LENGTH: usize = 32;

/// Maximum vault symbol length in bytes. The symbol doubles as the shares
/// token ticker, so it follows the usual coin-symbol bound.
pub const MAX_VAULT_SYMBOL_LENGTH: usize = 10;

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

/// Default maximum age of a price quote before a gateway reports it stale.
pub const DEFAULT_MAX_PRICE_AGE: Duration = Duration::from_secs(60);

/// Engine version string, reported by the node binary.
pub const ENGINE_VERSION: &str = "0.1.0";
