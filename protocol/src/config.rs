//! # Collection Configuration & Constants
//!
//! Every magic number in veilmint lives here. If you're hardcoding a
//! constant somewhere else, move it here.
//!
//! Two kinds of values live in this module:
//!
//! - **Constants** that are the same for every deployment (hash width,
//!   address width, the token URI suffix, default ports).
//! - **[`CollectionConfig`]**, the per-deployment parameters. `max_supply`
//!   and the grace period are fixed when a collection is created and never
//!   change afterwards; the mint price is only the *initial* price, since the
//!   owner may reprice at any time.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::units::{wei_string, Wei};

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full version string of the veilmint protocol crates.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// The hash function behind metadata commitments. Keccak-256 (the pre-NIST
/// padding variant), because that is what EVM tooling computes when it
/// builds a commitment off-chain.
pub const COMMITMENT_HASH_FUNCTION: &str = "Keccak-256";

/// Commitment length in bytes.
pub const COMMITMENT_LENGTH: usize = 32;

/// Principal address length in bytes (EVM-style, 20 bytes).
pub const ADDRESS_LENGTH: usize = 20;

// ---------------------------------------------------------------------------
// Collection Parameters
// ---------------------------------------------------------------------------

/// Delay between a withdrawal request and its earliest execution: 2 days.
pub const GRACE_PERIOD_SECS: u64 = 2 * 24 * 60 * 60;

/// Longest grace period a deployment may configure: ten years.
pub const MAX_GRACE_PERIOD_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Hard ceiling on tokens ever mintable, unless a deployment overrides it.
pub const DEFAULT_MAX_SUPPLY: u64 = 10_000;

/// Initial mint price: 0.01 ether expressed in wei.
pub const DEFAULT_MINT_PRICE_WEI: Wei = 10_000_000_000_000_000;

/// Default collection name for devnet deployments.
pub const DEFAULT_COLLECTION_NAME: &str = "Veilmint Collection";

/// Default collection symbol for devnet deployments.
pub const DEFAULT_COLLECTION_SYMBOL: &str = "VEIL";

/// Appended to `baseURI + tokenId` once metadata has been revealed.
pub const TOKEN_URI_SUFFIX: &str = ".json";

// ---------------------------------------------------------------------------
// Node Parameters
// ---------------------------------------------------------------------------

/// Default port for the JSON-RPC / REST / WebSocket API.
pub const DEFAULT_RPC_PORT: u16 = 9741;

/// Default port for the Prometheus metrics endpoint.
pub const DEFAULT_METRICS_PORT: u16 = 9742;

/// Broadcast channel capacity for live event streaming. Large enough to
/// absorb a burst of mints without dropping events for slow subscribers.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Deployment Configuration
// ---------------------------------------------------------------------------

/// Errors raised when a deployment configuration is unusable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The collection name is empty.
    #[error("collection name must not be empty")]
    EmptyName,

    /// The collection symbol is empty.
    #[error("collection symbol must not be empty")]
    EmptySymbol,

    /// A collection that can never mint is a configuration mistake.
    #[error("max supply must be at least 1")]
    ZeroMaxSupply,

    /// A zero grace period would make the timelock meaningless.
    #[error("grace period must be at least 1 second")]
    ZeroGracePeriod,

    /// The zero address marks mints; it cannot own the collection.
    #[error("owner must not be the zero address")]
    ZeroOwner,

    /// Longer than [`MAX_GRACE_PERIOD_SECS`].
    #[error("grace period of {0}s exceeds the maximum of {max}s", max = MAX_GRACE_PERIOD_SECS)]
    GracePeriodTooLong(u64),
}

/// Parameters fixed at deployment time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Human-readable collection name.
    pub name: String,
    /// Short ticker symbol.
    pub symbol: String,
    /// Hard ceiling on `totalSupply`.
    pub max_supply: u64,
    /// Initial mint price in wei.
    #[serde(with = "wei_string")]
    pub mint_price: Wei,
    /// Seconds between a withdrawal request and its earliest execution.
    pub grace_period_secs: u64,
}

impl CollectionConfig {
    /// Checks that the configuration describes a usable collection.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found, checking name, symbol,
    /// supply and grace period in that order.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::EmptySymbol);
        }
        if self.max_supply == 0 {
            return Err(ConfigError::ZeroMaxSupply);
        }
        if self.grace_period_secs == 0 {
            return Err(ConfigError::ZeroGracePeriod);
        }
        if self.grace_period_secs > MAX_GRACE_PERIOD_SECS {
            return Err(ConfigError::GracePeriodTooLong(self.grace_period_secs));
        }
        Ok(())
    }

    /// The grace period as a `chrono::Duration`, capped at
    /// [`MAX_GRACE_PERIOD_SECS`].
    pub fn grace_period(&self) -> chrono::Duration {
        let secs = self.grace_period_secs.min(MAX_GRACE_PERIOD_SECS);
        // Fits: the cap is far below i64::MAX.
        chrono::Duration::seconds(secs as i64)
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_COLLECTION_NAME.to_string(),
            symbol: DEFAULT_COLLECTION_SYMBOL.to_string(),
            max_supply: DEFAULT_MAX_SUPPLY,
            mint_price: DEFAULT_MINT_PRICE_WEI,
            grace_period_secs: GRACE_PERIOD_SECS,
        }
    }
}
