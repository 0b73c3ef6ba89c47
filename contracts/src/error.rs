//! # Registry Errors
//!
//! Every way a registry call can be rejected. Each variant belongs to one
//! [`ErrorKind`], which is what callers branch on: the RPC layer maps kinds
//! to stable error codes, and tests assert on kinds as often as on variants.
//!
//! A rejected call never leaves partial state behind. There is no retry
//! anywhere in the registry; fix the triggering condition and call again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use veilmint_protocol::units::Wei;

use crate::collection::TokenId;
use crate::payout::PayoutError;

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// Coarse classification of a [`RegistryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A non-owner called an owner-only operation.
    Authorization,
    /// The operation is invalid in the current lifecycle state.
    State,
    /// Malformed or mismatched input.
    Validation,
    /// A hard limit was hit.
    Capacity,
    /// The withdrawal grace period has not elapsed.
    Timing,
    /// A query referenced a token that was never minted.
    NotFound,
    /// The external value transfer failed.
    Transfer,
}

impl ErrorKind {
    /// Stable lowercase name, used in logs and metrics labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Authorization => "authorization",
            ErrorKind::State => "state",
            ErrorKind::Validation => "validation",
            ErrorKind::Capacity => "capacity",
            ErrorKind::Timing => "timing",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Transfer => "transfer",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by collection operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The caller is not the collection owner.
    #[error("not owner")]
    NotOwner,

    /// Metadata was already revealed; it can be neither recommitted nor
    /// revealed again.
    #[error("already revealed")]
    AlreadyRevealed,

    /// Reveal attempted before any commitment was published.
    #[error("no commitment")]
    NoCommitment,

    /// Withdrawals open only after the metadata reveal.
    #[error("must reveal before withdraw")]
    RevealRequired,

    /// A withdrawal request is already pending.
    #[error("withdraw already requested")]
    WithdrawAlreadyRequested,

    /// No withdrawal request is pending.
    #[error("no withdrawal requested")]
    NoWithdrawRequested,

    /// Minting while the sale is switched off.
    #[error("sale not active")]
    SaleNotActive,

    /// The reveal payload does not open the stored commitment.
    #[error("invalid baseURI")]
    InvalidBaseUri,

    /// The payment differs from the mint price, in either direction.
    #[error("payment must be exact mint price (expected {expected} wei, got {got} wei)")]
    IncorrectPayment {
        /// Current mint price.
        expected: Wei,
        /// Payment attached to the call.
        got: Wei,
    },

    /// Every token has been minted.
    #[error("max supply reached ({max})")]
    MaxSupplyReached {
        /// The collection's supply ceiling.
        max: u64,
    },

    /// The withdrawal is still timelocked.
    #[error("grace period not finished (unlocks at {unlock_time}, now {now})")]
    GracePeriodNotFinished {
        /// Earliest permissible execution time.
        unlock_time: DateTime<Utc>,
        /// The time the call was evaluated at.
        now: DateTime<Utc>,
    },

    /// `now + grace period` is past the last representable instant.
    #[error("withdraw unlock time out of range (now {now})")]
    UnlockTimeOverflow {
        /// The time the call was evaluated at.
        now: DateTime<Utc>,
    },

    /// The token id has no owner.
    #[error("token not found: {0}")]
    TokenNotFound(TokenId),

    /// Crediting the payment would overflow the treasury.
    #[error("treasury overflow")]
    TreasuryOverflow,

    /// The payout sink refused the withdrawal transfer.
    #[error("payout failed: {0}")]
    PayoutFailed(#[from] PayoutError),
}

impl RegistryError {
    /// The kind this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::NotOwner => ErrorKind::Authorization,
            RegistryError::AlreadyRevealed
            | RegistryError::NoCommitment
            | RegistryError::RevealRequired
            | RegistryError::WithdrawAlreadyRequested
            | RegistryError::NoWithdrawRequested
            | RegistryError::SaleNotActive => ErrorKind::State,
            RegistryError::InvalidBaseUri | RegistryError::IncorrectPayment { .. } => {
                ErrorKind::Validation
            }
            RegistryError::MaxSupplyReached { .. } | RegistryError::TreasuryOverflow => {
                ErrorKind::Capacity
            }
            RegistryError::GracePeriodNotFinished { .. }
            | RegistryError::UnlockTimeOverflow { .. } => ErrorKind::Timing,
            RegistryError::TokenNotFound(_) => ErrorKind::NotFound,
            RegistryError::PayoutFailed(_) => ErrorKind::Transfer,
        }
    }
}
