//! # Veilmint Contracts
//!
//! The registry state machine behind a hidden-metadata NFT collection:
//!
//! - **Commit-reveal metadata** — the owner publishes a Keccak-256
//!   commitment to the final base URI while tokens still show a placeholder,
//!   and can only reveal a URI that opens that commitment. Once revealed,
//!   always revealed.
//! - **Gated sale** — minting needs an open sale, free supply and a payment
//!   of exactly the mint price.
//! - **Timelocked withdrawal** — the treasury leaves only after a reveal, a
//!   public request and a fixed grace period.
//!
//! [`Collection`] holds the state and enforces the rules. [`Registry`] puts
//! it behind a lock, a clock and a payout sink and stamps every successful
//! call with a [`Receipt`].
//!
//! ## Design Principles
//!
//! 1. The owner check comes before every other check.
//! 2. A rejected call changes nothing. Preconditions are all checked before
//!    the first write.
//! 3. Money arithmetic is checked; the treasury never wraps.
//! 4. State leaves the treasury before value does.

pub mod collection;
pub mod error;
pub mod events;
pub mod payout;
pub mod registry;

pub use collection::{
    Applied, CallContext, Collection, CollectionStatus, PendingPayout, RevealState, SaleConfig,
    TokenId, WithdrawState,
};
pub use error::{ErrorKind, RegistryError};
pub use events::{Event, EventSink, Receipt};
pub use payout::{InMemoryLedger, Payout, PayoutError, PayoutSink};
pub use registry::Registry;
