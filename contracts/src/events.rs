//! # Events & Receipts
//!
//! Every successful mutating call produces a [`Receipt`] carrying the
//! notifications an indexer needs to follow the collection without reading
//! its state. Failed calls produce nothing and consume no sequence number.
//!
//! An [`EventSink`] attached to the registry sees the same events as they
//! are committed, in sequence order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use veilmint_protocol::crypto::Commitment;
use veilmint_protocol::identity::Address;
use veilmint_protocol::units::{wei_string, Wei};

use crate::collection::TokenId;

/// A notification emitted by a state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The pre-reveal placeholder URI changed.
    HiddenBaseUriSet {
        /// New placeholder URI.
        uri: String,
    },
    /// A metadata commitment was published (or overwritten).
    MetadataCommitted {
        /// The published commitment.
        commitment: Commitment,
    },
    /// Metadata was revealed; the transition is permanent.
    MetadataRevealed {
        /// The verified base URI.
        base_uri: String,
    },
    /// Minting was switched on.
    SaleStarted,
    /// Minting was switched off.
    SaleStopped,
    /// The mint price changed.
    MintPriceSet {
        /// New price in wei.
        #[serde(with = "wei_string")]
        price: Wei,
    },
    /// Token ownership changed. Mints come from the zero address.
    Transfer {
        /// Previous owner.
        from: Address,
        /// New owner.
        to: Address,
        /// The token that moved.
        token_id: TokenId,
    },
    /// The owner announced a withdrawal.
    WithdrawRequested {
        /// Earliest permissible execution time.
        unlock_time: DateTime<Utc>,
    },
    /// The pending withdrawal was withdrawn.
    WithdrawCancelled,
    /// The treasury was paid out.
    WithdrawExecuted {
        /// Recipient (always the owner).
        to: Address,
        /// Amount paid, in wei.
        #[serde(with = "wei_string")]
        amount: Wei,
    },
}

impl Event {
    /// Short event name, equal to the serde `type` tag. Used as a log field
    /// and as a metrics label.
    pub fn name(&self) -> &'static str {
        match self {
            Event::HiddenBaseUriSet { .. } => "hidden_base_uri_set",
            Event::MetadataCommitted { .. } => "metadata_committed",
            Event::MetadataRevealed { .. } => "metadata_revealed",
            Event::SaleStarted => "sale_started",
            Event::SaleStopped => "sale_stopped",
            Event::MintPriceSet { .. } => "mint_price_set",
            Event::Transfer { .. } => "transfer",
            Event::WithdrawRequested { .. } => "withdraw_requested",
            Event::WithdrawCancelled => "withdraw_cancelled",
            Event::WithdrawExecuted { .. } => "withdraw_executed",
        }
    }

    /// The mint notification for `token_id`.
    pub fn mint(to: Address, token_id: TokenId) -> Self {
        Event::Transfer {
            from: Address::ZERO,
            to,
            token_id,
        }
    }
}

/// The result of a successful mutating call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt<T> {
    /// Position of this call among all successful mutations, starting at 1.
    pub sequence: u64,
    /// Who made the call.
    pub caller: Address,
    /// The instant the call was evaluated at.
    pub timestamp: DateTime<Utc>,
    /// Operation-specific return value.
    pub value: T,
    /// Notifications, in emission order. Empty for no-op calls.
    pub events: Vec<Event>,
}

/// Receives committed events while the registry lock is still held.
///
/// Calls arrive in strictly increasing `sequence` order, one per event.
/// Implementations must not block and must not call back into the registry.
pub trait EventSink: Send + Sync {
    /// Delivers one event of the call numbered `sequence`.
    fn emit(&self, sequence: u64, timestamp: DateTime<Utc>, event: &Event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mint_is_transfer_from_zero() {
        let to = Address::derive("minter");
        assert_eq!(
            Event::mint(to, 3),
            Event::Transfer {
                from: Address::ZERO,
                to,
                token_id: 3
            }
        );
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(Event::SaleStarted).unwrap();
        assert_eq!(json["type"], "sale_started");

        let json = serde_json::to_value(Event::MintPriceSet { price: 5 }).unwrap();
        assert_eq!(json["type"], "mint_price_set");
        assert_eq!(json["price"], "5");

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, Event::MintPriceSet { price: 5 });
    }

    #[test]
    fn names_match_serde_tags() {
        let events = [
            Event::SaleStopped,
            Event::WithdrawCancelled,
            Event::mint(Address::derive("a"), 1),
            Event::WithdrawExecuted {
                to: Address::ZERO,
                amount: 0,
            },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.name());
        }
    }
}
