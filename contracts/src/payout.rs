//! # Treasury Payouts
//!
//! Executing a withdrawal moves value out of the registry. Where it goes is
//! not the registry's business, so the transfer sits behind the
//! [`PayoutSink`] trait: a node might forward it to a real ledger, tests use
//! [`InMemoryLedger`].
//!
//! The registry clears its own bookkeeping *before* calling the sink and
//! holds its lock across the call. A sink must not call back into the
//! registry that is paying it; the lock is not reentrant and the call would
//! deadlock.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use veilmint_protocol::identity::Address;
use veilmint_protocol::units::{wei_string, Wei};

/// A transfer failure reported by a [`PayoutSink`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PayoutError {
    /// The recipient refused the transfer.
    #[error("recipient {0} rejected the transfer")]
    Rejected(Address),

    /// The recipient's balance would overflow.
    #[error("balance overflow for {0}")]
    BalanceOverflow(Address),

    /// The downstream ledger could not be reached.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// A value transfer out of the treasury.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    /// Recipient.
    pub to: Address,
    /// Amount in wei.
    #[serde(with = "wei_string")]
    pub amount: Wei,
}

/// Performs the external value transfer of a withdrawal.
pub trait PayoutSink: Send + Sync {
    /// Sends `amount` wei to `to`.
    fn transfer(&self, to: Address, amount: Wei) -> Result<(), PayoutError>;
}

/// An in-process ledger that records what each address has received.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

#[derive(Debug, Default)]
struct LedgerState {
    received: HashMap<Address, Wei>,
    history: Vec<Payout>,
    failure: Option<PayoutError>,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total received by `address` so far.
    pub fn received(&self, address: &Address) -> Wei {
        self.state
            .lock()
            .received
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    /// Every successful transfer, oldest first.
    pub fn history(&self) -> Vec<Payout> {
        self.state.lock().history.clone()
    }

    /// Makes every subsequent transfer fail with `error` until
    /// [`clear_failure`](Self::clear_failure) is called.
    pub fn fail_with(&self, error: PayoutError) {
        self.state.lock().failure = Some(error);
    }

    /// Lets transfers succeed again.
    pub fn clear_failure(&self) {
        self.state.lock().failure = None;
    }
}

impl PayoutSink for InMemoryLedger {
    fn transfer(&self, to: Address, amount: Wei) -> Result<(), PayoutError> {
        let mut state = self.state.lock();
        if let Some(err) = state.failure.clone() {
            return Err(err);
        }
        let balance = state.received.entry(to).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(PayoutError::BalanceOverflow(to))?;
        state.history.push(Payout { to, amount });
        debug!(%to, amount = %amount, "ledger credited payout");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_accumulates_per_address() {
        let ledger = InMemoryLedger::new();
        let alice = Address::derive("alice");
        ledger.transfer(alice, 10).unwrap();
        ledger.transfer(alice, 5).unwrap();
        assert_eq!(ledger.received(&alice), 15);
        assert_eq!(ledger.received(&Address::derive("bob")), 0);
        assert_eq!(ledger.history().len(), 2);
    }

    #[test]
    fn injected_failure_leaves_ledger_untouched() {
        let ledger = InMemoryLedger::new();
        let alice = Address::derive("alice");
        ledger.fail_with(PayoutError::Rejected(alice));

        assert_eq!(
            ledger.transfer(alice, 10),
            Err(PayoutError::Rejected(alice))
        );
        assert_eq!(ledger.received(&alice), 0);
        assert!(ledger.history().is_empty());

        ledger.clear_failure();
        ledger.transfer(alice, 10).unwrap();
        assert_eq!(ledger.received(&alice), 10);
    }

    #[test]
    fn overflow_is_reported() {
        let ledger = InMemoryLedger::new();
        let alice = Address::derive("alice");
        ledger.transfer(alice, Wei::MAX).unwrap();
        assert_eq!(
            ledger.transfer(alice, 1),
            Err(PayoutError::BalanceOverflow(alice))
        );
        assert_eq!(ledger.received(&alice), Wei::MAX);
    }
}
