//! Atomic, thread-safe handle over a [`Collection`].
//!
//! Every public method is one transaction: take the lock, read the clock
//! once, run the collection operation, stamp a receipt, release. No caller
//! ever observes a half-applied operation, and failed calls leave no trace
//! beyond a log line.
//!
//! ## Design
//!
//! - `parking_lot::Mutex` guards the collection together with the receipt
//!   sequence counter, so both move in lockstep.
//! - The clock and the payout sink are trait objects supplied at
//!   construction. Production uses [`SystemClock`]; tests and devnet use a
//!   `ManualClock`.
//! - An optional [`EventSink`] receives each committed event before the
//!   lock is released, so sinks observe events in sequence order.
//! - `execute_withdraw` clears the treasury before calling the payout sink
//!   and keeps the lock held for the duration of the transfer. A second
//!   execute can only run after the first has finished, and by then there is
//!   no pending request left to execute.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use veilmint_protocol::config::{CollectionConfig, ConfigError};
use veilmint_protocol::crypto::{Commitment, RevealPayload};
use veilmint_protocol::identity::Address;
use veilmint_protocol::time::{Clock, SystemClock};
use veilmint_protocol::units::Wei;

use crate::collection::{Applied, CallContext, Collection, CollectionStatus, TokenId};
use crate::error::{ErrorKind, RegistryError};
use crate::events::{EventSink, Receipt};
use crate::payout::{InMemoryLedger, Payout, PayoutSink};

struct Inner {
    collection: Collection,
    sequence: u64,
}

/// The registry state machine behind a lock.
pub struct Registry {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    payouts: Arc<dyn PayoutSink>,
    events: Option<Arc<dyn EventSink>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Registry")
            .field("collection", &inner.collection)
            .field("sequence", &inner.sequence)
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Deploys a collection with an explicit clock and payout sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` is invalid.
    pub fn new(
        owner: Address,
        config: &CollectionConfig,
        clock: Arc<dyn Clock>,
        payouts: Arc<dyn PayoutSink>,
    ) -> Result<Self, ConfigError> {
        let collection = Collection::new(owner, config)?;
        info!(
            %owner,
            name = %config.name,
            symbol = %config.symbol,
            max_supply = config.max_supply,
            mint_price = %config.mint_price,
            "collection deployed"
        );
        Ok(Self {
            inner: Mutex::new(Inner {
                collection,
                sequence: 0,
            }),
            clock,
            payouts,
            events: None,
        })
    }

    /// Attaches a sink that is fed every committed event.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Deploys a collection on the system clock, paying out into a fresh
    /// [`InMemoryLedger`].
    pub fn with_system_clock(
        owner: Address,
        config: &CollectionConfig,
    ) -> Result<Self, ConfigError> {
        Self::new(
            owner,
            config,
            Arc::new(SystemClock::new()),
            Arc::new(InMemoryLedger::new()),
        )
    }

    /// Runs one mutating operation as a transaction.
    fn transact<T>(
        &self,
        op: &'static str,
        caller: Address,
        f: impl FnOnce(&mut Collection, &CallContext) -> Result<Applied<T>, RegistryError>,
    ) -> Result<Receipt<T>, RegistryError> {
        let mut inner = self.inner.lock();
        let ctx = CallContext::new(caller, self.clock.now());

        match f(&mut inner.collection, &ctx) {
            Ok(applied) => {
                inner.sequence += 1;
                info!(
                    op,
                    %caller,
                    sequence = inner.sequence,
                    events = applied.events.len(),
                    "operation applied"
                );
                for event in &applied.events {
                    debug!(sequence = inner.sequence, event = event.name(), "event emitted");
                    if let Some(sink) = &self.events {
                        sink.emit(inner.sequence, ctx.now, event);
                    }
                }
                Ok(Receipt {
                    sequence: inner.sequence,
                    caller,
                    timestamp: ctx.now,
                    value: applied.value,
                    events: applied.events,
                })
            }
            Err(err) => {
                match err.kind() {
                    ErrorKind::Authorization | ErrorKind::Transfer => {
                        warn!(op, %caller, error = %err, "operation rejected")
                    }
                    _ => debug!(op, %caller, error = %err, "operation rejected"),
                }
                Err(err)
            }
        }
    }

    fn view<T>(&self, op: &'static str, f: impl FnOnce(&Collection) -> T) -> T {
        debug!(op, "query");
        f(&self.inner.lock().collection)
    }

    // -- Mutations ----------------------------------------------------------

    /// `setHiddenBaseURI` (owner-only).
    pub fn set_hidden_base_uri(
        &self,
        caller: Address,
        uri: impl Into<String>,
    ) -> Result<Receipt<()>, RegistryError> {
        let uri = uri.into();
        self.transact("set_hidden_base_uri", caller, |c, ctx| {
            c.set_hidden_base_uri(ctx, uri)
        })
    }

    /// `commitMetadata` (owner-only).
    pub fn commit_metadata(
        &self,
        caller: Address,
        commitment: Commitment,
    ) -> Result<Receipt<()>, RegistryError> {
        self.transact("commit_metadata", caller, |c, ctx| {
            c.commit_metadata(ctx, commitment)
        })
    }

    /// `revealMetadata` (owner-only).
    pub fn reveal_metadata(
        &self,
        caller: Address,
        payload: &RevealPayload,
    ) -> Result<Receipt<()>, RegistryError> {
        self.transact("reveal_metadata", caller, |c, ctx| {
            c.reveal_metadata(ctx, payload)
        })
    }

    /// `startSale` (owner-only).
    pub fn start_sale(&self, caller: Address) -> Result<Receipt<()>, RegistryError> {
        self.transact("start_sale", caller, |c, ctx| c.start_sale(ctx))
    }

    /// `stopSale` (owner-only).
    pub fn stop_sale(&self, caller: Address) -> Result<Receipt<()>, RegistryError> {
        self.transact("stop_sale", caller, |c, ctx| c.stop_sale(ctx))
    }

    /// `setMintPrice` (owner-only).
    pub fn set_mint_price(
        &self,
        caller: Address,
        price: Wei,
    ) -> Result<Receipt<()>, RegistryError> {
        self.transact("set_mint_price", caller, |c, ctx| {
            c.set_mint_price(ctx, price)
        })
    }

    /// `mintNFT`: any caller, exact payment.
    pub fn mint_nft(
        &self,
        caller: Address,
        payment: Wei,
    ) -> Result<Receipt<TokenId>, RegistryError> {
        self.transact("mint_nft", caller, |c, ctx| c.mint_nft(ctx, payment))
    }

    /// `requestWithdraw` (owner-only). The receipt value is the unlock time.
    pub fn request_withdraw(
        &self,
        caller: Address,
    ) -> Result<Receipt<DateTime<Utc>>, RegistryError> {
        self.transact("request_withdraw", caller, |c, ctx| c.request_withdraw(ctx))
    }

    /// `cancelWithdraw` (owner-only).
    pub fn cancel_withdraw(&self, caller: Address) -> Result<Receipt<()>, RegistryError> {
        self.transact("cancel_withdraw", caller, |c, ctx| c.cancel_withdraw(ctx))
    }

    /// `executeWithdraw` (owner-only): pays the whole treasury to the owner.
    ///
    /// If the payout sink fails, the treasury and the pending request are
    /// restored and [`RegistryError::PayoutFailed`] is returned.
    pub fn execute_withdraw(&self, caller: Address) -> Result<Receipt<Payout>, RegistryError> {
        let payouts = Arc::clone(&self.payouts);
        self.transact("execute_withdraw", caller, |c, ctx| {
            let applied = c.begin_withdraw(ctx)?;
            let pending = applied.value;
            if let Err(err) = payouts.transfer(pending.payout.to, pending.payout.amount) {
                c.rollback_withdraw(&pending);
                return Err(RegistryError::PayoutFailed(err));
            }
            Ok(Applied {
                value: pending.payout,
                events: applied.events,
            })
        })
    }

    // -- Queries ------------------------------------------------------------

    /// `tokenURI`.
    pub fn token_uri(&self, token_id: TokenId) -> Result<String, RegistryError> {
        self.view("tokenURI", |c| c.token_uri(token_id))
    }

    /// `ownerOf`.
    pub fn owner_of(&self, token_id: TokenId) -> Result<Address, RegistryError> {
        self.view("ownerOf", |c| c.owner_of(token_id))
    }

    /// `balanceOf`.
    pub fn balance_of(&self, owner: &Address) -> u64 {
        self.view("balanceOf", |c| c.balance_of(owner))
    }

    /// Token ids held by `owner`, ascending.
    pub fn tokens_of(&self, owner: &Address) -> Vec<TokenId> {
        self.view("tokensOf", |c| c.tokens_of(owner))
    }

    pub fn owner(&self) -> Address {
        self.view("owner", Collection::owner)
    }

    pub fn name(&self) -> String {
        self.view("name", |c| c.name().to_string())
    }

    pub fn symbol(&self) -> String {
        self.view("symbol", |c| c.symbol().to_string())
    }

    pub fn sale_active(&self) -> bool {
        self.view("saleActive", Collection::sale_active)
    }

    pub fn revealed(&self) -> bool {
        self.view("revealed", Collection::revealed)
    }

    pub fn total_supply(&self) -> u64 {
        self.view("totalSupply", Collection::total_supply)
    }

    pub fn max_supply(&self) -> u64 {
        self.view("maxSupply", Collection::max_supply)
    }

    pub fn mint_price(&self) -> Wei {
        self.view("mintPrice", Collection::mint_price)
    }

    pub fn hidden_base_uri(&self) -> String {
        self.view("hiddenBaseURI", |c| c.hidden_base_uri().to_string())
    }

    pub fn base_uri(&self) -> String {
        self.view("baseURI", |c| c.base_uri().to_string())
    }

    pub fn commitment(&self) -> Option<Commitment> {
        self.view("commitment", Collection::commitment)
    }

    pub fn grace_period(&self) -> Duration {
        self.view("gracePeriod", Collection::grace_period)
    }

    pub fn withdraw_requested(&self) -> bool {
        self.view("withdrawRequested", Collection::withdraw_requested)
    }

    pub fn withdraw_unlock_time(&self) -> Option<DateTime<Utc>> {
        self.view("withdrawUnlockTime", Collection::withdraw_unlock_time)
    }

    /// `getContractBalance`.
    pub fn contract_balance(&self) -> Wei {
        self.view("getContractBalance", Collection::contract_balance)
    }

    /// A consistent snapshot of the whole collection.
    pub fn status(&self) -> CollectionStatus {
        self.view("status", Collection::status)
    }

    /// Number of successful mutations so far.
    pub fn sequence(&self) -> u64 {
        self.inner.lock().sequence
    }

    /// The instant the next operation would be evaluated at.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;
    use crate::payout::PayoutError;
    use chrono::TimeZone;
    use veilmint_protocol::time::ManualClock;

    const SECRET: &str = "s3cret";
    const FINAL: &str = "ipfs://final/";

    struct Fixture {
        registry: Registry,
        clock: Arc<ManualClock>,
        ledger: Arc<InMemoryLedger>,
        owner: Address,
        price: Wei,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap(),
        ));
        let ledger = Arc::new(InMemoryLedger::new());
        let owner = Address::derive("owner");
        let config = CollectionConfig::default();
        let registry = Registry::new(owner, &config, clock.clone(), ledger.clone()).unwrap();
        Fixture {
            registry,
            clock,
            ledger,
            owner,
            price: config.mint_price,
        }
    }

    #[test]
    fn sequence_counts_only_successes() {
        let f = fixture();
        let stranger = Address::derive("stranger");

        assert_eq!(f.registry.start_sale(f.owner).unwrap().sequence, 1);
        assert!(f.registry.stop_sale(stranger).is_err());
        assert!(f.registry.mint_nft(stranger, 0).is_err());
        let receipt = f.registry.mint_nft(stranger, f.price).unwrap();
        assert_eq!(receipt.sequence, 2);
        assert_eq!(receipt.value, 1);
        assert_eq!(receipt.caller, stranger);
        assert_eq!(f.registry.sequence(), 2);
    }

    #[test]
    fn receipts_carry_the_clock_reading() {
        let f = fixture();
        let start = f.clock.now();
        let receipt = f.registry.start_sale(f.owner).unwrap();
        assert_eq!(receipt.timestamp, start);

        f.clock.advance(Duration::minutes(5)).unwrap();
        let receipt = f.registry.stop_sale(f.owner).unwrap();
        assert_eq!(receipt.timestamp, start + Duration::minutes(5));
    }

    #[test]
    fn execute_withdraw_pays_owner_through_sink() {
        let f = fixture();
        f.registry.start_sale(f.owner).unwrap();
        f.registry
            .mint_nft(Address::derive("minter"), f.price)
            .unwrap();
        f.registry
            .commit_metadata(f.owner, Commitment::compute(SECRET, FINAL))
            .unwrap();
        f.registry
            .reveal_metadata(f.owner, &RevealPayload::new(SECRET, FINAL))
            .unwrap();
        let unlock = f.registry.request_withdraw(f.owner).unwrap().value;

        f.clock.set(unlock).unwrap();
        let receipt = f.registry.execute_withdraw(f.owner).unwrap();
        assert_eq!(receipt.value.amount, f.price);
        assert_eq!(f.ledger.received(&f.owner), f.price);
        assert_eq!(f.registry.contract_balance(), 0);

        assert_eq!(
            f.registry.execute_withdraw(f.owner).unwrap_err(),
            RegistryError::NoWithdrawRequested
        );
        assert_eq!(f.ledger.history().len(), 1);
    }

    #[test]
    fn failed_payout_restores_state_and_keeps_sequence() {
        let f = fixture();
        f.registry.start_sale(f.owner).unwrap();
        f.registry
            .mint_nft(Address::derive("minter"), f.price)
            .unwrap();
        f.registry
            .commit_metadata(f.owner, Commitment::compute("", FINAL))
            .unwrap();
        f.registry
            .reveal_metadata(f.owner, &RevealPayload::uri_only(FINAL))
            .unwrap();
        let unlock = f.registry.request_withdraw(f.owner).unwrap().value;
        f.clock.set(unlock).unwrap();

        let before = f.registry.status();
        let seq = f.registry.sequence();
        f.ledger
            .fail_with(PayoutError::Unavailable("offline".into()));

        let err = f.registry.execute_withdraw(f.owner).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transfer);
        assert_eq!(f.registry.status(), before);
        assert_eq!(f.registry.sequence(), seq);
        assert_eq!(f.ledger.received(&f.owner), 0);

        f.ledger.clear_failure();
        f.registry.execute_withdraw(f.owner).unwrap();
        assert_eq!(f.ledger.received(&f.owner), f.price);
    }

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<(u64, Event)>>,
    }

    impl EventSink for RecordingSink {
        fn emit(&self, sequence: u64, _timestamp: DateTime<Utc>, event: &Event) {
            self.seen.lock().push((sequence, event.clone()));
        }
    }

    #[test]
    fn event_sink_sees_only_committed_events() {
        let f = fixture();
        let sink = Arc::new(RecordingSink::default());
        let registry = f.registry.with_event_sink(sink.clone());

        registry.start_sale(f.owner).unwrap();
        // No-op and rejected calls emit nothing.
        registry.start_sale(f.owner).unwrap();
        assert!(registry.stop_sale(Address::derive("stranger")).is_err());
        registry.mint_nft(Address::derive("minter"), f.price).unwrap();

        let seen = sink.seen.lock().clone();
        assert_eq!(
            seen,
            vec![
                (1, Event::SaleStarted),
                (3, Event::mint(Address::derive("minter"), 1)),
            ]
        );
    }

    #[test]
    fn event_sink_receives_concurrent_mints_in_sequence_order() {
        let f = fixture();
        let sink = Arc::new(RecordingSink::default());
        let registry = Arc::new(f.registry.with_event_sink(sink.clone()));
        registry.start_sale(f.owner).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                let price = f.price;
                std::thread::spawn(move || {
                    let minter = Address::derive(&format!("minter-{t}"));
                    for _ in 0..25 {
                        registry.mint_nft(minter, price).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let sequences: Vec<u64> = sink.seen.lock().iter().map(|(seq, _)| *seq).collect();
        assert_eq!(sequences.len(), 201);
        assert!(sequences.windows(2).all(|w| w[1] == w[0] + 1));
        assert_eq!(sequences.last().copied(), Some(registry.sequence()));
    }

    #[test]
    fn registry_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Registry>();
    }
}
