//! Property-style tests for the registry.
//!
//! Random operation sequences (seeded, so failures reproduce) are thrown at
//! a small collection, and the state invariants are checked after every
//! call. A separate test hammers one registry from several threads.

use std::sync::Arc;
use std::thread;

use chrono::{Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use veilmint_contracts::{CollectionStatus, InMemoryLedger, Registry, RegistryError};
use veilmint_protocol::config::CollectionConfig;
use veilmint_protocol::crypto::{Commitment, RevealPayload};
use veilmint_protocol::identity::Address;
use veilmint_protocol::time::ManualClock;

const PRICE: u128 = 1_000;
const FINAL_URI: &str = "ipfs://final/";

fn small_config(max_supply: u64) -> CollectionConfig {
    CollectionConfig {
        name: "Props".into(),
        symbol: "PRP".into(),
        max_supply,
        mint_price: PRICE,
        grace_period_secs: 3_600,
    }
}

struct World {
    registry: Registry,
    clock: Arc<ManualClock>,
    ledger: Arc<InMemoryLedger>,
    owner: Address,
    minters: Vec<Address>,
}

fn world(max_supply: u64) -> World {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap(),
    ));
    let ledger = Arc::new(InMemoryLedger::new());
    let owner = Address::derive("owner");
    let registry = Registry::new(
        owner,
        &small_config(max_supply),
        clock.clone(),
        ledger.clone(),
    )
    .unwrap();
    let minters = (0..4)
        .map(|i| Address::derive(&format!("minter-{i}")))
        .collect();
    World {
        registry,
        clock,
        ledger,
        owner,
        minters,
    }
}

/// Applies one random operation and returns whether it succeeded.
fn random_step(w: &World, rng: &mut StdRng) -> bool {
    let anyone = if rng.gen_bool(0.8) {
        w.minters[rng.gen_range(0..w.minters.len())]
    } else {
        w.owner
    };
    let caller = if rng.gen_bool(0.85) { w.owner } else { anyone };
    let secret = if rng.gen_bool(0.5) { "s" } else { "t" };

    match rng.gen_range(0..12) {
        0 => w.registry.set_hidden_base_uri(caller, "ipfs://hidden/").is_ok(),
        1 => w
            .registry
            .commit_metadata(caller, Commitment::compute(secret, FINAL_URI))
            .is_ok(),
        2 => w
            .registry
            .reveal_metadata(caller, &RevealPayload::new(secret, FINAL_URI))
            .is_ok(),
        3 => w.registry.start_sale(caller).is_ok(),
        4 => w.registry.stop_sale(caller).is_ok(),
        5 => {
            let price = if rng.gen_bool(0.7) { PRICE } else { rng.gen_range(0..3) };
            w.registry.set_mint_price(caller, price).is_ok()
        }
        6 | 7 => {
            let payment = if rng.gen_bool(0.8) {
                w.registry.mint_price()
            } else {
                rng.gen_range(0..2 * PRICE)
            };
            w.registry.mint_nft(anyone, payment).is_ok()
        }
        8 => w.registry.request_withdraw(caller).is_ok(),
        9 => w.registry.cancel_withdraw(caller).is_ok(),
        10 => w.registry.execute_withdraw(caller).is_ok(),
        _ => {
            let secs = rng.gen_range(0..5_000);
            w.clock.advance(Duration::seconds(secs)).is_ok()
        }
    }
}

fn check_invariants(w: &World, status: &CollectionStatus) {
    assert!(status.total_supply <= status.max_supply);

    let mut counted = 0;
    for holder in w.minters.iter().chain(std::iter::once(&w.owner)) {
        let tokens = w.registry.tokens_of(holder);
        assert_eq!(tokens.len() as u64, w.registry.balance_of(holder));
        counted += tokens.len() as u64;
    }
    assert_eq!(counted, status.total_supply);

    for id in 1..=status.total_supply {
        assert!(w.registry.owner_of(id).is_ok());
    }
    assert!(w.registry.owner_of(status.total_supply + 1).is_err());

    assert_eq!(status.withdraw_requested, status.withdraw_unlock_time.is_some());
    if status.withdraw_requested {
        assert!(status.revealed);
    }
}

// ---------------------------------------------------------------------------
// Random Sequences
// ---------------------------------------------------------------------------

#[test]
fn invariants_hold_across_random_sequences() {
    for seed in 0..40u64 {
        let w = world(5);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut prev = w.registry.status();

        for _ in 0..200 {
            let before_seq = w.registry.sequence();
            let ok = random_step(&w, &mut rng);
            let status = w.registry.status();

            check_invariants(&w, &status);

            // Supply never decreases; reveal never reverts.
            assert!(status.total_supply >= prev.total_supply);
            assert!(status.revealed || !prev.revealed);
            if prev.revealed {
                assert_eq!(status.commitment, prev.commitment);
            }

            // Failed calls never touch the collection or the sequence.
            if !ok {
                assert_eq!(status, prev, "seed {seed}");
                assert_eq!(w.registry.sequence(), before_seq);
            }

            prev = status;
        }

        // Money is conserved: minted value is either held or paid out.
        let minted = u128::from(prev.total_supply);
        assert!(prev.balance + w.ledger.received(&w.owner) <= minted * PRICE);
    }
}

#[test]
fn reveal_succeeds_at_most_once() {
    let w = world(5);
    w.registry
        .commit_metadata(w.owner, Commitment::compute("", FINAL_URI))
        .unwrap();
    w.registry
        .reveal_metadata(w.owner, &RevealPayload::uri_only(FINAL_URI))
        .unwrap();

    for secret in ["", "s", "t"] {
        assert_eq!(
            w.registry
                .reveal_metadata(w.owner, &RevealPayload::new(secret, FINAL_URI))
                .unwrap_err(),
            RegistryError::AlreadyRevealed
        );
        assert_eq!(
            w.registry
                .commit_metadata(w.owner, Commitment::compute(secret, FINAL_URI))
                .unwrap_err(),
            RegistryError::AlreadyRevealed
        );
    }
}

#[test]
fn execute_succeeds_exactly_once_per_request() {
    let w = world(5);
    w.registry.start_sale(w.owner).unwrap();
    w.registry.mint_nft(w.minters[0], PRICE).unwrap();
    w.registry
        .commit_metadata(w.owner, Commitment::compute("", FINAL_URI))
        .unwrap();
    w.registry
        .reveal_metadata(w.owner, &RevealPayload::uri_only(FINAL_URI))
        .unwrap();
    w.registry.request_withdraw(w.owner).unwrap();
    w.clock.advance(Duration::hours(2)).unwrap();

    let successes = (0..5)
        .filter(|_| w.registry.execute_withdraw(w.owner).is_ok())
        .count();
    assert_eq!(successes, 1);
    assert_eq!(w.ledger.received(&w.owner), PRICE);
    assert_eq!(w.registry.contract_balance(), 0);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[test]
fn concurrent_mints_never_oversell() {
    let w = Arc::new(world(50));
    w.registry.start_sale(w.owner).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let w = Arc::clone(&w);
            thread::spawn(move || {
                let me = Address::derive(&format!("thread-{t}"));
                (0..20)
                    .filter(|_| w.registry.mint_nft(me, PRICE).is_ok())
                    .count() as u64
            })
        })
        .collect();

    let minted: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(minted, 50);
    assert_eq!(w.registry.total_supply(), 50);
    assert_eq!(w.registry.contract_balance(), 50 * PRICE);

    // Ids are dense: 1..=50, each with exactly one owner.
    for id in 1..=50 {
        w.registry.owner_of(id).unwrap();
    }
    assert!(w.registry.owner_of(51).is_err());
}

#[test]
fn concurrent_executes_pay_out_once() {
    let w = Arc::new(world(5));
    w.registry.start_sale(w.owner).unwrap();
    for m in w.minters.clone() {
        w.registry.mint_nft(m, PRICE).unwrap();
    }
    w.registry
        .commit_metadata(w.owner, Commitment::compute("", FINAL_URI))
        .unwrap();
    w.registry
        .reveal_metadata(w.owner, &RevealPayload::uri_only(FINAL_URI))
        .unwrap();
    w.registry.request_withdraw(w.owner).unwrap();
    w.clock.advance(Duration::hours(1)).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let w = Arc::clone(&w);
            thread::spawn(move || w.registry.execute_withdraw(w.owner).is_ok())
        })
        .collect();
    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(successes, 1);
    assert_eq!(w.ledger.history().len(), 1);
    assert_eq!(w.ledger.received(&w.owner), 4 * PRICE);
}
