// Commitment hashing benchmarks for veilmint.
//
// Covers raw Keccak-256 over growing inputs, commitment computation for a
// realistic secret + base URI, and the verify path the registry runs on
// every reveal attempt.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use veilmint_protocol::crypto::{generate_secret, keccak256, Commitment};
use veilmint_protocol::identity::Address;

const BASE_URI: &str = "ipfs://bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi/";

fn bench_keccak_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("keccak256/input_size");

    for size in [32usize, 256, 4096] {
        let input = vec![0xabu8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &input, |b, input| {
            b.iter(|| keccak256(input));
        });
    }

    group.finish();
}

fn bench_commitment_compute(c: &mut Criterion) {
    let secret = generate_secret();

    c.bench_function("commitment/compute", |b| {
        b.iter(|| Commitment::compute(&secret, BASE_URI));
    });
}

fn bench_commitment_verify(c: &mut Criterion) {
    let secret = generate_secret();
    let commitment = Commitment::compute(&secret, BASE_URI);

    c.bench_function("commitment/verify_match", |b| {
        b.iter(|| commitment.verify(&secret, BASE_URI));
    });
    c.bench_function("commitment/verify_mismatch", |b| {
        b.iter(|| commitment.verify(&secret, "ipfs://wrong/"));
    });
}

fn bench_address_derive(c: &mut Criterion) {
    c.bench_function("address/derive", |b| {
        b.iter(|| Address::derive("minter-0042"));
    });
}

criterion_group!(
    benches,
    bench_keccak_sizes,
    bench_commitment_compute,
    bench_commitment_verify,
    bench_address_derive,
);
criterion_main!(benches);
