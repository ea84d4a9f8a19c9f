use criterion::{criterion_group, criterion_main, Criterion};
use proofchain_core::{mine::solve_proof, pow::validate_proof, Chain, LedgerConfig};
use serde_json::json;

fn bench_pow(c: &mut Criterion) {
    let chain = Chain::new(LedgerConfig::default()).unwrap();
    let challenge = chain.challenge().unwrap();

    c.bench_function("validate_proof", |b| {
        b.iter(|| {
            validate_proof(
                chain.hasher(),
                &challenge.last_proof,
                "deadbeef",
                &challenge.resolution_hash,
            )
        });
    });

    c.bench_function("solve_proof_genesis_target", |b| {
        b.iter(|| {
            solve_proof(
                chain.hasher(),
                &challenge.last_proof,
                &challenge.resolution_hash,
                0..u64::MAX,
            )
        });
    });

    c.bench_function("add_block", |b| {
        b.iter_batched(
            || chain.clone(),
            |mut chain| {
                let challenge = chain.challenge().unwrap();
                let solution = solve_proof(
                    chain.hasher(),
                    &challenge.last_proof,
                    &challenge.resolution_hash,
                    0..u64::MAX,
                )
                .unwrap();
                chain
                    .add_block(&solution.proof, json!({}), "bench")
                    .map(|block| block.index)
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_pow);
criterion_main!(benches);
