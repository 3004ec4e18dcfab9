use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use curve25519_dalek::scalar::Scalar;
use pod_complaint::{
    hashers::tree_of_k,
    keystream::derive_many,
    merkle::{build_tree, path_for_leaf, verify_leaf_path},
    verify_claim, Buyer, Cheat, PlainBuyerData, PlainSellerData, Range, SecretOutcome, Seller, SellerData,
};

const S: u64 = 16;

fn matrix(n: u64) -> PlainSellerData {
    let cells = (0..n * S).map(|x| Scalar::from(x ^ 0x5A5A)).collect();
    PlainSellerData::new(n, S, cells).unwrap()
}

fn bench_keystream(c: &mut Criterion) {
    let seed = [7u8; 32];
    let mut group = c.benchmark_group("keystream_derive_many");
    for count in [256u64, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| derive_many(black_box(&seed), black_box(count)));
        });
    }
    group.finish();
}

fn bench_merkle(c: &mut Criterion) {
    let leaves: Vec<[u8; 32]> = (0..4096u32)
        .map(|i| {
            let mut d = [0u8; 32];
            d[..4].copy_from_slice(&i.to_le_bytes());
            d
        })
        .collect();
    let tree = build_tree(&leaves);
    let root = tree.root();
    let path = path_for_leaf(&tree, 1234).unwrap();

    c.bench_function("merkle_build_4096", |b| {
        b.iter(|| build_tree(black_box(&leaves)));
    });
    c.bench_function("merkle_verify_leaf", |b| {
        b.iter(|| verify_leaf_path(black_box(&leaves[1234]), 1234, 4096, black_box(&root), black_box(&path)));
    });
}

fn bench_session(c: &mut Criterion) {
    let a = Arc::new(matrix(128));
    let b = Arc::new(PlainBuyerData::new(a.bulletin()));
    let demands = vec![Range::new(0, 32), Range::new(64, 32)];

    c.bench_function("seller_on_request_64x16", |bench| {
        bench.iter(|| {
            let (_, request) = Buyer::new(b.clone(), [2; 32], [1; 32], demands.clone()).unwrap().get_request();
            Seller::new(a.clone(), [1; 32], [2; 32]).on_request(black_box(request)).unwrap()
        });
    });

    c.bench_function("buyer_full_session_64x16", |bench| {
        bench.iter(|| {
            let (buyer, request) = Buyer::new(b.clone(), [2; 32], [1; 32], demands.clone()).unwrap().get_request();
            let (seller, response) = Seller::new(a.clone(), [1; 32], [2; 32]).on_request(request).unwrap();
            let (buyer, receipt) = buyer.on_response(response).unwrap();
            let secret = seller.on_receipt(&receipt).unwrap();
            buyer.on_secret(&secret).unwrap()
        });
    });
}

fn bench_sigma_check(c: &mut Criterion) {
    let a = Arc::new(matrix(128));
    let b = Arc::new(PlainBuyerData::with_sigmas(a.bulletin(), a.sigmas().to_vec()).unwrap());
    let demands = vec![Range::new(0, 64)];

    c.bench_function("buyer_on_response_with_sigmas_64x16", |bench| {
        bench.iter_batched(
            || {
                let (buyer, request) =
                    Buyer::new(b.clone(), [2; 32], [1; 32], demands.clone()).unwrap().get_request();
                let (_, response) = Seller::new(a.clone(), [1; 32], [2; 32]).on_request(request).unwrap();
                (buyer, response)
            },
            |(buyer, response)| buyer.on_response(response).unwrap(),
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_dispute(c: &mut Criterion) {
    let a = Arc::new(matrix(16));
    let b = Arc::new(PlainBuyerData::new(a.bulletin()));
    let mut seller = Seller::new(a, [1; 32], [2; 32]);
    seller.set_cheat(Cheat::ReplaceKey(77));

    let (buyer, request) = Buyer::new(b, [2; 32], [1; 32], vec![Range::new(0, 16)]).unwrap().get_request();
    let (seller, response) = seller.on_request(request).unwrap();
    let k = response.k.clone();
    let (buyer, receipt) = buyer.on_response(response).unwrap();
    let secret = seller.on_receipt(&receipt).unwrap();
    let SecretOutcome::Disputed(d) = buyer.on_secret(&secret).unwrap() else {
        panic!("cheating seller must be disputed");
    };
    let claim = d.generate_claim();

    c.bench_function("verify_claim", |bench| {
        bench.iter(|| verify_claim(S, black_box(&receipt), black_box(&secret), black_box(&claim)));
    });
    c.bench_function("tree_of_k_256", |bench| {
        bench.iter(|| tree_of_k(black_box(&k)));
    });
}

criterion_group!(benches, bench_keystream, bench_merkle, bench_session, bench_sigma_check, bench_dispute);
criterion_main!(benches);
