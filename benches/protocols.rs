use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gg20_sign::{
    deal,
    protocol::{run_protocol, Participant, Protocol},
    sign, Message, Parameters, PartyId, PreParams, SaveData, SignatureData, SortedPartyIds,
};
use libpaillier::unknown_order::BigNumber;
use rand_core::OsRng;

const PRIMES: &str = include_str!("../testdata/primes.txt");

fn primes() -> Vec<BigNumber> {
    PRIMES
        .lines()
        .filter(|l| !l.starts_with('#'))
        .map(|l| BigNumber::from_slice(hex::decode(l.trim()).unwrap()))
        .collect()
}

fn setup(n: usize, threshold: usize) -> (SortedPartyIds, Vec<SaveData>) {
    let primes = primes();
    let ids = (1..=n as u64)
        .map(|k| PartyId::new(format!("{k}"), format!("P[{k}]"), BigNumber::from(k)))
        .collect();
    let parties = SortedPartyIds::new(ids).unwrap();
    let pre_params = (0..n)
        .map(|i| PreParams {
            paillier_p: primes[2 * i].clone(),
            paillier_q: primes[2 * i + 1].clone(),
            safe_p: primes[2 * n + 2 * i].clone(),
            safe_q: primes[2 * n + 2 * i + 1].clone(),
        })
        .collect();
    let shares = deal(&mut OsRng, &parties, threshold, None, pre_params).unwrap();
    (parties, shares)
}

fn run_sign(
    parties: &SortedPartyIds,
    shares: &[SaveData],
    threshold: usize,
    msg: &[u8],
) -> Vec<(Participant, SignatureData)> {
    let mut protocols: Vec<(Participant, Box<dyn Protocol<Output = SignatureData>>)> =
        Vec::with_capacity(shares.len());

    for (p, id) in parties.participants().zip(parties.ids()) {
        let params = Parameters::new(parties.ids().to_vec(), id, threshold, b"bench").unwrap();
        let protocol = sign(params, &shares[p.index()], Message::hashed(msg)).unwrap();
        protocols.push((p, Box::new(protocol)));
    }

    run_protocol(protocols).unwrap()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let t = 2;
    let (parties, shares) = setup(3, t);
    let msg = b"hello world";

    let mut group = c.benchmark_group("signing");
    group.sample_size(10);
    group.bench_function("sign (3,3)", |b| {
        b.iter(|| run_sign(black_box(&parties), black_box(&shares), black_box(t), black_box(msg)))
    });
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
