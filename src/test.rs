use k256::{
    ecdsa::{RecoveryId, VerifyingKey},
    Scalar,
};
use libpaillier::unknown_order::BigNumber;
use rand::{rngs::StdRng, SeedableRng};
use rand_core::OsRng;
use tracing_subscriber::EnvFilter;

use crate::{
    compat::scalar_to_bytes,
    keyshare::SaveData,
    participants::PartyId,
    protocol::{Action, Participant, Protocol, ProtocolError},
    signing::{
        messages::SignRound6Message, AbortPayload, LocalParty, Message, MessageContent,
        PairwiseShares, Parameters, SignMessage, SignatureData,
    },
};

pub(crate) mod fixtures {
    //! Keys and primes shared by the tests.
    //!
    //! Finding primes is far too slow to do in every test, so these were
    //! generated once.
    use std::sync::OnceLock;

    use libpaillier::unknown_order::BigNumber;
    use rand_core::{CryptoRngCore, OsRng};

    use crate::{
        keyshare::SaveData,
        paillier::DecryptionKey,
        participants::{PartyId, SortedPartyIds},
        proofs::PedersenParams,
        trusted_dealer::{self, PreParams},
    };

    /// Six Paillier primes, then six safe primes, two of each per party.
    const PRIMES: &str = include_str!("../testdata/primes.txt");

    /// The most parties the fixtures have primes for.
    pub const MAX_PARTIES: usize = 3;

    fn prime(i: usize) -> BigNumber {
        let line = PRIMES
            .lines()
            .filter(|l| !l.starts_with('#'))
            .nth(i)
            .unwrap();
        BigNumber::from_slice(hex::decode(line.trim()).unwrap())
    }

    fn paillier_prime(i: usize) -> BigNumber {
        prime(i)
    }

    fn safe_prime(i: usize) -> BigNumber {
        prime(2 * MAX_PARTIES + i)
    }

    pub fn paillier_key(i: usize) -> &'static DecryptionKey {
        static KEYS: OnceLock<Vec<DecryptionKey>> = OnceLock::new();
        let keys = KEYS.get_or_init(|| {
            (0..MAX_PARTIES)
                .map(|i| {
                    DecryptionKey::with_primes(&paillier_prime(2 * i), &paillier_prime(2 * i + 1))
                        .unwrap()
                })
                .collect()
        });
        &keys[i]
    }

    pub fn pedersen_params(i: usize) -> PedersenParams {
        static PARAMS: OnceLock<Vec<PedersenParams>> = OnceLock::new();
        let params = PARAMS.get_or_init(|| {
            (0..MAX_PARTIES)
                .map(|i| {
                    PedersenParams::from_safe_primes(
                        &mut OsRng,
                        &safe_prime(2 * i),
                        &safe_prime(2 * i + 1),
                    )
                    .unwrap()
                })
                .collect()
        });
        params[i].clone()
    }

    /// Parties with keys 1 through n.
    pub fn party_ids(n: usize) -> SortedPartyIds {
        let ids = (1..=n as u64)
            .map(|k| PartyId::new(format!("{k}"), format!("P[{k}]"), BigNumber::from(k)))
            .collect();
        SortedPartyIds::new(ids).unwrap()
    }

    pub fn pre_params(n: usize) -> Vec<PreParams> {
        assert!(n <= MAX_PARTIES, "only {MAX_PARTIES} sets of primes");
        (0..n)
            .map(|i| PreParams {
                paillier_p: paillier_prime(2 * i),
                paillier_q: paillier_prime(2 * i + 1),
                safe_p: safe_prime(2 * i),
                safe_q: safe_prime(2 * i + 1),
            })
            .collect()
    }

    /// Shares of a fresh key between the parties of [`party_ids`].
    pub fn deal(rng: &mut impl CryptoRngCore, n: usize, threshold: usize) -> Vec<SaveData> {
        trusted_dealer::deal(rng, &party_ids(n), threshold, None, pre_params(n)).unwrap()
    }
}

fn init_testing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Set up a session between some of the holders of a key.
fn setup(
    shares: &[SaveData],
    signers: &[usize],
    threshold: usize,
    msg: &Message,
) -> Vec<LocalParty<StdRng>> {
    let all = fixtures::party_ids(shares.len());
    let ids: Vec<PartyId> = signers.iter().map(|&i| all.ids()[i].clone()).collect();
    signers
        .iter()
        .map(|&i| {
            let params =
                Parameters::new(ids.clone(), &all.ids()[i], threshold, b"session nonce").unwrap();
            let rng = StdRng::seed_from_u64(i as u64);
            LocalParty::new(params, &shares[i], msg.clone(), rng).unwrap()
        })
        .collect()
}

/// Run every party until nobody can make progress.
///
/// Every message passes through `tamper` first, which gets the sender, the
/// recipient of a direct message, and the content. The result for a party
/// is None if it got stuck waiting.
fn drive(
    parties: &mut [LocalParty<StdRng>],
    mut tamper: impl FnMut(Participant, Option<Participant>, &mut MessageContent),
) -> Vec<Option<Result<SignatureData, ProtocolError>>> {
    let n = parties.len();
    let mut outcomes: Vec<Option<Result<SignatureData, ProtocolError>>> =
        (0..n).map(|_| None).collect();
    let mut reencode = |from: Participant, to: Option<Participant>, data: Vec<u8>| {
        let mut msg = SignMessage::from_wire(&data, from).unwrap();
        tamper(from, to, &mut msg.content);
        let msg = match to {
            None => SignMessage::broadcast(from, msg.content),
            Some(to) => SignMessage::direct(from, to, msg.content),
        };
        msg.unwrap().to_wire().to_vec()
    };
    loop {
        let mut progressed = false;
        for i in 0..n {
            let from = Participant::from(i as u32);
            while outcomes[i].is_none() {
                match parties[i].poke() {
                    Ok(Action::Wait) => break,
                    Ok(Action::Return(sig)) => outcomes[i] = Some(Ok(sig)),
                    Err(e) => outcomes[i] = Some(Err(e)),
                    Ok(Action::SendMany(data)) => {
                        let data = reencode(from, None, data);
                        for (j, party) in parties.iter_mut().enumerate() {
                            if j != i {
                                party.message(from, data.clone());
                            }
                        }
                    }
                    Ok(Action::SendPrivate(to, data)) => {
                        let data = reencode(from, Some(to), data);
                        parties[to.index()].message(from, data);
                    }
                }
                progressed = true;
            }
        }
        if !progressed {
            return outcomes;
        }
    }
}

fn blamed(err: &ProtocolError) -> Vec<String> {
    err.culprits().iter().map(|p| p.id.clone()).collect()
}

#[test]
fn test_signing() {
    init_testing();
    let shares = fixtures::deal(&mut OsRng, 3, 2);
    let public_key = shares[0].public_key;
    let msg = Message::hashed(b"Hello world");

    let mut parties = setup(&shares, &[0, 1, 2], 2, &msg);
    let outcomes = drive(&mut parties, |_, _, _| {});

    let sigs: Vec<SignatureData> = outcomes.into_iter().map(|o| o.unwrap().unwrap()).collect();
    assert!(sigs.iter().all(|s| s == &sigs[0]));
    let sig = &sigs[0];
    assert!(sig.verify(&public_key));
    assert_eq!(sig.message.as_deref(), Some(&b"Hello world"[..]));
    assert_eq!(&sig.m, msg.digest());

    let ecdsa_sig = sig.to_ecdsa().unwrap();
    assert!(ecdsa_sig.normalize_s().is_none());
    let recovered = VerifyingKey::recover_from_prehash(
        &sig.m,
        &ecdsa_sig,
        RecoveryId::from_byte(sig.recovery_id).unwrap(),
    )
    .unwrap();
    assert_eq!(recovered, VerifyingKey::from_affine(public_key.to_affine()).unwrap());

    // Nothing more comes out once the signature has.
    assert!(matches!(parties[0].poke(), Ok(Action::Wait)));
}

#[test]
fn test_messages_from_ourselves_are_ignored() {
    init_testing();
    let shares = fixtures::deal(&mut OsRng, 3, 2);
    let msg = Message::hashed(b"Hello world");
    let mut parties = setup(&shares, &[0, 1, 2], 2, &msg);

    let me = Participant::from(0u32);
    let Ok(Action::SendPrivate(to, data)) = parties[0].poke() else {
        panic!("round 1 starts with direct messages");
    };
    parties[0].message(me, data.clone());
    parties[to.index()].message(me, data);
    assert_eq!(parties[0].round_number(), Some(1));

    let outcomes = drive(&mut parties, |_, _, _| {});
    assert!(outcomes.iter().all(|o| matches!(o, Some(Ok(_)))));
}

#[test]
fn test_signing_with_a_subset() {
    init_testing();
    let shares = fixtures::deal(&mut OsRng, 3, 1);
    let msg = Message::hashed(b"Hello world");

    let mut parties = setup(&shares, &[0, 2], 1, &msg);
    let outcomes = drive(&mut parties, |_, _, _| {});
    for outcome in outcomes {
        assert!(outcome.unwrap().unwrap().verify(&shares[0].public_key));
    }
}

#[test]
fn test_signing_with_derived_key() {
    init_testing();
    let shares = fixtures::deal(&mut OsRng, 3, 1);
    let delta = Scalar::from(7u64);
    let children: Vec<SaveData> = shares.iter().map(|s| s.derive_child(&delta)).collect();
    let msg = Message::from_digest([0x42; 32]);

    let mut parties = setup(&children, &[1, 2], 1, &msg);
    let outcomes = drive(&mut parties, |_, _, _| {});
    let sig = outcomes[0].as_ref().unwrap().as_ref().unwrap();
    assert!(sig.verify(&children[0].public_key));
    assert!(!sig.verify(&shares[0].public_key));
    assert_eq!(sig.message, None);
}

#[test]
fn test_bad_tproof_stalls_round_3() {
    init_testing();
    let shares = fixtures::deal(&mut OsRng, 3, 2);
    let msg = Message::hashed(b"Hello world");
    let mut parties = setup(&shares, &[0, 1, 2], 2, &msg);

    let outcomes = drive(&mut parties, |from, _, content| {
        if let (1, MessageContent::Round3(m)) = (from.index(), content) {
            let last = m.t_proof[2].len() - 1;
            m.t_proof[2][last] ^= 1;
        }
    });
    // The message is dropped, and no one can move past round 3 without it.
    assert!(outcomes.iter().all(Option::is_none));
    assert_eq!(parties[0].round_number(), Some(3));
    assert_eq!(parties[2].round_number(), Some(3));
}

#[test]
fn test_bad_range_proof_stalls_round_1() {
    init_testing();
    let shares = fixtures::deal(&mut OsRng, 3, 2);
    let msg = Message::hashed(b"Hello world");
    let mut parties = setup(&shares, &[0, 1, 2], 2, &msg);

    let victim = Participant::from(0u32);
    let outcomes = drive(&mut parties, |from, to, content| {
        if let (1, Some(to), MessageContent::Round1Direct(m)) = (from.index(), to, content) {
            if to == victim {
                let last = m.range_proof_alice[0].len() - 1;
                m.range_proof_alice[0][last] ^= 1;
            }
        }
    });
    // Party 0 never accepts the proof, so it never sends its round 2 messages.
    assert!(outcomes.iter().all(Option::is_none));
    assert_eq!(parties[0].round_number(), Some(1));
    assert_eq!(parties[1].round_number(), Some(2));
    assert_eq!(parties[2].round_number(), Some(2));
}

#[test]
fn test_every_bad_bob_is_blamed() {
    init_testing();
    let shares = fixtures::deal(&mut OsRng, 3, 2);
    let msg = Message::hashed(b"Hello world");
    let mut parties = setup(&shares, &[0, 1, 2], 2, &msg);

    let victim = Participant::from(0u32);
    let outcomes = drive(&mut parties, |_, to, content| {
        if let (Some(to), MessageContent::Round2(m)) = (to, content) {
            if to == victim {
                let c1 = BigNumber::from_slice(&m.c1) + BigNumber::one();
                m.c1 = c1.to_bytes();
            }
        }
    });
    let err = outcomes[0].as_ref().unwrap().as_ref().unwrap_err();
    assert!(matches!(err, ProtocolError::Culprits { round: 3, .. }));
    assert_eq!(blamed(err), vec!["2", "3"]);
}

#[test]
fn test_inconsistent_delta_is_blamed() {
    init_testing();
    let shares = fixtures::deal(&mut OsRng, 3, 2);
    let msg = Message::hashed(b"Hello world");
    let mut parties = setup(&shares, &[0, 1, 2], 2, &msg);

    // Everyone but party 1 sees a different delta_1, so they disagree on R.
    let outcomes = drive(&mut parties, |from, _, content| {
        if let (1, MessageContent::Round3(m)) = (from.index(), content) {
            let delta = m.delta_i().unwrap() + Scalar::ONE;
            m.delta_i = scalar_to_bytes(&delta);
        }
    });
    for i in [0, 2] {
        let err = outcomes[i].as_ref().unwrap().as_ref().unwrap_err();
        assert!(matches!(err, ProtocolError::Culprits { round: 6, .. }));
        assert_eq!(blamed(err), vec!["2"]);
    }
}

#[test]
fn test_false_abort_is_blamed() {
    init_testing();
    let shares = fixtures::deal(&mut OsRng, 3, 2);
    let msg = Message::hashed(b"Hello world");
    let mut parties = setup(&shares, &[0, 1, 2], 2, &msg);

    // Party 1 claims the nonce check failed, revealing made up secrets.
    let outcomes = drive(&mut parties, |from, _, content| {
        let success = matches!(&*content, MessageContent::Round6(m) if !m.is_abort());
        if from.index() == 1 && success {
            let shares = PairwiseShares {
                alpha_ij: vec![1],
                beta_ji: vec![2],
            };
            *content = MessageContent::Round6(SignRound6Message::Abort(AbortPayload {
                k_i: vec![3],
                k_randomness: vec![4],
                gamma_i: vec![5],
                shares: vec![Some(shares.clone()), None, Some(shares)],
            }));
        }
    });
    for i in [0, 2] {
        let err = outcomes[i].as_ref().unwrap().as_ref().unwrap_err();
        let ProtocolError::Aborted { round: 7, record } = err else {
            panic!("expected an abort, got {err}");
        };
        assert_eq!(blamed(err), vec!["2"]);
        assert!(record.revealed[1].is_some());
        assert!(record.revealed[0].is_none());
    }
    // Party 1 saw nothing wrong, and waits for shares of s that never come.
    assert!(outcomes[1].is_none());
    assert_eq!(parties[1].round_number(), Some(7));
}

#[test]
fn test_cancellation() {
    init_testing();
    let shares = fixtures::deal(&mut OsRng, 3, 2);
    let msg = Message::hashed(b"Hello world");
    let mut parties = setup(&shares, &[0, 1, 2], 2, &msg);

    parties[0].cancel_token().cancel();
    assert!(matches!(parties[0].poke(), Err(ProtocolError::Cancelled)));
    assert!(matches!(parties[0].poke(), Err(ProtocolError::Sequence(_))));
    assert_eq!(parties[0].round_number(), None);
}
