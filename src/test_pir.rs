#![cfg(test)]

use crate::{
    Keypair, PaillierPIRError, Querier, RelationshipGraph, Responder, ScoreStore,
    persist::{self, EdgeRecord},
    pir_internals::params::KeySizes,
};
use num_bigint_dig::BigInt;
use rand::prelude::*;
use rand_chacha::ChaCha20Rng;
use std::{sync::Arc, thread};

const TEST_KEY_SIZES: KeySizes = KeySizes::new(256, 528);

fn setup_with_scores(plain_scores: &[i64]) -> (Querier, Responder) {
    let mut rng = ChaCha20Rng::from_os_rng();

    let primary = Keypair::generate(TEST_KEY_SIZES.primary_bit_len, &mut rng).expect("Key generation failed");
    let pk = primary.public_key().clone();

    let cts = plain_scores.iter().map(|&v| pk.encrypt(&BigInt::from(v), &mut rng)).collect();
    let store = ScoreStore::from_ciphertexts(&pk, cts).expect("Score store construction failed");

    let responder = Responder::from_score_store(pk, store).expect("Responder setup failed");
    let querier = Querier::setup(primary, responder.num_entries(), TEST_KEY_SIZES).expect("Querier setup failed");

    (querier, responder)
}

fn masked_pir(querier: &Querier, responder: &Responder, pid: usize) -> Result<BigInt, PaillierPIRError> {
    let query = querier.build_masked_query(pid)?;
    let response = responder.evaluate_masked_query(&query)?;
    let (masked, mask) = response.select(pid)?;

    querier.resolve_masked_response(masked, mask)
}

fn layered_pir(querier: &Querier, responder: &Responder, pid: usize) -> Result<BigInt, PaillierPIRError> {
    let query = querier.build_layered_query(pid)?;
    let response = responder.evaluate_layered_query(&query)?;

    querier.resolve_layered_response(&response)
}

#[test]
fn three_entry_store_in_both_modes() {
    let (querier, responder) = setup_with_scores(&[3, 7, 2]);

    assert_eq!(masked_pir(&querier, &responder, 1), Ok(BigInt::from(7)));
    assert_eq!(layered_pir(&querier, &responder, 1), Ok(BigInt::from(7)));

    assert_eq!(masked_pir(&querier, &responder, 5), Err(PaillierPIRError::IndexOutOfRange(5)));
    assert_eq!(layered_pir(&querier, &responder, 5), Err(PaillierPIRError::IndexOutOfRange(5)));
}

#[test]
fn pir_over_environment_scores_of_random_graph() {
    const POPULATION: usize = 24;
    const NUM_EDGES: usize = 40;

    let mut rng = ChaCha20Rng::from_os_rng();

    let primary = Keypair::generate(TEST_KEY_SIZES.primary_bit_len, &mut rng).expect("Key generation failed");
    let pk = primary.public_key().clone();

    let records = persist::generate_score_records(&pk, POPULATION, &mut rng);
    let inputs = persist::score_store_from_records(&pk, &records).expect("Failed to load score records");

    let edges = (0..NUM_EDGES)
        .map(|_| (rng.random_range(0..POPULATION as u32), rng.random_range(0..POPULATION as u32)))
        .collect::<Vec<_>>();
    let graph = RelationshipGraph::from_edges(edges.iter().copied());

    let responder = Responder::setup(pk, &inputs, &graph).expect("Responder setup failed");
    let querier = Querier::setup(primary, responder.num_entries(), TEST_KEY_SIZES).expect("Querier setup failed");

    for (pid, &identity) in responder.directory().iter().enumerate() {
        let expected = graph
            .neighbors(identity)
            .map(|neighbor| records[neighbor as usize].score_plain)
            .sum::<i64>();

        assert_eq!(masked_pir(&querier, &responder, pid), Ok(BigInt::from(expected)), "identity = {}", identity);
        assert_eq!(layered_pir(&querier, &responder, pid), Ok(BigInt::from(expected)), "identity = {}", identity);
    }
}

#[test]
fn pir_over_persisted_inputs() {
    let mut rng = ChaCha20Rng::from_os_rng();
    let primary = Keypair::generate(TEST_KEY_SIZES.primary_bit_len, &mut rng).expect("Key generation failed");

    let mut pk_json = Vec::new();
    let mut sk_json = Vec::new();
    persist::write_public_key(&mut pk_json, primary.public_key()).unwrap();
    persist::write_private_key(&mut sk_json, primary.private_key()).unwrap();

    let records = persist::generate_score_records(primary.public_key(), 6, &mut rng);
    let mut scores_csv = Vec::new();
    persist::write_score_records(&mut scores_csv, &records).unwrap();

    let edges = [(0, 1), (1, 2), (3, 4), (4, 0)]
        .into_iter()
        .map(|(src, dst)| EdgeRecord {
            src,
            dst,
            timestamp: "2025-01-01 12:00:00".to_string(),
            amount: 1000.0,
        })
        .collect::<Vec<_>>();
    let mut edges_csv = Vec::new();
    persist::write_edge_records(&mut edges_csv, &edges).unwrap();

    // Responder side
    let responder = {
        let pk = persist::read_public_key(pk_json.as_slice()).unwrap();
        let records = persist::read_score_records(scores_csv.as_slice()).unwrap();
        let inputs = persist::score_store_from_records(&pk, &records).unwrap();
        let edges = persist::read_edge_records(edges_csv.as_slice()).unwrap();
        let graph = RelationshipGraph::from_edges(edges.iter().map(|edge| (edge.src, edge.dst)));

        Responder::setup(pk, &inputs, &graph).unwrap()
    };

    // Querier side
    let querier = {
        let pk = persist::read_public_key(pk_json.as_slice()).unwrap();
        let sk = persist::read_private_key(sk_json.as_slice(), pk).unwrap();

        Querier::setup(Keypair::from_private_key(sk), responder.num_entries(), TEST_KEY_SIZES).unwrap()
    };

    // Identity 5 has no neighbor.
    assert_eq!(responder.directory(), &[0, 1, 2, 3, 4]);

    let score = |identity: usize| records[identity].score_plain;
    let pid = responder.directory().binary_search(&4).unwrap();
    assert_eq!(masked_pir(&querier, &responder, pid), Ok(BigInt::from(score(3) + score(0))));
    assert_eq!(layered_pir(&querier, &responder, pid), Ok(BigInt::from(score(3) + score(0))));
}

#[test]
fn masked_score_alone_never_reveals_score() {
    const NUM_TRIALS: usize = 1000;
    const PLAIN_SCORE: i64 = 4;

    let mut rng = ChaCha20Rng::from_os_rng();
    let primary = Keypair::generate(128, &mut rng).unwrap();
    let pk = primary.public_key().clone();

    let store = ScoreStore::from_ciphertexts(&pk, vec![pk.encrypt(&BigInt::from(PLAIN_SCORE), &mut rng)]).unwrap();

    for _ in 0..NUM_TRIALS {
        let responder = Responder::from_score_store(pk.clone(), store.clone()).unwrap();
        let masked = primary.private_key().decrypt(&responder.get_all_masked_scores()[0]).unwrap();

        assert_ne!(masked, BigInt::from(PLAIN_SCORE));
    }
}

#[test]
fn query_shorter_than_store_is_rejected_before_evaluation() {
    let (_, responder) = setup_with_scores(&[3, 7, 2, 9]);
    let (short_querier, _) = setup_with_scores(&[3, 7, 2]);

    let query = short_querier.build_masked_query(0).unwrap();
    assert!(matches!(
        responder.evaluate_masked_query(&query),
        Err(PaillierPIRError::DimensionMismatch { expected: 4, found: 3 })
    ));

    let query = short_querier.build_layered_query(0).unwrap();
    assert!(matches!(
        responder.evaluate_layered_query(&query),
        Err(PaillierPIRError::DimensionMismatch { expected: 4, found: 3 })
    ));
}

#[test]
fn response_from_foreign_responder_fails_to_resolve() {
    let (querier, _) = setup_with_scores(&[3, 7, 2]);
    let (other_querier, other_responder) = setup_with_scores(&[1, 1, 1]);

    let query = other_querier.build_masked_query(0).unwrap();
    let response = other_responder.evaluate_masked_query(&query).unwrap();
    let (masked, mask) = response.select(0).unwrap();

    assert_eq!(querier.resolve_masked_response(masked, mask), Err(PaillierPIRError::KeyMismatch));
}

#[test]
fn responder_serves_concurrent_queries() {
    const NUM_QUERIERS: usize = 4;

    let plain_scores = [3i64, 7, 2, 9, 4, 1];
    let mut rng = ChaCha20Rng::from_os_rng();

    let primary = Keypair::generate(TEST_KEY_SIZES.primary_bit_len, &mut rng).unwrap();
    let pk = primary.public_key().clone();

    let cts = plain_scores.iter().map(|&v| pk.encrypt(&BigInt::from(v), &mut rng)).collect();
    let store = ScoreStore::from_ciphertexts(&pk, cts).unwrap();
    let responder = Arc::new(Responder::from_score_store(pk, store).unwrap());

    let queriers = (0..NUM_QUERIERS)
        .map(|_| Querier::setup(primary.clone(), plain_scores.len(), TEST_KEY_SIZES).unwrap())
        .collect::<Vec<_>>();

    thread::scope(|s| {
        for (querier_idx, querier) in queriers.iter().enumerate() {
            let responder = Arc::clone(&responder);

            s.spawn(move || {
                for pid in (querier_idx..plain_scores.len()).step_by(NUM_QUERIERS) {
                    assert_eq!(masked_pir(querier, &responder, pid), Ok(BigInt::from(plain_scores[pid])));
                    assert_eq!(layered_pir(querier, &responder, pid), Ok(BigInt::from(plain_scores[pid])));
                }
            });
        }
    });
}
