use super::{
    error::PaillierPIRError,
    paillier::{Ciphertext, PublicKey},
    score_store::{IdentityId, ScoreStore},
    timer::ScopedTimer,
};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};

/// Undirected relationship graph over identities, kept as adjacency sets.
#[derive(Clone, Debug, Default)]
pub struct RelationshipGraph {
    adjacency: HashMap<IdentityId, BTreeSet<IdentityId>>,
}

impl RelationshipGraph {
    /// Builds the graph from `(src, dst)` edges. Direction, duplicates and self-loops don't contribute to one-hop neighborhoods.
    pub fn from_edges<I>(edges: I) -> RelationshipGraph
    where
        I: IntoIterator<Item = (IdentityId, IdentityId)>,
    {
        let mut adjacency: HashMap<IdentityId, BTreeSet<IdentityId>> = HashMap::new();

        for (src, dst) in edges {
            if src == dst {
                continue;
            }

            adjacency.entry(src).or_default().insert(dst);
            adjacency.entry(dst).or_default().insert(src);
        }

        RelationshipGraph { adjacency }
    }

    /// Identities connected to `identity` by exactly one edge, excluding itself.
    pub fn neighbors(&self, identity: IdentityId) -> impl Iterator<Item = IdentityId> + '_ {
        self.adjacency.get(&identity).into_iter().flat_map(|neighbors| neighbors.iter().copied())
    }

    pub fn num_identities(&self) -> usize {
        self.adjacency.len()
    }

    pub fn identities(&self) -> impl Iterator<Item = IdentityId> + '_ {
        self.adjacency.keys().copied()
    }
}

/// Computes the environment score of every identity in `inputs`: the homomorphic sum of its one-hop neighbors' ciphertexts.
///
/// Identities without any neighbor get no environment score and are left out of the resulting store.
/// Every identity referenced by `graph` must have a ciphertext in `inputs`, otherwise `UnknownIdentity` is returned.
pub fn build_environment_scores(public_key: &PublicKey, inputs: &ScoreStore, graph: &RelationshipGraph) -> Result<ScoreStore, PaillierPIRError> {
    if let Some(identity) = graph.identities().find(|&identity| inputs.position_of(identity).is_none()) {
        return Err(PaillierPIRError::UnknownIdentity(identity));
    }

    let _timer = ScopedTimer::start("build_environment_scores");

    let entries = inputs
        .identities()
        .par_iter()
        .filter_map(|&identity| {
            let mut neighbor_scores = graph.neighbors(identity).filter_map(|neighbor| inputs.get_by_identity(neighbor));
            let first = neighbor_scores.next()?;

            let env_score = neighbor_scores.try_fold(first.clone(), |acc, ct| public_key.add(&acc, ct));
            Some(env_score.map(|env_score| (identity, env_score)))
        })
        .collect::<Result<Vec<(IdentityId, Ciphertext)>, PaillierPIRError>>()?;

    tracing::info!(
        num_identities = inputs.len(),
        num_environment_scores = entries.len(),
        "aggregated environment scores"
    );

    ScoreStore::from_entries(public_key, entries)
}

#[cfg(test)]
mod test {
    use super::{RelationshipGraph, build_environment_scores};
    use crate::pir_internals::{error::PaillierPIRError, paillier::Keypair, score_store::ScoreStore};
    use num_bigint_dig::BigInt;
    use rand::prelude::*;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn neighbors_are_undirected_and_deduplicated() {
        let graph = RelationshipGraph::from_edges([(0, 1), (1, 0), (2, 1), (3, 3), (1, 2)]);

        assert_eq!(graph.neighbors(1).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(graph.neighbors(0).collect::<Vec<_>>(), vec![1]);
        assert_eq!(graph.neighbors(3).count(), 0);
        assert_eq!(graph.neighbors(42).count(), 0);
        assert_eq!(graph.num_identities(), 3);
    }

    #[test]
    fn environment_score_is_sum_of_neighbor_scores() {
        let mut rng = ChaCha20Rng::from_os_rng();
        let kp = Keypair::generate(128, &mut rng).unwrap();
        let pk = kp.public_key();

        let plain = [3i64, 7, 2, 5, 4];
        let inputs = ScoreStore::from_ciphertexts(pk, plain.iter().map(|&v| pk.encrypt(&BigInt::from(v), &mut rng)).collect()).unwrap();

        // Identity 4 is isolated.
        let graph = RelationshipGraph::from_edges([(0, 1), (0, 2), (1, 2), (3, 0), (2, 2)]);
        let env = build_environment_scores(pk, &inputs, &graph).unwrap();

        assert_eq!(env.identities(), &[0, 1, 2, 3]);

        let expected = [(0, 7 + 2 + 5), (1, 3 + 2), (2, 3 + 7), (3, 3)];
        for (identity, score) in expected {
            let ct = env.get_by_identity(identity).unwrap();
            assert_eq!(kp.private_key().decrypt(ct).unwrap(), BigInt::from(score));
        }
        assert!(env.get_by_identity(4).is_none());
    }

    #[test]
    fn edges_to_unknown_identities_are_rejected() {
        let mut rng = ChaCha20Rng::from_os_rng();
        let kp = Keypair::generate(128, &mut rng).unwrap();
        let pk = kp.public_key();

        let inputs = ScoreStore::from_ciphertexts(pk, vec![pk.encrypt(&BigInt::from(1), &mut rng)]).unwrap();
        let graph = RelationshipGraph::from_edges([(0, 9)]);

        assert!(matches!(build_environment_scores(pk, &inputs, &graph), Err(PaillierPIRError::UnknownIdentity(9))));
    }

    #[test]
    fn graph_without_edges_yields_no_store() {
        let mut rng = ChaCha20Rng::from_os_rng();
        let kp = Keypair::generate(128, &mut rng).unwrap();
        let pk = kp.public_key();

        let inputs = ScoreStore::from_ciphertexts(pk, vec![pk.encrypt(&BigInt::from(1), &mut rng)]).unwrap();
        let graph = RelationshipGraph::from_edges(std::iter::empty());

        assert!(matches!(build_environment_scores(pk, &inputs, &graph), Err(PaillierPIRError::EmptyScoreStore)));
    }
}
