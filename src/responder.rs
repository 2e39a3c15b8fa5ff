use crate::{
    pir_internals::{
        branch_opt_util,
        environment::{RelationshipGraph, build_environment_scores},
        error::PaillierPIRError,
        paillier::{Ciphertext, PublicKey},
        params,
        score_store::{IdentityId, ScoreStore},
        timer::{ScopedTimer, timed},
    },
    querier::Query,
};
use num_bigint_dig::{BigInt, Sign};
use rand::prelude::*;
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use std::fmt::Debug;

/// Responder's answer to a masked-response PIR query.
///
/// It carries the privately selected mask along with the table of masked scores, out of which the querier picks
/// the entry it is interested in, locally.
#[derive(Clone, Debug)]
pub struct MaskedResponse<'a> {
    masked_scores: &'a [Ciphertext],
    mask: Ciphertext,
}

impl<'a> MaskedResponse<'a> {
    /// Mask of the queried index, under the primary public key.
    pub fn mask(&self) -> &Ciphertext {
        &self.mask
    }

    /// Returns the pair `(masked score, mask)` for index `pid`, which the querier unblinds.
    pub fn select(&self, pid: usize) -> Result<(&'a Ciphertext, &Ciphertext), PaillierPIRError> {
        let masked = self.masked_scores.get(pid).ok_or(PaillierPIRError::IndexOutOfRange(pid))?;
        Ok((masked, &self.mask))
    }
}

/// Represents the responder of the homomorphic PIR scheme, holding encrypted environment scores and only the primary public key.
///
/// Score store, blinding masks and masked scores are all computed once, during setup, and are read-only afterwards.
/// So a single responder can serve concurrent queries, without any locking.
#[derive(Clone)]
pub struct Responder {
    public_key: PublicKey,
    scores: ScoreStore,
    masks: Vec<BigInt>,
    masked_scores: Vec<Ciphertext>,
}

/// Blinding masks never leave the responder, so they are not printed.
impl Debug for Responder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("public_key", &self.public_key)
            .field("scores", &self.scores)
            .field("masked_scores", &self.masked_scores)
            .finish_non_exhaustive()
    }
}

impl Responder {
    /// Sets up the responder from encrypted per-identity inputs and the relationship graph.
    ///
    /// Environment score of each identity, the homomorphic sum of its one-hop neighbors' inputs, becomes one entry of the score store.
    /// Identities without any neighbor are left out.
    ///
    /// # Arguments
    ///
    /// * `public_key`: Primary public key, under which all inputs are encrypted.
    /// * `inputs`: Encrypted per-identity inputs.
    /// * `graph`: Relationship graph over identities of `inputs`.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Responder`. Returns an error if the graph references unknown identities, or no identity has any neighbor.
    pub fn setup(public_key: PublicKey, inputs: &ScoreStore, graph: &RelationshipGraph) -> Result<Responder, PaillierPIRError> {
        let scores = build_environment_scores(&public_key, inputs, graph)?;
        Self::from_score_store(public_key, scores)
    }

    /// Sets up the responder from an already computed score store.
    ///
    /// Blinding masks are drawn uniformly from `[-MASK_BOUND, MASK_BOUND]`, one per entry, and masked scores are computed eagerly.
    pub fn from_score_store(public_key: PublicKey, scores: ScoreStore) -> Result<Responder, PaillierPIRError> {
        if branch_opt_util::unlikely(scores.key_tag() != public_key.tag()) {
            return Err(PaillierPIRError::KeyMismatch);
        }

        let masks = timed("generate_masks", || {
            let mut rng = ChaCha20Rng::from_os_rng();
            (0..scores.len())
                .map(|_| BigInt::from(rng.random_range(-params::MASK_BOUND..=params::MASK_BOUND)))
                .collect::<Vec<BigInt>>()
        });

        let masked_scores = timed("mask_scores", || {
            scores
                .scores()
                .par_iter()
                .zip(masks.par_iter())
                .map(|(ct, mask)| public_key.add_plain(ct, mask))
                .collect::<Result<Vec<Ciphertext>, PaillierPIRError>>()
        })?;

        tracing::info!(num_entries = scores.len(), key_tag = public_key.tag(), "responder is ready to answer queries");

        Ok(Responder {
            public_key,
            scores,
            masks,
            masked_scores,
        })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }
    pub fn num_entries(&self) -> usize {
        self.scores.len()
    }
    pub fn score_store(&self) -> &ScoreStore {
        &self.scores
    }

    /// Identity behind each PIR index. It's public, querier uses it to find the index of an identity.
    pub fn directory(&self) -> &[IdentityId] {
        self.scores.identities()
    }

    /// Non-private lookup of the environment score at index `index`.
    pub fn environment_score(&self, index: usize) -> Result<&Ciphertext, PaillierPIRError> {
        self.scores.get(index)
    }

    /// Bulk export of all masked scores, i.e. `score[i] + mask[i]` under the primary public key. Each of them is blinded
    /// by a mask, which never leaves the responder, so that the table can be handed out in full.
    pub fn get_all_masked_scores(&self) -> &[Ciphertext] {
        &self.masked_scores
    }

    /// Responds to a masked-response PIR query, by computing the homomorphic dot-product of the selection vector and the mask vector.
    ///
    /// # Arguments
    ///
    /// * `query`: Selection vector, encrypted under the primary public key.
    ///
    /// # Returns
    ///
    /// A `Result` containing the masked response. Returns an error if the query length doesn't match the number of entries, or if
    /// the query is not encrypted under the primary public key.
    pub fn evaluate_masked_query(&self, query: &Query) -> Result<MaskedResponse<'_>, PaillierPIRError> {
        self.check_dimension(query)?;
        if branch_opt_util::unlikely(query.public_key().tag() != self.public_key.tag()) {
            tracing::warn!("rejected masked query, which is not encrypted under primary public key");
            return Err(PaillierPIRError::KeyMismatch);
        }

        let _timer = ScopedTimer::start("evaluate_masked_query");

        let public_key = &self.public_key;
        let mask = query
            .selection()
            .par_iter()
            .zip(self.masks.par_iter())
            .map(|(selector, mask)| public_key.scale(selector, mask))
            .try_reduce(|| public_key.neutral(), |acc, term| public_key.add(&acc, &term))?;

        Ok(MaskedResponse {
            masked_scores: &self.masked_scores,
            mask,
        })
    }

    /// Responds to a layered-key PIR query, by scaling each auxiliary-keyed selector with the raw ciphertext integer of
    /// the corresponding score and summing up the results.
    ///
    /// The response stays encrypted under the auxiliary public key. It decrypts to the raw ciphertext integer of the queried score.
    ///
    /// # Arguments
    ///
    /// * `query`: Selection vector, encrypted under the querier's auxiliary public key.
    ///
    /// # Returns
    ///
    /// A `Result` containing the response ciphertext. Returns an error if the query length doesn't match the number of entries, or
    /// if the auxiliary modulus is not larger than the square of primary modulus.
    pub fn evaluate_layered_query(&self, query: &Query) -> Result<Ciphertext, PaillierPIRError> {
        self.check_dimension(query)?;

        let aux_key = query.public_key();
        if branch_opt_util::unlikely(aux_key.n() <= self.public_key.n_squared()) {
            tracing::warn!(aux_key_bit_len = aux_key.bit_len(), "rejected layered query, auxiliary modulus is too short");
            return Err(PaillierPIRError::IncompatibleAuxiliaryKey);
        }

        let _timer = ScopedTimer::start("evaluate_layered_query");

        query
            .selection()
            .par_iter()
            .zip(self.scores.scores().par_iter())
            .map(|(selector, score)| {
                let raw_score = BigInt::from_biguint(Sign::Plus, score.value().clone());
                aux_key.scale(selector, &raw_score)
            })
            .try_reduce(|| aux_key.neutral(), |acc, term| aux_key.add(&acc, &term))
    }

    fn check_dimension(&self, query: &Query) -> Result<(), PaillierPIRError> {
        if branch_opt_util::likely(query.len() == self.scores.len()) {
            Ok(())
        } else {
            tracing::warn!(expected = self.scores.len(), found = query.len(), "rejected query of unexpected length");
            Err(PaillierPIRError::DimensionMismatch {
                expected: self.scores.len(),
                found: query.len(),
            })
        }
    }
}
