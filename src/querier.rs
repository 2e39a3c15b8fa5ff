use crate::pir_internals::{
    branch_opt_util,
    error::PaillierPIRError,
    paillier::{Ciphertext, Keypair, PublicKey},
    params::KeySizes,
    timer::ScopedTimer,
};
use num_bigint_dig::BigInt;
use rand::prelude::*;
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;

/// A selection (one-hot) query vector: ciphertexts of `1` at the queried index and `0` everywhere else,
/// all encrypted under `public_key`.
#[derive(Clone, Debug)]
pub struct Query {
    public_key: PublicKey,
    selection: Vec<Ciphertext>,
}

impl Query {
    /// Public key under which the selection vector is encrypted. Responder uses it to evaluate the query homomorphically.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }
    pub fn selection(&self) -> &[Ciphertext] {
        &self.selection
    }
    pub fn len(&self) -> usize {
        self.selection.len()
    }
    pub fn is_empty(&self) -> bool {
        self.selection.is_empty()
    }
}

/// Represents the querier (key holder) of the homomorphic PIR scheme.
///
/// It holds the primary keypair, whose public half is shared with the responder, and an auxiliary keypair, whose
/// private half never leaves the querier.
#[derive(Clone, Debug)]
pub struct Querier {
    primary: Keypair,
    auxiliary: Keypair,
    num_entries: usize,
}

impl Querier {
    /// Sets up the querier for a responder holding `num_entries` scores, by generating a fresh auxiliary keypair of
    /// `key_sizes.auxiliary_bit_len` bits.
    ///
    /// # Arguments
    ///
    /// * `primary`: The primary keypair, whose public key the responder's scores are encrypted under.
    /// * `num_entries`: Number of entries in the responder's score store, i.e. the length of every query vector.
    /// * `key_sizes`: Bit lengths of Paillier moduli. Auxiliary modulus must be more than twice as long as primary modulus.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Querier`. Returns an error if auxiliary key generation fails, or the keys can't be layered.
    pub fn setup(primary: Keypair, num_entries: usize, key_sizes: KeySizes) -> Result<Querier, PaillierPIRError> {
        if branch_opt_util::unlikely(!key_sizes.supports_layering()) {
            return Err(PaillierPIRError::IncompatibleAuxiliaryKey);
        }

        let mut rng = ChaCha20Rng::from_os_rng();
        let auxiliary = Keypair::generate(key_sizes.auxiliary_bit_len, &mut rng)?;

        Self::new(primary, auxiliary, num_entries)
    }

    /// Creates the querier from already available keypairs.
    ///
    /// Returns an error if `num_entries` is zero, or if auxiliary modulus is not larger than the square of primary modulus,
    /// which layered-key queries rely on.
    pub fn new(primary: Keypair, auxiliary: Keypair, num_entries: usize) -> Result<Querier, PaillierPIRError> {
        if branch_opt_util::unlikely(num_entries == 0) {
            return Err(PaillierPIRError::EmptyScoreStore);
        }
        if branch_opt_util::unlikely(auxiliary.public_key().n() <= primary.public_key().n_squared()) {
            return Err(PaillierPIRError::IncompatibleAuxiliaryKey);
        }

        Ok(Querier {
            primary,
            auxiliary,
            num_entries,
        })
    }

    pub fn primary_public_key(&self) -> &PublicKey {
        self.primary.public_key()
    }
    pub fn auxiliary_public_key(&self) -> &PublicKey {
        self.auxiliary.public_key()
    }
    pub const fn num_entries(&self) -> usize {
        self.num_entries
    }

    /// Builds a masked-response PIR query for index `pid`, encrypted under the primary public key.
    pub fn build_masked_query(&self, pid: usize) -> Result<Query, PaillierPIRError> {
        let _timer = ScopedTimer::start("build_masked_query");
        self.build_selection_query(self.primary.public_key(), pid)
    }

    /// Builds a layered-key PIR query for index `pid`, encrypted under the auxiliary public key.
    pub fn build_layered_query(&self, pid: usize) -> Result<Query, PaillierPIRError> {
        let _timer = ScopedTimer::start("build_layered_query");
        self.build_selection_query(self.auxiliary.public_key(), pid)
    }

    /// Decrypts a ciphertext encrypted under the primary public key.
    pub fn decrypt(&self, ct: &Ciphertext) -> Result<BigInt, PaillierPIRError> {
        self.primary.private_key().decrypt(ct)
    }

    /// Unblinds a masked-response PIR answer, by homomorphically subtracting the mask from the masked score and decrypting the result.
    ///
    /// # Arguments
    ///
    /// * `masked`: Masked score of the queried index, i.e. `score + mask`, under the primary public key.
    /// * `mask`: Responder's answer to the masked PIR query, i.e. `mask`, under the primary public key.
    pub fn resolve_masked_response(&self, masked: &Ciphertext, mask: &Ciphertext) -> Result<BigInt, PaillierPIRError> {
        let public_key = self.primary.public_key();

        // Subtract modulo n and decode once, decoding each operand separately is off by n when they fall on opposite sides of n/2.
        let negated_mask = public_key.scale(mask, &BigInt::from(-1))?;
        let score = public_key.add(masked, &negated_mask)?;

        self.decrypt(&score)
    }

    /// Recovers the score from a layered-key PIR answer.
    ///
    /// Decrypting the response with auxiliary private key yields the raw ciphertext integer of the queried score, which is
    /// reinterpreted as a ciphertext under the primary public key and decrypted once more.
    pub fn resolve_layered_response(&self, response: &Ciphertext) -> Result<BigInt, PaillierPIRError> {
        let raw = self.auxiliary.private_key().decrypt_raw(response)?;
        let inner = self.primary.public_key().ciphertext_from_raw(raw)?;

        self.decrypt(&inner)
    }

    fn build_selection_query(&self, public_key: &PublicKey, pid: usize) -> Result<Query, PaillierPIRError> {
        if branch_opt_util::unlikely(pid >= self.num_entries) {
            return Err(PaillierPIRError::IndexOutOfRange(pid));
        }

        let selection = (0..self.num_entries)
            .into_par_iter()
            .map_init(ChaCha20Rng::from_os_rng, |rng, idx| {
                let bit = BigInt::from((idx == pid) as u32);
                public_key.encrypt(&bit, rng)
            })
            .collect::<Vec<Ciphertext>>();

        Ok(Query {
            public_key: public_key.clone(),
            selection,
        })
    }
}
