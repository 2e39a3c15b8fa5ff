use super::{
    branch_opt_util,
    error::PaillierPIRError,
    paillier::{Ciphertext, PublicKey},
};

/// Identities are addressed by small integers.
pub type IdentityId = u32;

/// Immutable, index-addressed vector of ciphertexts, one per identity, all encrypted under the same public key.
///
/// Entries are kept sorted by identity. Position of an entry in this vector is its PIR index, while
/// [`ScoreStore::identities`] acts as the public directory mapping PIR indices back to identities.
#[derive(Clone, Debug)]
pub struct ScoreStore {
    key_tag: u64,
    identities: Vec<IdentityId>,
    scores: Vec<Ciphertext>,
}

impl ScoreStore {
    /// Builds a score store from `(identity, ciphertext)` entries, given in any order.
    ///
    /// Returns an error if there are no entries, if some identity repeats or if some ciphertext is not encrypted under `public_key`.
    pub fn from_entries(public_key: &PublicKey, mut entries: Vec<(IdentityId, Ciphertext)>) -> Result<ScoreStore, PaillierPIRError> {
        if branch_opt_util::unlikely(entries.is_empty()) {
            return Err(PaillierPIRError::EmptyScoreStore);
        }

        entries.sort_unstable_by_key(|(identity, _)| *identity);

        if let Some(pair) = entries.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(PaillierPIRError::DuplicateIdentity(pair[0].0));
        }
        if branch_opt_util::unlikely(entries.iter().any(|(_, ct)| ct.key_tag() != public_key.tag())) {
            return Err(PaillierPIRError::KeyMismatch);
        }

        let (identities, scores) = entries.into_iter().unzip();
        Ok(ScoreStore {
            key_tag: public_key.tag(),
            identities,
            scores,
        })
    }

    /// Builds a score store from ciphertexts, whose identity is their position in the given vector.
    pub fn from_ciphertexts(public_key: &PublicKey, scores: Vec<Ciphertext>) -> Result<ScoreStore, PaillierPIRError> {
        let entries = scores.into_iter().enumerate().map(|(idx, ct)| (idx as IdentityId, ct)).collect();
        Self::from_entries(public_key, entries)
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.scores.len()
    }
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
    #[inline(always)]
    pub const fn key_tag(&self) -> u64 {
        self.key_tag
    }

    pub fn identities(&self) -> &[IdentityId] {
        &self.identities
    }
    pub fn scores(&self) -> &[Ciphertext] {
        &self.scores
    }

    /// Ciphertext at PIR index `index`.
    pub fn get(&self, index: usize) -> Result<&Ciphertext, PaillierPIRError> {
        self.scores.get(index).ok_or(PaillierPIRError::IndexOutOfRange(index))
    }

    /// Ciphertext of `identity`, if it is present in the store.
    pub fn get_by_identity(&self, identity: IdentityId) -> Option<&Ciphertext> {
        self.position_of(identity).map(|idx| &self.scores[idx])
    }

    /// PIR index of `identity`, if it is present in the store.
    pub fn position_of(&self, identity: IdentityId) -> Option<usize> {
        self.identities.binary_search(&identity).ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = (IdentityId, &Ciphertext)> {
        self.identities.iter().copied().zip(self.scores.iter())
    }
}

#[cfg(test)]
mod test {
    use super::ScoreStore;
    use crate::pir_internals::{error::PaillierPIRError, paillier::Keypair};
    use num_bigint_dig::BigInt;
    use rand::prelude::*;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn entries_are_sorted_by_identity() {
        let mut rng = ChaCha20Rng::from_os_rng();
        let kp = Keypair::generate(128, &mut rng).unwrap();
        let pk = kp.public_key();

        let entries = [(9, 90), (2, 20), (5, 50)]
            .into_iter()
            .map(|(id, v)| (id, pk.encrypt(&BigInt::from(v), &mut rng)))
            .collect::<Vec<_>>();
        let store = ScoreStore::from_entries(pk, entries).unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.identities(), &[2, 5, 9]);
        assert_eq!(store.position_of(5), Some(1));
        assert_eq!(store.position_of(3), None);

        let ct = store.get_by_identity(9).unwrap();
        assert_eq!(kp.private_key().decrypt(ct).unwrap(), BigInt::from(90));
        assert_eq!(store.get(3), Err(PaillierPIRError::IndexOutOfRange(3)));

        let decrypted = store
            .iter()
            .map(|(identity, ct)| (identity, kp.private_key().decrypt(ct).unwrap()))
            .collect::<Vec<_>>();
        assert_eq!(decrypted, vec![(2, BigInt::from(20)), (5, BigInt::from(50)), (9, BigInt::from(90))]);
    }

    #[test]
    fn invalid_entries_are_rejected() {
        let mut rng = ChaCha20Rng::from_os_rng();
        let kp0 = Keypair::generate(128, &mut rng).unwrap();
        let kp1 = Keypair::generate(128, &mut rng).unwrap();
        let pk = kp0.public_key();

        assert!(matches!(ScoreStore::from_entries(pk, vec![]), Err(PaillierPIRError::EmptyScoreStore)));

        let duplicated = vec![(4, pk.encrypt(&BigInt::from(1), &mut rng)), (4, pk.encrypt(&BigInt::from(2), &mut rng))];
        assert!(matches!(ScoreStore::from_entries(pk, duplicated), Err(PaillierPIRError::DuplicateIdentity(4))));

        let foreign = vec![(0, kp1.public_key().encrypt(&BigInt::from(1), &mut rng))];
        assert!(matches!(ScoreStore::from_entries(pk, foreign), Err(PaillierPIRError::KeyMismatch)));
    }
}
