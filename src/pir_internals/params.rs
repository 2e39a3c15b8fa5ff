/// Bit length of the primary Paillier modulus, shared by querier and responder.
pub const PRIMARY_KEY_BIT_LEN: usize = 2048;
/// Bit length of the auxiliary Paillier modulus, held by querier. Must exceed `2 * PRIMARY_KEY_BIT_LEN`.
pub const AUXILIARY_KEY_BIT_LEN: usize = 4112;
pub const MIN_KEY_BIT_LEN: usize = 64;

pub const MILLER_RABIN_ROUNDS: usize = 20;
pub const KEY_TAG_BYTE_LEN: usize = 8;

pub const MIN_PLAIN_SCORE: i64 = 1;
pub const MAX_PLAIN_SCORE: i64 = 5;

/// Blinding masks are sampled uniformly from `[-MASK_BOUND, MASK_BOUND]`.
pub const MASK_BOUND: i64 = i64::MAX;

/// Bit lengths of the two Paillier moduli used by the PIR protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeySizes {
    pub primary_bit_len: usize,
    pub auxiliary_bit_len: usize,
}

impl KeySizes {
    pub const fn new(primary_bit_len: usize, auxiliary_bit_len: usize) -> KeySizes {
        KeySizes {
            primary_bit_len,
            auxiliary_bit_len,
        }
    }

    /// Layered-key queries are exact only when every primary ciphertext integer (< n^2) is smaller than the auxiliary modulus.
    pub const fn supports_layering(&self) -> bool {
        self.auxiliary_bit_len > 2 * self.primary_bit_len
    }
}

impl Default for KeySizes {
    fn default() -> Self {
        KeySizes::new(PRIMARY_KEY_BIT_LEN, AUXILIARY_KEY_BIT_LEN)
    }
}
