use super::{branch_opt_util, error::PaillierPIRError, params, timer::ScopedTimer};
use num_bigint_dig::{BigInt, BigUint, ModInverse, Sign, ToBigUint, prime::probably_prime};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::{CryptoRng, prelude::*};
use std::fmt::Debug;
use turboshake::TurboShake128;

/// Computes a short fingerprint of a Paillier modulus, which is attached to every ciphertext encrypted under it.
fn key_tag(n: &BigUint) -> u64 {
    let mut hasher = TurboShake128::default();
    hasher.absorb(&n.to_bytes_le());
    hasher.finalize::<{ TurboShake128::DEFAULT_DOMAIN_SEPARATOR }>();

    let mut tag = [0u8; params::KEY_TAG_BYTE_LEN];
    hasher.squeeze(&mut tag);

    u64::from_le_bytes(tag)
}

#[inline(always)]
fn to_signed(v: BigUint) -> BigInt {
    BigInt::from_biguint(Sign::Plus, v)
}

/// Samples a random prime of exactly `bit_len` bits, with its two most significant bits set.
fn generate_prime<R: CryptoRng + ?Sized>(bit_len: usize, rng: &mut R) -> BigUint {
    let byte_len = bit_len.div_ceil(8);
    let excess_bits = byte_len * 8 - bit_len;
    let fixed_bits = (BigUint::one() << (bit_len - 1)) | (BigUint::one() << (bit_len - 2)) | BigUint::one();

    let mut bytes = vec![0u8; byte_len];
    loop {
        rng.fill_bytes(&mut bytes);

        let candidate = (BigUint::from_bytes_be(&bytes) >> excess_bits) | fixed_bits.clone();
        if probably_prime(&candidate, params::MILLER_RABIN_ROUNDS) {
            return candidate;
        }
    }
}

/// Paillier ciphertext. It remembers the fingerprint of the public key it was produced under,
/// so that ciphertexts of different keys are never mixed by accident.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ciphertext {
    value: BigUint,
    key_tag: u64,
}

impl Ciphertext {
    /// Raw ciphertext integer, in `[1, n^2)`.
    pub fn value(&self) -> &BigUint {
        &self.value
    }

    pub const fn key_tag(&self) -> u64 {
        self.key_tag
    }
}

/// Paillier public key `(n, g)`, along with cached `n^2` and key fingerprint.
#[derive(Clone, Debug, PartialEq)]
pub struct PublicKey {
    n: BigUint,
    g: BigUint,
    n_squared: BigUint,
    is_g_n_plus_one: bool,
    tag: u64,
}

impl PublicKey {
    /// Reconstructs a public key from its persisted form `{g, n}`.
    ///
    /// Returns an error if `n` is shorter than the minimum supported bit length, is even, or if `g` is not a unit modulo `n^2`.
    pub fn new(n: BigUint, g: BigUint) -> Result<PublicKey, PaillierPIRError> {
        if branch_opt_util::unlikely(n.bits() < params::MIN_KEY_BIT_LEN) {
            return Err(PaillierPIRError::InvalidKeyLength(n.bits()));
        }
        if branch_opt_util::unlikely(n.is_even()) {
            return Err(PaillierPIRError::InvalidKeyMaterial);
        }

        let n_squared = &n * &n;
        if branch_opt_util::unlikely(g.is_zero() || g >= n_squared || !g.gcd(&n_squared).is_one()) {
            return Err(PaillierPIRError::InvalidKeyMaterial);
        }

        let is_g_n_plus_one = g == &n + BigUint::one();
        let tag = key_tag(&n);

        Ok(PublicKey {
            n,
            g,
            n_squared,
            is_g_n_plus_one,
            tag,
        })
    }

    /// Public key with the usual generator choice `g = n + 1`.
    pub fn from_modulus(n: BigUint) -> Result<PublicKey, PaillierPIRError> {
        let g = &n + BigUint::one();
        Self::new(n, g)
    }

    pub fn n(&self) -> &BigUint {
        &self.n
    }
    pub fn g(&self) -> &BigUint {
        &self.g
    }
    pub fn n_squared(&self) -> &BigUint {
        &self.n_squared
    }
    pub const fn tag(&self) -> u64 {
        self.tag
    }
    pub fn bit_len(&self) -> usize {
        self.n.bits()
    }

    /// Encrypts a signed plaintext, which gets encoded modulo `n`. Fresh randomness `r` is sampled on every call,
    /// so encrypting the same plaintext twice yields different ciphertexts.
    pub fn encrypt<R: CryptoRng + ?Sized>(&self, plaintext: &BigInt, rng: &mut R) -> Ciphertext {
        let m = self.reduce(plaintext);
        let r = self.sample_unit(rng);

        let g_m = self.g_pow(&m);
        let r_n = r.modpow(&self.n, &self.n_squared);

        self.wrap((g_m * r_n) % &self.n_squared)
    }

    /// Deterministic encryption of zero, with randomness `r = 1`. It's the identity element of homomorphic addition.
    pub fn neutral(&self) -> Ciphertext {
        self.wrap(BigUint::one())
    }

    /// Homomorphic addition, s.t. `plaintext(c) = plaintext(lhs) + plaintext(rhs) (mod n)`.
    pub fn add(&self, lhs: &Ciphertext, rhs: &Ciphertext) -> Result<Ciphertext, PaillierPIRError> {
        self.check_key(lhs)?;
        self.check_key(rhs)?;

        Ok(self.wrap((&lhs.value * &rhs.value) % &self.n_squared))
    }

    /// Homomorphic addition of a plaintext scalar, s.t. `plaintext(c) = plaintext(ct) + k (mod n)`.
    pub fn add_plain(&self, ct: &Ciphertext, k: &BigInt) -> Result<Ciphertext, PaillierPIRError> {
        self.check_key(ct)?;

        let g_k = self.g_pow(&self.reduce(k));
        Ok(self.wrap((&ct.value * g_k) % &self.n_squared))
    }

    /// Homomorphic scalar multiplication, s.t. `plaintext(c) = plaintext(ct) * k (mod n)`.
    ///
    /// Any integer is accepted as `k`, negative ones are reduced modulo `n`. The scalar may well be another ciphertext's
    /// raw integer, as long as it is smaller than `n`, it is carried over unreduced.
    pub fn scale(&self, ct: &Ciphertext, k: &BigInt) -> Result<Ciphertext, PaillierPIRError> {
        self.check_key(ct)?;

        let k = self.reduce(k);
        Ok(self.wrap(ct.value.modpow(&k, &self.n_squared)))
    }

    /// Reinterprets a raw integer as a ciphertext under this key.
    ///
    /// Fails with `DecryptionFailure` if the integer isn't a unit modulo `n^2`.
    pub fn ciphertext_from_raw(&self, value: BigUint) -> Result<Ciphertext, PaillierPIRError> {
        if branch_opt_util::unlikely(!self.is_well_formed(&value)) {
            return Err(PaillierPIRError::DecryptionFailure);
        }

        Ok(self.wrap(value))
    }

    fn check_key(&self, ct: &Ciphertext) -> Result<(), PaillierPIRError> {
        if branch_opt_util::likely(ct.key_tag == self.tag) {
            Ok(())
        } else {
            Err(PaillierPIRError::KeyMismatch)
        }
    }

    fn is_well_formed(&self, value: &BigUint) -> bool {
        !value.is_zero() && value < &self.n_squared && value.gcd(&self.n).is_one()
    }

    #[inline(always)]
    fn wrap(&self, value: BigUint) -> Ciphertext {
        Ciphertext { value, key_tag: self.tag }
    }

    /// Computes `g^m mod n^2`, which is simply `1 + m * n` when `g = n + 1`.
    fn g_pow(&self, m: &BigUint) -> BigUint {
        if self.is_g_n_plus_one {
            (BigUint::one() + m * &self.n) % &self.n_squared
        } else {
            self.g.modpow(m, &self.n_squared)
        }
    }

    /// Encodes a signed integer as an element of `Z_n`.
    fn reduce(&self, v: &BigInt) -> BigUint {
        let n = to_signed(self.n.clone());
        v.mod_floor(&n).to_biguint().unwrap_or_else(BigUint::zero)
    }

    /// Decodes an element of `Z_n` as the centered representative in `(-n/2, n/2]`.
    fn decode(&self, m: BigUint) -> BigInt {
        let half_n = &self.n >> 1usize;
        if m > half_n { to_signed(m) - to_signed(self.n.clone()) } else { to_signed(m) }
    }

    /// Samples a uniform random unit of `Z_n`.
    fn sample_unit<R: CryptoRng + ?Sized>(&self, rng: &mut R) -> BigUint {
        // Extra bytes make the modular reduction bias negligible.
        let mut bytes = vec![0u8; self.n.bits().div_ceil(8) + 16];

        loop {
            rng.fill_bytes(&mut bytes);

            let r = BigUint::from_bytes_le(&bytes) % &self.n;
            if branch_opt_util::likely(!r.is_zero() && r.gcd(&self.n).is_one()) {
                return r;
            }
        }
    }
}

/// Paillier private key `(p, q)`, along with precomputed `λ = lcm(p - 1, q - 1)` and `μ = L(g^λ mod n^2)^-1 mod n`.
#[derive(Clone)]
pub struct PrivateKey {
    public_key: PublicKey,
    p: BigUint,
    q: BigUint,
    lambda: BigUint,
    mu: BigUint,
}

impl PrivateKey {
    /// Reconstructs a private key from its persisted form `{p, q}` and the paired public key.
    ///
    /// Returns an error if `p * q != n`, or if `g` doesn't admit decryption.
    pub fn from_primes(public_key: PublicKey, p: BigUint, q: BigUint) -> Result<PrivateKey, PaillierPIRError> {
        if branch_opt_util::unlikely(p == q || &p * &q != public_key.n) {
            return Err(PaillierPIRError::InvalidKeyMaterial);
        }

        let lambda = (&p - BigUint::one()).lcm(&(&q - BigUint::one()));

        let u = public_key.g.modpow(&lambda, &public_key.n_squared);
        let l_u = Self::l_function(&u, &public_key.n);

        let mu = l_u
            .mod_inverse(&public_key.n)
            .and_then(|inv| inv.mod_floor(&to_signed(public_key.n.clone())).to_biguint())
            .ok_or(PaillierPIRError::InvalidKeyMaterial)?;

        Ok(PrivateKey {
            public_key,
            p,
            q,
            lambda,
            mu,
        })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }
    pub fn p(&self) -> &BigUint {
        &self.p
    }
    pub fn q(&self) -> &BigUint {
        &self.q
    }

    /// Decrypts a ciphertext into a signed plaintext, in `(-n/2, n/2]`.
    pub fn decrypt(&self, ct: &Ciphertext) -> Result<BigInt, PaillierPIRError> {
        let m = self.decrypt_raw(ct)?;
        Ok(self.public_key.decode(m))
    }

    /// Decrypts a ciphertext into the plaintext residue, in `[0, n)`, without interpreting it as a signed integer.
    pub fn decrypt_raw(&self, ct: &Ciphertext) -> Result<BigUint, PaillierPIRError> {
        let public_key = &self.public_key;

        public_key.check_key(ct)?;
        if branch_opt_util::unlikely(!public_key.is_well_formed(&ct.value)) {
            return Err(PaillierPIRError::DecryptionFailure);
        }

        let u = ct.value.modpow(&self.lambda, &public_key.n_squared);
        Ok((Self::l_function(&u, &public_key.n) * &self.mu) % &public_key.n)
    }

    #[inline(always)]
    fn l_function(u: &BigUint, n: &BigUint) -> BigUint {
        (u - BigUint::one()) / n
    }
}

/// Only the public half is printed.
impl Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey").field("public_key", &self.public_key).finish_non_exhaustive()
    }
}

/// A Paillier keypair. Only the party which generated it should ever hold the private half.
#[derive(Clone, Debug)]
pub struct Keypair {
    private_key: PrivateKey,
}

impl Keypair {
    /// Generates a fresh keypair, s.t. modulus `n` has exactly `bit_len` bits.
    pub fn generate<R: CryptoRng + ?Sized>(bit_len: usize, rng: &mut R) -> Result<Keypair, PaillierPIRError> {
        if branch_opt_util::unlikely(bit_len < params::MIN_KEY_BIT_LEN || bit_len % 2 == 1) {
            return Err(PaillierPIRError::InvalidKeyLength(bit_len));
        }

        let _timer = ScopedTimer::start("generate_keypair");

        let prime_bit_len = bit_len / 2;
        let p = generate_prime(prime_bit_len, rng);
        let q = loop {
            let q = generate_prime(prime_bit_len, rng);
            if branch_opt_util::likely(q != p) {
                break q;
            }
        };

        let public_key = PublicKey::from_modulus(&p * &q)?;
        let private_key = PrivateKey::from_primes(public_key, p, q)?;

        tracing::info!(bit_len, key_tag = private_key.public_key.tag, "generated Paillier keypair");
        Ok(Keypair { private_key })
    }

    pub fn from_private_key(private_key: PrivateKey) -> Keypair {
        Keypair { private_key }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.private_key.public_key
    }
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }
}

#[cfg(test)]
mod test {
    use super::{Keypair, PublicKey};
    use crate::pir_internals::error::PaillierPIRError;
    use num_bigint_dig::{BigInt, BigUint, Sign};
    use num_traits::One;
    use rand::prelude::*;
    use rand_chacha::ChaCha20Rng;
    use test_case::test_case;

    const TEST_KEY_BIT_LEN: usize = 128;

    fn keypair(rng: &mut ChaCha20Rng) -> Keypair {
        Keypair::generate(TEST_KEY_BIT_LEN, rng).expect("Key generation must succeed")
    }

    #[test_case(64 => matches Ok(_); "Minimum bit length is accepted")]
    #[test_case(256 => matches Ok(_); "Regular bit length is accepted")]
    #[test_case(32 => matches Err(PaillierPIRError::InvalidKeyLength(32)); "Too short modulus is rejected")]
    #[test_case(129 => matches Err(PaillierPIRError::InvalidKeyLength(129)); "Odd bit length is rejected")]
    fn keypair_generation_api(bit_len: usize) -> Result<Keypair, PaillierPIRError> {
        let mut rng = ChaCha20Rng::from_os_rng();
        Keypair::generate(bit_len, &mut rng)
    }

    #[test]
    fn generated_modulus_has_requested_bit_length() {
        let mut rng = ChaCha20Rng::from_os_rng();

        for bit_len in [64, 128, 192, 256] {
            let kp = Keypair::generate(bit_len, &mut rng).unwrap();
            assert_eq!(kp.public_key().bit_len(), bit_len);
        }
    }

    #[test]
    fn encrypt_then_decrypt_signed_plaintexts() {
        let mut rng = ChaCha20Rng::from_os_rng();
        let kp = keypair(&mut rng);

        for _ in 0..64 {
            let m = BigInt::from(rng.random::<i64>());
            let ct = kp.public_key().encrypt(&m, &mut rng);
            assert_eq!(kp.private_key().decrypt(&ct).unwrap(), m);
        }
    }

    #[test]
    fn encryption_is_randomized() {
        let mut rng = ChaCha20Rng::from_os_rng();
        let kp = keypair(&mut rng);

        let m = BigInt::from(1);
        let ct0 = kp.public_key().encrypt(&m, &mut rng);
        let ct1 = kp.public_key().encrypt(&m, &mut rng);

        assert_ne!(ct0, ct1);
        assert_eq!(kp.private_key().decrypt(&ct0).unwrap(), kp.private_key().decrypt(&ct1).unwrap());
    }

    #[test]
    fn homomorphic_addition_law() {
        let mut rng = ChaCha20Rng::from_os_rng();
        let kp = keypair(&mut rng);
        let pk = kp.public_key();

        for _ in 0..64 {
            let a = rng.random_range(-(1i64 << 40)..(1i64 << 40));
            let b = rng.random_range(-(1i64 << 40)..(1i64 << 40));

            let ct_a = pk.encrypt(&BigInt::from(a), &mut rng);
            let ct_b = pk.encrypt(&BigInt::from(b), &mut rng);

            let sum = pk.add(&ct_a, &ct_b).unwrap();
            assert_eq!(kp.private_key().decrypt(&sum).unwrap(), BigInt::from(a + b));

            let plain_sum = pk.add_plain(&ct_a, &BigInt::from(b)).unwrap();
            assert_eq!(kp.private_key().decrypt(&plain_sum).unwrap(), BigInt::from(a + b));
        }
    }

    #[test]
    fn homomorphic_scalar_law() {
        let mut rng = ChaCha20Rng::from_os_rng();
        let kp = keypair(&mut rng);
        let pk = kp.public_key();
        let n = BigInt::from_biguint(Sign::Plus, pk.n().clone());

        for _ in 0..64 {
            let a = BigInt::from(rng.random::<i64>());
            let k = BigInt::from(rng.random::<i64>());

            let ct = pk.encrypt(&a, &mut rng);
            let scaled = pk.scale(&ct, &k).unwrap();

            let expected = num_integer::Integer::mod_floor(&(&a * &k), &n);
            let decrypted = kp.private_key().decrypt_raw(&scaled).unwrap();
            assert_eq!(BigInt::from_biguint(Sign::Plus, decrypted), expected);
        }
    }

    #[test]
    fn neutral_element_decrypts_to_zero() {
        let mut rng = ChaCha20Rng::from_os_rng();
        let kp = keypair(&mut rng);
        let pk = kp.public_key();

        assert_eq!(kp.private_key().decrypt(&pk.neutral()).unwrap(), BigInt::from(0));

        let ct = pk.encrypt(&BigInt::from(42), &mut rng);
        let sum = pk.add(&ct, &pk.neutral()).unwrap();
        assert_eq!(kp.private_key().decrypt(&sum).unwrap(), BigInt::from(42));
    }

    #[test]
    fn scaling_encryption_of_zero_gives_zero() {
        let mut rng = ChaCha20Rng::from_os_rng();
        let kp = keypair(&mut rng);
        let pk = kp.public_key();

        let zero = pk.encrypt(&BigInt::from(0), &mut rng);
        let k = BigInt::from_biguint(Sign::Plus, pk.n() - BigUint::one());

        let scaled = pk.scale(&zero, &k).unwrap();
        assert_eq!(kp.private_key().decrypt(&scaled).unwrap(), BigInt::from(0));
    }

    #[test]
    fn scaling_by_ciphertext_integer_of_shorter_key_is_exact() {
        let mut rng = ChaCha20Rng::from_os_rng();

        let inner = keypair(&mut rng);
        let outer = Keypair::generate(2 * TEST_KEY_BIT_LEN + 16, &mut rng).unwrap();

        let inner_ct = inner.public_key().encrypt(&BigInt::from(7), &mut rng);
        let selector = outer.public_key().encrypt(&BigInt::from(1), &mut rng);

        let k = BigInt::from_biguint(Sign::Plus, inner_ct.value().clone());
        let scaled = outer.public_key().scale(&selector, &k).unwrap();

        let raw = outer.private_key().decrypt_raw(&scaled).unwrap();
        assert_eq!(&raw, inner_ct.value());

        let recovered = inner.public_key().ciphertext_from_raw(raw).unwrap();
        assert_eq!(inner.private_key().decrypt(&recovered).unwrap(), BigInt::from(7));
    }

    #[test]
    fn mixing_keys_is_rejected() {
        let mut rng = ChaCha20Rng::from_os_rng();
        let kp0 = keypair(&mut rng);
        let kp1 = keypair(&mut rng);

        let ct0 = kp0.public_key().encrypt(&BigInt::from(1), &mut rng);
        let ct1 = kp1.public_key().encrypt(&BigInt::from(1), &mut rng);

        assert_eq!(kp0.public_key().add(&ct0, &ct1), Err(PaillierPIRError::KeyMismatch));
        assert_eq!(kp0.public_key().scale(&ct1, &BigInt::from(2)), Err(PaillierPIRError::KeyMismatch));
        assert_eq!(kp0.public_key().add_plain(&ct1, &BigInt::from(2)), Err(PaillierPIRError::KeyMismatch));
        assert_eq!(kp0.private_key().decrypt(&ct1), Err(PaillierPIRError::KeyMismatch));
    }

    #[test]
    fn debug_output_hides_secret_key_material() {
        let mut rng = ChaCha20Rng::from_os_rng();
        let kp = keypair(&mut rng);

        for printed in [format!("{:?}", kp.private_key()), format!("{:?}", kp)] {
            assert!(printed.contains("public_key"));
            assert!(!printed.contains("lambda"));
            assert!(!printed.contains("mu:"));
            assert!(!printed.contains(" p:"));
            assert!(!printed.contains(" q:"));
        }
    }

    #[test]
    fn malformed_ciphertext_integers_fail_to_decrypt() {
        let mut rng = ChaCha20Rng::from_os_rng();
        let kp = keypair(&mut rng);
        let pk = kp.public_key();

        assert_eq!(pk.ciphertext_from_raw(BigUint::from(0u32)), Err(PaillierPIRError::DecryptionFailure));
        assert_eq!(pk.ciphertext_from_raw(pk.n_squared().clone()), Err(PaillierPIRError::DecryptionFailure));
        assert_eq!(pk.ciphertext_from_raw(kp.private_key().p().clone()), Err(PaillierPIRError::DecryptionFailure));
    }

    #[test]
    fn keys_can_be_reconstructed_from_persisted_parts() {
        let mut rng = ChaCha20Rng::from_os_rng();
        let kp = keypair(&mut rng);

        let pk = PublicKey::new(kp.public_key().n().clone(), kp.public_key().g().clone()).unwrap();
        assert_eq!(&pk, kp.public_key());

        let sk = super::PrivateKey::from_primes(pk.clone(), kp.private_key().p().clone(), kp.private_key().q().clone()).unwrap();
        let ct = kp.public_key().encrypt(&BigInt::from(-5), &mut rng);
        assert_eq!(sk.decrypt(&ct).unwrap(), BigInt::from(-5));

        let bad_q = kp.private_key().q() + BigUint::from(2u32);
        assert!(matches!(
            super::PrivateKey::from_primes(pk, kp.private_key().p().clone(), bad_q),
            Err(PaillierPIRError::InvalidKeyMaterial)
        ));
    }

    #[test]
    fn non_standard_generator_is_supported() {
        let mut rng = ChaCha20Rng::from_os_rng();
        let kp = keypair(&mut rng);

        let n = kp.public_key().n().clone();
        let g = (BigUint::one() + BigUint::from(2u32) * &n) % (&n * &n);

        let pk = PublicKey::new(n, g).unwrap();
        let sk = super::PrivateKey::from_primes(pk.clone(), kp.private_key().p().clone(), kp.private_key().q().clone()).unwrap();

        let ct_a = pk.encrypt(&BigInt::from(11), &mut rng);
        let ct_b = pk.add_plain(&ct_a, &BigInt::from(-4)).unwrap();
        assert_eq!(sk.decrypt(&ct_b).unwrap(), BigInt::from(7));
    }
}
