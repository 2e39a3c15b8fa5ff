//! PaillierPIR: A Rust library implementation of single-server **P**rivate **I**nformation **R**etrieval (PIR) of aggregate scores,
//! built on top of the additively homomorphic Paillier cryptosystem.
//!
//! A querier (key holder) retrieves one aggregate score from an indexed vector of encrypted scores, held by a responder, s.t.
//! the responder learns nothing about the requested index and the querier learns no score other than the requested one.
//!
//! ## Features
//!
//! * **Masked-Response PIR:** Querier sends a one-hot selection vector under the primary key, responder answers with the privately
//!   selected blinding mask, which the querier subtracts from the matching entry of the publicly exported masked-score table.
//! * **Layered-Key PIR:** Querier sends a one-hot selection vector under its own auxiliary key, responder scales each selector by the raw
//!   ciphertext integer of the matching score. Two sequential decryptions, first with the auxiliary key and then with the primary key, reveal the score.
//! * **Environment Scores:** Responder aggregates, for each identity, the encrypted scores of its one-hop neighbors in a relationship graph.
//! * **Parallelism:** Query encryption and per-position homomorphic operations are evaluated in parallel, with `rayon`.
//! * **Error Handling:** Every fallible operation returns a `Result`, with `PaillierPIRError` describing what went wrong.
//!
//! ## Usage
//!
//! This crate is designed to be used in conjunction with other crates which provide communication mechanism between querier and responder.
//! You'll typically interact with the `Querier` and `Responder` structs to build/ evaluate queries and resolve responses.
//!
//! ```rust
//! use num_bigint_dig::BigInt;
//! use paillier_pir::{KeySizes, Keypair, Querier, RelationshipGraph, Responder, ScoreStore};
//! use rand::prelude::*;
//! use rand_chacha::ChaCha20Rng;
//!
//! fn main() {
//!     // Use `KeySizes::default()` for production-grade moduli.
//!     let key_sizes = KeySizes::new(256, 528);
//!
//!     let mut rng = ChaCha20Rng::from_os_rng();
//!     let primary = Keypair::generate(key_sizes.primary_bit_len, &mut rng).expect("Key generation failed");
//!     let pk = primary.public_key().clone();
//!
//!     // Encrypted per-identity scores, along with a relationship graph between identities.
//!     let cts = [3, 7, 2, 5].iter().map(|&v| pk.encrypt(&BigInt::from(v), &mut rng)).collect();
//!     let inputs = ScoreStore::from_ciphertexts(&pk, cts).expect("Score store construction failed");
//!     let graph = RelationshipGraph::from_edges([(0, 1), (1, 2), (2, 3)]);
//!
//!     // Responder holds only the primary public key.
//!     let responder = Responder::setup(pk, &inputs, &graph).expect("Responder setup failed");
//!     let querier = Querier::setup(primary, responder.num_entries(), key_sizes).expect("Querier setup failed");
//!
//!     // Neighbors of identity 1 are identities 0 and 2, so its environment score is 3 + 2.
//!     let pid = responder.directory().binary_search(&1).expect("Identity 1 has an environment score");
//!
//!     // Masked-response PIR
//!     let query = querier.build_masked_query(pid).expect("Failed to build query");
//!     let response = responder.evaluate_masked_query(&query).expect("Responder failed to respond");
//!     let (masked, mask) = response.select(pid).expect("Failed to select masked score");
//!     assert_eq!(querier.resolve_masked_response(masked, mask).expect("Failed to unblind"), BigInt::from(5));
//!
//!     // Layered-key PIR
//!     let query = querier.build_layered_query(pid).expect("Failed to build query");
//!     let response = responder.evaluate_layered_query(&query).expect("Responder failed to respond");
//!     assert_eq!(querier.resolve_layered_response(&response).expect("Failed to decrypt"), BigInt::from(5));
//! }
//! ```
//!
//! ## Modules
//!
//! * `querier`: Contains the `Querier` struct, holding both keypairs, building selection queries and resolving responses.
//! * `responder`: Contains the `Responder` struct, holding encrypted environment scores and evaluating queries against them.
//! * `persist`: Persisted forms of key material, score records and relationship graph edges.

pub use num_bigint_dig::{BigInt, BigUint};
pub use pir_internals::environment::{RelationshipGraph, build_environment_scores};
pub use pir_internals::error::PaillierPIRError;
pub use pir_internals::paillier::{Ciphertext, Keypair, PrivateKey, PublicKey};
pub use pir_internals::params::{AUXILIARY_KEY_BIT_LEN, KeySizes, PRIMARY_KEY_BIT_LEN};
pub use pir_internals::persist;
pub use pir_internals::score_store::{IdentityId, ScoreStore};
pub use pir_internals::timer::{ScopedTimer, timed};
pub use querier::{Querier, Query};
pub use responder::{MaskedResponse, Responder};

pub mod querier;
pub mod responder;

mod pir_internals;

mod test_pir;
