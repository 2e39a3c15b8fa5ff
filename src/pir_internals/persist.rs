use super::{
    error::PaillierPIRError,
    paillier::{Ciphertext, PrivateKey, PublicKey},
    params,
    score_store::{IdentityId, ScoreStore},
};
use num_bigint_dig::{BigInt, BigUint};
use rand::{CryptoRng, prelude::*};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de, ser};
use serde_json::{Number, Value};
use std::io::{Read, Write};

/// Persisted form of a Paillier public key. Integers are written as arbitrary precision JSON numbers, while
/// both JSON numbers and decimal strings are accepted when reading.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PublicKeyRecord {
    #[serde(serialize_with = "serialize_decimal", deserialize_with = "deserialize_decimal")]
    pub g: String,
    #[serde(serialize_with = "serialize_decimal", deserialize_with = "deserialize_decimal")]
    pub n: String,
}

/// Persisted form of a Paillier private key: the two primes whose product is `n`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PrivateKeyRecord {
    #[serde(serialize_with = "serialize_decimal", deserialize_with = "deserialize_decimal")]
    pub p: String,
    #[serde(serialize_with = "serialize_decimal", deserialize_with = "deserialize_decimal")]
    pub q: String,
}

/// One row of the score table. Plaintext score is kept only for auditing, it is never consumed by the PIR protocol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub pid: IdentityId,
    pub score_plain: i64,
    pub score_enc: String,
}

/// One row of the transaction table. Only `src` and `dst` contribute to the relationship graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub src: IdentityId,
    pub dst: IdentityId,
    pub timestamp: String,
    pub amount: f64,
}

fn serialize_decimal<S: Serializer>(v: &str, serializer: S) -> Result<S::Ok, S::Error> {
    let number = v.trim().parse::<Number>().map_err(<S::Error as ser::Error>::custom)?;
    number.serialize(serializer)
}

// Goes through `Value`, so that big integers keep every digit.
fn deserialize_decimal<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(number) => Ok(number.to_string()),
        Value::String(text) => Ok(text),
        other => Err(<D::Error as de::Error>::custom(format!("expected an integer, found {}", other))),
    }
}

fn parse_decimal(v: &str) -> Result<BigUint, PaillierPIRError> {
    v.trim().parse::<BigUint>().map_err(|_| PaillierPIRError::InvalidKeyMaterial)
}

impl From<&PublicKey> for PublicKeyRecord {
    fn from(public_key: &PublicKey) -> Self {
        PublicKeyRecord {
            g: public_key.g().to_string(),
            n: public_key.n().to_string(),
        }
    }
}

impl From<&PrivateKey> for PrivateKeyRecord {
    fn from(private_key: &PrivateKey) -> Self {
        PrivateKeyRecord {
            p: private_key.p().to_string(),
            q: private_key.q().to_string(),
        }
    }
}

impl PublicKeyRecord {
    pub fn to_public_key(&self) -> Result<PublicKey, PaillierPIRError> {
        PublicKey::new(parse_decimal(&self.n)?, parse_decimal(&self.g)?)
    }
}

impl PrivateKeyRecord {
    pub fn to_private_key(&self, public_key: PublicKey) -> Result<PrivateKey, PaillierPIRError> {
        PrivateKey::from_primes(public_key, parse_decimal(&self.p)?, parse_decimal(&self.q)?)
    }
}

pub fn write_public_key<W: Write>(writer: W, public_key: &PublicKey) -> Result<(), PaillierPIRError> {
    serde_json::to_writer(writer, &PublicKeyRecord::from(public_key)).map_err(|e| PaillierPIRError::FailedToSerializeRecords(e.to_string()))
}

pub fn read_public_key<R: Read>(reader: R) -> Result<PublicKey, PaillierPIRError> {
    let record: PublicKeyRecord = serde_json::from_reader(reader).map_err(|e| PaillierPIRError::FailedToDeserializeRecords(e.to_string()))?;
    record.to_public_key()
}

pub fn write_private_key<W: Write>(writer: W, private_key: &PrivateKey) -> Result<(), PaillierPIRError> {
    serde_json::to_writer(writer, &PrivateKeyRecord::from(private_key)).map_err(|e| PaillierPIRError::FailedToSerializeRecords(e.to_string()))
}

pub fn read_private_key<R: Read>(reader: R, public_key: PublicKey) -> Result<PrivateKey, PaillierPIRError> {
    let record: PrivateKeyRecord = serde_json::from_reader(reader).map_err(|e| PaillierPIRError::FailedToDeserializeRecords(e.to_string()))?;
    record.to_private_key(public_key)
}

/// Draws a random plaintext score, in `[MIN_PLAIN_SCORE, MAX_PLAIN_SCORE]`, for each of `population` identities and encrypts it.
pub fn generate_score_records<R: CryptoRng + ?Sized>(public_key: &PublicKey, population: usize, rng: &mut R) -> Vec<ScoreRecord> {
    (0..population)
        .map(|pid| {
            let score_plain = rng.random_range(params::MIN_PLAIN_SCORE..=params::MAX_PLAIN_SCORE);
            let score_enc = public_key.encrypt(&BigInt::from(score_plain), rng);

            ScoreRecord {
                pid: pid as IdentityId,
                score_plain,
                score_enc: score_enc.value().to_string(),
            }
        })
        .collect()
}

pub fn write_score_records<W: Write>(writer: W, records: &[ScoreRecord]) -> Result<(), PaillierPIRError> {
    write_csv(writer, records)
}

pub fn read_score_records<R: Read>(reader: R) -> Result<Vec<ScoreRecord>, PaillierPIRError> {
    read_csv(reader)
}

pub fn write_edge_records<W: Write>(writer: W, records: &[EdgeRecord]) -> Result<(), PaillierPIRError> {
    write_csv(writer, records)
}

pub fn read_edge_records<R: Read>(reader: R) -> Result<Vec<EdgeRecord>, PaillierPIRError> {
    read_csv(reader)
}

/// Interprets score records as ciphertexts under `public_key`, collecting them into a score store.
pub fn score_store_from_records(public_key: &PublicKey, records: &[ScoreRecord]) -> Result<ScoreStore, PaillierPIRError> {
    let entries = records
        .iter()
        .map(|record| {
            let value = record
                .score_enc
                .trim()
                .parse::<BigUint>()
                .map_err(|e| PaillierPIRError::FailedToDeserializeRecords(e.to_string()))?;
            public_key.ciphertext_from_raw(value).map(|ct| (record.pid, ct))
        })
        .collect::<Result<Vec<(IdentityId, Ciphertext)>, PaillierPIRError>>()?;

    ScoreStore::from_entries(public_key, entries)
}

fn write_csv<W: Write, T: Serialize>(writer: W, records: &[T]) -> Result<(), PaillierPIRError> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    for record in records {
        csv_writer.serialize(record).map_err(|e| PaillierPIRError::FailedToSerializeRecords(e.to_string()))?;
    }

    csv_writer.flush().map_err(|e| PaillierPIRError::FailedToSerializeRecords(e.to_string()))
}

fn read_csv<R: Read, T: for<'de> Deserialize<'de>>(reader: R) -> Result<Vec<T>, PaillierPIRError> {
    csv::Reader::from_reader(reader)
        .deserialize()
        .map(|record| record.map_err(|e| PaillierPIRError::FailedToDeserializeRecords(e.to_string())))
        .collect()
}
