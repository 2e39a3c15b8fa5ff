use std::{error::Error, fmt::Display};

#[derive(Debug, PartialEq)]
pub enum PaillierPIRError {
    // Paillier
    InvalidKeyLength(usize),
    InvalidKeyMaterial,
    KeyMismatch,
    DecryptionFailure,

    // Score store
    EmptyScoreStore,
    DuplicateIdentity(u32),
    UnknownIdentity(u32),

    // PIR
    DimensionMismatch { expected: usize, found: usize },
    IndexOutOfRange(usize),
    IncompatibleAuxiliaryKey,

    // Persistence
    FailedToSerializeRecords(String),
    FailedToDeserializeRecords(String),
}

impl Display for PaillierPIRError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidKeyLength(bit_len) => write!(f, "Paillier modulus bit length '{}' is either too short or odd.", bit_len),
            Self::InvalidKeyMaterial => write!(f, "Key material does not describe a valid Paillier keypair."),
            Self::KeyMismatch => write!(f, "Ciphertext is not encrypted under the expected public key."),
            Self::DecryptionFailure => write!(f, "Ciphertext integer is malformed, it must be a unit modulo n^2."),

            Self::EmptyScoreStore => write!(f, "Score store must hold at least one identity."),
            Self::DuplicateIdentity(identity) => write!(f, "Identity '{}' appears more than once in score records.", identity),
            Self::UnknownIdentity(identity) => write!(f, "Identity '{}' is referenced by the relationship graph, but has no score.", identity),

            Self::DimensionMismatch { expected, found } => {
                write!(f, "Query vector has '{}' entries, but score store holds '{}' entries.", found, expected)
            }
            Self::IndexOutOfRange(index) => write!(f, "Index '{}' is not present in score store.", index),
            Self::IncompatibleAuxiliaryKey => write!(f, "Auxiliary modulus must be larger than the square of primary modulus."),

            Self::FailedToSerializeRecords(e) => write!(f, "Record serialization failed with: {}", e),
            Self::FailedToDeserializeRecords(e) => write!(f, "Record deserialization failed with: {}", e),
        }
    }
}

impl Error for PaillierPIRError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}
