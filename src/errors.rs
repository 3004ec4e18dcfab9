use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PodError {
    #[error("malformed input: {0}")]
    MalformedInput(&'static str),

    #[error("invalid length: expected {expected} got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("index out of range: {index} not in [0, {max})")]
    OutOfRangeIndex { index: u64, max: u64 },

    #[error("commitment mismatch: {0}")]
    CommitmentMismatch(&'static str),

    #[error("batched key check failed")]
    BatchCheckFailed,

    #[error("batched key check failed but no mismatching cell was found")]
    LocalizationFailed,

    #[error("encrypted data does not match the published row commitments")]
    EncryptedDataMismatch,

    #[error("sigma merkle root does not match the bulletin")]
    SigmaRootMismatch,

    #[error("decode error: {0}")]
    Decode(&'static str),

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for PodError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Why the judge refused to uphold a claim. Not an error: a rejected claim
/// simply means no fraud was proven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClaimRejection {
    #[error("claimed cell lies outside the committed key tree")]
    IndexOutOfRange,

    #[error("merkle path does not authenticate the claimed key")]
    PathInvalid,

    #[error("committed key matches the key derived from the disclosed seed")]
    KeyMatches,
}
