//! Proof construction errors

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProofError>;

/// Failures while building a proof from a fetched block.
///
/// None of these are retryable: rebuilding from the same block reproduces
/// them. Integrity failures abort the whole batch.
#[derive(Error, Debug)]
pub enum ProofError {
    #[error("Encoding error: {0}")]
    Encoding(cst_types::Error),

    #[error("Batch root not found in the encoding of operation {operation}")]
    RootHashNotEmbedded { operation: String },

    #[error("Batch root found {occurrences} times in the encoding of operation {operation}")]
    RootHashAmbiguous { operation: String, occurrences: usize },

    #[error("Operation {operation} carries no signature")]
    SignatureMissing { operation: String },

    #[error("Operation {operation} not found in validation pass {pass}")]
    OperationNotFound { operation: String, pass: usize },

    #[error("Proof composition mismatch: expected {expected}, derived {actual}")]
    CompositionMismatch { expected: String, actual: String },

    #[error("{segment} proof derives {actual}, chain reports {expected}")]
    DerivationMismatch {
        segment: &'static str,
        expected: String,
        actual: String,
    },

    #[error("Leaf index {index} out of range for a tree of {leaves} leaves")]
    LeafOutOfRange { index: usize, leaves: usize },
}

impl ProofError {
    /// True for errors indicating a logic or data-source bug rather than bad input.
    pub fn is_integrity_failure(&self) -> bool {
        !matches!(self, ProofError::Encoding(_))
    }

    pub fn is_retryable(&self) -> bool {
        false
    }
}

impl From<cst_types::Error> for ProofError {
    fn from(err: cst_types::Error) -> Self {
        match err {
            cst_types::Error::CompositionMismatch { expected, actual } => {
                ProofError::CompositionMismatch { expected, actual }
            }
            other => ProofError::Encoding(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composition_mismatch_is_integrity_failure() {
        let err: ProofError = cst_types::Error::CompositionMismatch {
            expected: "aa".into(),
            actual: "bb".into(),
        }
        .into();
        assert!(matches!(err, ProofError::CompositionMismatch { .. }));
        assert!(err.is_integrity_failure());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_encoding_errors_are_not_integrity_failures() {
        let err: ProofError = cst_types::Error::UnsupportedProtocol("PtXXX".into()).into();
        assert!(matches!(err, ProofError::Encoding(_)));
        assert!(!err.is_integrity_failure());
    }
}
