use thiserror::Error;

/// Errors raised while indexing monomials or assembling a polynomial system.
///
/// Every variant is a deterministic input-validation failure. A failed call
/// leaves any `PolynomialSystem` it was applied to untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolynomialError {
    /// A factor is malformed or references a variable outside `1..=n`.
    #[error("invalid monomial in term `{term}`: {reason}")]
    InvalidMonomial { term: String, reason: String },

    /// The equation text does not follow the accepted grammar.
    #[error("parse error in `{term}`: {reason}")]
    ParseError { term: String, reason: String },

    /// An equation targets a state variable the system does not have.
    #[error("variable index {index} is outside 1..={n_variables}")]
    DimensionError { index: usize, n_variables: usize },

    /// A system was requested with zero state variables.
    #[error("a polynomial system needs at least one state variable")]
    EmptySystem,

    /// A state vector passed for evaluation has the wrong length.
    #[error("state dimension mismatch: expected {expected}, got {actual}")]
    StateMismatch { expected: usize, actual: usize },
}

impl PolynomialError {
    pub(crate) fn parse(term: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ParseError {
            term: term.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn monomial(term: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMonomial {
            term: term.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PolynomialError>;
