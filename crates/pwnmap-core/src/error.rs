//! Error types for the object model.
//!
//! Decoding and query parsing failures are always recoverable: the caller
//! skips the affected object or term and carries on.

use thiserror::Error;

/// Failure to decode a binary SID or security descriptor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated {what}: needed {needed} bytes at offset {offset}, have {available}")]
    Truncated {
        what: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("unsupported {what} revision {revision}")]
    UnsupportedRevision { what: &'static str, revision: u8 },

    #[error("malformed ACE at offset {offset}: {reason}")]
    MalformedAce { offset: usize, reason: String },

    #[error("malformed SID: {0}")]
    MalformedSid(String),
}

impl DecodeError {
    pub(crate) fn truncated(
        what: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    ) -> Self {
        Self::Truncated {
            what,
            offset,
            needed,
            available,
        }
    }
}

/// Failure to parse a filter expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("unexpected end of query at position {0}")]
    UnexpectedEnd(usize),

    #[error("expected '{expected}' at position {position}, found '{found}'")]
    Expected {
        expected: char,
        found: char,
        position: usize,
    },

    #[error("unbalanced parentheses at position {0}")]
    Unbalanced(usize),

    #[error("empty term at position {0}")]
    EmptyTerm(usize),

    #[error("unknown operator '{operator}' at position {position}")]
    UnknownOperator { operator: String, position: usize },

    #[error("unknown matching rule '{0}'")]
    UnknownMatchingRule(String),

    #[error("invalid numeric value '{0}' for bitwise match")]
    InvalidNumber(String),

    #[error("trailing input after query at position {0}")]
    TrailingInput(usize),

    #[error("query nested too deeply at position {offset}")]
    TooDeep { offset: usize },
}

pub type DecodeResult<T> = std::result::Result<T, DecodeError>;
