use crate::cursor::DocId;
use crate::query::capability::{Capability, CapabilitySet};
use thiserror::Error;

/// Error taxonomy for rewriting, constructing and executing a query.
///
/// Every variant is fatal for the query that raised it and for that query
/// only. Nothing here touches shared index state.
///
/// Classification guidance:
/// - [`QueryError::UnknownOperator`]: the resolver has no rule for a node
/// - [`QueryError::CapabilityMismatch`]: a wrapper was given a child that cannot
///   produce what it consumes (caught while building cursors, before scoring)
/// - [`QueryError::InvalidMove`]: a cursor was asked to move backwards, which
///   is a combinator or engine bug rather than a user error
/// - [`QueryError::MalformedTree`]: wrong arity or missing required parameters
/// - [`QueryError::InvalidConfig`]: structurally invalid configuration values
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unknown operator `{operator}`")]
    UnknownOperator { operator: String },

    #[error("capability mismatch at `{operator}`: expected a {expected} child, found {found}")]
    CapabilityMismatch {
        operator: String,
        expected: Capability,
        found: CapabilitySet,
    },

    #[error("invalid move: `{cursor}` is at document {current} and cannot move back to {target}")]
    InvalidMove {
        cursor: &'static str,
        current: DocId,
        target: DocId,
    },

    #[error("malformed query tree at `{operator}`: {reason}")]
    MalformedTree { operator: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl QueryError {
    pub(crate) fn malformed(operator: &str, reason: impl Into<String>) -> Self {
        QueryError::MalformedTree {
            operator: operator.to_string(),
            reason: reason.into(),
        }
    }
}

/// Standard result alias for the query core.
pub type Result<T> = std::result::Result<T, QueryError>;
