//! Document store orchestration and its error taxonomy.
//!
//! # Responsibility
//! - Run create/find/update/delete by evaluating options against an index.
//! - Enforce the exactly-one contract for single-document operations.
//!
//! # Invariants
//! - Errors are built once where detected and passed up unchanged.
//! - `InternalConsistency` is never folded into `NotFound` or vice versa.
//! - Nothing in this layer retries.

use crate::context::CancelReason;
use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod document_store;
pub mod service;

pub type StoreResult<T> = Result<T, StoreError>;

/// Domain error for every store, index and evaluator operation.
#[derive(Debug)]
pub enum StoreError {
    /// Malformed input or a conflicting/missing option.
    InvalidRequest(String),
    /// Nothing matched, or the caller may not see what matched.
    NotFound(String),
    /// A single-document operation matched more than one document.
    InternalConsistency(String),
    /// The execution context was cancelled or expired.
    Cancelled(CancelReason),
    /// Persisted row cannot be decoded.
    InvalidData(String),
    Db(DbError),
}

impl StoreError {
    /// Stable short code shared with the transport adapter.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid",
            Self::NotFound(_) => "not found",
            Self::InternalConsistency(_) => "internal error",
            Self::Cancelled(_) => "cancelled",
            Self::InvalidData(_) | Self::Db(_) => "internal error",
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRequest(message) => write!(f, "invalid request: {message}"),
            Self::NotFound(message) => write!(f, "{message}"),
            Self::InternalConsistency(message) => {
                write!(f, "internal consistency violation: {message}")
            }
            Self::Cancelled(reason) => write!(f, "{reason}"),
            Self::InvalidData(message) => write!(f, "invalid persisted document data: {message}"),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<CancelReason> for StoreError {
    fn from(value: CancelReason) -> Self {
        Self::Cancelled(value)
    }
}
