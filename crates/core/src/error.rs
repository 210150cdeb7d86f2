//! Errors raised by identifiers and record writes.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Identifier or category rejected at construction.
    #[error("invalid {kind}: {reason}")]
    InvalidId { kind: &'static str, reason: String },

    #[error("validation failed: {0}")]
    Validation(String),

    /// A depletion was asked of a record that still has stock.
    #[error("record is not depleted")]
    NotDepleted,

    /// A conditional write expected a version the record has moved past.
    #[error("version conflict (expected {expected}, found {actual})")]
    VersionConflict { expected: u64, actual: u64 },

    /// The depletion a replenishment targets has already been resolved.
    #[error("record was already replenished")]
    AlreadyReplenished,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidId {
            kind,
            reason: reason.into(),
        }
    }

    /// Another writer won the race for this record.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. } | Self::AlreadyReplenished)
    }
}
