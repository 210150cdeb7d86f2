//! Store-level record versions and optimistic concurrency expectations.

use crate::error::{DomainError, DomainResult};

/// A record whose every successful write bumps a monotonically increasing version.
///
/// Versions are assigned by the store, never by callers. Version `0` means the
/// record has not been written yet.
pub trait Versioned {
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for a conditional write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (last-write-wins).
    Any,
    /// Require the record to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::VersionConflict {
                expected: match self {
                    ExpectedVersion::Exact(v) => v,
                    ExpectedVersion::Any => actual,
                },
                actual,
            })
        }
    }
}
