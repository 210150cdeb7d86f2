//! `restock-core`: identifiers, versions and domain errors.

pub mod error;
pub mod id;
pub mod version;

pub use error::{DomainError, DomainResult};
pub use id::{Category, InventoryKey, ProductId, TenantId, FIELD_DELIMITER};
pub use version::{ExpectedVersion, Versioned};
