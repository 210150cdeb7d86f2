//! Strongly-typed identifiers used across the domain.
//!
//! Identifiers are opaque strings supplied by tenants (product codes, tenant
//! slugs). They travel inside colon-delimited channel messages, so the
//! delimiter is rejected at construction time.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Field delimiter of the restock wire format (`ProductId:TenantId:Category:Reason`).
pub const FIELD_DELIMITER: char = ':';

/// Identifier of a tenant (multi-tenant boundary).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

/// Identifier of a product within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProductId(String);

/// Product category label carried on inventory records and restock events.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Category(String);

fn validate(kind: &'static str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::invalid_id(kind, "cannot be empty"));
    }
    if value.contains(FIELD_DELIMITER) {
        return Err(DomainError::invalid_id(
            kind,
            format!("cannot contain '{FIELD_DELIMITER}'"),
        ));
    }
    Ok(())
}

macro_rules! impl_string_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Create a validated identifier.
            pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
                let value = value.into();
                validate($name, &value)?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $t {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

impl_string_newtype!(TenantId, "TenantId");
impl_string_newtype!(ProductId, "ProductId");
impl_string_newtype!(Category, "Category");

/// Composite identity `(ProductId, TenantId)` shared by the inventory and frequency stores.
///
/// Ordering is by product, then tenant; stores rely on it for stable pagination.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InventoryKey {
    pub product_id: ProductId,
    pub tenant_id: TenantId,
}

impl InventoryKey {
    pub fn new(product_id: ProductId, tenant_id: TenantId) -> Self {
        Self {
            product_id,
            tenant_id,
        }
    }

    /// Build a key from raw strings, validating both parts.
    pub fn parse(product_id: &str, tenant_id: &str) -> Result<Self, DomainError> {
        Ok(Self::new(product_id.parse()?, tenant_id.parse()?))
    }
}

impl core::fmt::Display for InventoryKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}{}{}", self.product_id, FIELD_DELIMITER, self.tenant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_delimited_values() {
        assert!(TenantId::new("").is_err());
        assert!(TenantId::new("   ").is_err());
        assert!(ProductId::new("P:1").is_err());
        assert!(Category::new("Dairy").is_ok());
    }

    #[test]
    fn serde_roundtrip_validates() {
        let key = InventoryKey::parse("P1", "T1").unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"{"product_id":"P1","tenant_id":"T1"}"#);

        let bad = serde_json::from_str::<InventoryKey>(r#"{"product_id":"P:1","tenant_id":"T1"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn key_display_uses_wire_order() {
        let key = InventoryKey::parse("P1", "T1").unwrap();
        assert_eq!(key.to_string(), "P1:T1");
    }
}
