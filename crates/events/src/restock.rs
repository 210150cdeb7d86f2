//! Restock event payload and its colon-delimited wire codec.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use restock_core::{Category, FIELD_DELIMITER, InventoryKey, ProductId, TenantId};

/// Reason tag that asks consumers to replenish stock.
pub const RESTOCK_NEEDED: &str = "Restock needed";

/// Number of fields in an encoded restock message.
const FIELD_COUNT: usize = 4;

/// Why a restock event was emitted.
///
/// Unknown reasons are preserved so they round-trip, but consumers only act on
/// [`RestockReason::RestockNeeded`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestockReason {
    RestockNeeded,
    Other(OtherReason),
}

/// Any reason tag except [`RESTOCK_NEEDED`]: non-empty, free of the field delimiter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OtherReason(String);

impl OtherReason {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OtherReason {
    type Error = MalformedMessage;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match RestockReason::new(value)? {
            RestockReason::Other(other) => Ok(other),
            RestockReason::RestockNeeded => Err(MalformedMessage::InvalidField {
                field: "reason",
                reason: format!("{RESTOCK_NEEDED:?} is not an unknown reason"),
            }),
        }
    }
}

impl From<OtherReason> for String {
    fn from(value: OtherReason) -> Self {
        value.0
    }
}

impl RestockReason {
    /// Classify a wire reason tag.
    pub fn new(value: impl Into<String>) -> Result<Self, MalformedMessage> {
        let value = value.into();
        let invalid = |reason: String| MalformedMessage::InvalidField {
            field: "reason",
            reason,
        };

        if value == RESTOCK_NEEDED {
            return Ok(RestockReason::RestockNeeded);
        }
        if value.trim().is_empty() {
            return Err(invalid("cannot be empty".to_string()));
        }
        if value.contains(FIELD_DELIMITER) {
            return Err(invalid(format!("cannot contain {FIELD_DELIMITER:?}")));
        }
        Ok(RestockReason::Other(OtherReason(value)))
    }

    pub fn as_str(&self) -> &str {
        match self {
            RestockReason::RestockNeeded => RESTOCK_NEEDED,
            RestockReason::Other(other) => other.as_str(),
        }
    }

    pub fn is_restock(&self) -> bool {
        matches!(self, RestockReason::RestockNeeded)
    }
}

impl core::fmt::Display for RestockReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message body that cannot be turned into a [`RestockEvent`].
///
/// Malformed messages are never retryable: redelivering the same bytes cannot
/// fix them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedMessage {
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Notification that a depleted product needs restocking.
///
/// Encoded on the channel as `ProductId:TenantId:Category:Reason`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RestockEvent {
    pub product_id: ProductId,
    pub tenant_id: TenantId,
    pub category: Category,
    pub reason: RestockReason,
}

impl RestockEvent {
    /// Build the standard "restock needed" event for a depleted record.
    pub fn restock_needed(key: &InventoryKey, category: Category) -> Self {
        Self {
            product_id: key.product_id.clone(),
            tenant_id: key.tenant_id.clone(),
            category,
            reason: RestockReason::RestockNeeded,
        }
    }

    pub fn key(&self) -> InventoryKey {
        InventoryKey::new(self.product_id.clone(), self.tenant_id.clone())
    }

    /// Encode into the channel wire format.
    pub fn encode(&self) -> String {
        let d = FIELD_DELIMITER;
        format!(
            "{}{d}{}{d}{}{d}{}",
            self.product_id, self.tenant_id, self.category, self.reason
        )
    }

    /// Decode a raw channel body.
    pub fn parse(body: &str) -> Result<Self, MalformedMessage> {
        let fields: Vec<&str> = body.split(FIELD_DELIMITER).collect();
        if fields.len() != FIELD_COUNT {
            return Err(MalformedMessage::FieldCount {
                expected: FIELD_COUNT,
                found: fields.len(),
            });
        }

        let invalid = |field: &'static str| {
            move |e: restock_core::DomainError| MalformedMessage::InvalidField {
                field,
                reason: e.to_string(),
            }
        };

        let product_id = ProductId::new(fields[0]).map_err(invalid("product_id"))?;
        let tenant_id = TenantId::new(fields[1]).map_err(invalid("tenant_id"))?;
        let category = Category::new(fields[2]).map_err(invalid("category"))?;

        let reason = RestockReason::new(fields[3])?;

        Ok(Self {
            product_id,
            tenant_id,
            category,
            reason,
        })
    }
}

impl FromStr for RestockEvent {
    type Err = MalformedMessage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encodes_restock_needed() {
        let key = InventoryKey::parse("P1", "T1").unwrap();
        let ev = RestockEvent::restock_needed(&key, Category::new("Cat").unwrap());
        assert_eq!(ev.encode(), "P1:T1:Cat:Restock needed");
    }

    #[test]
    fn parses_restock_needed() {
        let ev = RestockEvent::parse("P1:T1:Cat:Restock needed").unwrap();
        assert_eq!(ev.product_id.as_str(), "P1");
        assert_eq!(ev.tenant_id.as_str(), "T1");
        assert!(ev.reason.is_restock());
    }

    #[test]
    fn unknown_reason_is_preserved() {
        let ev = RestockEvent::parse("P1:T1:Cat:Discontinued").unwrap();
        assert_eq!(ev.reason, RestockReason::new("Discontinued").unwrap());
        assert_eq!(ev.reason.as_str(), "Discontinued");
        assert!(!ev.reason.is_restock());
    }

    #[test]
    fn reasons_that_would_not_round_trip_are_rejected() {
        assert_eq!(RestockReason::new(RESTOCK_NEEDED).unwrap(), RestockReason::RestockNeeded);
        assert!(RestockReason::new("Price:changed").is_err());
        assert!(RestockReason::new("  ").is_err());

        let restock_tag: Result<OtherReason, _> = serde_json::from_str("\"Restock needed\"");
        assert!(restock_tag.is_err());
        let with_delimiter: Result<OtherReason, _> = serde_json::from_str("\"a:b\"");
        assert!(with_delimiter.is_err());
    }

    #[test]
    fn other_reason_round_trips_through_the_wire() {
        let ev = RestockEvent {
            reason: RestockReason::new("Discontinued").unwrap(),
            ..RestockEvent::parse("P1:T1:Cat:Restock needed").unwrap()
        };
        assert_eq!(RestockEvent::parse(&ev.encode()).unwrap(), ev);
    }

    #[test]
    fn wrong_field_count_is_malformed() {
        assert_eq!(
            RestockEvent::parse("P1:T1:Cat"),
            Err(MalformedMessage::FieldCount { expected: 4, found: 3 })
        );
        assert!(matches!(
            RestockEvent::parse("P1:T1:Cat:Restock needed:extra"),
            Err(MalformedMessage::FieldCount { found: 5, .. })
        ));
    }

    #[test]
    fn empty_fields_are_malformed() {
        assert!(matches!(
            RestockEvent::parse(":T1:Cat:Restock needed"),
            Err(MalformedMessage::InvalidField { field: "product_id", .. })
        ));
        assert!(matches!(
            RestockEvent::parse("P1:T1:Cat:"),
            Err(MalformedMessage::InvalidField { field: "reason", .. })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            .. ProptestConfig::default()
        })]

        #[test]
        fn encoded_events_parse_back_exactly(
            product in "[A-Za-z0-9_-]{1,12}",
            tenant in "[A-Za-z0-9_-]{1,12}",
            category in "[A-Za-z0-9 ]{0,10}[A-Za-z]",
        ) {
            let key = InventoryKey::parse(&product, &tenant).unwrap();
            let ev = RestockEvent::restock_needed(&key, Category::new(category).unwrap());
            let body = ev.encode();
            let parsed = RestockEvent::parse(&body).unwrap();
            prop_assert_eq!(&parsed, &ev);
            prop_assert_eq!(parsed.encode(), body);
        }
    }
}
