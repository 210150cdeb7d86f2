//! Text interface of the document ingestor.
//!
//! Extracted document lines look like `ProductId:TenantId:Category:Stock` and
//! are upserted into the inventory table as-is.

use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use restock_core::{Category, FIELD_DELIMITER, InventoryKey, ProductId, TenantId};

use crate::retry::{RetryPolicy, with_retry};
use crate::store::{InventoryStore, StoreError};

/// One `(ProductId, TenantId, Category, Stock)` tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryTuple {
    pub key: InventoryKey,
    pub category: Category,
    pub stock: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TupleError {
    #[error("expected 4 fields, found {0}")]
    FieldCount(usize),
    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl FromStr for InventoryTuple {
    type Err = TupleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.trim().split(FIELD_DELIMITER).collect();
        let [product, tenant, category, stock] = fields.as_slice() else {
            return Err(TupleError::FieldCount(fields.len()));
        };

        let product_id = ProductId::new(*product).map_err(|e| invalid("product_id", e))?;
        let tenant_id = TenantId::new(*tenant).map_err(|e| invalid("tenant_id", e))?;
        let category = Category::new(*category).map_err(|e| invalid("category", e))?;
        let stock = stock.trim().parse::<u32>().map_err(|e| invalid("stock", e))?;

        Ok(Self {
            key: InventoryKey::new(product_id, tenant_id),
            category,
            stock,
        })
    }
}

fn invalid(field: &'static str, err: impl ToString) -> TupleError {
    TupleError::InvalidField {
        field,
        reason: err.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineError {
    /// 1-based line number in the submitted document.
    pub line: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub upserted: usize,
    pub skipped_blank: usize,
    pub errors: Vec<LineError>,
}

/// Parse and upsert every line. Bad lines are reported and skipped.
pub fn ingest_lines<S, L>(store: &S, lines: L, retry: &RetryPolicy) -> IngestReport
where
    S: InventoryStore + ?Sized,
    L: IntoIterator,
    L::Item: AsRef<str>,
{
    let mut report = IngestReport::default();

    for (idx, line) in lines.into_iter().enumerate() {
        let line = line.as_ref();
        if line.trim().is_empty() {
            report.skipped_blank += 1;
            continue;
        }

        let tuple = match line.parse::<InventoryTuple>() {
            Ok(t) => t,
            Err(e) => {
                warn!(line = idx + 1, error = %e, "skipping malformed inventory line");
                report.errors.push(LineError {
                    line: idx + 1,
                    error: e.to_string(),
                });
                continue;
            }
        };

        let result = with_retry(retry, "inventory.upsert", StoreError::is_transient, || {
            store.upsert(tuple.key.clone(), tuple.category.clone(), tuple.stock)
        });
        match result {
            Ok(_) => report.upserted += 1,
            Err(e) => {
                warn!(line = idx + 1, key = %tuple.key, error = %e, "failed to upsert inventory line");
                report.errors.push(LineError {
                    line: idx + 1,
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        upserted = report.upserted,
        errors = report.errors.len(),
        "inventory document ingested"
    );
    report
}
