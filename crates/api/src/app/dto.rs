use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use restock_core::Versioned;
use restock_infra::{BatchReport, BatchStatus, RawMessage, ScanReport};
use restock_inventory::{FrequencyRecord, InventoryRecord};

#[derive(Debug, Default, Deserialize)]
pub struct ScanQuery {
    pub tenant: Option<String>,
}

/// A scan that could not enumerate the store: the failure report plus an error code.
#[derive(Debug, Serialize)]
pub struct ScanFailureResponse {
    pub error: &'static str,
    pub message: String,
    #[serde(flatten)]
    pub report: ScanReport,
}

#[derive(Debug, Deserialize)]
pub struct RestockBatchRequest {
    pub messages: Vec<RawMessage>,
}

#[derive(Debug, Serialize)]
pub struct RestockBatchResponse {
    pub status: BatchStatus,
    #[serde(flatten)]
    pub report: BatchReport,
}

impl From<BatchReport> for RestockBatchResponse {
    fn from(report: BatchReport) -> Self {
        Self {
            status: report.status(),
            report,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub lines: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct InventoryResponse {
    pub product_id: String,
    pub tenant_id: String,
    pub category: String,
    pub stock: u32,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl From<&InventoryRecord> for InventoryResponse {
    fn from(r: &InventoryRecord) -> Self {
        Self {
            product_id: r.key().product_id.to_string(),
            tenant_id: r.key().tenant_id.to_string(),
            category: r.category().to_string(),
            stock: r.stock(),
            version: r.version(),
            updated_at: r.updated_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FrequencyResponse {
    pub product_id: String,
    pub tenant_id: String,
    pub frequency: u64,
    pub last_depleted_at: Option<DateTime<Utc>>,
}

impl From<&FrequencyRecord> for FrequencyResponse {
    fn from(r: &FrequencyRecord) -> Self {
        Self {
            product_id: r.key().product_id.to_string(),
            tenant_id: r.key().tenant_id.to_string(),
            frequency: r.frequency(),
            last_depleted_at: r.last_depletion().map(|m| m.observed_at),
        }
    }
}
