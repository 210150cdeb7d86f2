use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use restock_core::{InventoryKey, TenantId};
use restock_events::TenantScoped;

/// Identifier of one coordinator invocation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanCycleId(pub Uuid);

impl ScanCycleId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ScanCycleId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ScanCycleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// The depletion occurrence a scan observed, named by the inventory version at
/// which stock dropped to 0.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepletionMark {
    pub depleted_since: u64,
    pub cycle_id: ScanCycleId,
    pub observed_at: DateTime<Utc>,
}

/// Result of recording a depletion against the frequency counter.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DepletionOutcome {
    /// A new occurrence; the counter moved.
    Counted { frequency: u64 },
    /// This occurrence was already counted by an earlier or overlapping scan.
    AlreadyCounted { frequency: u64 },
    /// The observation predates the last counted occurrence.
    Stale { frequency: u64 },
}

impl DepletionOutcome {
    pub fn frequency(&self) -> u64 {
        match self {
            DepletionOutcome::Counted { frequency }
            | DepletionOutcome::AlreadyCounted { frequency }
            | DepletionOutcome::Stale { frequency } => *frequency,
        }
    }

    pub fn is_counted(&self) -> bool {
        matches!(self, DepletionOutcome::Counted { .. })
    }
}

/// How many distinct depletions a product has gone through.
///
/// Append-only: the counter never decreases and is never rolled back, even if
/// a later stock write appears to undo a restock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyRecord {
    key: InventoryKey,
    frequency: u64,
    last_depletion: Option<DepletionMark>,
}

impl FrequencyRecord {
    /// Record created by the first observed depletion.
    pub fn first(key: InventoryKey, mark: DepletionMark) -> Self {
        Self {
            key,
            frequency: 1,
            last_depletion: Some(mark),
        }
    }

    pub fn key(&self) -> &InventoryKey {
        &self.key
    }

    pub fn frequency(&self) -> u64 {
        self.frequency
    }

    pub fn last_depletion(&self) -> Option<&DepletionMark> {
        self.last_depletion.as_ref()
    }

    /// Count `mark` unless it was already counted.
    ///
    /// Each occurrence starts at a later inventory version than the previous
    /// one, so a mark at or below the last counted start is either the same
    /// occurrence re-observed or a late observation of an older one.
    pub fn record(&mut self, mark: DepletionMark) -> DepletionOutcome {
        if let Some(last) = &self.last_depletion {
            if mark.depleted_since == last.depleted_since {
                return DepletionOutcome::AlreadyCounted {
                    frequency: self.frequency,
                };
            }
            if mark.depleted_since < last.depleted_since {
                return DepletionOutcome::Stale {
                    frequency: self.frequency,
                };
            }
        }

        self.frequency += 1;
        self.last_depletion = Some(mark);
        DepletionOutcome::Counted {
            frequency: self.frequency,
        }
    }
}

impl TenantScoped for FrequencyRecord {
    fn tenant_id(&self) -> &TenantId {
        &self.key.tenant_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn mark(version: u64) -> DepletionMark {
        DepletionMark {
            depleted_since: version,
            cycle_id: ScanCycleId::new(),
            observed_at: Utc::now(),
        }
    }

    fn key() -> InventoryKey {
        InventoryKey::parse("P1", "T1").unwrap()
    }

    #[test]
    fn first_depletion_starts_at_one() {
        let rec = FrequencyRecord::first(key(), mark(1));
        assert_eq!(rec.frequency(), 1);
        assert_eq!(rec.last_depletion().unwrap().depleted_since, 1);
    }

    #[test]
    fn reobserving_same_occurrence_does_not_count() {
        let mut rec = FrequencyRecord::first(key(), mark(1));
        assert_eq!(rec.record(mark(1)), DepletionOutcome::AlreadyCounted { frequency: 1 });
        assert_eq!(rec.frequency(), 1);
    }

    #[test]
    fn fresh_depletion_counts_again() {
        let mut rec = FrequencyRecord::first(key(), mark(1));
        assert_eq!(rec.record(mark(4)), DepletionOutcome::Counted { frequency: 2 });
        assert_eq!(rec.record(mark(2)), DepletionOutcome::Stale { frequency: 2 });
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            .. ProptestConfig::default()
        })]

        #[test]
        fn frequency_is_monotonic_and_counts_distinct_versions(
            versions in proptest::collection::vec(0u64..20, 1..50)
        ) {
            let mut rec = FrequencyRecord::first(key(), mark(versions[0]));
            let mut prev = rec.frequency();
            let mut high = versions[0];
            let mut expected = 1u64;

            for v in &versions[1..] {
                let outcome = rec.record(mark(*v));
                prop_assert!(rec.frequency() >= prev);
                if *v > high {
                    high = *v;
                    expected += 1;
                    prop_assert!(outcome.is_counted());
                } else {
                    prop_assert!(!outcome.is_counted());
                }
                prev = rec.frequency();
            }

            prop_assert_eq!(rec.frequency(), expected);
        }
    }
}
