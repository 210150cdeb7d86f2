use rand::Rng;
use serde::{Deserialize, Serialize};

use restock_core::DomainError;

/// Stock the queue updater sets when it consumes a restock event.
pub const DEFAULT_QUEUE_REPLENISH_VALUE: u32 = 25;

/// Closed range `[min, max]` the scan draws replenishment quantities from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplenishmentRange {
    min: u32,
    max: u32,
}

impl ReplenishmentRange {
    /// Validate bounds. `min` must be positive so a replenished record is no
    /// longer depleted.
    pub fn new(min: u32, max: u32) -> Result<Self, DomainError> {
        if min == 0 {
            return Err(DomainError::validation("replenishment min must be positive"));
        }
        if min > max {
            return Err(DomainError::validation(format!(
                "replenishment min ({min}) exceeds max ({max})"
            )));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn contains(&self, stock: u32) -> bool {
        (self.min..=self.max).contains(&stock)
    }

    /// Draw a quantity uniformly from the range.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u32 {
        rng.gen_range(self.min..=self.max)
    }
}

impl Default for ReplenishmentRange {
    fn default() -> Self {
        Self { min: 20, max: 30 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn rejects_invalid_bounds() {
        assert!(ReplenishmentRange::new(0, 5).is_err());
        assert!(ReplenishmentRange::new(10, 9).is_err());
        assert!(ReplenishmentRange::new(7, 7).is_ok());
    }

    #[test]
    fn default_is_twenty_to_thirty() {
        let r = ReplenishmentRange::default();
        assert_eq!((r.min(), r.max()), (20, 30));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            .. ProptestConfig::default()
        })]

        #[test]
        fn samples_stay_within_bounds(seed in any::<u64>(), min in 1u32..50, span in 0u32..50) {
            let range = ReplenishmentRange::new(min, min + span).unwrap();
            let mut rng = StdRng::seed_from_u64(seed);
            for _ in 0..16 {
                prop_assert!(range.contains(range.sample(&mut rng)));
            }
        }
    }
}
