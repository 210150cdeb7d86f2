//! Environment-driven configuration.

use std::net::SocketAddr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use restock_inventory::{DEFAULT_QUEUE_REPLENISH_VALUE, ReplenishmentRange};

use crate::coordinator::ScanConfig;
use crate::retry::RetryPolicy;
use crate::updater::UpdaterConfig;
use crate::workers::ConsumerConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}: {reason}")]
    Parse {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct RestockConfig {
    pub inventory_table: String,
    pub frequency_table: String,
    pub channel_name: String,
    pub replenish_min: u32,
    pub replenish_max: u32,
    pub queue_replenish_value: u32,
    pub scan_page_size: usize,
    pub scan_time_budget: Option<Duration>,
    pub scan_workers: usize,
    pub publish_max_attempts: u32,
    pub queue_visibility_timeout: Duration,
    pub queue_batch_size: usize,
    pub queue_max_receives: u32,
    pub scan_interval: Option<Duration>,
    pub listen_addr: SocketAddr,
    pub redis_url: Option<String>,
}

impl Default for RestockConfig {
    fn default() -> Self {
        Self {
            inventory_table: "inventory".to_string(),
            frequency_table: "frequency".to_string(),
            channel_name: "restock".to_string(),
            replenish_min: 20,
            replenish_max: 30,
            queue_replenish_value: DEFAULT_QUEUE_REPLENISH_VALUE,
            scan_page_size: 100,
            scan_time_budget: None,
            scan_workers: 1,
            publish_max_attempts: 3,
            queue_visibility_timeout: Duration::from_millis(30_000),
            queue_batch_size: 10,
            queue_max_receives: 5,
            scan_interval: None,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            redis_url: None,
        }
    }
}

impl RestockConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source. Unset variables keep their defaults.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let cfg = Self {
            inventory_table: get("INVENTORY_TABLE_NAME").unwrap_or(d.inventory_table),
            frequency_table: get("FREQUENCY_TABLE_NAME").unwrap_or(d.frequency_table),
            channel_name: get("RESTOCK_CHANNEL_NAME").unwrap_or(d.channel_name),
            replenish_min: parse(&get, "REPLENISH_MIN")?.unwrap_or(d.replenish_min),
            replenish_max: parse(&get, "REPLENISH_MAX")?.unwrap_or(d.replenish_max),
            queue_replenish_value: parse(&get, "QUEUE_REPLENISH_VALUE")?.unwrap_or(d.queue_replenish_value),
            scan_page_size: parse(&get, "SCAN_PAGE_SIZE")?.unwrap_or(d.scan_page_size),
            scan_time_budget: parse(&get, "SCAN_TIME_BUDGET_MS")?.map(Duration::from_millis),
            scan_workers: parse(&get, "SCAN_WORKERS")?.unwrap_or(d.scan_workers),
            publish_max_attempts: parse(&get, "PUBLISH_MAX_ATTEMPTS")?.unwrap_or(d.publish_max_attempts),
            queue_visibility_timeout: parse(&get, "QUEUE_VISIBILITY_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(d.queue_visibility_timeout),
            queue_batch_size: parse(&get, "QUEUE_BATCH_SIZE")?.unwrap_or(d.queue_batch_size),
            queue_max_receives: parse(&get, "QUEUE_MAX_RECEIVES")?.unwrap_or(d.queue_max_receives),
            scan_interval: parse(&get, "SCAN_INTERVAL_SECS")?.map(Duration::from_secs),
            listen_addr: parse(&get, "LISTEN_ADDR")?.unwrap_or(d.listen_addr),
            redis_url: get("REDIS_URL"),
        };

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.replenishment_range()?;
        if self.queue_replenish_value == 0 {
            return Err(ConfigError::Invalid("QUEUE_REPLENISH_VALUE must be positive".to_string()));
        }
        if self.scan_page_size == 0 {
            return Err(ConfigError::Invalid("SCAN_PAGE_SIZE must be positive".to_string()));
        }
        if self.queue_batch_size == 0 {
            return Err(ConfigError::Invalid("QUEUE_BATCH_SIZE must be positive".to_string()));
        }
        if self.scan_interval == Some(Duration::ZERO) {
            return Err(ConfigError::Invalid("SCAN_INTERVAL_SECS must be positive".to_string()));
        }
        Ok(())
    }

    pub fn replenishment_range(&self) -> Result<ReplenishmentRange, ConfigError> {
        ReplenishmentRange::new(self.replenish_min, self.replenish_max)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn scan_config(&self) -> Result<ScanConfig, ConfigError> {
        Ok(ScanConfig {
            range: self.replenishment_range()?,
            page_size: self.scan_page_size,
            time_budget: self.scan_time_budget,
            workers: self.scan_workers.max(1),
            publish_retry: RetryPolicy::exponential(
                self.publish_max_attempts.max(1),
                Duration::from_millis(100),
                Duration::from_secs(2),
            ),
            store_retry: RetryPolicy::default(),
        })
    }

    pub fn updater_config(&self) -> UpdaterConfig {
        UpdaterConfig {
            replenish_value: self.queue_replenish_value,
            store_retry: RetryPolicy::default(),
            workers: 1,
        }
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            name: format!("{}-consumer", self.channel_name),
            batch_size: self.queue_batch_size,
            visibility_timeout: self.queue_visibility_timeout,
            ..ConsumerConfig::default()
        }
    }
}

fn parse<T, G>(get: &G, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Parse {
                var,
                reason: e.to_string(),
                value,
            }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from(pairs: &[(&str, &str)]) -> Result<RestockConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RestockConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = from(&[]).unwrap();
        assert_eq!((cfg.replenish_min, cfg.replenish_max), (20, 30));
        assert_eq!(cfg.queue_replenish_value, 25);
        assert_eq!(cfg.scan_time_budget, None);
        assert_eq!(cfg.listen_addr.port(), 8080);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = from(&[
            ("REPLENISH_MIN", "5"),
            ("REPLENISH_MAX", "6"),
            ("SCAN_TIME_BUDGET_MS", "1500"),
            ("INVENTORY_TABLE_NAME", "inv-prod"),
            ("LISTEN_ADDR", "127.0.0.1:9000"),
        ])
        .unwrap();

        assert_eq!(cfg.replenishment_range().unwrap().max(), 6);
        assert_eq!(cfg.scan_time_budget, Some(Duration::from_millis(1500)));
        assert_eq!(cfg.inventory_table, "inv-prod");
        assert_eq!(cfg.listen_addr.port(), 9000);
    }

    #[test]
    fn rejects_inverted_range() {
        let err = from(&[("REPLENISH_MIN", "40")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_unparseable_values() {
        let err = from(&[("SCAN_PAGE_SIZE", "lots")]).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { var: "SCAN_PAGE_SIZE", .. }));
    }

    #[test]
    fn rejects_zero_batch_size() {
        assert!(from(&[("QUEUE_BATCH_SIZE", "0")]).is_err());
    }
}
