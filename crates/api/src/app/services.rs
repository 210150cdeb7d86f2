//! Service wiring shared by the HTTP handlers and the background workers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use restock_events::{Delivery, InMemoryRestockQueue, MessageId, Receipt, RestockChannel};
use restock_infra::{
    FrequencyStore, InMemoryFrequencyStore, InMemoryInventoryStore, InventoryStore, QueueUpdater,
    RestockConfig, ScanCoordinator,
};

/// Channel with its backend error flattened to a string, so handlers don't
/// depend on which backend is configured.
pub type AppChannel = Arc<dyn RestockChannel<Error = String>>;

pub type AppInventory = Arc<dyn InventoryStore>;

pub type AppFrequency = Arc<dyn FrequencyStore>;

pub type AppCoordinator = ScanCoordinator<AppInventory, AppFrequency, AppChannel>;

pub type AppUpdater = QueueUpdater<AppInventory>;

struct ErasedChannel<C>(C);

impl<C: RestockChannel> RestockChannel for ErasedChannel<C> {
    type Error = String;

    fn send(&self, body: String) -> Result<MessageId, String> {
        self.0.send(body).map_err(|e| e.to_string())
    }

    fn receive(&self, max_messages: usize, visibility_timeout: Duration) -> Result<Vec<Delivery>, String> {
        self.0
            .receive(max_messages, visibility_timeout)
            .map_err(|e| e.to_string())
    }

    fn ack(&self, receipt: &Receipt) -> Result<(), String> {
        self.0.ack(receipt).map_err(|e| e.to_string())
    }
}

pub fn erase_channel<C: RestockChannel + 'static>(channel: C) -> AppChannel {
    Arc::new(ErasedChannel(channel))
}

pub struct AppServices {
    pub config: RestockConfig,
    pub inventory: AppInventory,
    pub frequency: AppFrequency,
    pub channel: AppChannel,
    pub coordinator: Arc<AppCoordinator>,
    pub updater: Arc<AppUpdater>,
}

impl AppServices {
    /// Wire services over in-memory stores and the given channel.
    pub fn new(config: RestockConfig, channel: AppChannel) -> anyhow::Result<Self> {
        let inventory: AppInventory = InMemoryInventoryStore::arc();
        let frequency: AppFrequency = InMemoryFrequencyStore::arc();
        Self::with_stores(config, inventory, frequency, channel)
    }

    pub fn with_stores(
        config: RestockConfig,
        inventory: AppInventory,
        frequency: AppFrequency,
        channel: AppChannel,
    ) -> anyhow::Result<Self> {
        let coordinator = Arc::new(ScanCoordinator::new(
            inventory.clone(),
            frequency.clone(),
            channel.clone(),
            config.scan_config().context("invalid scan configuration")?,
        ));
        let updater = Arc::new(QueueUpdater::new(inventory.clone(), config.updater_config()));

        Ok(Self {
            config,
            inventory,
            frequency,
            channel,
            coordinator,
            updater,
        })
    }

    /// Services over an in-memory restock queue (dev, tests).
    pub fn in_memory(config: RestockConfig) -> anyhow::Result<Self> {
        let queue = InMemoryRestockQueue::new().with_max_receives(config.queue_max_receives);
        Self::new(config, erase_channel(queue))
    }
}

/// Build services from configuration, picking the channel backend.
pub fn build_services(config: RestockConfig) -> anyhow::Result<AppServices> {
    #[cfg(feature = "redis")]
    if let Some(url) = config.redis_url.clone() {
        use restock_infra::channel::RedisStreamsChannel;

        let consumer = format!("{}-{}", config.channel_name, std::process::id());
        let channel = RedisStreamsChannel::connect(&url, config.channel_name.clone(), consumer)
            .context("failed to connect to redis restock channel")?
            .with_max_receives(config.queue_max_receives);
        info!(stream = %channel.stream_key(), "using redis streams restock channel");
        return AppServices::new(config, erase_channel(channel));
    }

    info!(channel = %config.channel_name, "using in-memory restock channel");
    AppServices::in_memory(config)
}
