use std::io;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{error, info, warn};

use restock_events::RestockChannel;

use crate::store::InventoryStore;
use crate::updater::{BatchReport, QueueUpdater, RawMessage};

/// Consumer loop configuration.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub name: String,
    pub batch_size: usize,
    pub visibility_timeout: Duration,
    /// Sleep between polls when the channel is empty or failing.
    pub idle_poll: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            name: "restock-consumer".to_string(),
            batch_size: 10,
            visibility_timeout: Duration::from_secs(30),
            idle_poll: Duration::from_millis(250),
        }
    }
}

/// Consumer runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    pub batches: u64,
    pub received: u64,
    pub applied: u64,
    pub ignored: u64,
    pub discarded: u64,
    pub retried: u64,
    pub ack_failures: u64,
    pub receive_failures: u64,
}

impl ConsumerStats {
    fn record(&mut self, report: &BatchReport) {
        self.batches += 1;
        self.received += report.total() as u64;
        self.applied += report.applied.len() as u64;
        self.ignored += report.ignored.len() as u64;
        self.discarded += report.discarded.len() as u64;
        self.retried += report.retry.len() as u64;
    }
}

/// Handle to a running consumer.
#[derive(Debug)]
pub struct ConsumerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<ConsumerStats>>,
}

impl ConsumerHandle {
    /// Request graceful shutdown and wait for the current batch to finish.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> ConsumerStats {
        match self.stats.lock() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Background restock consumer.
///
/// Receives batches from the channel, runs them through the updater and acks
/// every message except those left for redelivery.
pub struct ConsumerWorker<I, C> {
    updater: Arc<QueueUpdater<I>>,
    channel: C,
    config: ConsumerConfig,
}

impl<I, C> ConsumerWorker<I, C>
where
    I: InventoryStore + 'static,
    C: RestockChannel + 'static,
{
    pub fn new(updater: Arc<QueueUpdater<I>>, channel: C, config: ConsumerConfig) -> Self {
        Self {
            updater,
            channel,
            config,
        }
    }

    /// Receive and process one batch. Returns `None` when nothing was received.
    pub fn poll_once(&self) -> Result<Option<(BatchReport, u64)>, C::Error> {
        let deliveries = self
            .channel
            .receive(self.config.batch_size, self.config.visibility_timeout)?;
        if deliveries.is_empty() {
            return Ok(None);
        }

        let messages: Vec<RawMessage> = deliveries
            .iter()
            .map(|d| RawMessage::new(d.message_id.clone(), d.body.clone()))
            .collect();
        let (report, outcomes) = self.updater.handle_batch(&messages);

        let mut ack_failures = 0;
        for (delivery, outcome) in deliveries.iter().zip(&outcomes) {
            if !outcome.should_ack() {
                continue;
            }
            if let Err(e) = self.channel.ack(&delivery.receipt) {
                // The message comes back after the visibility timeout; the set is idempotent.
                warn!(
                    consumer = %self.config.name,
                    message_id = %delivery.message_id,
                    error = %e,
                    "failed to ack restock message"
                );
                ack_failures += 1;
            }
        }

        Ok(Some((report, ack_failures)))
    }

    /// Spawn the consumer loop on its own thread.
    pub fn spawn(self) -> io::Result<ConsumerHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(ConsumerStats::default()));
        let stats_clone = stats.clone();

        let join = thread::Builder::new()
            .name(self.config.name.clone())
            .spawn(move || consumer_loop(self, shutdown_rx, stats_clone))?;

        Ok(ConsumerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}

fn consumer_loop<I, C>(
    worker: ConsumerWorker<I, C>,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<ConsumerStats>>,
) where
    I: InventoryStore + 'static,
    C: RestockChannel + 'static,
{
    let name = worker.config.name.clone();
    let started = Instant::now();
    info!(consumer = %name, "restock consumer started");

    loop {
        match shutdown_rx.try_recv() {
            Ok(()) | Err(mpsc::TryRecvError::Disconnected) => break,
            Err(mpsc::TryRecvError::Empty) => {}
        }

        match worker.poll_once() {
            Ok(Some((report, ack_failures))) => {
                if let Ok(mut s) = stats.lock() {
                    s.record(&report);
                    s.ack_failures += ack_failures;
                }
            }
            Ok(None) => thread::sleep(worker.config.idle_poll),
            Err(e) => {
                error!(consumer = %name, error = %e, "failed to receive from restock channel");
                if let Ok(mut s) = stats.lock() {
                    s.receive_failures += 1;
                }
                thread::sleep(worker.config.idle_poll);
            }
        }
    }

    info!(consumer = %name, uptime_secs = started.elapsed().as_secs(), "restock consumer stopped");
}
