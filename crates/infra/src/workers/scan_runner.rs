use std::io;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use restock_events::RestockChannel;

use crate::coordinator::{ScanCoordinator, ScanReport, ScanScope};
use crate::store::{FrequencyStore, InventoryStore};

/// Periodic scan scheduler.
#[derive(Debug, Clone)]
pub struct ScanRunner {
    pub interval: Duration,
    pub scope: ScanScope,
    pub max_retries: u32,
    pub base_backoff: Duration,
    /// Run a scan as soon as the runner starts.
    pub run_on_start: bool,
}

impl Default for ScanRunner {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            scope: ScanScope::All,
            max_retries: 5,
            base_backoff: Duration::from_millis(250),
            run_on_start: true,
        }
    }
}

/// Handle for a running scheduler (shutdown, manual trigger, last report).
#[derive(Debug)]
pub struct ScanRunnerHandle {
    shutdown: mpsc::Sender<()>,
    trigger: mpsc::SyncSender<()>,
    join: Option<thread::JoinHandle<()>>,
    last_report: Arc<Mutex<Option<ScanReport>>>,
}

impl ScanRunnerHandle {
    /// Ask for a scan now. Coalesced with any scan already pending.
    pub fn trigger(&self) {
        let _ = self.trigger.try_send(());
    }

    /// Report of the most recent scan, including failed ones.
    pub fn last_report(&self) -> Option<ScanReport> {
        match self.last_report.lock() {
            Ok(r) => r.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

impl ScanRunner {
    /// Spawn the scheduler thread.
    ///
    /// Enumeration failures are retried with bounded exponential backoff and
    /// never propagate; the next tick starts fresh.
    pub fn spawn<I, F, C>(
        &self,
        name: &'static str,
        coordinator: Arc<ScanCoordinator<I, F, C>>,
    ) -> io::Result<ScanRunnerHandle>
    where
        I: InventoryStore + 'static,
        F: FrequencyStore + 'static,
        C: RestockChannel + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let (trigger_tx, trigger_rx) = mpsc::sync_channel::<()>(1);
        let last_report = Arc::new(Mutex::new(None));

        let cfg = self.clone();
        let report_slot = last_report.clone();
        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || runner_loop(name, cfg, shutdown_rx, trigger_rx, coordinator, report_slot))?;

        Ok(ScanRunnerHandle {
            shutdown: shutdown_tx,
            trigger: trigger_tx,
            join: Some(join),
            last_report,
        })
    }
}

fn runner_loop<I, F, C>(
    name: &'static str,
    cfg: ScanRunner,
    shutdown_rx: mpsc::Receiver<()>,
    trigger_rx: mpsc::Receiver<()>,
    coordinator: Arc<ScanCoordinator<I, F, C>>,
    last_report: Arc<Mutex<Option<ScanReport>>>,
) where
    I: InventoryStore,
    F: FrequencyStore,
    C: RestockChannel,
{
    info!(runner = name, interval_secs = cfg.interval.as_secs(), "scan runner started");

    let mut next_tick = Instant::now() + cfg.interval;
    let mut pending = cfg.run_on_start;
    let mut failures: u32 = 0;
    let mut backoff_until: Option<Instant> = None;

    loop {
        match shutdown_rx.try_recv() {
            Ok(()) | Err(mpsc::TryRecvError::Disconnected) => break,
            Err(mpsc::TryRecvError::Empty) => {}
        }

        let now = Instant::now();
        if now >= next_tick {
            pending = true;
            while next_tick <= now {
                next_tick += cfg.interval;
            }
        }

        while trigger_rx.try_recv().is_ok() {
            pending = true;
        }

        if let Some(until) = backoff_until {
            if Instant::now() < until {
                thread::sleep(Duration::from_millis(50));
                continue;
            }
            backoff_until = None;
        }

        if !pending {
            let sleep_for = next_tick
                .saturating_duration_since(Instant::now())
                .min(Duration::from_millis(250));
            thread::sleep(sleep_for);
            continue;
        }

        pending = false;

        match coordinator.scan(&cfg.scope) {
            Ok(report) => {
                failures = 0;
                if let Ok(mut slot) = last_report.lock() {
                    *slot = Some(report);
                }
            }
            Err(e) => {
                warn!(runner = name, error = %e, "scheduled scan failed");
                if let Ok(mut slot) = last_report.lock() {
                    *slot = Some(e.report().clone());
                }
                failures += 1;
                if failures <= cfg.max_retries {
                    pending = true;
                    backoff_until = Some(Instant::now() + backoff(cfg.base_backoff, failures));
                } else {
                    failures = 0;
                }
            }
        }
    }

    info!(runner = name, "scan runner stopped");
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    let pow = 1u32 << attempt.saturating_sub(1).min(10);
    let ms = base.as_millis().saturating_mul(pow as u128);
    Duration::from_millis(ms.min(10_000) as u64)
}
