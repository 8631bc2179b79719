//! Debounced background aggregation worker.
//!
//! One long-lived task executes aggregation passes serially. A schedule
//! request defers the next pass by the configured delay; further requests
//! inside the window coalesce into that one run. A request arriving while a
//! pass is executing interrupts it — the pass exits at its next safe point,
//! keeps its progress, and the queued request starts a fresh run that picks
//! up the remainder.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info};

use kindred_core::defaults::AGGREGATION_DELAY_MS;
use kindred_core::ContactStore;

use crate::aggregator::ContactAggregator;

/// Configuration for the aggregation scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Debounce delay before a requested pass starts, milliseconds.
    pub aggregation_delay_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            aggregation_delay_ms: AGGREGATION_DELAY_MS,
        }
    }
}

impl SchedulerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `KINDRED_AGGREGATION_DELAY_MS` | `1000` | Debounce delay before a pass |
    pub fn from_env() -> Self {
        let aggregation_delay_ms = std::env::var("KINDRED_AGGREGATION_DELAY_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(AGGREGATION_DELAY_MS);
        Self {
            aggregation_delay_ms,
        }
    }

    /// Set the debounce delay.
    pub fn with_aggregation_delay(mut self, ms: u64) -> Self {
        self.aggregation_delay_ms = ms;
        self
    }
}

enum Control {
    Schedule,
    Stop,
}

#[derive(Default)]
struct Shared {
    running: AtomicBool,
    stopping: AtomicBool,
}

/// Handle to the background aggregation worker.
pub struct AggregationScheduler<S: ContactStore + 'static> {
    aggregator: Arc<ContactAggregator<S>>,
    shared: Arc<Shared>,
    tx: mpsc::UnboundedSender<Control>,
    handle: JoinHandle<()>,
}

impl<S: ContactStore + 'static> AggregationScheduler<S> {
    /// Start the worker and schedule an initial pass. The initial pass is a
    /// no-op most of the time; it matters when the host died mid-pass and
    /// left rows unaggregated.
    pub fn start(aggregator: Arc<ContactAggregator<S>>, config: SchedulerConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());
        let handle = tokio::spawn(run_worker(
            aggregator.clone(),
            shared.clone(),
            rx,
            config.clone(),
        ));
        let scheduler = Self {
            aggregator,
            shared,
            tx,
            handle,
        };
        scheduler.schedule();
        scheduler
    }

    /// Request a debounced aggregation pass. Call every time a raw contact's
    /// aggregate reference is cleared.
    pub fn schedule(&self) {
        if self.shared.running.load(Ordering::SeqCst) {
            // Let the current pass wind down; the queued request refires.
            self.aggregator.interrupt();
        }
        let _ = self.tx.send(Control::Schedule);
    }

    /// Cancel the current pass at its next safe point without stopping the
    /// worker. A fresh [`Self::schedule`] is expected to refire.
    pub fn interrupt(&self) {
        self.aggregator.interrupt();
    }

    /// Terminate the worker, interrupting any pass in flight.
    pub async fn stop(self) {
        self.shared.stopping.store(true, Ordering::SeqCst);
        self.aggregator.interrupt();
        let _ = self.tx.send(Control::Stop);
        let _ = self.handle.await;
    }
}

async fn run_worker<S: ContactStore>(
    aggregator: Arc<ContactAggregator<S>>,
    shared: Arc<Shared>,
    mut rx: mpsc::UnboundedReceiver<Control>,
    config: SchedulerConfig,
) {
    info!(
        subsystem = "engine",
        component = "scheduler",
        aggregation_delay_ms = config.aggregation_delay_ms,
        "aggregation scheduler started"
    );
    let delay = Duration::from_millis(config.aggregation_delay_ms);

    'outer: while let Some(control) = rx.recv().await {
        if matches!(control, Control::Stop) {
            break;
        }

        // Debounce: restart the wait whenever another request lands.
        loop {
            tokio::select! {
                _ = sleep(delay) => break,
                control = rx.recv() => match control {
                    None | Some(Control::Stop) => break 'outer,
                    Some(Control::Schedule) => continue,
                }
            }
        }
        if shared.stopping.load(Ordering::SeqCst) {
            break;
        }

        shared.running.store(true, Ordering::SeqCst);
        let result = aggregator.run_pass().await;
        shared.running.store(false, Ordering::SeqCst);

        if let Err(e) = result {
            // The transaction already rolled back its open segment; the next
            // schedule request retries the remainder.
            error!(
                subsystem = "engine",
                component = "scheduler",
                error = %e,
                "aggregation pass failed"
            );
        }
    }

    info!(
        subsystem = "engine",
        component = "scheduler",
        "aggregation scheduler stopped"
    );
}
