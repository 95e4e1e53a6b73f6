//! Periodic maintenance task owned by the host application

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::CacheManager;
use crate::config::schema::MaintenanceConfig;

/// Anything holding entries that expire
pub trait Sweepable: Send + Sync {
    /// Remove expired entries, returning how many were removed
    fn sweep_expired(&self) -> usize;
}

impl<V: Clone + Send> Sweepable for CacheManager<V> {
    fn sweep_expired(&self) -> usize {
        self.clear_expired()
    }
}

/// Callback run on every tick after the sweep
pub type MaintenanceCallback =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Counters shared between the service and its spawned task
#[derive(Clone)]
struct MaintenanceWorker {
    targets: Arc<Vec<Arc<dyn Sweepable>>>,
    on_tick: Option<MaintenanceCallback>,
    ticks: Arc<AtomicU64>,
    swept: Arc<AtomicU64>,
}

impl MaintenanceWorker {
    async fn tick(&self) -> usize {
        let swept: usize = self.targets.iter().map(|t| t.sweep_expired()).sum();
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.swept.fetch_add(swept as u64, Ordering::Relaxed);
        debug!("Maintenance tick: swept {} expired entries", swept);

        if let Some(callback) = &self.on_tick {
            (callback)().await;
        }
        swept
    }

    async fn run_loop(self, interval: Duration, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {
                    self.tick().await;
                }
            }
        }
        debug!("Maintenance loop stopped");
    }
}

/// Sweeps caches and runs a status hook on a fixed interval
///
/// The host decides when it runs: either `start` it once at startup, or call
/// `run_once` from its own scheduler.
pub struct MaintenanceService {
    config: MaintenanceConfig,
    worker: MaintenanceWorker,
    cancel: Mutex<Option<CancellationToken>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MaintenanceService {
    /// Create a service without targets
    pub fn new(config: MaintenanceConfig) -> Self {
        Self {
            config,
            worker: MaintenanceWorker {
                targets: Arc::new(Vec::new()),
                on_tick: None,
                ticks: Arc::new(AtomicU64::new(0)),
                swept: Arc::new(AtomicU64::new(0)),
            },
            cancel: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Add a cache (or other expiring store) to sweep on every tick
    pub fn with_target(mut self, target: Arc<dyn Sweepable>) -> Self {
        let mut targets: Vec<_> = self.worker.targets.iter().cloned().collect();
        targets.push(target);
        self.worker.targets = Arc::new(targets);
        self
    }

    /// Set the callback run after every sweep
    pub fn with_on_tick(mut self, callback: MaintenanceCallback) -> Self {
        self.worker.on_tick = Some(callback);
        self
    }

    /// Spawn the periodic task on the current tokio runtime
    pub fn start(&self) {
        if !self.config.enabled {
            info!("Maintenance disabled");
            return;
        }

        let mut cancel_guard = self.cancel.lock();
        if cancel_guard.is_some() {
            debug!("Maintenance service already running");
            return;
        }

        let cancel = CancellationToken::new();
        let interval = Duration::from_secs(self.config.interval_s);
        let task = tokio::spawn(self.worker.clone().run_loop(interval, cancel.clone()));

        *cancel_guard = Some(cancel);
        *self.task.lock() = Some(task);
        info!("Maintenance started (every {}s)", self.config.interval_s);
    }

    /// Cancel the periodic task and wait for it to finish
    pub async fn stop(&self) {
        if let Some(cancel) = self.cancel.lock().take() {
            cancel.cancel();
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
            info!("Maintenance stopped");
        }
    }

    /// Whether the periodic task is running
    pub fn is_running(&self) -> bool {
        self.cancel.lock().is_some()
    }

    /// Run one tick now, returning the number of swept entries
    pub async fn run_once(&self) -> usize {
        self.worker.tick().await
    }

    /// Get service status
    pub fn status(&self) -> serde_json::Value {
        serde_json::json!({
            "enabled": self.config.enabled,
            "running": self.is_running(),
            "interval_s": self.config.interval_s,
            "targets": self.worker.targets.len(),
            "has_callback": self.worker.on_tick.is_some(),
            "ticks": self.worker.ticks.load(Ordering::Relaxed),
            "swept_total": self.worker.swept.load(Ordering::Relaxed),
        })
    }
}
