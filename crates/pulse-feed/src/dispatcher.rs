//! Fan-in dispatcher: owns the workers, the MPSC ring and the health loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{error, info, warn};

use pulse_ingest::{TcpSource, Transport, TransportError};
use pulse_proto::FeedSlot;
use pulse_ring::MpscRing;

use crate::config::{ConfigError, MultiFeedConfig};
use crate::monitor::FeedMonitor;
use crate::worker::FeedWorker;

/// Coordinates one worker per configured feed behind a shared fan-in ring.
///
/// A health thread wakes every `health_check_interval_ms`, runs the state
/// machine on every monitor, and promotes the first healthy backup when no
/// primary is healthy. Promotion is advisory: it marks the monitor and
/// logs, it does not reroute traffic.
pub struct FanInDispatcher {
    config: MultiFeedConfig,
    fan_in: Arc<MpscRing<FeedSlot>>,
    workers: Vec<FeedWorker>,
    stop: Arc<AtomicBool>,
    health_thread: Option<JoinHandle<()>>,
}

impl FanInDispatcher {
    /// Validate the configuration and build the fan-in ring.
    pub fn new(config: MultiFeedConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let fan_in = Arc::new(
            MpscRing::with_capacity(config.global_buffer_capacity).map_err(|_| {
                ConfigError::InvalidCapacity {
                    name: "global".to_string(),
                    capacity: config.global_buffer_capacity,
                }
            })?,
        );

        Ok(Self {
            config,
            fan_in,
            workers: Vec::new(),
            stop: Arc::new(AtomicBool::new(false)),
            health_thread: None,
        })
    }

    /// Start every worker over TCP and the health loop.
    pub fn start(&mut self) {
        self.start_with(|feed| TcpSource::new(&feed.host, feed.port));
    }

    /// Start with a custom transport per feed.
    ///
    /// A feed whose transport cannot be built is skipped with an error; the
    /// dispatcher continues with the remaining feeds.
    pub fn start_with<T, F>(&mut self, mut make_transport: F)
    where
        T: Transport + 'static,
        F: FnMut(&crate::FeedConfig) -> Result<T, TransportError>,
    {
        self.stop.store(false, Ordering::Release);

        for feed in &self.config.feeds {
            let transport = match make_transport(feed) {
                Ok(transport) => transport,
                Err(err) => {
                    error!("feed {}: transport init failed, skipping: {err}", feed.name);
                    continue;
                }
            };

            match FeedWorker::spawn(feed.clone(), transport, Arc::clone(&self.fan_in)) {
                Ok(worker) => self.workers.push(worker),
                Err(err) => {
                    error!("feed {}: worker start failed, skipping: {err}", feed.name);
                }
            }
        }

        let monitors: Vec<Arc<FeedMonitor>> = self
            .workers
            .iter()
            .map(|w| Arc::clone(w.monitor()))
            .collect();
        let stop = Arc::clone(&self.stop);
        let interval = Duration::from_millis(self.config.health_check_interval_ms);

        self.health_thread = std::thread::Builder::new()
            .name("pulse-health".into())
            .spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    for monitor in &monitors {
                        monitor.check_health();
                    }
                    promote_backups(&monitors);
                    std::thread::sleep(interval);
                }
            })
            .map_err(|err| error!("health thread failed to start: {err}"))
            .ok();

        info!("started {} feed workers", self.workers.len());
    }

    /// Consumer interface: pop the next slot from the fan-in ring.
    #[inline]
    pub fn try_consume(&self) -> Option<FeedSlot> {
        self.fan_in.try_pop()
    }

    /// Stop workers and the health loop; called automatically on drop.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        for worker in &mut self.workers {
            worker.stop();
        }
        if let Some(handle) = self.health_thread.take() {
            let _ = handle.join();
        }
    }

    /// `true` while at least one worker thread is alive.
    pub fn any_worker_running(&self) -> bool {
        self.workers.iter().any(|w| w.is_running())
    }

    pub fn workers(&self) -> &[FeedWorker] {
        &self.workers
    }

    pub fn fan_in(&self) -> &Arc<MpscRing<FeedSlot>> {
        &self.fan_in
    }

    /// Sum of messages forwarded by all feeds.
    pub fn total_messages_received(&self) -> u64 {
        self.workers
            .iter()
            .map(|w| w.monitor().messages_received())
            .sum()
    }

    /// Log one status line per feed plus fan-in occupancy.
    pub fn log_health_summary(&self) {
        info!("=== feed health summary ===");
        for worker in &self.workers {
            worker.monitor().log_status();
        }
        info!(
            "fan-in ring: {}/{} (hwm {})",
            self.fan_in.size(),
            self.fan_in.capacity(),
            self.fan_in.high_water_mark(),
        );
    }
}

impl Drop for FanInDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// If no acting primary is healthy, promote the first healthy backup.
fn promote_backups(monitors: &[Arc<FeedMonitor>]) {
    let primary_healthy = monitors
        .iter()
        .any(|m| m.is_acting_primary() && m.is_healthy());
    if primary_healthy {
        return;
    }

    if let Some(backup) = monitors
        .iter()
        .find(|m| !m.is_acting_primary() && m.is_healthy())
    {
        backup.promote();
        warn!(
            "no healthy primary; promoting backup feed {} to primary",
            backup.config().name
        );
    }
}
