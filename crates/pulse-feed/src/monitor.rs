//! Per-feed health state machine and gap tracking.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use tracing::info;

use pulse_proto::Message;
use pulse_stats::clock;

use crate::config::FeedConfig;

/// Feed health states.
///
/// `Healthy -> Degraded` after two missed heartbeats, `-> Dead` after
/// `heartbeat * timeout_multiplier` of silence; any state goes to `Failed`
/// on a transport connection failure, and a `Dead` feed that speaks again
/// recovers to `Healthy`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FeedStatus {
    Connecting = 0,
    Healthy = 1,
    Degraded = 2,
    Dead = 3,
    Failed = 4,
}

impl FeedStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => FeedStatus::Connecting,
            1 => FeedStatus::Healthy,
            2 => FeedStatus::Degraded,
            3 => FeedStatus::Dead,
            _ => FeedStatus::Failed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeedStatus::Connecting => "CONNECTING",
            FeedStatus::Healthy => "HEALTHY",
            FeedStatus::Degraded => "DEGRADED",
            FeedStatus::Dead => "DEAD",
            FeedStatus::Failed => "FAILED",
        }
    }
}

/// Health and statistics for one feed.
///
/// The status is a single atomic; counters are relaxed. Gap bookkeeping is
/// written only by the worker thread that owns the feed; `check_health` is
/// called from the dispatcher's health thread.
pub struct FeedMonitor {
    config: FeedConfig,
    status: AtomicU8,
    messages_received: AtomicU64,
    bytes_received: AtomicU64,
    sequence_gaps: AtomicU64,
    last_seq: AtomicU64,
    last_message_ns: AtomicU64,
    forward_drops: AtomicU64,
    first_seen: AtomicBool,
    expected_seq: AtomicU64,
    promoted: AtomicBool,
}

impl FeedMonitor {
    pub fn new(config: FeedConfig) -> Self {
        Self {
            config,
            status: AtomicU8::new(FeedStatus::Connecting as u8),
            messages_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            sequence_gaps: AtomicU64::new(0),
            last_seq: AtomicU64::new(0),
            last_message_ns: AtomicU64::new(clock::now_ns()),
            forward_drops: AtomicU64::new(0),
            first_seen: AtomicBool::new(false),
            expected_seq: AtomicU64::new(0),
            promoted: AtomicBool::new(false),
        }
    }

    /// Record one forwarded message: counters, per-feed gap tracking, and
    /// liveness. Worker thread only.
    pub fn record_message(&self, msg: &Message, bytes: u64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
        self.last_message_ns.store(clock::now_ns(), Ordering::Release);

        let seq = msg.seq;
        if !self.first_seen.load(Ordering::Relaxed) {
            self.first_seen.store(true, Ordering::Relaxed);
        } else if seq != self.expected_seq.load(Ordering::Relaxed) {
            self.sequence_gaps.fetch_add(1, Ordering::Relaxed);
        }
        self.expected_seq.store(seq + 1, Ordering::Relaxed);
        self.last_seq.store(seq, Ordering::Relaxed);

        // A connecting feed becomes healthy on first data; a dead feed that
        // speaks again recovers.
        match self.status() {
            FeedStatus::Connecting | FeedStatus::Dead => {
                self.set_status(FeedStatus::Healthy);
            }
            _ => {}
        }
    }

    pub fn record_connection_established(&self) {
        self.set_status(FeedStatus::Healthy);
    }

    pub fn record_connection_failed(&self) {
        self.set_status(FeedStatus::Failed);
    }

    /// Count a message lost because the fan-in ring rejected the push.
    pub fn record_forward_drop(&self) {
        self.forward_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Run the liveness checks against the shared clock.
    pub fn check_health(&self) {
        self.check_health_at(clock::now_ns());
    }

    /// Run the liveness checks against an explicit timestamp.
    pub fn check_health_at(&self, now_ns: u64) {
        let status = self.status();
        if !matches!(status, FeedStatus::Healthy | FeedStatus::Degraded) {
            return;
        }

        let silence_ns = now_ns.saturating_sub(self.last_message_ns.load(Ordering::Acquire));
        let heartbeat_ns = self.config.heartbeat_ms * 1_000_000;
        let dead_ns = heartbeat_ns * self.config.timeout_multiplier as u64;

        if silence_ns > dead_ns {
            self.set_status(FeedStatus::Dead);
        } else if silence_ns > 2 * heartbeat_ns {
            self.set_status(FeedStatus::Degraded);
        }
    }

    pub fn status(&self) -> FeedStatus {
        FeedStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: FeedStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status(), FeedStatus::Healthy | FeedStatus::Degraded)
    }

    pub fn is_dead(&self) -> bool {
        matches!(self.status(), FeedStatus::Dead | FeedStatus::Failed)
    }

    /// Advisory promotion: mark this backup as acting primary.
    pub fn promote(&self) {
        self.promoted.store(true, Ordering::Release);
    }

    /// Configured primary, or a backup promoted during this run.
    pub fn is_acting_primary(&self) -> bool {
        self.config.is_primary || self.promoted.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn sequence_gaps(&self) -> u64 {
        self.sequence_gaps.load(Ordering::Relaxed)
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq.load(Ordering::Relaxed)
    }

    pub fn forward_drops(&self) -> u64 {
        self.forward_drops.load(Ordering::Relaxed)
    }

    /// One status line for the health summary.
    pub fn log_status(&self) {
        info!(
            "feed {} [{}:{}] status {} | msgs {} | gaps {} | fwd-drops {} | last seq {}",
            self.config.name,
            self.config.host,
            self.config.port,
            self.status().as_str(),
            self.messages_received(),
            self.sequence_gaps(),
            self.forward_drops(),
            self.last_seq(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> FeedMonitor {
        // heartbeat 1000ms, multiplier 3: degraded beyond 2s, dead beyond 3s.
        FeedMonitor::new(FeedConfig::new("test", "127.0.0.1", 9001, 0))
    }

    fn msg(seq: u64) -> Message {
        Message::new(seq, 10.0, 1)
    }

    const MS: u64 = 1_000_000;

    #[test]
    fn test_connecting_to_healthy_on_connect() {
        let m = monitor();
        assert_eq!(m.status(), FeedStatus::Connecting);
        m.record_connection_established();
        assert_eq!(m.status(), FeedStatus::Healthy);
    }

    #[test]
    fn test_connecting_to_healthy_on_first_message() {
        let m = monitor();
        m.record_message(&msg(1), 20);
        assert_eq!(m.status(), FeedStatus::Healthy);
        assert!(m.is_healthy());
    }

    #[test]
    fn test_healthy_to_degraded_to_dead_on_silence() {
        let m = monitor();
        m.record_message(&msg(1), 20);
        let base = m.last_message_ns.load(Ordering::Relaxed);

        // Within two heartbeats: still healthy.
        m.check_health_at(base + 1500 * MS);
        assert_eq!(m.status(), FeedStatus::Healthy);

        // Past two heartbeats: degraded (still counts as healthy).
        m.check_health_at(base + 2500 * MS);
        assert_eq!(m.status(), FeedStatus::Degraded);
        assert!(m.is_healthy());

        // Past heartbeat * multiplier: dead.
        m.check_health_at(base + 3500 * MS);
        assert_eq!(m.status(), FeedStatus::Dead);
        assert!(m.is_dead());
    }

    #[test]
    fn test_dead_recovers_on_message() {
        let m = monitor();
        m.record_message(&msg(1), 20);
        let base = m.last_message_ns.load(Ordering::Relaxed);
        m.check_health_at(base + 10_000 * MS);
        assert_eq!(m.status(), FeedStatus::Dead);

        m.record_message(&msg(2), 20);
        assert_eq!(m.status(), FeedStatus::Healthy);
    }

    #[test]
    fn test_failed_is_terminal_for_health_checks() {
        let m = monitor();
        m.record_connection_failed();
        assert_eq!(m.status(), FeedStatus::Failed);
        assert!(m.is_dead());

        // Silence checks do not touch a failed feed.
        m.check_health_at(u64::MAX / 2);
        assert_eq!(m.status(), FeedStatus::Failed);
    }

    #[test]
    fn test_per_feed_gap_tracking() {
        let m = monitor();
        for seq in [10, 11, 13] {
            m.record_message(&msg(seq), 20);
        }
        assert_eq!(m.sequence_gaps(), 1);
        assert_eq!(m.last_seq(), 13);
        assert_eq!(m.messages_received(), 3);
        assert_eq!(m.bytes_received(), 60);
    }

    #[test]
    fn test_promotion_is_sticky() {
        let mut config = FeedConfig::new("backup", "127.0.0.1", 9002, 1);
        config.is_primary = false;
        let m = FeedMonitor::new(config);

        assert!(!m.is_acting_primary());
        m.promote();
        assert!(m.is_acting_primary());
    }
}
