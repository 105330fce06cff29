// Session metrics module
//
// Lightweight counters for the processor, logged when the command loop exits

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Processor metrics
///
/// Uses atomic operations so the presentation thread can read counters
/// while the processor thread updates them, without locks.
#[derive(Debug)]
pub struct Metrics {
    /// Commands dequeued and executed
    pub commands_processed: AtomicU64,

    /// Events published to subscribers
    pub events_published: AtomicU64,

    /// Events published while nobody was subscribed
    pub events_unobserved: AtomicU64,

    /// Scans that produced an output file
    pub scans_completed: AtomicU64,

    /// Scans that failed in the external tool
    pub scans_failed: AtomicU64,

    /// Total time spent inside the external tool in milliseconds
    pub total_scan_time_ms: AtomicU64,

    /// Processor start time
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            commands_processed: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
            events_unobserved: AtomicU64::new(0),
            scans_completed: AtomicU64::new(0),
            scans_failed: AtomicU64::new(0),
            total_scan_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_command(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unobserved_event(&self) {
        self.events_unobserved.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished scan and the time the external tool took
    pub fn record_scan(&self, succeeded: bool, duration: Duration) {
        if succeeded {
            self.scans_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.scans_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.total_scan_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average time per scan attempt in milliseconds
    pub fn avg_scan_time_ms(&self) -> f64 {
        let total = self.total_scan_time_ms.load(Ordering::Relaxed);
        let count = self.scans_completed.load(Ordering::Relaxed)
            + self.scans_failed.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Scan Session Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Scans: {} completed, {} failed (avg: {:.0}ms per scan)",
            self.scans_completed.load(Ordering::Relaxed),
            self.scans_failed.load(Ordering::Relaxed),
            self.avg_scan_time_ms()
        );
        tracing::info!(
            "Commands: {}, events: {} ({} unobserved)",
            self.commands_processed.load(Ordering::Relaxed),
            self.events_published.load(Ordering::Relaxed),
            self.events_unobserved.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
