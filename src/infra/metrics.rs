//! Lock-free relay and sampler counters
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are
//! statistical counters for log correlation only; nothing is decided
//! based on their values.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Counters shared by the relay handler tasks and the sampler
pub struct RelayMetrics {
    /// Inbound messages seen by the relay handler (monotonic)
    messages_received: AtomicU64,
    /// Inbound messages republished on the output channel (monotonic)
    messages_forwarded: AtomicU64,
    /// Inbound messages with an empty payload (monotonic)
    messages_skipped: AtomicU64,
    /// Relay publish failures (monotonic)
    relay_failures: AtomicU64,
    /// Samples published (monotonic)
    samples_sent: AtomicU64,
    /// Sampler iterations that failed to read or publish (monotonic)
    sample_failures: AtomicU64,
    /// Values at the previous report, for per-period deltas
    last_received: AtomicU64,
    last_samples: AtomicU64,
    last_report_time: Mutex<Instant>,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            messages_forwarded: AtomicU64::new(0),
            messages_skipped: AtomicU64::new(0),
            relay_failures: AtomicU64::new(0),
            samples_sent: AtomicU64::new(0),
            sample_failures: AtomicU64::new(0),
            last_received: AtomicU64::new(0),
            last_samples: AtomicU64::new(0),
            last_report_time: Mutex::new(Instant::now()),
        }
    }

    /// Count an inbound message and return its 1-based sequence value
    #[inline]
    pub fn record_message_received(&self) -> u64 {
        self.messages_received.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[inline]
    pub fn record_message_forwarded(&self) {
        self.messages_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_message_skipped(&self) {
        self.messages_skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_relay_failure(&self) {
        self.relay_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sample_sent(&self) {
        self.samples_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sample_failure(&self) {
        self.sample_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn messages_forwarded(&self) -> u64 {
        self.messages_forwarded.load(Ordering::Relaxed)
    }

    pub fn messages_skipped(&self) -> u64 {
        self.messages_skipped.load(Ordering::Relaxed)
    }

    pub fn relay_failures(&self) -> u64 {
        self.relay_failures.load(Ordering::Relaxed)
    }

    pub fn samples_sent(&self) -> u64 {
        self.samples_sent.load(Ordering::Relaxed)
    }

    pub fn sample_failures(&self) -> u64 {
        self.sample_failures.load(Ordering::Relaxed)
    }

    /// Snapshot totals and per-period rates since the previous report
    pub fn report(&self) -> MetricsSummary {
        let received = self.messages_received();
        let samples = self.samples_sent();
        let received_delta = received - self.last_received.swap(received, Ordering::Relaxed);
        let samples_delta = samples - self.last_samples.swap(samples, Ordering::Relaxed);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };
        let secs = elapsed.as_secs_f64();
        let per_sec = |count: u64| if secs > 0.0 { count as f64 / secs } else { 0.0 };

        MetricsSummary {
            messages_received: received,
            messages_forwarded: self.messages_forwarded(),
            messages_skipped: self.messages_skipped(),
            relay_failures: self.relay_failures(),
            samples_sent: samples,
            sample_failures: self.sample_failures(),
            messages_per_sec: per_sec(received_delta),
            samples_per_sec: per_sec(samples_delta),
        }
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub messages_received: u64,
    pub messages_forwarded: u64,
    pub messages_skipped: u64,
    pub relay_failures: u64,
    pub samples_sent: u64,
    pub sample_failures: u64,
    pub messages_per_sec: f64,
    pub samples_per_sec: f64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            received = %self.messages_received,
            forwarded = %self.messages_forwarded,
            skipped = %self.messages_skipped,
            relay_failures = %self.relay_failures,
            samples_sent = %self.samples_sent,
            sample_failures = %self.sample_failures,
            messages_per_sec = format!("{:.2}", self.messages_per_sec),
            samples_per_sec = format!("{:.2}", self.samples_per_sec),
            "metrics"
        );
    }
}
