//! Periodic thermal zone sampler
//!
//! Each iteration reads the sensor, publishes one `TemperatureReading` as
//! JSON on the output route, then sleeps for the configured delay. Any
//! failure is logged and the loop moves on; the sequence number advances
//! on every iteration whether or not the sample made it out.

use crate::domain::{PublishError, RelayedMessage, SampleError, TemperatureReading};
use crate::infra::metrics::RelayMetrics;
use crate::io::mqtt::MessageSink;
use crate::io::sensor::TemperatureSource;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Outcome of a sampler run, returned on shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub iterations: u64,
    pub sent: u64,
    pub failed: u64,
}

pub struct TemperatureSampler {
    source: Arc<dyn TemperatureSource>,
    sink: Arc<dyn MessageSink>,
    output: String,
    delay: Duration,
    metrics: Arc<RelayMetrics>,
}

impl TemperatureSampler {
    pub fn new(
        source: Arc<dyn TemperatureSource>,
        sink: Arc<dyn MessageSink>,
        output: impl Into<String>,
        delay: Duration,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self { source, sink, output: output.into(), delay, metrics }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// One iteration without the trailing sleep
    pub async fn sample_once(&self, sequence: u64) -> Result<TemperatureReading, SampleError> {
        let temperature = self.source.read_celsius().await?;
        let reading = TemperatureReading::new(sequence, temperature);
        let body = reading.to_json().map_err(PublishError::from)?;

        info!(sequence = %sequence, body = %body, "sample_sending");

        self.sink.send_event(&self.output, RelayedMessage::new(body)).await?;
        Ok(reading)
    }

    /// Sample until the shutdown flag is set
    ///
    /// Shutdown is observed at iteration boundaries, during the sleep and
    /// while an iteration is blocked on the sensor or the publish.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> SamplerStats {
        info!(delay_ms = %self.delay.as_millis(), output = %self.output, "sampler_started");

        let mut stats = SamplerStats::default();
        let mut sequence: u64 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                result = self.sample_once(sequence) => {
                    match result {
                        Ok(_) => {
                            stats.sent += 1;
                            self.metrics.record_sample_sent();
                        }
                        Err(e) => {
                            stats.failed += 1;
                            self.metrics.record_sample_failure();
                            error!(sequence = %sequence, error = %e, "sample_failed");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }

            stats.iterations += 1;
            sequence += 1;

            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(
            iterations = %stats.iterations,
            sent = %stats.sent,
            failed = %stats.failed,
            "sampler_stopped"
        );
        stats
    }
}
