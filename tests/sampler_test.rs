//! Sampler loop tests on a paused tokio clock

mod common;

use async_trait::async_trait;
use common::{sample_number, RecordingSink, ScriptedSensor};
use edge_temp_relay::domain::{PublishError, RelayedMessage};
use edge_temp_relay::infra::{Config, RelayMetrics};
use edge_temp_relay::io::{MessageSink, ThermalZone};
use edge_temp_relay::services::{SamplerStats, TemperatureSampler};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::sync::watch;

fn sampler(
    sensor: ScriptedSensor,
    sink: Arc<RecordingSink>,
    delay: Duration,
    metrics: Arc<RelayMetrics>,
) -> TemperatureSampler {
    TemperatureSampler::new(Arc::new(sensor), sink, "output1", delay, metrics)
}

#[tokio::test]
async fn test_sample_from_thermal_zone_file() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"45678\n").unwrap();
    file.flush().unwrap();

    let sink = Arc::new(RecordingSink::new());
    let sampler = TemperatureSampler::new(
        Arc::new(ThermalZone::new(file.path())),
        sink.clone(),
        "output1",
        Duration::from_millis(5000),
        Arc::new(RelayMetrics::new()),
    );

    let reading = sampler.sample_once(4).await.unwrap();
    assert_eq!(reading.message_number, 4);
    assert_eq!(reading.thermal_zone0_temp, 45.678);

    let attempts = sink.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].output, "output1");
    assert_eq!(&attempts[0].message.payload[..], br#"{"MessageNumber":4,"ThermalZone0Temp":45.678}"#);
    assert!(attempts[0].message.properties.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_default_delay_between_iterations() {
    let (sink, mut rx) = RecordingSink::new().with_notify();
    let sink = Arc::new(sink);
    let delay = Config::default().delay();
    assert_eq!(delay, Duration::from_millis(5000));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sampler = sampler(ScriptedSensor::constant("50000"), sink, delay, Arc::new(RelayMetrics::new()));
    let handle = tokio::spawn(sampler.run(shutdown_rx));

    let mut times = Vec::new();
    for _ in 0..3 {
        times.push(rx.recv().await.unwrap().at);
    }

    assert_eq!(times[1] - times[0], Duration::from_millis(5000));
    assert_eq!(times[2] - times[1], Duration::from_millis(5000));

    shutdown_tx.send(true).unwrap();
    let stats = handle.await.unwrap();
    assert_eq!(stats, SamplerStats { iterations: 3, sent: 3, failed: 0 });
}

#[tokio::test(start_paused = true)]
async fn test_sequence_advances_when_publish_fails() {
    let (sink, mut rx) = RecordingSink::new().failing_on(&[1]).with_notify();
    let sink = Arc::new(sink);
    let metrics = Arc::new(RelayMetrics::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sampler = sampler(
        ScriptedSensor::constant("45000"),
        sink.clone(),
        Duration::from_millis(100),
        metrics.clone(),
    );
    let handle = tokio::spawn(sampler.run(shutdown_rx));

    let mut attempts = Vec::new();
    for _ in 0..4 {
        attempts.push(rx.recv().await.unwrap());
    }

    let numbers: Vec<u64> = attempts.iter().map(|a| sample_number(&a.message)).collect();
    assert_eq!(numbers, vec![0, 1, 2, 3]);
    let accepted: Vec<bool> = attempts.iter().map(|a| a.accepted).collect();
    assert_eq!(accepted, vec![true, false, true, true]);

    shutdown_tx.send(true).unwrap();
    let stats = handle.await.unwrap();
    assert_eq!(stats, SamplerStats { iterations: 4, sent: 3, failed: 1 });
    assert_eq!(metrics.samples_sent(), 3);
    assert_eq!(metrics.sample_failures(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sequence_advances_when_sensor_fails() {
    let (sink, mut rx) = RecordingSink::new().with_notify();
    let sensor = ScriptedSensor::new(vec![Some("40000"), None, Some("41000")], "42000");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sampler = sampler(sensor, Arc::new(sink), Duration::from_millis(100), Arc::new(RelayMetrics::new()));
    let handle = tokio::spawn(sampler.run(shutdown_rx));

    let mut payloads = Vec::new();
    for _ in 0..3 {
        let attempt = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&attempt.message.payload).unwrap();
        payloads.push((value["MessageNumber"].as_u64().unwrap(), value["ThermalZone0Temp"].as_f64().unwrap()));
    }

    assert_eq!(payloads, vec![(0, 40.0), (2, 41.0), (3, 42.0)]);

    shutdown_tx.send(true).unwrap();
    let stats = handle.await.unwrap();
    assert_eq!(stats, SamplerStats { iterations: 4, sent: 3, failed: 1 });
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_before_first_iteration() {
    let sink = Arc::new(RecordingSink::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    shutdown_tx.send(true).unwrap();

    let sampler = sampler(
        ScriptedSensor::constant("45000"),
        sink.clone(),
        Duration::from_millis(5000),
        Arc::new(RelayMetrics::new()),
    );
    let stats = sampler.run(shutdown_rx).await;

    assert_eq!(stats, SamplerStats::default());
    assert!(sink.attempts().is_empty());
}

/// Sink whose publish never completes, like an unreachable broker
struct StalledSink;

#[async_trait]
impl MessageSink for StalledSink {
    async fn send_event(&self, _output: &str, _message: RelayedMessage) -> Result<(), PublishError> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_while_publish_stalled() {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sampler = TemperatureSampler::new(
        Arc::new(ScriptedSensor::constant("45000")),
        Arc::new(StalledSink),
        "output1",
        Duration::from_millis(5000),
        Arc::new(RelayMetrics::new()),
    );
    let handle = tokio::spawn(sampler.run(shutdown_rx));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(!handle.is_finished());

    shutdown_tx.send(true).unwrap();
    let stats = handle.await.unwrap();
    assert_eq!(stats, SamplerStats::default());
}
