//! Test doubles for the sensor and the outbound client

#![allow(dead_code)]

use async_trait::async_trait;
use edge_temp_relay::domain::{PublishError, RelayedMessage, SensorError};
use edge_temp_relay::io::{MessageSink, TemperatureSource};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// One publish attempt seen by the sink
#[derive(Debug, Clone)]
pub struct Attempt {
    pub output: String,
    pub message: RelayedMessage,
    pub at: Instant,
    pub accepted: bool,
}

/// Sink that records every attempt and fails the call numbers in `fail_on`
pub struct RecordingSink {
    attempts: Mutex<Vec<Attempt>>,
    fail_on: HashSet<usize>,
    notify: Option<mpsc::UnboundedSender<Attempt>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self { attempts: Mutex::new(Vec::new()), fail_on: HashSet::new(), notify: None }
    }

    /// Fail the given 0-based call numbers
    pub fn failing_on(mut self, calls: &[usize]) -> Self {
        self.fail_on = calls.iter().copied().collect();
        self
    }

    /// Stream attempts to the returned receiver as they happen
    pub fn with_notify(mut self) -> (Self, mpsc::UnboundedReceiver<Attempt>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.notify = Some(tx);
        (self, rx)
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send_event(&self, output: &str, message: RelayedMessage) -> Result<(), PublishError> {
        let attempt = {
            let mut attempts = self.attempts.lock();
            let accepted = !self.fail_on.contains(&attempts.len());
            let attempt =
                Attempt { output: output.to_string(), message, at: Instant::now(), accepted };
            attempts.push(attempt.clone());
            attempt
        };
        if let Some(tx) = &self.notify {
            let _ = tx.send(attempt.clone());
        }
        if attempt.accepted {
            Ok(())
        } else {
            Err(PublishError::Client { topic: output.to_string(), message: "broker unavailable".to_string() })
        }
    }
}

/// Sensor that replays scripted milli-degree lines; `None` entries fail
pub struct ScriptedSensor {
    readings: Mutex<VecDeque<Option<&'static str>>>,
    fallback: &'static str,
}

impl ScriptedSensor {
    pub fn new(readings: Vec<Option<&'static str>>, fallback: &'static str) -> Self {
        Self { readings: Mutex::new(readings.into()), fallback }
    }

    pub fn constant(line: &'static str) -> Self {
        Self::new(Vec::new(), line)
    }
}

#[async_trait]
impl TemperatureSource for ScriptedSensor {
    async fn read_celsius(&self) -> Result<f64, SensorError> {
        let next = self.readings.lock().pop_front().unwrap_or(Some(self.fallback));
        match next {
            Some(line) => edge_temp_relay::io::sensor::parse_millidegrees(line),
            None => Err(SensorError::Empty),
        }
    }
}

pub fn sample_number(message: &RelayedMessage) -> u64 {
    let value: serde_json::Value = serde_json::from_slice(&message.payload).unwrap();
    value["MessageNumber"].as_u64().unwrap()
}
