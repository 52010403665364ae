//! Message types shared by the sampler and the relay

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One temperature sample as published on the output channel
///
/// Field names match the JSON body consumed upstream:
/// `{"MessageNumber": 3, "ThermalZone0Temp": 45.678}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReading {
    #[serde(rename = "MessageNumber")]
    pub message_number: u64,
    /// Degrees Celsius, not range-checked
    #[serde(rename = "ThermalZone0Temp")]
    pub thermal_zone0_temp: f64,
}

impl TemperatureReading {
    pub fn new(message_number: u64, thermal_zone0_temp: f64) -> Self {
        Self { message_number, thermal_zone0_temp }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Opaque payload plus ordered string metadata (MQTT v5 user properties)
///
/// `Clone` yields an independent copy: `Bytes` is immutable and the
/// property list is duplicated, so nothing done to a copy is visible
/// through the original.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayedMessage {
    pub payload: Bytes,
    pub properties: Vec<(String, String)>,
}

impl RelayedMessage {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self { payload: payload.into(), properties: Vec::new() }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push((key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Payload decoded for logging; invalid UTF-8 is replaced, not rejected
    pub fn body_lossy(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

/// Acknowledgement returned to the dispatcher for an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageResponse {
    /// Processed; the broker must not redeliver
    Completed,
    /// Not processed; left unacknowledged for redelivery
    Abandoned,
}
