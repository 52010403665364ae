//! Infrastructure - configuration, metrics, and broker
//!
//! This module contains infrastructure concerns:
//! - `config` - Application configuration (JSON file, environment overlay)
//! - `metrics` - Lock-free relay and sampler counters
//! - `broker` - Optional embedded MQTT broker (rumqttd)

pub mod broker;
pub mod config;
pub mod metrics;

pub use config::Config;
pub use metrics::{MetricsSummary, RelayMetrics};
