//! Thermal zone temperature source
//!
//! The kernel exposes each thermal zone as a text file holding one line:
//! the temperature as an integer number of milli-degrees Celsius.

use crate::domain::SensorError;
use crate::infra::config::DEFAULT_SENSOR_PATH;
use async_trait::async_trait;
use std::path::PathBuf;

/// Something that yields the current temperature in degrees Celsius
#[async_trait]
pub trait TemperatureSource: Send + Sync {
    async fn read_celsius(&self) -> Result<f64, SensorError>;
}

/// Parse a milli-degree reading into degrees Celsius
///
/// Only the first line is considered. No range check is applied: negative
/// or implausible values are returned as-is.
pub fn parse_millidegrees(raw: &str) -> Result<f64, SensorError> {
    let line = raw.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        return Err(SensorError::Empty);
    }
    let millidegrees: i64 = line
        .parse()
        .map_err(|source| SensorError::Parse { raw: line.to_string(), source })?;
    Ok(millidegrees as f64 / 1000.0)
}

/// Sysfs thermal zone file, `/sys/class/thermal/thermal_zone0/temp` by default
#[derive(Debug, Clone)]
pub struct ThermalZone {
    path: PathBuf,
}

impl ThermalZone {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Default for ThermalZone {
    fn default() -> Self {
        Self::new(DEFAULT_SENSOR_PATH)
    }
}

#[async_trait]
impl TemperatureSource for ThermalZone {
    async fn read_celsius(&self) -> Result<f64, SensorError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|source| {
            SensorError::Io { path: self.path.display().to_string(), source }
        })?;
        parse_millidegrees(&raw)
    }
}
