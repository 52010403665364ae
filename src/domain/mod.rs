//! Domain models - message types and error taxonomy
//!
//! - `TemperatureReading` - one sampler output, serialized as JSON
//! - `RelayedMessage` - payload plus metadata copied between channels
//! - `MessageResponse` - acknowledgement returned to the dispatcher
//! - error enums for sensor, publish, sample and relay failures

pub mod error;
pub mod types;

pub use error::{PublishError, RelayError, SampleError, SensorError};
pub use types::{MessageResponse, RelayedMessage, TemperatureReading};
