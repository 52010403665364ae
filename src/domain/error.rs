//! Error types for sampling and relaying

use thiserror::Error;

/// Failure to obtain a temperature from the sensor file
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("failed to read sensor {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("sensor returned an empty reading")]
    Empty,

    #[error("invalid sensor reading {raw:?}: {source}")]
    Parse {
        raw: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Failure to hand a message to the outbound channel
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to publish to {topic}: {message}")]
    Client { topic: String, message: String },
}

/// Failure of a single sampler iteration
#[derive(Error, Debug)]
pub enum SampleError {
    #[error(transparent)]
    Sensor(#[from] SensorError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Unrecoverable relay failure
#[derive(Error, Debug)]
pub enum RelayError {
    /// The handler context does not hold a live outbound client
    #[error("handler context does not contain the expected outbound client")]
    InvalidContext,

    #[error("relay handler task failed: {0}")]
    Handler(String),
}
