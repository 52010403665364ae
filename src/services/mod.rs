//! Services - the two flows of the relay
//!
//! - `sampler` - periodic thermal zone sampling published on the output route
//! - `relay` - pass-through handler from the input route to the output route

pub mod relay;
pub mod sampler;

pub use relay::PipeHandler;
pub use sampler::{SamplerStats, TemperatureSampler};
