//! IO modules - external system interfaces
//!
//! - `mqtt` - MQTT v5 module client (outbound publish, inbound dispatch)
//! - `sensor` - Thermal zone file reader

pub mod mqtt;
pub mod sensor;

pub use mqtt::{DispatchStats, Dispatcher, HandlerContext, InputMessageHandler, MessageSink, ModuleClient};
pub use sensor::{TemperatureSource, ThermalZone};
