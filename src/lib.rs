//! Bridge utility-meter radio readings to MQTT
//!
//! An external rtlamr process decodes the radio traffic and prints one JSON
//! record per reading; this crate normalizes those records, tracks which
//! meters were already announced and publishes Home Assistant discovery and
//! state messages.

pub mod config;
pub mod metering_amr;
pub mod models;
pub mod mqtt;

// Re-export common types for easier access
pub use config::{ConfigBases, CONFIG};
pub use metering_amr::AmrManager;
pub use models::{MeterProtocol, MeterType, MeterUnit, Reading};
pub use mqtt::{MqttManager, PublishData, Transmission};
