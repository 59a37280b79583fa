//! Polls a device-location service for many accounts and republishes every
//! device position to an MQTT broker.

pub mod config;
pub mod errors;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod mqtt;
pub mod session;
pub mod supervisor;
pub mod telemetry;
pub mod tls;
pub mod transport;
pub mod worker;

pub use errors::{Error, Result};
