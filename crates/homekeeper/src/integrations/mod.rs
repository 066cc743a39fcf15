//! Adapters between the engine's ports and the outside world.

#[cfg(feature = "integration_mqtt")]
pub mod mqtt;
pub mod ping;
