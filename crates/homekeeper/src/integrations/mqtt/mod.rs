mod client;
// Private module - allowed by clippy.toml allow-private-module-inception
#[allow(clippy::module_inception)]
mod mqtt;
mod payload;
pub mod topics;

pub use client::MqttClient;
pub use client::MqttMessage;
pub use client::MqttReceiver;
pub use client::RumqttcClient;
pub use mqtt::MqttTransport;
pub use payload::PayloadError;
pub use payload::decode;
