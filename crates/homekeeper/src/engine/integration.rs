use async_trait::async_trait;

use super::message::ActuationCommand;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport not connected")]
    NotConnected,

    #[error("transport client error: {0}")]
    Client(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Outbound side of the transport, as seen by the engine
///
/// The MQTT integration implements this; tests use a recording fake.
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Send a power command to a device
    async fn send_command(
        &self,
        device_name: &str,
        command: ActuationCommand,
    ) -> Result<(), TransportError>;

    /// Ask a device to report its current status and telemetry
    async fn request_stats(&self, device_name: &str) -> Result<(), TransportError>;
}

/// Probe telling whether a network address currently answers
///
/// A failed probe is a valid `false` sample, never an error.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn is_reachable(&self, ip_address: &str) -> bool;
}
