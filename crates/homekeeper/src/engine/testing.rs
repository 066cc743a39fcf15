//! Test doubles for the engine's ports.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::integration::Actuator;
use super::integration::ReachabilityProbe;
use super::integration::TransportError;
use super::message::ActuationCommand;

/// Outbound call seen by a [`RecordingActuator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Command(String, ActuationCommand),
    StatsRequest(String),
}

#[derive(Debug, Default)]
pub struct RecordingActuator {
    sent: Mutex<Vec<Sent>>,
    fail: bool,
}

impl RecordingActuator {
    /// Actuator that records every call and then reports a transport error.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<(String, ActuationCommand)> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Command(name, command) => Some((name, command)),
                Sent::StatsRequest(_) => None,
            })
            .collect()
    }

    fn record(&self, sent: Sent) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(sent);
        if self.fail {
            Err(TransportError::NotConnected)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Actuator for RecordingActuator {
    async fn send_command(
        &self,
        device_name: &str,
        command: ActuationCommand,
    ) -> Result<(), TransportError> {
        self.record(Sent::Command(device_name.to_string(), command))
    }

    async fn request_stats(&self, device_name: &str) -> Result<(), TransportError> {
        self.record(Sent::StatsRequest(device_name.to_string()))
    }
}

/// Probe answering from a table; unknown addresses are unreachable.
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    reachable: Mutex<HashMap<String, bool>>,
    delay: Duration,
}

impl ScriptedProbe {
    /// Probe that takes `delay` to answer each address
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn set(&self, ip_address: &str, reachable: bool) {
        self.reachable
            .lock()
            .unwrap()
            .insert(ip_address.to_string(), reachable);
    }
}

#[async_trait]
impl ReachabilityProbe for ScriptedProbe {
    async fn is_reachable(&self, ip_address: &str) -> bool {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reachable
            .lock()
            .unwrap()
            .get(ip_address)
            .copied()
            .unwrap_or(false)
    }
}
