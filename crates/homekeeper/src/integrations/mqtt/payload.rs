//! Decoding of inbound MQTT messages into engine messages.

use serde::Deserialize;

use super::topics::InboundTopic;
use super::topics::TopicError;
use super::topics::parse_topic;
use crate::engine::DailyEvent;
use crate::engine::InboundMessage;
use crate::engine::SensorStats;

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("malformed topic: {0}")]
    MalformedTopic(String),

    #[error("unexpected topic: {0}")]
    UnknownTopic(String),

    #[error("payload is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid power state: {0}")]
    InvalidPowerState(String),

    #[error("invalid event type: {0}")]
    UnknownEvent(String),
}

/// `stat/<device>/RESULT`
#[derive(Debug, Deserialize)]
struct StatResult {
    #[serde(rename = "POWER")]
    power: String,
}

/// `tele/<device>/SENSOR`
#[derive(Debug, Deserialize)]
struct SensorReport {
    #[serde(rename = "ENERGY")]
    energy: Energy,

    #[serde(rename = "ANALOG", default)]
    analog: Option<Analog>,
}

#[derive(Debug, Deserialize)]
struct Energy {
    #[serde(rename = "Total")]
    total: f64,
}

#[derive(Debug, Deserialize)]
struct Analog {
    #[serde(rename = "Temperature", default)]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PresenceChange {
    mobile_device: String,
    state: bool,
}

#[derive(Debug, Deserialize)]
struct DeviceToggle {
    device_name: String,
    state: bool,
}

#[derive(Debug, Deserialize)]
struct DeviceUnforce {
    device_name: String,
}

/// Decode one message received on `topic`.
pub fn decode(topic: &str, payload: &[u8]) -> Result<InboundMessage, PayloadError> {
    let kind = parse_topic(topic).map_err(|e| match e {
        TopicError::Malformed => PayloadError::MalformedTopic(topic.to_string()),
        TopicError::Unknown => PayloadError::UnknownTopic(topic.to_string()),
    })?;

    Ok(match kind {
        InboundTopic::StatResult { device } => {
            let result: StatResult = serde_json::from_slice(payload)?;
            let on = match result.power.as_str() {
                "ON" => true,
                "OFF" => false,
                other => return Err(PayloadError::InvalidPowerState(other.to_string())),
            };
            InboundMessage::PowerStatus {
                device_name: device.to_string(),
                on,
            }
        }
        InboundTopic::Sensor { device } => {
            let report: SensorReport = serde_json::from_slice(payload)?;
            InboundMessage::SensorStats {
                device_name: device.to_string(),
                stats: SensorStats {
                    temperature: report.analog.and_then(|a| a.temperature),
                    total_energy: Some(report.energy.total),
                },
            }
        }
        InboundTopic::TimingEvent => InboundMessage::TimeEvent(decode_event(payload)?),
        InboundTopic::Presence => {
            let change: PresenceChange = serde_json::from_slice(payload)?;
            InboundMessage::Presence {
                mobile_device: change.mobile_device,
                connected: change.state,
            }
        }
        InboundTopic::DeviceToggle => {
            let toggle: DeviceToggle = serde_json::from_slice(payload)?;
            InboundMessage::DirectCommand {
                device_name: toggle.device_name,
                state: toggle.state,
            }
        }
        InboundTopic::DeviceUnforce => {
            let unforce: DeviceUnforce = serde_json::from_slice(payload)?;
            InboundMessage::ReleaseForced {
                device_name: unforce.device_name,
            }
        }
    })
}

/// The event name may arrive bare (`sunset_time`) or as a JSON string.
fn decode_event(payload: &[u8]) -> Result<DailyEvent, PayloadError> {
    let text = std::str::from_utf8(payload)?.trim();
    let name = if text.starts_with('"') {
        serde_json::from_str::<String>(text)?
    } else {
        text.to_string()
    };

    name.parse().map_err(|_| PayloadError::UnknownEvent(name))
}
