//! Type-safe message system for homekeeper
//!
//! Messages are split by direction:
//! - `InboundMessage`: decoded transport events handed to the engine
//! - `ActuationCommand`: commands the engine sends to a device

use super::event::DailyEvent;
use super::state::SensorStats;

/// Messages FROM the transport TO the engine
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// A device reported its relay state
    PowerStatus { device_name: String, on: bool },

    /// A device reported telemetry (energy counter, analog temperature)
    SensorStats {
        device_name: String,
        stats: SensorStats,
    },

    /// A mobile device joined or left the network
    Presence {
        mobile_device: String,
        connected: bool,
    },

    /// A time-of-day event published by an external source
    TimeEvent(DailyEvent),

    /// A user asked for a device to be switched
    DirectCommand { device_name: String, state: bool },

    /// A user released the forced state of a device
    ReleaseForced { device_name: String },
}

/// Power command sent to a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ActuationCommand {
    On,
    Off,
    Toggle,
}

impl From<bool> for ActuationCommand {
    fn from(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}
