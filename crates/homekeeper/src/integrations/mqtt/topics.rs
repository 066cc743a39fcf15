//! Topic layout of Tasmota devices and of the home control topics.

pub const SEND_MESSAGE: &str = "send_message";
pub const TIMING_EVENT: &str = "timing_event";
pub const DEVICE_CONNECT_DISCONNECT: &str = "device_connect_disconnect";
pub const DEVICE_TOGGLE: &str = "device_toggle";
pub const DEVICE_UNFORCE: &str = "device_unforce";

/// Topics that do not depend on any device.
pub const CONTROL_TOPICS: [&str; 4] = [
    TIMING_EVENT,
    DEVICE_CONNECT_DISCONNECT,
    DEVICE_TOGGLE,
    DEVICE_UNFORCE,
];

/// `cmnd/<device>/Power`: on/off/toggle, or an empty payload to query.
pub fn power_command(device: &str) -> String {
    format!("cmnd/{}/Power", device)
}

/// `stat/<device>/RESULT`: command results, carrying `POWER`.
pub fn stat_result(device: &str) -> String {
    format!("stat/{}/RESULT", device)
}

/// `tele/<device>/SENSOR`: periodic telemetry.
pub fn sensor(device: &str) -> String {
    format!("tele/{}/SENSOR", device)
}

/// What an inbound topic refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundTopic<'a> {
    StatResult { device: &'a str },
    Sensor { device: &'a str },
    TimingEvent,
    Presence,
    DeviceToggle,
    DeviceUnforce,
}

/// Why a topic could not be classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicError {
    /// A device topic without exactly three segments or without a name
    Malformed,

    /// Not a topic this service listens to
    Unknown,
}

/// Classify an inbound topic.
///
/// Device topics must look like `<prefix>/<device>/<suffix>` with exactly
/// three segments and a non-empty device name.
pub fn parse_topic(topic: &str) -> Result<InboundTopic<'_>, TopicError> {
    match topic {
        TIMING_EVENT => return Ok(InboundTopic::TimingEvent),
        DEVICE_CONNECT_DISCONNECT => return Ok(InboundTopic::Presence),
        DEVICE_TOGGLE => return Ok(InboundTopic::DeviceToggle),
        DEVICE_UNFORCE => return Ok(InboundTopic::DeviceUnforce),
        _ => {}
    }

    let parts: Vec<&str> = topic.split('/').collect();
    let (prefix, suffix) = match parts.as_slice() {
        [prefix, .., suffix] => (*prefix, *suffix),
        _ => return Err(TopicError::Unknown),
    };

    let is_device_topic = matches!((prefix, suffix), ("stat", "RESULT") | ("tele", "SENSOR"));
    if !is_device_topic {
        return Err(TopicError::Unknown);
    }

    let device = match parts.as_slice() {
        [_, device, _] if !device.is_empty() => *device,
        _ => return Err(TopicError::Malformed),
    };

    Ok(match prefix {
        "stat" => InboundTopic::StatResult { device },
        _ => InboundTopic::Sensor { device },
    })
}
