use serde::Deserialize;
use serde::Serialize;

/// Time-of-day events that change the environment of every device.
///
/// The string form is the wire name used both in stored schedules and on the
/// `timing_event` topic.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
pub enum DailyEvent {
    #[serde(rename = "sunrise_time")]
    #[strum(serialize = "sunrise_time")]
    Sunrise,

    #[serde(rename = "sunset_time")]
    #[strum(serialize = "sunset_time")]
    Sunset,

    #[serde(rename = "wakeup_time")]
    #[strum(serialize = "wakeup_time")]
    WakeupTime,

    #[serde(rename = "bed_time")]
    #[strum(serialize = "bed_time")]
    BedTime,

    #[serde(rename = "custom_time_on")]
    #[strum(serialize = "custom_time_on")]
    CustomOn,

    #[serde(rename = "custom_time_off")]
    #[strum(serialize = "custom_time_off")]
    CustomOff,

    #[serde(rename = "custom_time_toggle")]
    #[strum(serialize = "custom_time_toggle")]
    CustomToggle,
}

/// A schedule document exactly as stored.
///
/// The event type stays a plain string here; records are validated when the
/// scheduler turns them into [`ScheduledTrigger`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    #[serde(rename = "type")]
    pub event_type: String,
    pub hour: u32,
    pub minute: u32,
}

/// A validated daily trigger firing at `hour:minute` local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTrigger {
    pub event: DailyEvent,
    pub hour: u32,
    pub minute: u32,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid event type: {0}")]
    UnknownEvent(String),

    #[error("invalid time of day {hour:02}:{minute:02}")]
    InvalidTime { hour: u32, minute: u32 },
}

impl TryFrom<&ScheduleRecord> for ScheduledTrigger {
    type Error = ScheduleError;

    fn try_from(record: &ScheduleRecord) -> Result<Self, Self::Error> {
        let event = record
            .event_type
            .parse::<DailyEvent>()
            .map_err(|_| ScheduleError::UnknownEvent(record.event_type.clone()))?;

        if record.hour > 23 || record.minute > 59 {
            return Err(ScheduleError::InvalidTime {
                hour: record.hour,
                minute: record.minute,
            });
        }

        Ok(Self {
            event,
            hour: record.hour,
            minute: record.minute,
        })
    }
}
