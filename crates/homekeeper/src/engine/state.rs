use std::collections::BTreeSet;

use chrono::DateTime;
use chrono::TimeDelta;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Switch interval applied when a device document does not carry one.
pub const DEFAULT_SWITCH_INTERVAL_SECS: u64 = 300;

fn default_switch_interval_secs() -> u64 {
    DEFAULT_SWITCH_INTERVAL_SECS
}

/// Kind of appliance behind a device, selecting its automatic policy.
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
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeviceType {
    /// Light that should be on while it is dark.
    DeskLight,

    /// Heater driven by the analog temperature probe.
    FloorHeating,
}

/// A switchable device as stored in the device record store.
///
/// Field names on the wire follow the document layout of the store, so
/// existing records can be loaded as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    #[serde(rename = "device_name")]
    pub name: String,

    #[serde(default)]
    pub power_on: bool,

    pub device_type: DeviceType,

    /// Names of the mobile devices whose presence drives this device.
    #[serde(rename = "paired_devices", default)]
    pub paired_mobile_devices: BTreeSet<String>,

    /// Minimum number of seconds between two switches.
    #[serde(
        rename = "switch_interval",
        default = "default_switch_interval_secs"
    )]
    pub switch_interval_secs: u64,

    /// `None` means the device was never switched and is not throttled.
    #[serde(default)]
    pub last_switch: Option<DateTime<Utc>>,

    #[serde(rename = "device_in_dark", default)]
    pub is_dark: bool,

    #[serde(rename = "device_sleep", default)]
    pub is_sleep: bool,

    #[serde(rename = "device_is_power_forced", default)]
    pub is_power_forced: bool,

    #[serde(
        rename = "device_temperature",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub temperature: Option<f64>,

    #[serde(
        rename = "device_total_energy",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub total_energy: Option<f64>,
}

impl Device {
    pub fn new(name: impl Into<String>, device_type: DeviceType) -> Self {
        Self {
            name: name.into(),
            power_on: false,
            device_type,
            paired_mobile_devices: BTreeSet::new(),
            switch_interval_secs: DEFAULT_SWITCH_INTERVAL_SECS,
            last_switch: None,
            is_dark: false,
            is_sleep: false,
            is_power_forced: false,
            temperature: None,
            total_energy: None,
        }
    }

    pub fn switch_interval(&self) -> TimeDelta {
        i64::try_from(self.switch_interval_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }

    /// Earliest instant at which the device may be switched again.
    ///
    /// Returns `None` when the device has never been switched.
    pub fn next_switch_allowed_at(&self) -> Option<DateTime<Utc>> {
        let last = self.last_switch?;
        Some(
            last.checked_add_signed(self.switch_interval())
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }
}

/// A phone or laptop whose presence on the local network is tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobileDevice {
    #[serde(rename = "mobile_device_name")]
    pub name: String,

    pub ip_address: String,

    #[serde(default)]
    pub is_connected: bool,
}

/// Telemetry fields reported by a device's sensor message.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorStats {
    pub temperature: Option<f64>,
    pub total_energy: Option<f64>,
}
