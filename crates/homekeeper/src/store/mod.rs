//! Device record store port.
//!
//! The engine only needs a handful of reads and field updates; the store
//! owns the durable device, mobile-device and schedule documents.

mod json_file;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
pub use json_file::Documents;
pub use json_file::JsonFileStore;

use crate::engine::Device;
use crate::engine::MobileDevice;
use crate::engine::ScheduleRecord;
use crate::engine::SensorStats;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("last switch of {name} would move backwards")]
    StaleSwitch { name: String },

    #[error("failed to access store file {0}: {1}")]
    Io(std::path::PathBuf, #[source] std::io::Error),

    #[error("failed to (de)serialize store documents: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn get_device_by_name(&self, name: &str) -> Result<Option<Device>, StoreError>;

    async fn get_devices(&self) -> Result<Vec<Device>, StoreError>;

    /// Devices with at least one paired mobile device currently connected
    async fn get_devices_with_active_mobile_pair(&self) -> Result<Vec<Device>, StoreError>;

    async fn get_mobile_devices(&self) -> Result<Vec<MobileDevice>, StoreError>;

    async fn get_offline_mobile_device_names(&self) -> Result<Vec<String>, StoreError>;

    /// Devices paired with at least one of `names`
    async fn get_devices_paired_with_any(
        &self,
        names: &[String],
    ) -> Result<Vec<Device>, StoreError>;

    async fn get_scheduled_triggers(&self) -> Result<Vec<ScheduleRecord>, StoreError>;

    async fn update_device_power_on(&self, name: &str, power_on: bool) -> Result<(), StoreError>;

    async fn update_device_sensor_stats(
        &self,
        name: &str,
        stats: SensorStats,
    ) -> Result<(), StoreError>;

    /// Record a switch. Fails with [`StoreError::StaleSwitch`] if
    /// `last_switch` is older than the stored one.
    async fn update_device_switch_state(
        &self,
        name: &str,
        last_switch: DateTime<Utc>,
        is_power_forced: bool,
    ) -> Result<(), StoreError>;

    async fn update_device_forced(&self, name: &str, is_power_forced: bool)
        -> Result<(), StoreError>;

    async fn update_mobile_device_connected(
        &self,
        name: &str,
        is_connected: bool,
    ) -> Result<(), StoreError>;

    async fn update_all_devices_sleep(&self, is_sleep: bool) -> Result<(), StoreError>;

    async fn update_all_devices_dark(&self, is_dark: bool) -> Result<(), StoreError>;
}
