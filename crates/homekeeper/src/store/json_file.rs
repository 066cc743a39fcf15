use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

use super::DeviceStore;
use super::StoreError;
use crate::engine::Device;
use crate::engine::MobileDevice;
use crate::engine::ScheduleRecord;
use crate::engine::SensorStats;

/// Every document held by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Documents {
    #[serde(default)]
    pub devices: Vec<Device>,

    #[serde(default)]
    pub mobile_devices: Vec<MobileDevice>,

    #[serde(default)]
    pub schedules: Vec<ScheduleRecord>,
}

/// Document store kept in memory and mirrored to a JSON file.
///
/// Every mutation rewrites the file through a temporary sibling and a
/// rename, so a crash never leaves a half-written store behind. Without a
/// path the store is purely in memory.
#[derive(Debug)]
pub struct JsonFileStore {
    path: Option<PathBuf>,
    documents: RwLock<Documents>,
}

impl JsonFileStore {
    pub fn in_memory(documents: Documents) -> Self {
        Self {
            path: None,
            documents: RwLock::new(documents),
        }
    }

    /// Load the store from `path`. A missing file yields an empty store that
    /// is created on the first write.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let documents = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("store file {} does not exist yet", path.display());
                Documents::default()
            }
            Err(e) => return Err(StoreError::Io(path, e)),
        };

        Ok(Self {
            path: Some(path),
            documents: RwLock::new(documents),
        })
    }

    pub async fn snapshot(&self) -> Documents {
        self.documents.read().await.clone()
    }

    /// Apply `f` to a copy, persist the copy and only then publish it, all
    /// under the write lock so file writes happen in mutation order.
    ///
    /// A failed write leaves the in-memory documents untouched.
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Documents) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut documents = self.documents.write().await;
        let mut updated = documents.clone();
        let out = f(&mut updated)?;
        self.persist(&updated).await?;
        *documents = updated;
        Ok(out)
    }

    async fn persist(&self, documents: &Documents) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let bytes = serde_json::to_vec_pretty(documents)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| StoreError::Io(tmp.clone(), e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| StoreError::Io(path.clone(), e))
    }
}

fn device_mut<'a>(documents: &'a mut Documents, name: &str) -> Result<&'a mut Device, StoreError> {
    documents
        .devices
        .iter_mut()
        .find(|d| d.name == name)
        .ok_or_else(|| StoreError::NotFound {
            kind: "device",
            name: name.to_string(),
        })
}

#[async_trait]
impl DeviceStore for JsonFileStore {
    async fn get_device_by_name(&self, name: &str) -> Result<Option<Device>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents.devices.iter().find(|d| d.name == name).cloned())
    }

    async fn get_devices(&self) -> Result<Vec<Device>, StoreError> {
        Ok(self.documents.read().await.devices.clone())
    }

    async fn get_devices_with_active_mobile_pair(&self) -> Result<Vec<Device>, StoreError> {
        let documents = self.documents.read().await;
        let connected: HashSet<&str> = documents
            .mobile_devices
            .iter()
            .filter(|m| m.is_connected)
            .map(|m| m.name.as_str())
            .collect();

        Ok(documents
            .devices
            .iter()
            .filter(|d| {
                d.paired_mobile_devices
                    .iter()
                    .any(|m| connected.contains(m.as_str()))
            })
            .cloned()
            .collect())
    }

    async fn get_mobile_devices(&self) -> Result<Vec<MobileDevice>, StoreError> {
        Ok(self.documents.read().await.mobile_devices.clone())
    }

    async fn get_offline_mobile_device_names(&self) -> Result<Vec<String>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents
            .mobile_devices
            .iter()
            .filter(|m| !m.is_connected)
            .map(|m| m.name.clone())
            .collect())
    }

    async fn get_devices_paired_with_any(
        &self,
        names: &[String],
    ) -> Result<Vec<Device>, StoreError> {
        let documents = self.documents.read().await;
        Ok(documents
            .devices
            .iter()
            .filter(|d| names.iter().any(|n| d.paired_mobile_devices.contains(n)))
            .cloned()
            .collect())
    }

    async fn get_scheduled_triggers(&self) -> Result<Vec<ScheduleRecord>, StoreError> {
        Ok(self.documents.read().await.schedules.clone())
    }

    async fn update_device_power_on(&self, name: &str, power_on: bool) -> Result<(), StoreError> {
        self.mutate(|docs| {
            device_mut(docs, name)?.power_on = power_on;
            Ok(())
        })
        .await
    }

    async fn update_device_sensor_stats(
        &self,
        name: &str,
        stats: SensorStats,
    ) -> Result<(), StoreError> {
        self.mutate(|docs| {
            let device = device_mut(docs, name)?;
            if let Some(temperature) = stats.temperature {
                device.temperature = Some(temperature);
            }
            if let Some(total_energy) = stats.total_energy {
                device.total_energy = Some(total_energy);
            }
            Ok(())
        })
        .await
    }

    async fn update_device_switch_state(
        &self,
        name: &str,
        last_switch: DateTime<Utc>,
        is_power_forced: bool,
    ) -> Result<(), StoreError> {
        self.mutate(|docs| {
            let device = device_mut(docs, name)?;
            if device.last_switch.is_some_and(|prev| prev > last_switch) {
                return Err(StoreError::StaleSwitch {
                    name: name.to_string(),
                });
            }
            device.last_switch = Some(last_switch);
            device.is_power_forced = is_power_forced;
            Ok(())
        })
        .await
    }

    async fn update_device_forced(
        &self,
        name: &str,
        is_power_forced: bool,
    ) -> Result<(), StoreError> {
        self.mutate(|docs| {
            device_mut(docs, name)?.is_power_forced = is_power_forced;
            Ok(())
        })
        .await
    }

    async fn update_mobile_device_connected(
        &self,
        name: &str,
        is_connected: bool,
    ) -> Result<(), StoreError> {
        self.mutate(|docs| {
            let mobile = docs
                .mobile_devices
                .iter_mut()
                .find(|m| m.name == name)
                .ok_or_else(|| StoreError::NotFound {
                    kind: "mobile device",
                    name: name.to_string(),
                })?;
            mobile.is_connected = is_connected;
            Ok(())
        })
        .await
    }

    async fn update_all_devices_sleep(&self, is_sleep: bool) -> Result<(), StoreError> {
        self.mutate(|docs| {
            docs.devices.iter_mut().for_each(|d| d.is_sleep = is_sleep);
            Ok(())
        })
        .await
    }

    async fn update_all_devices_dark(&self, is_dark: bool) -> Result<(), StoreError> {
        self.mutate(|docs| {
            docs.devices.iter_mut().for_each(|d| d.is_dark = is_dark);
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::engine::DeviceType;

    fn mobile(name: &str, is_connected: bool) -> MobileDevice {
        MobileDevice {
            name: name.to_string(),
            ip_address: format!("10.0.0.{}", name.len()),
            is_connected,
        }
    }

    fn paired(name: &str, mobiles: &[&str]) -> Device {
        let mut device = Device::new(name, DeviceType::DeskLight);
        device.paired_mobile_devices = mobiles.iter().map(|m| m.to_string()).collect();
        device
    }

    fn fixture() -> Documents {
        Documents {
            devices: vec![
                paired("lamp", &["phone"]),
                paired("heater", &["phone", "laptop"]),
                paired("hall", &["tablet"]),
                paired("orphan", &[]),
            ],
            mobile_devices: vec![
                mobile("phone", false),
                mobile("laptop", true),
                mobile("tablet", false),
            ],
            schedules: vec![],
        }
    }

    fn names(devices: Vec<Device>) -> Vec<String> {
        devices.into_iter().map(|d| d.name).collect()
    }

    #[tokio::test]
    async fn test_active_mobile_pair_query() {
        let store = JsonFileStore::in_memory(fixture());
        let active = store.get_devices_with_active_mobile_pair().await.unwrap();
        assert_eq!(names(active), vec!["heater"]);
    }

    #[tokio::test]
    async fn test_offline_queries() {
        let store = JsonFileStore::in_memory(fixture());
        let offline = store.get_offline_mobile_device_names().await.unwrap();
        assert_eq!(offline, vec!["phone", "tablet"]);

        let devices = store.get_devices_paired_with_any(&offline).await.unwrap();
        assert_eq!(names(devices), vec!["lamp", "heater", "hall"]);
    }

    #[tokio::test]
    async fn test_update_unknown_device_is_not_found() {
        let store = JsonFileStore::in_memory(fixture());
        let err = store.update_device_power_on("missing", true).await.unwrap_err();
        assert!(err.is_not_found());

        let err = store
            .update_mobile_device_connected("missing", true)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_last_switch_only_moves_forward() {
        let store = JsonFileStore::in_memory(fixture());
        let now = Utc::now();

        store.update_device_switch_state("lamp", now, true).await.unwrap();
        let err = store
            .update_device_switch_state("lamp", now - TimeDelta::seconds(1), false)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StaleSwitch { .. }));

        let lamp = store.get_device_by_name("lamp").await.unwrap().unwrap();
        assert_eq!(lamp.last_switch, Some(now));
        assert!(lamp.is_power_forced);
    }

    #[tokio::test]
    async fn test_sensor_stats_keep_missing_fields() {
        let store = JsonFileStore::in_memory(fixture());
        store
            .update_device_sensor_stats(
                "heater",
                SensorStats {
                    temperature: Some(22.0),
                    total_energy: Some(1.5),
                },
            )
            .await
            .unwrap();
        store
            .update_device_sensor_stats(
                "heater",
                SensorStats {
                    temperature: None,
                    total_energy: Some(1.7),
                },
            )
            .await
            .unwrap();

        let heater = store.get_device_by_name("heater").await.unwrap().unwrap();
        assert_eq!(heater.temperature, Some(22.0));
        assert_eq!(heater.total_energy, Some(1.7));
    }

    #[tokio::test]
    async fn test_bulk_environment_updates() {
        let store = JsonFileStore::in_memory(fixture());
        store.update_all_devices_dark(true).await.unwrap();
        store.update_all_devices_sleep(true).await.unwrap();

        let devices = store.get_devices().await.unwrap();
        assert!(devices.iter().all(|d| d.is_dark && d.is_sleep));
    }

    #[tokio::test]
    async fn test_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("store.json"))
            .await
            .unwrap();
        assert_eq!(store.snapshot().await, Documents::default());
    }

    #[tokio::test]
    async fn test_mutations_are_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, serde_json::to_vec(&fixture()).unwrap()).unwrap();

        let store = JsonFileStore::open(&path).await.unwrap();
        store.update_device_power_on("lamp", true).await.unwrap();
        store
            .update_mobile_device_connected("phone", true)
            .await
            .unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path).await.unwrap();
        let lamp = reopened.get_device_by_name("lamp").await.unwrap().unwrap();
        assert!(lamp.power_on);
        assert!(!dir.path().join("store.json.tmp").exists());

        let active = reopened.get_devices_with_active_mobile_pair().await.unwrap();
        assert_eq!(names(active), vec!["lamp", "heater"]);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("store.json");
        std::fs::create_dir(path.parent().unwrap()).unwrap();
        std::fs::write(&path, serde_json::to_vec(&fixture()).unwrap()).unwrap();

        let store = JsonFileStore::open(&path).await.unwrap();
        let before = store.snapshot().await;
        std::fs::remove_dir_all(path.parent().unwrap()).unwrap();

        let err = store
            .update_device_switch_state("lamp", Utc::now(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io(..)));
        assert!(store.update_all_devices_dark(true).await.is_err());

        assert_eq!(store.snapshot().await, before);
        let lamp = store.get_device_by_name("lamp").await.unwrap().unwrap();
        assert_eq!(lamp.last_switch, None);
        assert!(!lamp.is_power_forced);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let err = JsonFileStore::open(&path).await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
