use std::collections::HashMap;
use std::sync::Arc;

use chrono::DateTime;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::error;
use tracing::info;

use super::integration::Actuator;
use super::message::ActuationCommand;
use super::policy::Decision;
use super::policy::Request;
use super::policy::decide;
use crate::store::DeviceStore;
use crate::store::StoreError;

/// One async mutex per device name, created on first use.
#[derive(Debug, Default)]
struct DeviceLocks {
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DeviceLocks {
    fn get(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        locks.entry(name.to_string()).or_default().clone()
    }
}

/// Turns toggle requests into persisted switches and outbound commands.
///
/// Read, decide and write for one device happen under that device's lock, so
/// two concurrent requests can never both pass the switch interval gate.
pub struct Dispatcher {
    store: Arc<dyn DeviceStore>,
    actuator: Arc<dyn Actuator>,
    locks: DeviceLocks,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn DeviceStore>, actuator: Arc<dyn Actuator>) -> Self {
        Self {
            store,
            actuator,
            locks: DeviceLocks::default(),
        }
    }

    pub async fn dispatch(
        &self,
        device_name: &str,
        request: Request,
    ) -> Result<Option<Decision>, StoreError> {
        self.dispatch_at(device_name, request, Utc::now()).await
    }

    /// Evaluate `request` for a device at `now`.
    ///
    /// Returns `None` when the device is unknown. A denied decision has no
    /// side effects. Transport failures are logged and leave the stored
    /// switch in place.
    pub async fn dispatch_at(
        &self,
        device_name: &str,
        request: Request,
        now: DateTime<Utc>,
    ) -> Result<Option<Decision>, StoreError> {
        let lock = self.locks.get(device_name);
        let _guard = lock.lock().await;

        let Some(device) = self.store.get_device_by_name(device_name).await? else {
            info!(device = device_name, "device not found, skipping");
            return Ok(None);
        };

        let decision = decide(&device, request, now);
        if !decision.allow {
            debug!(
                device = device_name,
                ?request,
                reason = %decision.reason,
                "toggle denied"
            );
            return Ok(Some(decision));
        }

        self.store
            .update_device_switch_state(device_name, now, decision.power_forced)
            .await?;

        let command = ActuationCommand::from(decision.target);
        info!(
            device = device_name,
            %command,
            reason = %decision.reason,
            forced = decision.power_forced,
            "switching device"
        );

        if let Err(e) = self.actuator.send_command(device_name, command).await {
            error!(device = device_name, %command, "failed to send command: {}", e);
        }

        Ok(Some(decision))
    }
}
