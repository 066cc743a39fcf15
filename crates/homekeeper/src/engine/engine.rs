use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::dispatcher::Dispatcher;
use super::event::DailyEvent;
use super::integration::Actuator;
use super::integration::ReachabilityProbe;
use super::message::InboundMessage;
use super::policy::Request;
use super::presence::PresenceDebouncer;
use super::state::SensorStats;
use crate::store::DeviceStore;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// homekeeper engine
///
/// Receives decoded inbound messages and timer firings, keeps the stored
/// environment flags up to date, and routes every switch through the
/// [`Dispatcher`]. Handlers may run concurrently; per-device ordering is the
/// dispatcher's job.
pub struct Engine {
    store: Arc<dyn DeviceStore>,
    actuator: Arc<dyn Actuator>,
    probe: Arc<dyn ReachabilityProbe>,
    dispatcher: Dispatcher,
    debouncer: PresenceDebouncer,
    ping_sweep: Mutex<()>,
}

/// Downgrade a `NotFound` from the store to a logged skip.
///
/// Returns `Ok(false)` when the record was missing.
fn found(result: Result<(), StoreError>) -> Result<bool, StoreError> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.is_not_found() => {
            info!("{}, skipping", e);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

impl Engine {
    pub fn new(
        store: Arc<dyn DeviceStore>,
        actuator: Arc<dyn Actuator>,
        probe: Arc<dyn ReachabilityProbe>,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::new(store.clone(), actuator.clone()),
            store,
            actuator,
            probe,
            debouncer: PresenceDebouncer::new(),
            ping_sweep: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn DeviceStore> {
        &self.store
    }

    /// Route one inbound message to its handler
    pub async fn handle_message(&self, msg: InboundMessage) -> Result<(), EngineError> {
        debug!("handling {:?}", msg);
        match msg {
            InboundMessage::PowerStatus { device_name, on } => {
                self.handle_power_status(&device_name, on).await
            }
            InboundMessage::SensorStats { device_name, stats } => {
                self.handle_sensor_update(&device_name, stats).await
            }
            InboundMessage::Presence {
                mobile_device,
                connected,
            } => self.handle_presence_change(&mobile_device, connected).await,
            InboundMessage::TimeEvent(event) => self.handle_time_event(event).await,
            InboundMessage::DirectCommand { device_name, state } => {
                self.handle_direct_command(&device_name, state).await
            }
            InboundMessage::ReleaseForced { device_name } => {
                self.handle_release_forced(&device_name).await
            }
        }
    }

    /// A user asked for `state`; this puts the device into forced mode.
    pub async fn handle_direct_command(
        &self,
        device_name: &str,
        state: bool,
    ) -> Result<(), EngineError> {
        self.dispatcher
            .dispatch(device_name, Request::Explicit { state, forced: true })
            .await?;
        Ok(())
    }

    /// Clear the forced flag and hand the device back to automatic policy.
    pub async fn handle_release_forced(&self, device_name: &str) -> Result<(), EngineError> {
        if !found(self.store.update_device_forced(device_name, false).await)? {
            return Ok(());
        }
        info!(device = device_name, "forced state released");
        self.dispatcher
            .dispatch(device_name, Request::Automatic)
            .await?;
        Ok(())
    }

    pub async fn handle_time_event(&self, event: DailyEvent) -> Result<(), EngineError> {
        match event {
            DailyEvent::BedTime => self.store.update_all_devices_sleep(true).await?,
            DailyEvent::WakeupTime => self.store.update_all_devices_sleep(false).await?,
            DailyEvent::Sunset => self.store.update_all_devices_dark(true).await?,
            DailyEvent::Sunrise => self.store.update_all_devices_dark(false).await?,
            DailyEvent::CustomOn | DailyEvent::CustomOff | DailyEvent::CustomToggle => {
                info!(%event, "unhandled time event");
                return Ok(());
            }
        }

        info!(%event, "time event applied");
        self.process_active_devices().await
    }

    pub async fn handle_presence_change(
        &self,
        mobile_device: &str,
        connected: bool,
    ) -> Result<(), EngineError> {
        if !found(
            self.store
                .update_mobile_device_connected(mobile_device, connected)
                .await,
        )? {
            return Ok(());
        }
        info!(mobile_device, connected, "presence changed");

        if connected {
            return self.process_active_devices().await;
        }

        let offline = self.store.get_offline_mobile_device_names().await?;
        let offline_set: HashSet<&str> = offline.iter().map(String::as_str).collect();

        for device in self.store.get_devices_paired_with_any(&offline).await? {
            let all_offline = device
                .paired_mobile_devices
                .iter()
                .all(|m| offline_set.contains(m.as_str()));

            if !all_offline {
                info!(device = %device.name, "device still has connected mobiles");
                continue;
            }

            let request = Request::Explicit {
                state: false,
                forced: false,
            };
            if let Err(e) = self.dispatcher.dispatch(&device.name, request).await {
                error!(device = %device.name, "failed to switch off device: {}", e);
            }
        }

        Ok(())
    }

    pub async fn handle_power_status(&self, device_name: &str, on: bool) -> Result<(), EngineError> {
        if found(self.store.update_device_power_on(device_name, on).await)? {
            debug!(device = device_name, on, "power status recorded");
        }
        Ok(())
    }

    pub async fn handle_sensor_update(
        &self,
        device_name: &str,
        stats: SensorStats,
    ) -> Result<(), EngineError> {
        if !found(
            self.store
                .update_device_sensor_stats(device_name, stats)
                .await,
        )? {
            return Ok(());
        }
        debug!(device = device_name, ?stats, "sensor stats recorded");
        self.process_active_devices().await
    }

    /// Run the automatic policy for every device with a connected mobile.
    pub async fn process_active_devices(&self) -> Result<(), EngineError> {
        for device in self.store.get_devices_with_active_mobile_pair().await? {
            if let Err(e) = self
                .dispatcher
                .dispatch(&device.name, Request::Automatic)
                .await
            {
                error!(device = %device.name, "failed to evaluate device: {}", e);
            }
        }
        Ok(())
    }

    /// Ask every device for a fresh status and telemetry report.
    pub async fn request_device_stats(&self) -> Result<(), EngineError> {
        for device in self.store.get_devices().await? {
            if let Err(e) = self.actuator.request_stats(&device.name).await {
                error!(device = %device.name, "failed to request stats: {}", e);
            }
        }
        Ok(())
    }

    /// Probe every mobile device once and act on confirmed transitions.
    ///
    /// All addresses are probed concurrently. A sweep that starts while the
    /// previous one is still running is skipped, so the debouncer sees one
    /// sample per address and sweep.
    pub async fn ping_mobile_devices(&self) -> Result<(), EngineError> {
        let Ok(_sweep) = self.ping_sweep.try_lock() else {
            debug!("previous ping sweep still running, skipping");
            return Ok(());
        };

        let mobiles = self.store.get_mobile_devices().await?;

        let mut probes = JoinSet::new();
        for (index, mobile) in mobiles.iter().enumerate() {
            let probe = self.probe.clone();
            let ip_address = mobile.ip_address.clone();
            probes.spawn(async move { (index, probe.is_reachable(&ip_address).await) });
        }

        let mut samples = vec![None; mobiles.len()];
        while let Some(res) = probes.join_next().await {
            match res {
                Ok((index, reachable)) => samples[index] = Some(reachable),
                Err(e) => error!("reachability probe failed: {}", e),
            }
        }

        for (mobile, reachable) in mobiles.iter().zip(samples) {
            let Some(reachable) = reachable else {
                continue;
            };
            let Some(transition) = self.debouncer.observe(&mobile.ip_address, reachable) else {
                continue;
            };

            if let Err(e) = self
                .handle_presence_change(&mobile.name, transition.is_connected())
                .await
            {
                warn!(mobile_device = %mobile.name, "failed to apply presence change: {}", e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeDelta;
    use chrono::Utc;

    use super::*;
    use crate::engine::ActuationCommand;
    use crate::engine::Device;
    use crate::engine::DeviceType;
    use crate::engine::MobileDevice;
    use crate::engine::testing::RecordingActuator;
    use crate::engine::testing::ScriptedProbe;
    use crate::engine::testing::Sent;
    use crate::store::Documents;
    use crate::store::JsonFileStore;

    struct Harness {
        store: Arc<JsonFileStore>,
        actuator: Arc<RecordingActuator>,
        probe: Arc<ScriptedProbe>,
        engine: Engine,
    }

    fn device(name: &str, device_type: DeviceType, mobiles: &[&str]) -> Device {
        let mut device = Device::new(name, device_type);
        device.paired_mobile_devices = mobiles.iter().map(|m| m.to_string()).collect();
        device.last_switch = Some(Utc::now() - TimeDelta::hours(1));
        device
    }

    fn mobile(name: &str, ip_address: &str, is_connected: bool) -> MobileDevice {
        MobileDevice {
            name: name.to_string(),
            ip_address: ip_address.to_string(),
            is_connected,
        }
    }

    fn harness(documents: Documents) -> Harness {
        harness_with_probe(documents, ScriptedProbe::default())
    }

    fn harness_with_probe(documents: Documents, probe: ScriptedProbe) -> Harness {
        let store = Arc::new(JsonFileStore::in_memory(documents));
        let actuator = Arc::new(RecordingActuator::default());
        let probe = Arc::new(probe);
        let engine = Engine::new(store.clone(), actuator.clone(), probe.clone());
        Harness {
            store,
            actuator,
            probe,
            engine,
        }
    }

    fn home() -> Documents {
        let mut heater = device("heater", DeviceType::FloorHeating, &["phone"]);
        heater.temperature = Some(30.0);
        Documents {
            devices: vec![
                device("lamp1", DeviceType::DeskLight, &["phone"]),
                device("lamp2", DeviceType::DeskLight, &["phone", "laptop"]),
                heater,
            ],
            mobile_devices: vec![
                mobile("phone", "10.0.0.2", true),
                mobile("laptop", "10.0.0.3", false),
            ],
            schedules: vec![],
        }
    }

    fn commands(h: &Harness) -> Vec<(String, ActuationCommand)> {
        let mut commands = h.actuator.commands();
        commands.sort_by(|a, b| a.0.cmp(&b.0));
        commands
    }

    #[tokio::test]
    async fn test_sunset_turns_on_lights() {
        let h = harness(home());
        h.engine.handle_time_event(DailyEvent::Sunset).await.unwrap();

        assert_eq!(
            commands(&h),
            vec![
                ("lamp1".to_string(), ActuationCommand::On),
                ("lamp2".to_string(), ActuationCommand::On),
            ]
        );
        let devices = h.store.get_devices().await.unwrap();
        assert!(devices.iter().all(|d| d.is_dark));
    }

    #[tokio::test]
    async fn test_bedtime_marks_sleep_without_switching_off_lights() {
        let h = harness(home());
        h.engine.handle_time_event(DailyEvent::BedTime).await.unwrap();

        let devices = h.store.get_devices().await.unwrap();
        assert!(devices.iter().all(|d| d.is_sleep));
        assert!(h.actuator.sent().is_empty());
    }

    #[tokio::test]
    async fn test_custom_events_are_ignored() {
        let h = harness(home());
        let before = h.store.snapshot().await;
        h.engine
            .handle_time_event(DailyEvent::CustomToggle)
            .await
            .unwrap();
        assert_eq!(h.store.snapshot().await, before);
        assert!(h.actuator.sent().is_empty());
    }

    #[tokio::test]
    async fn test_direct_command_forces_device() {
        let h = harness(home());
        h.engine.handle_direct_command("lamp1", true).await.unwrap();

        let lamp = h.store.get_device_by_name("lamp1").await.unwrap().unwrap();
        assert!(lamp.is_power_forced);
        assert_eq!(commands(&h), vec![("lamp1".to_string(), ActuationCommand::On)]);
    }

    #[tokio::test]
    async fn test_release_forced_reevaluates_device() {
        let mut documents = home();
        documents.devices[0].is_power_forced = true;
        documents.devices[0].power_on = true;
        let h = harness(documents);

        h.engine.handle_release_forced("lamp1").await.unwrap();

        let lamp = h.store.get_device_by_name("lamp1").await.unwrap().unwrap();
        assert!(!lamp.is_power_forced);
        // Not dark, so the lamp goes off once it is back under automatic policy.
        assert_eq!(commands(&h), vec![("lamp1".to_string(), ActuationCommand::Off)]);
    }

    #[tokio::test]
    async fn test_unknown_names_are_skipped() {
        let h = harness(home());
        h.engine.handle_power_status("ghost", true).await.unwrap();
        h.engine.handle_release_forced("ghost").await.unwrap();
        h.engine.handle_direct_command("ghost", true).await.unwrap();
        h.engine
            .handle_presence_change("ghost-phone", true)
            .await
            .unwrap();
        assert!(h.actuator.sent().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_switches_off_only_fully_offline_devices() {
        let mut documents = home();
        documents.mobile_devices[1].is_connected = true;
        documents.devices[0].power_on = true;
        documents.devices[1].power_on = true;
        let h = harness(documents);

        h.engine.handle_presence_change("phone", false).await.unwrap();

        // lamp2 still has the laptop, heater is already off.
        assert_eq!(commands(&h), vec![("lamp1".to_string(), ActuationCommand::Off)]);
        let phone = &h.store.get_mobile_devices().await.unwrap()[0];
        assert!(!phone.is_connected);
    }

    #[tokio::test]
    async fn test_sensor_update_drives_floor_heating() {
        let h = harness(home());
        h.engine
            .handle_sensor_update(
                "heater",
                SensorStats {
                    temperature: Some(12.0),
                    total_energy: Some(4.2),
                },
            )
            .await
            .unwrap();

        assert_eq!(commands(&h), vec![("heater".to_string(), ActuationCommand::On)]);
        let heater = h.store.get_device_by_name("heater").await.unwrap().unwrap();
        assert_eq!(heater.temperature, Some(12.0));
        assert_eq!(heater.total_energy, Some(4.2));
    }

    #[tokio::test]
    async fn test_power_status_is_recorded() {
        let h = harness(home());
        h.engine.handle_power_status("lamp1", true).await.unwrap();
        let lamp = h.store.get_device_by_name("lamp1").await.unwrap().unwrap();
        assert!(lamp.power_on);
        assert!(h.actuator.sent().is_empty());
    }

    #[tokio::test]
    async fn test_request_device_stats_asks_every_device() {
        let h = harness(home());
        h.engine.request_device_stats().await.unwrap();
        assert_eq!(
            h.actuator.sent(),
            vec![
                Sent::StatsRequest("lamp1".to_string()),
                Sent::StatsRequest("lamp2".to_string()),
                Sent::StatsRequest("heater".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_ping_confirms_disconnect_after_five_misses() {
        let mut documents = home();
        for d in &mut documents.devices {
            d.power_on = true;
        }
        let h = harness(documents);
        h.probe.set("10.0.0.2", true);

        // Baseline plus four misses: nothing happens yet.
        h.engine.ping_mobile_devices().await.unwrap();
        h.probe.set("10.0.0.2", false);
        for _ in 0..4 {
            h.engine.ping_mobile_devices().await.unwrap();
        }
        assert!(h.actuator.sent().is_empty());
        assert!(h.store.get_mobile_devices().await.unwrap()[0].is_connected);

        h.engine.ping_mobile_devices().await.unwrap();
        assert!(!h.store.get_mobile_devices().await.unwrap()[0].is_connected);
        assert_eq!(
            commands(&h),
            vec![
                ("heater".to_string(), ActuationCommand::Off),
                ("lamp1".to_string(), ActuationCommand::Off),
                ("lamp2".to_string(), ActuationCommand::Off),
            ]
        );
    }

    #[tokio::test]
    async fn test_ping_confirms_connect_immediately() {
        let mut documents = home();
        documents.devices.iter_mut().for_each(|d| d.is_dark = true);
        let h = harness(documents);

        // Laptop baseline is unreachable, one reachable sample connects it.
        h.engine.ping_mobile_devices().await.unwrap();
        h.probe.set("10.0.0.3", true);
        h.engine.ping_mobile_devices().await.unwrap();

        let laptop = &h.store.get_mobile_devices().await.unwrap()[1];
        assert!(laptop.is_connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_sweep_probes_concurrently() {
        let h = harness_with_probe(home(), ScriptedProbe::with_delay(Duration::from_secs(2)));

        let started = tokio::time::Instant::now();
        h.engine.ping_mobile_devices().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_ping_sweep_is_skipped() {
        let mut documents = home();
        for d in &mut documents.devices {
            d.power_on = true;
        }
        let h = harness_with_probe(documents, ScriptedProbe::with_delay(Duration::from_secs(2)));
        h.probe.set("10.0.0.2", true);
        h.engine.ping_mobile_devices().await.unwrap();

        h.probe.set("10.0.0.2", false);
        let (first, second) = tokio::join!(
            h.engine.ping_mobile_devices(),
            h.engine.ping_mobile_devices()
        );
        first.unwrap();
        second.unwrap();

        // Only one miss was counted, so three more do not confirm yet.
        for _ in 0..3 {
            h.engine.ping_mobile_devices().await.unwrap();
        }
        assert!(h.store.get_mobile_devices().await.unwrap()[0].is_connected);

        h.engine.ping_mobile_devices().await.unwrap();
        assert!(!h.store.get_mobile_devices().await.unwrap()[0].is_connected);
    }
}
