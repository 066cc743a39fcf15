use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::client::MqttClient;
use super::client::MqttMessage;
use super::client::MqttReceiver;
use super::payload::decode;
use super::topics;
use crate::config::NotifyConfig;
use crate::engine::ActuationCommand;
use crate::engine::Actuator;
use crate::engine::Engine;
use crate::engine::InboundMessage;
use crate::engine::TransportError;
use crate::shutdown::requested;

/// MQTT transport for homekeeper
///
/// Talks to Tasmota devices (`cmnd/`, `stat/`, `tele/` topics) and to the
/// home control topics. Outbound commands go through the [`Actuator`]
/// implementation; inbound messages are decoded and handed to the engine by
/// [`MqttTransport::route_messages`].
pub struct MqttTransport<C: MqttClient> {
    client: C,
    notify: NotifyConfig,
}

impl<C: MqttClient> MqttTransport<C> {
    /// Connect `client` and return the transport with its inbound stream
    pub async fn connect(
        mut client: C,
        notify: NotifyConfig,
    ) -> Result<(Self, MqttReceiver), TransportError> {
        let inbound = client.connect().await?;
        Ok((Self { client, notify }, inbound))
    }

    /// Subscribe to the status and telemetry of `devices` and to every
    /// control topic.
    pub async fn subscribe<'a>(
        &self,
        devices: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), TransportError> {
        for device in devices {
            self.client.subscribe(&topics::stat_result(device)).await?;
            self.client.subscribe(&topics::sensor(device)).await?;
            info!("subscribed to device: {}", device);
        }

        for topic in topics::CONTROL_TOPICS {
            self.client.subscribe(topic).await?;
        }

        Ok(())
    }

    /// Decode inbound messages and hand them to the engine until shutdown or
    /// until the inbound stream ends.
    ///
    /// Messages about the same device or mobile are handled one after the
    /// other in arrival order; different subjects run concurrently.
    /// Messages already accepted are finished before this returns.
    pub async fn route_messages(
        engine: Arc<Engine>,
        mut inbound: MqttReceiver,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let lanes = Lanes::new(engine);

        loop {
            let msg = tokio::select! {
                biased;
                _ = requested(&mut shutdown) => break,
                msg = inbound.recv() => msg,
            };

            let Some(msg) = msg else {
                warn!("MQTT inbound stream closed");
                break;
            };

            if let Some(inbound) = Self::decode_message(msg) {
                lanes.push(inbound);
            }
        }

        lanes.drain().await;
        info!("MQTT message routing stopped");
    }

    fn decode_message(msg: MqttMessage) -> Option<InboundMessage> {
        debug!(
            "got MQTT message on topic: {}, payload: {}",
            msg.topic,
            String::from_utf8_lossy(&msg.payload)
        );

        match decode(&msg.topic, &msg.payload) {
            Ok(inbound) => Some(inbound),
            Err(e) => {
                warn!(topic = %msg.topic, "dropping MQTT message: {}", e);
                None
            }
        }
    }
}

/// Number of serial workers inbound messages are spread over.
const LANE_COUNT: usize = 16;

/// Fixed set of serial workers. A subject always maps to the same lane, so
/// its messages keep their order.
struct Lanes {
    senders: Vec<mpsc::UnboundedSender<InboundMessage>>,
    workers: JoinSet<()>,
}

impl Lanes {
    fn new(engine: Arc<Engine>) -> Self {
        let mut workers = JoinSet::new();
        let senders = (0..LANE_COUNT)
            .map(|_| {
                let (tx, mut rx) = mpsc::unbounded_channel::<InboundMessage>();
                let engine = engine.clone();
                workers.spawn(async move {
                    while let Some(msg) = rx.recv().await {
                        if let Err(e) = engine.handle_message(msg).await {
                            error!("failed to handle message: {}", e);
                        }
                    }
                });
                tx
            })
            .collect();

        Self { senders, workers }
    }

    fn push(&self, msg: InboundMessage) {
        let mut hasher = DefaultHasher::new();
        subject(&msg).hash(&mut hasher);
        let lane = (hasher.finish() % LANE_COUNT as u64) as usize;

        if self.senders[lane].send(msg).is_err() {
            error!(lane, "message worker is gone, dropping message");
        }
    }

    /// Close every lane and wait for the queued messages to be handled.
    async fn drain(self) {
        let Self {
            senders,
            mut workers,
        } = self;
        drop(senders);

        while let Some(res) = workers.join_next().await {
            if let Err(e) = res {
                error!("message worker failed: {}", e);
            }
        }
    }
}

/// The device or mobile a message is about.
fn subject(msg: &InboundMessage) -> &str {
    match msg {
        InboundMessage::PowerStatus { device_name, .. }
        | InboundMessage::SensorStats { device_name, .. }
        | InboundMessage::DirectCommand { device_name, .. }
        | InboundMessage::ReleaseForced { device_name } => device_name,
        InboundMessage::Presence { mobile_device, .. } => mobile_device,
        InboundMessage::TimeEvent(_) => topics::TIMING_EVENT,
    }
}

#[async_trait]
impl<C: MqttClient> Actuator for MqttTransport<C> {
    async fn send_command(
        &self,
        device_name: &str,
        command: ActuationCommand,
    ) -> Result<(), TransportError> {
        if self.notify.publish_to_notify {
            let text = format!("device {} should be {} now!", device_name, command);
            if let Err(e) = self
                .client
                .publish(topics::SEND_MESSAGE, text.as_bytes())
                .await
            {
                warn!(device = device_name, "failed to publish notification: {}", e);
            }
        }

        if self.notify.publish_to_devices {
            let topic = topics::power_command(device_name);
            info!(
                "publishing to device on topic {}, command: {}",
                topic, command
            );
            self.client
                .publish(&topic, command.as_ref().as_bytes())
                .await?;
        }

        Ok(())
    }

    async fn request_stats(&self, device_name: &str) -> Result<(), TransportError> {
        debug!("getting stat from: {}", device_name);
        self.client
            .publish(&topics::power_command(device_name), b"")
            .await
    }
}
