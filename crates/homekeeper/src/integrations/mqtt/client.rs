use std::time::Duration;

use async_trait::async_trait;
use rumqttc::AsyncClient;
use rumqttc::Event;
use rumqttc::MqttOptions;
use rumqttc::Packet;
use rumqttc::QoS;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing;

use crate::config::MqttConfig;
use crate::engine::TransportError;

/// MQTT message received from a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

pub type MqttReceiver = mpsc::UnboundedReceiver<MqttMessage>;

/// Trait for MQTT client operations
///
/// This trait allows for mocking the MQTT client for testing purposes.
/// Publishing and subscribing take `&self` so commands can go out while the
/// inbound stream is being consumed elsewhere.
#[async_trait]
pub trait MqttClient: Send + Sync {
    /// Connect to the MQTT broker and hand out the stream of inbound messages
    async fn connect(&mut self) -> Result<MqttReceiver, TransportError>;

    /// Subscribe to an MQTT topic
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError>;

    /// Publish a message to an MQTT topic
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;
}

/// Mock MQTT client for testing
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockMqttClient {
    inbound: std::sync::Mutex<Option<mpsc::UnboundedSender<MqttMessage>>>,
    pub subscriptions: std::sync::Mutex<Vec<String>>,
    pub published: std::sync::Mutex<Vec<(String, Vec<u8>)>>,
}

#[cfg(test)]
#[async_trait]
impl MqttClient for MockMqttClient {
    async fn connect(&mut self) -> Result<MqttReceiver, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inbound.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.subscriptions.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if self.inbound.lock().unwrap().is_none() {
            return Err(TransportError::NotConnected);
        }
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
impl MockMqttClient {
    /// Create a new mock MQTT client
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a message as if the broker had sent it
    pub fn inject(&self, topic: &str, payload: &[u8]) {
        if let Some(tx) = self.inbound.lock().unwrap().as_ref() {
            let _ = tx.send(MqttMessage {
                topic: topic.to_string(),
                payload: payload.to_vec(),
            });
        }
    }

    /// Close the inbound stream
    pub fn disconnect(&self) {
        self.inbound.lock().unwrap().take();
    }

    pub fn published_text(&self) -> Vec<(String, String)> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(t, p)| (t.clone(), String::from_utf8_lossy(p).into_owned()))
            .collect()
    }
}

/// Real MQTT client implementation using rumqttc
pub struct RumqttcClient {
    /// MQTT connection options (stored for lazy initialization)
    mqtt_options: MqttOptions,

    /// AsyncClient (created in connect())
    client: Option<AsyncClient>,

    /// Background event loop task handle
    event_loop_task: Option<JoinHandle<()>>,
}

impl RumqttcClient {
    /// Create a new RumqttcClient from configuration
    pub fn new(config: &MqttConfig) -> Self {
        let mut mqtt_options =
            MqttOptions::new(config.client_id.clone(), config.broker.clone(), config.port);

        mqtt_options.set_keep_alive(Duration::from_secs(30));
        // Persistent session: the broker keeps subscriptions across reconnects.
        mqtt_options.set_clean_session(false);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            mqtt_options.set_credentials(username, password);
        }

        Self {
            mqtt_options,
            client: None,
            event_loop_task: None,
        }
    }

    fn client(&self) -> Result<&AsyncClient, TransportError> {
        self.client.as_ref().ok_or(TransportError::NotConnected)
    }
}

#[async_trait]
impl MqttClient for RumqttcClient {
    async fn connect(&mut self) -> Result<MqttReceiver, TransportError> {
        let (client, mut event_loop) = AsyncClient::new(self.mqtt_options.clone(), 10);
        let (message_tx, message_rx) = mpsc::unbounded_channel();

        // rumqttc reconnects on the next poll after an error.
        let task = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let msg = MqttMessage {
                            topic: publish.topic.to_string(),
                            payload: publish.payload.to_vec(),
                        };

                        if message_tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        tracing::info!("connected to MQTT broker");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("MQTT event loop error: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
            tracing::info!("MQTT event loop task exiting");
        });

        self.client = Some(client);
        self.event_loop_task = Some(task);

        Ok(message_rx)
    }

    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.client()?
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(|e| TransportError::Client(Box::new(e)))
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.client()?
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .await
            .map_err(|e| TransportError::Client(Box::new(e)))
    }
}

impl Drop for RumqttcClient {
    fn drop(&mut self) {
        if let Some(task) = self.event_loop_task.take() {
            task.abort();
        }
    }
}
