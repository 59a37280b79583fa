use crate::config::MqttSettings;
use crate::errors::{Error, Result};
use crate::metrics::{PUBLISHED_TOTAL, PUBLISH_FAILURES_TOTAL};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet, QoS};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const REQUEST_CAPACITY: usize = 1000;
const OFFLINE: &str = "0";
const ONLINE: &str = "1";

/// Delivers location messages to the broker.
///
/// Shared by every account worker, so implementations must accept
/// concurrent callers. Delivery failures are logged, not returned.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>);

    async fn close(&self);
}

pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    /// Connects and waits for the broker's CONNACK. Reconnects after that
    /// are handled by the background event loop.
    pub async fn connect(settings: &MqttSettings) -> Result<Self> {
        let (host, port) = settings.broker_address()?;
        info!("Connecting to MQTT broker at {}:{}", host, port);

        let mut mqtt_options = MqttOptions::new(settings.client_id(), host, port);
        mqtt_options.set_keep_alive(settings.keep_alive());
        mqtt_options.set_clean_session(true);

        if let Some(username) = settings.username.as_deref().filter(|u| !u.is_empty()) {
            mqtt_options.set_credentials(username, settings.password.clone().unwrap_or_default());
        }

        let status_topic = settings.lwt.clone().filter(|t| !t.is_empty());
        if let Some(topic) = &status_topic {
            mqtt_options.set_last_will(LastWill::new(topic, OFFLINE, QoS::AtLeastOnce, true));
        }

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => break,
                Ok(_) => {}
                Err(e) => return Err(Error::Connection(e)),
            }
        }

        info!("Connected to MQTT broker");
        announce_online(&client, status_topic.as_deref());

        tokio::spawn(run_event_loop(eventloop, client.clone(), status_topic));

        Ok(Self { client })
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    /// Queues the message without waiting, so a broker outage never stalls
    /// the caller. Messages are dropped while the request queue is full.
    async fn publish(&self, topic: &str, payload: Vec<u8>) {
        match self
            .client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
        {
            Ok(()) => {
                PUBLISHED_TOTAL.inc();
                debug!("Published to {}", topic);
            }
            Err(e) => {
                PUBLISH_FAILURES_TOTAL.inc();
                warn!("Failed to publish to {}: {}", topic, e);
            }
        }
    }

    async fn close(&self) {
        if let Err(e) = self.client.disconnect().await {
            warn!("Failed to disconnect from MQTT broker: {}", e);
        }
    }
}

async fn run_event_loop(mut eventloop: EventLoop, client: AsyncClient, status_topic: Option<String>) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("Reconnected to MQTT broker");
                announce_online(&client, status_topic.as_deref());
            }
            Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) => {
                info!("Disconnected from MQTT broker");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("MQTT error: {}", e);
                // rumqttc reconnects on the next poll
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

fn announce_online(client: &AsyncClient, status_topic: Option<&str>) {
    let Some(topic) = status_topic else {
        return;
    };

    if let Err(e) = client.try_publish(topic, QoS::AtLeastOnce, true, ONLINE) {
        warn!("Failed to publish online status to {}: {}", topic, e);
    }
}
