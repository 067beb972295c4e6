use std::time::Duration;

use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::aggregator::record::InboundEvent;
use crate::config::BrokerConfig;

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Clone, Debug, Default)]
pub struct TransportStatus {
    pub connection_state: ConnectionState,
    pub messages_received: usize,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid broker configuration: {0}")]
    InvalidConfig(String),
}

/// Owner of the spawned subscription loop.
pub struct TransportHandle {
    task: JoinHandle<()>,
}

impl TransportHandle {
    /// Spawns the MQTT subscription loop. Incoming publishes are
    /// forwarded to `event_tx` as they arrive.
    pub fn spawn(
        config: BrokerConfig,
        event_tx: mpsc::Sender<InboundEvent>,
    ) -> Result<Self, TransportError> {
        if config.host.trim().is_empty() {
            return Err(TransportError::InvalidConfig(
                "broker host is empty".to_string(),
            ));
        }
        info!("Spawning MQTT transport for {}:{}", config.host, config.port);
        let task = tokio::spawn(async move {
            run_transport(config, event_tx).await;
        });
        Ok(Self { task })
    }

    /// Stops the loop. Dropping the task also drops its event sender,
    /// which signals the aggregator to drain.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

async fn run_transport(config: BrokerConfig, event_tx: mpsc::Sender<InboundEvent>) {
    // Epoch suffix keeps the id unique across restarts when none is
    // configured, so the broker doesn't kick an older session.
    let client_id = config
        .client_id
        .clone()
        .unwrap_or_else(|| format!("topic-recorder-{}", Utc::now().timestamp_millis()));

    let mut options = MqttOptions::new(&client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    if let (Some(user), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(user.clone(), password.clone());
    }

    let (client, mut event_loop) = AsyncClient::new(options, 100);

    let mut status = TransportStatus {
        connection_state: ConnectionState::Connecting,
        ..Default::default()
    };
    info!(
        "Connecting to {}:{} as '{}'",
        config.host, config.port, client_id
    );

    // Throughput stats, logged periodically.
    let mut received_since_log = 0usize;
    let mut last_stats = Utc::now();
    let stats_interval = chrono::Duration::seconds(10);

    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                // Subscribing on every ConnAck covers the initial
                // connect and rumqttc's automatic reconnects alike.
                info!("Connected to broker, subscribing to '{}'", config.topic);
                status.connection_state = ConnectionState::Connected;
                if let Err(e) = client.subscribe(&config.topic, QoS::AtMostOnce).await {
                    error!("Failed to subscribe to '{}': {}", config.topic, e);
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!(
                    "Message on '{}' ({} bytes)",
                    publish.topic,
                    publish.payload.len()
                );
                let event = InboundEvent::new(publish.topic.clone(), publish.payload.to_vec());
                status.messages_received += 1;
                status.last_activity = Some(event.received_at);
                received_since_log += 1;

                if event_tx.send(event).await.is_err() {
                    warn!("Aggregator channel closed, stopping transport");
                    break;
                }
            }
            Ok(event) => debug!("MQTT event: {:?}", event),
            Err(e) => {
                error!("MQTT connection error: {}", e);
                status.connection_state = ConnectionState::Reconnecting;
                tokio::time::sleep(Duration::from_millis(config.reconnect_period_ms)).await;
            }
        }

        let now = Utc::now();
        if now - last_stats > stats_interval {
            info!(
                "Transport stats: {} messages in last {}s ({} total)",
                received_since_log,
                stats_interval.num_seconds(),
                status.messages_received
            );
            received_since_log = 0;
            last_stats = now;
        }
    }
}
