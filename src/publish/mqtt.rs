use crate::publish::{PublishError, Publisher};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::fmt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const KEEP_ALIVE: Duration = Duration::from_secs(60);
const REQUEST_CAPACITY: usize = 64;
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// MQTT publisher. Messages are queued to the client's event loop without waiting.
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    /// Create the client and spawn the task that drives its connection.
    pub fn start(client_id: &str, broker: &str, port: u16) -> (Self, JoinHandle<()>) {
        let mut options = MqttOptions::new(client_id, broker, port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        info!(broker, port, client_id, "Starting MQTT publisher");
        let handle = tokio::spawn(drive_event_loop(eventloop));
        (Self { client }, handle)
    }
}

impl fmt::Debug for MqttPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttPublisher").finish_non_exhaustive()
    }
}

impl Publisher for MqttPublisher {
    fn publish(&self, topic: &str, payload: String) -> Result<(), PublishError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|err| PublishError::Send {
                topic: topic.to_string(),
                reason: err.to_string(),
            })
    }
}

/// Polling the event loop is what reconnects; errors are logged and retried after a pause.
async fn drive_event_loop(mut eventloop: EventLoop) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("MQTT broker connected");
            }
            Ok(event) => {
                debug!(event = ?event, "MQTT event");
            }
            Err(err) => {
                warn!(error = %err, "MQTT connection error, retrying");
                tokio::time::sleep(RECONNECT_BACKOFF).await;
            }
        }
    }
}
