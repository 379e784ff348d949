//! MQTT intake using `rumqttc`.
//!
//! A background actor task owns the client's `EventLoop` and polls it
//! continuously, so keep-alives and queued acknowledgements reach the broker
//! whether or not the consumer is currently pulling. Incoming publishes are
//! forwarded to [`MqttSource`] over a channel; the broker's inflight window
//! bounds how many can be waiting there.
//!
//! Subscriptions use QoS 1 with manual acks and a persistent session.
//!
//! ## Redelivery of abandoned messages
//!
//! MQTT has no negative acknowledgement: the broker resends an unacknowledged
//! QoS 1 message only when the session reconnects. The actor counts abandoned
//! deliveries and, once every forwarded delivery has been settled, drops the
//! network connection. The next poll reconnects with the stored session and
//! the broker resends everything still unacknowledged. The check runs every
//! [`REDELIVERY_CHECK`], so a burst of failures costs one reconnect.
//!
//! ## Shutdown
//!
//! [`MessageSource::close`] asks the actor to disconnect. The DISCONNECT
//! request is queued behind every acknowledgement already issued, so the
//! broker sees those PUBACKs before the connection closes.

use std::{sync::Arc, time::Duration};

use rumqttc::{
    AsyncClient, ConnAck, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet,
    Publish, QoS,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use super::{Acknowledge, Delivery, MessageSource};
use crate::{config::MqttConfig, error::TransportError};

const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const REQUEST_CAPACITY: usize = 64;
/// How often the actor checks whether abandoned messages need a reconnect.
const REDELIVERY_CHECK: Duration = Duration::from_secs(5);
/// Upper bound on waiting for the actor to flush acks and disconnect.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// QoS 1 subscription fed by the event-loop actor.
pub struct MqttSource {
    deliveries: mpsc::UnboundedReceiver<Delivery>,
    control: mpsc::UnboundedSender<Command>,
    actor: Option<JoinHandle<()>>,
}

impl MqttSource {
    /// Build the client, queue the subscription and start the actor.
    ///
    /// The broker connection itself is opened lazily by the actor's first poll.
    pub async fn connect(config: &MqttConfig) -> Result<Self, TransportError> {
        let (host, port) = parse_broker_url(&config.broker_url)?;

        let mut options = MqttOptions::new(config.client_id.clone(), host, port);
        options
            .set_keep_alive(Duration::from_secs(config.keep_alive_secs))
            .set_manual_acks(true)
            .set_clean_session(false);

        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        client.subscribe(config.topic.as_str(), QoS::AtLeastOnce).await?;

        info!(
            broker = %config.broker_url,
            topic = %config.topic,
            client_id = %config.client_id,
            "MQTT subscription queued"
        );

        let (deliveries_tx, deliveries) = mpsc::unbounded_channel();
        let (control, control_rx) = mpsc::unbounded_channel();
        let actor = MqttActor {
            client,
            event_loop,
            topic: config.topic.clone(),
            deliveries: deliveries_tx,
            control: control.clone(),
            control_rx,
            tracker: RedeliveryTracker::default(),
            closing: false,
        };

        Ok(Self {
            deliveries,
            control,
            actor: Some(tokio::spawn(actor.run())),
        })
    }
}

#[async_trait::async_trait]
impl MessageSource for MqttSource {
    async fn next_delivery(&mut self) -> Result<Option<Delivery>, TransportError> {
        Ok(self.deliveries.recv().await)
    }

    async fn close(&mut self) {
        let Some(actor) = self.actor.take() else {
            return;
        };

        if self.control.send(Command::Close).is_err() {
            debug!("MQTT actor already stopped");
        }

        let abort = actor.abort_handle();
        match tokio::time::timeout(CLOSE_TIMEOUT, actor).await {
            Ok(Ok(())) => info!("MQTT source closed"),
            Ok(Err(e)) => error!(error = %e, "MQTT actor task failed"),
            Err(_) => {
                warn!(timeout_secs = CLOSE_TIMEOUT.as_secs(), "MQTT disconnect timed out");
                abort.abort();
            }
        }
    }
}

enum Command {
    Settled(Settled),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Acked,
    Abandoned,
}

enum ActorStep {
    Continue,
    Stop,
}

/// Counts deliveries handed to the consumer and how they were settled.
#[derive(Debug, Default)]
struct RedeliveryTracker {
    outstanding: usize,
    abandoned: usize,
}

impl RedeliveryTracker {
    fn delivered(&mut self) {
        self.outstanding += 1;
    }

    fn settled(&mut self, settled: Settled) {
        self.outstanding = self.outstanding.saturating_sub(1);
        if settled == Settled::Abandoned {
            self.abandoned += 1;
        }
    }

    /// A reconnect is due once something was abandoned and nothing is still
    /// being handled; dropping the connection earlier would strand the acks
    /// of in-flight messages.
    fn should_reconnect(&self) -> bool {
        self.abandoned > 0 && self.outstanding == 0
    }

    /// The broker resends every unacknowledged message on a new session.
    fn session_resumed(&mut self) {
        self.abandoned = 0;
    }
}

struct MqttActor {
    client: AsyncClient,
    event_loop: EventLoop,
    topic: String,
    deliveries: mpsc::UnboundedSender<Delivery>,
    control: mpsc::UnboundedSender<Command>,
    control_rx: mpsc::UnboundedReceiver<Command>,
    tracker: RedeliveryTracker,
    closing: bool,
}

impl MqttActor {
    async fn run(mut self) {
        let mut redelivery = interval(REDELIVERY_CHECK);
        redelivery.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let step = tokio::select! {
                Some(command) = self.control_rx.recv(), if !self.closing => {
                    self.handle_command(command)
                }
                _ = redelivery.tick(), if !self.closing => {
                    self.redeliver_abandoned();
                    ActorStep::Continue
                }
                event = self.event_loop.poll() => match event {
                    Ok(event) => self.handle_event(event),
                    Err(e) if self.closing => {
                        debug!(error = %e, "MQTT connection ended during close");
                        ActorStep::Stop
                    }
                    Err(e) => {
                        warn!(
                            error = %e,
                            delay_secs = RECONNECT_DELAY.as_secs(),
                            "MQTT connection error; reconnecting"
                        );
                        tokio::time::sleep(RECONNECT_DELAY).await;
                        ActorStep::Continue
                    }
                },
            };

            if matches!(step, ActorStep::Stop) {
                break;
            }
        }

        debug!("MQTT actor stopped");
    }

    fn handle_command(&mut self, command: Command) -> ActorStep {
        match command {
            Command::Settled(settled) => {
                self.tracker.settled(settled);
                ActorStep::Continue
            }
            Command::Close => {
                info!("Disconnecting from MQTT broker");
                self.closing = true;
                if let Err(e) = self.client.try_disconnect() {
                    error!(error = %e, "MQTT disconnect request failed");
                    return ActorStep::Stop;
                }
                ActorStep::Continue
            }
        }
    }

    fn handle_event(&mut self, event: Event) -> ActorStep {
        match event {
            Event::Incoming(Packet::Publish(publish)) => self.forward(publish),
            Event::Incoming(Packet::ConnAck(connack)) => {
                self.handle_connack(connack);
                ActorStep::Continue
            }
            Event::Incoming(Packet::Disconnect) => {
                warn!("MQTT broker sent DISCONNECT");
                ActorStep::Continue
            }
            Event::Outgoing(Outgoing::Disconnect) => {
                debug!("MQTT DISCONNECT sent");
                ActorStep::Stop
            }
            _ => ActorStep::Continue,
        }
    }

    fn forward(&mut self, publish: Publish) -> ActorStep {
        if self.closing {
            debug!(pkid = publish.pkid, "Closing; leaving MQTT message for redelivery");
            return ActorStep::Continue;
        }

        let topic: Arc<str> = Arc::from(publish.topic.as_str());
        let payload = publish.payload.clone();
        let settle = MqttSettle {
            client: self.client.clone(),
            control: self.control.clone(),
            publish,
        };

        if self.deliveries.send(Delivery::new(topic, payload, Box::new(settle))).is_err() {
            debug!("MQTT source dropped; stopping actor");
            return ActorStep::Stop;
        }
        self.tracker.delivered();
        ActorStep::Continue
    }

    fn handle_connack(&mut self, connack: ConnAck) {
        if connack.code != ConnectReturnCode::Success {
            error!(code = ?connack.code, "MQTT connection refused");
            return;
        }

        info!(session_present = connack.session_present, "Connected to MQTT broker");
        self.tracker.session_resumed();

        // Without a stored session the broker forgot our subscription.
        if !connack.session_present {
            if let Err(e) = self.client.try_subscribe(self.topic.as_str(), QoS::AtLeastOnce) {
                error!(topic = %self.topic, error = %e, "MQTT resubscribe failed");
            }
        }
    }

    fn redeliver_abandoned(&mut self) {
        if !self.tracker.should_reconnect() {
            return;
        }

        warn!(
            abandoned = self.tracker.abandoned,
            "Reconnecting so the broker redelivers abandoned messages"
        );
        // Drops the network; the next poll reconnects with the stored session.
        self.event_loop.clean();
        self.tracker.session_resumed();
    }
}

struct MqttSettle {
    client: AsyncClient,
    control: mpsc::UnboundedSender<Command>,
    publish: Publish,
}

impl MqttSettle {
    fn notify(&self, settled: Settled) {
        // The actor is gone only after close; nothing is left to track then.
        let _ = self.control.send(Command::Settled(settled));
    }
}

#[async_trait::async_trait]
impl Acknowledge for MqttSettle {
    async fn ack(self: Box<Self>) -> Result<(), TransportError> {
        let result = self.client.ack(&self.publish).await;
        self.notify(Settled::Acked);
        result?;
        Ok(())
    }

    async fn abandon(self: Box<Self>) {
        debug!(
            topic = %self.publish.topic,
            pkid = self.publish.pkid,
            "Leaving MQTT message unacknowledged until the next reconnect"
        );
        self.notify(Settled::Abandoned);
    }
}

/// Split `mqtt://host:port` (or `tcp://`, or bare `host[:port]`) into parts.
fn parse_broker_url(url: &str) -> Result<(String, u16), TransportError> {
    let rest = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);

    let (host, port) = match rest.split_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|e| TransportError::InvalidBrokerUrl {
                url: url.to_owned(),
                reason: format!("bad port: {e}"),
            })?;
            (host, port)
        }
        None => (rest, 1883),
    };

    if host.is_empty() {
        return Err(TransportError::InvalidBrokerUrl {
            url: url.to_owned(),
            reason: "missing host".to_owned(),
        });
    }

    Ok((host.to_owned(), port))
}
