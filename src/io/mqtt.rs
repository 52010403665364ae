//! MQTT v5 module client: outbound publishing and inbound dispatch
//!
//! Topics follow the edge-module layout:
//! - `<prefix>/inputs/<name>` - inbound routes the module subscribes to
//! - `<prefix>/outputs/<name>` - outbound routes the module publishes on
//!
//! Message metadata travels as MQTT v5 user properties. Inbound publishes
//! are acknowledged manually, only once a handler answers `Completed`.

use crate::domain::{MessageResponse, PublishError, RelayError, RelayedMessage};
use crate::infra::config::Config;
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::v5::{Packet, Publish, PublishProperties};
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, Event, EventLoop, MqttOptions};
use rumqttc::Transport;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Outbound boundary shared by the sampler and the relay
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Publish `message` on the named output route
    async fn send_event(&self, output: &str, message: RelayedMessage) -> Result<(), PublishError>;
}

/// Context handed to input handlers: the outbound client they publish through
///
/// Held weakly so a registered handler never keeps the client alive on its own.
pub type HandlerContext = Weak<dyn MessageSink>;

/// Callback invoked once per inbound message
#[async_trait]
pub trait InputMessageHandler: Send + Sync + 'static {
    async fn handle(
        &self,
        message: &RelayedMessage,
        context: &HandlerContext,
    ) -> Result<MessageResponse, RelayError>;
}

pub fn input_topic(prefix: &str, input: &str) -> String {
    format!("{}/inputs/{}", prefix, input)
}

pub fn output_topic(prefix: &str, output: &str) -> String {
    format!("{}/outputs/{}", prefix, output)
}

/// Copy an inbound publish into an owned message
pub fn inbound_message(publish: &Publish) -> RelayedMessage {
    let properties = publish
        .properties
        .as_ref()
        .map(|p| p.user_properties.clone())
        .unwrap_or_default();
    RelayedMessage { payload: publish.payload.clone(), properties }
}

/// MQTT v5 publish properties carrying the message metadata
pub fn outbound_properties(message: &RelayedMessage) -> PublishProperties {
    PublishProperties { user_properties: message.properties.clone(), ..Default::default() }
}

fn mqtt_options(config: &Config) -> MqttOptions {
    let mut options =
        MqttOptions::new(config.mqtt_client_id(), config.mqtt_host(), config.mqtt_port());
    options.set_keep_alive(Duration::from_secs(30));
    options.set_clean_start(true);
    options.set_manual_acks(true);
    // Plain TCP: reliable, ordered, connection-oriented
    options.set_transport(Transport::Tcp);

    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        options.set_credentials(username.to_string(), password.to_string());
    }
    options
}

/// Long-lived outbound client handle
pub struct ModuleClient {
    client: AsyncClient,
    topic_prefix: String,
}

impl ModuleClient {
    /// Create the client and the dispatcher that drives its event loop
    ///
    /// No network I/O happens until the dispatcher runs; the client
    /// library connects and reconnects from inside the event loop.
    pub fn connect(config: &Config) -> (Self, Dispatcher) {
        let (client, eventloop) = AsyncClient::new(mqtt_options(config), 100);
        info!(
            host = %config.mqtt_host(),
            port = %config.mqtt_port(),
            client_id = %config.mqtt_client_id(),
            "module_client_initialized"
        );
        let dispatcher = Dispatcher::new(client.clone(), eventloop);
        (Self { client, topic_prefix: config.topic_prefix().to_string() }, dispatcher)
    }

    pub fn input_topic(&self, input: &str) -> String {
        input_topic(&self.topic_prefix, input)
    }

    pub fn output_topic(&self, output: &str) -> String {
        output_topic(&self.topic_prefix, output)
    }

    /// Subscribe to an input route and register its handler with the dispatcher
    pub async fn set_input_message_handler<H: InputMessageHandler>(
        &self,
        dispatcher: &mut Dispatcher,
        input: &str,
        handler: Arc<H>,
        context: HandlerContext,
    ) -> Result<(), PublishError> {
        let topic = self.input_topic(input);
        self.client
            .subscribe(topic.clone(), QoS::AtLeastOnce)
            .await
            .map_err(|e| PublishError::Client { topic: topic.clone(), message: e.to_string() })?;
        info!(input = %input, topic = %topic, "input_handler_registered");
        dispatcher.register(topic, handler, context);
        Ok(())
    }
}

#[async_trait]
impl MessageSink for ModuleClient {
    async fn send_event(&self, output: &str, message: RelayedMessage) -> Result<(), PublishError> {
        let topic = self.output_topic(output);
        let properties = outbound_properties(&message);
        self.client
            .publish_with_properties(topic.clone(), QoS::AtLeastOnce, false, message.payload, properties)
            .await
            .map_err(|e| PublishError::Client { topic, message: e.to_string() })
    }
}

type Route = (Arc<dyn InputMessageHandler>, HandlerContext);

/// Pause between a failed poll and the next connection attempt
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Outcome of a dispatcher run, returned on shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Connection acknowledgements, the first connect included
    pub connections: u64,
    pub dispatched: u64,
    pub acked: u64,
    pub unrouted: u64,
}

/// Drives the MQTT event loop and dispatches inbound messages to handlers
pub struct Dispatcher {
    client: AsyncClient,
    eventloop: EventLoop,
    routes: HashMap<String, Route>,
}

impl Dispatcher {
    fn new(client: AsyncClient, eventloop: EventLoop) -> Self {
        Self { client, eventloop, routes: HashMap::new() }
    }

    fn register<H: InputMessageHandler>(&mut self, topic: String, handler: Arc<H>, context: HandlerContext) {
        let handler: Arc<dyn InputMessageHandler> = handler;
        self.routes.insert(topic, (handler, context));
    }

    /// Poll until shutdown
    ///
    /// Each inbound message is handled on its own task so a slow publish
    /// never stalls the event loop. A handler error is fatal and returned.
    /// Every route is subscribed again on each ConnAck.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<DispatchStats, RelayError> {
        let mut tasks: JoinSet<Result<bool, RelayError>> = JoinSet::new();
        let mut stats = DispatchStats::default();

        if *shutdown.borrow() {
            return Ok(stats);
        }

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if shutdown_requested(changed, &shutdown) {
                        info!(?stats, "dispatcher_shutdown");
                        tasks.abort_all();
                        return Ok(stats);
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    match joined {
                        Ok(Ok(acked)) => stats.acked += u64::from(acked),
                        Ok(Err(e)) => {
                            error!(error = %e, "input_handler_failed");
                            tasks.abort_all();
                            return Err(e);
                        }
                        Err(e) if e.is_cancelled() => {}
                        Err(e) => {
                            tasks.abort_all();
                            return Err(RelayError::Handler(e.to_string()));
                        }
                    }
                }
                result = self.eventloop.poll() => {
                    match result {
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            if self.dispatch(publish, &mut tasks) {
                                stats.dispatched += 1;
                            } else {
                                stats.unrouted += 1;
                            }
                        }
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            stats.connections += 1;
                            info!(connections = stats.connections, "mqtt_connected");
                            self.resubscribe();
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(error = %e, "mqtt_error");
                            tokio::select! {
                                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                                changed = shutdown.changed() => {
                                    if shutdown_requested(changed, &shutdown) {
                                        info!(?stats, "dispatcher_shutdown");
                                        tasks.abort_all();
                                        return Ok(stats);
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Queue a subscription for every route; a clean-start session loses them on reconnect
    fn resubscribe(&self) {
        for topic in self.routes.keys() {
            match self.client.try_subscribe(topic.clone(), QoS::AtLeastOnce) {
                Ok(()) => debug!(topic = %topic, "mqtt_subscribed"),
                Err(e) => warn!(topic = %topic, error = %e, "mqtt_subscribe_failed"),
            }
        }
    }

    /// Spawn the route's handler for `publish`; false when no route matches
    fn dispatch(&self, publish: Publish, tasks: &mut JoinSet<Result<bool, RelayError>>) -> bool {
        let topic = String::from_utf8_lossy(&publish.topic).into_owned();
        let Some((handler, context)) = self.routes.get(&topic) else {
            debug!(topic = %topic, "unrouted_message");
            return false;
        };

        let handler = Arc::clone(handler);
        let context = context.clone();
        let client = self.client.clone();
        tasks.spawn(async move {
            let message = inbound_message(&publish);
            let response = handler.handle(&message, &context).await?;
            if response != MessageResponse::Completed {
                return Ok(false);
            }
            match client.ack(&publish).await {
                Ok(()) => Ok(true),
                Err(e) => {
                    warn!(topic = %topic, error = %e, "mqtt_ack_failed");
                    Ok(false)
                }
            }
        });
        true
    }
}

/// A closed channel counts as a shutdown request
fn shutdown_requested(changed: Result<(), watch::error::RecvError>, shutdown: &watch::Receiver<bool>) -> bool {
    changed.is_err() || *shutdown.borrow()
}
