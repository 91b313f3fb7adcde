//! Sync Client
//!
//! Long-lived connection to the sync server for viewers and admin
//! controls. Keeps one handler per topic, one refresh callback per data
//! domain, and reconnects on a fixed delay after the link drops.
//!
//! Handlers run on the connection task. They must not block; hand work
//! off to a channel when it is expensive.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::network::protocol::{ClientMessage, RefreshKind, ServerMessage, Topic, TournamentEvent};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct SyncClientConfig {
    /// Server URL.
    pub url: String,
    /// Delay between reconnection attempts.
    pub reconnect_delay: Duration,
    /// Time allowed for one connection attempt.
    pub connect_timeout: Duration,
    /// Give up after this many consecutive failed attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for SyncClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080".to_string(),
            reconnect_delay: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            max_attempts: None,
        }
    }
}

impl SyncClientConfig {
    /// Default config for a server URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Client errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncClientError {
    /// No live connection.
    #[error("not connected")]
    NotConnected,
    /// The client was shut down.
    #[error("client has been shut down")]
    ShutDown,
}

/// Topic message body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Body parsed as JSON.
    Json(serde_json::Value),
    /// Body that is not JSON, passed through as text.
    Raw(String),
}

impl Payload {
    fn parse(body: String) -> Self {
        match serde_json::from_str(&body) {
            Ok(value) => Payload::Json(value),
            Err(_) => Payload::Raw(body),
        }
    }
}

/// Message delivered to a topic handler.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicMessage {
    /// Topic.
    pub topic: Topic,
    /// Transition revision.
    pub revision: u64,
    /// Body.
    pub payload: Payload,
}

type TopicHandler = Arc<dyn Fn(&TopicMessage) + Send + Sync>;
type RefreshCallback = Arc<dyn Fn() + Send + Sync>;
type ResponseHandler = Arc<dyn Fn(&ServerMessage) + Send + Sync>;

#[derive(Default)]
struct Registry {
    handlers: BTreeMap<Topic, TopicHandler>,
    refresh: BTreeMap<RefreshKind, RefreshCallback>,
    response: Option<ResponseHandler>,
    /// Last revision each refresh kind fired for.
    fired: BTreeMap<RefreshKind, u64>,
    /// Topics the server has been asked to send on the live connection.
    server_topics: BTreeSet<Topic>,
    /// Outgoing frames for the live connection.
    outgoing: Option<mpsc::UnboundedSender<ClientMessage>>,
    shut_down: bool,
}

impl Registry {
    fn desired_topics(&self) -> BTreeSet<Topic> {
        if self.refresh.is_empty() {
            self.handlers.keys().copied().collect()
        } else {
            Topic::ALL.into_iter().collect()
        }
    }

    /// Bring the server-side subscriptions in line with the registry.
    fn sync_subscriptions(&mut self) {
        let Some(outgoing) = self.outgoing.clone() else {
            return;
        };
        let desired = self.desired_topics();

        for topic in desired.difference(&self.server_topics) {
            let _ = outgoing.send(ClientMessage::Subscribe { topic: *topic });
        }
        for topic in self.server_topics.difference(&desired) {
            let _ = outgoing.send(ClientMessage::Unsubscribe { topic: *topic });
        }
        self.server_topics = desired;
    }
}

struct Shared {
    config: SyncClientConfig,
    registry: Mutex<Registry>,
    connected: watch::Sender<bool>,
    shutdown: watch::Sender<bool>,
}

impl Shared {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_connected(&self, connected: bool) {
        self.connected.send_if_modified(|current| {
            let changed = *current != connected;
            *current = connected;
            changed
        });
    }

    /// Route one frame. Callbacks run after the registry lock is released.
    fn dispatch(&self, text: &str) {
        let msg = match ServerMessage::from_json(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "Ignoring unrecognized frame");
                return;
            }
        };

        match msg {
            ServerMessage::Event { topic, revision, body } => {
                let message = TopicMessage {
                    topic,
                    revision,
                    payload: Payload::parse(body),
                };
                let kinds = refresh_kinds(&message);

                let (handler, callbacks) = {
                    let mut registry = self.registry();
                    let handler = registry.handlers.get(&topic).cloned();
                    let mut callbacks = Vec::new();
                    for kind in kinds {
                        if registry.fired.get(&kind) == Some(&revision) {
                            continue;
                        }
                        if let Some(callback) = registry.refresh.get(&kind).cloned() {
                            registry.fired.insert(kind, revision);
                            callbacks.push(callback);
                        }
                    }
                    (handler, callbacks)
                };

                if let Some(handler) = handler {
                    handler(&message);
                }
                for callback in callbacks {
                    callback();
                }
            }
            ServerMessage::Subscribed { topic } | ServerMessage::Unsubscribed { topic } => {
                debug!(%topic, "Subscription acknowledged");
            }
            other => {
                let handler = self.registry().response.clone();
                match handler {
                    Some(handler) => handler(&other),
                    None => debug!("Dropping response with no handler"),
                }
            }
        }
    }

    /// Reset per-connection state and re-send subscriptions.
    ///
    /// Revisions are only comparable within one server process, so the
    /// dedupe history starts over; on reconnect every callback fires once
    /// to cover whatever was missed.
    fn connection_established(&self, outgoing: mpsc::UnboundedSender<ClientMessage>, reconnect: bool) {
        {
            let mut registry = self.registry();
            registry.outgoing = Some(outgoing);
            registry.fired.clear();
            registry.server_topics.clear();
            registry.sync_subscriptions();
        }
        self.set_connected(true);

        if reconnect {
            self.refresh_all();
        }
    }

    /// Fire every refresh callback once.
    fn refresh_all(&self) {
        let callbacks: Vec<RefreshCallback> = self.registry().refresh.values().cloned().collect();
        for callback in callbacks {
            callback();
        }
    }
}

/// Data domains a message invalidates.
///
/// Bodies that are not recognized events still trigger a tournament
/// refresh when they carry the plain-text markers older servers send.
fn refresh_kinds(message: &TopicMessage) -> Vec<RefreshKind> {
    if let Payload::Json(value) = &message.payload {
        if let Ok(event) = serde_json::from_value::<TournamentEvent>(value.clone()) {
            return event.refresh_kinds();
        }
    }

    let text = match &message.payload {
        Payload::Raw(text) => text.as_str(),
        Payload::Json(serde_json::Value::String(text)) => text.as_str(),
        Payload::Json(_) => "",
    };

    let triggered = match message.topic {
        Topic::GameResultRecorded => true,
        Topic::TournamentStateChanged => {
            text == "update" || text.contains("tournament_started") || text.contains("tournament_finished")
        }
        Topic::RefreshRequired => text.contains("refresh_required"),
    };

    if triggered {
        vec![RefreshKind::Tournament]
    } else {
        Vec::new()
    }
}

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Lost,
    Shutdown,
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Sync client.
pub struct SyncClient {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncClient {
    /// Create a disconnected client.
    pub fn new(config: SyncClientConfig) -> Self {
        let (connected, _) = watch::channel(false);
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                config,
                registry: Mutex::new(Registry::default()),
                connected,
                shutdown,
            }),
            task: Mutex::new(None),
        }
    }

    /// Start the connection task. Calling it again while running is a no-op.
    pub fn connect(&self) -> Result<(), SyncClientError> {
        if self.shared.registry().shut_down {
            return Err(SyncClientError::ShutDown);
        }

        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Ok(());
        }

        let shared = self.shared.clone();
        *task = Some(tokio::spawn(run_connection_loop(shared)));
        Ok(())
    }

    /// Whether the connection is currently open.
    pub fn is_connected(&self) -> bool {
        *self.shared.connected.borrow()
    }

    /// Observe connection state changes.
    pub fn connection_watcher(&self) -> watch::Receiver<bool> {
        self.shared.connected.subscribe()
    }

    /// Handle messages on a topic, replacing any previous handler.
    pub fn subscribe<F>(&self, topic: Topic, handler: F)
    where
        F: Fn(&TopicMessage) + Send + Sync + 'static,
    {
        let mut registry = self.shared.registry();
        if registry.shut_down {
            return;
        }
        if registry.handlers.insert(topic, Arc::new(handler)).is_some() {
            debug!(%topic, "Replaced topic handler");
        }
        registry.sync_subscriptions();
    }

    /// Remove the handler for a topic. No-op if none is registered.
    pub fn unsubscribe(&self, topic: Topic) {
        let mut registry = self.shared.registry();
        if registry.handlers.remove(&topic).is_some() {
            registry.sync_subscriptions();
        }
    }

    /// Register the refresh callback for a data domain, replacing any
    /// previous one. Fires at most once per server transition and once on
    /// every reconnect.
    pub fn register_refresh_callback<F>(&self, kind: RefreshKind, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut registry = self.shared.registry();
        if registry.shut_down {
            return;
        }
        registry.refresh.insert(kind, Arc::new(callback));
        registry.sync_subscriptions();
    }

    /// Remove the refresh callback for a data domain.
    pub fn unregister_refresh_callback(&self, kind: RefreshKind) {
        let mut registry = self.shared.registry();
        if registry.refresh.remove(&kind).is_some() {
            registry.sync_subscriptions();
        }
    }

    /// Handle replies to requests sent with [`SyncClient::send`].
    pub fn on_response<F>(&self, handler: F)
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        self.shared.registry().response = Some(Arc::new(handler));
    }

    /// Send a request on the live connection.
    pub fn send(&self, msg: ClientMessage) -> Result<(), SyncClientError> {
        let registry = self.shared.registry();
        if registry.shut_down {
            return Err(SyncClientError::ShutDown);
        }
        let outgoing = registry.outgoing.as_ref().ok_or(SyncClientError::NotConnected)?;
        outgoing.send(msg).map_err(|_| SyncClientError::NotConnected)
    }

    /// Unsubscribe everything, close the connection and stop reconnecting.
    ///
    /// No handler or callback runs after this returns.
    pub async fn shutdown(&self) {
        {
            let mut registry = self.shared.registry();
            registry.shut_down = true;
            registry.handlers.clear();
            registry.refresh.clear();
            registry.response = None;
            registry.sync_subscriptions();
        }
        self.shared.shutdown.send_replace(true);

        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.shared.set_connected(false);
        info!("Sync client shut down");
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        self.shared.shutdown.send_replace(true);
    }
}

async fn run_connection_loop(shared: Arc<Shared>) {
    let mut shutdown_rx = shared.shutdown.subscribe();
    let config = shared.config.clone();
    let mut attempts: u32 = 0;
    let mut ever_connected = false;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        attempts += 1;

        let connect = tokio::time::timeout(config.connect_timeout, connect_async(config.url.as_str()));
        let result = tokio::select! {
            result = connect => result,
            _ = shutdown_rx.changed() => break,
        };

        match result {
            Ok(Ok((socket, _))) => {
                attempts = 0;
                let reconnect = ever_connected;
                ever_connected = true;
                info!(url = %config.url, reconnect, "Connected");

                let exit = drive_connection(&shared, socket, reconnect, &mut shutdown_rx).await;
                shared.set_connected(false);
                if exit == Exit::Shutdown {
                    break;
                }
                warn!(url = %config.url, "Connection lost");
            }
            Ok(Err(e)) => warn!(url = %config.url, attempt = attempts, error = %e, "Connect failed"),
            Err(_) => warn!(url = %config.url, attempt = attempts, "Connect timed out"),
        }

        if let Some(max) = config.max_attempts {
            if attempts >= max {
                error!(url = %config.url, attempts, "Giving up on reconnection");
                break;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(config.reconnect_delay) => {}
            _ = shutdown_rx.changed() => break,
        }
    }

    shared.set_connected(false);
}

async fn drive_connection(
    shared: &Shared,
    socket: Socket,
    reconnect: bool,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Exit {
    let (mut write, mut read) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ClientMessage>();

    shared.connection_established(out_tx, reconnect);

    let exit = loop {
        tokio::select! {
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => shared.dispatch(&text),
                    Some(Ok(Message::Close(_))) | None => break Exit::Lost,
                    Some(Err(e)) => {
                        debug!(error = %e, "Read failed");
                        break Exit::Lost;
                    }
                    _ => {}
                }
            }
            out = out_rx.recv() => {
                let Some(msg) = out else { continue };
                match msg.to_json() {
                    Ok(text) => {
                        if write.send(Message::Text(text)).await.is_err() {
                            break Exit::Lost;
                        }
                    }
                    Err(e) => error!(error = %e, "Failed to serialize message"),
                }
            }
            _ = shutdown_rx.changed() => {
                // Flush the unsubscribe frames queued by shutdown.
                while let Ok(msg) = out_rx.try_recv() {
                    if let Ok(text) = msg.to_json() {
                        let _ = write.send(Message::Text(text)).await;
                    }
                }
                let _ = write.send(Message::Close(None)).await;
                break Exit::Shutdown;
            }
        }
    };

    let mut registry = shared.registry();
    registry.outgoing = None;
    registry.server_topics.clear();
    exit
}
