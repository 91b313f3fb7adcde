//! WebSocket Sync Server
//!
//! Serves tournament snapshots, accepts admin commands and fans out
//! committed transitions to subscribed connections.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock, broadcast};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};
use uuid::Uuid;

use crate::network::auth::{self, AuthConfig};
use crate::network::protocol::{
    ClientMessage, ServerMessage, ServerError, ErrorCode, RefreshKind, Topic, TournamentEvent,
};
use crate::network::publisher::Published;
use crate::service::{AdminIdentity, TournamentService};
use crate::tournament::snapshot::Viewer;

/// Outbound frames buffered per connection before events are dropped.
const OUTBOUND_BUFFER: usize = 64;

/// Time allowed for the close handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("KOTH_BIND_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bind_addr),
            max_connections: std::env::var("KOTH_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            version: defaults.version,
        }
    }
}

/// Sync server errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),
}

/// Connected client registry, keyed by connection id.
type Clients = Arc<RwLock<BTreeMap<Uuid, SocketAddr>>>;

/// The sync server.
pub struct SyncServer {
    /// Server configuration.
    config: ServerConfig,
    /// Token validation.
    auth: Arc<AuthConfig>,
    /// Tournament service.
    service: Arc<TournamentService>,
    /// Bound listener.
    listener: TcpListener,
    /// Connected clients.
    clients: Clients,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
    /// Drops every connection without stopping the listener.
    kick_tx: broadcast::Sender<()>,
}

impl SyncServer {
    /// Bind the listener.
    pub async fn bind(
        config: ServerConfig,
        auth: AuthConfig,
        service: Arc<TournamentService>,
    ) -> Result<Self, SyncServerError> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let (shutdown_tx, _) = broadcast::channel(1);
        let (kick_tx, _) = broadcast::channel(1);

        if !auth.is_configured() {
            warn!("No token validation configured; admin commands will be rejected");
        }

        Ok(Self {
            config,
            auth: Arc::new(auth),
            service,
            listener,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
            kick_tx,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, SyncServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until [`SyncServer::shutdown`] is called.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), SyncServerError> {
        info!(
            "Sync server v{} listening on {}",
            self.config.version,
            self.local_addr()?
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                Self::reject_connection(stream, addr);
                                continue;
                            }

                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Complete the handshake only to report the connection limit.
    fn reject_connection(stream: TcpStream, addr: SocketAddr) {
        tokio::spawn(async move {
            let mut ws = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    debug!("Handshake failed for rejected {}: {}", addr, e);
                    return;
                }
            };
            let error = ServerMessage::Error(ServerError::new(
                ErrorCode::ServerOverloaded,
                "Connection limit reached",
            ));
            if let Ok(text) = error.to_json() {
                let _ = ws.send(Message::Text(text)).await;
            }
            let _ = ws.close(None).await;
        });
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let service = self.service.clone();
        let auth = self.auth.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut kick_rx = self.kick_tx.subscribe();
        let mut events = self.service.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let connection_id = Uuid::new_v4();
            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_BUFFER);

            clients.write().await.insert(connection_id, addr);
            info!(%connection_id, "Client {} connected", addr);

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        return;
                    }
                }
                let _ = ws_sender.send(Message::Close(None)).await;
                let _ = ws_sender.close().await;
            });

            let mut topics: BTreeSet<Topic> = BTreeSet::new();

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let reply = match ClientMessage::from_json(&text) {
                                    Ok(client_msg) => {
                                        Self::handle_client_message(client_msg, &mut topics, &service, &auth).await
                                    }
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        ServerMessage::Error(ServerError::new(
                                            ErrorCode::InvalidInput,
                                            "Invalid message format",
                                        ))
                                    }
                                };
                                if msg_tx.send(reply).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                warn!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    event = events.recv() => {
                        match event {
                            Ok(published) => Self::forward_event(published, &topics, &msg_tx),
                            Err(RecvError::Lagged(skipped)) => {
                                warn!(skipped, "Client {} lagged behind broadcasts", addr);
                                if topics.contains(&Topic::RefreshRequired) {
                                    Self::forward_event(Self::full_refresh(service.revision()), &topics, &msg_tx);
                                }
                            }
                            Err(RecvError::Closed) => break,
                        }
                    }
                    _ = kick_rx.recv() => {
                        debug!("Dropping client {}", addr);
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Cleanup
            clients.write().await.remove(&connection_id);
            drop(msg_tx);
            if tokio::time::timeout(CLOSE_TIMEOUT, sender_task).await.is_err() {
                debug!("Close handshake timed out for {}", addr);
            }

            info!(%connection_id, "Client {} cleaned up", addr);
        });
    }

    /// Queue a broadcast if the connection subscribed to its topic.
    ///
    /// Events are dropped rather than awaited when the outbound buffer is
    /// full, so one slow client cannot stall the others.
    fn forward_event(published: Published, topics: &BTreeSet<Topic>, sender: &mpsc::Sender<ServerMessage>) {
        if !topics.contains(&published.topic) {
            return;
        }
        let topic = published.topic;
        let msg = ServerMessage::Event {
            topic,
            revision: published.revision,
            body: published.body,
        };
        if sender.try_send(msg).is_err() {
            debug!(%topic, "Outbound buffer full, dropping event");
        }
    }

    /// Refresh-everything message for clients that lost broadcasts.
    fn full_refresh(revision: u64) -> Published {
        let event = TournamentEvent::RefreshRequired {
            kinds: vec![RefreshKind::Tournament, RefreshKind::Players, RefreshKind::Maps, RefreshKind::Logs],
        };
        Published {
            topic: event.topic(),
            revision,
            body: serde_json::to_string(&event).unwrap_or_else(|_| "refresh_required".to_string()),
        }
    }

    /// Handle a client message. Every message gets exactly one reply.
    async fn handle_client_message(
        msg: ClientMessage,
        topics: &mut BTreeSet<Topic>,
        service: &TournamentService,
        auth: &AuthConfig,
    ) -> ServerMessage {
        Self::dispatch(msg, topics, service, auth)
            .await
            .unwrap_or_else(ServerMessage::Error)
    }

    async fn dispatch(
        msg: ClientMessage,
        topics: &mut BTreeSet<Topic>,
        service: &TournamentService,
        auth: &AuthConfig,
    ) -> Result<ServerMessage, ServerError> {
        let reply = match msg {
            ClientMessage::Subscribe { topic } => {
                topics.insert(topic);
                ServerMessage::Subscribed { topic }
            }
            ClientMessage::Unsubscribe { topic } => {
                topics.remove(&topic);
                ServerMessage::Unsubscribed { topic }
            }
            ClientMessage::GetCurrentTournament { token } => {
                let viewer = match token {
                    Some(token) if auth::authorize_admin(&token, auth).is_ok() => Viewer::Admin,
                    _ => Viewer::Public,
                };
                ServerMessage::Snapshot { snapshot: service.snapshot(viewer).await }
            }
            ClientMessage::GetTournamentLog { tournament_id, token } => {
                Self::authorize(&token, auth)?;
                ServerMessage::Log { record: service.tournament_log(tournament_id).await? }
            }
            ClientMessage::DownloadTournamentLog { tournament_id, token } => {
                Self::authorize(&token, auth)?;
                let rendered = service.render_log(tournament_id).await?;
                ServerMessage::LogFile {
                    tournament_id,
                    file_name: rendered.file_name,
                    content: rendered.content,
                }
            }
            ClientMessage::ListTournamentLogs { token } => {
                Self::authorize(&token, auth)?;
                ServerMessage::Logs { logs: service.tournament_logs() }
            }
            ClientMessage::StartTournament { token } => {
                let admin = Self::authorize(&token, auth)?;
                let tournament = service.start_tournament(&admin).await?;
                ServerMessage::Tournament { tournament: (*tournament).clone() }
            }
            ClientMessage::RecordResult { token, winner_id, expected_round } => {
                let admin = Self::authorize(&token, auth)?;
                let tournament = service.record_result(&admin, winner_id, expected_round).await?;
                ServerMessage::Tournament { tournament: (*tournament).clone() }
            }
            ClientMessage::EndTournament { token } => {
                let admin = Self::authorize(&token, auth)?;
                let tournament = service.end_tournament(&admin).await?;
                ServerMessage::Tournament { tournament: (*tournament).clone() }
            }
            ClientMessage::RemovePlayer { token, player_id } => {
                let admin = Self::authorize(&token, auth)?;
                let existed = service.remove_player(&admin, player_id).await?;
                ServerMessage::PlayerRemoved { player_id, existed }
            }
            ClientMessage::Ping { timestamp } => ServerMessage::Pong {
                timestamp,
                server_time: Utc::now().timestamp_millis().max(0) as u64,
            },
        };
        Ok(reply)
    }

    fn authorize(token: &str, auth: &AuthConfig) -> Result<AdminIdentity, ServerError> {
        auth::authorize_admin(token, auth).map_err(|e| {
            warn!("Rejected admin command: {}", e);
            ServerError::new(ErrorCode::Unauthorized, e.to_string())
        })
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Close every connection but keep accepting new ones.
    pub fn disconnect_all(&self) -> usize {
        self.kick_tx.send(()).unwrap_or(0)
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }
}
