//! WebSocket Event Gateway
//!
//! Async WebSocket server for game connections. Authenticates the
//! handshake, routes client messages into the session engine, fans
//! results out to room participants and arms the disconnect grace
//! timer when a connection drops.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::network::auth::{credential_from_headers, resolve_identity, AuthConfig};
use crate::network::directory::ConnId;
use crate::network::protocol::{ClientMessage, GameErrorMessage, ServerMessage};
use crate::network::service::{GameService, MoveOutcome, RecoveredState};
use crate::store::{UserRecord, UserStore};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// How long a dropped player may reconnect before forfeiting.
    pub disconnect_grace: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            max_connections: 1000,
            disconnect_grace: Duration::from_secs(10),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Build from environment variables, falling back to defaults:
    /// `GRIDMATCH_BIND_ADDR`, `GRIDMATCH_MAX_CONNECTIONS`,
    /// `GRIDMATCH_DISCONNECT_GRACE_SECS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let bind_addr = std::env::var("GRIDMATCH_BIND_ADDR")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.bind_addr);
        let max_connections = std::env::var("GRIDMATCH_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_connections);
        let disconnect_grace = std::env::var("GRIDMATCH_DISCONNECT_GRACE_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.disconnect_grace);

        Self {
            bind_addr,
            max_connections,
            disconnect_grace,
            version: defaults.version,
        }
    }
}

/// Gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Connected client state. Identity is fixed at handshake time.
struct ClientHandle {
    /// Authenticated user record.
    user: UserRecord,
    /// Message sender for direct messaging to this client.
    sender: mpsc::Sender<ServerMessage>,
}

type ClientMap = Arc<RwLock<BTreeMap<ConnId, ClientHandle>>>;

/// The gateway.
pub struct GameServer {
    config: ServerConfig,
    auth: AuthConfig,
    service: Arc<GameService>,
    users: Arc<dyn UserStore>,
    clients: ClientMap,
    next_conn: AtomicU64,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new gateway over an engine and its user directory.
    pub fn new(
        config: ServerConfig,
        auth: AuthConfig,
        service: Arc<GameService>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            auth,
            service,
            users,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            next_conn: AtomicU64::new(1),
            shutdown_tx,
        }
    }

    /// Run the accept loop until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Gateway listening on {}", self.config.bind_addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let count = self.clients.read().await.len();
                            if count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
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

    /// Handle a new WebSocket connection end to end.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let service = self.service.clone();
        let users = self.users.clone();
        let auth = self.auth.clone();
        let grace = self.config.disconnect_grace;
        let conn = self.next_conn.fetch_add(1, Ordering::Relaxed);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            // Capture credentials during the HTTP upgrade
            let mut cookie_header: Option<String> = None;
            let mut authorization: Option<String> = None;
            let ws_stream = match accept_hdr_async(stream, |req: &Request, resp: Response| {
                cookie_header = req
                    .headers()
                    .get("Cookie")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                authorization = req
                    .headers()
                    .get("Authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                Ok(resp)
            })
            .await
            {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();

            // Gate: resolve the identity before the connection exists
            // for anyone else
            let credential =
                credential_from_headers(cookie_header.as_deref(), authorization.as_deref());
            let user = match resolve_identity(credential.as_deref(), &auth, &users).await {
                Ok(user) => user,
                Err(e) => {
                    warn!("Rejected connection from {}: {}", addr, e);
                    let _ = ws_sender.send(Message::Close(None)).await;
                    return;
                }
            };
            let user_id = user.id;
            info!(conn, user = %user_id, "connection authenticated");

            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            {
                let mut clients = clients.write().await;
                clients.insert(
                    conn,
                    ClientHandle {
                        user,
                        sender: msg_tx.clone(),
                    },
                );
            }

            // Sender task: serializes and writes outbound messages
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
                        break;
                    }
                }
            });

            // Connect-time hint: an active session exists, the client
            // should resynchronize
            match service.connect_hint(user_id, conn).await {
                Ok(true) => {
                    let _ = msg_tx.send(ServerMessage::InGame).await;
                }
                Ok(false) => {}
                Err(e) => error!(conn, "connect hint failed: {}", e),
            }

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message on conn {}: {}", conn, e);
                                        let _ = msg_tx.send(ServerMessage::Error(GameErrorMessage {
                                            message: "Invalid message format".to_string(),
                                            kind: Some("invalid_message".to_string()),
                                        })).await;
                                        continue;
                                    }
                                };

                                Self::handle_client_message(
                                    conn,
                                    user_id,
                                    client_msg,
                                    &clients,
                                    &service,
                                    &msg_tx,
                                ).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Conn {} disconnected", conn);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error on conn {}: {}", conn, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            sender_task.abort();

            {
                let mut clients = clients.write().await;
                clients.remove(&conn);
            }

            Self::handle_disconnect(conn, user_id, &clients, &service, grace).await;
            debug!("Conn {} cleaned up", conn);
        });
    }

    /// Route one client message into the engine and fan out results.
    async fn handle_client_message(
        conn: ConnId,
        user: crate::game::room::UserId,
        msg: ClientMessage,
        clients: &ClientMap,
        service: &Arc<GameService>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match msg {
            ClientMessage::CreateRoom => match service.create_room(user, conn).await {
                Ok(summary) => {
                    let _ = sender.send(ServerMessage::RoomCreated(summary)).await;
                }
                Err(e) => {
                    let _ = sender.send(ServerMessage::Error(e.to_message())).await;
                }
            },

            ClientMessage::JoinRoom { room_code } => {
                match service.join_room(user, conn, &room_code).await {
                    Ok(joined) => {
                        let _ = sender
                            .send(ServerMessage::StartGame(joined.snapshot))
                            .await;
                        Self::broadcast_room(
                            clients,
                            service,
                            &joined.room_code,
                            ServerMessage::GameStarted,
                            None,
                        )
                        .await;
                    }
                    Err(e) => {
                        let _ = sender.send(ServerMessage::Error(e.to_message())).await;
                    }
                }
            }

            ClientMessage::MakeMove {
                room_code,
                position,
            } => match service.make_move(user, &room_code, position).await {
                Ok(MoveOutcome::Progress {
                    room_code,
                    snapshot,
                }) => {
                    Self::broadcast_room(
                        clients,
                        service,
                        &room_code,
                        ServerMessage::BoardUpdated(snapshot),
                        None,
                    )
                    .await;
                }
                Ok(MoveOutcome::Ended {
                    room_code,
                    winner,
                    winning_line,
                }) => {
                    Self::broadcast_room(
                        clients,
                        service,
                        &room_code,
                        ServerMessage::GameEnded {
                            winner,
                            winning_line,
                        },
                        None,
                    )
                    .await;
                }
                Err(e) => {
                    let _ = sender.send(ServerMessage::Error(e.to_message())).await;
                }
            },

            ClientMessage::PlayAgain { room_code } => {
                match service.play_again(&room_code).await {
                    Ok(rematch) => {
                        // Personalized payloads: each participant gets
                        // a snapshot with their own opponent populated
                        let conns = service.directory().conns_in_room(&rematch.new_room).await;
                        let clients_guard = clients.read().await;
                        for (user_id, snapshot) in rematch.personalized {
                            for target in &conns {
                                if let Some(handle) = clients_guard.get(target) {
                                    if handle.user.id == user_id {
                                        let _ = handle
                                            .sender
                                            .send(ServerMessage::RematchStarted(snapshot.clone()))
                                            .await;
                                    }
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = sender.send(ServerMessage::Error(e.to_message())).await;
                    }
                }
            }

            ClientMessage::LeaveRoom { room_code } => {
                match service.leave_room(user, conn, &room_code).await {
                    Ok(left) => {
                        let _ = sender.send(ServerMessage::LeftRoom).await;
                        if !left.deleted {
                            Self::broadcast_room(
                                clients,
                                service,
                                &left.room_code,
                                ServerMessage::PlayerLeft {
                                    user_id: left.user_id,
                                },
                                Some(conn),
                            )
                            .await;
                            if let Some(winner) = left.forfeit_winner {
                                Self::broadcast_room(
                                    clients,
                                    service,
                                    &left.room_code,
                                    ServerMessage::GameEnded {
                                        winner,
                                        winning_line: None,
                                    },
                                    Some(conn),
                                )
                                .await;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = sender.send(ServerMessage::Error(e.to_message())).await;
                    }
                }
            }

            ClientMessage::GetState => match service.recover_state(user, conn).await {
                Ok(RecoveredState::None) => {
                    let _ = sender.send(ServerMessage::NoActiveGame).await;
                }
                Ok(RecoveredState::Waiting { room_code }) => {
                    let _ = sender.send(ServerMessage::RoomState { room_code }).await;
                }
                Ok(RecoveredState::Playing(snapshot)) => {
                    let _ = sender.send(ServerMessage::GameState(snapshot)).await;
                }
                Err(e) => {
                    let _ = sender.send(ServerMessage::Error(e.to_message())).await;
                }
            },
        }
    }

    /// Arm the disconnect grace timer for a dropped connection.
    ///
    /// The binding generation is captured now; if the player reconnects
    /// before the timer fires, the rebind bumps it and the settlement
    /// below is a no-op.
    async fn handle_disconnect(
        conn: ConnId,
        user: crate::game::room::UserId,
        clients: &ClientMap,
        service: &Arc<GameService>,
        grace: Duration,
    ) {
        let directory = service.directory().clone();
        directory.unbind_conn(conn).await;

        let binding = match directory.binding_of_user(user).await {
            Some(binding) => binding,
            None => return,
        };

        info!(
            user = %user,
            room = %binding.room_code,
            grace_secs = grace.as_secs(),
            "connection dropped, grace timer armed"
        );

        let clients = clients.clone();
        let service = service.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;

            match service
                .handle_disconnect_grace(user, &binding.room_code, binding.generation)
                .await
            {
                Ok(Some(forfeit)) => {
                    Self::broadcast_room(
                        &clients,
                        &service,
                        &forfeit.room_code,
                        ServerMessage::OpponentLeft,
                        None,
                    )
                    .await;
                    Self::broadcast_room(
                        &clients,
                        &service,
                        &forfeit.room_code,
                        ServerMessage::GameEnded {
                            winner: forfeit.winner,
                            winning_line: None,
                        },
                        None,
                    )
                    .await;
                }
                Ok(None) => {}
                Err(e) => error!(user = %user, "grace settlement failed: {}", e),
            }
        });
    }

    /// Send a message to every connection bound to a room, optionally
    /// excluding the originating connection.
    async fn broadcast_room(
        clients: &ClientMap,
        service: &Arc<GameService>,
        room_code: &str,
        msg: ServerMessage,
        except: Option<ConnId>,
    ) {
        let conns = service.directory().conns_in_room(room_code).await;
        let clients = clients.read().await;
        for conn in conns {
            if Some(conn) == except {
                continue;
            }
            if let Some(handle) = clients.get(&conn) {
                let _ = handle.sender.send(msg.clone()).await;
            }
        }
    }

    /// Signal shutdown to the accept loop and all connections.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }
}
