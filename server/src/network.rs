//! Server network layer handling websocket connections and game loop coordination

use crate::broadcast::Broadcaster;
use crate::clock::GameLoop;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::game::World;
use crate::input::{GameCommand, InputChannel};
use crate::registry::{ConnectionId, SessionRegistry, SharedRegistry};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{Role, RoleAssignment};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

/// Lifecycle of a single transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress; no role yet.
    Connecting,
    /// Registered and processing input.
    Active { id: ConnectionId, role: Role },
    /// Terminal.
    Closed,
}

/// Per-connection state machine driven by the connection task.
///
/// An active connection also watches its registry entry. Once the entry is
/// gone, whether the peer left or the broadcaster dropped it, input is no
/// longer forwarded even if the socket is still open.
#[derive(Debug)]
pub struct Connection {
    addr: SocketAddr,
    state: ConnectionState,
    removed: Option<watch::Receiver<bool>>,
}

impl Connection {
    /// Starts a connection in `Connecting` for a peer at `addr`.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            state: ConnectionState::Connecting,
            removed: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Moves `Connecting -> Active`. Any other transition is refused.
    ///
    /// `removed` is the registry's removal signal for `id`.
    pub fn activate(
        &mut self,
        id: ConnectionId,
        role: Role,
        removed: watch::Receiver<bool>,
    ) -> bool {
        if self.state != ConnectionState::Connecting {
            return false;
        }
        self.state = ConnectionState::Active { id, role };
        self.removed = Some(removed);
        true
    }

    /// True once the registry entry behind this connection has been removed.
    pub fn is_evicted(&self) -> bool {
        self.removed.as_ref().is_some_and(|removed| *removed.borrow())
    }

    /// Forwards an inbound payload to the input channel while active.
    ///
    /// Returns true if a move was queued.
    pub fn on_text(&self, raw: &str, input: &InputChannel) -> bool {
        match self.state {
            ConnectionState::Active { id, role } => {
                if self.is_evicted() {
                    debug!("Dropping input from removed connection {}", id);
                    return false;
                }
                input.on_message(role, raw)
            }
            _ => false,
        }
    }

    /// Moves to `Closed`. Returns the registry id to release if the
    /// connection was active; repeated calls return None.
    pub fn close(&mut self) -> Option<ConnectionId> {
        let released = match self.state {
            ConnectionState::Active { id, .. } => Some(id),
            _ => None,
        };
        if self.state != ConnectionState::Closed {
            debug!("Connection from {} closed", self.addr);
        }
        self.state = ConnectionState::Closed;
        released
    }
}

/// Everything a connection task needs, cloned into each one.
#[derive(Clone)]
struct ConnectionContext {
    registry: SharedRegistry,
    broadcaster: Arc<Broadcaster>,
    input: InputChannel,
    path: String,
    outbound_buffer: usize,
    send_timeout: Duration,
}

/// Main server coordinating the connection gateway and the game loop
pub struct Server {
    listener: TcpListener,
    registry: SharedRegistry,
    broadcaster: Arc<Broadcaster>,
    game_loop: GameLoop,
    input: InputChannel,
    config: ServerConfig,
}

impl Server {
    /// Validates `config`, binds the listener and builds the world, but does
    /// not start ticking until `run` or `run_until` is called.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let listener = TcpListener::bind(&config.bind_addr).await?;
        info!(
            "Server listening on ws://{}{}",
            listener.local_addr()?,
            config.path
        );

        let world = World::new(config.game.clone());
        let registry = SessionRegistry::shared();
        let broadcaster = Arc::new(Broadcaster::new(
            Arc::clone(&registry),
            &world.snapshot(),
        ));
        let (cmd_tx, cmd_rx) = mpsc::channel::<GameCommand>(config.input_queue);
        let game_loop = GameLoop::new(
            world,
            cmd_rx,
            Arc::clone(&broadcaster),
            config.tick_duration(),
        );

        Ok(Server {
            listener,
            registry,
            broadcaster,
            game_loop,
            input: InputChannel::new(cmd_tx),
            config,
        })
    }

    /// Address the listener actually bound, useful with port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle to the session registry, shared with every connection task.
    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    /// Serves until the process is killed.
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(std::future::pending()).await
    }

    /// Serves until `shutdown` resolves, then stops the game loop.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let Server {
            listener,
            registry,
            broadcaster,
            game_loop,
            input,
            config,
        } = self;

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let game_handle = tokio::spawn(game_loop.run(async {
            let _ = stop_rx.await;
        }));

        let ctx = ConnectionContext {
            registry,
            broadcaster,
            input,
            path: config.path.clone(),
            outbound_buffer: config.outbound_buffer,
            send_timeout: config.send_timeout,
        };

        tokio::pin!(shutdown);
        info!("Server started successfully");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Server shutting down");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            tokio::spawn(handle_connection(stream, addr, ctx.clone()));
                        }
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                }
            }
        }

        let _ = stop_tx.send(());
        match game_handle.await {
            Ok(world) => {
                let left = world.paddle(crate::game::Side::Left).score;
                let right = world.paddle(crate::game::Side::Right).score;
                info!("Final score {}-{}", left, right);
            }
            Err(e) => error!("Game loop task panicked: {}", e),
        }

        Ok(())
    }
}

/// Builds the handshake callback that only lets upgrades on `expected` through.
fn check_path(
    expected: String,
) -> impl FnOnce(&Request, Response) -> Result<Response, ErrorResponse> {
    move |request: &Request, response: Response| {
        if request.uri().path() == expected {
            Ok(response)
        } else {
            let mut rejection =
                ErrorResponse::new(Some(format!("no game at {}", request.uri().path())));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        }
    }
}

/// Encodes the role message followed by the current snapshot.
fn greeting(role: Role, latest_snapshot: String) -> Vec<Message> {
    let mut messages = Vec::with_capacity(2);
    match serde_json::to_string(&RoleAssignment::new(role)) {
        Ok(text) => messages.push(Message::Text(text)),
        Err(e) => error!("Failed to serialize role assignment: {}", e),
    }
    if !latest_snapshot.is_empty() {
        messages.push(Message::Text(latest_snapshot));
    }
    messages
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, ctx: ConnectionContext) {
    let mut conn = Connection::new(addr);

    let ws_stream = match accept_hdr_async(stream, check_path(ctx.path.clone())).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!("Websocket handshake with {} failed: {}", addr, e);
            conn.close();
            return;
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (msg_tx, mut msg_rx) = mpsc::channel::<Message>(ctx.outbound_buffer);

    // Queue the greeting under the write lock so no tick snapshot can
    // overtake the role message.
    let (id, role, removed) = {
        let mut registry = ctx.registry.write().await;
        let (id, role) = registry.register(addr, msg_tx.clone());
        let Some(removed) = registry.removal_signal(id) else {
            error!("Connection {} vanished during registration", id);
            return;
        };
        for message in greeting(role, ctx.broadcaster.latest()) {
            if msg_tx.try_send(message).is_err() {
                warn!("Could not queue greeting for connection {}", id);
            }
        }
        (id, role, removed)
    };
    // The registry entry now holds the only sender; removing it ends the writer.
    drop(msg_tx);
    let mut removal = removed.clone();
    conn.activate(id, role, removed);

    let send_timeout = ctx.send_timeout;
    let mut writer = tokio::spawn(async move {
        while let Some(message) = msg_rx.recv().await {
            match timeout(send_timeout, ws_sender.send(message)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!("Write to connection {} failed: {}", id, e);
                    return;
                }
                Err(_) => {
                    warn!("Write to connection {} timed out", id);
                    return;
                }
            }
        }
        let _ = timeout(send_timeout, ws_sender.close()).await;
    });

    loop {
        tokio::select! {
            incoming = ws_receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        conn.on_text(&text, &ctx.input);
                    }
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => {
                            conn.on_text(text, &ctx.input);
                        }
                        Err(_) => debug!("Dropping non-UTF-8 frame from connection {}", id),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Connection {} closed by peer", id);
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("Read from connection {} failed: {}", id, e);
                        break;
                    }
                }
            }
            _ = &mut writer => {
                debug!("Writer for connection {} finished", id);
                break;
            }
            _ = removal.changed() => {
                debug!("Connection {} was removed from the registry", id);
                break;
            }
        }
    }

    if let Some(id) = conn.close() {
        ctx.registry.write().await.unregister(id);
    }
    writer.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameConfig;
    use tokio::sync::mpsc;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn removal() -> (watch::Sender<bool>, watch::Receiver<bool>) {
        watch::channel(false)
    }

    #[test]
    fn test_connection_lifecycle() {
        let mut conn = Connection::new(test_addr());
        assert_eq!(conn.state(), ConnectionState::Connecting);
        let (_removed_tx, removed) = removal();

        assert!(conn.activate(4, Role::PlayerLeft, removed.clone()));
        assert_eq!(
            conn.state(),
            ConnectionState::Active {
                id: 4,
                role: Role::PlayerLeft
            }
        );
        assert!(!conn.activate(5, Role::PlayerRight, removed.clone()));

        assert_eq!(conn.close(), Some(4));
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(conn.close(), None);
        assert!(!conn.activate(6, Role::Observer, removed));
    }

    #[test]
    fn test_close_before_activation_releases_nothing() {
        let mut conn = Connection::new(test_addr());
        assert_eq!(conn.close(), None);
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_only_active_connections_forward_input() {
        let (tx, mut rx) = mpsc::channel(8);
        let input = InputChannel::new(tx);
        let raw = r#"{"playerId":1,"positionY":5}"#;
        let mut conn = Connection::new(test_addr());

        let (_removed_tx, removed) = removal();

        assert!(!conn.on_text(raw, &input));
        conn.activate(1, Role::PlayerLeft, removed);
        assert!(conn.on_text(raw, &input));
        conn.close();
        assert!(!conn.on_text(raw, &input));

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connection_dropped_by_broadcast_stops_forwarding() {
        let registry = SessionRegistry::shared();
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        slow_tx
            .try_send(Message::Text("backlog".to_string()))
            .unwrap();

        let mut slow = Connection::new(test_addr());
        {
            let mut registry = registry.write().await;
            let (id, role) = registry.register(test_addr(), slow_tx);
            assert_eq!(role, Role::PlayerLeft);
            slow.activate(id, role, registry.removal_signal(id).unwrap());
        }

        let world = World::with_seed(GameConfig::default(), 11);
        let broadcaster = Broadcaster::new(Arc::clone(&registry), &world.snapshot());
        let report = broadcaster.publish(&world.snapshot()).await;
        assert_eq!(report.dropped.len(), 1);
        assert!(slow.is_evicted());

        let (new_tx, _new_rx) = mpsc::channel(4);
        let (_, newcomer) = registry
            .write()
            .await
            .register("127.0.0.1:8081".parse().unwrap(), new_tx);
        assert_eq!(newcomer, Role::PlayerLeft);

        let (cmd_tx, mut cmd_rx) = mpsc::channel(8);
        let input = InputChannel::new(cmd_tx);
        assert!(!slow.on_text(r#"{"playerId":1,"positionY":-100}"#, &input));
        assert!(cmd_rx.try_recv().is_err());

        // Its own cleanup must not release the newcomer's seat.
        if let Some(id) = slow.close() {
            assert!(registry.write().await.unregister(id).is_none());
        }
        assert_eq!(registry.read().await.players(), 1);
    }

    #[test]
    fn test_greeting_order() {
        let messages = greeting(Role::PlayerRight, "{\"snapshot\":true}".to_string());

        assert_eq!(messages.len(), 2);
        match &messages[0] {
            Message::Text(text) => assert!(text.contains("player-right")),
            other => panic!("Unexpected message {:?}", other),
        }
        assert_eq!(messages[1], Message::Text("{\"snapshot\":true}".to_string()));
    }

    #[test]
    fn test_path_check() {
        let accepted = Request::builder()
            .uri("ws://localhost/game")
            .body(())
            .unwrap();
        assert!(check_path("/game".to_string())(&accepted, Response::new(())).is_ok());

        let rejected = Request::builder()
            .uri("ws://localhost/chat")
            .body(())
            .unwrap();
        let err = check_path("/game".to_string())(&rejected, Response::new(())).unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let config = ServerConfig {
            tick_rate: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(
            Server::bind(config).await,
            Err(ServerError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            game: GameConfig::default(),
            ..ServerConfig::default()
        };
        let server = tokio_test::assert_ok!(Server::bind(config).await);

        assert_ne!(server.local_addr().unwrap().port(), 0);
        assert!(server.registry().read().await.is_empty());
    }
}
