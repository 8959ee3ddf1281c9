//! # Pong Game Server Library
//!
//! This library provides the authoritative server for a two-paddle ball game.
//! It owns the canonical game state, applies paddle moves sent by clients,
//! and pushes a snapshot of the world to every connected client once per tick.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The server runs the only copy of the game physics. Clients send paddle
//! deltas and render whatever snapshots they receive; they never decide where
//! the ball is or who scored.
//!
//! ### Seat Management
//! The first two connections take the left and right paddles. Everyone after
//! that watches as an observer. When a player leaves, the next connection
//! takes the free paddle.
//!
//! ### State Broadcasting
//! After every physics step the world is serialized once and queued on every
//! connection. A connection that cannot keep up is dropped rather than
//! allowed to slow down the others.
//!
//! ## Architecture Design
//!
//! ### Single-Writer Game Loop
//! The `World` lives inside one task (`clock::GameLoop`). Timer ticks and
//! paddle commands are handled there sequentially, so there is no lock
//! around the world and no tick ever overlaps another.
//!
//! ### WebSocket Communication
//! Clients connect over a websocket on a single path. Each connection gets a
//! reader loop and a writer task; the writer drains a small bounded queue
//! that the broadcaster fills with non-blocking sends.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! World model and physics step: ball flight, wall bounces, paddle returns
//! with optional speed-up, scoring and serves.
//!
//! ### Input Module (`input`)
//! Parses `{"playerId", "positionY"}` move messages, checks them against the
//! sender's seat and queues them for the game loop.
//!
//! ### Clock Module (`clock`)
//! Fixed-rate loop that steps the world and triggers the broadcast.
//!
//! ### Registry Module (`registry`)
//! Tracks live connections and assigns roles.
//!
//! ### Broadcast Module (`broadcast`)
//! Per-tick snapshot fan-out with failure isolation.
//!
//! ### Network Module (`network`)
//! Accept loop, handshake, per-connection state machine and cleanup.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         bind_addr: "0.0.0.0:8080".to_string(),
//!         tick_rate: 64,
//!         ..ServerConfig::default()
//!     };
//!
//!     let server = Server::bind(config).await?;
//!     server
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod clock;
pub mod config;
pub mod error;
pub mod game;
pub mod input;
pub mod network;
pub mod registry;

pub use config::ServerConfig;
pub use error::ServerError;
pub use network::Server;
