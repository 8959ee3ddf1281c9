//! Client movement commands: parsing, validation and hand-off to the game loop.
//!
//! Input is best-effort. Anything that does not parse, names the wrong
//! paddle, or arrives while the command queue is full is dropped without a
//! reply and the connection stays open.

use log::{debug, warn};
use shared::{MoveCommand, Role};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Work queued for the task that owns the `World`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GameCommand {
    MovePaddle { role: Role, delta: f32 },
}

/// Decodes a raw move payload. Returns None for anything malformed.
pub fn parse_move(raw: &str) -> Option<MoveCommand> {
    match serde_json::from_str::<MoveCommand>(raw) {
        Ok(cmd) if cmd.position_y.is_finite() => Some(cmd),
        Ok(_) => None,
        Err(e) => {
            debug!("Dropping malformed move: {}", e);
            None
        }
    }
}

/// Sending half of the game loop's command queue, cloned into every
/// connection task.
#[derive(Debug, Clone)]
pub struct InputChannel {
    commands: mpsc::Sender<GameCommand>,
}

impl InputChannel {
    pub fn new(commands: mpsc::Sender<GameCommand>) -> Self {
        Self { commands }
    }

    /// Validates a message from a connection holding `role` and queues the move.
    ///
    /// Returns true if a command was queued.
    pub fn on_message(&self, role: Role, raw: &str) -> bool {
        if !role.is_player() {
            debug!("Dropping input from observer");
            return false;
        }

        let Some(cmd) = parse_move(raw) else {
            return false;
        };

        let Some(target) = Role::from_player_id(cmd.player_id) else {
            warn!("Move names unknown player {}, ignoring", cmd.player_id);
            return false;
        };
        if target != role {
            debug!("{} tried to move player {}", role, cmd.player_id);
            return false;
        }

        match self.commands.try_send(GameCommand::MovePaddle {
            role,
            delta: cmd.position_y,
        }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Command queue full, dropping move from {}", role);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Game loop stopped, dropping move from {}", role);
                false
            }
        }
    }
}
