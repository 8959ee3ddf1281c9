use serde::{Deserialize, Serialize};

pub const ARENA_WIDTH: f32 = 800.0;
pub const ARENA_HEIGHT: f32 = 600.0;
pub const PADDLE_WIDTH: f32 = 10.0;
pub const PADDLE_HEIGHT: f32 = 100.0;
/// Distance from the side wall to the outer edge of a paddle.
pub const PADDLE_OFFSET: f32 = 50.0;
pub const BALL_RADIUS: f32 = 10.0;
/// Per-axis ball speed after a serve, in arena units per tick.
pub const BALL_SPEED: f32 = 3.0;
pub const PADDLE_SPEEDUP: f32 = 1.05;
pub const MAX_BALL_SPEED: f32 = 12.0;
pub const DEFAULT_TICK_RATE: u32 = 64;

pub const LEFT_PLAYER_ID: u32 = 1;
pub const RIGHT_PLAYER_ID: u32 = 2;

/// Participation type of a connection. Fixed for the connection's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    PlayerLeft,
    PlayerRight,
    Observer,
}

impl Role {
    /// Wire id of the paddle this role controls, if any.
    pub fn player_id(self) -> Option<u32> {
        match self {
            Role::PlayerLeft => Some(LEFT_PLAYER_ID),
            Role::PlayerRight => Some(RIGHT_PLAYER_ID),
            Role::Observer => None,
        }
    }

    /// Role that controls the paddle with wire id `id`.
    pub fn from_player_id(id: u32) -> Option<Role> {
        match id {
            LEFT_PLAYER_ID => Some(Role::PlayerLeft),
            RIGHT_PLAYER_ID => Some(Role::PlayerRight),
            _ => None,
        }
    }

    pub fn is_player(self) -> bool {
        self != Role::Observer
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Role::PlayerLeft => "player-left",
            Role::PlayerRight => "player-right",
            Role::Observer => "observer",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct PaddlePosition {
    pub y: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct PlayerView {
    pub id: u32,
    pub score: u32,
    pub position: PaddlePosition,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct BallView {
    pub x: f32,
    pub y: f32,
}

/// Externally visible world state, sent to every connection once per tick.
///
/// Ball velocity is deliberately absent: clients only render positions.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Snapshot {
    pub players: Vec<PlayerView>,
    pub ball: BallView,
}

impl Snapshot {
    /// Looks up a player by wire id.
    pub fn player(&self, id: u32) -> Option<&PlayerView> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Inbound paddle move. `position_y` is a signed delta, not an absolute position.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoveCommand {
    pub player_id: u32,
    pub position_y: f32,
}

/// First message a connection receives, telling it which paddle it controls.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignment {
    #[serde(rename = "type")]
    pub kind: String,
    pub role: Role,
    pub player_id: Option<u32>,
}

impl RoleAssignment {
    pub fn new(role: Role) -> Self {
        Self {
            kind: "role".to_string(),
            role,
            player_id: role.player_id(),
        }
    }
}

/// Anything the server pushes to a client.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ServerMessage {
    Role(RoleAssignment),
    Snapshot(Snapshot),
}

impl ServerMessage {
    /// Decodes any server message, telling role and snapshot apart by shape.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Clamps a paddle's top edge so the whole paddle stays inside the arena.
pub fn clamp_paddle_y(y: f32, arena_height: f32, paddle_height: f32) -> f32 {
    let max_y = (arena_height - paddle_height).max(0.0);
    y.clamp(0.0, max_y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn sample_snapshot() -> Snapshot {
        Snapshot {
            players: vec![
                PlayerView {
                    id: 1,
                    score: 2,
                    position: PaddlePosition { y: 250.0 },
                },
                PlayerView {
                    id: 2,
                    score: 0,
                    position: PaddlePosition { y: 100.5 },
                },
            ],
            ball: BallView { x: 400.0, y: 300.0 },
        }
    }

    #[test]
    fn test_clamp_paddle_within_bounds() {
        assert_eq!(clamp_paddle_y(120.0, ARENA_HEIGHT, PADDLE_HEIGHT), 120.0);
        assert_eq!(clamp_paddle_y(-5.0, ARENA_HEIGHT, PADDLE_HEIGHT), 0.0);
        assert_eq!(
            clamp_paddle_y(10_000.0, ARENA_HEIGHT, PADDLE_HEIGHT),
            ARENA_HEIGHT - PADDLE_HEIGHT
        );
    }

    #[test]
    fn test_clamp_paddle_taller_than_arena() {
        assert_eq!(clamp_paddle_y(42.0, 50.0, 100.0), 0.0);
    }

    #[test]
    fn test_role_player_ids() {
        assert_eq!(Role::PlayerLeft.player_id(), Some(1));
        assert_eq!(Role::PlayerRight.player_id(), Some(2));
        assert_eq!(Role::Observer.player_id(), None);
        assert_eq!(Role::from_player_id(2), Some(Role::PlayerRight));
        assert_eq!(Role::from_player_id(3), None);
        assert!(!Role::Observer.is_player());
    }

    #[test]
    fn test_snapshot_wire_shape() {
        let json = sample_snapshot().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["players"][0]["id"], 1);
        assert_eq!(value["players"][0]["score"], 2);
        assert_eq!(value["players"][1]["position"]["y"], 100.5);
        assert_eq!(value["ball"]["x"], 400.0);
        assert!(value["ball"].get("dx").is_none());
    }

    #[test]
    fn test_move_command_camel_case() {
        let cmd: MoveCommand = serde_json::from_str(r#"{"playerId":2,"positionY":-7.5}"#).unwrap();
        assert_eq!(cmd.player_id, 2);
        assert_approx_eq!(cmd.position_y, -7.5);

        let missing: Result<MoveCommand, _> = serde_json::from_str(r#"{"playerId":2}"#);
        assert!(missing.is_err());

        let wrong_type: Result<MoveCommand, _> =
            serde_json::from_str(r#"{"playerId":2,"positionY":"up"}"#);
        assert!(wrong_type.is_err());
    }

    #[test]
    fn test_role_assignment_message() {
        let json = serde_json::to_string(&RoleAssignment::new(Role::Observer)).unwrap();
        assert_eq!(json, r#"{"type":"role","role":"observer","playerId":null}"#);
    }

    #[test]
    fn test_server_message_distinguishes_role_and_snapshot() {
        let role = ServerMessage::from_json(r#"{"type":"role","role":"player-left","playerId":1}"#)
            .unwrap();
        assert_eq!(role, ServerMessage::Role(RoleAssignment::new(Role::PlayerLeft)));

        let json = sample_snapshot().to_json().unwrap();
        match ServerMessage::from_json(&json).unwrap() {
            ServerMessage::Snapshot(snapshot) => {
                assert_eq!(snapshot.player(1).map(|p| p.score), Some(2));
            }
            other => panic!("Expected snapshot, got {:?}", other),
        }
    }
}
