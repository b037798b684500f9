//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All messages are serialized as JSON text frames; the `type` tag
//! selects the variant.

use serde::{Deserialize, Serialize};

use crate::game::board::{Board, Mark};
use crate::game::room::{GameStatus, UserId, Winner};
use crate::store::UserProfile;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server. Every message requires a
/// connection that already passed the connection gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Create a new room and take the host seat.
    CreateRoom,

    /// Join an existing waiting room by code.
    JoinRoom {
        /// Target room code.
        room_code: String,
    },

    /// Place a mark at a board position.
    MakeMove {
        /// Room the move applies to.
        room_code: String,
        /// Board position 0-8.
        position: usize,
    },

    /// Request a rematch seeded from a completed room.
    PlayAgain {
        /// The completed room's code.
        room_code: String,
    },

    /// Vacate a seat voluntarily.
    LeaveRoom {
        /// Room to leave.
        room_code: String,
    },

    /// Resynchronize after connect/reconnect with no local state.
    GetState,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to one or all room participants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Room created; sent to the host only.
    RoomCreated(RoomSummary),

    /// Second player joined; full state for the joiner.
    StartGame(GameSnapshot),

    /// Session-started notification broadcast to the whole room.
    GameStarted,

    /// Board changed after a non-terminal move; broadcast to the room.
    BoardUpdated(GameSnapshot),

    /// Session reached a terminal state; broadcast to the room.
    GameEnded {
        /// Winning mark or draw.
        winner: Winner,
        /// Completed line for a non-draw outcome.
        winning_line: Option<[usize; 3]>,
    },

    /// Leave confirmation, sent to the leaver only.
    LeftRoom,

    /// A seated player voluntarily left; broadcast to the room.
    PlayerLeft {
        /// Identity that vacated its seat.
        user_id: UserId,
    },

    /// Opponent disappeared and the grace period elapsed; broadcast.
    OpponentLeft,

    /// Rematch created; personalized per recipient.
    RematchStarted(GameSnapshot),

    /// Recovered state for a room still waiting for an opponent.
    RoomState {
        /// The room the caller is seated in.
        room_code: String,
    },

    /// Recovered state for a room in progress.
    GameState(GameSnapshot),

    /// The caller holds no seat in any active room.
    NoActiveGame,

    /// Connect-time hint: the identity has an active session; the
    /// client should issue `get_state`.
    InGame,

    /// Structured failure, sent to the originating connection only.
    Error(GameErrorMessage),
}

/// Seat summary as seen by other players before profiles are needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotSummary {
    /// Identity holding the seat.
    pub id: UserId,
    /// Mark the seat plays.
    pub mark: Mark,
    /// Whether the seat created the room.
    pub is_host: bool,
}

/// Payload confirming room creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSummary {
    /// Shareable room code.
    pub room_code: String,
    /// Board (all empty at creation).
    pub board: Board,
    /// Room status.
    pub status: GameStatus,
    /// Seated players.
    pub players: Vec<SlotSummary>,
}

/// Seat summary with the public profile populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSummary {
    /// Identity holding the seat.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Avatar URL.
    pub avatar: String,
    /// Mark the seat plays.
    pub mark: Mark,
    /// Whether the seat created the room.
    pub is_host: bool,
}

/// Full session snapshot sent on start, update, recovery and rematch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSnapshot {
    /// Room code.
    pub room_code: String,
    /// Live board.
    pub board: Board,
    /// Room status.
    pub status: GameStatus,
    /// Mark to move, while playing.
    pub turn: Option<Mark>,
    /// The recipient's opponent, when the payload is personalized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opponent: Option<UserProfile>,
    /// Both seats with public profiles.
    pub players: Vec<PlayerSummary>,
}

/// Structured error payload: human-readable message plus a
/// machine-readable kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameErrorMessage {
    /// Human-readable description.
    pub message: String,
    /// Machine-readable kind such as `game_not_found`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::empty_board;
    use uuid::Uuid;

    #[test]
    fn test_client_message_json_roundtrip() {
        let msg = ClientMessage::MakeMove {
            room_code: "ABC123".into(),
            position: 4,
        };

        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"make_move\""));

        let parsed = ClientMessage::from_json(&json).unwrap();
        if let ClientMessage::MakeMove {
            room_code,
            position,
        } = parsed
        {
            assert_eq!(room_code, "ABC123");
            assert_eq!(position, 4);
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn test_create_room_has_no_payload() {
        let parsed = ClientMessage::from_json(r#"{"type":"create_room"}"#).unwrap();
        assert!(matches!(parsed, ClientMessage::CreateRoom));
    }

    #[test]
    fn test_server_message_json_roundtrip() {
        let msg = ServerMessage::GameEnded {
            winner: Winner::X,
            winning_line: Some([0, 1, 2]),
        };

        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"game_ended\""));

        let parsed = ServerMessage::from_json(&json).unwrap();
        if let ServerMessage::GameEnded {
            winner,
            winning_line,
        } = parsed
        {
            assert_eq!(winner, Winner::X);
            assert_eq!(winning_line, Some([0, 1, 2]));
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn test_error_carries_kind() {
        let msg = ServerMessage::Error(GameErrorMessage {
            message: "Game not found.".into(),
            kind: Some("game_not_found".into()),
        });
        let json = msg.to_json().unwrap();
        assert!(json.contains("game_not_found"));
    }

    #[test]
    fn test_error_kind_omitted_when_absent() {
        let msg = ServerMessage::Error(GameErrorMessage {
            message: "Something went wrong.".into(),
            kind: None,
        });
        let json = msg.to_json().unwrap();
        assert!(!json.contains("kind"));
    }

    #[test]
    fn test_snapshot_serializes_board_cells() {
        let mut board = empty_board();
        board[4] = Some(Mark::X);
        let msg = ServerMessage::GameState(GameSnapshot {
            room_code: "ABC123".into(),
            board,
            status: GameStatus::Playing,
            turn: Some(Mark::O),
            opponent: Some(UserProfile {
                id: Uuid::new_v4(),
                name: "Noor".into(),
                avatar: "https://cdn.example.com/n.png".into(),
            }),
            players: vec![],
        });

        let json = msg.to_json().unwrap();
        assert!(json.contains("\"turn\":\"O\""));
        assert!(json.contains("\"status\":\"playing\""));
        let parsed = ServerMessage::from_json(&json).unwrap();
        assert!(matches!(parsed, ServerMessage::GameState(_)));
    }
}
