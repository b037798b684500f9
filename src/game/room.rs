//! Game Room Records
//!
//! Durable per-room state: player slots, board, status, turn, outcome
//! and the append-only move log. These are the documents the store
//! persists; all fields are fixed-shape tagged types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::board::{empty_board, Board, Mark};

/// Identity reference for a user.
pub type UserId = Uuid;

/// Lifecycle status of a game room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    /// One player seated, waiting for an opponent.
    Waiting,
    /// Both players seated, moves being exchanged.
    Playing,
    /// Terminal: winner or draw recorded.
    Completed,
}

/// Recorded outcome of a completed game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Winner {
    /// X completed a line.
    X,
    /// O completed a line.
    O,
    /// Board filled with no line completed.
    #[serde(rename = "draw")]
    Draw,
}

impl From<Mark> for Winner {
    fn from(mark: Mark) -> Self {
        match mark {
            Mark::X => Winner::X,
            Mark::O => Winner::O,
        }
    }
}

/// A player's seat within a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSlot {
    /// Identity holding the seat.
    pub user_id: UserId,
    /// Mark this seat plays.
    pub mark: Mark,
    /// Whether this seat created the room (slot 0).
    pub is_host: bool,
}

/// One applied move, kept as an audit trail only.
/// Validation always runs against the live board, never this log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    /// Mark that moved.
    pub mark: Mark,
    /// Board position 0-8.
    pub position: usize,
}

/// The durable game document, keyed by room code.
///
/// `version` is the optimistic-concurrency token: every successful
/// store update bumps it, and updates carrying a stale version are
/// rejected by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRecord {
    /// Human-shareable unique room code.
    pub room_code: String,
    /// Seated players in join order; at most 2, slot 0 is the host.
    pub players: Vec<PlayerSlot>,
    /// Live board state.
    pub board: Board,
    /// Lifecycle status.
    pub status: GameStatus,
    /// Mark whose turn it is (`playing` only).
    pub turn: Option<Mark>,
    /// Outcome once `completed`.
    pub winner: Option<Winner>,
    /// Completed line positions for a non-draw outcome.
    pub winning_line: Option<[usize; 3]>,
    /// Append-only move log.
    pub moves: Vec<MoveRecord>,
    /// Optimistic-concurrency version token.
    pub version: u64,
    /// When the room was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

impl GameRecord {
    /// Create a fresh `waiting` room with the host seated as X.
    pub fn new_waiting(room_code: String, host: UserId) -> Self {
        let now = Utc::now();
        Self {
            room_code,
            players: vec![PlayerSlot {
                user_id: host,
                mark: Mark::X,
                is_host: true,
            }],
            board: empty_board(),
            status: GameStatus::Waiting,
            turn: None,
            winner: None,
            winning_line: None,
            moves: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a rematch room: same two identities, host and marks swapped,
    /// started directly in `playing` with X to move.
    pub fn new_rematch(room_code: String, new_host: UserId, new_guest: UserId) -> Self {
        let now = Utc::now();
        Self {
            room_code,
            players: vec![
                PlayerSlot {
                    user_id: new_host,
                    mark: Mark::X,
                    is_host: true,
                },
                PlayerSlot {
                    user_id: new_guest,
                    mark: Mark::O,
                    is_host: false,
                },
            ],
            board: empty_board(),
            status: GameStatus::Playing,
            turn: Some(Mark::X),
            winner: None,
            winning_line: None,
            moves: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// The slot held by `user`, if seated.
    pub fn slot_of(&self, user: UserId) -> Option<&PlayerSlot> {
        self.players.iter().find(|slot| slot.user_id == user)
    }

    /// The slot opposing `user`, if both are seated.
    pub fn opponent_of(&self, user: UserId) -> Option<&PlayerSlot> {
        self.players.iter().find(|slot| slot.user_id != user)
    }

    /// Whether the room has not yet reached a terminal state.
    pub fn is_active(&self) -> bool {
        matches!(self.status, GameStatus::Waiting | GameStatus::Playing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_waiting_shape() {
        let host = Uuid::new_v4();
        let game = GameRecord::new_waiting("ABC123".into(), host);

        assert_eq!(game.status, GameStatus::Waiting);
        assert_eq!(game.players.len(), 1);
        assert_eq!(game.players[0].mark, Mark::X);
        assert!(game.players[0].is_host);
        assert!(game.board.iter().all(|c| c.is_none()));
        assert_eq!(game.turn, None);
        assert_eq!(game.winner, None);
        assert_eq!(game.version, 0);
    }

    #[test]
    fn test_new_rematch_swaps_host() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let game = GameRecord::new_rematch("NEW456".into(), b, a);

        assert_eq!(game.status, GameStatus::Playing);
        assert_eq!(game.turn, Some(Mark::X));
        assert_eq!(game.players[0].user_id, b);
        assert!(game.players[0].is_host);
        assert_eq!(game.players[0].mark, Mark::X);
        assert_eq!(game.players[1].user_id, a);
        assert_eq!(game.players[1].mark, Mark::O);
    }

    #[test]
    fn test_slot_lookup() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let game = GameRecord::new_rematch("R".into(), a, b);

        assert_eq!(game.slot_of(a).unwrap().mark, Mark::X);
        assert_eq!(game.opponent_of(a).unwrap().user_id, b);
        assert!(game.slot_of(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_winner_serializes_like_wire_contract() {
        assert_eq!(serde_json::to_string(&Winner::X).unwrap(), "\"X\"");
        assert_eq!(serde_json::to_string(&Winner::Draw).unwrap(), "\"draw\"");
    }
}
