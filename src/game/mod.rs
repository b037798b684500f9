//! Game Domain Module
//!
//! Deterministic room-game logic. No I/O here; the network layer
//! drives these types through the store.
//!
//! ## Module Structure
//!
//! - `board`: 3x3 board and pure win/draw evaluation
//! - `room`: durable game record, player slots, move log
//! - `room_code`: human-shareable room code generation

pub mod board;
pub mod room;
pub mod room_code;

// Re-export key types
pub use board::{evaluate, Board, Cell, Mark, Outcome, BOARD_CELLS, WIN_LINES};
pub use room::{GameRecord, GameStatus, MoveRecord, PlayerSlot, UserId, Winner};
