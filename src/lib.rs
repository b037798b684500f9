//! # Gridmatch Server
//!
//! Real-time session and matchmaking engine for two-player grid games
//! over WebSocket.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    GRIDMATCH SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/            - Game domain (pure, no I/O)               │
//! │  ├── board.rs     - 3x3 board and win/draw evaluation        │
//! │  ├── room.rs      - Durable game record and player slots     │
//! │  └── room_code.rs - Shareable room code generation           │
//! │                                                              │
//! │  store/           - Persistence boundary                     │
//! │  ├── mod.rs       - Store traits, optimistic versioning      │
//! │  └── memory.rs    - In-process reference backend             │
//! │                                                              │
//! │  network/         - Transport and session engine             │
//! │  ├── auth.rs      - JWT connection gate                      │
//! │  ├── directory.rs - Connection-to-room binding table         │
//! │  ├── protocol.rs  - Wire message types                       │
//! │  ├── service.rs   - Session state machine                    │
//! │  └── server.rs    - WebSocket event gateway                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency Model
//!
//! Game records carry a version token; every mutation is an optimistic
//! compare-and-swap against the store, retried on conflict. Disconnect
//! grace timers are cancelled by generation counters in the session
//! directory rather than by tracking timer handles: a reconnect bumps
//! the generation, and a timer firing against a stale generation does
//! nothing.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;
pub mod store;

// Re-export commonly used types
pub use game::board::{evaluate, Board, Mark, Outcome};
pub use game::room::{GameRecord, GameStatus, UserId, Winner};
pub use network::server::{GameServer, GameServerError, ServerConfig};
pub use network::service::{GameError, GameService};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
