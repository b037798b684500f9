//! Network Layer
//!
//! WebSocket gateway for real-time session communication.
//! Transport-specific code lives here; all game rules run through
//! `game/` and the session engine in `service`.

pub mod auth;
pub mod directory;
pub mod protocol;
pub mod server;
pub mod service;

pub use auth::{credential_from_headers, resolve_identity, validate_token, AuthConfig, AuthError, TokenClaims};
pub use directory::{ConnId, SessionDirectory, UserBinding};
pub use protocol::{ClientMessage, GameErrorMessage, GameSnapshot, PlayerSummary, RoomSummary, ServerMessage};
pub use server::{GameServer, GameServerError, ServerConfig};
pub use service::{GameError, GameService, JoinOutcome, MoveOutcome, RecoveredState, RematchOutcome};
