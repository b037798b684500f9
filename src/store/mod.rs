//! Durable Store Boundary
//!
//! The session engine treats persistence as an external collaborator:
//! a transactional per-document repository for game records and a
//! read-only directory of user records. Both are expressed as traits so
//! a real document store can replace the in-process backend without
//! touching the state machine.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::room::{GameRecord, UserId};

pub use memory::{MemoryGameStore, MemoryUserStore};

/// Store failures.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Unique constraint violation on insert; caller retries with a
    /// freshly generated code.
    #[error("room code already exists: {0}")]
    DuplicateRoomCode(String),

    /// The update carried a stale version token. Retryable: re-read
    /// the record and re-validate before writing again.
    #[error("stale write for room {0}")]
    VersionConflict(String),

    /// No record for the given room code.
    #[error("no game for room code {0}")]
    NotFound(String),
}

/// A stored user account. Only the public projection crosses the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Stable identity.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Account email; never sent to other players.
    pub email: String,
    /// Avatar URL.
    pub avatar: String,
}

impl UserRecord {
    /// The public fields shown to other players.
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            name: self.name.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

/// Public identity projection: id, display name, avatar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Stable identity.
    pub id: UserId,
    /// Display name.
    pub name: String,
    /// Avatar URL.
    pub avatar: String,
}

/// Repository of durable game records, keyed by room code.
///
/// Updates use optimistic concurrency: `update` compares the version
/// token the caller read and rejects stale writes with
/// [`StoreError::VersionConflict`]. Each operation is atomic with
/// respect to the record it touches.
#[async_trait]
pub trait GameStore: Send + Sync {
    /// Insert a new record. Fails on a duplicate room code.
    async fn insert(&self, game: GameRecord) -> Result<(), StoreError>;

    /// Fetch the record for a room code.
    async fn find_by_room_code(&self, code: &str) -> Result<Option<GameRecord>, StoreError>;

    /// Fetch the non-completed record in which `user` holds a slot,
    /// if any. At most one exists by invariant.
    async fn find_active_by_user(&self, user: UserId) -> Result<Option<GameRecord>, StoreError>;

    /// Write back a modified record. The stored version must equal
    /// `game.version`; on success the returned record carries the
    /// bumped version.
    async fn update(&self, game: GameRecord) -> Result<GameRecord, StoreError>;

    /// Delete the record for a room code. Missing records are ignored.
    async fn delete(&self, code: &str) -> Result<(), StoreError>;
}

/// Read-only directory of user records, used to resolve authenticated
/// identities and populate opponent profiles.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fetch a user by id.
    async fn find(&self, id: UserId) -> Result<Option<UserRecord>, StoreError>;
}
