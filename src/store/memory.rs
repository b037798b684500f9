//! In-Process Store Backend
//!
//! Reference implementation of the store traits over
//! `RwLock<BTreeMap>`. Single-process only; the trait boundary exists
//! so a document database can replace this without touching callers.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::game::room::{GameRecord, UserId};
use crate::store::{GameStore, StoreError, UserRecord, UserStore};

/// In-memory game repository with per-record optimistic concurrency.
#[derive(Default)]
pub struct MemoryGameStore {
    games: RwLock<BTreeMap<String, GameRecord>>,
}

impl MemoryGameStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GameStore for MemoryGameStore {
    async fn insert(&self, game: GameRecord) -> Result<(), StoreError> {
        let mut games = self.games.write().await;
        if games.contains_key(&game.room_code) {
            return Err(StoreError::DuplicateRoomCode(game.room_code));
        }
        games.insert(game.room_code.clone(), game);
        Ok(())
    }

    async fn find_by_room_code(&self, code: &str) -> Result<Option<GameRecord>, StoreError> {
        let games = self.games.read().await;
        Ok(games.get(code).cloned())
    }

    async fn find_active_by_user(&self, user: UserId) -> Result<Option<GameRecord>, StoreError> {
        let games = self.games.read().await;
        Ok(games
            .values()
            .find(|game| game.is_active() && game.slot_of(user).is_some())
            .cloned())
    }

    async fn update(&self, mut game: GameRecord) -> Result<GameRecord, StoreError> {
        let mut games = self.games.write().await;
        let stored = games
            .get(&game.room_code)
            .ok_or_else(|| StoreError::NotFound(game.room_code.clone()))?;

        if stored.version != game.version {
            return Err(StoreError::VersionConflict(game.room_code));
        }

        game.version += 1;
        game.updated_at = Utc::now();
        games.insert(game.room_code.clone(), game.clone());
        Ok(game)
    }

    async fn delete(&self, code: &str) -> Result<(), StoreError> {
        let mut games = self.games.write().await;
        games.remove(code);
        Ok(())
    }
}

/// In-memory user directory, seeded at startup or by tests.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<BTreeMap<UserId, UserRecord>>,
}

impl MemoryUserStore {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a user record.
    pub async fn upsert(&self, user: UserRecord) {
        let mut users = self.users.write().await;
        users.insert(user.id, user);
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        let users = self.users.read().await;
        Ok(users.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::Mark;
    use crate::game::room::GameStatus;
    use uuid::Uuid;

    fn waiting_game(code: &str) -> GameRecord {
        GameRecord::new_waiting(code.into(), Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = MemoryGameStore::new();
        store.insert(waiting_game("ROOM01")).await.unwrap();

        let found = store.find_by_room_code("ROOM01").await.unwrap();
        assert!(found.is_some());
        assert!(store.find_by_room_code("NOPE99").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_room_code_rejected() {
        let store = MemoryGameStore::new();
        store.insert(waiting_game("ROOM01")).await.unwrap();

        let err = store.insert(waiting_game("ROOM01")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateRoomCode(_)));
    }

    #[tokio::test]
    async fn test_update_bumps_version() {
        let store = MemoryGameStore::new();
        store.insert(waiting_game("ROOM01")).await.unwrap();

        let mut game = store.find_by_room_code("ROOM01").await.unwrap().unwrap();
        game.board[4] = Some(Mark::X);
        let updated = store.update(game).await.unwrap();
        assert_eq!(updated.version, 1);
    }

    #[tokio::test]
    async fn test_stale_update_rejected() {
        let store = MemoryGameStore::new();
        store.insert(waiting_game("ROOM01")).await.unwrap();

        let stale = store.find_by_room_code("ROOM01").await.unwrap().unwrap();
        let mut fresh = stale.clone();
        fresh.board[0] = Some(Mark::X);
        store.update(fresh).await.unwrap();

        // Second writer still holds version 0
        let mut racing = stale;
        racing.board[1] = Some(Mark::O);
        let err = store.update(racing).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict(_)));

        // The first write survived intact
        let current = store.find_by_room_code("ROOM01").await.unwrap().unwrap();
        assert_eq!(current.board[0], Some(Mark::X));
        assert_eq!(current.board[1], None);
    }

    #[tokio::test]
    async fn test_find_active_by_user() {
        let store = MemoryGameStore::new();
        let user = Uuid::new_v4();
        store
            .insert(GameRecord::new_waiting("ROOM01".into(), user))
            .await
            .unwrap();

        let found = store.find_active_by_user(user).await.unwrap();
        assert_eq!(found.unwrap().room_code, "ROOM01");

        // Completed games are not active
        let mut game = store.find_by_room_code("ROOM01").await.unwrap().unwrap();
        game.status = GameStatus::Completed;
        store.update(game).await.unwrap();
        assert!(store.find_active_by_user(user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryGameStore::new();
        store.insert(waiting_game("ROOM01")).await.unwrap();
        store.delete("ROOM01").await.unwrap();
        store.delete("ROOM01").await.unwrap();
        assert!(store.find_by_room_code("ROOM01").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_user_store_profile_projection() {
        let users = MemoryUserStore::new();
        let id = Uuid::new_v4();
        users
            .upsert(UserRecord {
                id,
                name: "Asha".into(),
                email: "asha@example.com".into(),
                avatar: "https://cdn.example.com/a.png".into(),
            })
            .await;

        let record = users.find(id).await.unwrap().unwrap();
        let profile = record.profile();
        assert_eq!(profile.name, "Asha");
        // Email never appears in the public projection
        let json = serde_json::to_string(&profile).unwrap();
        assert!(!json.contains("email"));
    }
}
