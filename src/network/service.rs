//! Game Session State Machine
//!
//! Owns the per-room lifecycle (waiting -> playing -> completed),
//! validates and applies moves, computes outcomes, and drives
//! reconnection recovery. Every operation is atomic with respect to
//! the durable record it touches: mutations carry the version token
//! they read, and a stale write is retried by re-reading and
//! re-validating, so a racing second writer fails the turn/occupancy
//! check instead of corrupting the board.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::game::board::{evaluate, Mark, Outcome, BOARD_CELLS};
use crate::game::room::{GameRecord, GameStatus, MoveRecord, PlayerSlot, UserId, Winner};
use crate::game::room_code;
use crate::network::directory::{ConnId, SessionDirectory};
use crate::network::protocol::{
    GameErrorMessage, GameSnapshot, PlayerSummary, RoomSummary, SlotSummary,
};
use crate::store::{GameStore, StoreError, UserStore};

/// Attempts for a generated room code before giving up on collisions.
const CODE_RETRIES: usize = 5;

/// Attempts for an optimistic write before reporting an internal error.
const WRITE_RETRIES: usize = 3;

/// Operation failures. All variants except `Internal` are recoverable
/// client errors; the gateway converts them into structured error
/// events and no session state changes.
#[derive(Debug, Error)]
pub enum GameError {
    /// Identity already occupies a slot in a non-completed session.
    #[error("You are already in an active game.")]
    AlreadyInSession,

    /// No session for the given room code.
    #[error("Game not found.")]
    RoomNotFound,

    /// The session exists but is not accepting a second player.
    #[error("Game is not available to join.")]
    RoomNotJoinable,

    /// Both seats are taken.
    #[error("Room is full.")]
    RoomFull,

    /// The caller created this room.
    #[error("You cannot join your own game.")]
    CannotJoinOwnRoom,

    /// Move submitted while the session is not `playing`.
    #[error("Game is not currently active.")]
    GameNotActive,

    /// Caller holds no slot or it is the other mark's turn.
    #[error("It's not your turn.")]
    NotYourTurn,

    /// Target cell already holds a mark.
    #[error("This cell is already taken.")]
    CellOccupied,

    /// Board position outside 0-8.
    #[error("Position must be between 0 and 8.")]
    InvalidPosition,

    /// Rematch requested for a room that does not exist.
    #[error("Original game not found.")]
    SessionNotFound,

    /// Rematch requested while the session has not completed.
    #[error("Game is not finished yet.")]
    SessionNotFinished,

    /// Rematch requested with fewer than two historical slots.
    #[error("Could not determine players for a rematch.")]
    IncompletePlayerSet,

    /// Unexpected store or collaborator failure. Logged with full
    /// detail server-side; clients only see a generic message.
    #[error("internal failure: {0}")]
    Internal(String),
}

impl GameError {
    /// Machine-readable error kind for the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            GameError::AlreadyInSession => "already_in_game",
            GameError::RoomNotFound => "game_not_found",
            GameError::RoomNotJoinable => "game_not_available",
            GameError::RoomFull => "room_full",
            GameError::CannotJoinOwnRoom => "own_game",
            GameError::GameNotActive => "game_not_active",
            GameError::NotYourTurn => "not_your_turn",
            GameError::CellOccupied => "cell_taken",
            GameError::InvalidPosition => "invalid_position",
            GameError::SessionNotFound => "rematch_not_found",
            GameError::SessionNotFinished => "rematch_not_finished",
            GameError::IncompletePlayerSet => "rematch_players_missing",
            GameError::Internal(_) => "internal_error",
        }
    }

    /// Wire payload. Internal detail never leaks to clients.
    pub fn to_message(&self) -> GameErrorMessage {
        let message = match self {
            GameError::Internal(_) => "Something went wrong, please try again.".to_string(),
            other => other.to_string(),
        };
        GameErrorMessage {
            message,
            kind: Some(self.kind().to_string()),
        }
    }
}

impl From<StoreError> for GameError {
    fn from(err: StoreError) -> Self {
        GameError::Internal(err.to_string())
    }
}

/// Result of a successfully applied move.
#[derive(Debug, Clone)]
pub enum MoveOutcome {
    /// Non-terminal move; the room sees the updated snapshot.
    Progress {
        /// Room to broadcast to.
        room_code: String,
        /// Updated session snapshot.
        snapshot: GameSnapshot,
    },
    /// Terminal move; the room sees the final result.
    Ended {
        /// Room to broadcast to.
        room_code: String,
        /// Winning mark or draw.
        winner: Winner,
        /// Completed line for a non-draw outcome.
        winning_line: Option<[usize; 3]>,
    },
}

/// Result of joining a room.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    /// Room that started.
    pub room_code: String,
    /// Full state for the joiner, opponent populated.
    pub snapshot: GameSnapshot,
}

/// Result of voluntarily leaving a room.
#[derive(Debug, Clone)]
pub struct LeaveOutcome {
    /// Room that was left.
    pub room_code: String,
    /// Identity that vacated its seat.
    pub user_id: UserId,
    /// Whether the last slot was vacated and the record deleted.
    pub deleted: bool,
    /// Winner declared because the leaver abandoned a live game.
    pub forfeit_winner: Option<Winner>,
}

/// Result of a settled disconnect grace period.
#[derive(Debug, Clone)]
pub struct GraceForfeit {
    /// Room the forfeiture applies to.
    pub room_code: String,
    /// The remaining player's mark.
    pub winner: Winner,
}

/// Recovered session state for a reconnecting client.
#[derive(Debug, Clone)]
pub enum RecoveredState {
    /// The identity holds no seat in any active session.
    None,
    /// Seated in a room still waiting for an opponent.
    Waiting {
        /// The waiting room's code.
        room_code: String,
    },
    /// Seated in a room in progress; full state attached.
    Playing(GameSnapshot),
}

/// Result of a rematch transition.
#[derive(Debug, Clone)]
pub struct RematchOutcome {
    /// The completed room the rematch was seeded from.
    pub old_room: String,
    /// The fresh room, already `playing`.
    pub new_room: String,
    /// Personalized payload per participant, keyed by identity.
    pub personalized: Vec<(UserId, GameSnapshot)>,
}

/// The session engine. Holds the durable store, the user directory
/// and the volatile connection-to-room binding table.
pub struct GameService {
    store: Arc<dyn GameStore>,
    users: Arc<dyn UserStore>,
    directory: Arc<SessionDirectory>,
}

impl GameService {
    /// Create the engine over its collaborators.
    pub fn new(
        store: Arc<dyn GameStore>,
        users: Arc<dyn UserStore>,
        directory: Arc<SessionDirectory>,
    ) -> Self {
        Self {
            store,
            users,
            directory,
        }
    }

    /// The binding table, shared with the gateway for broadcasting.
    pub fn directory(&self) -> &Arc<SessionDirectory> {
        &self.directory
    }

    /// Create a `waiting` room with the caller seated as host (mark X).
    pub async fn create_room(
        &self,
        user: UserId,
        conn: ConnId,
    ) -> Result<RoomSummary, GameError> {
        self.ensure_not_in_active_game(user, conn).await?;

        let game = self.insert_with_fresh_code(|code| GameRecord::new_waiting(code, user))
            .await?;

        self.directory.bind(conn, user, &game.room_code).await;
        info!(room = %game.room_code, user = %user, "room created");

        Ok(RoomSummary {
            room_code: game.room_code.clone(),
            board: game.board,
            status: game.status,
            players: slot_summaries(&game),
        })
    }

    /// Seat the caller as the second player and start the game.
    pub async fn join_room(
        &self,
        user: UserId,
        conn: ConnId,
        code: &str,
    ) -> Result<JoinOutcome, GameError> {
        self.ensure_not_in_active_game(user, conn).await?;

        for _ in 0..WRITE_RETRIES {
            let mut game = self
                .store
                .find_by_room_code(code)
                .await?
                .ok_or(GameError::RoomNotFound)?;

            if game.status != GameStatus::Waiting {
                return Err(GameError::RoomNotJoinable);
            }
            if game.players.len() >= 2 {
                return Err(GameError::RoomFull);
            }
            if game.players[0].user_id == user {
                return Err(GameError::CannotJoinOwnRoom);
            }

            game.players.push(PlayerSlot {
                user_id: user,
                mark: Mark::O,
                is_host: false,
            });
            game.status = GameStatus::Playing;
            game.turn = Some(Mark::X);

            match self.store.update(game).await {
                Ok(updated) => {
                    self.directory.bind(conn, user, code).await;
                    let snapshot = self.snapshot(&updated, Some(user)).await?;
                    info!(room = %code, user = %user, "player joined, game started");
                    return Ok(JoinOutcome {
                        room_code: code.to_string(),
                        snapshot,
                    });
                }
                Err(StoreError::VersionConflict(_)) => continue,
                Err(err) => return Err(err.into()),
            }
        }

        Err(GameError::Internal(format!(
            "join for room {code} kept losing version races"
        )))
    }

    /// Validate and apply a move for the caller.
    pub async fn make_move(
        &self,
        user: UserId,
        code: &str,
        position: usize,
    ) -> Result<MoveOutcome, GameError> {
        if position >= BOARD_CELLS {
            return Err(GameError::InvalidPosition);
        }

        for _ in 0..WRITE_RETRIES {
            let mut game = match self.store.find_by_room_code(code).await? {
                Some(game) if game.status == GameStatus::Playing => game,
                // Missing rooms report the same way as finished ones
                _ => return Err(GameError::GameNotActive),
            };

            let mark = match game.slot_of(user) {
                Some(slot) if Some(slot.mark) == game.turn => slot.mark,
                _ => return Err(GameError::NotYourTurn),
            };
            if game.board[position].is_some() {
                return Err(GameError::CellOccupied);
            }

            game.board[position] = Some(mark);
            game.moves.push(MoveRecord { mark, position });

            let outcome = evaluate(&game.board);
            match outcome {
                Some(Outcome::Win { winner, line }) => {
                    game.status = GameStatus::Completed;
                    game.winner = Some(winner.into());
                    game.winning_line = Some(line);
                    game.turn = None;
                }
                Some(Outcome::Draw) => {
                    game.status = GameStatus::Completed;
                    game.winner = Some(Winner::Draw);
                    game.turn = None;
                }
                None => {
                    game.turn = Some(mark.other());
                }
            }

            match self.store.update(game).await {
                Ok(updated) => {
                    return match outcome {
                        Some(_) => {
                            let winner = updated
                                .winner
                                .ok_or_else(|| GameError::Internal("completed game without winner".into()))?;
                            info!(room = %code, winner = ?winner, "game ended");
                            Ok(MoveOutcome::Ended {
                                room_code: code.to_string(),
                                winner,
                                winning_line: updated.winning_line,
                            })
                        }
                        None => {
                            let snapshot = self.snapshot(&updated, None).await?;
                            Ok(MoveOutcome::Progress {
                                room_code: code.to_string(),
                                snapshot,
                            })
                        }
                    };
                }
                // Lost the race: re-read and re-validate. The second
                // writer then fails the turn or occupancy check.
                Err(StoreError::VersionConflict(_)) => continue,
                Err(err) => return Err(err.into()),
            }
        }

        Err(GameError::Internal(format!(
            "move for room {code} kept losing version races"
        )))
    }

    /// Vacate the caller's seat. Leaving a live game forfeits it;
    /// vacating the last seat deletes the record.
    pub async fn leave_room(
        &self,
        user: UserId,
        conn: ConnId,
        code: &str,
    ) -> Result<LeaveOutcome, GameError> {
        let outcome = 'attempt: {
            for _ in 0..WRITE_RETRIES {
                let mut game = self
                    .store
                    .find_by_room_code(code)
                    .await?
                    .ok_or(GameError::RoomNotFound)?;

                if game.slot_of(user).is_none() {
                    // Not a slot holder: nothing to mutate, still
                    // confirm and clear the binding below.
                    break 'attempt LeaveOutcome {
                        room_code: code.to_string(),
                        user_id: user,
                        deleted: false,
                        forfeit_winner: None,
                    };
                }

                game.players.retain(|slot| slot.user_id != user);

                if game.players.is_empty() {
                    self.store.delete(code).await?;
                    break 'attempt LeaveOutcome {
                        room_code: code.to_string(),
                        user_id: user,
                        deleted: true,
                        forfeit_winner: None,
                    };
                }

                // Abandoning a live game forfeits it to the remaining
                // player rather than leaving a one-seat `playing` room.
                let forfeit_winner = if game.status == GameStatus::Playing {
                    let winner: Winner = game.players[0].mark.into();
                    game.status = GameStatus::Completed;
                    game.winner = Some(winner);
                    game.turn = None;
                    Some(winner)
                } else {
                    None
                };

                match self.store.update(game).await {
                    Ok(_) => {
                        break 'attempt LeaveOutcome {
                            room_code: code.to_string(),
                            user_id: user,
                            deleted: false,
                            forfeit_winner,
                        };
                    }
                    Err(StoreError::VersionConflict(_)) => continue,
                    Err(err) => return Err(err.into()),
                }
            }
            return Err(GameError::Internal(format!(
                "leave for room {code} kept losing version races"
            )));
        };

        // Only clear bindings that actually point at this room; a
        // leave naming some other room must not detach the caller from
        // the session they are still playing in.
        if self.directory.room_of_conn(conn).await.as_deref() == Some(code) {
            self.directory.unbind_conn(conn).await;
        }
        if self
            .directory
            .binding_of_user(user)
            .await
            .is_some_and(|binding| binding.room_code == code)
        {
            self.directory.clear_user(user).await;
        }
        info!(room = %code, user = %user, forfeit = outcome.forfeit_winner.is_some(), "player left");
        Ok(outcome)
    }

    /// Settle a disconnect after the grace period. A no-op unless the
    /// identity's binding still matches the captured generation and
    /// the session is still live.
    pub async fn handle_disconnect_grace(
        &self,
        user: UserId,
        code: &str,
        generation: u64,
    ) -> Result<Option<GraceForfeit>, GameError> {
        // Fire-time check: any rebind since the disconnect bumped the
        // generation and cancels this timer.
        if !self.directory.settle_user(user, code, generation).await {
            return Ok(None);
        }

        for _ in 0..WRITE_RETRIES {
            let mut game = match self.store.find_by_room_code(code).await? {
                Some(game) => game,
                None => return Ok(None),
            };

            if game.status != GameStatus::Playing || game.slot_of(user).is_none() {
                return Ok(None);
            }

            let remaining = match game.opponent_of(user) {
                Some(slot) => slot.mark,
                None => return Ok(None),
            };

            let winner: Winner = remaining.into();
            game.status = GameStatus::Completed;
            game.winner = Some(winner);
            game.turn = None;

            match self.store.update(game).await {
                Ok(_) => {
                    warn!(room = %code, user = %user, winner = ?winner, "disconnect grace elapsed, game forfeited");
                    return Ok(Some(GraceForfeit {
                        room_code: code.to_string(),
                        winner,
                    }));
                }
                Err(StoreError::VersionConflict(_)) => continue,
                Err(err) => return Err(err.into()),
            }
        }

        Err(GameError::Internal(format!(
            "grace settlement for room {code} kept losing version races"
        )))
    }

    /// Resynchronize a client with no reliable local state. Looks the
    /// identity up in the durable store, ignoring any stale binding,
    /// and rebinds the fresh connection.
    pub async fn recover_state(
        &self,
        user: UserId,
        conn: ConnId,
    ) -> Result<RecoveredState, GameError> {
        let game = match self.store.find_active_by_user(user).await? {
            Some(game) => game,
            None => return Ok(RecoveredState::None),
        };

        self.directory.bind(conn, user, &game.room_code).await;

        match game.status {
            GameStatus::Waiting => Ok(RecoveredState::Waiting {
                room_code: game.room_code,
            }),
            GameStatus::Playing => {
                let snapshot = self.snapshot(&game, Some(user)).await?;
                Ok(RecoveredState::Playing(snapshot))
            }
            // find_active_by_user never returns completed records
            GameStatus::Completed => Ok(RecoveredState::None),
        }
    }

    /// Create a rematch: fresh room code, same identities, host and
    /// marks swapped, started directly in `playing`. Moves all
    /// currently-bound connections over to the new room.
    pub async fn play_again(&self, code: &str) -> Result<RematchOutcome, GameError> {
        let old = self
            .store
            .find_by_room_code(code)
            .await?
            .ok_or(GameError::SessionNotFound)?;

        // A live session cannot be abandoned into a rematch: the old
        // game must reach a terminal state first, or both identities
        // would hold seats in two non-completed sessions at once.
        if old.status != GameStatus::Completed {
            return Err(GameError::SessionNotFinished);
        }

        let new_host = old.players.iter().find(|slot| !slot.is_host);
        let new_guest = old.players.iter().find(|slot| slot.is_host);
        let (new_host, new_guest) = match (new_host, new_guest) {
            (Some(host), Some(guest)) => (host.user_id, guest.user_id),
            _ => return Err(GameError::IncompletePlayerSet),
        };

        let game = self
            .insert_with_fresh_code(|fresh| GameRecord::new_rematch(fresh, new_host, new_guest))
            .await?;

        self.directory.move_room(code, &game.room_code).await;

        let mut personalized = Vec::with_capacity(game.players.len());
        for slot in &game.players {
            let snapshot = self.snapshot(&game, Some(slot.user_id)).await?;
            personalized.push((slot.user_id, snapshot));
        }

        info!(old_room = %code, new_room = %game.room_code, "rematch started");
        Ok(RematchOutcome {
            old_room: code.to_string(),
            new_room: game.room_code,
            personalized,
        })
    }

    /// Connect-time hint: if the identity has an active session, rebind
    /// the fresh connection and report it, without the full snapshot.
    pub async fn connect_hint(&self, user: UserId, conn: ConnId) -> Result<bool, GameError> {
        match self.store.find_active_by_user(user).await? {
            Some(game) => {
                self.directory.bind(conn, user, &game.room_code).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Reject callers already seated in an active session; rebind their
    /// connection to it so recovery still works.
    async fn ensure_not_in_active_game(&self, user: UserId, conn: ConnId) -> Result<(), GameError> {
        if let Some(existing) = self.store.find_active_by_user(user).await? {
            self.directory.bind(conn, user, &existing.room_code).await;
            return Err(GameError::AlreadyInSession);
        }
        Ok(())
    }

    /// Insert a new record under a freshly generated code, retrying on
    /// the store's unique-constraint violation.
    async fn insert_with_fresh_code<F>(&self, build: F) -> Result<GameRecord, GameError>
    where
        F: Fn(String) -> GameRecord,
    {
        for _ in 0..CODE_RETRIES {
            let game = build(room_code::generate_default());
            match self.store.insert(game.clone()).await {
                Ok(()) => return Ok(game),
                Err(StoreError::DuplicateRoomCode(code)) => {
                    warn!(room = %code, "room code collision, regenerating");
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(GameError::Internal(
            "could not generate a unique room code".into(),
        ))
    }

    /// Build a full snapshot with public profiles populated. When
    /// `viewer` is set the payload is personalized with their opponent.
    async fn snapshot(
        &self,
        game: &GameRecord,
        viewer: Option<UserId>,
    ) -> Result<GameSnapshot, GameError> {
        let mut players = Vec::with_capacity(game.players.len());
        for slot in &game.players {
            let record = self
                .users
                .find(slot.user_id)
                .await?
                .ok_or_else(|| GameError::Internal(format!("user record missing: {}", slot.user_id)))?;
            players.push(PlayerSummary {
                id: slot.user_id,
                name: record.name,
                avatar: record.avatar,
                mark: slot.mark,
                is_host: slot.is_host,
            });
        }

        let opponent = match viewer {
            Some(viewer) => match game.opponent_of(viewer) {
                Some(slot) => {
                    let record = self.users.find(slot.user_id).await?.ok_or_else(|| {
                        GameError::Internal(format!("user record missing: {}", slot.user_id))
                    })?;
                    Some(record.profile())
                }
                None => None,
            },
            None => None,
        };

        Ok(GameSnapshot {
            room_code: game.room_code.clone(),
            board: game.board,
            status: game.status,
            turn: game.turn,
            opponent,
            players,
        })
    }
}

fn slot_summaries(game: &GameRecord) -> Vec<SlotSummary> {
    game.players
        .iter()
        .map(|slot| SlotSummary {
            id: slot.user_id,
            mark: slot.mark,
            is_host: slot.is_host,
        })
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
