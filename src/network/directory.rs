//! Session Directory
//!
//! Process-wide mapping from live connections to the room they
//! participate in, plus an identity-keyed binding carrying a
//! generation counter. The generation is the cancellation signal for
//! disconnect-grace timers: every rebind bumps it, and a timer that
//! fires against a stale generation is a no-op.
//!
//! Volatile by design - rebuilt per connection and recoverable from
//! the durable store by identity lookup.

use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::game::room::UserId;

/// Identifier for a live connection, assigned by the accept loop.
pub type ConnId = u64;

/// An identity's current room binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserBinding {
    /// Room the identity is bound to.
    pub room_code: String,
    /// Bumped on every rebind; stale grace timers check this.
    pub generation: u64,
}

/// The process-wide binding table. All access is interleaving-safe;
/// no caller holds both locks at once.
#[derive(Default)]
pub struct SessionDirectory {
    by_conn: RwLock<BTreeMap<ConnId, String>>,
    by_user: RwLock<BTreeMap<UserId, UserBinding>>,
}

impl SessionDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection and its identity to a room. Returns the new
    /// generation for the identity binding.
    pub async fn bind(&self, conn: ConnId, user: UserId, room_code: &str) -> u64 {
        {
            let mut by_conn = self.by_conn.write().await;
            by_conn.insert(conn, room_code.to_string());
        }

        let mut by_user = self.by_user.write().await;
        let generation = by_user.get(&user).map(|b| b.generation + 1).unwrap_or(0);
        by_user.insert(
            user,
            UserBinding {
                room_code: room_code.to_string(),
                generation,
            },
        );
        generation
    }

    /// Room the connection is currently bound to.
    pub async fn room_of_conn(&self, conn: ConnId) -> Option<String> {
        let by_conn = self.by_conn.read().await;
        by_conn.get(&conn).cloned()
    }

    /// The identity's current binding.
    pub async fn binding_of_user(&self, user: UserId) -> Option<UserBinding> {
        let by_user = self.by_user.read().await;
        by_user.get(&user).cloned()
    }

    /// Drop a connection's room association (the identity binding is
    /// kept until the disconnect settles or the user leaves).
    pub async fn unbind_conn(&self, conn: ConnId) {
        let mut by_conn = self.by_conn.write().await;
        by_conn.remove(&conn);
    }

    /// Drop an identity's binding entirely (voluntary leave or settled
    /// disconnect).
    pub async fn clear_user(&self, user: UserId) {
        let mut by_user = self.by_user.write().await;
        by_user.remove(&user);
    }

    /// Clear the identity binding only if it still points at `room_code`
    /// with the given generation. Returns whether the binding matched.
    /// This is the fire-time check for grace timers.
    pub async fn settle_user(&self, user: UserId, room_code: &str, generation: u64) -> bool {
        let mut by_user = self.by_user.write().await;
        match by_user.get(&user) {
            Some(binding) if binding.room_code == room_code && binding.generation == generation => {
                by_user.remove(&user);
                true
            }
            _ => false,
        }
    }

    /// All connections currently bound to a room.
    pub async fn conns_in_room(&self, room_code: &str) -> Vec<ConnId> {
        let by_conn = self.by_conn.read().await;
        by_conn
            .iter()
            .filter(|(_, room)| room.as_str() == room_code)
            .map(|(conn, _)| *conn)
            .collect()
    }

    /// Rebind every connection and identity from one room to another
    /// (rematch transition). Identity generations are bumped so pending
    /// grace timers against the old room cannot fire.
    pub async fn move_room(&self, old_code: &str, new_code: &str) {
        {
            let mut by_conn = self.by_conn.write().await;
            for room in by_conn.values_mut() {
                if room.as_str() == old_code {
                    *room = new_code.to_string();
                }
            }
        }

        let mut by_user = self.by_user.write().await;
        for binding in by_user.values_mut() {
            if binding.room_code == old_code {
                binding.room_code = new_code.to_string();
                binding.generation += 1;
            }
        }
    }
}
