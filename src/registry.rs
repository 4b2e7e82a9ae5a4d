//! In-memory registry of live rooms: code allocation, capacity enforcement
//! and idle-room sweeping. Everything dies with the process.

use crate::config::{MAX_ROOMS, MAX_ROOM_CODE_ATTEMPTS, ROOM_CODE_LENGTH, SWEEP_INTERVAL};
use crate::room::Room;
use crate::types::Prompt;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Unambiguous alphabet for room codes (no 0/O, 1/I).
const CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Server is at capacity ({0} rooms), try again later")]
    AtCapacity(usize),
    #[error("Could not allocate a unique room code")]
    CodeSpaceExhausted,
}

pub struct SessionRegistry {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
    room_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(room_ttl: Duration) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            room_ttl,
        }
    }

    /// Allocate a code and create a room. Fails when the server is at its
    /// room cap or the code space cannot yield a free code.
    pub async fn create_room(
        &self,
        prompts: Vec<Prompt>,
        timer_seconds: u32,
        show_votes: bool,
        organizer_token: String,
    ) -> Result<Arc<Room>, RegistryError> {
        let mut rooms = self.rooms.write().await;
        if rooms.len() >= MAX_ROOMS {
            return Err(RegistryError::AtCapacity(MAX_ROOMS));
        }

        let mut code = None;
        for _ in 0..MAX_ROOM_CODE_ATTEMPTS {
            let candidate = generate_room_code();
            if !rooms.contains_key(&candidate) {
                code = Some(candidate);
                break;
            }
        }
        let code = code.ok_or(RegistryError::CodeSpaceExhausted)?;

        let room = Arc::new(Room::new(
            code.clone(),
            prompts,
            timer_seconds,
            show_votes,
            organizer_token,
        ));
        rooms.insert(code.clone(), Arc::clone(&room));
        tracing::info!("Created room {} ({} rooms active)", code, rooms.len());
        Ok(room)
    }

    pub async fn get(&self, room_code: &str) -> Option<Arc<Room>> {
        self.rooms.read().await.get(room_code).cloned()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Remove and tear down every room idle for longer than `ttl`. Returns
    /// the removed codes.
    pub async fn sweep_expired(&self, ttl: Duration) -> Vec<String> {
        let mut expired = Vec::new();
        {
            let rooms = self.rooms.read().await;
            for (code, room) in rooms.iter() {
                if room.is_expired(ttl).await {
                    expired.push(code.clone());
                }
            }
        }
        if expired.is_empty() {
            return expired;
        }

        let mut rooms = self.rooms.write().await;
        let mut removed = Vec::new();
        for code in expired {
            // Re-check under the write lock; activity may have resumed
            let still_expired = match rooms.get(&code) {
                Some(room) => room.is_expired(ttl).await,
                None => false,
            };
            if still_expired {
                if let Some(room) = rooms.remove(&code) {
                    room.shutdown().await;
                    tracing::info!("Swept expired room {}", code);
                    removed.push(code);
                }
            }
        }
        removed
    }

    /// Background task evicting idle rooms on a fixed interval.
    pub fn spawn_sweeper(self: &Arc<Self>) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                registry.sweep_expired(registry.room_ttl).await;
            }
        });
    }
}

fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..ROOM_CODE_LENGTH)
        .map(|_| CODE_CHARSET[rng.random_range(0..CODE_CHARSET.len())] as char)
        .collect()
}
