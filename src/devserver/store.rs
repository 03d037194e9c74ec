use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::DevApiError;
use crate::models::{RoomId, RoomStatus, Username};

/// A room held by the development server. Closing a room deletes it, so
/// every stored room is active.
#[derive(Debug, Clone)]
pub struct RoomRecord {
    pub id: RoomId,
    pub host: Username,
    pub players: Vec<Username>,
    pub created_at: DateTime<Utc>,
    pub max_players: usize,
}

impl RoomRecord {
    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    pub fn status(&self) -> RoomStatus {
        RoomStatus {
            id: self.id.to_string(),
            host: self.host.to_string(),
            players: self.players.iter().map(Username::to_string).collect(),
            status: "active".to_string(),
            created_at: self.created_at.to_rfc3339(),
        }
    }
}

/// In-memory room table
#[derive(Debug)]
pub struct RoomStore {
    rooms: DashMap<RoomId, RoomRecord>,
    max_players: usize,
}

impl RoomStore {
    pub fn new(max_players: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            max_players,
        }
    }

    // ==================== Room Operations ====================

    /// Claim `id` with `host` as the first player.
    pub fn create_room(&self, id: RoomId, host: Username) -> Result<RoomRecord, DevApiError> {
        match self.rooms.entry(id.clone()) {
            Entry::Occupied(_) => Err(DevApiError::Conflict(
                "Room ID already exists. Try another code.".to_string(),
            )),
            Entry::Vacant(slot) => {
                let record = RoomRecord {
                    id,
                    host: host.clone(),
                    players: vec![host],
                    created_at: Utc::now(),
                    max_players: self.max_players,
                };
                slot.insert(record.clone());
                tracing::info!(room_id = %record.id, host = %record.host, "Room created");
                Ok(record)
            }
        }
    }

    pub fn get_room(&self, id: &str) -> Option<RoomRecord> {
        let id = RoomId::parse(id).ok()?;
        self.rooms.get(&id).map(|r| r.value().clone())
    }

    /// Close and remove a room. Only its host may do so.
    pub fn close_room(&self, id: &str, username: &str) -> Result<(), DevApiError> {
        let not_found = || DevApiError::NotFound("Room not found".to_string());
        let id = RoomId::parse(id).map_err(|_| not_found())?;

        let removed = self
            .rooms
            .remove_if(&id, |_, room| room.host.as_str() == username);
        match removed {
            Some(_) => {
                tracing::info!(room_id = %id, "Room closed");
                Ok(())
            }
            None if self.rooms.contains_key(&id) => Err(DevApiError::Forbidden(
                "Only the host can close the room".to_string(),
            )),
            None => Err(not_found()),
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    // ==================== Member Operations ====================

    /// Add `username` to a room. Joining a room one is already in is a no-op.
    pub fn join_room(&self, id: &RoomId, username: Username) -> Result<RoomRecord, DevApiError> {
        let mut room = self.rooms.get_mut(id).ok_or_else(|| {
            DevApiError::NotFound("Room not found. Check the code and try again.".to_string())
        })?;

        if !room.players.contains(&username) {
            if room.is_full() {
                return Err(DevApiError::BadRequest(
                    "Room is full. Maximum players reached.".to_string(),
                ));
            }
            tracing::debug!(room_id = %id, username = %username, "Player joined");
            room.players.push(username);
        }

        Ok(room.value().clone())
    }
}

/// Sliding-window counter keyed by an arbitrary string.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    hits: DashMap<String, Vec<Instant>>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            hits: DashMap::new(),
        }
    }

    /// Record a hit for `key` unless `max` hits already fall inside the
    /// window. Returns whether the hit was allowed.
    ///
    /// Keys whose hits have all expired are dropped along the way.
    pub fn check(&self, key: &str, max: usize) -> bool {
        let now = Instant::now();
        self.hits.retain(|_, hits| {
            hits.retain(|t| now.duration_since(*t) < self.window);
            !hits.is_empty()
        });

        let mut hits = self.hits.entry(key.to_string()).or_default();
        if hits.len() >= max {
            return false;
        }
        hits.push(now);
        true
    }

    pub fn tracked_keys(&self) -> usize {
        self.hits.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> RoomId {
        RoomId::parse(s).unwrap()
    }

    fn user(s: &str) -> Username {
        Username::parse(s).unwrap()
    }

    #[test]
    fn test_duplicate_code_conflicts() {
        let store = RoomStore::new(8);
        store.create_room(id("ABCD"), user("alice")).unwrap();

        let err = store.create_room(id("ABCD"), user("bob")).unwrap_err();
        assert!(matches!(err, DevApiError::Conflict(_)));
        assert_eq!(store.room_count(), 1);
    }

    #[test]
    fn test_join_is_idempotent_and_capped() {
        let store = RoomStore::new(2);
        store.create_room(id("ABCD"), user("alice")).unwrap();

        let room = store.join_room(&id("ABCD"), user("bob")).unwrap();
        assert_eq!(room.players.len(), 2);
        let room = store.join_room(&id("ABCD"), user("bob")).unwrap();
        assert_eq!(room.players.len(), 2);

        let err = store.join_room(&id("ABCD"), user("carol")).unwrap_err();
        assert!(matches!(err, DevApiError::BadRequest(m) if m.contains("full")));
    }

    #[test]
    fn test_join_unknown_or_closed_room() {
        let store = RoomStore::new(8);
        let err = store.join_room(&id("ZZZZ"), user("bob")).unwrap_err();
        assert!(matches!(err, DevApiError::NotFound(_)));

        store.create_room(id("ABCD"), user("alice")).unwrap();
        store.close_room("ABCD", "alice").unwrap();
        let err = store.join_room(&id("ABCD"), user("bob")).unwrap_err();
        assert!(matches!(err, DevApiError::NotFound(_)));
    }

    #[test]
    fn test_only_host_closes() {
        let store = RoomStore::new(8);
        store.create_room(id("ABCD"), user("alice")).unwrap();

        assert!(matches!(
            store.close_room("ABCD", "bob"),
            Err(DevApiError::Forbidden(_))
        ));
        store.close_room("ABCD", "alice").unwrap();
        assert!(store.get_room("ABCD").is_none());
        assert!(matches!(
            store.close_room("ABCD", "alice"),
            Err(DevApiError::NotFound(_))
        ));
    }

    #[test]
    fn test_status_view() {
        let store = RoomStore::new(8);
        store.create_room(id("ABCD"), user("alice")).unwrap();
        let status = store.get_room("ABCD").unwrap().status();
        assert_eq!(status.id, "ABCD");
        assert_eq!(status.players, vec!["alice".to_string()]);
        assert_eq!(status.status, "active");
    }

    #[test]
    fn test_rate_limiter_window() {
        let limiter = RateLimiter::new(Duration::from_secs(60));
        for _ in 0..5 {
            assert!(limiter.check("create:tok", 5));
        }
        assert!(!limiter.check("create:tok", 5));
        assert!(limiter.check("create:other", 5));

        let short = RateLimiter::new(Duration::ZERO);
        assert!(short.check("k", 1));
        assert!(short.check("k", 1));
    }

    #[test]
    fn test_rate_limiter_forgets_expired_keys() {
        let limiter = RateLimiter::new(Duration::from_millis(20));
        assert!(limiter.check("join:tok1", 5));
        assert!(limiter.check("join:tok2", 5));
        assert_eq!(limiter.tracked_keys(), 2);

        std::thread::sleep(Duration::from_millis(40));
        assert!(limiter.check("join:tok3", 5));
        assert_eq!(limiter.tracked_keys(), 1);
    }
}
