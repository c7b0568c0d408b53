use super::*;
use crate::error::StoreError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-process backend; also what the store server serves over HTTP
#[derive(Clone, Default)]
pub struct MemoryStore {
    rooms: Arc<RwLock<HashMap<RoomId, Room>>>,
    /// Kept in insertion order, which is join order
    players: Arc<RwLock<Vec<Player>>>,
    events: Arc<RwLock<Vec<RoundEvent>>>,
    votes: Arc<RwLock<Vec<Vote>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn new_id() -> String {
    ulid::Ulid::new().to_string()
}

#[async_trait]
impl RowStore for MemoryStore {
    async fn insert_room(&self, row: NewRoomRow) -> StoreResult<Room> {
        let mut rooms = self.rooms.write().await;
        if rooms.values().any(|r| r.code == row.code) {
            return Err(StoreError::Conflict(format!("room code {} taken", row.code)));
        }

        let room = Room {
            id: new_id(),
            code: row.code,
            category: row.category,
            settings: row.settings,
            host_player_id: None,
            started_at: None,
            revealed_at: None,
            first_speaker_player_id: None,
            created_at: Utc::now(),
        };
        rooms.insert(room.id.clone(), room.clone());
        Ok(room)
    }

    async fn room_by_code(&self, code: &str) -> StoreResult<Room> {
        self.rooms
            .read()
            .await
            .values()
            .find(|r| r.code == code)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("room {}", code)))
    }

    async fn room(&self, room_id: &str) -> StoreResult<Room> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("room {}", room_id)))
    }

    async fn update_room(&self, room_id: &str, update: RoomUpdate) -> StoreResult<Room> {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .get_mut(room_id)
            .ok_or_else(|| StoreError::NotFound(format!("room {}", room_id)))?;
        update.apply(room);
        Ok(room.clone())
    }

    async fn insert_player(&self, room_id: &str, row: NewPlayerRow) -> StoreResult<Player> {
        if !self.rooms.read().await.contains_key(room_id) {
            return Err(StoreError::NotFound(format!("room {}", room_id)));
        }

        let player = Player {
            id: new_id(),
            room_id: room_id.to_string(),
            name: row.name,
            ready_for_next_round: row.ready_for_next_round,
            last_seen_at: row.last_seen_at,
            joined_at: Utc::now(),
        };
        self.players.write().await.push(player.clone());
        Ok(player)
    }

    async fn player(&self, player_id: &str) -> StoreResult<Player> {
        self.players
            .read()
            .await
            .iter()
            .find(|p| p.id == player_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("player {}", player_id)))
    }

    async fn update_player(&self, player_id: &str, update: PlayerUpdate) -> StoreResult<Player> {
        let mut players = self.players.write().await;
        let player = players
            .iter_mut()
            .find(|p| p.id == player_id)
            .ok_or_else(|| StoreError::NotFound(format!("player {}", player_id)))?;
        update.apply(player);
        Ok(player.clone())
    }

    async fn delete_player(&self, player_id: &str) -> StoreResult<()> {
        let mut players = self.players.write().await;
        let before = players.len();
        players.retain(|p| p.id != player_id);
        if players.len() == before {
            return Err(StoreError::NotFound(format!("player {}", player_id)));
        }
        Ok(())
    }

    async fn list_players(&self, room_id: &str) -> StoreResult<Vec<Player>> {
        Ok(self
            .players
            .read()
            .await
            .iter()
            .filter(|p| p.room_id == room_id)
            .cloned()
            .collect())
    }

    async fn delete_players_seen_before(
        &self,
        room_id: &str,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<PlayerId>> {
        let mut players = self.players.write().await;
        let is_stale = |p: &Player| {
            p.room_id == room_id && p.last_seen_at.map(|seen| seen < cutoff).unwrap_or(true)
        };

        let removed: Vec<PlayerId> = players
            .iter()
            .filter(|p| is_stale(p))
            .map(|p| p.id.clone())
            .collect();
        players.retain(|p| !is_stale(p));
        Ok(removed)
    }

    async fn set_all_ready(&self, room_id: &str, ready: bool) -> StoreResult<()> {
        let mut players = self.players.write().await;
        for player in players.iter_mut().filter(|p| p.room_id == room_id) {
            player.ready_for_next_round = ready;
        }
        Ok(())
    }

    async fn insert_event(&self, room_id: &str, row: NewEventRow) -> StoreResult<RoundEvent> {
        let event = RoundEvent {
            id: new_id(),
            room_id: room_id.to_string(),
            round_key: row.round_key,
            player_id: row.player_id,
            name: row.name,
            message: row.message,
            created_at: Utc::now(),
        };
        self.events.write().await.push(event.clone());
        Ok(event)
    }

    async fn list_events(
        &self,
        room_id: &str,
        round_key: &str,
        limit: Option<usize>,
    ) -> StoreResult<Vec<RoundEvent>> {
        let events = self.events.read().await;
        let matching: Vec<&RoundEvent> = events
            .iter()
            .filter(|e| e.room_id == room_id && e.round_key == round_key)
            .collect();
        let skip = limit.map_or(0, |limit| matching.len().saturating_sub(limit));
        Ok(matching.into_iter().skip(skip).cloned().collect())
    }

    async fn insert_vote(&self, room_id: &str, ballot: Ballot) -> StoreResult<Vote> {
        let mut votes = self.votes.write().await;
        let duplicate = votes.iter().any(|v| {
            v.room_id == room_id
                && v.round_key == ballot.round_key
                && v.voter_player_id == ballot.voter_player_id
                && v.target_player_id == ballot.target_player_id
        });
        if duplicate {
            return Err(StoreError::Conflict("vote already cast".to_string()));
        }

        let vote = Vote {
            id: new_id(),
            room_id: room_id.to_string(),
            round_key: ballot.round_key,
            voter_player_id: ballot.voter_player_id,
            target_player_id: ballot.target_player_id,
            created_at: Utc::now(),
        };
        votes.push(vote.clone());
        Ok(vote)
    }

    async fn delete_vote(&self, room_id: &str, ballot: &Ballot) -> StoreResult<bool> {
        let mut votes = self.votes.write().await;
        let before = votes.len();
        votes.retain(|v| {
            !(v.room_id == room_id
                && v.round_key == ballot.round_key
                && v.voter_player_id == ballot.voter_player_id
                && v.target_player_id == ballot.target_player_id)
        });
        Ok(votes.len() != before)
    }

    async fn list_votes(&self, room_id: &str, round_key: &str) -> StoreResult<Vec<Vote>> {
        Ok(self
            .votes
            .read()
            .await
            .iter()
            .filter(|v| v.room_id == room_id && v.round_key == round_key)
            .cloned()
            .collect())
    }
}
