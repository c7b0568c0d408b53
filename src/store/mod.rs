//! Shared row store
//!
//! The store is the only shared mutable resource between devices. Every
//! write is a single-row insert, update or delete; there are no multi-row
//! transactions and callers must tolerate stale reads until the next poll.

mod http;
mod memory;

use crate::error::StoreResult;
use crate::types::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use http::HttpStore;
pub use memory::MemoryStore;

/// Row payload for a new room; the code must be unique
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRoomRow {
    pub code: String,
    pub category: Category,
    pub settings: RoomSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPlayerRow {
    pub name: String,
    pub ready_for_next_round: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEventRow {
    pub round_key: RoundKey,
    pub player_id: Option<PlayerId>,
    pub name: String,
    pub message: String,
}

/// One voter's selection of one target; unique per round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ballot {
    pub round_key: RoundKey,
    pub voter_player_id: PlayerId,
    pub target_player_id: PlayerId,
}

/// Single-row updates to a room
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RoomUpdate {
    Category {
        category: Category,
    },
    Settings {
        settings: RoomSettings,
    },
    Host {
        host_player_id: Option<PlayerId>,
    },
    /// Starts a round and clears any previous reveal
    StartRound {
        started_at: DateTime<Utc>,
        first_speaker_player_id: Option<PlayerId>,
    },
    Reveal {
        revealed_at: DateTime<Utc>,
    },
}

impl RoomUpdate {
    /// Apply the update to a row in place
    pub fn apply(self, room: &mut Room) {
        match self {
            RoomUpdate::Category { category } => room.category = category,
            RoomUpdate::Settings { settings } => room.settings = settings,
            RoomUpdate::Host { host_player_id } => room.host_player_id = host_player_id,
            RoomUpdate::StartRound {
                started_at,
                first_speaker_player_id,
            } => {
                room.started_at = Some(started_at);
                room.revealed_at = None;
                room.first_speaker_player_id = first_speaker_player_id;
            }
            RoomUpdate::Reveal { revealed_at } => room.revealed_at = Some(revealed_at),
        }
    }
}

/// Single-row updates to a player
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlayerUpdate {
    Ready {
        ready: bool,
        last_seen_at: DateTime<Utc>,
    },
    Seen {
        last_seen_at: DateTime<Utc>,
    },
}

impl PlayerUpdate {
    pub fn apply(self, player: &mut Player) {
        match self {
            PlayerUpdate::Ready {
                ready,
                last_seen_at,
            } => {
                player.ready_for_next_round = ready;
                player.last_seen_at = Some(last_seen_at);
            }
            PlayerUpdate::Seen { last_seen_at } => player.last_seen_at = Some(last_seen_at),
        }
    }
}

/// Operations every backend must provide
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Insert a room; `Conflict` when the code is taken
    async fn insert_room(&self, row: NewRoomRow) -> StoreResult<Room>;

    async fn room_by_code(&self, code: &str) -> StoreResult<Room>;

    async fn room(&self, room_id: &str) -> StoreResult<Room>;

    async fn update_room(&self, room_id: &str, update: RoomUpdate) -> StoreResult<Room>;

    async fn insert_player(&self, room_id: &str, row: NewPlayerRow) -> StoreResult<Player>;

    async fn player(&self, player_id: &str) -> StoreResult<Player>;

    async fn update_player(&self, player_id: &str, update: PlayerUpdate) -> StoreResult<Player>;

    /// Delete a player; `NotFound` when already gone
    async fn delete_player(&self, player_id: &str) -> StoreResult<()>;

    /// Players of a room, in join order
    async fn list_players(&self, room_id: &str) -> StoreResult<Vec<Player>>;

    /// Delete players whose heartbeat is null or older than `cutoff`,
    /// returning the deleted ids
    async fn delete_players_seen_before(
        &self,
        room_id: &str,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<PlayerId>>;

    /// Set the ready flag of every player in a room
    async fn set_all_ready(&self, room_id: &str, ready: bool) -> StoreResult<()>;

    async fn insert_event(&self, room_id: &str, row: NewEventRow) -> StoreResult<RoundEvent>;

    /// Events of one round, oldest first; `Some(limit)` keeps only the newest `limit`
    async fn list_events(
        &self,
        room_id: &str,
        round_key: &str,
        limit: Option<usize>,
    ) -> StoreResult<Vec<RoundEvent>>;

    /// Insert a vote; `Conflict` on a duplicate ballot
    async fn insert_vote(&self, room_id: &str, ballot: Ballot) -> StoreResult<Vote>;

    /// Delete a vote, returning whether a row existed
    async fn delete_vote(&self, room_id: &str, ballot: &Ballot) -> StoreResult<bool>;

    async fn list_votes(&self, room_id: &str, round_key: &str) -> StoreResult<Vec<Vote>>;
}
