mod player;
mod room;
mod round;
mod vote;

use crate::error::{GameError, GameResult, StoreError};
use crate::moderation::Moderator;
use crate::projector::is_system_event;
use crate::store::RowStore;
use crate::types::*;
use serde::Serialize;
use std::sync::Arc;

pub use round::{
    check_begin_voting, check_reveal_votes, outcome_for, round_roster, MIN_ROUND_PLAYERS,
};
pub use vote::VoteToggle;

/// Room and players as one device sees them at one poll
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LobbySnapshot {
    pub room: Room,
    /// Join order
    pub players: Vec<Player>,
}

/// Everything recorded for the current round
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RoundLog {
    /// Full history, oldest first
    pub events: Vec<RoundEvent>,
    pub votes: Vec<Vote>,
}

impl RoundLog {
    /// The newest `limit` chat lines, oldest first
    pub fn recent_chat(&self, limit: usize) -> Vec<&RoundEvent> {
        let chat: Vec<&RoundEvent> = self
            .events
            .iter()
            .filter(|e| !is_system_event(e))
            .collect();
        let skip = chat.len().saturating_sub(limit);
        chat.into_iter().skip(skip).collect()
    }
}

/// Issues every write a device makes against the shared store
#[derive(Clone)]
pub struct Lobby {
    store: Arc<dyn RowStore>,
    moderator: Moderator,
}

impl Lobby {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self::with_moderator(store, Moderator::default())
    }

    pub fn with_moderator(store: Arc<dyn RowStore>, moderator: Moderator) -> Self {
        Self { store, moderator }
    }

    pub fn store(&self) -> &Arc<dyn RowStore> {
        &self.store
    }

    /// Look up a room by its (case-insensitive) code
    pub async fn find_room(&self, code: &str) -> GameResult<Room> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Err(GameError::Validation("Please enter a room code.".to_string()));
        }
        match self.store.room_by_code(&code).await {
            Ok(room) => Ok(room),
            Err(StoreError::NotFound(_)) => Err(GameError::Validation(format!(
                "No room found with code {}.",
                code
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Room plus players in join order
    pub async fn fetch_lobby(&self, code: &str) -> GameResult<LobbySnapshot> {
        let room = self.find_room(code).await?;
        let players = self.store.list_players(&room.id).await?;
        Ok(LobbySnapshot { room, players })
    }

    /// Events and votes of the room's current round, fetched concurrently
    ///
    /// Stage, turn and the chatted set are folded from this, so the events
    /// are never capped here; cap only what gets displayed.
    pub async fn fetch_round(&self, room: &Room) -> GameResult<RoundLog> {
        let Some(key) = room.round_key() else {
            return Ok(RoundLog::default());
        };

        let (events, votes) = futures::try_join!(
            self.store.list_events(&room.id, &key, None),
            self.store.list_votes(&room.id, &key),
        )?;
        Ok(RoundLog { events, votes })
    }
}

pub(crate) fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Extract the room code from a `?join=CODE` deep link
pub fn join_code_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == "join")
        .map(|(_, v)| normalize_code(&v))
        .filter(|code| !code.is_empty())
}

/// Deep link that opens the join screen with the code filled in
pub fn join_url(origin: &str, code: &str) -> String {
    format!("{}/?join={}", origin.trim_end_matches('/'), code)
}
