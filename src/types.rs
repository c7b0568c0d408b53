use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type RoomId = String;
pub type PlayerId = String;
pub type EventId = String;
pub type VoteId = String;
/// `started_at` of a round, rendered by [`round_key`]
pub type RoundKey = String;

/// Author name used for host-authored and system events
pub const HOST_NAME: &str = "HOST";

/// Stage tokens are reserved chat bodies carrying stage transitions
pub const SYSTEM_PREFIX: &str = "__SYS:";
pub const VOTING_START_TOKEN: &str = "__SYS:VOTING_START__";
pub const REVEAL_VOTES_TOKEN: &str = "__SYS:REVEAL_VOTES__";

/// Render a round start timestamp as the round key shared by every device.
///
/// Millisecond precision with a `Z` suffix, e.g. `2025-03-01T18:04:05.123Z`.
pub fn round_key(started_at: &DateTime<Utc>) -> RoundKey {
    started_at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub words: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomSettings {
    /// Cap the round at exactly one imposter
    pub force_single_imposter: bool,
    /// Everyone must send a chat message before voting can begin
    pub require_chat_clue: bool,
}

/// A shared game session ("games" row)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Room {
    pub id: RoomId,
    pub code: String,
    pub category: Category,
    pub settings: RoomSettings,
    pub host_player_id: Option<PlayerId>,
    /// `None` means no round in progress; otherwise the seed of the round
    pub started_at: Option<DateTime<Utc>>,
    /// Cleared whenever a new round starts
    pub revealed_at: Option<DateTime<Utc>>,
    pub first_speaker_player_id: Option<PlayerId>,
    pub created_at: DateTime<Utc>,
}

impl Room {
    /// Key of the current round, if one has started
    pub fn round_key(&self) -> Option<RoundKey> {
        self.started_at.as_ref().map(round_key)
    }

    pub fn is_host(&self, player_id: &str) -> bool {
        self.host_player_id.as_deref() == Some(player_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub room_id: RoomId,
    pub name: String,
    /// Decides round-roster membership at start time
    pub ready_for_next_round: bool,
    /// Heartbeat used for pruning
    pub last_seen_at: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
}

/// Append-only "chat_messages" row, scoped by room and round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoundEvent {
    pub id: EventId,
    pub room_id: RoomId,
    pub round_key: RoundKey,
    pub player_id: Option<PlayerId>,
    pub name: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vote {
    pub id: VoteId,
    pub room_id: RoomId,
    pub round_key: RoundKey,
    pub voter_player_id: PlayerId,
    pub target_player_id: PlayerId,
    pub created_at: DateTime<Utc>,
}

/// Discussion stage, derived from the event log and the reveal flag
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discussion,
    Voting,
    VoteReveal,
    Final,
}

/// What a single device learns about its own player for a round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum PlayerRole {
    Imposter,
    Innocent { word: String },
}

impl PlayerRole {
    pub fn is_imposter(&self) -> bool {
        matches!(self, PlayerRole::Imposter)
    }
}

/// Input for creating a room
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRoom {
    pub category: Category,
    #[serde(default)]
    pub settings: RoomSettings,
}
