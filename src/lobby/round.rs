use super::{Lobby, RoundLog};
use crate::engine::{compute_outcome, imposter_limits, OutcomeInput, RoundOutcome};
use crate::error::{GameError, GameResult};
use crate::projector::{chatted_players, derive_stage, seconds_left, token_timestamp};
use crate::store::{NewEventRow, RoomUpdate};
use crate::types::*;
use crate::voting::voters;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Fewest ready players a round can start with
pub const MIN_ROUND_PLAYERS: usize = 3;

/// Current time truncated to whole milliseconds, the precision of a round key
fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

/// Ready players who had joined by the time the round started
pub fn round_roster(players: &[Player], started_at: DateTime<Utc>) -> Vec<Player> {
    let cutoff = started_at.timestamp_millis();
    players
        .iter()
        .filter(|p| p.ready_for_next_round && p.joined_at.timestamp_millis() <= cutoff)
        .cloned()
        .collect()
}

/// Start time for a round over `players`, never earlier than a ready
/// player's `joined_at`. The store stamps `joined_at` with its own clock, so
/// a host clock running behind would otherwise leave fresh joiners out.
fn round_start_time(players: &[Player], now: DateTime<Utc>) -> DateTime<Utc> {
    players
        .iter()
        .filter(|p| p.ready_for_next_round)
        .map(|p| p.joined_at.timestamp_millis())
        .max()
        .filter(|&latest| latest > now.timestamp_millis())
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or(now)
}

/// Outcome every device derives for the room's current round
pub fn outcome_for(room: &Room, roster: &[Player]) -> RoundOutcome {
    let (min_imposters, max_imposters) = imposter_limits(&room.settings);
    let key = room.round_key();
    compute_outcome(&OutcomeInput {
        code: &room.code,
        round_key: key.as_deref(),
        roster,
        words: &room.category.words,
        min_imposters,
        max_imposters,
    })
}

/// Whether the host may post VOTING_START
pub fn check_begin_voting(room: &Room, roster: &[Player], events: &[RoundEvent]) -> GameResult<()> {
    if room.started_at.is_none() {
        return Err(GameError::Precondition("No round in progress.".to_string()));
    }
    if derive_stage(room, events) != Stage::Discussion {
        return Err(GameError::Precondition("Voting has already started.".to_string()));
    }
    if room.settings.require_chat_clue {
        let chatted = chatted_players(events);
        let missing = roster.iter().filter(|p| !chatted.contains(&p.id)).count();
        if missing > 0 {
            return Err(GameError::Precondition(format!(
                "Waiting for {} player(s) to send a clue.",
                missing
            )));
        }
    }
    Ok(())
}

/// Whether the host may post REVEAL_VOTES
pub fn check_reveal_votes(
    room: &Room,
    roster: &[Player],
    log: &RoundLog,
    now: DateTime<Utc>,
    countdown: Duration,
) -> GameResult<()> {
    if derive_stage(room, &log.events) != Stage::Voting {
        return Err(GameError::Precondition("Voting is not open.".to_string()));
    }

    let voted = voters(&log.votes);
    if roster.iter().all(|p| voted.contains(&p.id)) {
        return Ok(());
    }

    let elapsed = token_timestamp(&log.events, VOTING_START_TOKEN)
        .map(|started| seconds_left(started, now, countdown) == 0)
        .unwrap_or(false);
    if elapsed {
        Ok(())
    } else {
        Err(GameError::Precondition(
            "Wait for every vote or for the countdown to finish.".to_string(),
        ))
    }
}

fn current_round_key(room: &Room) -> GameResult<RoundKey> {
    room.round_key()
        .ok_or_else(|| GameError::Precondition("No round in progress.".to_string()))
}

impl Lobby {
    /// Start a new round over the ready players
    pub async fn start_round(&self, code: &str) -> GameResult<Room> {
        let room = self.find_room(code).await?;
        if room.category.words.is_empty() {
            return Err(GameError::Validation(
                "The selected category has no words.".to_string(),
            ));
        }

        let players = self.store.list_players(&room.id).await?;
        let started_at = round_start_time(&players, now_millis());
        let roster = round_roster(&players, started_at);
        if roster.len() < MIN_ROUND_PLAYERS {
            return Err(GameError::Capacity(format!(
                "At least {} ready players are needed to start.",
                MIN_ROUND_PLAYERS
            )));
        }

        let mut next = room.clone();
        next.started_at = Some(started_at);
        let outcome = outcome_for(&next, &roster);

        let room = self
            .store
            .update_room(
                &room.id,
                RoomUpdate::StartRound {
                    started_at,
                    first_speaker_player_id: outcome.first_speaker.clone(),
                },
            )
            .await?;

        tracing::info!(
            room_id = %room.id,
            round_key = %round_key(&started_at),
            roster = roster.len(),
            imposters = outcome.imposters.len(),
            "Round started"
        );
        Ok(room)
    }

    /// End the round and send everyone back to not-ready
    pub async fn reveal(&self, code: &str) -> GameResult<Room> {
        let room = self.find_room(code).await?;
        if room.started_at.is_none() {
            return Err(GameError::Precondition(
                "Results can't be revealed before a round has started.".to_string(),
            ));
        }

        let room = self
            .store
            .update_room(
                &room.id,
                RoomUpdate::Reveal {
                    revealed_at: Utc::now(),
                },
            )
            .await?;
        self.store.set_all_ready(&room.id, false).await?;

        tracing::info!(room_id = %room.id, "Round revealed");
        Ok(room)
    }

    fn check_message(&self, text: &str) -> GameResult<String> {
        let text = text.trim();
        if text.is_empty() {
            return Err(GameError::Validation("Message is empty.".to_string()));
        }
        if text.starts_with(SYSTEM_PREFIX) {
            return Err(GameError::Validation("That message is reserved.".to_string()));
        }
        if !self.moderator.is_text_allowed(text) {
            return Err(GameError::Validation(
                "That message isn't allowed.".to_string(),
            ));
        }
        Ok(text.to_string())
    }

    async fn append_event(
        &self,
        room: &Room,
        player_id: Option<PlayerId>,
        name: &str,
        message: String,
    ) -> GameResult<RoundEvent> {
        let key = current_round_key(room)?;
        Ok(self
            .store
            .insert_event(
                &room.id,
                NewEventRow {
                    round_key: key,
                    player_id,
                    name: name.to_string(),
                    message,
                },
            )
            .await?)
    }

    /// A player's chat message (clue) for the current round
    pub async fn send_chat(&self, room: &Room, author: &Player, text: &str) -> GameResult<RoundEvent> {
        let message = self.check_message(text)?;
        self.append_event(room, Some(author.id.clone()), &author.name, message)
            .await
    }

    /// Chat from the host display device, which has no player row
    pub async fn post_host_message(&self, room: &Room, text: &str) -> GameResult<RoundEvent> {
        let message = self.check_message(text)?;
        self.append_event(room, None, HOST_NAME, message).await
    }

    pub async fn begin_voting(
        &self,
        room: &Room,
        roster: &[Player],
        events: &[RoundEvent],
    ) -> GameResult<RoundEvent> {
        check_begin_voting(room, roster, events)?;
        let event = self
            .append_event(room, None, HOST_NAME, VOTING_START_TOKEN.to_string())
            .await?;
        tracing::info!(room_id = %room.id, "Voting started");
        Ok(event)
    }

    pub async fn reveal_votes(
        &self,
        room: &Room,
        roster: &[Player],
        log: &RoundLog,
        now: DateTime<Utc>,
        countdown: Duration,
    ) -> GameResult<RoundEvent> {
        check_reveal_votes(room, roster, log, now, countdown)?;
        let event = self
            .append_event(room, None, HOST_NAME, REVEAL_VOTES_TOKEN.to_string())
            .await?;
        tracing::info!(room_id = %room.id, "Votes revealed");
        Ok(event)
    }
}
