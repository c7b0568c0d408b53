//! Round state projection
//!
//! Stage and speaking turn are never stored. They are folded from the event
//! log on every poll, so a missed or reordered poll corrects itself on the
//! next one.

use crate::types::*;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::time::Duration;

/// System events carry stage tokens; user content never counts as one
pub fn is_system_event(event: &RoundEvent) -> bool {
    event.name.eq_ignore_ascii_case(HOST_NAME) && event.message.starts_with(SYSTEM_PREFIX)
}

/// Events in `created_at` order, keeping store order for equal timestamps
fn chronological(events: &[RoundEvent]) -> Vec<&RoundEvent> {
    let mut ordered: Vec<&RoundEvent> = events.iter().collect();
    ordered.sort_by_key(|e| e.created_at);
    ordered
}

fn token_stage(message: &str) -> Option<Stage> {
    match message {
        VOTING_START_TOKEN => Some(Stage::Voting),
        REVEAL_VOTES_TOKEN => Some(Stage::VoteReveal),
        _ => None,
    }
}

/// Derive the discussion stage from the room flags and the event log
pub fn derive_stage(room: &Room, events: &[RoundEvent]) -> Stage {
    if room.revealed_at.is_some() {
        return Stage::Final;
    }

    chronological(events)
        .into_iter()
        .filter(|e| is_system_event(e))
        .filter_map(|e| token_stage(&e.message))
        .fold(Stage::Discussion, Stage::max)
}

/// Timestamp of the last occurrence of a stage token
pub fn token_timestamp(events: &[RoundEvent], token: &str) -> Option<DateTime<Utc>> {
    events
        .iter()
        .filter(|e| is_system_event(e) && e.message == token)
        .map(|e| e.created_at)
        .max()
}

/// Events that count as player speech (no stage tokens, no host display chat)
pub fn speech_events(events: &[RoundEvent]) -> Vec<&RoundEvent> {
    chronological(events)
        .into_iter()
        .filter(|e| !is_system_event(e))
        .filter(|e| !e.name.eq_ignore_ascii_case(HOST_NAME))
        .filter(|e| e.player_id.is_some())
        .collect()
}

/// Whose turn it is to speak.
///
/// The pointer starts at `first_speaker` (or the first roster member when
/// that player is gone) and moves one step every time the player under the
/// pointer sends a message.
pub fn next_speaker(
    roster: &[Player],
    first_speaker: Option<&str>,
    events: &[RoundEvent],
) -> Option<PlayerId> {
    if roster.is_empty() {
        return None;
    }

    let mut idx = first_speaker
        .and_then(|id| roster.iter().position(|p| p.id == id))
        .unwrap_or(0);

    for event in speech_events(events) {
        if event.player_id.as_deref() == Some(roster[idx].id.as_str()) {
            idx = (idx + 1) % roster.len();
        }
    }

    Some(roster[idx].id.clone())
}

/// Players who have sent at least one non-system message
pub fn chatted_players(events: &[RoundEvent]) -> HashSet<PlayerId> {
    events
        .iter()
        .filter(|e| !is_system_event(e))
        .filter_map(|e| e.player_id.clone())
        .collect()
}

/// Whole seconds left on the voting countdown
pub fn seconds_left(
    voting_started_at: DateTime<Utc>,
    now: DateTime<Utc>,
    countdown: Duration,
) -> u64 {
    let elapsed = (now - voting_started_at).num_seconds().max(0) as u64;
    countdown.as_secs().saturating_sub(elapsed)
}
