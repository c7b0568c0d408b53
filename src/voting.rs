//! Vote tallies and the final verdict
//!
//! Counts are never stored; they are regrouped from the vote rows every time.

use crate::engine::RoundOutcome;
use crate::types::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// How many targets one voter may select at once
pub fn max_selections(player_count: usize) -> usize {
    (player_count / 2).max(1)
}

/// Count of votes per target
pub fn tally(votes: &[Vote]) -> HashMap<PlayerId, u32> {
    let mut counts: HashMap<PlayerId, u32> = HashMap::new();
    for vote in votes {
        *counts.entry(vote.target_player_id.clone()).or_insert(0) += 1;
    }
    counts
}

/// Players who have cast at least one vote
pub fn voters(votes: &[Vote]) -> HashSet<PlayerId> {
    votes.iter().map(|v| v.voter_player_id.clone()).collect()
}

/// Targets currently selected by one voter
pub fn selections_of(votes: &[Vote], voter_id: &str) -> Vec<PlayerId> {
    votes
        .iter()
        .filter(|v| v.voter_player_id == voter_id)
        .map(|v| v.target_player_id.clone())
        .collect()
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Standing {
    pub player_id: PlayerId,
    pub name: String,
    pub votes: u32,
}

/// Round result shown after the final reveal
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RoundVerdict {
    pub word: String,
    pub imposters: Vec<Standing>,
    /// Sorted by votes descending, then name
    pub standings: Vec<Standing>,
    /// Everyone tied for the most votes (empty when nobody got a vote)
    pub top_voted: Vec<PlayerId>,
    pub imposter_caught: bool,
}

/// Compute the verdict over the locked round roster
pub fn verdict(roster: &[Player], outcome: &RoundOutcome, votes: &[Vote]) -> RoundVerdict {
    let counts = tally(votes);
    let count_of = |id: &str| counts.get(id).copied().unwrap_or(0);

    let mut standings: Vec<Standing> = roster
        .iter()
        .map(|p| Standing {
            player_id: p.id.clone(),
            name: p.name.clone(),
            votes: count_of(&p.id),
        })
        .collect();
    standings.sort_by(|a, b| b.votes.cmp(&a.votes).then_with(|| a.name.cmp(&b.name)));

    let max_votes = standings.iter().map(|s| s.votes).max().unwrap_or(0);
    let top_voted: Vec<PlayerId> = if max_votes == 0 {
        Vec::new()
    } else {
        standings
            .iter()
            .filter(|s| s.votes == max_votes)
            .map(|s| s.player_id.clone())
            .collect()
    };

    let imposter_caught =
        !outcome.imposters.is_empty() && top_voted.iter().any(|id| outcome.is_imposter(id));

    let imposters = standings
        .iter()
        .filter(|s| outcome.is_imposter(&s.player_id))
        .cloned()
        .collect();

    RoundVerdict {
        word: outcome.word.clone(),
        imposters,
        standings,
        top_voted,
        imposter_caught,
    }
}
