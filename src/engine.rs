//! Deterministic outcome engine
//!
//! Every device computes the round outcome on its own from the same inputs
//! (room code, round key, locked roster, word list). Nothing here touches the
//! store or any randomness source: the polynomial string hash is the only
//! source of "randomness", so identical inputs give identical outcomes on
//! every device.

use crate::types::{Player, PlayerId, PlayerRole, RoomSettings};
use std::collections::BTreeSet;

/// Word used when a category has no words at all
pub const UNKNOWN_WORD: &str = "???";

/// Polynomial rolling hash over UTF-16 code units, `h = h * 31 + unit`,
/// wrapped to a signed 32-bit integer, absolute value taken.
pub fn hash_string(s: &str) -> u32 {
    let mut hash: i32 = 0;
    for unit in s.encode_utf16() {
        hash = hash.wrapping_mul(31).wrapping_add(i32::from(unit));
    }
    hash.unsigned_abs()
}

/// Pick a word from the list based on a seed string
pub fn pick_word<'a>(seed: &str, words: &'a [String]) -> Option<&'a str> {
    if words.is_empty() {
        return None;
    }
    let idx = hash_string(seed) as usize % words.len();
    words.get(idx).map(String::as_str)
}

/// Number of imposters for a roster of `n` players.
///
/// Roughly a quarter of the players, at least `min_imposters`, at most
/// `max_imposters` (default `max(1, n / 3)`), and always leaving one innocent.
pub fn imposter_target(n: usize, min_imposters: usize, max_imposters: Option<usize>) -> usize {
    if n < 2 {
        return 0;
    }

    let mut target = (n as f64 * 0.25).round() as usize;
    if target < min_imposters {
        target = min_imposters;
    }

    let hard_max = max_imposters.unwrap_or_else(|| (n / 3).max(1));
    if target > hard_max {
        target = hard_max;
    }

    if target >= n {
        target = n - 1;
    }
    target
}

/// Imposter bounds implied by room settings
pub fn imposter_limits(settings: &RoomSettings) -> (usize, Option<usize>) {
    if settings.force_single_imposter {
        (1, Some(1))
    } else {
        (1, None)
    }
}

/// Inputs shared by every device for one round
#[derive(Debug, Clone)]
pub struct OutcomeInput<'a> {
    pub code: &'a str,
    /// `None` seeds with the code only
    pub round_key: Option<&'a str>,
    pub roster: &'a [Player],
    pub words: &'a [String],
    pub min_imposters: usize,
    pub max_imposters: Option<usize>,
}

/// The derived (never persisted) outcome of a round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundOutcome {
    pub word: String,
    pub imposters: BTreeSet<PlayerId>,
    /// Lowest-ranked player outside the imposter slice
    pub first_speaker: Option<PlayerId>,
}

impl RoundOutcome {
    pub fn is_imposter(&self, player_id: &str) -> bool {
        self.imposters.contains(player_id)
    }
}

fn seed_base(code: &str, round_key: Option<&str>) -> String {
    match round_key {
        Some(key) => format!("{}|{}", code, key),
        None => code.to_string(),
    }
}

/// Compute the shared outcome for a round.
///
/// Players are ranked by `hash("{seed}|{name}")`; ties fall back to the
/// player id so two players with the same name still get a stable order.
pub fn compute_outcome(input: &OutcomeInput<'_>) -> RoundOutcome {
    let seed = seed_base(input.code, input.round_key);
    let word = pick_word(&seed, input.words)
        .unwrap_or(UNKNOWN_WORD)
        .to_string();

    let target = imposter_target(
        input.roster.len(),
        input.min_imposters,
        input.max_imposters,
    );

    let mut ranked: Vec<(u32, &Player)> = input
        .roster
        .iter()
        .map(|p| (hash_string(&format!("{}|{}", seed, p.name)), p))
        .collect();
    ranked.sort_by(|(ha, a), (hb, b)| ha.cmp(hb).then_with(|| a.id.cmp(&b.id)));

    let imposters = ranked
        .iter()
        .take(target)
        .map(|(_, p)| p.id.clone())
        .collect();

    let first_speaker = ranked.get(target).map(|(_, p)| p.id.clone());

    RoundOutcome {
        word,
        imposters,
        first_speaker,
    }
}

/// Role of a single player, `None` when they are not part of the round
pub fn role_for_player(
    outcome: &RoundOutcome,
    roster: &[Player],
    player_id: &str,
) -> Option<PlayerRole> {
    if !roster.iter().any(|p| p.id == player_id) {
        return None;
    }
    if outcome.is_imposter(player_id) {
        Some(PlayerRole::Imposter)
    } else {
        Some(PlayerRole::Innocent {
            word: outcome.word.clone(),
        })
    }
}
