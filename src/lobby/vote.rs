use super::Lobby;
use crate::error::{GameError, GameResult, StoreError};
use crate::store::Ballot;
use serde::Serialize;

/// Result of toggling one vote
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct VoteToggle {
    /// Whether the target is selected after the toggle
    pub selected: bool,
}

impl Lobby {
    /// Select `target` for `voter`, or unselect it if already selected.
    ///
    /// A voter may hold at most `cap` selections per round. Voting for
    /// yourself is allowed.
    pub async fn toggle_vote(
        &self,
        room_id: &str,
        round_key: &str,
        voter_id: &str,
        target_id: &str,
        cap: usize,
    ) -> GameResult<VoteToggle> {
        let ballot = Ballot {
            round_key: round_key.to_string(),
            voter_player_id: voter_id.to_string(),
            target_player_id: target_id.to_string(),
        };

        let votes = self.store.list_votes(room_id, round_key).await?;
        let mine = votes.iter().filter(|v| v.voter_player_id == voter_id);
        let mut count = 0;
        let mut existing = false;
        for vote in mine {
            count += 1;
            existing |= vote.target_player_id == target_id;
        }

        if existing {
            self.store.delete_vote(room_id, &ballot).await?;
            tracing::debug!(room_id, voter_id, target_id, "Vote retracted");
            return Ok(VoteToggle { selected: false });
        }

        if count >= cap {
            return Err(GameError::Capacity(format!(
                "You can only vote for up to {} player{}.",
                cap,
                if cap == 1 { "" } else { "s" }
            )));
        }

        match self.store.insert_vote(room_id, ballot).await {
            // A concurrent toggle from the same voter already inserted it
            Ok(_) | Err(StoreError::Conflict(_)) => {}
            Err(e) => return Err(e.into()),
        }
        tracing::debug!(room_id, voter_id, target_id, "Vote cast");
        Ok(VoteToggle { selected: true })
    }
}
