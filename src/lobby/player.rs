use super::Lobby;
use crate::error::{GameError, GameResult, StoreError};
use crate::moderation::sanitize_name;
use crate::store::{NewPlayerRow, PlayerUpdate};
use crate::types::*;
use chrono::Utc;
use rand::seq::IndexedRandom;
use std::time::Duration;

/// Pick a random survivor for the host seat (sync so the rng never crosses an await)
fn pick_new_host(players: &[Player]) -> Option<PlayerId> {
    players.choose(&mut rand::rng()).map(|p| p.id.clone())
}

impl Lobby {
    /// Join a room by code
    pub async fn join_room(&self, code: &str, name: &str) -> GameResult<Player> {
        let name = sanitize_name(name);
        if name.is_empty() {
            return Err(GameError::Validation("Please enter a name.".to_string()));
        }
        if name.eq_ignore_ascii_case(HOST_NAME) || !self.moderator.is_name_allowed(&name) {
            return Err(GameError::Validation(
                "That name isn't allowed. Please choose another.".to_string(),
            ));
        }

        let room = self.find_room(code).await?;
        let players = self.store.list_players(&room.id).await?;
        let lowered = name.to_lowercase();
        if players.iter().any(|p| p.name.to_lowercase() == lowered) {
            return Err(GameError::Validation(
                "That name is already taken in this room. Please choose another.".to_string(),
            ));
        }

        let player = self
            .store
            .insert_player(
                &room.id,
                NewPlayerRow {
                    name,
                    ready_for_next_round: true,
                    last_seen_at: Some(Utc::now()),
                },
            )
            .await?;

        tracing::info!(
            room_id = %room.id,
            player_id = %player.id,
            name = %player.name,
            "Player joined"
        );
        Ok(player)
    }

    /// Set the ready flag; also counts as a heartbeat
    pub async fn set_ready(&self, player_id: &str, ready: bool) -> GameResult<Player> {
        Ok(self
            .store
            .update_player(
                player_id,
                PlayerUpdate::Ready {
                    ready,
                    last_seen_at: Utc::now(),
                },
            )
            .await?)
    }

    /// Heartbeat
    pub async fn touch_player(&self, player_id: &str) -> GameResult<Player> {
        Ok(self
            .store
            .update_player(
                player_id,
                PlayerUpdate::Seen {
                    last_seen_at: Utc::now(),
                },
            )
            .await?)
    }

    /// Host removes a player
    pub async fn kick_player(&self, room_id: &str, player_id: &str) -> GameResult<()> {
        self.remove_player(room_id, player_id).await?;
        tracing::info!(room_id, player_id, "Player kicked");
        Ok(())
    }

    /// A player leaves on their own; leaving twice is not an error
    pub async fn leave_room(&self, player_id: &str) -> GameResult<()> {
        let player = match self.store.player(player_id).await {
            Ok(player) => player,
            Err(StoreError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        self.remove_player(&player.room_id, player_id).await?;
        tracing::info!(room_id = %player.room_id, player_id, "Player left");
        Ok(())
    }

    /// Delete players whose heartbeat is missing or older than `timeout`
    pub async fn prune_inactive(&self, room_id: &str, timeout: Duration) -> GameResult<Vec<PlayerId>> {
        let timeout = chrono::Duration::from_std(timeout)
            .map_err(|e| GameError::Validation(format!("invalid prune timeout: {}", e)))?;
        let cutoff = Utc::now() - timeout;

        let removed = self.store.delete_players_seen_before(room_id, cutoff).await?;
        if !removed.is_empty() {
            tracing::info!(room_id, count = removed.len(), "Pruned inactive players");
            self.ensure_host(room_id).await?;
        }
        Ok(removed)
    }

    async fn remove_player(&self, room_id: &str, player_id: &str) -> GameResult<()> {
        match self.store.delete_player(player_id).await {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.ensure_host(room_id).await
    }

    /// Reassign the host seat when its holder is gone
    async fn ensure_host(&self, room_id: &str) -> GameResult<()> {
        let room = self.store.room(room_id).await?;
        let Some(host_id) = room.host_player_id.as_deref() else {
            return Ok(());
        };

        let players = self.store.list_players(room_id).await?;
        if players.iter().any(|p| p.id == host_id) {
            return Ok(());
        }

        let new_host = pick_new_host(&players);
        tracing::info!(room_id, old_host = host_id, new_host = ?new_host, "Host failover");
        self.set_host(room_id, new_host.as_deref()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::tests::{lobby, new_room};
    use crate::store::RowStore;

    #[tokio::test]
    async fn test_join_rejects_bad_names() {
        let lobby = lobby();
        let room = lobby.create_room(new_room()).await.unwrap();

        for bad in ["   ", "host", "sh1iit"] {
            assert!(matches!(
                lobby.join_room(&room.code, bad).await,
                Err(GameError::Validation(_))
            ));
        }

        lobby.join_room(&room.code, "Ana").await.unwrap();
        let err = lobby.join_room(&room.code, "  ANA ").await.unwrap_err();
        assert!(err.to_string().contains("already taken"));
    }

    #[tokio::test]
    async fn test_join_sets_ready_and_heartbeat() {
        let lobby = lobby();
        let room = lobby.create_room(new_room()).await.unwrap();
        let player = lobby
            .join_room(&room.code.to_lowercase(), "A very long name indeed, too long")
            .await
            .unwrap();

        assert!(player.ready_for_next_round);
        assert!(player.last_seen_at.is_some());
        assert_eq!(player.name.chars().count(), crate::moderation::MAX_NAME_LEN);
    }

    #[tokio::test]
    async fn test_set_ready() {
        let lobby = lobby();
        let room = lobby.create_room(new_room()).await.unwrap();
        let player = lobby.join_room(&room.code, "Ana").await.unwrap();

        let player = lobby.set_ready(&player.id, false).await.unwrap();
        assert!(!player.ready_for_next_round);
        assert!(lobby.touch_player(&player.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_leaving_host_hands_over_seat() {
        let lobby = lobby();
        let (room, host) = lobby.host_room(new_room(), "Ana").await.unwrap();
        let ben = lobby.join_room(&room.code, "Ben").await.unwrap();
        let cleo = lobby.join_room(&room.code, "Cleo").await.unwrap();

        lobby.leave_room(&host.id).await.unwrap();
        let room = lobby.store().room(&room.id).await.unwrap();
        let new_host = room.host_player_id.unwrap();
        assert!(new_host == ben.id || new_host == cleo.id);

        // Leaving twice is harmless
        lobby.leave_room(&host.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_last_player_leaving_clears_host() {
        let lobby = lobby();
        let (room, host) = lobby.host_room(new_room(), "Ana").await.unwrap();
        lobby.leave_room(&host.id).await.unwrap();

        let room = lobby.store().room(&room.id).await.unwrap();
        assert!(room.host_player_id.is_none());
    }

    #[tokio::test]
    async fn test_kick_non_host_keeps_host() {
        let lobby = lobby();
        let (room, host) = lobby.host_room(new_room(), "Ana").await.unwrap();
        let ben = lobby.join_room(&room.code, "Ben").await.unwrap();

        lobby.kick_player(&room.id, &ben.id).await.unwrap();
        let snapshot = lobby.fetch_lobby(&room.code).await.unwrap();
        assert_eq!(snapshot.players.len(), 1);
        assert!(snapshot.room.is_host(&host.id));
    }

    #[tokio::test]
    async fn test_prune_inactive_reassigns_host() {
        let lobby = lobby();
        let room = lobby.create_room(new_room()).await.unwrap();
        // A player that never sent a heartbeat
        let ghost = lobby
            .store()
            .insert_player(
                &room.id,
                NewPlayerRow {
                    name: "Ghost".to_string(),
                    ready_for_next_round: true,
                    last_seen_at: None,
                },
            )
            .await
            .unwrap();
        lobby.set_host(&room.id, Some(&ghost.id)).await.unwrap();
        let ana = lobby.join_room(&room.code, "Ana").await.unwrap();

        let removed = lobby
            .prune_inactive(&room.id, Duration::from_secs(120))
            .await
            .unwrap();
        assert_eq!(removed, vec![ghost.id]);

        let room = lobby.store().room(&room.id).await.unwrap();
        assert_eq!(room.host_player_id.as_deref(), Some(ana.id.as_str()));
    }
}
