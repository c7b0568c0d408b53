use super::Lobby;
use crate::error::{GameError, GameResult, StoreError};
use crate::store::{NewRoomRow, RoomUpdate};
use crate::types::*;
use rand::Rng;

/// Room code alphabet (no 0/O, 1/I)
const CODE_CHARS: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 6;
const CODE_ATTEMPTS: usize = 5;

fn generate_room_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
        .collect()
}

impl Lobby {
    /// Create a room with a fresh code, retrying when the code is taken
    pub async fn create_room(&self, new_room: NewRoom) -> GameResult<Room> {
        for attempt in 1..=CODE_ATTEMPTS {
            let row = NewRoomRow {
                code: generate_room_code(),
                category: new_room.category.clone(),
                settings: new_room.settings.clone(),
            };

            match self.store.insert_room(row).await {
                Ok(room) => {
                    tracing::info!(room_id = %room.id, code = %room.code, "Room created");
                    return Ok(room);
                }
                Err(StoreError::Conflict(_)) => {
                    tracing::debug!(attempt, "Room code collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(GameError::Store(StoreError::Conflict(
            "Could not create a room after several attempts.".to_string(),
        )))
    }

    /// Create a room, join it as `host_name` and take the host seat
    pub async fn host_room(&self, new_room: NewRoom, host_name: &str) -> GameResult<(Room, Player)> {
        let room = self.create_room(new_room).await?;
        let player = self.join_room(&room.code, host_name).await?;
        let room = self.set_host(&room.id, Some(&player.id)).await?;
        Ok((room, player))
    }

    /// Category and settings feed the outcome, so they only change between rounds
    async fn ensure_between_rounds(&self, room_id: &str) -> GameResult<()> {
        let room = self.store.room(room_id).await?;
        if room.started_at.is_some() && room.revealed_at.is_none() {
            return Err(GameError::Precondition(
                "Room setup can only be changed in the lobby.".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn update_category(&self, room_id: &str, category: Category) -> GameResult<Room> {
        if category.words.is_empty() {
            return Err(GameError::Validation(
                "A category needs at least one word.".to_string(),
            ));
        }
        self.ensure_between_rounds(room_id).await?;
        Ok(self
            .store
            .update_room(room_id, RoomUpdate::Category { category })
            .await?)
    }

    pub async fn update_settings(&self, room_id: &str, settings: RoomSettings) -> GameResult<Room> {
        self.ensure_between_rounds(room_id).await?;
        Ok(self
            .store
            .update_room(room_id, RoomUpdate::Settings { settings })
            .await?)
    }

    pub async fn set_host(&self, room_id: &str, player_id: Option<&str>) -> GameResult<Room> {
        let room = self
            .store
            .update_room(
                room_id,
                RoomUpdate::Host {
                    host_player_id: player_id.map(str::to_string),
                },
            )
            .await?;
        tracing::info!(room_id, host = ?room.host_player_id, "Host set");
        Ok(room)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::tests::{lobby, new_room};

    #[test]
    fn test_room_code_shape() {
        for _ in 0..50 {
            let code = generate_room_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.bytes().all(|b| CODE_CHARS.contains(&b)));
        }
    }

    #[tokio::test]
    async fn test_host_room() {
        let lobby = lobby();
        let (room, host) = lobby.host_room(new_room(), "Ana").await.unwrap();
        assert!(room.is_host(&host.id));
        assert!(room.started_at.is_none());

        let snapshot = lobby.fetch_lobby(&room.code.to_lowercase()).await.unwrap();
        assert_eq!(snapshot.players.len(), 1);
        assert_eq!(snapshot.players[0].name, "Ana");
    }

    #[tokio::test]
    async fn test_update_category_and_settings() {
        let lobby = lobby();
        let room = lobby.create_room(new_room()).await.unwrap();

        let empty = Category {
            id: "empty".to_string(),
            name: "Empty".to_string(),
            words: vec![],
        };
        assert!(matches!(
            lobby.update_category(&room.id, empty).await,
            Err(GameError::Validation(_))
        ));

        let animals = Category {
            id: "animals".to_string(),
            name: "Animals".to_string(),
            words: vec!["Otter".to_string()],
        };
        let room = lobby.update_category(&room.id, animals).await.unwrap();
        assert_eq!(room.category.id, "animals");

        let settings = RoomSettings {
            force_single_imposter: true,
            require_chat_clue: true,
        };
        let room = lobby.update_settings(&room.id, settings.clone()).await.unwrap();
        assert_eq!(room.settings, settings);
    }

    #[tokio::test]
    async fn test_setup_is_locked_while_round_runs() {
        let lobby = lobby();
        let (room, _) = lobby.host_room(new_room(), "Ana").await.unwrap();
        lobby.join_room(&room.code, "Ben").await.unwrap();
        lobby.join_room(&room.code, "Cleo").await.unwrap();
        let room = lobby.start_round(&room.code).await.unwrap();

        let animals = Category {
            id: "animals".to_string(),
            name: "Animals".to_string(),
            words: vec!["Otter".to_string()],
        };
        assert!(matches!(
            lobby.update_category(&room.id, animals.clone()).await,
            Err(GameError::Precondition(_))
        ));
        assert!(matches!(
            lobby.update_settings(&room.id, RoomSettings::default()).await,
            Err(GameError::Precondition(_))
        ));
        let unchanged = lobby.fetch_lobby(&room.code).await.unwrap().room;
        assert_eq!(unchanged.category, room.category);

        lobby.reveal(&room.code).await.unwrap();
        let room = lobby.update_category(&room.id, animals).await.unwrap();
        assert_eq!(room.category.id, "animals");
    }
}
