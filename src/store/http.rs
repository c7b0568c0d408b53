use super::*;
use crate::error::StoreError;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Client for the store server exposed by [`crate::api`]
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct Deleted {
    deleted: bool,
}

impl HttpStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Backend(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> StoreResult<reqwest::Response> {
        let response = request.send().await.map_err(|e| {
            tracing::debug!("Store request failed: {}", e);
            StoreError::Unavailable(e.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = match response.json::<ErrorEnvelope>().await {
            Ok(envelope) => envelope.error.message,
            Err(_) => status.to_string(),
        };

        Err(match status {
            StatusCode::NOT_FOUND => StoreError::NotFound(message),
            StatusCode::CONFLICT => StoreError::Conflict(message),
            StatusCode::SERVICE_UNAVAILABLE => StoreError::Unavailable(message),
            _ => StoreError::Backend(message),
        })
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> StoreResult<T> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| StoreError::Backend(format!("invalid store response: {}", e)))
    }
}

#[async_trait]
impl RowStore for HttpStore {
    async fn insert_room(&self, row: NewRoomRow) -> StoreResult<Room> {
        self.json(self.client.post(self.url("/rooms")).json(&row))
            .await
    }

    async fn room_by_code(&self, code: &str) -> StoreResult<Room> {
        self.json(self.client.get(self.url(&format!("/rooms/by-code/{}", code))))
            .await
    }

    async fn room(&self, room_id: &str) -> StoreResult<Room> {
        self.json(self.client.get(self.url(&format!("/rooms/{}", room_id))))
            .await
    }

    async fn update_room(&self, room_id: &str, update: RoomUpdate) -> StoreResult<Room> {
        self.json(
            self.client
                .patch(self.url(&format!("/rooms/{}", room_id)))
                .json(&update),
        )
        .await
    }

    async fn insert_player(&self, room_id: &str, row: NewPlayerRow) -> StoreResult<Player> {
        self.json(
            self.client
                .post(self.url(&format!("/rooms/{}/players", room_id)))
                .json(&row),
        )
        .await
    }

    async fn player(&self, player_id: &str) -> StoreResult<Player> {
        self.json(self.client.get(self.url(&format!("/players/{}", player_id))))
            .await
    }

    async fn update_player(&self, player_id: &str, update: PlayerUpdate) -> StoreResult<Player> {
        self.json(
            self.client
                .patch(self.url(&format!("/players/{}", player_id)))
                .json(&update),
        )
        .await
    }

    async fn delete_player(&self, player_id: &str) -> StoreResult<()> {
        self.send(
            self.client
                .delete(self.url(&format!("/players/{}", player_id))),
        )
        .await?;
        Ok(())
    }

    async fn list_players(&self, room_id: &str) -> StoreResult<Vec<Player>> {
        self.json(
            self.client
                .get(self.url(&format!("/rooms/{}/players", room_id))),
        )
        .await
    }

    async fn delete_players_seen_before(
        &self,
        room_id: &str,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<PlayerId>> {
        self.json(
            self.client
                .post(self.url(&format!("/rooms/{}/players/prune", room_id)))
                .json(&serde_json::json!({ "cutoff": cutoff })),
        )
        .await
    }

    async fn set_all_ready(&self, room_id: &str, ready: bool) -> StoreResult<()> {
        self.send(
            self.client
                .post(self.url(&format!("/rooms/{}/players/ready", room_id)))
                .json(&serde_json::json!({ "ready": ready })),
        )
        .await?;
        Ok(())
    }

    async fn insert_event(&self, room_id: &str, row: NewEventRow) -> StoreResult<RoundEvent> {
        self.json(
            self.client
                .post(self.url(&format!("/rooms/{}/events", room_id)))
                .json(&row),
        )
        .await
    }

    async fn list_events(
        &self,
        room_id: &str,
        round_key: &str,
        limit: Option<usize>,
    ) -> StoreResult<Vec<RoundEvent>> {
        let mut request = self
            .client
            .get(self.url(&format!("/rooms/{}/events", room_id)))
            .query(&[("round_key", round_key)]);
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        self.json(request).await
    }

    async fn insert_vote(&self, room_id: &str, ballot: Ballot) -> StoreResult<Vote> {
        self.json(
            self.client
                .post(self.url(&format!("/rooms/{}/votes", room_id)))
                .json(&ballot),
        )
        .await
    }

    async fn delete_vote(&self, room_id: &str, ballot: &Ballot) -> StoreResult<bool> {
        let deleted: Deleted = self
            .json(
                self.client
                    .post(self.url(&format!("/rooms/{}/votes/retract", room_id)))
                    .json(ballot),
            )
            .await?;
        Ok(deleted.deleted)
    }

    async fn list_votes(&self, room_id: &str, round_key: &str) -> StoreResult<Vec<Vote>> {
        self.json(
            self.client
                .get(self.url(&format!("/rooms/{}/votes", room_id)))
                .query(&[("round_key", round_key)]),
        )
        .await
    }
}
