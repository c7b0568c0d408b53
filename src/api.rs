//! HTTP store server.
//!
//! Exposes a [`RowStore`] as the JSON API that [`crate::store::HttpStore`]
//! talks to. Every route is a single-row operation; the server holds no game
//! logic of its own.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::StoreError;
use crate::store::{Ballot, NewEventRow, NewPlayerRow, NewRoomRow, PlayerUpdate, RoomUpdate, RowStore};
use crate::types::*;

type SharedStore = Arc<dyn RowStore>;
type ApiResult<T> = Result<Json<T>, StoreError>;

/// Structured JSON error body: `{"error": {"code", "message"}}`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl StoreError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Conflict(_) => StatusCode::CONFLICT,
            StoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            StoreError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "NOT_FOUND",
            StoreError::Conflict(_) => "CONFLICT",
            StoreError::Unavailable(_) => "UNAVAILABLE",
            StoreError::Backend(_) => "BACKEND",
        }
    }

    fn message(&self) -> String {
        match self {
            StoreError::NotFound(m)
            | StoreError::Conflict(m)
            | StoreError::Unavailable(m)
            | StoreError::Backend(m) => m.clone(),
        }
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = %status, "Store request failed: {}", self);
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.message(),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct PruneRequest {
    pub cutoff: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ReadyRequest {
    pub ready: bool,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub round_key: RoundKey,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct VotesQuery {
    pub round_key: RoundKey,
}

#[derive(Debug, Serialize)]
pub struct Deleted {
    pub deleted: bool,
}

/// Build the store router with tracing and permissive CORS
pub fn router(store: SharedStore) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/rooms", post(insert_room))
        .route("/api/rooms/by-code/{code}", get(room_by_code))
        .route("/api/rooms/{id}", get(get_room).patch(update_room))
        .route(
            "/api/rooms/{id}/players",
            get(list_players).post(insert_player),
        )
        .route("/api/rooms/{id}/players/prune", post(prune_players))
        .route("/api/rooms/{id}/players/ready", post(set_all_ready))
        .route(
            "/api/players/{id}",
            get(get_player).patch(update_player).delete(delete_player),
        )
        .route("/api/rooms/{id}/events", get(list_events).post(insert_event))
        .route("/api/rooms/{id}/votes", get(list_votes).post(insert_vote))
        .route("/api/rooms/{id}/votes/retract", post(delete_vote))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

/// GET /health
async fn health() -> &'static str {
    "ok"
}

/// POST /api/rooms
async fn insert_room(State(store): State<SharedStore>, Json(row): Json<NewRoomRow>) -> ApiResult<Room> {
    Ok(Json(store.insert_room(row).await?))
}

/// GET /api/rooms/by-code/{code}
async fn room_by_code(State(store): State<SharedStore>, Path(code): Path<String>) -> ApiResult<Room> {
    Ok(Json(store.room_by_code(&code).await?))
}

async fn get_room(State(store): State<SharedStore>, Path(id): Path<RoomId>) -> ApiResult<Room> {
    Ok(Json(store.room(&id).await?))
}

async fn update_room(
    State(store): State<SharedStore>,
    Path(id): Path<RoomId>,
    Json(update): Json<RoomUpdate>,
) -> ApiResult<Room> {
    Ok(Json(store.update_room(&id, update).await?))
}

async fn list_players(State(store): State<SharedStore>, Path(id): Path<RoomId>) -> ApiResult<Vec<Player>> {
    Ok(Json(store.list_players(&id).await?))
}

async fn insert_player(
    State(store): State<SharedStore>,
    Path(id): Path<RoomId>,
    Json(row): Json<NewPlayerRow>,
) -> ApiResult<Player> {
    Ok(Json(store.insert_player(&id, row).await?))
}

/// POST /api/rooms/{id}/players/prune
///
/// Returns the ids of the deleted players.
async fn prune_players(
    State(store): State<SharedStore>,
    Path(id): Path<RoomId>,
    Json(req): Json<PruneRequest>,
) -> ApiResult<Vec<PlayerId>> {
    Ok(Json(store.delete_players_seen_before(&id, req.cutoff).await?))
}

async fn set_all_ready(
    State(store): State<SharedStore>,
    Path(id): Path<RoomId>,
    Json(req): Json<ReadyRequest>,
) -> Result<StatusCode, StoreError> {
    store.set_all_ready(&id, req.ready).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_player(State(store): State<SharedStore>, Path(id): Path<PlayerId>) -> ApiResult<Player> {
    Ok(Json(store.player(&id).await?))
}

async fn update_player(
    State(store): State<SharedStore>,
    Path(id): Path<PlayerId>,
    Json(update): Json<PlayerUpdate>,
) -> ApiResult<Player> {
    Ok(Json(store.update_player(&id, update).await?))
}

async fn delete_player(
    State(store): State<SharedStore>,
    Path(id): Path<PlayerId>,
) -> Result<StatusCode, StoreError> {
    store.delete_player(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/rooms/{id}/events?round_key=...&limit=...
///
/// Without `limit` the whole round is returned.
async fn list_events(
    State(store): State<SharedStore>,
    Path(id): Path<RoomId>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<Vec<RoundEvent>> {
    Ok(Json(
        store
            .list_events(&id, &query.round_key, query.limit)
            .await?,
    ))
}

async fn insert_event(
    State(store): State<SharedStore>,
    Path(id): Path<RoomId>,
    Json(row): Json<NewEventRow>,
) -> ApiResult<RoundEvent> {
    Ok(Json(store.insert_event(&id, row).await?))
}

async fn list_votes(
    State(store): State<SharedStore>,
    Path(id): Path<RoomId>,
    Query(query): Query<VotesQuery>,
) -> ApiResult<Vec<Vote>> {
    Ok(Json(store.list_votes(&id, &query.round_key).await?))
}

async fn insert_vote(
    State(store): State<SharedStore>,
    Path(id): Path<RoomId>,
    Json(ballot): Json<Ballot>,
) -> ApiResult<Vote> {
    Ok(Json(store.insert_vote(&id, ballot).await?))
}

/// POST /api/rooms/{id}/votes/retract
async fn delete_vote(
    State(store): State<SharedStore>,
    Path(id): Path<RoomId>,
    Json(ballot): Json<Ballot>,
) -> ApiResult<Deleted> {
    let deleted = store.delete_vote(&id, &ballot).await?;
    Ok(Json(Deleted { deleted }))
}
