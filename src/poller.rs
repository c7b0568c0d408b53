//! Background loops run by each device
//!
//! Nothing is pushed to a device; it learns about every change by polling.
//! Failed ticks are logged and retried on the next tick.

use crate::config::SyncConfig;
use crate::controller::{DevicePhase, DeviceSnapshot, RoundSync, SyncEvent};
use crate::error::{GameError, GameResult, StoreError};
use crate::lobby::Lobby;
use crate::projector::{derive_stage, seconds_left, token_timestamp};
use crate::types::*;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// One device's view of a room, shared between its loops and its UI
pub struct DeviceSync {
    lobby: Lobby,
    code: String,
    sync: RwLock<RoundSync>,
    latest: RwLock<Option<DeviceSnapshot>>,
    events: broadcast::Sender<SyncEvent>,
}

impl DeviceSync {
    pub fn new(lobby: Lobby, code: impl Into<String>, me: Option<PlayerId>) -> Self {
        let (tx, _rx) = broadcast::channel(64);
        Self {
            lobby,
            code: code.into(),
            sync: RwLock::new(RoundSync::new(me)),
            latest: RwLock::new(None),
            events: tx,
        }
    }

    pub fn lobby(&self) -> &Lobby {
        &self.lobby
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Latest snapshot fetched by [`DeviceSync::poll_once`]
    pub async fn latest(&self) -> Option<DeviceSnapshot> {
        self.latest.read().await.clone()
    }

    pub async fn phase(&self) -> DevicePhase {
        self.sync.read().await.phase()
    }

    /// Run a closure against the state machine (acknowledge a role, go back to the lobby)
    pub async fn with_sync<R>(&self, f: impl FnOnce(&mut RoundSync) -> R) -> R {
        f(&mut *self.sync.write().await)
    }

    /// Fetch the room once, moving the state machine out of `Setup`
    pub async fn enter_lobby(&self) -> GameResult<()> {
        let snapshot = self.fetch(false).await?;
        self.sync.write().await.enter_lobby(&snapshot.room);
        *self.latest.write().await = Some(snapshot);
        Ok(())
    }

    async fn fetch(&self, with_round: bool) -> GameResult<DeviceSnapshot> {
        let lobby = self.lobby.fetch_lobby(&self.code).await?;
        let log = if lobby.room.started_at.is_some() && with_round {
            Some(self.lobby.fetch_round(&lobby.room).await?)
        } else {
            None
        };
        Ok(DeviceSnapshot {
            room: lobby.room,
            players: lobby.players,
            log,
        })
    }

    /// One tick: fetch, observe, publish what changed
    pub async fn poll_once(&self) -> GameResult<Vec<SyncEvent>> {
        let snapshot = match self.fetch(true).await {
            Ok(snapshot) => snapshot,
            // The room itself is gone: treat it like being removed
            Err(GameError::Validation(msg)) => {
                tracing::debug!("Room lookup failed: {}", msg);
                return Ok(self.mark_removed().await);
            }
            Err(e) => return Err(e),
        };

        let events = self.sync.write().await.observe(&snapshot);
        *self.latest.write().await = Some(snapshot);

        for event in &events {
            // No subscribers is fine
            let _ = self.events.send(event.clone());
        }
        Ok(events)
    }

    /// Chat lines of the latest snapshot, at most `limit`
    pub async fn recent_chat(&self, limit: usize) -> Vec<RoundEvent> {
        match self.latest.read().await.as_ref() {
            Some(DeviceSnapshot { log: Some(log), .. }) => {
                log.recent_chat(limit).into_iter().cloned().collect()
            }
            _ => Vec::new(),
        }
    }

    async fn mark_removed(&self) -> Vec<SyncEvent> {
        if !self.sync.write().await.mark_removed() {
            return Vec::new();
        }
        let _ = self.events.send(SyncEvent::Removed);
        vec![SyncEvent::Removed]
    }

    /// Host-only prune sweep; returns whether it ran
    async fn prune_if_host(&self, config: &SyncConfig) -> GameResult<bool> {
        let me = self.sync.read().await.me().map(str::to_string);
        let Some(me) = me else {
            return Ok(false);
        };
        let room = match self.latest.read().await.as_ref() {
            Some(snapshot) if snapshot.room.is_host(&me) => snapshot.room.id.clone(),
            _ => return Ok(false),
        };

        self.lobby.prune_inactive(&room, config.prune_timeout).await?;
        Ok(true)
    }
}

/// Poll the room on a fixed interval until the device is removed
pub fn spawn_device_sync(device: Arc<DeviceSync>, config: SyncConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_prune: Option<Instant> = None;

        loop {
            if let Err(e) = device.poll_once().await {
                tracing::warn!(code = %device.code, "Poll failed: {}", e);
            }

            if device.phase().await == DevicePhase::Removed {
                tracing::info!(code = %device.code, "Device removed, stopping sync");
                break;
            }

            let due = last_prune
                .map(|at| at.elapsed() >= config.prune_every)
                .unwrap_or(true);
            if due {
                match device.prune_if_host(&config).await {
                    Ok(true) => last_prune = Some(Instant::now()),
                    Ok(false) => {}
                    Err(e) => tracing::warn!(code = %device.code, "Prune failed: {}", e),
                }
            }

            tokio::time::sleep(config.poll_interval).await;
        }
    })
}

/// Refresh the player's heartbeat until the row is gone
pub fn spawn_heartbeat(lobby: Lobby, player_id: PlayerId, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match lobby.touch_player(&player_id).await {
                Ok(_) => {}
                Err(GameError::Store(StoreError::NotFound(_))) => {
                    tracing::info!(player_id = %player_id, "Player gone, stopping heartbeat");
                    break;
                }
                Err(e) => tracing::warn!(player_id = %player_id, "Heartbeat failed: {}", e),
            }
            tokio::time::sleep(interval).await;
        }
    })
}

/// Publish the seconds left on the voting countdown while voting is open
pub fn spawn_countdown(device: Arc<DeviceSync>, config: SyncConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_sent: Option<u64> = None;

        loop {
            tokio::time::sleep(config.countdown_tick).await;

            if device.phase().await == DevicePhase::Removed {
                break;
            }

            let left = match device.latest().await {
                Some(DeviceSnapshot {
                    room,
                    log: Some(log),
                    ..
                }) if derive_stage(&room, &log.events) == Stage::Voting => {
                    token_timestamp(&log.events, VOTING_START_TOKEN)
                        .map(|started| seconds_left(started, Utc::now(), config.voting_countdown))
                }
                _ => None,
            };

            match left {
                Some(seconds_left) if last_sent != Some(seconds_left) => {
                    last_sent = Some(seconds_left);
                    let _ = device.events.send(SyncEvent::Countdown { seconds_left });
                }
                Some(_) => {}
                None => last_sent = None,
            }
        }
    })
}
