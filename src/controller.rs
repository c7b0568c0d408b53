//! Per-device round synchronization state machine
//!
//! Every device (player phones and the host display) runs one [`RoundSync`].
//! It never writes to the store: it folds successive snapshots into a local
//! phase and reports what changed as [`SyncEvent`]s.
//!
//! Phase flow: `Setup -> Lobby -> RoleReveal -> Round -> Final -> Lobby`,
//! with `Removed` reachable from anywhere once the device's player row is gone.

use crate::engine::{role_for_player, RoundOutcome};
use crate::lobby::{check_begin_voting, check_reveal_votes, outcome_for, round_roster, RoundLog};
use crate::projector::{chatted_players, derive_stage, next_speaker, seconds_left, token_timestamp};
use crate::types::*;
use crate::voting::{max_selections, selections_of, tally, verdict, voters, RoundVerdict};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DevicePhase {
    Setup,
    Lobby,
    /// Showing the player their role, waiting for acknowledgement
    RoleReveal,
    Round,
    Final,
    /// Terminal: the device's player was kicked or pruned
    Removed,
}

/// A round this device takes part in (or displays)
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveRound {
    pub round_key: RoundKey,
    /// Ready players locked at the moment the round was observed
    pub roster: Vec<Player>,
    pub outcome: RoundOutcome,
    /// `None` on the host display device
    pub role: Option<PlayerRole>,
}

/// Changes noticed while observing a snapshot
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum SyncEvent {
    RoundStarted {
        round_key: RoundKey,
        role: Option<PlayerRole>,
    },
    StageChanged {
        stage: Stage,
    },
    Revealed,
    Removed,
    HostChanged {
        host_player_id: Option<PlayerId>,
    },
    /// Published by the countdown ticker while voting
    Countdown {
        seconds_left: u64,
    },
}

/// What one poll fetched
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeviceSnapshot {
    pub room: Room,
    pub players: Vec<Player>,
    /// Present whenever the room has a round
    pub log: Option<RoundLog>,
}

/// Everything a round screen renders, derived from the latest snapshot
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RoundView {
    pub round_key: RoundKey,
    pub stage: Stage,
    pub role: Option<PlayerRole>,
    pub next_speaker: Option<PlayerId>,
    pub tally: HashMap<PlayerId, u32>,
    pub voted: HashSet<PlayerId>,
    pub chatted: HashSet<PlayerId>,
    /// Only while voting
    pub seconds_left: Option<u64>,
    pub can_begin_voting: bool,
    pub can_reveal_votes: bool,
    pub my_selections: Vec<PlayerId>,
    pub vote_cap: usize,
    /// Only once the round is revealed
    pub verdict: Option<RoundVerdict>,
}

#[derive(Debug, Clone)]
pub struct RoundSync {
    me: Option<PlayerId>,
    phase: DevicePhase,
    started_at_seen: Option<DateTime<Utc>>,
    revealed_at_seen: Option<DateTime<Utc>>,
    /// `None` until the first observation
    last_host: Option<Option<PlayerId>>,
    round: Option<ActiveRound>,
    stage: Option<Stage>,
}

impl RoundSync {
    /// `me` is the device's player id; the host display has none
    pub fn new(me: Option<PlayerId>) -> Self {
        Self {
            me,
            phase: DevicePhase::Setup,
            started_at_seen: None,
            revealed_at_seen: None,
            last_host: None,
            round: None,
            stage: None,
        }
    }

    pub fn me(&self) -> Option<&str> {
        self.me.as_deref()
    }

    pub fn phase(&self) -> DevicePhase {
        self.phase
    }

    pub fn round(&self) -> Option<&ActiveRound> {
        self.round.as_ref()
    }

    pub fn stage(&self) -> Option<Stage> {
        self.stage
    }

    /// Enter the lobby of `room`. A round already running is remembered as
    /// seen, so a device that joins mid-round waits for the next one.
    pub fn enter_lobby(&mut self, room: &Room) {
        if self.phase != DevicePhase::Setup {
            return;
        }
        self.phase = DevicePhase::Lobby;
        self.started_at_seen = room.started_at;
        self.revealed_at_seen = room.revealed_at;
        self.last_host = Some(room.host_player_id.clone());
        tracing::debug!(room_id = %room.id, me = ?self.me, "Entered lobby");
    }

    /// Fold one snapshot into the local state
    pub fn observe(&mut self, snapshot: &DeviceSnapshot) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        if matches!(self.phase, DevicePhase::Setup | DevicePhase::Removed) {
            return events;
        }

        if let Some(me) = self.me.as_deref() {
            if !snapshot.players.iter().any(|p| p.id == me) {
                tracing::info!(player_id = me, "Player removed from room");
                self.mark_removed();
                events.push(SyncEvent::Removed);
                return events;
            }
        }

        let room = &snapshot.room;
        let host = room.host_player_id.clone();
        if self.last_host.as_ref() != Some(&host) {
            if self.last_host.is_some() {
                events.push(SyncEvent::HostChanged {
                    host_player_id: host.clone(),
                });
            }
            self.last_host = Some(host);
        }

        match self.phase {
            DevicePhase::Lobby => self.detect_round_start(snapshot, &mut events),
            DevicePhase::RoleReveal | DevicePhase::Round => {
                if room.started_at != self.started_at_seen {
                    // Restarted without a reveal
                    self.phase = DevicePhase::Lobby;
                    self.round = None;
                    self.stage = None;
                    self.detect_round_start(snapshot, &mut events);
                } else if room.revealed_at.is_some() && room.revealed_at != self.revealed_at_seen {
                    self.revealed_at_seen = room.revealed_at;
                    self.phase = DevicePhase::Final;
                    self.stage = Some(Stage::Final);
                    events.push(SyncEvent::Revealed);
                } else if let Some(log) = &snapshot.log {
                    let stage = derive_stage(room, &log.events);
                    if self.stage != Some(stage) {
                        self.stage = Some(stage);
                        events.push(SyncEvent::StageChanged { stage });
                    }
                }
            }
            DevicePhase::Setup | DevicePhase::Final | DevicePhase::Removed => {}
        }

        events
    }

    fn detect_round_start(&mut self, snapshot: &DeviceSnapshot, events: &mut Vec<SyncEvent>) {
        let room = &snapshot.room;
        let Some(started_at) = room.started_at else {
            return;
        };
        if Some(started_at) == self.started_at_seen {
            return;
        }
        self.started_at_seen = Some(started_at);

        if room.revealed_at.is_some() {
            // Started and revealed between two polls
            self.revealed_at_seen = room.revealed_at;
            tracing::debug!(room_id = %room.id, "Missed a whole round");
            return;
        }

        let roster = round_roster(&snapshot.players, started_at);

        let outcome = outcome_for(room, &roster);
        let role = match self.me.as_deref() {
            Some(me) => match role_for_player(&outcome, &roster, me) {
                Some(role) => Some(role),
                None => {
                    tracing::debug!(player_id = me, "Sitting out this round");
                    return;
                }
            },
            None => None,
        };

        let round_key = round_key(&started_at);
        tracing::info!(
            room_id = %room.id,
            round_key = %round_key,
            roster = roster.len(),
            "Round observed"
        );

        self.phase = if self.me.is_some() {
            DevicePhase::RoleReveal
        } else {
            DevicePhase::Round
        };
        self.stage = Some(Stage::Discussion);
        self.round = Some(ActiveRound {
            round_key: round_key.clone(),
            roster,
            outcome,
            role: role.clone(),
        });
        events.push(SyncEvent::RoundStarted { round_key, role });
    }

    /// Enter the terminal phase; false when already there
    pub fn mark_removed(&mut self) -> bool {
        if self.phase == DevicePhase::Removed {
            return false;
        }
        self.phase = DevicePhase::Removed;
        self.round = None;
        self.stage = None;
        true
    }

    /// The player has seen their role
    pub fn acknowledge_role(&mut self) -> bool {
        if self.phase != DevicePhase::RoleReveal {
            return false;
        }
        self.phase = DevicePhase::Round;
        true
    }

    /// Leave the result screen
    pub fn back_to_lobby(&mut self) -> bool {
        if self.phase != DevicePhase::Final {
            return false;
        }
        self.phase = DevicePhase::Lobby;
        self.round = None;
        self.stage = None;
        true
    }

    /// Derive the round screen from the latest room and log
    pub fn view(
        &self,
        room: &Room,
        log: &RoundLog,
        now: DateTime<Utc>,
        countdown: Duration,
    ) -> Option<RoundView> {
        let round = self.round.as_ref()?;
        let stage = derive_stage(room, &log.events);

        let seconds_left = match stage {
            Stage::Voting => token_timestamp(&log.events, VOTING_START_TOKEN)
                .map(|started| seconds_left(started, now, countdown)),
            _ => None,
        };

        let verdict = (stage == Stage::Final)
            .then(|| verdict(&round.roster, &round.outcome, &log.votes));

        Some(RoundView {
            round_key: round.round_key.clone(),
            stage,
            role: round.role.clone(),
            next_speaker: next_speaker(
                &round.roster,
                room.first_speaker_player_id.as_deref(),
                &log.events,
            ),
            tally: tally(&log.votes),
            voted: voters(&log.votes),
            chatted: chatted_players(&log.events),
            seconds_left,
            can_begin_voting: check_begin_voting(room, &round.roster, &log.events).is_ok(),
            can_reveal_votes: check_reveal_votes(room, &round.roster, log, now, countdown).is_ok(),
            my_selections: self
                .me
                .as_deref()
                .map(|me| selections_of(&log.votes, me))
                .unwrap_or_default(),
            vote_cap: max_selections(round.roster.len()),
            verdict,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn room() -> Room {
        Room {
            id: "room".to_string(),
            code: "ABC234".to_string(),
            category: Category {
                id: "food".to_string(),
                name: "Food".to_string(),
                words: vec!["Pizza".to_string(), "Sushi".to_string()],
            },
            settings: RoomSettings::default(),
            host_player_id: Some("p0".to_string()),
            started_at: None,
            revealed_at: None,
            first_speaker_player_id: None,
            created_at: ts(0),
        }
    }

    fn player(i: usize, joined: i64) -> Player {
        Player {
            id: format!("p{}", i),
            room_id: "room".to_string(),
            name: format!("Player{}", i),
            ready_for_next_round: true,
            last_seen_at: Some(ts(joined)),
            joined_at: ts(joined),
        }
    }

    fn event(player: Option<&str>, message: &str, at: i64) -> RoundEvent {
        RoundEvent {
            id: format!("e{}", at),
            room_id: "room".to_string(),
            round_key: round_key(&ts(100)),
            player_id: player.map(str::to_string),
            name: player.unwrap_or(HOST_NAME).to_string(),
            message: message.to_string(),
            created_at: ts(at),
        }
    }

    fn snapshot(room: Room, players: Vec<Player>, events: Vec<RoundEvent>) -> DeviceSnapshot {
        let log = room.started_at.map(|_| RoundLog {
            events,
            votes: vec![],
        });
        DeviceSnapshot { room, players, log }
    }

    fn started_room() -> Room {
        let mut room = room();
        room.started_at = Some(ts(100));
        room
    }

    #[test]
    fn test_devices_agree_on_roles() {
        let players: Vec<Player> = (0..5).map(|i| player(i, i as i64)).collect();
        let snap = snapshot(started_room(), players.clone(), vec![]);

        let mut outcomes = Vec::new();
        let mut imposters = 0;
        for p in &players {
            let mut sync = RoundSync::new(Some(p.id.clone()));
            sync.enter_lobby(&room());
            let events = sync.observe(&snap);
            assert!(matches!(events[0], SyncEvent::RoundStarted { .. }));
            assert_eq!(sync.phase(), DevicePhase::RoleReveal);

            let round = sync.round().unwrap();
            if round.role.as_ref().unwrap().is_imposter() {
                imposters += 1;
            }
            outcomes.push(round.outcome.clone());
        }

        assert!(outcomes.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(imposters, outcomes[0].imposters.len());
    }

    #[test]
    fn test_mid_round_joiner_waits() {
        let mut players: Vec<Player> = (0..3).map(|i| player(i, 0)).collect();
        players.push(player(3, 200));
        let snap = snapshot(started_room(), players, vec![]);

        // Entered while the round was already running
        let mut late = RoundSync::new(Some("p3".to_string()));
        late.enter_lobby(&started_room());
        assert!(late.observe(&snap).is_empty());
        assert_eq!(late.phase(), DevicePhase::Lobby);

        // Even a device that saw the lobby first does not count the late joiner
        let mut early = RoundSync::new(Some("p0".to_string()));
        early.enter_lobby(&room());
        early.observe(&snap);
        let roster = &early.round().unwrap().roster;
        assert_eq!(roster.len(), 3);
        assert!(roster.iter().all(|p| p.id != "p3"));
    }

    #[test]
    fn test_not_ready_player_sits_out() {
        let mut players: Vec<Player> = (0..4).map(|i| player(i, 0)).collect();
        players[3].ready_for_next_round = false;
        let snap = snapshot(started_room(), players, vec![]);

        let mut sync = RoundSync::new(Some("p3".to_string()));
        sync.enter_lobby(&room());
        assert!(sync.observe(&snap).is_empty());
        assert_eq!(sync.phase(), DevicePhase::Lobby);
    }

    #[test]
    fn test_display_device_skips_role_reveal() {
        let players: Vec<Player> = (0..3).map(|i| player(i, 0)).collect();
        let mut sync = RoundSync::new(None);
        sync.enter_lobby(&room());
        let events = sync.observe(&snapshot(started_room(), players, vec![]));
        assert_eq!(
            events,
            vec![SyncEvent::RoundStarted {
                round_key: round_key(&ts(100)),
                role: None
            }]
        );
        assert_eq!(sync.phase(), DevicePhase::Round);
    }

    #[test]
    fn test_full_phase_cycle() {
        let players: Vec<Player> = (0..3).map(|i| player(i, 0)).collect();
        let mut sync = RoundSync::new(Some("p1".to_string()));
        assert!(sync.observe(&snapshot(room(), players.clone(), vec![])).is_empty());
        sync.enter_lobby(&room());

        sync.observe(&snapshot(started_room(), players.clone(), vec![]));
        assert!(sync.acknowledge_role());
        assert!(!sync.acknowledge_role());
        assert_eq!(sync.phase(), DevicePhase::Round);

        let voting = vec![event(None, VOTING_START_TOKEN, 110)];
        let events = sync.observe(&snapshot(started_room(), players.clone(), voting.clone()));
        assert_eq!(events, vec![SyncEvent::StageChanged { stage: Stage::Voting }]);
        // Same snapshot again: nothing new
        assert!(sync
            .observe(&snapshot(started_room(), players.clone(), voting))
            .is_empty());

        let mut revealed = started_room();
        revealed.revealed_at = Some(ts(150));
        let events = sync.observe(&snapshot(revealed.clone(), players.clone(), vec![]));
        assert_eq!(events, vec![SyncEvent::Revealed]);
        assert_eq!(sync.phase(), DevicePhase::Final);

        // Stays on the result screen until asked
        assert!(sync.observe(&snapshot(revealed, players, vec![])).is_empty());
        assert!(sync.back_to_lobby());
        assert_eq!(sync.phase(), DevicePhase::Lobby);
        assert!(sync.round().is_none());
    }

    #[test]
    fn test_removed_is_terminal() {
        let players: Vec<Player> = (0..3).map(|i| player(i, 0)).collect();
        let mut sync = RoundSync::new(Some("p2".to_string()));
        sync.enter_lobby(&room());

        let without: Vec<Player> = players[..2].to_vec();
        assert_eq!(
            sync.observe(&snapshot(room(), without, vec![])),
            vec![SyncEvent::Removed]
        );
        assert_eq!(sync.phase(), DevicePhase::Removed);
        assert!(sync.observe(&snapshot(started_room(), players, vec![])).is_empty());
    }

    #[test]
    fn test_host_change_reported() {
        let players: Vec<Player> = (0..3).map(|i| player(i, 0)).collect();
        let mut sync = RoundSync::new(Some("p1".to_string()));
        sync.enter_lobby(&room());
        assert!(sync.observe(&snapshot(room(), players.clone(), vec![])).is_empty());

        let mut moved = room();
        moved.host_player_id = Some("p2".to_string());
        assert_eq!(
            sync.observe(&snapshot(moved, players, vec![])),
            vec![SyncEvent::HostChanged {
                host_player_id: Some("p2".to_string())
            }]
        );
    }

    #[test]
    fn test_view_derives_round_screen() {
        let players: Vec<Player> = (0..4).map(|i| player(i, 0)).collect();
        let mut sync = RoundSync::new(Some("p0".to_string()));
        sync.enter_lobby(&room());
        sync.observe(&snapshot(started_room(), players.clone(), vec![]));

        let room = started_room();
        let log = RoundLog {
            events: vec![
                event(Some("p1"), "cheesy", 101),
                event(None, VOTING_START_TOKEN, 110),
            ],
            votes: vec![Vote {
                id: "v".to_string(),
                room_id: "room".to_string(),
                round_key: round_key(&ts(100)),
                voter_player_id: "p0".to_string(),
                target_player_id: "p1".to_string(),
                created_at: ts(112),
            }],
        };

        let view = sync
            .view(&room, &log, ts(120), Duration::from_secs(30))
            .unwrap();
        assert_eq!(view.stage, Stage::Voting);
        assert_eq!(view.seconds_left, Some(20));
        assert_eq!(view.vote_cap, 2);
        assert_eq!(view.my_selections, vec!["p1"]);
        assert_eq!(view.tally.get("p1"), Some(&1));
        assert!(view.chatted.contains("p1"));
        assert!(!view.can_begin_voting);
        assert!(!view.can_reveal_votes);
        assert!(view.verdict.is_none());

        let later = sync
            .view(&room, &log, ts(141), Duration::from_secs(30))
            .unwrap();
        assert_eq!(later.seconds_left, Some(0));
        assert!(later.can_reveal_votes);
    }

    #[test]
    fn test_view_requires_round() {
        let sync = RoundSync::new(None);
        assert!(sync
            .view(&room(), &RoundLog::default(), ts(0), Duration::from_secs(30))
            .is_none());
    }
}
