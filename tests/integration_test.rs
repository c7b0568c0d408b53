use chrono::Utc;
use imposter::config::SyncConfig;
use imposter::controller::{ActiveRound, DevicePhase, SyncEvent};
use imposter::engine::imposter_target;
use imposter::error::{GameError, StoreError};
use imposter::lobby::{Lobby, RoundLog};
use imposter::poller::DeviceSync;
use imposter::store::{HttpStore, MemoryStore, NewRoomRow, RowStore};
use imposter::types::{Category, NewRoom, Player, RoomSettings, Stage};
use imposter::voting::max_selections;
use std::sync::Arc;
use std::time::Duration;

fn new_room() -> NewRoom {
    NewRoom {
        category: Category {
            id: "food".to_string(),
            name: "Food".to_string(),
            words: vec![
                "Pizza".to_string(),
                "Sushi".to_string(),
                "Taco".to_string(),
                "Ramen".to_string(),
            ],
        },
        settings: RoomSettings::default(),
    }
}

fn memory_lobby() -> Lobby {
    Lobby::new(Arc::new(MemoryStore::new()))
}

async fn device(lobby: &Lobby, code: &str, me: Option<&Player>) -> DeviceSync {
    let device = DeviceSync::new(lobby.clone(), code, me.map(|p| p.id.clone()));
    device.enter_lobby().await.expect("enter lobby");
    device
}

async fn active_round(device: &DeviceSync) -> ActiveRound {
    device
        .with_sync(|s| s.round().cloned())
        .await
        .expect("device should be in a round")
}

/// End-to-end: four players and a display device play one round
#[tokio::test]
async fn test_full_round_flow() {
    let lobby = memory_lobby();
    let countdown = SyncConfig::default().voting_countdown;

    // 1. Host creates the room, three more players join
    let (room, ana) = lobby.host_room(new_room(), "Ana").await.unwrap();
    let mut players = vec![ana];
    for name in ["Ben", "Cleo", "Dan"] {
        players.push(lobby.join_room(&room.code, name).await.unwrap());
    }

    let mut devices = Vec::new();
    for p in &players {
        devices.push(device(&lobby, &room.code, Some(p)).await);
    }
    let display = device(&lobby, &room.code, None).await;

    // 2. Start: every device observes the same outcome
    let room = lobby.start_round(&room.code).await.unwrap();
    for d in &devices {
        let events = d.poll_once().await.unwrap();
        assert!(matches!(events[0], SyncEvent::RoundStarted { role: Some(_), .. }));
        assert!(d.with_sync(|s| s.acknowledge_role()).await);
    }
    display.poll_once().await.unwrap();
    assert_eq!(display.phase().await, DevicePhase::Round);

    let reference = active_round(&display).await;
    assert_eq!(reference.roster.len(), 4);
    assert_eq!(reference.outcome.imposters.len(), imposter_target(4, 1, None));
    assert_eq!(room.first_speaker_player_id, reference.outcome.first_speaker);

    let mut imposter_devices = 0;
    for d in &devices {
        let round = active_round(d).await;
        assert_eq!(round.outcome, reference.outcome);
        if round.role.unwrap().is_imposter() {
            imposter_devices += 1;
        }
    }
    assert_eq!(imposter_devices, reference.outcome.imposters.len());

    // 3. Everyone gives a clue, host opens voting
    for p in &players {
        lobby.send_chat(&room, p, "tasty").await.unwrap();
    }
    let log = lobby.fetch_round(&room).await.unwrap();
    lobby
        .begin_voting(&room, &reference.roster, &log.events)
        .await
        .unwrap();

    for d in &devices {
        let events = d.poll_once().await.unwrap();
        assert_eq!(events, vec![SyncEvent::StageChanged { stage: Stage::Voting }]);
    }

    // 4. Everybody votes for the imposter
    let imposter = reference.outcome.imposters.iter().next().unwrap().clone();
    let key = room.round_key().unwrap();
    let cap = max_selections(reference.roster.len());
    for p in &players {
        let toggle = lobby
            .toggle_vote(&room.id, &key, &p.id, &imposter, cap)
            .await
            .unwrap();
        assert!(toggle.selected);
    }

    let log = lobby.fetch_round(&room).await.unwrap();
    let view = display
        .with_sync(|s| s.view(&room, &log, Utc::now(), countdown))
        .await
        .unwrap();
    assert!(view.can_reveal_votes);
    assert_eq!(view.tally.get(&imposter), Some(&4));
    assert_eq!(view.voted.len(), 4);

    lobby
        .reveal_votes(&room, &reference.roster, &log, Utc::now(), countdown)
        .await
        .unwrap();
    display.poll_once().await.unwrap();
    assert_eq!(display.with_sync(|s| s.stage()).await, Some(Stage::VoteReveal));

    // 5. Final reveal
    let room = lobby.reveal(&room.code).await.unwrap();
    for d in &devices {
        assert_eq!(d.poll_once().await.unwrap(), vec![SyncEvent::Revealed]);
        assert_eq!(d.phase().await, DevicePhase::Final);
    }

    let log = lobby.fetch_round(&room).await.unwrap();
    let verdict = devices[0]
        .with_sync(|s| s.view(&room, &log, Utc::now(), countdown))
        .await
        .unwrap()
        .verdict
        .unwrap();
    assert!(verdict.imposter_caught);
    assert_eq!(verdict.top_voted, vec![imposter]);

    // 6. Back to the lobby, nobody is ready
    for d in &devices {
        assert!(d.with_sync(|s| s.back_to_lobby()).await);
    }
    let snapshot = lobby.fetch_lobby(&room.code).await.unwrap();
    assert!(snapshot.players.iter().all(|p| !p.ready_for_next_round));
    assert!(matches!(
        lobby.start_round(&room.code).await,
        Err(GameError::Capacity(_))
    ));
}

#[tokio::test]
async fn test_mid_round_joiner_then_kicked() {
    let lobby = memory_lobby();
    let (room, ana) = lobby.host_room(new_room(), "Ana").await.unwrap();
    let ben = lobby.join_room(&room.code, "Ben").await.unwrap();
    lobby.join_room(&room.code, "Cleo").await.unwrap();

    let ana_device = device(&lobby, &room.code, Some(&ana)).await;
    let room = lobby.start_round(&room.code).await.unwrap();

    // Eve arrives after the start
    tokio::time::sleep(Duration::from_millis(5)).await;
    let eve = lobby.join_room(&room.code, "Eve").await.unwrap();
    let eve_device = device(&lobby, &room.code, Some(&eve)).await;

    ana_device.poll_once().await.unwrap();
    let roster = active_round(&ana_device).await.roster;
    assert_eq!(roster.len(), 3);
    assert!(roster.iter().all(|p| p.id != eve.id));

    assert!(eve_device.poll_once().await.unwrap().is_empty());
    assert_eq!(eve_device.phase().await, DevicePhase::Lobby);

    // Host kicks Ben: his device ends up removed
    let ben_device = device(&lobby, &room.code, Some(&ben)).await;
    lobby.kick_player(&room.id, &ben.id).await.unwrap();
    assert_eq!(
        ben_device.poll_once().await.unwrap(),
        vec![SyncEvent::Removed]
    );
    assert_eq!(ben_device.phase().await, DevicePhase::Removed);
    assert!(ben_device.poll_once().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_host_failover_is_observed() {
    let lobby = memory_lobby();
    let (room, ana) = lobby.host_room(new_room(), "Ana").await.unwrap();
    let ben = lobby.join_room(&room.code, "Ben").await.unwrap();
    let cleo = lobby.join_room(&room.code, "Cleo").await.unwrap();

    let ben_device = device(&lobby, &room.code, Some(&ben)).await;
    lobby.leave_room(&ana.id).await.unwrap();

    let events = ben_device.poll_once().await.unwrap();
    match events.as_slice() {
        [SyncEvent::HostChanged {
            host_player_id: Some(host),
        }] => assert!(*host == ben.id || *host == cleo.id),
        other => panic!("Expected HostChanged, got {:?}", other),
    }
}

#[tokio::test]
async fn test_forced_single_imposter() {
    let lobby = memory_lobby();
    let mut settings = new_room();
    settings.settings.force_single_imposter = true;
    let (room, ana) = lobby.host_room(settings, "Ana").await.unwrap();
    for name in ["Ben", "Cleo", "Dan", "Eve", "Finn", "Gus", "Hal"] {
        lobby.join_room(&room.code, name).await.unwrap();
    }

    let ana_device = device(&lobby, &room.code, Some(&ana)).await;
    lobby.start_round(&room.code).await.unwrap();
    ana_device.poll_once().await.unwrap();
    assert_eq!(active_round(&ana_device).await.outcome.imposters.len(), 1);
}

/// Same lobby flow against a live store server
#[tokio::test]
async fn test_http_store_end_to_end() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = imposter::api::router(Arc::new(MemoryStore::new()));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let store = Arc::new(HttpStore::new(format!("http://{}", addr), Duration::from_secs(5)).unwrap());
    let lobby = Lobby::new(store.clone());

    let (room, ana) = lobby.host_room(new_room(), "Ana").await.unwrap();
    let ben = lobby.join_room(&room.code, "Ben").await.unwrap();
    lobby.join_room(&room.code, "Cleo").await.unwrap();

    let err = lobby.join_room(&room.code, "ben").await.unwrap_err();
    assert!(matches!(err, GameError::Validation(_)));
    assert!(matches!(
        lobby.fetch_lobby("ZZZZ").await,
        Err(GameError::Validation(_))
    ));

    // Uniqueness is enforced through the wire
    let duplicate = store
        .insert_room(NewRoomRow {
            code: room.code.clone(),
            category: new_room().category,
            settings: RoomSettings::default(),
        })
        .await;
    assert!(matches!(duplicate, Err(StoreError::Conflict(_))));

    let device = device(&lobby, &room.code, Some(&ana)).await;
    let room = lobby.start_round(&room.code).await.unwrap();
    let events = device.poll_once().await.unwrap();
    assert!(matches!(events[0], SyncEvent::RoundStarted { .. }));

    lobby.send_chat(&room, &ben, "cheesy").await.unwrap();
    let key = room.round_key().unwrap();
    assert!(lobby.toggle_vote(&room.id, &key, &ana.id, &ben.id, 1).await.unwrap().selected);
    assert!(matches!(
        lobby.toggle_vote(&room.id, &key, &ana.id, &ana.id, 1).await,
        Err(GameError::Capacity(_))
    ));
    assert!(!lobby.toggle_vote(&room.id, &key, &ana.id, &ben.id, 1).await.unwrap().selected);

    let log: RoundLog = lobby.fetch_round(&room).await.unwrap();
    assert_eq!(log.events.len(), 1);
    assert!(log.votes.is_empty());

    let pruned = lobby
        .prune_inactive(&room.id, Duration::from_secs(120))
        .await
        .unwrap();
    assert!(pruned.is_empty());

    lobby.reveal(&room.code).await.unwrap();
    assert_eq!(device.poll_once().await.unwrap(), vec![SyncEvent::Revealed]);
}
