/// Concurrent access to the registry: independent rooms in parallel and
/// racing intents against a single room
use dehla_engine::cards::Suit;
use dehla_engine::game::GameStatus;
use dehla_session::{
    EventBus, IntoErrorResponse, PlayerInfo, RegistryConfig, RoomEvent, SessionRegistry,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinSet;

fn registry(seed: u64) -> Arc<SessionRegistry> {
    let config = RegistryConfig {
        seed: Some(seed),
        ..Default::default()
    };
    Arc::new(SessionRegistry::with_config(Arc::new(EventBus::new()), config).expect("config"))
}

fn seat_table(registry: &SessionRegistry, prefix: &str) -> String {
    let host = format!("{prefix}-0");
    let room_id = registry
        .create_room(PlayerInfo::new(&host, &host, "conn"))
        .expect("create")
        .room_id;
    for i in 1..4 {
        let id = format!("{prefix}-{i}");
        registry
            .join_room(&room_id, PlayerInfo::new(&id, &id, "conn"))
            .expect("join");
    }
    let state = registry.start(&room_id, &host).expect("start");
    let bidder = state.current_seat().expect("bidder").stable_id.clone();
    registry
        .set_trump(&room_id, &bidder, Suit::Spades)
        .expect("trump");
    room_id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_rooms_play_to_completion_in_parallel() {
    let registry = registry(100);
    let table_count = 8;

    let mut join_set = JoinSet::new();
    for t in 0..table_count {
        let registry = Arc::clone(&registry);
        join_set.spawn(async move {
            let room_id = seat_table(&registry, &format!("t{t}"));
            loop {
                let state = registry.snapshot(&room_id).expect("snapshot").state;
                if state.status != GameStatus::Playing {
                    return (room_id, state);
                }
                let player = state.current_seat().expect("turn").stable_id.clone();
                let card = registry.legal_moves(&room_id, &player).expect("moves")[0];
                registry
                    .play_card(&room_id, &player, card)
                    .expect("legal play");
                tokio::task::yield_now().await;
            }
        });
    }

    let mut rooms = HashSet::new();
    while let Some(result) = join_set.join_next().await {
        let (room_id, state) = result.expect("task completed");
        assert_eq!(state.status, GameStatus::Finished);
        assert_eq!(state.scores.values().sum::<u32>(), 4);
        assert_eq!(state.check_invariants(), Ok(()));
        rooms.insert(room_id);
    }

    assert_eq!(rooms.len(), table_count);
    assert_eq!(registry.active_rooms().len(), table_count);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_plays_for_one_seat_commit_exactly_once() {
    let registry = registry(200);
    let room_id = seat_table(&registry, "race");
    let before = registry.snapshot(&room_id).expect("snapshot").state;
    let leader = before.current_seat().expect("leader").stable_id.clone();
    let card = before.seat(&leader).expect("seat").hand[0];

    let mut join_set = JoinSet::new();
    for _ in 0..16 {
        let registry = Arc::clone(&registry);
        let room_id = room_id.clone();
        let leader = leader.clone();
        join_set.spawn(async move { registry.play_card(&room_id, &leader, card) });
    }

    let mut accepted = 0;
    while let Some(result) = join_set.join_next().await {
        match result.expect("task completed") {
            Ok(_) => accepted += 1,
            Err(err) => assert_eq!(err.error_code(), "not_your_turn"),
        }
    }

    assert_eq!(accepted, 1);
    let after = registry.snapshot(&room_id).expect("snapshot").state;
    assert_eq!(after.current_trick.len(), 1);
    assert_eq!(after.current_trick[0].card, card);
    assert_eq!(
        after.current_turn_index,
        (before.current_turn_index + 1) % 4
    );
    assert_eq!(after.card_count(), 52);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creation_yields_unique_codes() {
    let registry = registry(300);

    let mut join_set = JoinSet::new();
    for i in 0..50 {
        let registry = Arc::clone(&registry);
        join_set.spawn(async move {
            let id = format!("host-{i}");
            registry
                .create_room(PlayerInfo::new(&id, &id, "conn"))
                .expect("create")
                .room_id
        });
    }

    let mut codes = HashSet::new();
    while let Some(result) = join_set.join_next().await {
        assert!(codes.insert(result.expect("task completed")));
    }
    assert_eq!(codes.len(), 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_joins_fill_exactly_four_seats() {
    let registry = registry(400);
    let room_id = registry
        .create_room(PlayerInfo::new("host", "host", "conn"))
        .expect("create")
        .room_id;

    let mut join_set = JoinSet::new();
    for i in 0..10 {
        let registry = Arc::clone(&registry);
        let room_id = room_id.clone();
        join_set.spawn(async move {
            let id = format!("guest-{i}");
            registry.join_room(&room_id, PlayerInfo::new(&id, &id, "conn"))
        });
    }

    let mut joined = 0;
    while let Some(result) = join_set.join_next().await {
        match result.expect("task completed") {
            Ok(_) => joined += 1,
            Err(err) => assert_eq!(err.error_code(), "room_full"),
        }
    }
    assert_eq!(joined, 3);
    let state = registry.snapshot(&room_id).expect("snapshot").state;
    assert_eq!(state.seats.len(), 4);
    assert_eq!(state.scores.len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn racing_reconnects_reach_subscribers_in_commit_order() {
    let registry = registry(500);
    let (tasks, rounds) = (8, 30);

    for trial in 0..20 {
        let room_id = registry
            .create_room(PlayerInfo::new("ana", "Ana", "conn"))
            .expect("create")
            .room_id;
        let mut subscription = registry.event_bus().subscribe(room_id.clone());

        let mut join_set = JoinSet::new();
        for t in 0..tasks {
            let registry = Arc::clone(&registry);
            let room_id = room_id.clone();
            join_set.spawn(async move {
                for i in 0..rounds {
                    registry
                        .join_room(&room_id, PlayerInfo::new("ana", "Ana", format!("t{t}-{i}")))
                        .expect("reconnect");
                }
            });
        }
        while let Some(result) = join_set.join_next().await {
            result.expect("task completed");
        }

        let committed = registry.snapshot(&room_id).expect("snapshot").state;
        let events = subscription.drain();
        assert_eq!(events.len(), tasks * rounds);

        // Each task's reconnects were committed in order, so they must be
        // seen in order too.
        let mut last_round: HashMap<String, usize> = HashMap::new();
        for event in &events {
            let RoomEvent::PlayerReconnected { state, .. } = event else {
                panic!("trial {trial}: unexpected {event:?}");
            };
            let conn = &state.seats[0].connection_ref;
            let (task, round) = conn.split_once('-').expect("t<task>-<round>");
            let round: usize = round.parse().expect("round");
            if let Some(previous) = last_round.insert(task.to_string(), round) {
                assert!(previous < round, "trial {trial}: {conn} after round {previous}");
            }
        }

        match events.last() {
            Some(RoomEvent::PlayerReconnected { state, .. }) => {
                assert_eq!(state, &committed, "trial {trial}: stale final broadcast");
            }
            other => panic!("trial {trial}: expected a reconnect, got {other:?}"),
        }
    }
}
