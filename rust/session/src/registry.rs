use crate::config::{ConfigError, RegistryConfig};
use crate::errors::{ErrorSeverity, IntoErrorResponse};
use crate::events::{EventBus, RoomEvent};
use dehla_engine::cards::{Card, Suit};
use dehla_engine::deck::DeckShuffler;
use dehla_engine::errors::GameError;
use dehla_engine::game::{CompletedTrick, GameState, GameStatus, PlayOutcome};
use dehla_engine::logger::{today_stamp, HandLogger, HandRecord};
use dehla_engine::player::{PlayerId, Seat};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use thiserror::Error;

pub type RoomId = String;

/// Identity a transport hands over when a player creates or joins a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub stable_id: PlayerId,
    pub display_name: String,
    pub connection_ref: String,
}

impl PlayerInfo {
    pub fn new(
        stable_id: impl Into<PlayerId>,
        display_name: impl Into<String>,
        connection_ref: impl Into<String>,
    ) -> Self {
        Self {
            stable_id: stable_id.into(),
            display_name: display_name.into(),
            connection_ref: connection_ref.into(),
        }
    }
}

impl From<PlayerInfo> for Seat {
    fn from(player: PlayerInfo) -> Self {
        Seat::new(player.stable_id, player.display_name, player.connection_ref)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub host_id: PlayerId,
    pub state: GameState,
}

/// Committed state after an accepted play, plus what the play resolved.
#[derive(Debug, Clone)]
pub struct PlayResult {
    pub state: GameState,
    pub outcome: PlayOutcome,
}

/// One live table. All transitions for the room go through `inner`.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    inner: Mutex<RoomInner>,
}

#[derive(Debug)]
struct RoomInner {
    host_id: PlayerId,
    state: GameState,
    shuffler: DeckShuffler,
    tricks: Vec<CompletedTrick>,
    closed: bool,
}

impl Room {
    fn new(id: RoomId, host: PlayerInfo, shuffler: DeckShuffler) -> Self {
        let host_id = host.stable_id.clone();
        Self {
            inner: Mutex::new(RoomInner {
                host_id,
                state: GameState::new(id.clone(), host.into()),
                shuffler,
                tricks: Vec::new(),
                closed: false,
            }),
            id,
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn snapshot(&self) -> Result<RoomSnapshot, SessionError> {
        let inner = self.lock()?;
        Ok(RoomSnapshot {
            room_id: self.id.clone(),
            host_id: inner.host_id.clone(),
            state: inner.state.clone(),
        })
    }

    pub fn state(&self) -> Result<GameState, SessionError> {
        Ok(self.lock()?.state.clone())
    }

    /// Runs `f` with the room locked and publishes the events it returns
    /// before the lock is released, so subscribers see commits in order.
    fn transition<T>(
        &self,
        bus: &EventBus,
        f: impl FnOnce(&mut RoomInner) -> Result<(T, Vec<RoomEvent>), SessionError>,
    ) -> Result<T, SessionError> {
        let mut inner = self.lock()?;
        let (value, events) = f(&mut inner)?;
        for event in events {
            bus.broadcast(&self.id, event);
        }
        Ok(value)
    }

    // A room emptied by its last departure stays reachable through stale
    // `Arc`s until dropped; it answers like a missing room from then on.
    fn lock(&self) -> Result<MutexGuard<'_, RoomInner>, SessionError> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| SessionError::StoragePoisoned)?;
        if guard.closed {
            return Err(SessionError::RoomNotFound(self.id.clone()));
        }
        Ok(guard)
    }
}

impl RoomInner {
    fn require_host(&self, requester: &str) -> Result<(), SessionError> {
        if self.host_id != requester {
            return Err(SessionError::Authorization {
                player: requester.to_string(),
                action: "start or restart a hand",
            });
        }
        Ok(())
    }

    fn require_seated(&self, requester: &str, action: &'static str) -> Result<(), SessionError> {
        if self.state.seat_index(requester).is_none() {
            return Err(SessionError::Authorization {
                player: requester.to_string(),
                action,
            });
        }
        Ok(())
    }
}

/// Owner of every live room and the only entry point for intents.
#[derive(Debug)]
pub struct SessionRegistry {
    rooms: RwLock<HashMap<RoomId, Arc<Room>>>,
    event_bus: Arc<EventBus>,
    config: RegistryConfig,
    hand_logger: Mutex<HandLogger>,
    rooms_created: AtomicU64,
}

impl SessionRegistry {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self::build(
            event_bus,
            RegistryConfig::default(),
            HandLogger::detached(&today_stamp()),
        )
    }

    pub fn with_config(
        event_bus: Arc<EventBus>,
        config: RegistryConfig,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let hand_logger = match &config.hand_log_path {
            Some(path) => HandLogger::create(path)?,
            None => HandLogger::detached(&today_stamp()),
        };
        Ok(Self::build(event_bus, config, hand_logger))
    }

    fn build(event_bus: Arc<EventBus>, config: RegistryConfig, hand_logger: HandLogger) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            event_bus,
            config,
            hand_logger: Mutex::new(hand_logger),
            rooms_created: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn create_room(&self, host: PlayerInfo) -> Result<GameState, SessionError> {
        let ordinal = self.rooms_created.fetch_add(1, Ordering::Relaxed);
        let shuffler = match self.config.seed {
            Some(seed) => DeckShuffler::new_with_seed(seed.wrapping_add(ordinal)),
            None => DeckShuffler::from_entropy(),
        };
        let seed = shuffler.seed();
        let host_id = host.stable_id.clone();

        let mut rooms = self
            .rooms
            .write()
            .map_err(|_| SessionError::StoragePoisoned)?;
        if rooms.len() >= self.config.max_rooms {
            tracing::warn!(max_rooms = self.config.max_rooms, "room creation refused");
            return Err(SessionError::RegistryFull(self.config.max_rooms));
        }
        let id = self.unused_code(&rooms);
        let room = Arc::new(Room::new(id.clone(), host, shuffler));
        // Locked before it becomes reachable, so `RoomCreated` goes out
        // ahead of any join.
        let inner = room.lock()?;
        rooms.insert(id, Arc::clone(&room));
        drop(rooms);

        let state = inner.state.clone();
        tracing::info!(
            room_id = %room.id,
            player_id = %host_id,
            seed,
            "room created"
        );
        self.event_bus.broadcast(
            &room.id,
            RoomEvent::RoomCreated {
                room_id: room.id.clone(),
                state: state.clone(),
            },
        );
        drop(inner);
        Ok(state)
    }

    // Callers hold the write lock and have checked `max_rooms`, which
    // `validate` keeps below the code space, so a free code exists.
    fn unused_code(&self, live: &HashMap<RoomId, Arc<Room>>) -> RoomId {
        let digits = self.config.room_code_digits;
        let low = 10u64.pow(digits - 1);
        let high = 10u64.pow(digits);
        let mut rng = rand::rng();
        loop {
            let code = rng.random_range(low..high).to_string();
            if !live.contains_key(&code) {
                return code;
            }
        }
    }

    pub fn get_room(&self, room_id: &str) -> Result<Arc<Room>, SessionError> {
        let guard = self
            .rooms
            .read()
            .map_err(|_| SessionError::StoragePoisoned)?;
        guard
            .get(room_id)
            .cloned()
            .ok_or_else(|| SessionError::RoomNotFound(room_id.to_string()))
    }

    /// Seats `player`, or refreshes the transport details of an existing
    /// seat with the same stable id. Reconnects are accepted in any status.
    pub fn join_room(&self, room_id: &str, player: PlayerInfo) -> Result<GameState, SessionError> {
        let room = self.get_room(room_id)?;
        let player_id = player.stable_id.clone();

        room.transition(&self.event_bus, |inner| {
            if inner.state.reconnect(
                &player.stable_id,
                &player.connection_ref,
                &player.display_name,
            ) {
                tracing::info!(room_id = %room.id, player_id = %player_id, "player reconnected");
                let state = inner.state.clone();
                let event = RoomEvent::PlayerReconnected {
                    room_id: room.id.clone(),
                    player_id: player_id.clone(),
                    state: state.clone(),
                };
                return Ok((state, vec![event]));
            }
            if inner.state.is_full() {
                return Err(SessionError::RoomFull(room.id.clone()));
            }
            if inner.state.status != GameStatus::Waiting {
                return Err(SessionError::GameInProgress(room.id.clone()));
            }
            inner.state.add_seat(player.into());
            let state = inner.state.clone();
            tracing::info!(
                room_id = %room.id,
                player_id = %player_id,
                seats = state.seats.len(),
                "player joined"
            );
            let event = RoomEvent::PlayerJoined {
                room_id: room.id.clone(),
                player_id: player_id.clone(),
                state: state.clone(),
            };
            Ok((state, vec![event]))
        })
        .inspect_err(|e| warn_rejected(&room.id, &player_id, e))
    }

    /// Host-only. Shuffles and deals the first five cards to each seat.
    pub fn start(&self, room_id: &str, requester: &str) -> Result<GameState, SessionError> {
        let room = self.get_room(room_id)?;
        room.transition(&self.event_bus, |inner| {
            inner.require_host(requester)?;
            inner.state.start(&mut inner.shuffler)?;
            inner.tricks.clear();
            Ok(deal_announced(&room.id, inner.state.clone()))
        })
        .inspect_err(|e| warn_rejected(&room.id, requester, e))
    }

    /// Host-only. Deals a new hand to the same four seats after `Finished`.
    pub fn restart(&self, room_id: &str, requester: &str) -> Result<GameState, SessionError> {
        let room = self.get_room(room_id)?;
        room.transition(&self.event_bus, |inner| {
            inner.require_host(requester)?;
            inner.state.restart(&mut inner.shuffler)?;
            inner.tricks.clear();
            Ok(deal_announced(&room.id, inner.state.clone()))
        })
        .inspect_err(|e| warn_rejected(&room.id, requester, e))
    }

    /// Trump is chosen by the bidder, the seat holding the turn during
    /// `TrumpSelection`.
    pub fn set_trump(
        &self,
        room_id: &str,
        requester: &str,
        suit: Suit,
    ) -> Result<GameState, SessionError> {
        let room = self.get_room(room_id)?;
        room.transition(&self.event_bus, |inner| {
            inner.require_seated(requester, "choose trump")?;
            if inner.state.status == GameStatus::TrumpSelection {
                if let Some(bidder) = inner.state.current_seat() {
                    if bidder.stable_id != requester {
                        return Err(SessionError::Game(GameError::Turn {
                            expected: bidder.stable_id.clone(),
                            actual: requester.to_string(),
                        }));
                    }
                }
            }
            inner.state.set_trump(suit)?;

            tracing::info!(room_id = %room.id, player_id = %requester, suit = ?suit, "trump set");
            let state = inner.state.clone();
            let event = RoomEvent::TrumpSelected {
                room_id: room.id.clone(),
                suit,
                state: state.clone(),
            };
            Ok((state, vec![event]))
        })
        .inspect_err(|e| warn_rejected(&room.id, requester, e))
    }

    pub fn play_card(
        &self,
        room_id: &str,
        requester: &str,
        card: Card,
    ) -> Result<PlayResult, SessionError> {
        let room = self.get_room(room_id)?;
        room.transition(&self.event_bus, |inner| {
            inner.require_seated(requester, "play a card")?;
            let outcome = inner.state.play_card(requester, card)?;
            let state = inner.state.clone();

            tracing::debug!(room_id = %room.id, player_id = %requester, card = %card, "card played");
            let mut events = vec![RoomEvent::CardPlayed {
                room_id: room.id.clone(),
                player_id: requester.to_string(),
                card,
                state: state.clone(),
            }];

            if let Some(trick) = &outcome.trick {
                tracing::debug!(
                    room_id = %room.id,
                    winner = %trick.winner_id,
                    points = trick.points,
                    "trick resolved"
                );
                inner.tricks.push(trick.clone());
                events.push(RoomEvent::TrickCompleted {
                    room_id: room.id.clone(),
                    trick: trick.clone(),
                    state: state.clone(),
                });
            }

            if outcome.hand_finished {
                let record = HandRecord {
                    hand_id: String::new(),
                    room_id: room.id.clone(),
                    seed: Some(inner.shuffler.seed()),
                    dealer_index: state.dealer_index,
                    trump: state.trump_suit,
                    tricks: std::mem::take(&mut inner.tricks),
                    scores: state.scores.clone(),
                    ts: None,
                };
                events.push(self.record_hand(record));
            }
            Ok((PlayResult { state, outcome }, events))
        })
        .inspect_err(|e| warn_rejected(&room.id, requester, e))
    }

    // Runs under the room lock; the hand logger is always taken after it.
    fn record_hand(&self, mut record: HandRecord) -> RoomEvent {
        {
            let mut logger = self
                .hand_logger
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            record.hand_id = logger.next_id();
            if let Err(err) = logger.write(&record) {
                tracing::error!(
                    room_id = %record.room_id,
                    hand_id = %record.hand_id,
                    error = %err,
                    "failed to append hand record"
                );
            }
        }

        tracing::info!(
            room_id = %record.room_id,
            hand_id = %record.hand_id,
            scores = ?record.scores,
            "hand finished"
        );
        RoomEvent::HandFinished {
            room_id: record.room_id,
            hand_id: record.hand_id,
            scores: record.scores,
        }
    }

    /// Removes a seat. A hand in progress is abandoned, the host role passes
    /// to whoever then sits first, and an empty room is destroyed. Unknown
    /// rooms and players are ignored.
    pub fn remove_player(&self, room_id: &str, stable_id: &str) -> Result<(), SessionError> {
        let room = match self.get_room(room_id) {
            Ok(room) => room,
            Err(SessionError::RoomNotFound(_)) => return Ok(()),
            Err(err) => return Err(err),
        };

        let emptied = {
            let mut inner = match room.lock() {
                Ok(inner) => inner,
                Err(SessionError::RoomNotFound(_)) => return Ok(()),
                Err(err) => return Err(err),
            };
            let status = inner.state.status;
            if inner.state.remove_seat(stable_id).is_none() {
                return Ok(());
            }
            if status != GameStatus::Waiting {
                inner.tricks.clear();
            }
            if !matches!(status, GameStatus::Waiting | GameStatus::Finished) {
                tracing::warn!(room_id = %room.id, player_id = %stable_id, "hand abandoned");
            }
            let emptied = inner.state.seats.is_empty();
            if emptied {
                inner.closed = true;
            } else if inner.host_id == stable_id {
                inner.host_id = inner.state.seats[0].stable_id.clone();
                tracing::info!(room_id = %room.id, host_id = %inner.host_id, "host transferred");
            }

            tracing::info!(room_id = %room.id, player_id = %stable_id, "player left");
            self.event_bus.broadcast(
                &room.id,
                RoomEvent::PlayerLeft {
                    room_id: room.id.clone(),
                    player_id: stable_id.to_string(),
                    state: inner.state.clone(),
                },
            );
            emptied
        };

        // A closed room accepts no further transitions, so `RoomClosed`
        // cannot be overtaken once the lock is gone.
        if emptied {
            self.destroy_room(&room)?;
        }
        Ok(())
    }

    fn destroy_room(&self, room: &Arc<Room>) -> Result<(), SessionError> {
        {
            let mut guard = self
                .rooms
                .write()
                .map_err(|_| SessionError::StoragePoisoned)?;
            if guard
                .get(&room.id)
                .is_some_and(|live| Arc::ptr_eq(live, room))
            {
                guard.remove(&room.id);
            }
        }

        tracing::info!(room_id = %room.id, "room closed");
        self.event_bus.broadcast(
            &room.id,
            RoomEvent::RoomClosed {
                room_id: room.id.clone(),
                reason: "empty".into(),
            },
        );
        self.event_bus.drop_room(&room.id);
        Ok(())
    }

    pub fn snapshot(&self, room_id: &str) -> Result<RoomSnapshot, SessionError> {
        self.get_room(room_id)?.snapshot()
    }

    pub fn legal_moves(&self, room_id: &str, player_id: &str) -> Result<Vec<Card>, SessionError> {
        let room = self.get_room(room_id)?;
        let inner = room.lock()?;
        Ok(inner.state.legal_moves_for(player_id)?)
    }

    pub fn active_rooms(&self) -> Vec<RoomId> {
        match self.rooms.read() {
            Ok(guard) => guard.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }
}

fn deal_announced(room_id: &RoomId, state: GameState) -> (GameState, Vec<RoomEvent>) {
    tracing::info!(
        room_id = %room_id,
        dealer_index = state.dealer_index,
        bidder_index = ?state.bidder_index,
        "hand started"
    );
    let event = RoomEvent::HandStarted {
        room_id: room_id.clone(),
        dealer_index: state.dealer_index,
        state: state.clone(),
    };
    (state, vec![event])
}

fn warn_rejected(room_id: &str, player_id: &str, err: &SessionError) {
    match err.severity() {
        ErrorSeverity::Client => tracing::warn!(
            room_id = %room_id,
            player_id = %player_id,
            code = err.error_code(),
            "rejected transition: {}",
            err
        ),
        _ => {
            err.log_error();
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Room not found: {0}")]
    RoomNotFound(RoomId),
    #[error("Room {0} already has four players")]
    RoomFull(RoomId),
    #[error("Room {0} has a hand in progress")]
    GameInProgress(RoomId),
    #[error("Player {player} may not {action}")]
    Authorization {
        player: PlayerId,
        action: &'static str,
    },
    #[error("Registry is at its limit of {0} rooms")]
    RegistryFull(usize),
    #[error("Session storage poisoned")]
    StoragePoisoned,
    #[error(transparent)]
    Game(#[from] GameError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Hand log unavailable: {0}")]
    HandLog(#[from] std::io::Error),
}

impl IntoErrorResponse for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            SessionError::RoomNotFound(_) => "room_not_found",
            SessionError::RoomFull(_) => "room_full",
            SessionError::GameInProgress(_) => "game_in_progress",
            SessionError::Authorization { .. } => "not_authorized",
            SessionError::RegistryFull(_) => "registry_full",
            SessionError::StoragePoisoned => "session_storage_error",
            SessionError::Game(err) => err.error_code(),
            SessionError::Config(_) => "invalid_config",
            SessionError::HandLog(_) => "hand_log_error",
        }
    }

    fn error_message(&self) -> String {
        self.to_string()
    }

    fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            SessionError::RoomNotFound(id)
            | SessionError::RoomFull(id)
            | SessionError::GameInProgress(id) => Some(serde_json::json!({
                "room_id": id
            })),
            SessionError::Authorization { action, .. } => Some(serde_json::json!({
                "action": action
            })),
            SessionError::Game(err) => err.error_details(),
            _ => None,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            SessionError::StoragePoisoned => ErrorSeverity::Critical,
            SessionError::Config(_) | SessionError::HandLog(_) => ErrorSeverity::Server,
            SessionError::Game(err) => err.severity(),
            _ => ErrorSeverity::Client,
        }
    }
}
