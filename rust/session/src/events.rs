use crate::registry::RoomId;
use dehla_engine::cards::{Card, Suit};
use dehla_engine::game::{CompletedTrick, GameState};
use dehla_engine::player::PlayerId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc;

// Bounded so a stalled seat cannot grow memory without limit; a full channel
// drops that subscriber instead of blocking the room.
const EVENT_CHANNEL_BUFFER: usize = 256;

pub type EventSender = mpsc::Sender<RoomEvent>;
pub type EventReceiver = mpsc::Receiver<RoomEvent>;

/// Everything the transport needs to push to the seats of a room, emitted
/// only after the transition it describes has committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
    RoomCreated {
        room_id: RoomId,
        state: GameState,
    },
    PlayerJoined {
        room_id: RoomId,
        player_id: PlayerId,
        state: GameState,
    },
    PlayerReconnected {
        room_id: RoomId,
        player_id: PlayerId,
        state: GameState,
    },
    PlayerLeft {
        room_id: RoomId,
        player_id: PlayerId,
        state: GameState,
    },
    HandStarted {
        room_id: RoomId,
        dealer_index: usize,
        state: GameState,
    },
    TrumpSelected {
        room_id: RoomId,
        suit: Suit,
        state: GameState,
    },
    CardPlayed {
        room_id: RoomId,
        player_id: PlayerId,
        card: Card,
        state: GameState,
    },
    TrickCompleted {
        room_id: RoomId,
        trick: CompletedTrick,
        state: GameState,
    },
    HandFinished {
        room_id: RoomId,
        hand_id: String,
        scores: BTreeMap<PlayerId, u32>,
    },
    RoomClosed {
        room_id: RoomId,
        reason: String,
    },
}

impl RoomEvent {
    pub fn room_id(&self) -> &RoomId {
        match self {
            RoomEvent::RoomCreated { room_id, .. }
            | RoomEvent::PlayerJoined { room_id, .. }
            | RoomEvent::PlayerReconnected { room_id, .. }
            | RoomEvent::PlayerLeft { room_id, .. }
            | RoomEvent::HandStarted { room_id, .. }
            | RoomEvent::TrumpSelected { room_id, .. }
            | RoomEvent::CardPlayed { room_id, .. }
            | RoomEvent::TrickCompleted { room_id, .. }
            | RoomEvent::HandFinished { room_id, .. }
            | RoomEvent::RoomClosed { room_id, .. } => room_id,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            RoomEvent::RoomCreated { .. } => "room_created",
            RoomEvent::PlayerJoined { .. } => "player_joined",
            RoomEvent::PlayerReconnected { .. } => "player_reconnected",
            RoomEvent::PlayerLeft { .. } => "player_left",
            RoomEvent::HandStarted { .. } => "hand_started",
            RoomEvent::TrumpSelected { .. } => "trump_selected",
            RoomEvent::CardPlayed { .. } => "card_played",
            RoomEvent::TrickCompleted { .. } => "trick_completed",
            RoomEvent::HandFinished { .. } => "hand_finished",
            RoomEvent::RoomClosed { .. } => "room_closed",
        }
    }
}

pub struct EventSubscription {
    bus: EventBus,
    room_id: RoomId,
    subscriber_id: usize,
    pub receiver: EventReceiver,
}

impl EventSubscription {
    pub fn receiver(&mut self) -> &mut EventReceiver {
        &mut self.receiver
    }

    /// Everything already queued, without waiting.
    pub fn drain(&mut self) -> Vec<RoomEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.room_id, self.subscriber_id);
    }
}

/// Per-room fan-out of [`RoomEvent`]s to transport subscribers.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

#[derive(Debug, Default)]
struct EventBusInner {
    subscribers: RwLock<HashMap<RoomId, Vec<(usize, EventSender)>>>,
    next_id: AtomicUsize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, room_id: RoomId) -> EventSubscription {
        let (subscriber_id, receiver) = self.subscribe_raw(room_id.clone());
        EventSubscription {
            bus: self.clone(),
            room_id,
            subscriber_id,
            receiver,
        }
    }

    fn subscribe_raw(&self, room_id: RoomId) -> (usize, EventReceiver) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER);
        let id = self.inner.next_id.fetch_add(1, Ordering::AcqRel);
        self.write_subscribers()
            .entry(room_id.clone())
            .or_default()
            .push((id, tx));

        tracing::info!(
            room_id = %room_id,
            subscriber_id = id,
            "transport subscribed to room events"
        );

        (id, rx)
    }

    pub fn broadcast(&self, room_id: &RoomId, event: RoomEvent) {
        tracing::debug!(
            room_id = %room_id,
            event_type = event.kind(),
            "broadcasting room event"
        );

        let subscribers = self.read_subscribers().get(room_id).cloned();

        let Some(list) = subscribers else {
            tracing::trace!(room_id = %room_id, "no subscribers for room");
            return;
        };

        let mut failed = Vec::new();
        for (id, sender) in list {
            // try_send never blocks the caller; a full or closed channel
            // costs that subscriber its registration.
            if let Err(e) = sender.try_send(event.clone()) {
                tracing::warn!(
                    room_id = %room_id,
                    subscriber_id = id,
                    error = %e,
                    "failed to deliver room event"
                );
                failed.push(id);
            }
        }
        if !failed.is_empty() {
            self.remove_subscribers(room_id, &failed);
        }
    }

    pub fn unsubscribe(&self, room_id: &RoomId, subscriber_id: usize) {
        self.remove_subscribers(room_id, &[subscriber_id]);
    }

    pub fn drop_room(&self, room_id: &RoomId) {
        self.write_subscribers().remove(room_id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.read_subscribers().values().map(|list| list.len()).sum()
    }

    fn remove_subscribers(&self, room_id: &RoomId, ids: &[usize]) {
        let mut guard = self.write_subscribers();
        if let Some(list) = guard.get_mut(room_id) {
            list.retain(|(id, _)| !ids.contains(id));
            if list.is_empty() {
                guard.remove(room_id);
            }
        }
    }

    // Every write is a single insert/retain/remove; a poisoned map is intact.
    fn read_subscribers(
        &self,
    ) -> RwLockReadGuard<'_, HashMap<RoomId, Vec<(usize, EventSender)>>> {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_subscribers(
        &self,
    ) -> RwLockWriteGuard<'_, HashMap<RoomId, Vec<(usize, EventSender)>>> {
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
