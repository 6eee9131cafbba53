use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::cards::{sort_hand, Card, Suit};
use crate::deck::DeckShuffler;
use crate::errors::GameError;
use crate::player::{PlayerId, Seat};
use crate::rules::{
    calculate_trick_points, is_valid_move, legal_moves, resolve_trick, DECK_SIZE, FIRST_DEAL,
    PLAYERS, SECOND_DEAL,
};

/// Lifecycle of one hand at a table.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum GameStatus {
    #[serde(rename = "WAITING")]
    Waiting,
    #[serde(rename = "DEALING_5")]
    Dealing5,
    #[serde(rename = "TRUMP_SELECTION")]
    TrumpSelection,
    #[serde(rename = "DEALING_8")]
    Dealing8,
    #[serde(rename = "PLAYING")]
    Playing,
    #[serde(rename = "FINISHED")]
    Finished,
}

/// One card on the table, tagged with the seat that played it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrickPlay {
    pub seat_id: PlayerId,
    pub card: Card,
}

/// A trick that has just been resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedTrick {
    pub plays: Vec<TrickPlay>,
    pub winner_index: usize,
    pub winner_id: PlayerId,
    pub points: u32,
}

/// Result of an accepted [`GameState::play_card`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayOutcome {
    /// Set when this play was the fourth card of the trick
    pub trick: Option<CompletedTrick>,
    /// Set when the resolved trick emptied every hand
    pub hand_finished: bool,
}

impl PlayOutcome {
    pub fn trick_completed(&self) -> bool {
        self.trick.is_some()
    }

    pub fn winner(&self) -> Option<&PlayerId> {
        self.trick.as_ref().map(|t| &t.winner_id)
    }
}

/// Authoritative state of one table.
///
/// Seat order is turn order. `scores` mirrors each seat's captured ten count
/// and is rewritten in lockstep with it. Every transition either fully
/// applies or returns an error with `self` untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub room_id: String,
    pub seats: Vec<Seat>,
    pub deck: Vec<Card>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trump_suit: Option<Suit>,
    pub current_turn_index: usize,
    pub dealer_index: usize,
    /// Seat choosing trump; unset until the first deal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bidder_index: Option<usize>,
    pub current_trick: Vec<TrickPlay>,
    pub status: GameStatus,
    pub scores: BTreeMap<PlayerId, u32>,
    /// Cards from resolved tricks this hand. Kept off the wire; it closes the
    /// 52-card count once the trick on the table is cleared.
    #[serde(skip)]
    pub taken_cards: Vec<Card>,
}

impl GameState {
    /// New table in `Waiting` with `host` in seat 0.
    pub fn new(room_id: impl Into<String>, host: Seat) -> Self {
        let mut scores = BTreeMap::new();
        scores.insert(host.stable_id.clone(), 0);
        Self {
            room_id: room_id.into(),
            seats: vec![host],
            deck: Vec::new(),
            trump_suit: None,
            current_turn_index: 0,
            dealer_index: 0,
            bidder_index: None,
            current_trick: Vec::new(),
            status: GameStatus::Waiting,
            scores,
            taken_cards: Vec::new(),
        }
    }

    pub fn seat_index(&self, player_id: &str) -> Option<usize> {
        self.seats.iter().position(|s| s.stable_id == player_id)
    }

    pub fn seat(&self, player_id: &str) -> Option<&Seat> {
        self.seats.iter().find(|s| s.stable_id == player_id)
    }

    pub fn is_full(&self) -> bool {
        self.seats.len() >= PLAYERS
    }

    /// Seat expected to act next, if a hand is being played or bid.
    pub fn current_seat(&self) -> Option<&Seat> {
        match self.status {
            GameStatus::TrumpSelection | GameStatus::Playing => {
                self.seats.get(self.current_turn_index)
            }
            _ => None,
        }
    }

    pub fn lead_suit(&self) -> Option<Suit> {
        self.current_trick.first().map(|p| p.card.suit)
    }

    /// Cards `player_id` could legally play into the current trick.
    /// Turn order is not considered; outside `Playing` this is empty.
    pub fn legal_moves_for(&self, player_id: &str) -> Result<Vec<Card>, GameError> {
        let seat = self
            .seat(player_id)
            .ok_or_else(|| GameError::UnknownPlayer(player_id.to_string()))?;
        if self.status != GameStatus::Playing {
            return Ok(Vec::new());
        }
        Ok(legal_moves(&seat.hand, self.lead_suit()))
    }

    /// Appends a seat in `Waiting`. Capacity and status are the caller's
    /// guards; the registry reports them with its own error kinds.
    pub fn add_seat(&mut self, seat: Seat) {
        debug_assert!(self.status == GameStatus::Waiting && !self.is_full());
        self.scores.insert(seat.stable_id.clone(), 0);
        self.seats.push(seat);
    }

    /// Updates transport details of an existing seat in place.
    pub fn reconnect(&mut self, player_id: &str, connection_ref: &str, display_name: &str) -> bool {
        match self.seats.iter_mut().find(|s| s.stable_id == player_id) {
            Some(seat) => {
                seat.connection_ref = connection_ref.to_string();
                seat.display_name = display_name.to_string();
                true
            }
            None => false,
        }
    }

    /// Removes a seat. A hand in progress cannot continue short-handed, so it
    /// is abandoned first and the table returns to `Waiting`. After a finished
    /// hand the remaining seats keep their final tallies until the next deal.
    pub fn remove_seat(&mut self, player_id: &str) -> Option<Seat> {
        let idx = self.seat_index(player_id)?;
        match self.status {
            GameStatus::Waiting => {}
            GameStatus::Finished => self.retire_finished_hand(),
            _ => self.abandon_hand(),
        }
        let seat = self.seats.remove(idx);
        self.scores.remove(player_id);
        if self.dealer_index >= self.seats.len() {
            self.dealer_index = 0;
        }
        self.current_turn_index = 0;
        Some(seat)
    }

    /// Drops the current hand and returns to `Waiting`, keeping seats.
    pub fn abandon_hand(&mut self) {
        for seat in &mut self.seats {
            seat.clear_hand();
        }
        for score in self.scores.values_mut() {
            *score = 0;
        }
        self.deck.clear();
        self.current_trick.clear();
        self.taken_cards.clear();
        self.trump_suit = None;
        self.bidder_index = None;
        self.current_turn_index = 0;
        self.status = GameStatus::Waiting;
    }

    // Hands and the trick are already empty once a hand finishes.
    fn retire_finished_hand(&mut self) {
        self.deck.clear();
        self.taken_cards.clear();
        self.trump_suit = None;
        self.bidder_index = None;
        self.current_turn_index = 0;
        self.status = GameStatus::Waiting;
    }

    /// `Waiting -> TrumpSelection`: shuffle, deal five each, hand the bid to
    /// the seat after the dealer.
    pub fn start(&mut self, shuffler: &mut DeckShuffler) -> Result<(), GameError> {
        self.require_status(GameStatus::Waiting, "start")?;
        self.require_full_table()?;
        let next = self.first_deal(shuffler.shuffled_deck(), self.dealer_index)?;
        self.commit(next);
        Ok(())
    }

    /// `Finished -> TrumpSelection` with the same four seats and dealer: the
    /// start deal again on a fresh shuffle.
    pub fn restart(&mut self, shuffler: &mut DeckShuffler) -> Result<(), GameError> {
        self.require_status(GameStatus::Finished, "restart")?;
        self.require_full_table()?;
        let next = self.first_deal(shuffler.shuffled_deck(), self.dealer_index)?;
        self.commit(next);
        Ok(())
    }

    /// `TrumpSelection -> Playing`: fix trump, deal the remaining eight each.
    /// The seat after the dealer leads, whoever picked trump.
    pub fn set_trump(&mut self, suit: Suit) -> Result<(), GameError> {
        self.require_status(GameStatus::TrumpSelection, "choose trump")?;

        let mut next = self.clone();
        next.trump_suit = Some(suit);
        next.status = GameStatus::Dealing8;
        for seat in &mut next.seats {
            let mut cards = draw(&mut next.deck, SECOND_DEAL)?;
            cards.extend_from_slice(&seat.hand);
            seat.hand = sort_hand(&cards);
        }
        if !next.deck.is_empty() {
            return Err(GameError::InvariantViolated(format!(
                "{} cards left undealt",
                next.deck.len()
            )));
        }
        next.current_turn_index = (next.dealer_index + 1) % PLAYERS;
        next.status = GameStatus::Playing;

        self.commit(next);
        Ok(())
    }

    /// Plays `card` for `player_id`.
    ///
    /// Guards run in order (status, turn, suit-following, possession) before
    /// anything is touched. The fourth card resolves the trick: the winner is
    /// credited its tens, leads next, and the hand finishes once every hand
    /// is empty.
    pub fn play_card(&mut self, player_id: &str, card: Card) -> Result<PlayOutcome, GameError> {
        self.require_status(GameStatus::Playing, "play a card")?;

        let turn = self.current_turn_index;
        let seat = self
            .seats
            .get(turn)
            .ok_or_else(|| GameError::InvariantViolated(format!("turn index {turn} out of range")))?;
        if seat.stable_id != player_id {
            return Err(GameError::Turn {
                expected: seat.stable_id.clone(),
                actual: player_id.to_string(),
            });
        }
        if !is_valid_move(&seat.hand, card, self.lead_suit()) {
            return Err(GameError::IllegalMove { card });
        }
        if !seat.holds(card) {
            return Err(GameError::CardNotInHand { card });
        }

        // Resolve up front so nothing after the first write can fail.
        let mut plays = self.current_trick.clone();
        plays.push(TrickPlay {
            seat_id: player_id.to_string(),
            card,
        });
        let resolution = if plays.len() == PLAYERS {
            let cards: Vec<Card> = plays.iter().map(|p| p.card).collect();
            let winning_play = resolve_trick(&cards, self.trump_suit)
                .ok_or_else(|| GameError::InvariantViolated("empty trick".into()))?;
            let winner_id = plays[winning_play].seat_id.clone();
            let winner_index = self
                .seat_index(&winner_id)
                .ok_or_else(|| GameError::UnknownPlayer(winner_id.clone()))?;
            Some(CompletedTrick {
                points: calculate_trick_points(&cards),
                plays: plays.clone(),
                winner_index,
                winner_id,
            })
        } else {
            None
        };

        self.seats[turn].take_card(card);
        self.current_trick = plays;
        self.current_turn_index = (turn + 1) % PLAYERS;

        let mut hand_finished = false;
        if let Some(trick) = &resolution {
            let winner = &mut self.seats[trick.winner_index];
            winner.captured_ten_count += trick.points;
            self.scores
                .insert(trick.winner_id.clone(), winner.captured_ten_count);
            self.taken_cards.extend(trick.plays.iter().map(|p| p.card));
            self.current_trick.clear();
            self.current_turn_index = trick.winner_index;
            if self.seats.iter().all(|s| s.hand.is_empty()) {
                self.status = GameStatus::Finished;
                hand_finished = true;
            }
        }
        debug_assert_eq!(self.check_invariants(), Ok(()));

        Ok(PlayOutcome {
            trick: resolution,
            hand_finished,
        })
    }

    /// Cards held, undealt, on the table, or already taken in tricks.
    pub fn card_count(&self) -> usize {
        self.seats.iter().map(|s| s.hand.len()).sum::<usize>()
            + self.deck.len()
            + self.current_trick.len()
            + self.taken_cards.len()
    }

    /// Checks the structural invariants of the current status.
    pub fn check_invariants(&self) -> Result<(), GameError> {
        let violated =
            |msg: String| -> Result<(), GameError> { Err(GameError::InvariantViolated(msg)) };

        let seats = self.seats.len();
        match self.status {
            GameStatus::Waiting if !(1..=PLAYERS).contains(&seats) => {
                return violated(format!("{seats} seats while waiting"));
            }
            GameStatus::Waiting => {}
            _ if seats != PLAYERS => {
                return violated(format!("{seats} seats during a hand"));
            }
            _ => {}
        }

        for seat in &self.seats {
            if self.scores.get(&seat.stable_id) != Some(&seat.captured_ten_count) {
                return violated(format!("score out of sync for {}", seat.stable_id));
            }
        }
        if self.scores.len() != seats {
            return violated("score entry without a seat".into());
        }

        let dealt = matches!(
            self.status,
            GameStatus::Dealing5
                | GameStatus::TrumpSelection
                | GameStatus::Dealing8
                | GameStatus::Playing
                | GameStatus::Finished
        );
        if dealt {
            if self.card_count() != DECK_SIZE {
                return violated(format!("{} cards in play", self.card_count()));
            }
            if self.current_turn_index >= seats || self.dealer_index >= seats {
                return violated("turn or dealer index out of range".into());
            }
            if !self.bidder_index.is_some_and(|b| b < seats) {
                return violated("bidder index out of range".into());
            }
        }

        let mut seen = HashSet::new();
        let all_cards = self
            .seats
            .iter()
            .flat_map(|s| s.hand.iter())
            .chain(self.deck.iter())
            .chain(self.current_trick.iter().map(|p| &p.card))
            .chain(self.taken_cards.iter());
        for card in all_cards {
            if !seen.insert(*card) {
                return violated(format!("duplicate card {card}"));
            }
        }
        Ok(())
    }

    fn require_status(&self, expected: GameStatus, action: &'static str) -> Result<(), GameError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(GameError::Precondition {
                action,
                actual: self.status,
            })
        }
    }

    fn require_full_table(&self) -> Result<(), GameError> {
        if self.seats.len() == PLAYERS {
            Ok(())
        } else {
            Err(GameError::SeatCount {
                seats: self.seats.len(),
            })
        }
    }

    /// Candidate state after the five-card deal from a fresh `deck`.
    fn first_deal(&self, mut deck: Vec<Card>, dealer: usize) -> Result<GameState, GameError> {
        if deck.len() != DECK_SIZE {
            return Err(GameError::InvariantViolated(format!(
                "fresh deck holds {} cards",
                deck.len()
            )));
        }

        let mut next = self.clone();
        next.status = GameStatus::Dealing5;
        next.dealer_index = dealer;
        next.trump_suit = None;
        next.current_trick.clear();
        next.taken_cards.clear();
        for seat in &mut next.seats {
            seat.hand = sort_hand(&draw(&mut deck, FIRST_DEAL)?);
            seat.captured_ten_count = 0;
            next.scores.insert(seat.stable_id.clone(), 0);
        }
        next.deck = deck;

        let bidder = (dealer + 1) % PLAYERS;
        next.bidder_index = Some(bidder);
        next.current_turn_index = bidder;
        next.status = GameStatus::TrumpSelection;
        Ok(next)
    }

    fn commit(&mut self, next: GameState) {
        debug_assert_eq!(next.check_invariants(), Ok(()));
        *self = next;
    }
}

fn draw(deck: &mut Vec<Card>, n: usize) -> Result<Vec<Card>, GameError> {
    if deck.len() < n {
        return Err(GameError::InvariantViolated(format!(
            "deck exhausted: wanted {n}, {} left",
            deck.len()
        )));
    }
    Ok(deck.drain(..n).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> GameState {
        let mut state = GameState::new("1234", Seat::new("p0", "Asha", "c0"));
        for i in 1..4 {
            state.add_seat(Seat::new(format!("p{i}"), format!("P{i}"), format!("c{i}")));
        }
        state
    }

    #[test]
    fn new_table_waits_with_host_scored() {
        let state = GameState::new("1234", Seat::new("host", "Host", "c"));
        assert_eq!(state.status, GameStatus::Waiting);
        assert_eq!(state.scores.get("host"), Some(&0));
        assert_eq!(state.check_invariants(), Ok(()));
    }

    #[test]
    fn start_requires_four_seats() {
        let mut state = GameState::new("1234", Seat::new("host", "Host", "c"));
        let before = state.clone();
        let err = state
            .start(&mut DeckShuffler::new_with_seed(1))
            .unwrap_err();
        assert_eq!(err, GameError::SeatCount { seats: 1 });
        assert!(err.is_precondition());
        assert_eq!(state, before);
    }

    #[test]
    fn start_deals_five_and_hands_bid_after_dealer() {
        let mut state = table();
        state.start(&mut DeckShuffler::new_with_seed(7)).expect("start");
        assert_eq!(state.status, GameStatus::TrumpSelection);
        assert!(state.seats.iter().all(|s| s.hand.len() == FIRST_DEAL));
        assert_eq!(state.deck.len(), DECK_SIZE - FIRST_DEAL * PLAYERS);
        assert_eq!(state.bidder_index, Some(1));
        assert_eq!(state.current_turn_index, 1);
        assert_eq!(state.check_invariants(), Ok(()));
    }

    #[test]
    fn set_trump_deals_rest_and_seat_after_dealer_leads() {
        let mut state = table();
        state.dealer_index = 2;
        state.start(&mut DeckShuffler::new_with_seed(7)).expect("start");
        state.set_trump(Suit::Clubs).expect("trump");
        assert_eq!(state.status, GameStatus::Playing);
        assert_eq!(state.trump_suit, Some(Suit::Clubs));
        assert!(state.deck.is_empty());
        assert!(state.seats.iter().all(|s| s.hand.len() == 13));
        assert_eq!(state.current_turn_index, 3);
        for seat in &state.seats {
            assert_eq!(seat.hand, sort_hand(&seat.hand));
        }
    }

    #[test]
    fn set_trump_outside_selection_is_rejected() {
        let mut state = table();
        let before = state.clone();
        let err = state.set_trump(Suit::Hearts).unwrap_err();
        assert!(matches!(
            err,
            GameError::Precondition {
                actual: GameStatus::Waiting,
                ..
            }
        ));
        assert_eq!(state, before);
    }

    #[test]
    fn removing_seat_mid_hand_returns_to_waiting() {
        let mut state = table();
        state.start(&mut DeckShuffler::new_with_seed(3)).expect("start");
        let removed = state.remove_seat("p2").expect("seat");
        assert_eq!(removed.stable_id, "p2");
        assert_eq!(state.status, GameStatus::Waiting);
        assert_eq!(state.seats.len(), 3);
        assert_eq!(state.card_count(), 0);
        assert!(!state.scores.contains_key("p2"));
        assert_eq!(state.check_invariants(), Ok(()));
    }

    #[test]
    fn check_invariants_flags_duplicate_cards() {
        let mut state = table();
        state.start(&mut DeckShuffler::new_with_seed(3)).expect("start");
        let dup = state.seats[0].hand[0];
        state.deck[0] = dup;
        assert!(matches!(
            state.check_invariants(),
            Err(GameError::InvariantViolated(_))
        ));
    }

    #[test]
    fn snapshot_uses_wire_field_names() {
        let mut state = table();
        let json = serde_json::to_value(&state).expect("serialize");
        assert_eq!(json["status"], "WAITING");
        assert!(json.get("trumpSuit").is_none());
        assert!(json.get("currentTurnIndex").is_some());
        assert_eq!(json["seats"][0]["stableId"], "p0");

        state.start(&mut DeckShuffler::new_with_seed(5)).expect("start");
        state.set_trump(Suit::Spades).expect("trump");
        let json = serde_json::to_value(&state).expect("serialize");
        assert_eq!(json["trumpSuit"], "S");
        assert_eq!(json["status"], "PLAYING");
        assert_eq!(json["seats"][1]["capturedTenCount"], 0);
    }
}
