use crate::cards::Card;
use serde::{Deserialize, Serialize};

/// Long-lived identity chosen by the client. The only identity used for seat
/// matching, turn checks and scoring.
pub type PlayerId = String;

/// One occupied seat at the table.
///
/// `connection_ref` is whatever the transport uses to reach the player right
/// now. It is replaced on every reconnect and never consulted by game logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    pub stable_id: PlayerId,
    pub display_name: String,
    pub connection_ref: String,
    /// Cards currently held, kept sorted after every deal
    pub hand: Vec<Card>,
    /// Tens won in tricks during the current hand
    pub captured_ten_count: u32,
}

impl Seat {
    pub fn new(
        stable_id: impl Into<PlayerId>,
        display_name: impl Into<String>,
        connection_ref: impl Into<String>,
    ) -> Self {
        Self {
            stable_id: stable_id.into(),
            display_name: display_name.into(),
            connection_ref: connection_ref.into(),
            hand: Vec::new(),
            captured_ten_count: 0,
        }
    }

    pub fn holds(&self, card: Card) -> bool {
        self.hand.contains(&card)
    }

    /// Removes `card` from the hand, returning whether it was held.
    pub fn take_card(&mut self, card: Card) -> bool {
        match self.hand.iter().position(|&c| c == card) {
            Some(idx) => {
                self.hand.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn clear_hand(&mut self) {
        self.hand.clear();
        self.captured_ten_count = 0;
    }
}
