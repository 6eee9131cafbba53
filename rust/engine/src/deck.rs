use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::cards::{full_deck, Card};

/// Fresh 52-card deck in canonical order (suits H, D, C, S; ranks 2..A).
pub fn create_deck() -> Vec<Card> {
    full_deck()
}

/// Returns a uniformly random permutation of `deck` (Fisher–Yates).
/// The caller's slice is never touched; shuffling happens on a local copy.
pub fn shuffle_deck<R: Rng + ?Sized>(deck: &[Card], rng: &mut R) -> Vec<Card> {
    let mut cards = deck.to_vec();
    cards.shuffle(rng);
    cards
}

/// Source of shuffled decks for one room.
///
/// Seeded shufflers are reproducible: two shufflers built from the same seed
/// hand out identical deck sequences.
#[derive(Debug, Clone)]
pub struct DeckShuffler {
    seed: u64,
    rng: ChaCha20Rng,
}

impl DeckShuffler {
    pub fn new_with_seed(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        let seed: u64 = rand::rng().random();
        Self::new_with_seed(seed)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn shuffled_deck(&mut self) -> Vec<Card> {
        shuffle_deck(&create_deck(), &mut self.rng)
    }
}
