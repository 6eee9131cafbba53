//! # dehla-engine: Trick-Taking Game Engine Core
//!
//! Authoritative rules and hand state machine for a four-seat "Dehla Pakad"
//! table: one trump per hand, mandatory suit-following, and a point for
//! every ten captured in a trick.
//!
//! ## Core Modules
//!
//! - [`cards`] - Card representation (Suit, Rank, Card), canonical deck and hand sorting
//! - [`deck`] - Fisher–Yates shuffling with a seedable ChaCha20 RNG
//! - [`rules`] - Card comparison, trick resolution, scoring and move legality
//! - [`game`] - `GameState` and its transitions (start, trump, play, restart)
//! - [`player`] - Seats and stable player identity
//! - [`logger`] - HandRecord serialization to JSONL
//! - [`errors`] - Error types for rejected transitions
//!
//! ## Quick Start
//!
//! ```rust
//! use dehla_engine::cards::Suit;
//! use dehla_engine::deck::DeckShuffler;
//! use dehla_engine::game::{GameState, GameStatus};
//! use dehla_engine::player::Seat;
//!
//! let mut state = GameState::new("4821", Seat::new("ana", "Ana", "conn-1"));
//! for id in ["ben", "cy", "dee"] {
//!     state.add_seat(Seat::new(id, id, "conn"));
//! }
//!
//! let mut shuffler = DeckShuffler::new_with_seed(42);
//! state.start(&mut shuffler).expect("four seats are waiting");
//! assert_eq!(state.status, GameStatus::TrumpSelection);
//!
//! state.set_trump(Suit::Hearts).expect("bid is open");
//! assert_eq!(state.status, GameStatus::Playing);
//! assert!(state.seats.iter().all(|s| s.hand.len() == 13));
//! ```
//!
//! ## Trick Resolution
//!
//! ```rust
//! use dehla_engine::cards::{Card, Rank, Suit};
//! use dehla_engine::rules::resolve_trick;
//!
//! let trick = [
//!     Card::new(Suit::Spades, Rank::Ten),
//!     Card::new(Suit::Hearts, Rank::Two),
//!     Card::new(Suit::Spades, Rank::King),
//!     Card::new(Suit::Hearts, Rank::Ace),
//! ];
//! assert_eq!(resolve_trick(&trick, None), Some(2));
//! assert_eq!(resolve_trick(&trick, Some(Suit::Hearts)), Some(3));
//! ```

pub mod cards;
pub mod deck;
pub mod errors;
pub mod game;
pub mod logger;
pub mod player;
pub mod rules;
