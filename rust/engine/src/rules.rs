use std::cmp::Ordering;

use crate::cards::{Card, Rank, Suit};

/// Seats at a table; every hand is played four-handed.
pub const PLAYERS: usize = 4;
/// Cards dealt to each seat before trump is chosen.
pub const FIRST_DEAL: usize = 5;
/// Cards dealt to each seat once trump is known.
pub const SECOND_DEAL: usize = 8;
pub const HAND_SIZE: usize = FIRST_DEAL + SECOND_DEAL;
pub const DECK_SIZE: usize = 52;

/// Compares two cards played into the same trick.
///
/// Returns [`Ordering::Greater`] when `a` beats `b` and [`Ordering::Less`]
/// when `b` beats `a`. Decision order:
///
/// 1. a trump beats any non-trump;
/// 2. between two trumps the higher rank wins;
/// 3. with no trump involved, a lead-suit card beats an off-suit card;
/// 4. between two lead-suit cards the higher rank wins;
/// 5. between two off-suit discards the higher rank wins.
///
/// The last branch has no meaning in play. Trick resolution always compares
/// a challenger against the running leader, which is trump or lead suit, so
/// it never reaches it; it exists so direct calls stay deterministic.
///
/// # Examples
///
/// ```
/// use std::cmp::Ordering;
/// use dehla_engine::cards::{Card, Rank, Suit};
/// use dehla_engine::rules::compare_cards;
///
/// let king = Card::new(Suit::Spades, Rank::King);
/// let two_of_trump = Card::new(Suit::Hearts, Rank::Two);
/// assert_eq!(
///     compare_cards(king, two_of_trump, Some(Suit::Hearts), Suit::Spades),
///     Ordering::Less
/// );
/// ```
pub fn compare_cards(a: Card, b: Card, trump: Option<Suit>, lead: Suit) -> Ordering {
    let a_trump = Some(a.suit) == trump;
    let b_trump = Some(b.suit) == trump;

    match (a_trump, b_trump) {
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (true, true) => return a.rank.cmp(&b.rank),
        (false, false) => {}
    }

    let a_lead = a.suit == lead;
    let b_lead = b.suit == lead;

    match (a_lead, b_lead) {
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => a.rank.cmp(&b.rank),
    }
}

/// Index of the winning card in a trick, or `None` for an empty trick.
///
/// `cards[0]` sets the lead suit. The running leader is only displaced by a
/// challenger that strictly beats it, so ties keep the earlier card.
pub fn resolve_trick(cards: &[Card], trump: Option<Suit>) -> Option<usize> {
    let lead = cards.first()?.suit;
    let winner = cards
        .iter()
        .enumerate()
        .skip(1)
        .fold(0, |leader, (i, &challenger)| {
            if compare_cards(cards[leader], challenger, trump, lead) == Ordering::Less {
                i
            } else {
                leader
            }
        });
    Some(winner)
}

/// One point for every ten in the trick.
pub fn calculate_trick_points(cards: &[Card]) -> u32 {
    cards.iter().filter(|c| c.rank == Rank::Ten).count() as u32
}

/// Suit-following check for a single play.
///
/// With no lead yet any card goes. Otherwise the lead suit must be followed
/// when held; a void hand may trump or discard freely.
pub fn is_valid_move(hand: &[Card], card: Card, lead: Option<Suit>) -> bool {
    let Some(lead) = lead else {
        return true;
    };
    card.suit == lead || !hand.iter().any(|c| c.suit == lead)
}

/// Every card in `hand` that [`is_valid_move`] accepts, in hand order.
pub fn legal_moves(hand: &[Card], lead: Option<Suit>) -> Vec<Card> {
    hand.iter()
        .copied()
        .filter(|&c| is_valid_move(hand, c, lead))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(s: &str) -> Card {
        s.parse().expect("card notation")
    }

    #[test]
    fn lead_suit_beats_off_suit_without_trump() {
        assert_eq!(
            compare_cards(c("2S"), c("AH"), None, Suit::Spades),
            Ordering::Greater
        );
    }

    #[test]
    fn trump_beats_lead_regardless_of_rank() {
        assert_eq!(
            compare_cards(c("AS"), c("2H"), Some(Suit::Hearts), Suit::Spades),
            Ordering::Less
        );
    }

    #[test]
    fn higher_trump_wins() {
        assert_eq!(
            compare_cards(c("3H"), c("10H"), Some(Suit::Hearts), Suit::Spades),
            Ordering::Less
        );
    }

    #[test]
    fn off_suit_discards_fall_back_to_rank() {
        // Defined but meaningless tie-break: neither card is trump or lead.
        assert_eq!(
            compare_cards(c("KD"), c("4C"), Some(Suit::Hearts), Suit::Spades),
            Ordering::Greater
        );
        assert_eq!(
            compare_cards(c("4D"), c("4C"), Some(Suit::Hearts), Suit::Spades),
            Ordering::Equal
        );
    }

    #[test]
    fn resolve_trick_on_empty_is_none() {
        assert_eq!(resolve_trick(&[], Some(Suit::Hearts)), None);
    }

    #[test]
    fn resolve_trick_keeps_leader_on_tie() {
        // two off-suit discards of equal rank never displace the lead card
        let trick = [c("5S"), c("9D"), c("9C"), c("2S")];
        assert_eq!(resolve_trick(&trick, None), Some(0));
    }

    #[test]
    fn trick_points_count_tens() {
        assert_eq!(calculate_trick_points(&[c("10S"), c("10H"), c("AS")]), 2);
        assert_eq!(calculate_trick_points(&[]), 0);
    }

    #[test]
    fn legal_moves_restricts_to_lead_when_held() {
        let hand = [c("2H"), c("5S"), c("KS"), c("AD")];
        assert_eq!(legal_moves(&hand, Some(Suit::Spades)), vec![c("5S"), c("KS")]);
        assert_eq!(legal_moves(&hand, Some(Suit::Clubs)), hand.to_vec());
        assert_eq!(legal_moves(&hand, None), hand.to_vec());
    }
}
