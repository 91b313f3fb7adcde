//! Matchmaker
//!
//! Picks who plays next and on which map. Challengers come in arrival
//! order so a ladder can be replayed exactly; maps are drawn uniformly
//! from the pool. Only returns values, the state machine applies them.

use std::collections::BTreeSet;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::core::ids::PlayerId;
use crate::tournament::state::TournamentError;
use crate::tournament::types::{GameMap, Player};

/// Pairing for the opening round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpeningPairing {
    /// First arrival.
    pub player1: Player,
    /// Second arrival.
    pub player2: Player,
    /// Selected map.
    pub map: GameMap,
}

/// Pairing for a round after the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengePairing {
    /// Next unplayed participant.
    pub challenger: Player,
    /// Selected map.
    pub map: GameMap,
}

/// Challenger and map selection.
#[derive(Debug, Clone)]
pub struct Matchmaker {
    rng: StdRng,
}

impl Matchmaker {
    /// Create a matchmaker with an OS-seeded RNG.
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a matchmaker with a fixed seed (reproducible map draws).
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Create from an optional seed.
    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map(Self::with_seed).unwrap_or_default()
    }

    /// Draw a map uniformly from the pool.
    pub fn pick_map(&mut self, pool: &[GameMap]) -> Result<GameMap, TournamentError> {
        pool.choose(&mut self.rng)
            .cloned()
            .ok_or(TournamentError::NoMapsAvailable)
    }

    /// Pair the first two participants for round 1.
    pub fn pair_opening(
        &mut self,
        participants: &[Player],
        pool: &[GameMap],
    ) -> Result<OpeningPairing, TournamentError> {
        let (player1, player2) = match participants {
            [first, second, ..] => (first.clone(), second.clone()),
            _ => {
                return Err(TournamentError::InsufficientPlayers {
                    registered: participants.len(),
                })
            }
        };
        let map = self.pick_map(pool)?;

        Ok(OpeningPairing { player1, player2, map })
    }

    /// Pair the holder with the next unplayed participant.
    ///
    /// Returns `Ok(None)` when every participant has played.
    pub fn pair_challenger(
        &mut self,
        participants: &[Player],
        played: &BTreeSet<PlayerId>,
        holder: PlayerId,
        pool: &[GameMap],
    ) -> Result<Option<ChallengePairing>, TournamentError> {
        let challenger = match next_challenger(participants, played, holder) {
            Some(p) => p.clone(),
            None => return Ok(None),
        };
        let map = self.pick_map(pool)?;

        Ok(Some(ChallengePairing { challenger, map }))
    }
}

impl Default for Matchmaker {
    fn default() -> Self {
        Self::new()
    }
}

/// First participant, in arrival order, who has not played and is not the holder.
pub fn next_challenger<'a>(
    participants: &'a [Player],
    played: &BTreeSet<PlayerId>,
    holder: PlayerId,
) -> Option<&'a Player> {
    participants
        .iter()
        .find(|p| p.id != holder && !played.contains(&p.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::MapId;
    use crate::tournament::types::Race;

    fn roster(n: u64) -> Vec<Player> {
        (1..=n)
            .map(|i| Player::new(PlayerId::new(i), format!("p{}", i), Race::Zerg))
            .collect()
    }

    fn maps(n: u64) -> Vec<GameMap> {
        (1..=n).map(|i| GameMap::new(MapId::new(i), format!("map{}", i))).collect()
    }

    #[test]
    fn test_next_challenger_skips_played_and_holder() {
        let players = roster(4);
        let played: BTreeSet<_> = [PlayerId::new(1), PlayerId::new(2)].into_iter().collect();

        let next = next_challenger(&players, &played, PlayerId::new(1)).unwrap();
        assert_eq!(next.id, PlayerId::new(3));

        let all: BTreeSet<_> = players.iter().map(|p| p.id).collect();
        assert!(next_challenger(&players, &all, PlayerId::new(1)).is_none());
    }

    #[test]
    fn test_opening_uses_arrival_order() {
        let mut mm = Matchmaker::with_seed(7);
        let pairing = mm.pair_opening(&roster(3), &maps(2)).unwrap();
        assert_eq!(pairing.player1.id, PlayerId::new(1));
        assert_eq!(pairing.player2.id, PlayerId::new(2));
    }

    #[test]
    fn test_opening_requires_two_players() {
        let mut mm = Matchmaker::with_seed(7);
        let result = mm.pair_opening(&roster(1), &maps(2));
        assert_eq!(result, Err(TournamentError::InsufficientPlayers { registered: 1 }));
    }

    #[test]
    fn test_empty_pool_fails() {
        let mut mm = Matchmaker::with_seed(7);
        assert_eq!(mm.pick_map(&[]), Err(TournamentError::NoMapsAvailable));
    }

    #[test]
    fn test_no_map_drawn_when_ladder_exhausted() {
        let mut mm = Matchmaker::with_seed(7);
        let players = roster(2);
        let played: BTreeSet<_> = players.iter().map(|p| p.id).collect();

        // Empty pool is fine: nobody is left to play.
        let result = mm.pair_challenger(&players, &played, PlayerId::new(1), &[]);
        assert_eq!(result, Ok(None));
    }

    #[test]
    fn test_seeded_draws_are_reproducible() {
        let pool = maps(5);
        let mut a = Matchmaker::with_seed(99);
        let mut b = Matchmaker::with_seed(99);

        for _ in 0..20 {
            assert_eq!(a.pick_map(&pool).unwrap(), b.pick_map(&pool).unwrap());
        }
    }

    #[test]
    fn test_draws_cover_the_pool() {
        let pool = maps(3);
        let mut mm = Matchmaker::with_seed(1);
        let drawn: BTreeSet<_> = (0..200).map(|_| mm.pick_map(&pool).unwrap().id).collect();
        assert_eq!(drawn.len(), 3);
    }
}
