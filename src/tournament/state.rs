//! Tournament State Machine
//!
//! Authoritative tournament record and its transitions.
//! Pure logic: no I/O, no clock reads (timestamps are passed in).
//!
//! Every transition validates all of its preconditions and performs every
//! fallible step (challenger and map selection) before touching `self`,
//! so a rejected call leaves the record exactly as it was.

use std::collections::BTreeSet;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::ids::{PlayerId, TournamentId};
use crate::tournament::matchmaker::Matchmaker;
use crate::tournament::streak;
use crate::tournament::types::{
    CurrentGame, GameMap, Player, PreviousGame, TournamentResult, TournamentStatus,
};

/// Tournament errors. `Display` is the reason shown to the admin.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TournamentError {
    /// Fewer than two players registered.
    #[error("at least 2 players are needed to start a tournament ({registered} registered)")]
    InsufficientPlayers {
        /// Distinct players available.
        registered: usize,
    },
    /// Another tournament is in progress.
    #[error("a tournament is already running")]
    TournamentAlreadyActive,
    /// Map roster is empty.
    #[error("no maps are registered")]
    NoMapsAvailable,
    /// No game is waiting for a result.
    #[error("there is no game waiting for a result")]
    NoActiveGame,
    /// No tournament is in progress.
    #[error("there is no tournament in progress")]
    NoActiveTournament,
    /// Declared winner is not playing the current game.
    #[error("player {winner} is not playing in round {round}")]
    InvalidWinner {
        /// Declared winner.
        winner: PlayerId,
        /// Round being played.
        round: u32,
    },
    /// The caller acted on an outdated view of the ladder.
    #[error("result was for round {expected}, but round {current} is being played")]
    StaleState {
        /// Round the caller saw.
        expected: u32,
        /// Round actually being played.
        current: u32,
    },
    /// No archived tournament with this id.
    #[error("tournament {0} not found")]
    NotFound(TournamentId),
    /// Player cannot be removed while taking part in the running tournament.
    #[error("player {0} is taking part in the running tournament")]
    PlayerInActiveTournament(PlayerId),
    /// Status transition out of order.
    #[error("cannot move a tournament from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: TournamentStatus,
        /// Requested status.
        to: TournamentStatus,
    },
}

/// What a recorded result did to the ladder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameOutcome {
    /// The game just sealed.
    pub sealed: PreviousGame,
    /// The next game, if a challenger remained.
    pub next: Option<CurrentGame>,
}

impl GameOutcome {
    /// Check whether this result exhausted the ladder.
    pub fn finished(&self) -> bool {
        self.next.is_none()
    }
}

/// A King of the Hill tournament.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tournament {
    /// Tournament identifier.
    pub id: TournamentId,
    /// Lifecycle status.
    pub status: TournamentStatus,
    /// Game awaiting a result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_game: Option<CurrentGame>,
    /// Decided games in round order.
    #[serde(default)]
    pub previous_games: Vec<PreviousGame>,
    /// Roster snapshot at start, in arrival order.
    pub participants: Vec<Player>,
    /// Map roster snapshot at start.
    pub map_pool: Vec<GameMap>,
    /// When the tournament was created.
    pub started_at: DateTime<Utc>,
    /// When the tournament finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Result summary once finished (absent if ended before any game).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TournamentResult>,
}

impl Tournament {
    /// Create a tournament in `Preparing`.
    ///
    /// Participants are the roster in arrival order; repeated ids keep
    /// their first occurrence.
    pub fn prepare(
        id: TournamentId,
        roster: &[Player],
        maps: &[GameMap],
        now: DateTime<Utc>,
    ) -> Self {
        let mut seen = BTreeSet::new();
        let participants = roster
            .iter()
            .filter(|p| seen.insert(p.id))
            .cloned()
            .collect();

        Self {
            id,
            status: TournamentStatus::Preparing,
            current_game: None,
            previous_games: Vec::new(),
            participants,
            map_pool: maps.to_vec(),
            started_at: now,
            finished_at: None,
            result: None,
        }
    }

    /// Create a tournament and form round 1.
    ///
    /// The "already active" check belongs to whoever owns the current
    /// tournament slot; see [`crate::service::TournamentService`].
    pub fn start(
        id: TournamentId,
        roster: &[Player],
        maps: &[GameMap],
        matchmaker: &mut Matchmaker,
        now: DateTime<Utc>,
    ) -> Result<Self, TournamentError> {
        let mut tournament = Self::prepare(id, roster, maps, now);
        tournament.begin(matchmaker)?;
        Ok(tournament)
    }

    /// Advance `Preparing` to `InProgress` with the opening game.
    pub fn begin(&mut self, matchmaker: &mut Matchmaker) -> Result<(), TournamentError> {
        self.check_transition(TournamentStatus::InProgress)?;

        let pairing = matchmaker.pair_opening(&self.participants, &self.map_pool)?;

        self.current_game = Some(CurrentGame {
            round: 1,
            player1: pairing.player1,
            player2: pairing.player2,
            map: pairing.map,
        });
        self.status = TournamentStatus::InProgress;
        Ok(())
    }

    /// Seal the current game and form the next one (or finish).
    ///
    /// `expected_round`, when given, must match the round being played;
    /// it stops a result meant for an earlier view of the ladder from
    /// being applied to the next game.
    pub fn record_result(
        &mut self,
        winner_id: PlayerId,
        expected_round: Option<u32>,
        matchmaker: &mut Matchmaker,
        now: DateTime<Utc>,
    ) -> Result<GameOutcome, TournamentError> {
        if self.status != TournamentStatus::InProgress {
            return Err(TournamentError::NoActiveGame);
        }
        let current = self.current_game.as_ref().ok_or(TournamentError::NoActiveGame)?;

        if let Some(expected) = expected_round {
            if expected != current.round {
                return Err(TournamentError::StaleState {
                    expected,
                    current: current.round,
                });
            }
        }

        let (winner, loser) = current.decide(winner_id).ok_or(TournamentError::InvalidWinner {
            winner: winner_id,
            round: current.round,
        })?;

        let sealed = PreviousGame {
            round: current.round,
            winner: winner.clone(),
            loser: loser.clone(),
            map: current.map.clone(),
            streak: streak::next_streak(&self.previous_games, winner_id),
        };

        let mut played = self.played_players();
        played.insert(winner_id);
        played.insert(loser.id);

        let pairing = matchmaker.pair_challenger(
            &self.participants,
            &played,
            winner_id,
            &self.map_pool,
        )?;
        let next = pairing.map(|p| CurrentGame {
            round: sealed.round + 1,
            player1: sealed.winner.clone(),
            player2: p.challenger,
            map: p.map,
        });

        // Commit.
        self.previous_games.push(sealed.clone());
        self.current_game = next.clone();
        if next.is_none() {
            self.finish(now);
        }

        Ok(GameOutcome { sealed, next })
    }

    /// Force `Finished`, discarding the undecided current game.
    pub fn end(&mut self, now: DateTime<Utc>) -> Result<(), TournamentError> {
        if self.status != TournamentStatus::InProgress {
            return Err(TournamentError::NoActiveTournament);
        }
        self.current_game = None;
        self.finish(now);
        Ok(())
    }

    fn finish(&mut self, now: DateTime<Utc>) {
        self.status = TournamentStatus::Finished;
        self.finished_at = Some(now);
        self.result = streak::summarize(&self.previous_games);
    }

    fn check_transition(&self, to: TournamentStatus) -> Result<(), TournamentError> {
        if self.status.can_advance_to(to) {
            Ok(())
        } else {
            Err(TournamentError::InvalidTransition { from: self.status, to })
        }
    }

    /// Every player who has appeared in a game, including the current one.
    pub fn played_players(&self) -> BTreeSet<PlayerId> {
        let mut played: BTreeSet<PlayerId> = self
            .previous_games
            .iter()
            .flat_map(|g| [g.winner.id, g.loser.id])
            .collect();
        if let Some(ref game) = self.current_game {
            played.insert(game.player1.id);
            played.insert(game.player2.id);
        }
        played
    }

    /// Round being played, if any.
    pub fn current_round(&self) -> Option<u32> {
        self.current_game.as_ref().map(|g| g.round)
    }

    /// Current holder of the hill and their streak.
    pub fn holder(&self) -> Option<(&Player, u32)> {
        streak::holder(&self.previous_games)
    }

    /// Check whether a player is in the participant snapshot.
    pub fn is_participant(&self, id: PlayerId) -> bool {
        self.participants.iter().any(|p| p.id == id)
    }

    /// Check whether the tournament is running.
    pub fn is_active(&self) -> bool {
        self.status == TournamentStatus::InProgress
    }

    /// Check whether the tournament is over.
    pub fn is_finished(&self) -> bool {
        self.status == TournamentStatus::Finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::MapId;
    use crate::tournament::types::Race;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn roster(n: u64) -> Vec<Player> {
        (1..=n)
            .map(|i| Player::new(PlayerId::new(i), format!("p{}", i), Race::Protoss))
            .collect()
    }

    fn maps() -> Vec<GameMap> {
        vec![
            GameMap::new(MapId::new(1), "Fighting Spirit"),
            GameMap::new(MapId::new(2), "Circuit Breaker"),
        ]
    }

    fn start(n: u64) -> (Tournament, Matchmaker) {
        let mut mm = Matchmaker::with_seed(42);
        let t = Tournament::start(TournamentId::new(1), &roster(n), &maps(), &mut mm, now()).unwrap();
        (t, mm)
    }

    const A: PlayerId = PlayerId::new(1);
    const B: PlayerId = PlayerId::new(2);
    const C: PlayerId = PlayerId::new(3);

    #[test]
    fn test_start_forms_round_one() {
        let (t, _) = start(3);
        assert_eq!(t.status, TournamentStatus::InProgress);
        let game = t.current_game.as_ref().unwrap();
        assert_eq!(game.round, 1);
        assert_eq!(game.player1.id, A);
        assert_eq!(game.player2.id, B);
        assert!(t.previous_games.is_empty());
    }

    #[test]
    fn test_start_requires_two_distinct_players() {
        let mut mm = Matchmaker::with_seed(1);
        let one = roster(1);
        let result = Tournament::start(TournamentId::new(1), &one, &maps(), &mut mm, now());
        assert_eq!(result, Err(TournamentError::InsufficientPlayers { registered: 1 }));

        let duplicated = vec![one[0].clone(), one[0].clone()];
        let result = Tournament::start(TournamentId::new(1), &duplicated, &maps(), &mut mm, now());
        assert_eq!(result, Err(TournamentError::InsufficientPlayers { registered: 1 }));
    }

    #[test]
    fn test_start_requires_maps() {
        let mut mm = Matchmaker::with_seed(1);
        let result = Tournament::start(TournamentId::new(1), &roster(3), &[], &mut mm, now());
        assert_eq!(result, Err(TournamentError::NoMapsAvailable));
    }

    #[test]
    fn test_prepare_holds_no_games() {
        let t = Tournament::prepare(TournamentId::new(1), &roster(3), &maps(), now());
        assert_eq!(t.status, TournamentStatus::Preparing);
        assert!(t.current_game.is_none());
        assert!(t.played_players().is_empty());
    }

    #[test]
    fn test_begin_twice_is_rejected() {
        let (mut t, mut mm) = start(3);
        let result = t.begin(&mut mm);
        assert_eq!(
            result,
            Err(TournamentError::InvalidTransition {
                from: TournamentStatus::InProgress,
                to: TournamentStatus::InProgress,
            })
        );
    }

    #[test]
    fn test_holder_defends_twice() {
        let (mut t, mut mm) = start(3);

        let outcome = t.record_result(A, None, &mut mm, now()).unwrap();
        assert_eq!(outcome.sealed.round, 1);
        assert_eq!(outcome.sealed.winner.id, A);
        assert_eq!(outcome.sealed.loser.id, B);
        assert_eq!(outcome.sealed.streak, 1);
        let next = outcome.next.unwrap();
        assert_eq!(next.round, 2);
        assert_eq!(next.player1.id, A);
        assert_eq!(next.player2.id, C);

        let outcome = t.record_result(A, None, &mut mm, now()).unwrap();
        assert!(outcome.finished());
        assert_eq!(outcome.sealed.streak, 2);
        assert_eq!(outcome.sealed.loser.id, C);

        assert_eq!(t.status, TournamentStatus::Finished);
        assert!(t.current_game.is_none());
        assert!(t.finished_at.is_some());

        let result = t.result.as_ref().unwrap();
        assert_eq!(result.winner.id, A);
        assert_eq!(result.winner_streak, 2);
        assert_eq!(result.max_streak, 2);
        let ids: Vec<_> = result.max_streak_players.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![A]);
    }

    #[test]
    fn test_challenger_takes_the_hill() {
        let (mut t, mut mm) = start(3);

        t.record_result(A, None, &mut mm, now()).unwrap();
        let outcome = t.record_result(C, None, &mut mm, now()).unwrap();

        assert_eq!(outcome.sealed.winner.id, C);
        assert_eq!(outcome.sealed.loser.id, A);
        assert_eq!(outcome.sealed.streak, 1);
        assert_eq!(t.status, TournamentStatus::Finished);

        let result = t.result.as_ref().unwrap();
        assert_eq!(result.winner.id, C);
        assert_eq!(result.winner_streak, 1);
        assert_eq!(result.max_streak, 1);
        let ids: Vec<_> = result.max_streak_players.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![A, C]);
    }

    #[test]
    fn test_two_players_finish_after_one_game() {
        let (mut t, mut mm) = start(2);
        let outcome = t.record_result(B, None, &mut mm, now()).unwrap();
        assert!(outcome.finished());
        assert_eq!(t.previous_games.len(), 1);
        assert_eq!(t.result.as_ref().unwrap().winner.id, B);
    }

    #[test]
    fn test_invalid_winner_leaves_state_untouched() {
        let (mut t, mut mm) = start(3);
        let before = t.clone();

        let result = t.record_result(C, None, &mut mm, now());
        assert_eq!(result, Err(TournamentError::InvalidWinner { winner: C, round: 1 }));
        assert_eq!(t, before);
    }

    #[test]
    fn test_stale_round_rejected() {
        let (mut t, mut mm) = start(3);
        t.record_result(A, Some(1), &mut mm, now()).unwrap();
        let before = t.clone();

        // A second click on the round-1 button must not decide round 2.
        let result = t.record_result(A, Some(1), &mut mm, now());
        assert_eq!(result, Err(TournamentError::StaleState { expected: 1, current: 2 }));
        assert_eq!(t, before);
    }

    #[test]
    fn test_no_result_after_finish() {
        let (mut t, mut mm) = start(2);
        t.record_result(A, None, &mut mm, now()).unwrap();
        assert_eq!(t.record_result(A, None, &mut mm, now()), Err(TournamentError::NoActiveGame));
    }

    #[test]
    fn test_end_discards_current_game() {
        let (mut t, mut mm) = start(4);
        t.record_result(B, None, &mut mm, now()).unwrap();
        t.end(now()).unwrap();

        assert_eq!(t.status, TournamentStatus::Finished);
        assert!(t.current_game.is_none());
        assert_eq!(t.previous_games.len(), 1);
        let result = t.result.as_ref().unwrap();
        assert_eq!(result.winner.id, B);
        assert_eq!(result.winner_streak, 1);

        assert_eq!(t.end(now()), Err(TournamentError::NoActiveTournament));
    }

    #[test]
    fn test_end_before_any_game_has_no_result() {
        let (mut t, _) = start(3);
        t.end(now()).unwrap();
        assert_eq!(t.status, TournamentStatus::Finished);
        assert!(t.result.is_none());
    }

    #[test]
    fn test_eliminated_player_never_returns() {
        let (mut t, mut mm) = start(5);
        t.record_result(A, None, &mut mm, now()).unwrap();
        t.record_result(C, None, &mut mm, now()).unwrap();
        t.record_result(C, None, &mut mm, now()).unwrap();

        let game = t.current_game.as_ref().unwrap();
        assert_eq!(game.player1.id, C);
        assert_eq!(game.player2.id, PlayerId::new(5));
        assert!(t.played_players().contains(&A));
        assert!(t.played_players().contains(&B));
    }

    proptest! {
        #[test]
        fn prop_ladder_finishes_after_n_minus_one_results(n in 2u64..24, picks in proptest::collection::vec(any::<bool>(), 24)) {
            let (mut t, mut mm) = start(n);

            let mut step = 0;
            while let Some(game) = t.current_game.clone() {
                let winner = if picks[step] { game.player1.id } else { game.player2.id };
                t.record_result(winner, Some(game.round), &mut mm, now()).unwrap();
                step += 1;
            }

            prop_assert_eq!(t.status, TournamentStatus::Finished);
            prop_assert_eq!(t.previous_games.len() as u64, n - 1);

            let rounds: Vec<u32> = t.previous_games.iter().map(|g| g.round).collect();
            let expected: Vec<u32> = (1..n as u32).collect();
            prop_assert_eq!(rounds, expected);

            // Streaks restart at 1 on a change of holder, otherwise climb by 1.
            let mut holder: Option<PlayerId> = None;
            let mut run = 0;
            for game in &t.previous_games {
                run = if holder == Some(game.winner.id) { run + 1 } else { 1 };
                holder = Some(game.winner.id);
                prop_assert_eq!(game.streak, run);
                prop_assert_ne!(game.winner.id, game.loser.id);
            }

            let result = t.result.clone().unwrap();
            prop_assert!(!result.max_streak_players.is_empty());
            for player in &result.max_streak_players {
                let best = t.previous_games.iter()
                    .filter(|g| g.winner.id == player.id)
                    .map(|g| g.streak)
                    .max()
                    .unwrap();
                prop_assert_eq!(best, result.max_streak);
            }
        }

        #[test]
        fn prop_lexicographic_first_winner(n in 2u64..16) {
            let (mut t, mut mm) = start(n);
            while let Some(game) = t.current_game.clone() {
                let winner = if game.player1.nickname <= game.player2.nickname {
                    game.player1.id
                } else {
                    game.player2.id
                };
                t.record_result(winner, None, &mut mm, now()).unwrap();
            }
            prop_assert_eq!(t.previous_games.len() as u64, n - 1);
            prop_assert!(t.result.is_some());
        }
    }
}
