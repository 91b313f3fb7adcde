//! Streak Bookkeeping
//!
//! Streaks are never stored on their own: they are read back from the
//! sealed games. The last sealed game always carries the live holder's
//! streak, so summaries computed here cover an in-progress ladder too.

use crate::core::ids::PlayerId;
use crate::tournament::types::{Player, PreviousGame, TournamentResult};

/// Current holder of the hill and their streak, if any game was decided.
pub fn holder(games: &[PreviousGame]) -> Option<(&Player, u32)> {
    games.last().map(|g| (&g.winner, g.streak))
}

/// Streak the given winner reaches by winning the next game.
pub fn next_streak(games: &[PreviousGame], winner: PlayerId) -> u32 {
    match holder(games) {
        Some((current, streak)) if current.id == winner => streak + 1,
        _ => 1,
    }
}

/// Highest streak across all decided games (0 when none).
pub fn max_streak(games: &[PreviousGame]) -> u32 {
    games.iter().map(|g| g.streak).max().unwrap_or(0)
}

/// Players who reached `max_streak`, in order of first attainment.
pub fn max_streak_players(games: &[PreviousGame]) -> Vec<Player> {
    let max = max_streak(games);
    let mut players: Vec<Player> = Vec::new();

    for game in games.iter().filter(|g| g.streak == max) {
        if !players.iter().any(|p| p.id == game.winner.id) {
            players.push(game.winner.clone());
        }
    }

    players
}

/// Build the result summary. `None` when no game was decided.
pub fn summarize(games: &[PreviousGame]) -> Option<TournamentResult> {
    let (winner, winner_streak) = holder(games)?;

    Some(TournamentResult {
        winner: winner.clone(),
        winner_streak,
        max_streak: max_streak(games),
        max_streak_players: max_streak_players(games),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::MapId;
    use crate::tournament::types::{GameMap, Race};

    fn player(id: u64, nick: &str) -> Player {
        Player::new(PlayerId::new(id), nick, Race::Terran)
    }

    fn game(round: u32, winner: &Player, loser: &Player, streak: u32) -> PreviousGame {
        PreviousGame {
            round,
            winner: winner.clone(),
            loser: loser.clone(),
            map: GameMap::new(MapId::new(1), "Eclipse"),
            streak,
        }
    }

    #[test]
    fn test_next_streak() {
        let a = player(1, "a");
        let b = player(2, "b");
        let games = vec![game(1, &a, &b, 1)];

        assert_eq!(next_streak(&[], a.id), 1);
        assert_eq!(next_streak(&games, a.id), 2);
        assert_eq!(next_streak(&games, b.id), 1);
    }

    #[test]
    fn test_summarize_empty() {
        assert!(summarize(&[]).is_none());
        assert_eq!(max_streak(&[]), 0);
        assert!(max_streak_players(&[]).is_empty());
    }

    #[test]
    fn test_single_dominant_holder() {
        let a = player(1, "a");
        let b = player(2, "b");
        let c = player(3, "c");
        let games = vec![game(1, &a, &b, 1), game(2, &a, &c, 2)];

        let result = summarize(&games).unwrap();
        assert_eq!(result.winner.id, a.id);
        assert_eq!(result.winner_streak, 2);
        assert_eq!(result.max_streak, 2);
        assert_eq!(result.max_streak_players, vec![a]);
    }

    #[test]
    fn test_tied_max_streak_in_attainment_order() {
        let a = player(1, "a");
        let b = player(2, "b");
        let c = player(3, "c");
        let games = vec![game(1, &a, &b, 1), game(2, &c, &a, 1)];

        let result = summarize(&games).unwrap();
        assert_eq!(result.winner.id, c.id);
        assert_eq!(result.winner_streak, 1);
        assert_eq!(result.max_streak, 1);
        let ids: Vec<_> = result.max_streak_players.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![a.id, c.id]);
    }

    #[test]
    fn test_earlier_streak_beats_final_holder() {
        let a = player(1, "a");
        let b = player(2, "b");
        let c = player(3, "c");
        let d = player(4, "d");
        let games = vec![
            game(1, &a, &b, 1),
            game(2, &a, &c, 2),
            game(3, &d, &a, 1),
        ];

        let result = summarize(&games).unwrap();
        assert_eq!(result.winner.id, d.id);
        assert_eq!(result.winner_streak, 1);
        assert_eq!(result.max_streak, 2);
        assert_eq!(result.max_streak_players, vec![a]);
    }
}
