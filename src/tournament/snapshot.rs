//! Snapshot Projector
//!
//! Read model served to viewers and admin controls. A snapshot is a
//! point-in-time copy: nothing in it refers back to the live record.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::core::ids::TournamentId;
use crate::tournament::state::Tournament;
use crate::tournament::types::{
    CurrentGame, Player, PreviousGame, TournamentResult, TournamentStatus,
};

/// Number of recent games shown while a ladder is running.
pub const DEFAULT_RECENT_GAMES: usize = 10;

/// Who is looking. Real names are only projected for admins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Viewer {
    /// Spectators and players.
    Public,
    /// Authenticated admin.
    Admin,
}

/// Projected tournament state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TournamentSnapshot {
    /// No tournament was ever started.
    NoTournament {
        /// Players currently registered.
        registered_players: usize,
        /// Whether enough players are registered to start.
        can_start: bool,
    },
    /// Latest tournament (running or finished).
    Tournament(TournamentView),
}

impl TournamentSnapshot {
    /// Get the tournament view, if any.
    pub fn view(&self) -> Option<&TournamentView> {
        match self {
            TournamentSnapshot::Tournament(view) => Some(view),
            TournamentSnapshot::NoTournament { .. } => None,
        }
    }
}

/// Current holder of the hill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HolderView {
    /// Holder.
    pub player: Player,
    /// Live streak.
    pub streak: u32,
}

/// View of one tournament.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentView {
    /// Tournament identifier.
    pub id: TournamentId,
    /// Lifecycle status.
    pub status: TournamentStatus,
    /// Game awaiting a result.
    pub current_game: Option<CurrentGame>,
    /// Holder of the hill.
    pub holder: Option<HolderView>,
    /// Most recent decided games, newest first.
    pub recent_games: Vec<PreviousGame>,
    /// Every decided game in round order; only once finished.
    pub all_games: Option<Vec<PreviousGame>>,
    /// Total decided games.
    pub games_played: usize,
    /// Participant count.
    pub participant_count: usize,
    /// Result summary once finished.
    pub result: Option<TournamentResult>,
    /// When the tournament was created.
    pub started_at: DateTime<Utc>,
    /// When the tournament finished.
    pub finished_at: Option<DateTime<Utc>>,
}

/// Project the latest tournament for a viewer.
pub fn project(
    tournament: Option<&Tournament>,
    roster: &[Player],
    viewer: Viewer,
    recent_window: usize,
) -> TournamentSnapshot {
    let t = match tournament {
        Some(t) => t,
        None => {
            return TournamentSnapshot::NoTournament {
                registered_players: roster.len(),
                can_start: roster.len() >= 2,
            }
        }
    };

    let redact = |p: &Player| match viewer {
        Viewer::Admin => p.clone(),
        Viewer::Public => p.public(),
    };
    let redact_game = |g: &PreviousGame| PreviousGame {
        winner: redact(&g.winner),
        loser: redact(&g.loser),
        ..g.clone()
    };

    let current_game = t.current_game.as_ref().map(|g| CurrentGame {
        player1: redact(&g.player1),
        player2: redact(&g.player2),
        ..g.clone()
    });

    let recent_games = t
        .previous_games
        .iter()
        .rev()
        .take(recent_window)
        .map(redact_game)
        .collect();

    let all_games = t
        .is_finished()
        .then(|| t.previous_games.iter().map(redact_game).collect());

    let result = t.result.as_ref().map(|r| TournamentResult {
        winner: redact(&r.winner),
        max_streak_players: r.max_streak_players.iter().map(redact).collect(),
        ..r.clone()
    });

    TournamentSnapshot::Tournament(TournamentView {
        id: t.id,
        status: t.status,
        current_game,
        holder: t.holder().map(|(player, streak)| HolderView {
            player: redact(player),
            streak,
        }),
        recent_games,
        all_games,
        games_played: t.previous_games.len(),
        participant_count: t.participants.len(),
        result,
        started_at: t.started_at,
        finished_at: t.finished_at,
    })
}
