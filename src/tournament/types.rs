//! Tournament Data Types
//!
//! Roster entries and game records. Field names follow the camelCase
//! shape served to viewers and log consumers.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::ids::{PlayerId, MapId};

// =============================================================================
// ROSTER ENTRIES
// =============================================================================

/// Player race.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Race {
    /// Protoss
    Protoss,
    /// Terran
    Terran,
    /// Zerg
    Zerg,
}

impl fmt::Display for Race {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Race::Protoss => "PROTOSS",
            Race::Terran => "TERRAN",
            Race::Zerg => "ZERG",
        };
        f.write_str(s)
    }
}

/// A registered player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Roster identifier.
    pub id: PlayerId,
    /// Unique display name.
    pub nickname: String,
    /// Real name, only shown to admins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Race played.
    pub race: Race,
}

impl Player {
    /// Create a player without a real name.
    pub fn new(id: PlayerId, nickname: impl Into<String>, race: Race) -> Self {
        Self {
            id,
            nickname: nickname.into(),
            name: None,
            race,
        }
    }

    /// Attach a real name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Copy with the real name removed.
    pub fn public(&self) -> Self {
        Self {
            name: None,
            ..self.clone()
        }
    }
}

/// A map from the roster, copied by value into every game that uses it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMap {
    /// Roster identifier.
    pub id: MapId,
    /// Map name.
    pub name: String,
}

impl GameMap {
    /// Create a map entry.
    pub fn new(id: MapId, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

// =============================================================================
// GAMES
// =============================================================================

/// The game awaiting a result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentGame {
    /// Round number (1-based).
    pub round: u32,
    /// Holder of the hill (or first arrival in round 1).
    pub player1: Player,
    /// Challenger.
    pub player2: Player,
    /// Map to be played.
    pub map: GameMap,
}

impl CurrentGame {
    /// Check whether a player takes part in this game.
    pub fn involves(&self, id: PlayerId) -> bool {
        self.player1.id == id || self.player2.id == id
    }

    /// Split into (winner, loser) if `winner_id` is one of the players.
    pub fn decide(&self, winner_id: PlayerId) -> Option<(&Player, &Player)> {
        if self.player1.id == winner_id {
            Some((&self.player1, &self.player2))
        } else if self.player2.id == winner_id {
            Some((&self.player2, &self.player1))
        } else {
            None
        }
    }
}

/// A decided game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviousGame {
    /// Round number (1-based).
    pub round: u32,
    /// Winner of the round.
    pub winner: Player,
    /// Loser of the round.
    pub loser: Player,
    /// Map played.
    pub map: GameMap,
    /// Winner's streak after this round.
    pub streak: u32,
}

// =============================================================================
// TOURNAMENT STATUS & RESULT
// =============================================================================

/// Tournament lifecycle status. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TournamentStatus {
    /// Created, no game formed yet.
    Preparing,
    /// Ladder running.
    InProgress,
    /// Terminal.
    Finished,
}

impl TournamentStatus {
    /// Check whether `next` is the single forward step from this status.
    pub fn can_advance_to(self, next: TournamentStatus) -> bool {
        matches!(
            (self, next),
            (TournamentStatus::Preparing, TournamentStatus::InProgress)
                | (TournamentStatus::InProgress, TournamentStatus::Finished)
        )
    }
}

impl fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TournamentStatus::Preparing => "PREPARING",
            TournamentStatus::InProgress => "IN_PROGRESS",
            TournamentStatus::Finished => "FINISHED",
        };
        f.write_str(s)
    }
}

/// Result summary of a finished tournament.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentResult {
    /// Final holder of the hill.
    pub winner: Player,
    /// Winner's streak at the end.
    pub winner_streak: u32,
    /// Highest streak reached by anyone.
    pub max_streak: u32,
    /// Every player who reached `max_streak`, in order of first attainment.
    pub max_streak_players: Vec<Player>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_game() -> CurrentGame {
        CurrentGame {
            round: 3,
            player1: Player::new(PlayerId::new(1), "alpha", Race::Zerg),
            player2: Player::new(PlayerId::new(2), "bravo", Race::Terran),
            map: GameMap::new(MapId::new(9), "Polypoid"),
        }
    }

    #[test]
    fn test_decide_orders_winner_first() {
        let game = sample_game();

        let (winner, loser) = game.decide(PlayerId::new(2)).unwrap();
        assert_eq!(winner.nickname, "bravo");
        assert_eq!(loser.nickname, "alpha");

        assert!(game.decide(PlayerId::new(3)).is_none());
        assert!(game.involves(PlayerId::new(1)));
        assert!(!game.involves(PlayerId::new(3)));
    }

    #[test]
    fn test_status_only_moves_forward() {
        use TournamentStatus::*;
        assert!(Preparing.can_advance_to(InProgress));
        assert!(InProgress.can_advance_to(Finished));
        assert!(!Preparing.can_advance_to(Finished));
        assert!(!Finished.can_advance_to(InProgress));
        assert!(!InProgress.can_advance_to(Preparing));
    }

    #[test]
    fn test_public_player_hides_real_name() {
        let player = Player::new(PlayerId::new(1), "alpha", Race::Protoss).with_name("Kim");
        let json = serde_json::to_string(&player.public()).unwrap();
        assert!(!json.contains("Kim"));
        assert!(json.contains("PROTOSS"));
    }

    #[test]
    fn test_game_json_shape() {
        let json = serde_json::to_value(sample_game()).unwrap();
        assert_eq!(json["round"], 3);
        assert_eq!(json["player1"]["nickname"], "alpha");
        assert_eq!(json["map"]["name"], "Polypoid");
        assert_eq!(
            serde_json::to_value(TournamentStatus::InProgress).unwrap(),
            "IN_PROGRESS"
        );
    }
}
