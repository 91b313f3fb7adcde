//! Roster Store
//!
//! The engine reads the roster and guards removals; registration and
//! credentials belong to the storage collaborator. [`InMemoryRoster`]
//! stands in for that collaborator in the binary and in tests.

use std::sync::RwLock;
use serde::{Serialize, Deserialize};

use crate::core::ids::{MapId, PlayerId};
use crate::tournament::types::{GameMap, Player, Race};

/// Access to registered players and maps.
pub trait Roster: Send + Sync {
    /// Registered players in arrival order.
    fn players(&self) -> Vec<Player>;

    /// Registered maps.
    fn maps(&self) -> Vec<GameMap>;

    /// Delete a player. Returns true if the player existed.
    ///
    /// Only called through [`crate::service::TournamentService::remove_player`],
    /// which refuses players of the running tournament.
    fn remove_player(&self, id: PlayerId) -> bool;

    /// Delete a map. Games already formed keep their copy.
    fn remove_map(&self, id: MapId) -> bool;
}

/// Roster errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RosterError {
    /// Nickname is taken.
    #[error("nickname '{0}' is already registered")]
    DuplicateNickname(String),
    /// Map name is taken.
    #[error("map '{0}' already exists")]
    DuplicateMap(String),
}

/// Player entry in a roster seed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSeed {
    /// Public nickname.
    pub nickname: String,
    /// Real name.
    #[serde(default)]
    pub name: Option<String>,
    /// Race.
    pub race: Race,
}

/// Initial roster contents, as read from a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterSeed {
    /// Players in arrival order.
    #[serde(default)]
    pub players: Vec<PlayerSeed>,
    /// Map names.
    #[serde(default)]
    pub maps: Vec<String>,
}

#[derive(Debug, Default)]
struct RosterInner {
    players: Vec<Player>,
    maps: Vec<GameMap>,
    next_player_id: u64,
    next_map_id: u64,
}

/// In-memory roster with arrival-ordered players.
#[derive(Debug, Default)]
pub struct InMemoryRoster {
    inner: RwLock<RosterInner>,
}

impl InMemoryRoster {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a roster from seed data.
    pub fn from_seed(seed: &RosterSeed) -> Result<Self, RosterError> {
        let roster = Self::new();
        for p in &seed.players {
            roster.register_player(&p.nickname, p.name.as_deref(), p.race)?;
        }
        for name in &seed.maps {
            roster.add_map(name)?;
        }
        Ok(roster)
    }

    /// Register a player. Nicknames are unique.
    pub fn register_player(
        &self,
        nickname: &str,
        name: Option<&str>,
        race: Race,
    ) -> Result<Player, RosterError> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());

        if inner.players.iter().any(|p| p.nickname == nickname) {
            return Err(RosterError::DuplicateNickname(nickname.to_string()));
        }

        inner.next_player_id += 1;
        let player = Player {
            id: PlayerId::new(inner.next_player_id),
            nickname: nickname.to_string(),
            name: name.map(str::to_string),
            race,
        };
        inner.players.push(player.clone());
        Ok(player)
    }

    /// Add a map. Names are unique.
    pub fn add_map(&self, name: &str) -> Result<GameMap, RosterError> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());

        if inner.maps.iter().any(|m| m.name == name) {
            return Err(RosterError::DuplicateMap(name.to_string()));
        }

        inner.next_map_id += 1;
        let map = GameMap::new(MapId::new(inner.next_map_id), name);
        inner.maps.push(map.clone());
        Ok(map)
    }

    /// Look up a player by id.
    pub fn player(&self, id: PlayerId) -> Option<Player> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.players.iter().find(|p| p.id == id).cloned()
    }
}

impl Roster for InMemoryRoster {
    fn players(&self) -> Vec<Player> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).players.clone()
    }

    fn maps(&self) -> Vec<GameMap> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).maps.clone()
    }

    fn remove_player(&self, id: PlayerId) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let before = inner.players.len();
        inner.players.retain(|p| p.id != id);
        inner.players.len() != before
    }

    fn remove_map(&self, id: MapId) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let before = inner.maps.len();
        inner.maps.retain(|m| m.id != id);
        inner.maps.len() != before
    }
}
