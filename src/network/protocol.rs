//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! All frames are JSON text. Broadcast bodies are themselves JSON encoded
//! into a string, so subscribers can fall back to the raw text when a
//! body does not parse.

use serde::{Serialize, Deserialize};

use crate::archive::record::{LogRecord, LogSummary};
use crate::core::ids::{PlayerId, TournamentId};
use crate::tournament::snapshot::TournamentSnapshot;
use crate::tournament::state::{Tournament, TournamentError};

// =============================================================================
// TOPICS
// =============================================================================

/// Broadcast topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    /// Tournament started or finished.
    TournamentStateChanged,
    /// A game result was recorded.
    GameResultRecorded,
    /// Viewers should re-fetch some data.
    RefreshRequired,
}

impl Topic {
    /// Every topic.
    pub const ALL: [Topic; 3] = [
        Topic::TournamentStateChanged,
        Topic::GameResultRecorded,
        Topic::RefreshRequired,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::TournamentStateChanged => "tournament-state-changed",
            Topic::GameResultRecorded => "game-result-recorded",
            Topic::RefreshRequired => "refresh-required",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical data domains a viewer may need to re-fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshKind {
    /// Current tournament snapshot.
    Tournament,
    /// Player roster.
    Players,
    /// Map roster.
    Maps,
    /// Archived logs.
    Logs,
}

// =============================================================================
// BROADCAST EVENTS
// =============================================================================

/// Broadcast event bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TournamentEvent {
    /// A tournament started; round 1 is formed.
    TournamentStarted {
        tournament_id: TournamentId,
        player1: PlayerId,
        player2: PlayerId,
    },

    /// A game was decided.
    GameResultRecorded {
        tournament_id: TournamentId,
        round: u32,
        winner_id: PlayerId,
        loser_id: PlayerId,
        streak: u32,
        /// Round formed next, if any.
        next_round: Option<u32>,
    },

    /// A tournament finished.
    TournamentFinished {
        tournament_id: TournamentId,
        winner_id: Option<PlayerId>,
        /// Ended by an admin before the ladder was exhausted.
        ended_early: bool,
    },

    /// Something outside the ladder changed.
    RefreshRequired {
        kinds: Vec<RefreshKind>,
    },
}

impl TournamentEvent {
    /// Topic this event is published on.
    pub fn topic(&self) -> Topic {
        match self {
            TournamentEvent::TournamentStarted { .. }
            | TournamentEvent::TournamentFinished { .. } => Topic::TournamentStateChanged,
            TournamentEvent::GameResultRecorded { .. } => Topic::GameResultRecorded,
            TournamentEvent::RefreshRequired { .. } => Topic::RefreshRequired,
        }
    }

    /// Data domains invalidated by this event.
    pub fn refresh_kinds(&self) -> Vec<RefreshKind> {
        match self {
            TournamentEvent::TournamentStarted { .. }
            | TournamentEvent::GameResultRecorded { .. } => vec![RefreshKind::Tournament],
            TournamentEvent::TournamentFinished { .. } => {
                vec![RefreshKind::Tournament, RefreshKind::Logs]
            }
            TournamentEvent::RefreshRequired { kinds } => kinds.clone(),
        }
    }
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
///
/// Admin commands carry a signed token; see [`crate::network::auth`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving a topic.
    Subscribe { topic: Topic },

    /// Stop receiving a topic.
    Unsubscribe { topic: Topic },

    /// Fetch the current snapshot. Admin tokens unlock real names.
    GetCurrentTournament {
        #[serde(default)]
        token: Option<String>,
    },

    /// Fetch an archived log (admin).
    GetTournamentLog {
        tournament_id: TournamentId,
        token: String,
    },

    /// Fetch the text rendering of an archived log (admin).
    DownloadTournamentLog {
        tournament_id: TournamentId,
        token: String,
    },

    /// List archived logs (admin).
    ListTournamentLogs { token: String },

    /// Start a tournament (admin).
    StartTournament { token: String },

    /// Record the current game's winner (admin).
    RecordResult {
        token: String,
        winner_id: PlayerId,
        /// Round the admin was looking at.
        #[serde(default)]
        expected_round: Option<u32>,
    },

    /// End the running tournament (admin).
    EndTournament { token: String },

    /// Remove a player from the roster (admin).
    RemovePlayer {
        token: String,
        player_id: PlayerId,
    },

    /// Ping for latency measurement.
    Ping { timestamp: u64 },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Broadcast on a subscribed topic.
    Event {
        topic: Topic,
        /// Shared by every message produced by one transition.
        revision: u64,
        /// JSON-encoded [`TournamentEvent`].
        body: String,
    },

    /// Subscription acknowledged.
    Subscribed { topic: Topic },

    /// Unsubscription acknowledged.
    Unsubscribed { topic: Topic },

    /// Current snapshot.
    Snapshot { snapshot: TournamentSnapshot },

    /// Tournament after an admin command.
    Tournament { tournament: Tournament },

    /// Archived log.
    Log { record: LogRecord },

    /// Text rendering of an archived log.
    LogFile {
        tournament_id: TournamentId,
        file_name: String,
        content: String,
    },

    /// Archived log listing.
    Logs { logs: Vec<LogSummary> },

    /// Player removed from the roster.
    PlayerRemoved { player_id: PlayerId, existed: bool },

    /// Pong response.
    Pong { timestamp: u64, server_time: u64 },

    /// Error message.
    Error(ServerError),

    /// Server is closing this connection.
    Shutdown { reason: String },
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Create an error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed frame.
    InvalidInput,
    /// Missing or rejected admin token.
    Unauthorized,
    /// Fewer than two players.
    InsufficientPlayers,
    /// A tournament is already running.
    TournamentAlreadyActive,
    /// No maps registered.
    NoMapsAvailable,
    /// No game waiting for a result.
    NoActiveGame,
    /// No tournament running.
    NoActiveTournament,
    /// Winner not in the current game.
    InvalidWinner,
    /// Result for an outdated round.
    StaleState,
    /// Unknown tournament.
    NotFound,
    /// Player is in the running tournament.
    PlayerInActiveTournament,
    /// Out-of-order status transition.
    InvalidTransition,
    /// Connection limit reached.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

impl From<&TournamentError> for ServerError {
    fn from(err: &TournamentError) -> Self {
        let code = match err {
            TournamentError::InsufficientPlayers { .. } => ErrorCode::InsufficientPlayers,
            TournamentError::TournamentAlreadyActive => ErrorCode::TournamentAlreadyActive,
            TournamentError::NoMapsAvailable => ErrorCode::NoMapsAvailable,
            TournamentError::NoActiveGame => ErrorCode::NoActiveGame,
            TournamentError::NoActiveTournament => ErrorCode::NoActiveTournament,
            TournamentError::InvalidWinner { .. } => ErrorCode::InvalidWinner,
            TournamentError::StaleState { .. } => ErrorCode::StaleState,
            TournamentError::NotFound(_) => ErrorCode::NotFound,
            TournamentError::PlayerInActiveTournament(_) => ErrorCode::PlayerInActiveTournament,
            TournamentError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
        };
        Self::new(code, err.to_string())
    }
}

impl From<TournamentError> for ServerError {
    fn from(err: TournamentError) -> Self {
        Self::from(&err)
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_wire_names() {
        for topic in Topic::ALL {
            let json = serde_json::to_string(&topic).unwrap();
            assert_eq!(json, format!("\"{}\"", topic.as_str()));
        }
    }

    #[test]
    fn test_client_message_json() {
        let msg = ClientMessage::from_json(
            r#"{"type":"record_result","token":"t","winner_id":3,"expected_round":2}"#,
        )
        .unwrap();

        if let ClientMessage::RecordResult { winner_id, expected_round, .. } = msg {
            assert_eq!(winner_id, PlayerId::new(3));
            assert_eq!(expected_round, Some(2));
        } else {
            panic!("Wrong message type");
        }

        // expected_round is optional
        let msg = ClientMessage::from_json(r#"{"type":"record_result","token":"t","winner_id":3}"#).unwrap();
        assert!(matches!(msg, ClientMessage::RecordResult { expected_round: None, .. }));

        let msg = ClientMessage::from_json(r#"{"type":"subscribe","topic":"game-result-recorded"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Subscribe { topic: Topic::GameResultRecorded }));
    }

    #[test]
    fn test_event_bodies_carry_legacy_markers() {
        let started = TournamentEvent::TournamentStarted {
            tournament_id: TournamentId::new(1),
            player1: PlayerId::new(1),
            player2: PlayerId::new(2),
        };
        let body = serde_json::to_string(&started).unwrap();
        assert!(body.contains("tournament_started"));
        assert_eq!(started.topic(), Topic::TournamentStateChanged);

        let finished = TournamentEvent::TournamentFinished {
            tournament_id: TournamentId::new(1),
            winner_id: None,
            ended_early: true,
        };
        assert!(serde_json::to_string(&finished).unwrap().contains("tournament_finished"));
        assert_eq!(finished.refresh_kinds(), vec![RefreshKind::Tournament, RefreshKind::Logs]);
    }

    #[test]
    fn test_server_event_frame() {
        let msg = ServerMessage::Event {
            topic: Topic::RefreshRequired,
            revision: 12,
            body: "refresh_required".to_string(),
        };
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""type":"event""#));
        assert!(json.contains(r#""topic":"refresh-required""#));

        let parsed = ServerMessage::from_json(&json).unwrap();
        assert!(matches!(parsed, ServerMessage::Event { revision: 12, .. }));
    }

    #[test]
    fn test_error_codes() {
        let err = TournamentError::InvalidWinner { winner: PlayerId::new(9), round: 2 };
        let server_err = ServerError::from(&err);
        assert_eq!(server_err.code, ErrorCode::InvalidWinner);
        assert!(server_err.message.contains("round 2"));

        let json = ServerMessage::Error(server_err).to_json().unwrap();
        assert!(json.contains("invalid_winner"));
    }

    #[test]
    fn test_snapshot_frame_roundtrip() {
        let msg = ServerMessage::Snapshot {
            snapshot: TournamentSnapshot::NoTournament { registered_players: 0, can_start: false },
        };
        let parsed = ServerMessage::from_json(&msg.to_json().unwrap()).unwrap();
        if let ServerMessage::Snapshot { snapshot } = parsed {
            assert!(snapshot.view().is_none());
        } else {
            panic!("Wrong message type");
        }
    }
}
