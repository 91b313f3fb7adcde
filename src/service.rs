//! Tournament Service
//!
//! Owns the current tournament. Admin commands are serialized through a
//! single writer lock and applied to a copy of the live record, which is
//! swapped in only when the whole transition succeeds. Readers see the
//! last committed `Arc<Tournament>` and never block a writer for long.
//!
//! Broadcasts happen after commit and while the writer lock is still held,
//! so subscribers observe transitions in commit order.

use std::sync::Arc;
use chrono::Utc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{info, instrument};

use crate::archive::record::{LogRecord, LogSummary};
use crate::archive::store::LogStore;
use crate::core::ids::{MapId, PlayerId, TournamentId};
use crate::network::protocol::{RefreshKind, TournamentEvent};
use crate::network::publisher::{EventPublisher, Published, DEFAULT_CHANNEL_CAPACITY};
use crate::tournament::matchmaker::Matchmaker;
use crate::tournament::roster::Roster;
use crate::tournament::snapshot::{project, TournamentSnapshot, Viewer, DEFAULT_RECENT_GAMES};
use crate::tournament::state::{Tournament, TournamentError};

/// Service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Recent games shown in snapshots.
    pub recent_games: usize,
    /// Fixed matchmaking seed (tests and replays). `None` seeds from entropy.
    pub map_seed: Option<u64>,
    /// Broadcast buffer per subscriber.
    pub channel_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            recent_games: DEFAULT_RECENT_GAMES,
            map_seed: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ServiceConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            recent_games: std::env::var("KOTH_RECENT_GAMES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.recent_games),
            map_seed: std::env::var("KOTH_MAP_SEED").ok().and_then(|v| v.parse().ok()),
            channel_capacity: defaults.channel_capacity,
        }
    }
}

/// Proof that the caller was authenticated as an admin.
///
/// Only built from a validated token, see
/// [`crate::network::auth::authorize_admin`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminIdentity {
    subject: String,
}

impl AdminIdentity {
    pub(crate) fn new(subject: impl Into<String>) -> Self {
        Self { subject: subject.into() }
    }

    /// Token subject.
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Downloadable rendering of a tournament log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedLog {
    /// Suggested file name.
    pub file_name: String,
    /// Plain-text content.
    pub content: String,
}

/// Writer-side state.
struct Ledger {
    matchmaker: Matchmaker,
    last_id: TournamentId,
}

/// Tournament service.
pub struct TournamentService {
    config: ServiceConfig,
    roster: Arc<dyn Roster>,
    logs: Arc<dyn LogStore>,
    publisher: EventPublisher,
    ledger: Mutex<Ledger>,
    current: RwLock<Option<Arc<Tournament>>>,
}

impl TournamentService {
    /// Create a service over a roster and a log store.
    pub fn new(config: ServiceConfig, roster: Arc<dyn Roster>, logs: Arc<dyn LogStore>) -> Self {
        let last_id = logs
            .list()
            .first()
            .map(|s| s.tournament_id)
            .unwrap_or(TournamentId::new(0));

        Self {
            publisher: EventPublisher::new(config.channel_capacity),
            ledger: Mutex::new(Ledger {
                matchmaker: Matchmaker::from_seed(config.map_seed),
                last_id,
            }),
            current: RwLock::new(None),
            config,
            roster,
            logs,
        }
    }

    /// Subscribe to committed transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<Published> {
        self.publisher.subscribe()
    }

    /// Last published revision.
    pub fn revision(&self) -> u64 {
        self.publisher.revision()
    }

    // =========================================================================
    // ADMIN COMMANDS
    // =========================================================================

    /// Start a tournament over the current roster.
    #[instrument(skip(self, admin), fields(admin = %admin.subject()))]
    pub async fn start_tournament(&self, admin: &AdminIdentity) -> Result<Arc<Tournament>, TournamentError> {
        let mut ledger = self.ledger.lock().await;

        if self.current.read().await.as_ref().is_some_and(|t| t.is_active()) {
            return Err(TournamentError::TournamentAlreadyActive);
        }

        let id = ledger.last_id.next();
        let tournament = Tournament::start(
            id,
            &self.roster.players(),
            &self.roster.maps(),
            &mut ledger.matchmaker,
            Utc::now(),
        )?;
        ledger.last_id = id;

        let opening = tournament
            .current_game
            .as_ref()
            .map(|g| (g.player1.id, g.player2.id));
        let tournament = self.commit(tournament).await;

        if let Some((player1, player2)) = opening {
            self.publisher.publish(&[TournamentEvent::TournamentStarted {
                tournament_id: id,
                player1,
                player2,
            }]);
        }

        info!(
            tournament_id = %id,
            participants = tournament.participants.len(),
            "Tournament started"
        );
        Ok(tournament)
    }

    /// Record the winner of the current game.
    ///
    /// With `expected_round`, the call fails with `StaleState` unless that
    /// round is the one being played.
    #[instrument(skip(self, admin), fields(admin = %admin.subject()))]
    pub async fn record_result(
        &self,
        admin: &AdminIdentity,
        winner_id: PlayerId,
        expected_round: Option<u32>,
    ) -> Result<Arc<Tournament>, TournamentError> {
        let mut ledger = self.ledger.lock().await;

        let mut next = match self.current.read().await.as_deref() {
            Some(t) => t.clone(),
            None => return Err(TournamentError::NoActiveGame),
        };
        let outcome = next.record_result(winner_id, expected_round, &mut ledger.matchmaker, Utc::now())?;
        let tournament = self.commit(next).await;

        let mut events = vec![TournamentEvent::GameResultRecorded {
            tournament_id: tournament.id,
            round: outcome.sealed.round,
            winner_id: outcome.sealed.winner.id,
            loser_id: outcome.sealed.loser.id,
            streak: outcome.sealed.streak,
            next_round: outcome.next.as_ref().map(|g| g.round),
        }];
        if outcome.finished() {
            events.push(TournamentEvent::TournamentFinished {
                tournament_id: tournament.id,
                winner_id: tournament.result.as_ref().map(|r| r.winner.id),
                ended_early: false,
            });
        }
        self.publisher.publish(&events);

        info!(
            tournament_id = %tournament.id,
            round = outcome.sealed.round,
            winner = %outcome.sealed.winner.nickname,
            streak = outcome.sealed.streak,
            finished = outcome.finished(),
            "Result recorded"
        );
        Ok(tournament)
    }

    /// End the running tournament early.
    #[instrument(skip(self, admin), fields(admin = %admin.subject()))]
    pub async fn end_tournament(&self, admin: &AdminIdentity) -> Result<Arc<Tournament>, TournamentError> {
        let _ledger = self.ledger.lock().await;

        let mut next = match self.current.read().await.as_deref() {
            Some(t) => t.clone(),
            None => return Err(TournamentError::NoActiveTournament),
        };
        next.end(Utc::now())?;
        let tournament = self.commit(next).await;

        self.publisher.publish(&[TournamentEvent::TournamentFinished {
            tournament_id: tournament.id,
            winner_id: tournament.result.as_ref().map(|r| r.winner.id),
            ended_early: true,
        }]);

        info!(
            tournament_id = %tournament.id,
            games = tournament.previous_games.len(),
            "Tournament ended"
        );
        Ok(tournament)
    }

    /// Delete a player from the roster.
    ///
    /// Refused while the player takes part in the running tournament.
    /// Returns whether the player existed.
    #[instrument(skip(self, admin), fields(admin = %admin.subject()))]
    pub async fn remove_player(&self, admin: &AdminIdentity, player_id: PlayerId) -> Result<bool, TournamentError> {
        let _ledger = self.ledger.lock().await;

        if let Some(t) = self.current.read().await.as_deref() {
            if t.is_active() && t.is_participant(player_id) {
                return Err(TournamentError::PlayerInActiveTournament(player_id));
            }
        }

        let removed = self.roster.remove_player(player_id);
        if removed {
            self.publisher.publish(&[TournamentEvent::RefreshRequired {
                kinds: vec![RefreshKind::Players],
            }]);
            info!(player_id = %player_id, "Player removed");
        }
        Ok(removed)
    }

    /// Delete a map from the roster. Formed games keep their copy.
    #[instrument(skip(self, admin), fields(admin = %admin.subject()))]
    pub async fn remove_map(&self, admin: &AdminIdentity, map_id: MapId) -> bool {
        let _ledger = self.ledger.lock().await;

        let removed = self.roster.remove_map(map_id);
        if removed {
            self.publisher.publish(&[TournamentEvent::RefreshRequired {
                kinds: vec![RefreshKind::Maps],
            }]);
            info!(map_id = %map_id, "Map removed");
        }
        removed
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Latest tournament (running or finished).
    pub async fn current_tournament(&self) -> Option<Arc<Tournament>> {
        self.current.read().await.clone()
    }

    /// Snapshot of the latest tournament for a viewer.
    pub async fn snapshot(&self, viewer: Viewer) -> TournamentSnapshot {
        let current = self.current_tournament().await;
        project(current.as_deref(), &self.roster.players(), viewer, self.config.recent_games)
    }

    /// Log of a tournament.
    ///
    /// The running tournament yields a provisional record.
    pub async fn tournament_log(&self, id: TournamentId) -> Result<LogRecord, TournamentError> {
        if let Some(record) = self.logs.get(id) {
            return Ok(record);
        }
        match self.current.read().await.as_deref() {
            Some(t) if t.id == id => Ok(LogRecord::capture(t)),
            _ => Err(TournamentError::NotFound(id)),
        }
    }

    /// Archived logs, most recent first.
    pub fn tournament_logs(&self) -> Vec<LogSummary> {
        self.logs.list()
    }

    /// Text rendering of a tournament log.
    pub async fn render_log(&self, id: TournamentId) -> Result<RenderedLog, TournamentError> {
        let record = self.tournament_log(id).await?;
        Ok(RenderedLog {
            file_name: record.file_name(),
            content: record.render_text(),
        })
    }

    /// Swap in a new committed record; archive it once finished.
    async fn commit(&self, tournament: Tournament) -> Arc<Tournament> {
        let tournament = Arc::new(tournament);
        if tournament.is_finished() {
            self.logs.save(LogRecord::capture(&tournament));
        }
        *self.current.write().await = Some(Arc::clone(&tournament));
        tournament
    }
}
