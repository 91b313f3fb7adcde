//! Tournament Log Records
//!
//! Read-only history of a tournament: games in round order plus the
//! result summary, fingerprinted with a SHA-256 digest.

use std::fmt::Write as _;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Deserialize};

use crate::core::hash::{digest_hex, LogDigest, LogHasher};
use crate::core::ids::TournamentId;
use crate::tournament::state::Tournament;
use crate::tournament::streak;
use crate::tournament::types::{
    GameMap, Player, PreviousGame, TournamentResult, TournamentStatus,
};

/// Current log record version.
pub const LOG_VERSION: u8 = 1;

/// Archived tournament.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// Version for forward compatibility.
    pub version: u8,
    /// Tournament identifier.
    pub tournament_id: TournamentId,
    /// Status when captured (FINISHED for archived tournaments).
    pub status: TournamentStatus,
    /// Start timestamp.
    pub started_at: DateTime<Utc>,
    /// End timestamp.
    pub finished_at: Option<DateTime<Utc>>,
    /// Participants in arrival order.
    pub participants: Vec<Player>,
    /// Decided games in round order.
    pub games: Vec<PreviousGame>,
    /// Result summary.
    pub result: Option<TournamentResult>,
}

/// One line of the log listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSummary {
    /// Tournament identifier.
    pub tournament_id: TournamentId,
    /// End timestamp.
    pub finished_at: Option<DateTime<Utc>>,
    /// Final holder of the hill.
    pub winner: Option<Player>,
    /// Decided games.
    pub total_games: usize,
    /// Participants.
    pub total_participants: usize,
}

impl LogRecord {
    /// Capture a tournament.
    ///
    /// Unfinished tournaments get a provisional summary computed from the
    /// games decided so far; the live holder's streak is the streak of the
    /// last decided game, so it is already counted.
    pub fn capture(tournament: &Tournament) -> Self {
        let result = match tournament.status {
            TournamentStatus::Finished => tournament.result.clone(),
            _ => streak::summarize(&tournament.previous_games),
        };

        Self {
            version: LOG_VERSION,
            tournament_id: tournament.id,
            status: tournament.status,
            started_at: tournament.started_at,
            finished_at: tournament.finished_at,
            participants: tournament.participants.clone(),
            games: tournament.previous_games.clone(),
            result,
        }
    }

    /// Listing entry for this record.
    pub fn summary(&self) -> LogSummary {
        LogSummary {
            tournament_id: self.tournament_id,
            finished_at: self.finished_at,
            winner: self.result.as_ref().map(|r| r.winner.clone()),
            total_games: self.games.len(),
            total_participants: self.participants.len(),
        }
    }

    /// Digest over every field of the record, in declaration order.
    pub fn digest(&self) -> LogDigest {
        let mut h = LogHasher::for_tournament_log();
        h.update_u8(self.version);
        h.update_u64(self.tournament_id.0);
        h.update_str(&self.status.to_string());
        h.update_i64(self.started_at.timestamp_millis());
        h.update_option(self.finished_at, |h, t| h.update_i64(t.timestamp_millis()));

        h.update_u64(self.participants.len() as u64);
        for p in &self.participants {
            hash_player(&mut h, p);
        }

        h.update_u64(self.games.len() as u64);
        for g in &self.games {
            h.update_u32(g.round);
            hash_map(&mut h, &g.map);
            hash_player(&mut h, &g.winner);
            hash_player(&mut h, &g.loser);
            h.update_u32(g.streak);
        }

        h.update_option(self.result.as_ref(), |h, r| {
            hash_player(h, &r.winner);
            h.update_u32(r.winner_streak);
            h.update_u32(r.max_streak);
            h.update_u64(r.max_streak_players.len() as u64);
            for p in &r.max_streak_players {
                hash_player(h, p);
            }
        });

        h.finalize()
    }

    /// Downloadable plain-text rendering, ending in the record digest.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let ts = |t: &DateTime<Utc>| t.to_rfc3339_opts(SecondsFormat::Secs, true);

        // Writing to a String cannot fail.
        let _ = writeln!(out, "# King of the Hill tournament #{}", self.tournament_id);
        let _ = writeln!(out, "status: {}", self.status);
        let _ = writeln!(out, "started: {}", ts(&self.started_at));
        match self.finished_at {
            Some(ref t) => {
                let _ = writeln!(out, "finished: {}", ts(t));
            }
            None => {
                let _ = writeln!(out, "finished: -");
            }
        }

        let _ = writeln!(out, "\n## Participants ({})", self.participants.len());
        for p in &self.participants {
            let _ = writeln!(out, "- {}", describe(p));
        }

        let _ = writeln!(out, "\n## Games ({})", self.games.len());
        for g in &self.games {
            let _ = writeln!(
                out,
                "[round {}] {}: {} def. {} (streak {})",
                g.round,
                g.map.name,
                describe(&g.winner),
                describe(&g.loser),
                g.streak,
            );
        }

        let _ = writeln!(out, "\n## Result");
        match self.result {
            Some(ref r) => {
                let _ = writeln!(out, "winner: {} (streak {})", describe(&r.winner), r.winner_streak);
                let holders: Vec<&str> = r.max_streak_players.iter().map(|p| p.nickname.as_str()).collect();
                let _ = writeln!(out, "max streak: {} ({})", r.max_streak, holders.join(", "));
            }
            None => {
                let _ = writeln!(out, "no games were decided");
            }
        }

        let _ = writeln!(out, "\nsha256: {}", digest_hex(&self.digest()));
        out
    }

    /// Suggested download file name.
    pub fn file_name(&self) -> String {
        match self.finished_at {
            Some(t) => format!("tournament_{}_{}.log", self.tournament_id, t.timestamp()),
            None => format!("tournament_{}.log", self.tournament_id),
        }
    }
}

fn hash_player(h: &mut LogHasher, p: &Player) {
    h.update_u64(p.id.get());
    h.update_str(&p.nickname);
    h.update_option(p.name.as_deref(), |h, n| h.update_str(n));
    h.update_str(&p.race.to_string());
}

fn hash_map(h: &mut LogHasher, m: &GameMap) {
    h.update_u64(m.id.0);
    h.update_str(&m.name);
}

fn describe(p: &Player) -> String {
    match p.name {
        Some(ref name) => format!("{} [{}] ({})", p.nickname, p.race, name),
        None => format!("{} [{}]", p.nickname, p.race),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::{MapId, PlayerId};
    use crate::tournament::matchmaker::Matchmaker;
    use crate::tournament::types::Race;

    fn finished_tournament() -> Tournament {
        let roster = vec![
            Player::new(PlayerId::new(1), "alpha", Race::Protoss).with_name("Kim"),
            Player::new(PlayerId::new(2), "bravo", Race::Terran),
            Player::new(PlayerId::new(3), "charlie", Race::Zerg),
        ];
        let maps = vec![GameMap::new(MapId::new(1), "Fighting Spirit")];
        let mut mm = Matchmaker::with_seed(5);
        let mut t = Tournament::start(TournamentId::new(4), &roster, &maps, &mut mm, Utc::now()).unwrap();
        t.record_result(PlayerId::new(1), None, &mut mm, Utc::now()).unwrap();
        t.record_result(PlayerId::new(1), None, &mut mm, Utc::now()).unwrap();
        t
    }

    #[test]
    fn test_capture_finished() {
        let t = finished_tournament();
        let record = LogRecord::capture(&t);

        assert_eq!(record.status, TournamentStatus::Finished);
        assert_eq!(record.games.len(), 2);
        assert_eq!(record.result, t.result);

        let summary = record.summary();
        assert_eq!(summary.total_games, 2);
        assert_eq!(summary.total_participants, 3);
        assert_eq!(summary.winner.unwrap().nickname, "alpha");
    }

    #[test]
    fn test_capture_in_progress_has_provisional_result() {
        let roster = vec![
            Player::new(PlayerId::new(1), "alpha", Race::Protoss),
            Player::new(PlayerId::new(2), "bravo", Race::Terran),
            Player::new(PlayerId::new(3), "charlie", Race::Zerg),
        ];
        let maps = vec![GameMap::new(MapId::new(1), "Fighting Spirit")];
        let mut mm = Matchmaker::with_seed(5);
        let mut t = Tournament::start(TournamentId::new(1), &roster, &maps, &mut mm, Utc::now()).unwrap();
        t.record_result(PlayerId::new(2), None, &mut mm, Utc::now()).unwrap();

        let record = LogRecord::capture(&t);
        let result = record.result.unwrap();
        assert_eq!(result.winner.id, PlayerId::new(2));
        assert_eq!(result.max_streak, 1);
    }

    #[test]
    fn test_digest_tracks_content() {
        let record = LogRecord::capture(&finished_tournament());
        assert_eq!(record.digest(), record.clone().digest());

        let mut tampered = record.clone();
        tampered.games[0].streak = 9;
        assert_ne!(record.digest(), tampered.digest());
    }

    #[test]
    fn test_render_text() {
        let record = LogRecord::capture(&finished_tournament());
        let text = record.render_text();

        assert!(text.contains("tournament #4"));
        assert!(text.contains("status: FINISHED"));
        assert!(text.contains("[round 1] Fighting Spirit: alpha [PROTOSS] (Kim) def. bravo [TERRAN] (streak 1)"));
        assert!(text.contains("[round 2]"));
        assert!(text.contains("max streak: 2 (alpha)"));
        assert!(text.contains(&format!("sha256: {}", digest_hex(&record.digest()))));
        assert!(record.file_name().starts_with("tournament_4_"));
    }

    #[test]
    fn test_json_layout() {
        let record = LogRecord::capture(&finished_tournament());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["tournamentId"], 4);
        assert_eq!(json["games"][1]["streak"], 2);
        assert_eq!(json["result"]["maxStreakPlayers"][0]["nickname"], "alpha");
        assert!(json["result"].get("maxStreakPlayer").is_none());
    }
}
