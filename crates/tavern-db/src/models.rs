//! Database row types and workflow outcomes.
//! Rows map directly to SQLite columns; the `From` impls turn them into the
//! shared `tavern-types` models at the edge of this crate.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use tavern_types::models::{ChatMessage, Game, GameSystem, Participant, Profile, Roles};

pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub hash: String,
    pub filled_preferences: bool,
    pub registered_at: String,
    pub last_login: String,
}

impl UserRow {
    pub fn into_profile(self, roles: Roles) -> Profile {
        Profile {
            id: self.id,
            registered_at: parse_timestamp(&self.registered_at),
            last_login: parse_timestamp(&self.last_login),
            name: self.name,
            email: self.email,
            roles,
        }
    }
}

pub struct SystemRow {
    pub id: i64,
    pub title: String,
    pub abbreviation: Option<String>,
}

impl From<SystemRow> for GameSystem {
    fn from(row: SystemRow) -> Self {
        GameSystem {
            id: row.id,
            title: row.title,
            abbreviation: row.abbreviation,
        }
    }
}

/// A game post joined with its system and GM.
pub struct GameRow {
    pub id: i64,
    pub title: String,
    pub system_id: i64,
    pub system_title: String,
    pub system_abbreviation: Option<String>,
    pub max_players: i64,
    pub accepted_players: i64,
    pub description: Option<String>,
    pub gm_id: i64,
    pub gm_name: String,
    pub created_at: String,
}

impl From<GameRow> for Game {
    fn from(row: GameRow) -> Self {
        Game {
            id: row.id,
            created_at: parse_timestamp(&row.created_at),
            title: row.title,
            system_id: row.system_id,
            system: row.system_title,
            system_abbreviation: row.system_abbreviation,
            max_players: row.max_players,
            accepted_players: row.accepted_players,
            description: row.description,
            gm_id: row.gm_id,
            gm_name: row.gm_name,
        }
    }
}

pub struct ChatMessageRow {
    pub id: i64,
    pub chatroom_id: i64,
    pub user_id: i64,
    pub author_name: String,
    pub message: String,
    pub timestamp: String,
}

impl From<ChatMessageRow> for ChatMessage {
    fn from(row: ChatMessageRow) -> Self {
        ChatMessage {
            id: row.id,
            timestamp: parse_timestamp(&row.timestamp),
            author_id: row.user_id,
            author_name: row.author_name,
            message: row.message,
        }
    }
}

pub struct ParticipantRow {
    pub user_id: i64,
    pub name: String,
}

impl From<ParticipantRow> for Participant {
    fn from(row: ParticipantRow) -> Self {
        Participant {
            user_id: row.user_id,
            name: row.name,
        }
    }
}

pub struct NewGame {
    pub title: String,
    pub system_id: i64,
    pub max_players: i64,
    pub description: Option<String>,
    pub gm_id: i64,
}

/// Which `users` column a login identifier is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginColumn {
    Name,
    Email,
}

impl LoginColumn {
    /// Usernames can't contain `@`, so its presence means an email.
    pub fn for_identifier(identifier: &str) -> Self {
        if identifier.contains('@') {
            LoginColumn::Email
        } else {
            LoginColumn::Name
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateUserOutcome {
    Created(i64),
    /// Name or email already registered.
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateGameOutcome {
    Created(i64),
    UnknownSystem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied { chatroom_id: i64 },
    GameNotFound,
    OwnGame,
    NotPlayer,
    AlreadyApplied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostMessageOutcome {
    Posted,
    GameNotFound,
    NotAllowed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    Accepted,
    GameNotFound,
    NotGm,
    NotWaiting,
    GameFull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectOutcome {
    Rejected,
    GameNotFound,
    NotGm,
    NotWaiting,
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone;
/// they are always UTC.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn login_column_from_identifier() {
        assert_eq!(LoginColumn::for_identifier("frodo"), LoginColumn::Name);
        assert_eq!(LoginColumn::for_identifier("frodo@shire.pl"), LoginColumn::Email);
    }

    #[test]
    fn parses_sqlite_timestamps() {
        let ts = parse_timestamp("2024-05-01 18:30:05");
        assert_eq!((ts.year(), ts.month(), ts.day()), (2024, 5, 1));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (18, 30, 5));
    }

    #[test]
    fn corrupt_timestamp_falls_back_to_epoch() {
        assert_eq!(parse_timestamp("yesterday"), DateTime::<Utc>::default());
    }
}
