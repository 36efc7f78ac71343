use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A role a user can opt into from the preferences form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Player,
    Gm,
}

impl FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "player" => Ok(Role::Player),
            "gm" => Ok(Role::Gm),
            _ => Err(()),
        }
    }
}

/// The set of roles a user holds. Storage keeps one table per role; this is
/// the only shape the rest of the code sees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Roles {
    player: bool,
    gm: bool,
}

impl Roles {
    pub fn from_flags(player: bool, gm: bool) -> Self {
        Self { player, gm }
    }

    /// Build a set from raw form values, ignoring anything that isn't a role.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .filter_map(|name| name.as_ref().trim().parse::<Role>().ok())
            .fold(Self::default(), Self::with)
    }

    pub fn with(mut self, role: Role) -> Self {
        match role {
            Role::Player => self.player = true,
            Role::Gm => self.gm = true,
        }
        self
    }

    pub fn contains(&self, role: Role) -> bool {
        match role {
            Role::Player => self.player,
            Role::Gm => self.gm,
        }
    }

    pub fn is_player(&self) -> bool {
        self.player
    }

    pub fn is_gm(&self) -> bool {
        self.gm
    }

    pub fn is_empty(&self) -> bool {
        !self.player && !self.gm
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        [Role::Player, Role::Gm]
            .into_iter()
            .filter(|role| self.contains(*role))
    }
}

/// How a user relates to a particular game's chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Participation {
    Gm,
    Member,
    Waiting,
    Outsider,
}

impl Participation {
    /// Outsiders have no business reading or writing the chat.
    pub fn can_chat(&self) -> bool {
        !matches!(self, Participation::Outsider)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Profile {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub registered_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
    pub roles: Roles,
}

#[derive(Debug, Clone, Serialize)]
pub struct GameSystem {
    pub id: i64,
    pub title: String,
    pub abbreviation: Option<String>,
}

/// A posted session. Also the body of `GET /game_data/{id}`.
#[derive(Debug, Clone, Serialize)]
pub struct Game {
    pub id: i64,
    pub title: String,
    pub system_id: i64,
    pub system: String,
    pub system_abbreviation: Option<String>,
    pub max_players: i64,
    pub accepted_players: i64,
    pub description: Option<String>,
    pub gm_id: i64,
    pub gm_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: i64,
    pub author_id: i64,
    pub author_name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Participant {
    pub user_id: i64,
    pub name: String,
}
