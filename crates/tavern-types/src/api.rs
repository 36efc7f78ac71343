use serde::{Deserialize, Serialize};

use crate::models::Roles;

// -- Session --

/// Claims carried by the signed session cookie.
///
/// `gm` and `player` mirror the role tables at the time the token was issued;
/// handlers that authorize on a role re-read it from the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub name: String,
    pub gm: bool,
    pub player: bool,
    pub exp: usize,
}

impl Claims {
    pub fn roles(&self) -> Roles {
        Roles::from_flags(self.player, self.gm)
    }
}

// -- Auth --

#[derive(Debug, Default, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirmation: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    /// Username or email; an `@` selects the email column.
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    pub next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub next: Option<String>,
}

// -- Preferences --

#[derive(Debug, Default, Deserialize)]
pub struct PreferencesForm {
    #[serde(default)]
    pub roles: Vec<String>,
}

// -- Games --

#[derive(Debug, Default, Deserialize)]
pub struct PostGameForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub players: String,
    pub description: Option<String>,
}

// -- Chat --

#[derive(Debug, Default, Deserialize)]
pub struct ApplyForm {
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatMessageForm {
    #[serde(default)]
    pub message: String,
}

// -- Misc --

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}
