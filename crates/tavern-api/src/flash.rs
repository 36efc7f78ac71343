//! One-shot messages carried across a redirect in a cookie.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use serde::{Deserialize, Serialize};

pub const FLASH_COOKIE: &str = "tavern_flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub level: Level,
    pub message: String,
}

/// Queue a message for the next rendered page. A newer message replaces an
/// unread one.
pub fn push(jar: CookieJar, level: Level, message: impl Into<String>) -> CookieJar {
    let flash = Flash {
        level,
        message: message.into(),
    };
    jar.add(
        Cookie::build((FLASH_COOKIE, encode(&flash)))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax),
    )
}

/// Pop the pending message, if any, and expire the cookie.
pub fn take(jar: CookieJar) -> (CookieJar, Option<Flash>) {
    let Some(value) = jar.get(FLASH_COOKIE).map(|c| c.value().to_string()) else {
        return (jar, None);
    };
    let jar = jar.remove(Cookie::build(FLASH_COOKIE).path("/"));
    (jar, decode(&value))
}

pub fn encode(flash: &Flash) -> String {
    B64.encode(serde_json::to_vec(flash).unwrap_or_default())
}

/// Tampered or stale cookies decode to nothing.
pub fn decode(value: &str) -> Option<Flash> {
    let bytes = B64.decode(value).ok()?;
    serde_json::from_slice(&bytes).ok()
}
