use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use tavern_types::api::Claims;
use tavern_types::models::Roles;

use crate::error::AppError;

pub const SESSION_COOKIE: &str = "tavern_session";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secret: String,
    pub ttl_hours: i64,
    /// Mark the cookie `Secure` (production behind TLS).
    pub secure: bool,
}

pub fn create_token(
    config: &SessionConfig,
    user_id: i64,
    name: &str,
    roles: Roles,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        name: name.to_string(),
        gm: roles.is_gm(),
        player: roles.is_player(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(config.ttl_hours)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn decode_token(config: &SessionConfig, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

/// The logged-in user, if the cookie carries a valid unexpired token.
pub fn current(jar: &CookieJar, config: &SessionConfig) -> Option<Claims> {
    let token = jar.get(SESSION_COOKIE)?;
    decode_token(config, token.value())
}

/// Issue (or re-issue) the session cookie. No max-age: it dies with the
/// browser session, the token expiry bounds it otherwise.
pub fn start(
    jar: CookieJar,
    config: &SessionConfig,
    user_id: i64,
    name: &str,
    roles: Roles,
) -> Result<CookieJar, AppError> {
    let token = create_token(config, user_id, name, roles)?;
    Ok(jar.add(
        Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .secure(config.secure)
            .same_site(SameSite::Lax),
    ))
}

pub fn end(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secret: &str) -> SessionConfig {
        SessionConfig {
            secret: secret.into(),
            ttl_hours: 1,
            secure: false,
        }
    }

    #[test]
    fn token_round_trip() {
        let config = config("test-secret");
        let token = create_token(&config, 7, "eowyn", Roles::from_flags(true, false)).unwrap();

        let claims = decode_token(&config, &token).expect("valid token");
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.name, "eowyn");
        assert!(claims.player);
        assert!(!claims.gm);
    }

    #[test]
    fn foreign_secret_rejected() {
        let token = create_token(&config("one"), 1, "x", Roles::default()).unwrap();
        assert!(decode_token(&config("two"), &token).is_none());
    }

    #[test]
    fn expired_token_rejected() {
        let mut expired = config("test-secret");
        expired.ttl_hours = -2;
        let token = create_token(&expired, 1, "x", Roles::default()).unwrap();
        assert!(decode_token(&expired, &token).is_none());
    }

    #[test]
    fn cookie_jar_round_trip() {
        let config = config("test-secret");
        let jar = start(CookieJar::new(), &config, 3, "faramir", Roles::from_flags(true, true)).unwrap();
        let claims = current(&jar, &config).expect("session present");
        assert!(claims.gm);

        let jar = end(jar);
        assert!(current(&jar, &config).is_none());
    }
}
