//! Server configuration loaded from environment variables.
//!
//! Everything has a default so a development server starts with no setup.
//! Production refuses to start without a real session secret.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};
use tracing::warn;

const DEV_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Env: `TAVERN_HOST`, default `0.0.0.0`
    pub host: String,

    /// Env: `TAVERN_PORT`, default `3000`
    pub port: u16,

    /// Env: `TAVERN_DB_PATH`, default `tavern.db`
    pub db_path: PathBuf,

    /// HS256 key for the session cookie.
    /// Env: `TAVERN_SESSION_SECRET`
    pub session_secret: String,

    /// Env: `TAVERN_SESSION_HOURS`, default `12`
    pub session_hours: i64,

    /// Env: `TAVERN_ENV` (`development` | `production`)
    pub environment: Environment,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            db_path: PathBuf::from("tavern.db"),
            session_secret: DEV_SECRET.to_string(),
            session_hours: 12,
            environment: Environment::Development,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Some(host) = var("TAVERN_HOST") {
            config.host = host;
        }

        if let Some(port) = var("TAVERN_PORT") {
            config.port = port
                .parse()
                .with_context(|| format!("invalid TAVERN_PORT {:?}", port))?;
        }

        if let Some(path) = var("TAVERN_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        if let Some(secret) = var("TAVERN_SESSION_SECRET").filter(|s| !s.is_empty()) {
            config.session_secret = secret;
        }

        if let Some(hours) = var("TAVERN_SESSION_HOURS") {
            match hours.parse::<i64>() {
                Ok(n) if n > 0 => config.session_hours = n,
                _ => warn!(value = %hours, "Invalid TAVERN_SESSION_HOURS, using default"),
            }
        }

        if let Some(env) = var("TAVERN_ENV") {
            config.environment = match env.to_ascii_lowercase().as_str() {
                "production" | "prod" => Environment::Production,
                "development" | "dev" => Environment::Development,
                other => bail!("unknown TAVERN_ENV {:?}", other),
            };
        }

        if config.session_secret == DEV_SECRET {
            if config.is_production() {
                bail!("TAVERN_SESSION_SECRET must be set in production");
            }
            warn!("Using the development session secret");
        }

        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, PathBuf::from("tavern.db"));
        assert_eq!(config.session_hours, 12);
        assert!(!config.is_production());
        assert_eq!(config.addr().unwrap().to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn overrides() {
        let config = load(&[
            ("TAVERN_HOST", "127.0.0.1"),
            ("TAVERN_PORT", "8080"),
            ("TAVERN_DB_PATH", "/var/lib/tavern/board.db"),
            ("TAVERN_SESSION_SECRET", "s3cr3t"),
            ("TAVERN_SESSION_HOURS", "2"),
        ])
        .unwrap();
        assert_eq!(config.addr().unwrap().to_string(), "127.0.0.1:8080");
        assert_eq!(config.db_path, PathBuf::from("/var/lib/tavern/board.db"));
        assert_eq!(config.session_secret, "s3cr3t");
        assert_eq!(config.session_hours, 2);
    }

    #[test]
    fn bad_session_hours_fall_back() {
        let config = load(&[("TAVERN_SESSION_HOURS", "-1")]).unwrap();
        assert_eq!(config.session_hours, 12);
    }

    #[test]
    fn bad_port_is_an_error() {
        assert!(load(&[("TAVERN_PORT", "http")]).is_err());
        assert!(load(&[("TAVERN_ENV", "staging")]).is_err());
    }

    #[test]
    fn production_needs_real_secret() {
        assert!(load(&[("TAVERN_ENV", "production")]).is_err());
        assert!(load(&[("TAVERN_ENV", "production"), ("TAVERN_SESSION_SECRET", "")]).is_err());

        let config = load(&[("TAVERN_ENV", "production"), ("TAVERN_SESSION_SECRET", "s3cr3t")]).unwrap();
        assert!(config.is_production());
    }
}
