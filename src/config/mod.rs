//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON lines instead of human-readable text
    pub log_json: bool,

    /// Shared key required to join, if any
    pub access_key: Option<String>,
    /// Allowed client origins for CORS; empty allows any origin
    pub client_origins: Vec<String>,

    /// Idle time after which a session is dropped
    pub session_ttl: Duration,
    /// Length of a match in seconds
    pub match_duration_secs: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            log_json: false,
            access_key: None,
            client_origins: Vec::new(),
            session_ttl: Duration::from_secs(35),
            match_duration_secs: 360.0,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match (env::var("PORT"), env::var("SERVER_ADDR")) {
            (Ok(port), _) => format!("0.0.0.0:{}", port)
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            (Err(_), Ok(addr)) => addr.parse().map_err(|_| ConfigError::InvalidAddress)?,
            (Err(_), Err(_)) => defaults.server_addr,
        };

        let session_ttl = parse_var::<u64>("SESSION_TTL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.session_ttl);

        let match_duration_secs = parse_var::<f32>("MATCH_DURATION_SECS")?
            .unwrap_or(defaults.match_duration_secs);

        Ok(Self {
            server_addr,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_json: env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")),

            access_key: env::var("ACCESS_KEY").ok().filter(|k| !k.is_empty()),
            client_origins: env::var("CLIENT_ORIGIN")
                .map(|origins| parse_origins(&origins))
                .unwrap_or_default(),

            session_ttl,
            match_duration_secs,
        })
    }
}

/// Split a comma-separated origin list
fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Parse an optional environment variable
fn parse_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_game_rules() {
        let config = Config::default();
        assert_eq!(config.session_ttl, Duration::from_secs(35));
        assert_eq!(config.match_duration_secs, 360.0);
        assert!(config.access_key.is_none());
    }

    #[test]
    fn origins_are_split_and_trimmed() {
        assert_eq!(
            parse_origins("https://a.example, https://b.example,,"),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(parse_origins("").is_empty());
    }
}
