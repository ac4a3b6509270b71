// src/config.rs

use std::{env, net::SocketAddr, str::FromStr, time::Duration};

use dotenvy::dotenv;

/// Engine settings, separate from the server's so tests can build them directly.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long an ended session stays queryable before it is retired.
    pub drain_period: Duration,
    /// Per-connection outbound queue length.
    pub outbound_buffer: usize,
    /// Advance as soon as every attached participant has answered.
    pub advance_when_all_answered: bool,
    /// Focus-loss strikes before a participant is flagged.
    pub proctor_strike_limit: u32,
}

impl EngineConfig {
    /// Capacity for a connection's outbound queue. Never zero.
    pub fn outbound_capacity(&self) -> usize {
        self.outbound_buffer.max(1)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            drain_period: Duration::from_secs(300),
            outbound_buffer: 64,
            advance_when_all_answered: false,
            proctor_strike_limit: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,
    pub bind_addr: SocketAddr,
    pub cors_origins: Vec<String>,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            drain_period: Duration::from_secs(env_or(
                "SESSION_DRAIN_SECS",
                defaults.drain_period.as_secs(),
            )),
            outbound_buffer: env_or("OUTBOUND_BUFFER", defaults.outbound_buffer),
            advance_when_all_answered: env_or(
                "ADVANCE_WHEN_ALL_ANSWERED",
                defaults.advance_when_all_answered,
            ),
            proctor_strike_limit: env_or("PROCTOR_STRIKE_LIMIT", defaults.proctor_strike_limit),
        };

        Self {
            database_url,
            jwt_secret,
            rust_log,
            bind_addr: env_or("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000))),
            cors_origins,
            engine,
        }
    }
}

/// Reads and parses an env var, falling back to `default` when unset or invalid.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_when_unset() {
        assert_eq!(env_or("EXAM_LIVE_TEST_UNSET_VAR", 42u32), 42);
    }

    #[test]
    fn engine_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.drain_period, Duration::from_secs(300));
        assert!(!cfg.advance_when_all_answered);
        assert_eq!(cfg.proctor_strike_limit, 2);
    }

    #[test]
    fn outbound_capacity_is_never_zero() {
        let cfg = EngineConfig {
            outbound_buffer: 0,
            ..EngineConfig::default()
        };
        assert_eq!(cfg.outbound_capacity(), 1);
        assert_eq!(EngineConfig::default().outbound_capacity(), 64);
    }
}
