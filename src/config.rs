use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::{anyhow, Context};
use chrono::Duration;

const DEFAULT_ADMIN_PASSWORD: &str = "0000";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// `None` runs against the in-memory store.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub run_migrations: bool,
    pub admin_password: String,
    pub session_ttl: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let admin_password = match lookup("KIOSK_ADMIN_PASSWORD") {
            Some(password) if !password.is_empty() => password,
            _ => {
                log::warn!("KIOSK_ADMIN_PASSWORD not set, using the factory default");
                DEFAULT_ADMIN_PASSWORD.to_string()
            }
        };
        let ttl_hours: i64 = parse_or(&lookup, "KIOSK_SESSION_TTL_HOURS", 12)?;
        if ttl_hours <= 0 {
            return Err(anyhow!("KIOSK_SESSION_TTL_HOURS must be positive"));
        }

        Ok(Self {
            bind_addr: parse_or(
                &lookup,
                "KIOSK_BIND_ADDR",
                SocketAddr::from(([127, 0, 0, 1], 3000)),
            )?,
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            max_connections: parse_or(&lookup, "KIOSK_DB_MAX_CONNECTIONS", 5)?,
            run_migrations: parse_or(&lookup, "KIOSK_RUN_MIGRATIONS", true)?,
            admin_password,
            session_ttl: Duration::hours(ttl_hours),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{}", e))
            .with_context(|| format!("invalid {} value `{}`", key, raw)),
        None => Ok(default),
    }
}
