//! Environment-driven configuration

use anyhow::{bail, Context, Result};

pub const DEFAULT_PORT: u16 = 8083;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;
const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_expiration_minutes: i64,
    pub nats_url: Option<String>,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
    pub max_upload_bytes: usize,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt_secret = var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            bail!("JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} bytes long");
        }

        let port = parse_or(var("PORT"), "PORT", DEFAULT_PORT)?;
        let db_max_connections = parse_or(var("DB_MAX_CONNECTIONS"), "DB_MAX_CONNECTIONS", 10)?;
        let jwt_expiration_minutes = parse_or(var("JWT_EXPIRATION_MINUTES"), "JWT_EXPIRATION_MINUTES", 7 * 24 * 60)?;
        let max_upload_bytes = parse_or(var("MAX_UPLOAD_BYTES"), "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;

        let cors_origins = var("CORS_ORIGINS")
            .map(|v| v.split(',').map(str::trim).filter(|o| !o.is_empty()).map(String::from).collect())
            .unwrap_or_default();

        Ok(Self {
            database_url, port, db_max_connections, jwt_secret, jwt_expiration_minutes,
            nats_url: var("NATS_URL"),
            cors_origins,
            max_upload_bytes,
            admin_username: var("ADMIN_USERNAME"),
            admin_password: var("ADMIN_PASSWORD"),
        })
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> Result<T>
where T::Err: std::fmt::Display {
    match value {
        None => Ok(default),
        Some(v) => v.parse().map_err(|e| anyhow::anyhow!("invalid {key} {v:?}: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/storeops"), ("JWT_SECRET", SECRET)]).unwrap();
        assert_eq!(config.port, 8083);
        assert_eq!(config.db_max_connections, 10);
        assert_eq!(config.jwt_expiration_minutes, 10080);
        assert_eq!(config.max_upload_bytes, 100 * 1024 * 1024);
        assert!(config.cors_origins.is_empty());
        assert!(config.nats_url.is_none());
    }

    #[test]
    fn test_rejects_short_secret_and_bad_port() {
        assert!(load(&[("DATABASE_URL", "postgres://x"), ("JWT_SECRET", "short")]).is_err());
        assert!(load(&[("DATABASE_URL", "postgres://x"), ("JWT_SECRET", SECRET), ("PORT", "eighty")]).is_err());
        assert!(load(&[("JWT_SECRET", SECRET)]).is_err());
    }

    #[test]
    fn test_cors_list() {
        let config = load(&[
            ("DATABASE_URL", "postgres://x"), ("JWT_SECRET", SECRET),
            ("CORS_ORIGINS", "http://localhost:5173, https://ops.example.com,"),
        ]).unwrap();
        assert_eq!(config.cors_origins, vec!["http://localhost:5173", "https://ops.example.com"]);
    }
}
