use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

/// Process configuration, read from `PARLEY_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    /// Base64 key or a raw 32-byte string.
    pub encryption_key: String,
    pub store_timeout: Duration,
    pub summary_timeout: Duration,
    pub outbound_buffer: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = lookup("PARLEY_JWT_SECRET").unwrap_or_else(|| {
            warn!("PARLEY_JWT_SECRET not set, using the development secret");
            DEV_JWT_SECRET.to_string()
        });
        let encryption_key =
            lookup("PARLEY_ENCRYPTION_KEY").context("PARLEY_ENCRYPTION_KEY must be set")?;

        Ok(Self {
            host: var("PARLEY_HOST", "0.0.0.0"),
            port: var("PARLEY_PORT", "3000").parse().context("PARLEY_PORT")?,
            db_path: PathBuf::from(var("PARLEY_DB_PATH", "parley.db")),
            jwt_secret,
            encryption_key,
            store_timeout: Duration::from_millis(
                var("PARLEY_STORE_TIMEOUT_MS", "5000")
                    .parse()
                    .context("PARLEY_STORE_TIMEOUT_MS")?,
            ),
            summary_timeout: Duration::from_millis(
                var("PARLEY_SUMMARY_TIMEOUT_MS", "10000")
                    .parse()
                    .context("PARLEY_SUMMARY_TIMEOUT_MS")?,
            ),
            outbound_buffer: var("PARLEY_OUTBOUND_BUFFER", "256")
                .parse()
                .context("PARLEY_OUTBOUND_BUFFER")?,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_the_key_is_set() {
        let config = Config::from_lookup(lookup(&[("PARLEY_ENCRYPTION_KEY", "k")])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, PathBuf::from("parley.db"));
        assert_eq!(config.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(config.store_timeout, Duration::from_secs(5));
        assert_eq!(config.summary_timeout, Duration::from_secs(10));
        assert_eq!(config.outbound_buffer, 256);
        assert_eq!(config.addr().unwrap().to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn encryption_key_is_required() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
    }

    #[test]
    fn bad_numbers_are_reported() {
        let vars = [("PARLEY_ENCRYPTION_KEY", "k"), ("PARLEY_PORT", "http")];
        let err = Config::from_lookup(lookup(&vars)).unwrap_err();
        assert!(err.to_string().contains("PARLEY_PORT"));
    }
}
