//! Server configuration loaded from environment variables.
//!
//! Everything except the token signing secret has a default suitable for
//! local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

/// Secrets that ship in sample env files and must never reach production.
const PLACEHOLDER_SECRETS: &[&str] = &["", "changeme", "change-me", "dev-secret-change-me", "secret"];

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to.
    /// Env: `BAZAAR_HOST` and `BAZAAR_PORT`
    /// Default: `0.0.0.0:3000`
    pub addr: SocketAddr,

    /// SQLite database file.
    /// Env: `BAZAAR_DB_PATH`
    /// Default: `bazaar.db`
    pub db_path: PathBuf,

    /// Root directory for uploaded objects, one subdirectory per bucket.
    /// Env: `BAZAAR_STORAGE_DIR`
    /// Default: `./storage`
    pub storage_dir: PathBuf,

    /// Externally visible base URL, used to build public object URLs.
    /// Env: `BAZAAR_PUBLIC_URL`
    /// Default: `http://localhost:3000`
    pub public_url: String,

    /// HS256 signing secret for bearer tokens.
    /// Env: `BAZAAR_JWT_SECRET` (required)
    pub jwt_secret: String,

    /// Restrict registration to one email domain, e.g. `campus.edu`.
    /// Env: `BAZAAR_EMAIL_DOMAIN`
    /// Default: unset
    pub email_domain: Option<String>,

    /// Seconds between featured-listing expiry sweeps.
    /// Env: `BAZAAR_FEATURE_SWEEP_SECS`
    /// Default: `3600`
    pub feature_sweep_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = var("BAZAAR_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = match var("BAZAAR_PORT") {
            Some(p) => p.parse().with_context(|| format!("invalid BAZAAR_PORT: {p}"))?,
            None => 3000,
        };
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid BAZAAR_HOST: {host}"))?;

        let jwt_secret = var("BAZAAR_JWT_SECRET").context("BAZAAR_JWT_SECRET must be set")?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.trim()) {
            bail!("BAZAAR_JWT_SECRET is a placeholder value; set a real secret");
        }

        let feature_sweep_secs = match var("BAZAAR_FEATURE_SWEEP_SECS") {
            Some(v) => match v.parse::<u64>() {
                Ok(n) if n > 0 => n,
                _ => {
                    tracing::warn!(value = %v, "Invalid BAZAAR_FEATURE_SWEEP_SECS, using default");
                    3600
                }
            },
            None => 3600,
        };

        Ok(Self {
            addr,
            db_path: PathBuf::from(var("BAZAAR_DB_PATH").unwrap_or_else(|| "bazaar.db".into())),
            storage_dir: PathBuf::from(var("BAZAAR_STORAGE_DIR").unwrap_or_else(|| "./storage".into())),
            public_url: var("BAZAAR_PUBLIC_URL").unwrap_or_else(|| "http://localhost:3000".into()),
            jwt_secret,
            email_domain: var("BAZAAR_EMAIL_DOMAIN")
                .map(|d| d.trim().trim_start_matches('@').to_lowercase())
                .filter(|d| !d.is_empty()),
            feature_sweep_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_with_only_a_secret() {
        let config = load(&[("BAZAAR_JWT_SECRET", "s3cr3t-for-tests")]).unwrap();
        assert_eq!(config.addr, ([0, 0, 0, 0], 3000).into());
        assert_eq!(config.db_path, PathBuf::from("bazaar.db"));
        assert_eq!(config.storage_dir, PathBuf::from("./storage"));
        assert_eq!(config.public_url, "http://localhost:3000");
        assert_eq!(config.email_domain, None);
        assert_eq!(config.feature_sweep_secs, 3600);
    }

    #[test]
    fn secret_is_required_and_not_a_placeholder() {
        assert!(load(&[]).is_err());
        assert!(load(&[("BAZAAR_JWT_SECRET", "dev-secret-change-me")]).is_err());
    }

    #[test]
    fn overrides_are_applied() {
        let config = load(&[
            ("BAZAAR_JWT_SECRET", "s3cr3t-for-tests"),
            ("BAZAAR_HOST", "127.0.0.1"),
            ("BAZAAR_PORT", "8081"),
            ("BAZAAR_EMAIL_DOMAIN", "@Campus.edu"),
            ("BAZAAR_FEATURE_SWEEP_SECS", "60"),
        ])
        .unwrap();
        assert_eq!(config.addr, ([127, 0, 0, 1], 8081).into());
        assert_eq!(config.email_domain.as_deref(), Some("campus.edu"));
        assert_eq!(config.feature_sweep_secs, 60);
    }

    #[test]
    fn bad_port_is_an_error() {
        assert!(load(&[("BAZAAR_JWT_SECRET", "s3cr3t-for-tests"), ("BAZAAR_PORT", "http")]).is_err());
    }
}
