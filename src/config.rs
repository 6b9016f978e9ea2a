use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::auth::{PasswordPolicy, DEFAULT_PASSWORD_LENGTH};

/// Runtime settings. Read from the environment after an optional `.env`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub audit_db_path: PathBuf,
    pub audit_log_path: PathBuf,
    pub password_policy: PasswordPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // A missing .env is fine; real env vars still apply.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = |key: &str, default: &str| PathBuf::from(lookup(key).unwrap_or_else(|| default.to_string()));

        let length = match lookup("GUPR_PASSWORD_LENGTH") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("GUPR_PASSWORD_LENGTH must be a number, got '{raw}'"))?,
            None => DEFAULT_PASSWORD_LENGTH,
        };

        Ok(Self {
            db_path: path("GUPR_DB_PATH", "system.db"),
            audit_db_path: path("GUPR_AUDIT_DB_PATH", "logger.db"),
            audit_log_path: path("GUPR_AUDIT_LOG_PATH", "rotations.log"),
            password_policy: PasswordPolicy::new(length)?,
        })
    }
}
