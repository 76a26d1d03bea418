//! Password gate in front of the console.
//!
//! The configured secret is a SHA-256 hex digest, never the password itself.
//! A successful unlock writes the current time to a flag file; the gate stays
//! open while that timestamp is younger than [`AUTH_TTL_HOURS`].

use chrono::{DateTime, TimeDelta, Utc};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_AUTH_FILE: &str = "bot-console.auth";
pub const AUTH_TTL_HOURS: i64 = 24;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no password digest configured, set BOT_CONSOLE_PASSWORD_SHA256")]
    NotConfigured,

    #[error("invalid password digest: expected 64 hex characters")]
    InvalidDigest,

    #[error("password rejected")]
    Rejected,

    #[error("auth flag file {path}: {source}")]
    Flag {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct AuthGate {
    digest: Option<[u8; 32]>,
    flag_path: PathBuf,
    ttl: TimeDelta,
}

impl AuthGate {
    pub fn new(digest_hex: Option<&str>, flag_path: impl Into<PathBuf>) -> Result<Self, AuthError> {
        let digest = digest_hex
            .map(str::trim)
            .filter(|digest| !digest.is_empty())
            .map(parse_digest)
            .transpose()?;

        Ok(Self {
            digest,
            flag_path: flag_path.into(),
            ttl: TimeDelta::hours(AUTH_TTL_HOURS),
        })
    }

    /// Resolve from `BOT_CONSOLE_PASSWORD_SHA256` and `BOT_CONSOLE_AUTH_FILE`.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let digest = lookup("BOT_CONSOLE_PASSWORD_SHA256");
        let flag_path = lookup("BOT_CONSOLE_AUTH_FILE").unwrap_or_else(|| DEFAULT_AUTH_FILE.to_string());
        Self::new(digest.as_deref(), flag_path)
    }

    pub fn with_ttl(mut self, ttl: TimeDelta) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn flag_path(&self) -> &Path {
        &self.flag_path
    }

    pub fn is_configured(&self) -> bool {
        self.digest.is_some()
    }

    pub fn is_open(&self) -> bool {
        self.is_open_at(Utc::now())
    }

    /// An unconfigured gate never opens.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        if !self.is_configured() {
            return false;
        }

        match self.unlocked_at() {
            Some(unlocked_at) => unlocked_at <= now && now - unlocked_at < self.ttl,
            None => false,
        }
    }

    pub fn verify(&self, password: &str) -> Result<(), AuthError> {
        let expected = self.digest.as_ref().ok_or(AuthError::NotConfigured)?;

        if Sha256::digest(password.as_bytes()).as_slice() == expected.as_slice() {
            Ok(())
        } else {
            Err(AuthError::Rejected)
        }
    }

    pub fn unlock(&self, password: &str) -> Result<(), AuthError> {
        self.unlock_at(password, Utc::now())
    }

    pub fn unlock_at(&self, password: &str, now: DateTime<Utc>) -> Result<(), AuthError> {
        if let Err(error) = self.verify(password) {
            warn!(%error, "console unlock failed");
            return Err(error);
        }

        fs::write(&self.flag_path, now.to_rfc3339()).map_err(|source| AuthError::Flag {
            path: self.flag_path.clone(),
            source,
        })?;

        info!(path = %self.flag_path.display(), "console unlocked");
        Ok(())
    }

    /// Remove the flag so the next start prompts again.
    pub fn lock(&self) -> Result<(), AuthError> {
        match fs::remove_file(&self.flag_path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(AuthError::Flag {
                path: self.flag_path.clone(),
                source,
            }),
        }
    }

    fn unlocked_at(&self) -> Option<DateTime<Utc>> {
        let contents = fs::read_to_string(&self.flag_path).ok()?;
        DateTime::parse_from_rfc3339(contents.trim())
            .ok()
            .map(|unlocked_at| unlocked_at.with_timezone(&Utc))
    }
}

/// Hex SHA-256 of `password`, the form `BOT_CONSOLE_PASSWORD_SHA256` expects.
pub fn password_digest(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

fn parse_digest(digest: &str) -> Result<[u8; 32], AuthError> {
    let mut bytes = [0u8; 32];
    hex::decode_to_slice(digest, &mut bytes).map_err(|_| AuthError::InvalidDigest)?;
    Ok(bytes)
}
