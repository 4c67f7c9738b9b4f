//! JSON-backed store of posting accounts
//!
//! The users file is a plain list:
//!
//! ```json
//! [
//!   { "username": "alice", "access_token": "..." }
//! ]
//! ```
//!
//! Reply capability is not stored. It is derived from whether the user has
//! a reply folder at the time users are loaded.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::content::ContentSource;
use crate::error::{ConfigError, PairpostError, Result};
use crate::types::User;

#[derive(Clone, Serialize, Deserialize)]
struct UserRecord {
    username: String,
    access_token: String,
}

pub struct UserStore {
    path: PathBuf,
    records: Vec<UserRecord>,
}

impl UserStore {
    /// Load the store, treating a missing file as an empty list
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if !path.exists() {
            debug!(path = %path.display(), "users file not found, starting empty");
            return Ok(Self {
                path,
                records: Vec::new(),
            });
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let records: Vec<UserRecord> = if content.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&content).map_err(|source| ConfigError::Json {
                path: path.clone(),
                source,
            })?
        };

        for record in &records {
            validate_username(&record.username)?;
        }

        debug!(path = %path.display(), users = records.len(), "loaded users");
        Ok(Self { path, records })
    }

    /// Load the store, failing when the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        ensure_exists(&path)?;
        Self::load(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn usernames(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.username.as_str()).collect()
    }

    pub fn contains(&self, username: &str) -> bool {
        self.records.iter().any(|r| r.username == username)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Add a user, replacing the token if the username already exists
    ///
    /// Returns `true` when a new user was added.
    pub fn add(&mut self, username: &str, access_token: &str) -> Result<bool> {
        validate_username(username)?;
        if access_token.trim().is_empty() {
            return Err(PairpostError::InvalidArgument(format!(
                "Access token for '{}' cannot be empty",
                username
            )));
        }

        if let Some(existing) = self.records.iter_mut().find(|r| r.username == username) {
            existing.access_token = access_token.trim().to_string();
            info!(username, "updated access token");
            return Ok(false);
        }

        self.records.push(UserRecord {
            username: username.to_string(),
            access_token: access_token.trim().to_string(),
        });
        info!(username, "added user");
        Ok(true)
    }

    /// Remove a user, returning whether it was present
    pub fn remove(&mut self, username: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.username != username);
        let removed = self.records.len() != before;
        if removed {
            info!(username, "removed user");
        }
        removed
    }

    /// Write the store back to disk
    ///
    /// The file holds access tokens, so it is created with mode 600 on Unix.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_string_pretty(&self.records).map_err(|source| {
            ConfigError::Json {
                path: self.path.clone(),
                source,
            }
        })?;
        std::fs::write(&self.path, json).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, permissions).map_err(|source| {
                ConfigError::Write {
                    path: self.path.clone(),
                    source,
                }
            })?;
        }

        Ok(())
    }

    /// Materialize users, deriving reply capability from `content`
    pub fn users(&self, content: &dyn ContentSource) -> Vec<User> {
        self.records
            .iter()
            .map(|record| {
                User::new(&record.username, &record.access_token)
                    .with_reply_capability(content.has_reply_source(&record.username))
            })
            .collect()
    }
}

pub(crate) fn ensure_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(ConfigError::Read {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        }
        .into());
    }
    Ok(())
}

/// Usernames double as directory names, so path separators are rejected
pub fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(PairpostError::InvalidArgument(
            "Username cannot be empty".to_string(),
        ));
    }

    if username == "." || username == ".." {
        return Err(PairpostError::InvalidArgument(format!(
            "Invalid username '{}'",
            username
        )));
    }

    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
    {
        return Err(PairpostError::InvalidArgument(format!(
            "Invalid username '{}': only letters, digits, '.', '_' and '-' are allowed",
            username
        )));
    }

    Ok(())
}
