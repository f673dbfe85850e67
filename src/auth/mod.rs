//! Credential store.
//!
//! A single JSON file mapping each username to its password hash, role,
//! creation time and route strategy. A default admin account is provisioned
//! when the file does not exist yet.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::util::{safe_open_file, write_atomically};
use crate::error::{Error, Result};
use crate::route::RouteStrategy;

/// Account provisioned on first open
pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
/// Password of the provisioned account
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

/// Login and account administration failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("Username not found")]
    UnknownUser,
    #[error("Incorrect password")]
    IncorrectPassword,
    #[error("Username already exists")]
    UserExists,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Labeler,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Admin => "admin",
            Self::Labeler => "labeler",
        })
    }
}

/// Stored account entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    /// Hex SHA-256 of the password
    pub password: String,
    pub role: Role,
    pub created_at: NaiveDateTime,
    #[serde(default)]
    pub route_strategy: RouteStrategy,
}

/// Account listing without the password hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub username: String,
    pub role: Role,
    pub created_at: NaiveDateTime,
    pub route_strategy: RouteStrategy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: BTreeMap<String, UserEntry>,
}

/// Hex-encoded SHA-256 of a password
#[must_use]
pub fn hash_password(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

/// The user credential file
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
    data: UsersFile,
}

impl CredentialStore {
    /// Open the store, creating it with the default admin account if missing
    pub fn open(path: &Path) -> Result<Self> {
        if path.exists() {
            let file = safe_open_file(path, "user store")?;
            let data: UsersFile = serde_json::from_reader(std::io::BufReader::new(file))
                .map_err(|e| Error::source_unreadable(path, e))?;
            return Ok(Self {
                path: path.to_path_buf(),
                data,
            });
        }

        let mut store = Self {
            path: path.to_path_buf(),
            data: UsersFile::default(),
        };
        store.data.users.insert(
            DEFAULT_ADMIN_USERNAME.to_string(),
            UserEntry {
                password: hash_password(DEFAULT_ADMIN_PASSWORD),
                role: Role::Admin,
                created_at: Local::now().naive_local(),
                route_strategy: RouteStrategy::Forward,
            },
        );
        store.save()?;
        log::info!("Created user store with default admin at {}", path.display());
        Ok(store)
    }

    fn save(&self) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.data)?;
        write_atomically(&self.path, &json)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check a login, returning the user's role
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Role> {
        let entry = self
            .data
            .users
            .get(username)
            .ok_or(CredentialError::UnknownUser)?;
        if entry.password != hash_password(password) {
            return Err(CredentialError::IncorrectPassword.into());
        }
        Ok(entry.role)
    }

    /// Add an account. Existing usernames are never overwritten.
    pub fn create_user(
        &mut self,
        username: &str,
        password: &str,
        role: Role,
        route_strategy: RouteStrategy,
    ) -> Result<()> {
        if self.data.users.contains_key(username) {
            return Err(CredentialError::UserExists.into());
        }
        let mut next = self.data.clone();
        next.users.insert(
            username.to_string(),
            UserEntry {
                password: hash_password(password),
                role,
                created_at: Local::now().naive_local(),
                route_strategy,
            },
        );
        let previous = std::mem::replace(&mut self.data, next);
        if let Err(e) = self.save() {
            self.data = previous;
            return Err(e);
        }
        log::info!("Created {role} account {username}");
        Ok(())
    }

    /// Route strategy of a user; unknown users get forward order
    #[must_use]
    pub fn route_strategy(&self, username: &str) -> RouteStrategy {
        self.data
            .users
            .get(username)
            .map(|entry| entry.route_strategy)
            .unwrap_or_default()
    }

    /// Change a user's route strategy
    pub fn set_route_strategy(&mut self, username: &str, strategy: RouteStrategy) -> Result<()> {
        let Some(entry) = self.data.users.get_mut(username) else {
            return Err(CredentialError::UnknownUser.into());
        };
        let previous = std::mem::replace(&mut entry.route_strategy, strategy);
        if let Err(e) = self.save() {
            if let Some(entry) = self.data.users.get_mut(username) {
                entry.route_strategy = previous;
            }
            return Err(e);
        }
        Ok(())
    }

    /// All accounts, without password hashes
    #[must_use]
    pub fn list_users(&self) -> Vec<UserInfo> {
        self.data
            .users
            .iter()
            .map(|(username, entry)| UserInfo {
                username: username.clone(),
                role: entry.role,
                created_at: entry.created_at,
                route_strategy: entry.route_strategy,
            })
            .collect()
    }
}
