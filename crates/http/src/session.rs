//! Session persistence
//!
//! A session lives in exactly one of two storage tiers, chosen at login by
//! the "remember me" choice: the durable tier survives restarts, the
//! ephemeral tier ends with the process. Tiers are shaped like web storage
//! (string keys, string values) so a host can back them with whatever it
//! has.

use crate::types::User;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Storage key for the access token
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Storage key for the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Storage key for the persistence-mode marker
pub const PERSISTENCE_KEY: &str = "persistence";

/// Storage key for the signed-in user, as JSON
pub const USER_KEY: &str = "user";

const SESSION_KEYS: [&str; 4] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, PERSISTENCE_KEY, USER_KEY];

/// Session storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed
    #[error("Session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file could not be encoded
    #[error("Session storage serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored data is unreadable
    #[error("Session storage is corrupt: {0}")]
    Corrupt(String),

    /// An update was attempted without a stored session
    #[error("No session is stored")]
    NoSession,
}

/// Where a session is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persistence {
    /// Survives restarts
    Durable,
    /// Cleared when the process ends
    Ephemeral,
}

impl Persistence {
    /// Resolve the tier from the login form's "remember me" choice
    pub const fn from_remember_me(remember_me: bool) -> Self {
        if remember_me {
            Self::Durable
        } else {
            Self::Ephemeral
        }
    }

    /// Marker value written next to the tokens
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Durable => "durable",
            Self::Ephemeral => "ephemeral",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "durable" => Some(Self::Durable),
            "ephemeral" => Some(Self::Ephemeral),
            _ => None,
        }
    }

    const fn other(self) -> Self {
        match self {
            Self::Durable => Self::Ephemeral,
            Self::Ephemeral => Self::Durable,
        }
    }
}

impl fmt::Display for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored credentials for the signed-in user
#[derive(Clone, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub persistence: Persistence,
    /// Account the tokens belong to, when the server sent it
    pub user: Option<User>,
}

impl Session {
    /// Create a session from a login response
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        persistence: Persistence,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            persistence,
            user: None,
        }
    }

    /// Attach the signed-in account
    #[must_use]
    pub fn with_user(mut self, user: Option<User>) -> Self {
        self.user = user;
        self
    }
}

// Tokens stay out of logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("persistence", &self.persistence)
            .field("user", &self.user.as_ref().map(|user| &user.id))
            .finish()
    }
}

/// What a restored session says about the signed-in user
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub persistence: Persistence,
    pub user: Option<User>,
}

impl From<Session> for SessionInfo {
    fn from(session: Session) -> Self {
        Self {
            persistence: session.persistence,
            user: session.user,
        }
    }
}

/// One string key/value storage location
pub trait StorageTier: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// Tier held in process memory
#[derive(Debug, Default)]
pub struct MemoryTier {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageTier for MemoryTier {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.remove(key);
        Ok(())
    }
}

/// Tier backed by a JSON object on disk
///
/// Every write rewrites the whole file. The file is removed once its last
/// key is removed.
#[derive(Debug)]
pub struct FileTier {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileTier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_items(&self) -> Result<HashMap<String, String>, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(HashMap::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                StorageError::Corrupt(format!("{}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_items(&self, items: &HashMap<String, String>) -> Result<(), StorageError> {
        if items.is_empty() {
            return match std::fs::remove_file(&self.path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(items)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl StorageTier for FileTier {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_items()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut items = self.read_items()?;
        items.insert(key.to_string(), value.to_string());
        self.write_items(&items)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut items = self.read_items()?;
        if items.remove(key).is_none() {
            return Ok(());
        }
        self.write_items(&items)
    }
}

/// Owner of the current session
///
/// The API client reads and writes credentials only through this trait and
/// never keeps its own copy between calls.
pub trait SessionStore: Send + Sync {
    /// Current session, if any
    fn load(&self) -> Result<Option<Session>, StorageError>;

    /// Store a session in the tier named by `session.persistence`
    fn save(&self, session: &Session) -> Result<(), StorageError>;

    /// Remove every trace of the session
    fn clear(&self) -> Result<(), StorageError>;

    /// Current access token, if any
    fn access_token(&self) -> Result<Option<String>, StorageError> {
        Ok(self.load()?.map(|session| session.access_token))
    }

    /// Swap in a refreshed access token, keeping the session's tier
    ///
    /// A rotated refresh token replaces the stored one when given.
    fn replace_access_token(
        &self,
        access_token: &str,
        rotated_refresh_token: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut session = self.load()?.ok_or(StorageError::NoSession)?;
        session.access_token = access_token.to_string();
        if let Some(refresh_token) = rotated_refresh_token {
            session.refresh_token = Some(refresh_token.to_string());
        }
        self.save(&session)
    }

    /// Replace the stored account details, keeping the tokens
    fn update_user(&self, user: &User) -> Result<(), StorageError> {
        let mut session = self.load()?.ok_or(StorageError::NoSession)?;
        session.user = Some(user.clone());
        self.save(&session)
    }
}

/// Session store over a durable and an ephemeral tier
pub struct TieredSessionStore {
    durable: Box<dyn StorageTier>,
    ephemeral: Box<dyn StorageTier>,
}

impl TieredSessionStore {
    pub fn new(
        durable: impl StorageTier + 'static,
        ephemeral: impl StorageTier + 'static,
    ) -> Self {
        Self {
            durable: Box::new(durable),
            ephemeral: Box::new(ephemeral),
        }
    }

    /// Both tiers in memory
    pub fn in_memory() -> Self {
        Self::new(MemoryTier::new(), MemoryTier::new())
    }

    /// Durable tier in a JSON file, ephemeral tier in memory
    pub fn with_durable_file(path: impl Into<PathBuf>) -> Self {
        Self::new(FileTier::new(path), MemoryTier::new())
    }

    fn tier(&self, persistence: Persistence) -> &dyn StorageTier {
        match persistence {
            Persistence::Durable => self.durable.as_ref(),
            Persistence::Ephemeral => self.ephemeral.as_ref(),
        }
    }

    fn read_tier(&self, persistence: Persistence) -> Result<Option<Session>, StorageError> {
        let tier = self.tier(persistence);
        let Some(access_token) = tier.get_item(ACCESS_TOKEN_KEY)? else {
            return Ok(None);
        };

        // Stores written before the marker existed have none.
        if let Some(marker) = tier.get_item(PERSISTENCE_KEY)? {
            if Persistence::parse(&marker).is_none() {
                return Err(StorageError::Corrupt(format!(
                    "unknown persistence marker '{marker}'"
                )));
            }
        }

        let user = match tier.get_item(USER_KEY)? {
            Some(json) => Some(
                serde_json::from_str(&json)
                    .map_err(|e| StorageError::Corrupt(format!("stored user: {e}")))?,
            ),
            None => None,
        };

        Ok(Some(Session {
            access_token,
            refresh_token: tier.get_item(REFRESH_TOKEN_KEY)?,
            persistence,
            user,
        }))
    }

    fn wipe(&self, persistence: Persistence) -> Result<(), StorageError> {
        let tier = self.tier(persistence);
        for key in SESSION_KEYS {
            tier.remove_item(key)?;
        }
        Ok(())
    }
}

impl SessionStore for TieredSessionStore {
    fn load(&self) -> Result<Option<Session>, StorageError> {
        if let Some(session) = self.read_tier(Persistence::Durable)? {
            return Ok(Some(session));
        }
        self.read_tier(Persistence::Ephemeral)
    }

    fn save(&self, session: &Session) -> Result<(), StorageError> {
        let tier = self.tier(session.persistence);
        tier.set_item(ACCESS_TOKEN_KEY, &session.access_token)?;
        match &session.refresh_token {
            Some(refresh_token) => tier.set_item(REFRESH_TOKEN_KEY, refresh_token)?,
            None => tier.remove_item(REFRESH_TOKEN_KEY)?,
        }
        tier.set_item(PERSISTENCE_KEY, session.persistence.as_str())?;
        match &session.user {
            Some(user) => tier.set_item(USER_KEY, &serde_json::to_string(user)?)?,
            None => tier.remove_item(USER_KEY)?,
        }

        self.wipe(session.persistence.other())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.wipe(Persistence::Durable)?;
        self.wipe(Persistence::Ephemeral)
    }
}

impl fmt::Debug for TieredSessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TieredSessionStore").finish_non_exhaustive()
    }
}
