use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use crate::error::SessionError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// The signed-in user. Created by a successful login or register, passed
/// explicitly to whatever needs it, and torn down on logout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user: Profile,
    pub token: String,
}

impl Session {
    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}

/// Login/register response body: the profile fields plus the bearer token, flat.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub token: String,
}

impl From<AuthResponse> for Session {
    fn from(response: AuthResponse) -> Self {
        Self {
            user: Profile {
                id: response.id,
                name: response.name,
                email: response.email,
            },
            token: response.token,
        }
    }
}

/// Session persisted between runs as a JSON file.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Store at `<config_dir>/notebookchat/session.json`.
    pub fn new() -> Result<Self, SessionError> {
        let config_dir = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .ok_or(SessionError::NoConfigDir)?;
        Ok(Self::at(config_dir.join("notebookchat").join("session.json")))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved session. A missing or unreadable file means "signed out".
    pub async fn load(&self) -> Option<Session> {
        let content = fs::read_to_string(&self.path).await.ok()?;
        match serde_json::from_str(&content) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(path = %self.path.display(), "ignoring corrupt session file: {}", e);
                None
            }
        }
    }

    pub async fn save(&self, session: &Session) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|source| SessionError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = serde_json::to_string_pretty(session)?;
        fs::write(&self.path, content)
            .await
            .map_err(|source| SessionError::Io {
                path: self.path.clone(),
                source,
            })?;
        info!(user = %session.user.name, "session saved");
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), SessionError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SessionError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
