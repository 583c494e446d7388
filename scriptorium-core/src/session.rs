//! # Session context
//!
//! The signed-in author the editor works on behalf of. It is passed
//! explicitly to the components that need it rather than read from ambient
//! state. The context can be persisted so the command-line front end
//! remembers who it is acting for.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The current author.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Backend user id, absent when nobody is signed in
    pub user_id: Option<String>,
    /// Name shown on published posts
    pub pen_name: Option<String>,
}

impl Session {
    /// A session for a signed-in user.
    ///
    /// # Example
    ///
    /// ```rust
    /// use scriptorium_core::Session;
    ///
    /// let session = Session::signed_in("user-1", "Brother Cadfael");
    /// assert!(session.is_signed_in());
    /// assert_eq!(session.user_id(), Some("user-1"));
    /// ```
    pub fn signed_in<U: Into<String>, N: Into<String>>(user_id: U, pen_name: N) -> Self {
        Self {
            user_id: Some(user_id.into()),
            pen_name: Some(pen_name.into()),
        }
    }

    /// A session with nobody signed in.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_signed_in(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Load the session from the default location.
    ///
    /// A missing or unreadable file yields an anonymous session.
    pub fn load() -> Self {
        let loaded = Self::session_file_path().and_then(|path| Self::load_from_file(&path));
        match loaded {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Failed to load session: {}. Using anonymous session.", e);
                Self::default()
            }
        }
    }

    /// Load the session from a specific file. A missing file is anonymous.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::config_error!("Failed to read session file: {}", e))?;

        let session: Session = serde_json::from_str(&content)
            .map_err(|e| crate::config_error!("Failed to parse session file: {}", e))?;

        Ok(session)
    }

    /// Save the session to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to_file(Self::session_file_path()?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| crate::config_error!("Failed to create session directory: {}", e))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| crate::config_error!("Failed to serialize session: {}", e))?;

        std::fs::write(path, content)
            .map_err(|e| crate::config_error!("Failed to write session file: {}", e))?;

        Ok(())
    }

    fn session_file_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| Error::config("Could not determine data directory"))?
            .join("scriptorium");

        Ok(data_dir.join("session.json"))
    }
}
