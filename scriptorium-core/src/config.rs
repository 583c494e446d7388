//! # Configuration management for Scriptorium
//!
//! Settings are loaded in the following order of priority:
//! 1. Command line arguments (highest priority, applied by the binary)
//! 2. Environment variables (`SCRIPTORIUM__EDITOR__AUTOSAVE_DEBOUNCE_MS=500`)
//! 3. Configuration file
//! 4. Default values (lowest priority)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of environment variables overriding configuration keys.
pub const ENV_PREFIX: &str = "SCRIPTORIUM";

/// Main configuration structure for Scriptorium.
///
/// # Example
///
/// ```rust
/// use scriptorium_core::Config;
///
/// let config = Config::default();
/// assert_eq!(config.editor.autosave_debounce_ms, 2000);
/// assert_eq!(config.drafts.page_size, 10);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application-wide settings
    pub app: AppConfig,
    /// Editor and auto-save settings
    pub editor: EditorConfig,
    /// Draft list, search and local store settings
    pub drafts: DraftsConfig,
    /// Advanced settings
    pub advanced: AdvancedConfig,
}

/// Application-wide configuration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Name of the site the posts are published on
    pub site_name: String,
    /// Base path of the admin edit route; the post id is appended
    pub edit_path_prefix: String,
}

/// Editor configuration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Quiet period after the last edit before auto-saving, in milliseconds
    pub autosave_debounce_ms: u64,
    /// Settle delay before recomputing active formats, in milliseconds
    pub format_refresh_ms: u64,
    /// Length of the excerpt derived from the body when none is given
    pub excerpt_length: usize,
    /// Reuse an unpublished draft with the same title and section instead of
    /// inserting a new post on the first save
    pub reuse_matching_draft: bool,
    /// Placeholder shown by an empty content surface
    pub placeholder: String,
    /// Words per minute used for reading time estimates
    pub words_per_minute: usize,
    /// Largest accepted cover image, in megabytes
    pub max_image_size_mb: u64,
}

/// Draft list configuration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftsConfig {
    /// Entries per page in paginated lists
    pub page_size: usize,
    /// Maximum number of published posts returned by a search
    pub search_limit: usize,
    /// File backing the local fallback store
    pub store_path: PathBuf,
}

/// Advanced configuration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedConfig {
    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
    /// Backend request timeout in seconds
    pub network_timeout: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            site_name: "Scriptorium".to_string(),
            edit_path_prefix: "/admin/posts".to_string(),
        }
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            autosave_debounce_ms: 2000,
            format_refresh_ms: 10,
            excerpt_length: 200,
            reuse_matching_draft: true,
            placeholder: "Start writing your story...".to_string(),
            words_per_minute: 200,
            max_image_size_mb: 5,
        }
    }
}

impl Default for DraftsConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            search_limit: 20,
            store_path: dirs::data_dir()
                .unwrap_or_default()
                .join("scriptorium")
                .join("local_store.json"),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            network_timeout: 30,
        }
    }
}

impl EditorConfig {
    /// Largest accepted cover image, in bytes.
    pub fn max_image_bytes(&self) -> usize {
        usize::try_from(self.max_image_size_mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX)
    }

    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }

    pub fn format_refresh(&self) -> Duration {
        Duration::from_millis(self.format_refresh_ms)
    }
}

impl AdvancedConfig {
    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout)
    }
}

impl Config {
    /// Load configuration from the default location or fall back to defaults.
    ///
    /// # Example
    ///
    /// ```rust
    /// use scriptorium_core::Config;
    ///
    /// let config = Config::load_or_default();
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn load_or_default() -> Self {
        let loaded = Self::default_config_path().and_then(|path| Self::load_layered(Some(&path)));
        match loaded {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load configuration: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Load configuration from a specific TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use scriptorium_core::Config;
    /// use std::path::Path;
    ///
    /// let config = Config::load_from_file(Path::new("scriptorium.toml"))?;
    /// # Ok::<(), scriptorium_core::Error>(())
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::config_error!("Failed to read config file: {}", e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::config_error!("Failed to parse config file: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file overlaid with environment
    /// variables.
    ///
    /// A missing file is not an error. Environment keys use `__` between the
    /// prefix, the section and the key, e.g.
    /// `SCRIPTORIUM__DRAFTS__PAGE_SIZE=25`.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or the merged result
    /// fails validation.
    pub fn load_layered(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(false),
            );
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder
            .build()
            .and_then(|layered| layered.try_deserialize())
            .map_err(|e| crate::config_error!("Failed to assemble configuration: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the file cannot be
    /// written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.validate()?;

        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::config_error!("Failed to serialize config: {}", e))?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| crate::config_error!("Failed to create config directory: {}", e))?;
        }

        std::fs::write(path, content)
            .map_err(|e| crate::config_error!("Failed to write config file: {}", e))?;

        Ok(())
    }

    /// Validate the configuration values.
    ///
    /// # Example
    ///
    /// ```rust
    /// use scriptorium_core::Config;
    ///
    /// let mut config = Config::default();
    /// assert!(config.validate().is_ok());
    ///
    /// config.drafts.page_size = 0;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        if self.editor.autosave_debounce_ms == 0 || self.editor.autosave_debounce_ms > 60_000 {
            return Err(Error::validation(
                "editor.autosave_debounce_ms",
                "Auto-save delay must be between 1 and 60000 milliseconds",
            ));
        }

        if self.editor.format_refresh_ms > 1000 {
            return Err(Error::validation(
                "editor.format_refresh_ms",
                "Format refresh delay cannot exceed 1000 milliseconds",
            ));
        }

        if self.editor.excerpt_length == 0 {
            return Err(Error::validation(
                "editor.excerpt_length",
                "Excerpt length must be positive",
            ));
        }

        if self.editor.words_per_minute == 0 {
            return Err(Error::validation(
                "editor.words_per_minute",
                "Reading speed must be positive",
            ));
        }

        if self.editor.max_image_size_mb == 0 {
            return Err(Error::validation(
                "editor.max_image_size_mb",
                "Maximum image size must be positive",
            ));
        }

        if self.drafts.page_size == 0 || self.drafts.page_size > 100 {
            return Err(Error::validation(
                "drafts.page_size",
                "Page size must be between 1 and 100",
            ));
        }

        if self.drafts.search_limit == 0 {
            return Err(Error::validation(
                "drafts.search_limit",
                "Search limit must be positive",
            ));
        }

        if self.advanced.network_timeout == 0 {
            return Err(Error::validation(
                "advanced.network_timeout",
                "Network timeout must be at least one second",
            ));
        }

        if !["error", "warn", "info", "debug", "trace"].contains(&self.advanced.log_level.as_str())
        {
            return Err(Error::validation(
                "advanced.log_level",
                "Log level must be one of: error, warn, info, debug, trace",
            ));
        }

        Ok(())
    }

    /// Get the default configuration file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined.
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::config("Could not determine config directory"))?
            .join("scriptorium");

        Ok(config_dir.join("config.toml"))
    }

    /// Edit path announced once a post receives its id.
    ///
    /// # Example
    ///
    /// ```rust
    /// use scriptorium_core::Config;
    ///
    /// assert_eq!(Config::default().edit_path("42"), "/admin/posts/42");
    /// ```
    pub fn edit_path(&self, id: &str) -> String {
        format!("{}/{}", self.app.edit_path_prefix.trim_end_matches('/'), id)
    }
}
