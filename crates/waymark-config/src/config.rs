//! Configuration sections, their defaults, and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name of the persisted configuration inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.ron";

const APP_DIR_NAME: &str = "waymark";

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Which markers to show and how far labels reach.
    pub display: DisplayConfig,
    /// Backend synchronization.
    pub sync: SyncConfig,
    /// Persisted credential.
    pub account: AccountConfig,
    /// HTTP client tuning.
    pub network: NetworkConfig,
    /// Per-region selection limits.
    pub selection: SelectionConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Display configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    /// Show messages written by the viewer.
    pub show_own_messages: bool,
    /// Show messages written by everyone else.
    pub show_other_messages: bool,
    /// Overlay label radius in tiles.
    pub display_radius: u32,
}

impl DisplayConfig {
    pub const MIN_RADIUS: u32 = 1;
    pub const MAX_RADIUS: u32 = 20;

    /// `display_radius` forced into `MIN_RADIUS..=MAX_RADIUS`.
    pub fn clamped_radius(&self) -> u32 {
        self.display_radius.clamp(Self::MIN_RADIUS, Self::MAX_RADIUS)
    }
}

/// Synchronization configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Share messages through the backend. When off, placements stay local.
    pub sync_messages: bool,
    /// Backend root URL.
    pub api_url: String,
}

/// Credential issued by the backend at registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AccountConfig {
    /// API key sent with authenticated requests. Empty when unregistered.
    pub api_key: String,
    /// Display name the key was issued for.
    pub registered_username: String,
}

impl AccountConfig {
    /// `(api_key, username)` when both are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let key = self.api_key.trim();
        let name = self.registered_username.trim();
        (!key.is_empty() && !name.is_empty()).then_some((key, name))
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Per-request timeout in seconds.
    pub timeout_seconds: u32,
    /// Threads performing backend requests.
    pub worker_threads: u32,
}

/// Selection limits applied to every fetched region.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SelectionConfig {
    /// Highest-scored messages of others always shown.
    pub top_voted: u32,
    /// Cap on messages of others shown per region.
    pub max_others_per_region: u32,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_own_messages: true,
            show_other_messages: true,
            display_radius: 5,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_messages: true,
            api_url: "https://runemessages-api-production.up.railway.app".to_string(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            worker_threads: 2,
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            top_voted: 10,
            max_others_per_region: 30,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Platform configuration directory for the client, e.g.
    /// `~/.config/waymark` on Linux.
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|base| base.join(APP_DIR_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .enumerate_arrays(false);
        let serialized = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        std::fs::write(&config_path, serialized).map_err(|source| ConfigError::Write {
            path: config_path.clone(),
            source,
        })?;
        log::debug!("Saved config to {}", config_path.display());
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join(CONFIG_FILE_NAME))?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Records a freshly issued credential. Call [`save`](Self::save) to
    /// persist it.
    pub fn store_credentials(&mut self, api_key: &str, username: &str) {
        self.account.api_key = api_key.to_string();
        self.account.registered_username = username.to_string();
    }

    /// Forgets the stored credential.
    pub fn clear_credentials(&mut self) {
        self.account = AccountConfig::default();
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("display_radius: 5"));
        assert!(ron_str.contains("max_others_per_region: 30"));
        assert!(ron_str.contains("sync_messages: true"));
    }

    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(display: (show_own_messages: false))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert!(!config.display.show_own_messages);
        assert!(config.display.show_other_messages);
        assert_eq!(config.network, NetworkConfig::default());
        assert_eq!(config.selection.top_voted, 10);
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_radius_clamped() {
        let mut display = DisplayConfig::default();
        assert_eq!(display.clamped_radius(), 5);
        display.display_radius = 0;
        assert_eq!(display.clamped_radius(), 1);
        display.display_radius = 99;
        assert_eq!(display.clamped_radius(), 20);
    }

    #[test]
    fn test_credentials_need_both_parts() {
        let mut account = AccountConfig::default();
        assert_eq!(account.credentials(), None);
        account.api_key = "key".to_string();
        assert_eq!(account.credentials(), None);
        account.registered_username = "Zezima".to_string();
        assert_eq!(account.credentials(), Some(("key", "Zezima")));
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join(CONFIG_FILE_NAME).exists());
    }

    #[test]
    fn test_stored_credentials_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::load_or_create(dir.path()).unwrap();
        config.store_credentials("abc123", "Zezima");
        config.save(dir.path()).unwrap();

        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(loaded.account.credentials(), Some(("abc123", "Zezima")));

        let mut cleared = loaded;
        cleared.clear_credentials();
        assert_eq!(cleared.account.credentials(), None);
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.display.display_radius = 12;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.map(|c| c.display.display_radius), Some(12));
        assert!(modified.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "{{not valid}}").unwrap();
        let err = Config::load_or_create(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_default_dir_is_namespaced() {
        if let Ok(dir) = Config::default_dir() {
            assert!(dir.ends_with(APP_DIR_NAME));
        }
    }
}
