//! Configuration management for wosync.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration.
///
/// This is loaded from `~/.config/wosync/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// General application settings
    pub general: GeneralConfig,
    /// Range scraping settings
    pub scraper: ScraperConfig,
    /// Browser automation settings
    pub browser: BrowserConfig,
    /// Portal page identifiers
    pub portal: PortalConfig,
    /// Result database connection settings
    pub database: DatabaseConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            tracing::debug!("Loading config from {}", config_path.display());
            let contents = fs::read_to_string(&config_path)?;
            let config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `WOSYNC_PROCESS_COUNT`: Override the parallel process count
    /// - `WOSYNC_HEADLESS`: Override headless mode for every browser (true/false)
    /// - `WOSYNC_DATABASE_URL`: Use an explicit database URL
    /// - `WOSYNC_DB_PASSWORD`: Database password
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from a variable lookup. Unparseable values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("WOSYNC_PROCESS_COUNT") {
            if let Ok(count) = val.parse() {
                self.scraper.process_count = count;
                tracing::debug!("Override scraper.process_count from env: {}", count);
            }
        }

        if let Some(val) = lookup("WOSYNC_HEADLESS") {
            if let Ok(headless) = val.parse() {
                self.scraper.headless_primary = headless;
                self.scraper.headless_parallel = headless;
                tracing::debug!("Override headless mode from env: {}", headless);
            }
        }

        if let Some(url) = lookup("WOSYNC_DATABASE_URL") {
            self.database.url = Some(url);
            tracing::debug!("Override database.url from env");
        }

        if let Some(password) = lookup("WOSYNC_DB_PASSWORD") {
            self.database.password = Some(password);
        }
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        let config_path = Self::config_path()?;
        let config_dir = config_path
            .parent()
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "config_path".to_string(),
                reason: "no parent directory".to_string(),
            })?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/wosync/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("org", "wosync", "wosync").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/wosync`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("org", "wosync", "wosync").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }

    /// Directory holding the per-identity browser profiles.
    ///
    /// `browser.profiles_dir` if set, otherwise `<data_dir>/profiles`.
    pub fn profiles_dir(&self) -> ConfigResult<PathBuf> {
        match &self.browser.profiles_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::data_dir()?.join("profiles")),
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Hide password characters when prompting for credentials
    pub password_inputs_hidden: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            password_inputs_hidden: true,
        }
    }
}

/// Range scraping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Number of worker processes (0 = ask on first use)
    pub process_count: u32,
    /// Run the primary (sequential) session headless
    pub headless_primary: bool,
    /// Run parallel worker sessions headless
    pub headless_parallel: bool,
    /// Prefix prepended to work order numbers
    pub order_prefix: String,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            process_count: 0,
            headless_primary: false,
            headless_parallel: true,
            order_prefix: String::new(),
        }
    }
}

/// Browser automation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Chrome executable (None = let the automation client locate one)
    pub chrome_executable: Option<PathBuf>,
    /// Root of the per-identity profile directories (None = data dir)
    pub profiles_dir: Option<PathBuf>,
    /// Browser window width for headful sessions
    pub window_width: u32,
    /// Browser window height for headful sessions
    pub window_height: u32,
    /// Navigation and page-load timeout in milliseconds
    pub navigation_timeout_ms: u64,
    /// How long to wait for an already-trusted profile to land, in milliseconds
    pub trust_check_ms: u64,
    /// How long to wait for the out-of-band second-factor approval, in seconds
    pub second_factor_timeout_secs: u64,
}

impl BrowserConfig {
    /// Navigation timeout as a `Duration`.
    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    /// Trust check window as a `Duration`.
    #[must_use]
    pub fn trust_check(&self) -> Duration {
        Duration::from_millis(self.trust_check_ms)
    }

    /// Second-factor timeout as a `Duration`.
    #[must_use]
    pub fn second_factor_timeout(&self) -> Duration {
        Duration::from_secs(self.second_factor_timeout_secs)
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_executable: None,
            profiles_dir: None,
            window_width: 1280,
            window_height: 720,
            navigation_timeout_ms: 10_000,
            trust_check_ms: 5_000,
            second_factor_timeout_secs: 60,
        }
    }
}

/// Identifiers of the portal's login and landing pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    /// Login entry point
    pub login_url: String,
    /// Title of the credential form page
    pub login_title: String,
    /// Title of the second-factor confirmation page
    pub second_factor_title: String,
    /// Title of the authenticated landing page
    pub landing_title: String,
    /// Element id of the "trust this browser" button on the second-factor page
    pub trust_button_id: String,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            login_url: "https://auth.berkeley.edu/cas/login?service=https://maintenance.housing.berkeley.edu/cas2/login.aspx".to_string(),
            login_title: "CAS - Central Authentication Service".to_string(),
            second_factor_title: "Duo Security".to_string(),
            landing_title: "TMA iServiceDesk - University of California-Berkeley".to_string(),
            trust_button_id: "trust-browser-button".to_string(),
        }
    }
}

/// Result database connection settings.
///
/// Every worker opens its own connection with these parameters.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Full connection URL; takes precedence over the individual fields
    pub url: Option<String>,
    /// Database host
    pub host: String,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database port
    pub port: u16,
    /// Database password
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Ask for the password at runtime instead of storing it
    pub prompt_password: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            dbname: "maintenance".to_string(),
            user: "postgres".to_string(),
            port: 5432,
            password: None,
            prompt_password: false,
        }
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url.as_ref().map(|_| "<set>"))
            .field("host", &self.host)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("prompt_password", &self.prompt_password)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.general.password_inputs_hidden);
        assert_eq!(config.scraper.process_count, 0);
        assert!(!config.scraper.headless_primary);
        assert!(config.scraper.headless_parallel);
        assert_eq!(config.browser.window_width, 1280);
        assert_eq!(config.browser.second_factor_timeout(), Duration::from_secs(60));
        assert_eq!(config.database.port, 5432);
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("[scraper]"));
        assert!(toml_str.contains("[browser]"));
        assert!(toml_str.contains("[database]"));

        let parsed: AppConfig = toml::from_str(&toml_str).expect("parse serialized config");
        assert_eq!(parsed.portal.login_title, config.portal.login_title);
    }

    fn database_table(config: &AppConfig) -> toml::Table {
        let toml_str = toml::to_string_pretty(config).expect("serialize config");
        let mut table: toml::Table = toml_str.parse().expect("parse as table");
        match table.remove("database") {
            Some(toml::Value::Table(database)) => database,
            other => panic!("expected a [database] table, got {other:?}"),
        }
    }

    #[test]
    fn test_unset_password_is_not_written() {
        let database = database_table(&AppConfig::default());
        assert!(!database.contains_key("password"));
        assert_eq!(
            database.get("prompt_password"),
            Some(&toml::Value::Boolean(false))
        );

        let mut config = AppConfig::default();
        config.database.password = Some("hunter2".to_string());
        let database = database_table(&config);
        assert_eq!(
            database.get("password").and_then(toml::Value::as_str),
            Some("hunter2")
        );
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().expect("create temp dir");
        let config_path = tmp.path().join("config.toml");

        let mut config = AppConfig::default();
        config.scraper.process_count = 4;
        config.scraper.order_prefix = "HM".to_string();

        let contents = toml::to_string_pretty(&config).expect("serialize config");
        fs::write(&config_path, contents).expect("write config file");

        let loaded_contents = fs::read_to_string(&config_path).expect("read config file");
        let loaded: AppConfig = toml::from_str(&loaded_contents).expect("parse loaded config");

        assert_eq!(loaded.scraper.process_count, 4);
        assert_eq!(loaded.scraper.order_prefix, "HM");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("WOSYNC_PROCESS_COUNT", "6"),
            ("WOSYNC_HEADLESS", "true"),
            ("WOSYNC_DATABASE_URL", "postgres://db.internal/wo"),
            ("WOSYNC_DB_PASSWORD", "s3cret"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env(|key| vars.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.scraper.process_count, 6);
        assert!(config.scraper.headless_primary);
        assert!(config.scraper.headless_parallel);
        assert_eq!(
            config.database.url.as_deref(),
            Some("postgres://db.internal/wo")
        );
        assert_eq!(config.database.password.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_env_override_ignores_garbage() {
        let mut config = AppConfig::default();
        config.apply_env(|key| (key == "WOSYNC_PROCESS_COUNT").then(|| "many".to_string()));
        assert_eq!(config.scraper.process_count, 0);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[scraper]
process_count = 3

[database]
host = "db.example.org"
"#;

        let config: AppConfig = toml::from_str(toml_str).expect("parse partial config");
        assert_eq!(config.scraper.process_count, 3);
        assert_eq!(config.database.host, "db.example.org");
        // These should be defaults
        assert_eq!(config.database.port, 5432);
        assert!(config.scraper.headless_parallel);
    }

    #[test]
    fn test_profiles_dir_override() {
        let mut config = AppConfig::default();
        config.browser.profiles_dir = Some(PathBuf::from("/tmp/wosync-profiles"));
        assert_eq!(
            config.profiles_dir().expect("profiles dir"),
            PathBuf::from("/tmp/wosync-profiles")
        );
    }

    #[test]
    fn test_database_debug_redacts_password() {
        let mut config = DatabaseConfig::default();
        config.password = Some("hunter2".to_string());
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}
