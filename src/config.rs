//! Application configuration management.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

/// Global configuration instance.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Directory under which folders are opened.
    pub music_root: PathBuf,
    /// Directory holding the local store collections.
    pub data_dir: PathBuf,
    /// Quiet period before a debounced playback-state save runs.
    pub save_debounce: Duration,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Log format (json or pretty).
    pub log_format: LogFormat,
    /// Allowed CORS origins (comma-separated, or * for all).
    pub cors_origins: Vec<String>,
}

/// Log output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable colored output.
    Pretty,
    /// JSON structured logging for production.
    Json,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Panics
    /// Panics if a numeric variable is present but invalid.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .expect("PORT must be a valid u16");

        let music_root =
            PathBuf::from(std::env::var("MUSIC_ROOT").unwrap_or_else(|_| "./music".to_string()));

        let data_dir =
            PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()));

        let save_debounce = Duration::from_millis(
            std::env::var("SAVE_DEBOUNCE_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse::<u64>()
                .expect("SAVE_DEBOUNCE_MS must be a valid integer"),
        );

        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_format = match std::env::var("LOG_FORMAT")
            .unwrap_or_else(|_| "pretty".to_string())
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let cors_origins = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host,
            port,
            music_root,
            data_dir,
            save_debounce,
            log_level,
            log_format,
            cors_origins,
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns an error if validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.music_root.exists() {
            return Err(ConfigError::MusicRootNotFound(
                self.music_root.display().to_string(),
            ));
        }

        if !self.music_root.is_dir() {
            return Err(ConfigError::MusicRootNotDirectory(
                self.music_root.display().to_string(),
            ));
        }

        if self.save_debounce.is_zero() {
            tracing::warn!("SAVE_DEBOUNCE_MS is 0, every state change will hit the store");
        }

        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir).map_err(|e| {
                ConfigError::DataDirectoryCreationFailed(self.data_dir.display().to_string(), e)
            })?;
        }

        Ok(())
    }

    /// Get the server bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Music root not found: {0}")]
    MusicRootNotFound(String),

    #[error("Music root is not a directory: {0}")]
    MusicRootNotDirectory(String),

    #[error("Failed to create data directory '{0}': {1}")]
    DataDirectoryCreationFailed(String, std::io::Error),
}

/// Initialize the global configuration.
///
/// Should be called once at application startup.
pub fn init() -> &'static Config {
    CONFIG.get_or_init(|| {
        dotenvy::dotenv().ok();
        Config::from_env()
    })
}

/// Get the global configuration.
///
/// # Panics
/// Panics if configuration has not been initialized.
pub fn get() -> &'static Config {
    CONFIG.get().expect("Configuration not initialized. Call config::init() first.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        std::env::remove_var("HOST");
        std::env::remove_var("PORT");
        std::env::remove_var("LOG_LEVEL");
        std::env::remove_var("SAVE_DEBOUNCE_MS");

        let config = Config::from_env();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.save_debounce, Duration::from_millis(1000));
    }

    #[test]
    fn test_cors_origins_parsing() {
        std::env::set_var("CORS_ORIGINS", "http://localhost:3000, http://example.com");

        let config = Config::from_env();

        assert_eq!(config.cors_origins.len(), 2);
        assert!(config.cors_origins.contains(&"http://localhost:3000".to_string()));
        assert!(config.cors_origins.contains(&"http://example.com".to_string()));

        std::env::remove_var("CORS_ORIGINS");
    }

    #[test]
    fn test_validate_rejects_missing_music_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::from_env();
        config.music_root = dir.path().join("missing");
        config.data_dir = dir.path().join("data");

        assert!(matches!(
            config.validate(),
            Err(ConfigError::MusicRootNotFound(_))
        ));
    }

    #[test]
    fn test_validate_creates_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::from_env();
        config.music_root = dir.path().to_path_buf();
        config.data_dir = dir.path().join("state");

        config.validate().unwrap();
        assert!(config.data_dir.is_dir());
    }
}
