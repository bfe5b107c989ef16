//! Configuration module for the rfqbot daemon.
//!
//! Handles loading the TOML file and applying CLI / environment overrides.

pub mod file;

pub use file::{BridgeConfig, FileConfig};

use rfqbot_core::processors::PeerUri;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    bridge_url_override: Option<Url>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, bridge_url_override: Option<Url>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            bridge_url_override,
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Read the TOML file, apply overrides and validate.
    pub fn load(&self) -> Result<FileConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(base_url) = &self.bridge_url_override {
            file_config.bridge.base_url = base_url.clone();
        }

        self.validate(&file_config)?;
        Ok(file_config)
    }

    /// Reload the configuration (used on SIGHUP).
    pub fn reload(&self) -> Result<FileConfig, ConfigError> {
        self.load()
    }

    fn validate(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let scheme = config.bridge.base_url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(ConfigError::ValidationError(format!(
                "bridge base_url must be http or https, got {scheme}"
            )));
        }

        for channel in &config.automation.channels {
            if channel.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "automation channels must not be blank".to_string(),
                ));
            }
        }

        if let Some(guard) = &config.ln_guard {
            PeerUri::parse(&guard.peer_uri).map_err(|e| {
                ConfigError::ValidationError(format!("ln_guard peer_uri: {e}"))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    const VALID: &str = r#"
[bridge]
base_url = "http://127.0.0.1:9333"

[automation]
channels = ["0000intercomswapbtcusdt"]
enable_settlement = true
"#;

    #[test]
    fn test_load_valid_config() {
        let file = write_config(VALID);
        let config = ConfigLoader::new(file.path(), None).load().unwrap();
        assert_eq!(config.bridge.base_url.as_str(), "http://127.0.0.1:9333/");
        assert!(config.automation.enable_settlement);
    }

    #[test]
    fn test_bridge_url_override() {
        let file = write_config(VALID);
        let url = Url::parse("https://peer.example.com/bridge/").unwrap();
        let config = ConfigLoader::new(file.path(), Some(url.clone()))
            .load()
            .unwrap();
        assert_eq!(config.bridge.base_url, url);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::new(dir.path().join("absent.toml"), None);
        assert!(matches!(loader.load(), Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_invalid_toml() {
        let file = write_config("[bridge\nbase_url = 1");
        let loader = ConfigLoader::new(file.path(), None);
        assert!(matches!(loader.load(), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            "[bridge]\nbase_url = \"ftp://127.0.0.1\"\n",
            "[bridge]\nbase_url = \"http://127.0.0.1\"\n[automation]\nchannels = [\" \"]\n",
            "[bridge]\nbase_url = \"http://127.0.0.1\"\n[ln_guard]\npeer_uri = \"nodeid\"\n",
        ];
        for content in cases {
            let file = write_config(content);
            let result = ConfigLoader::new(file.path(), None).load();
            assert!(
                matches!(result, Err(ConfigError::ValidationError(_))),
                "expected validation error for {content:?}"
            );
        }
    }

    #[test]
    fn test_reload_picks_up_changes() {
        let mut file = write_config(VALID);
        let loader = ConfigLoader::new(file.path(), None);
        assert!(loader.load().unwrap().ln_guard.is_none());

        file.write_all(b"\n[ln_guard]\ninterval_ms = 20000\n").unwrap();
        let reloaded = loader.reload().unwrap();
        assert_eq!(reloaded.ln_guard.unwrap().interval_ms, 20_000);
    }
}
