use super::types::Config;
use std::path::PathBuf;

/// Overrides the config file location
pub const CONFIG_ENV_VAR: &str = "BCHANNEL_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// `$BCHANNEL_CONFIG`, or `~/.bchannel/config.toml`
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    dirs::home_dir()
        .unwrap_or_default()
        .join(".bchannel")
        .join("config.toml")
}

impl Config {
    /// Load the config file; a missing file yields the defaults
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path();
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the default config unless a file already exists
    ///
    /// Returns the path and whether a file was written.
    pub fn init() -> Result<(PathBuf, bool), ConfigError> {
        let path = config_path();
        if path.exists() {
            return Ok((path, false));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, Config::default().to_toml()?)?;
        Ok((path, true))
    }

    /// Reject values that would make negotiation meaningless
    pub fn check(&self) -> Result<(), ConfigError> {
        let tc = &self.test_channel;
        if tc.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("test_channel.request_timeout_ms must be > 0".into()));
        }
        if tc.early_detection_threshold_ms >= tc.request_timeout_ms {
            return Err(ConfigError::Invalid(
                "test_channel.early_detection_threshold_ms must be below request_timeout_ms".into(),
            ));
        }

        let probe = &self.blocked_probe;
        if probe.timeout_ms == 0 {
            return Err(ConfigError::Invalid("blocked_probe.timeout_ms must be > 0".into()));
        }
        if !probe.image_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "blocked_probe.image_path must be absolute, got {:?}",
                probe.image_path
            )));
        }

        let socket = &self.socket;
        if socket.backoff_base_ms == 0 {
            return Err(ConfigError::Invalid("socket.backoff_base_ms must be > 0".into()));
        }
        if socket.backoff_base_ms > socket.backoff_ceiling_ms {
            return Err(ConfigError::Invalid(
                "socket.backoff_base_ms must not exceed backoff_ceiling_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn print(&self) -> Result<(), ConfigError> {
        println!("{}", self.to_toml()?);
        Ok(())
    }
}
