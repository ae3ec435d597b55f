use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf};
use thiserror::Error;

/// Deployment profile; selects the defaults every other section starts from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    Dev,
    Test,
    Prod,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CorsConfig {
    /// Origins allowed to call the API; empty means any origin.
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:5173".to_string()],
            allow_credentials: true,
            max_age_seconds: 600,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_id_header: String,
    /// Header carrying the caller identity, set by the authentication
    /// collaborator in front of this service.
    pub identity_header: String,
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_id_header: "x-request-id".to_string(),
            identity_header: "x-user-id".to_string(),
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Tuning for the live push hub.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct HubConfig {
    /// Outbound queue length per connection; events beyond it are missed.
    pub channel_capacity: usize,
    /// Interval between WebSocket pings.
    pub heartbeat_seconds: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            heartbeat_seconds: 25,
        }
    }
}

/// The main configuration structure for the Chatline server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub profile: Profile,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub hub: HubConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unsupported configuration format '{0}'. Use 'yaml', 'json', or 'toml'.")]
    UnsupportedFormat(String),
    #[error("invalid {name} value '{value}'")]
    InvalidEnv { name: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Defaults for the given deployment profile.
    #[must_use]
    pub fn default_for_profile(profile: Profile) -> Self {
        let mut config = Self {
            profile,
            ..Self::default()
        };

        match profile {
            Profile::Dev => {
                config.logging.level = "debug".to_string();
            }
            Profile::Test => {
                config.logging.level = "warn".to_string();
                config.hub.channel_capacity = 16;
                config.hub.heartbeat_seconds = 5;
            }
            Profile::Prod => {
                config.logging.format = LogFormat::Json;
                config.hub.channel_capacity = 256;
                config.server.cors.allowed_origins = Vec::new();
                config.server.cors.allow_credentials = false;
            }
        }

        config
    }

    /// Loads the configuration from a file, environment variables, or defaults.
    ///
    /// Precedence, lowest first: profile defaults, file, `CHATLINE_*`
    /// environment variables, `port_override`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, an environment
    /// override is malformed, or the result fails validation.
    pub fn load_config(
        config_path: Option<PathBuf>,
        port_override: Option<u16>,
    ) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => {
                let content = fs::read_to_string(&path)?;
                let extension = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                match extension.as_str() {
                    "yaml" | "yml" => serde_yml::from_str(&content)?,
                    "json" => serde_json::from_str(&content)?,
                    "toml" => toml::from_str(&content)?,
                    other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
                }
            }
            None => Self::default_for_profile(profile_from_env()?),
        };

        config.apply_env_overrides()?;

        if let Some(port) = port_override {
            config.server.port = port;
        }

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(port) = env::var("CHATLINE_SERVER_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "CHATLINE_SERVER_PORT",
                value: port,
            })?;
        }
        if let Ok(level) = env::var("CHATLINE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = env::var("CHATLINE_LOG_FORMAT") {
            self.logging.format = match format.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" => LogFormat::Text,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        name: "CHATLINE_LOG_FORMAT",
                        value: format,
                    });
                }
            };
        }
        if let Ok(capacity) = env::var("CHATLINE_HUB_CHANNEL_CAPACITY") {
            self.hub.channel_capacity =
                capacity.parse().map_err(|_| ConfigError::InvalidEnv {
                    name: "CHATLINE_HUB_CHANNEL_CAPACITY",
                    value: capacity,
                })?;
        }
        Ok(())
    }

    /// Checks invariants that serde defaults cannot express.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid(
                "server port must be greater than 0".to_string(),
            ));
        }
        if self.hub.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "hub channel capacity must be greater than 0".to_string(),
            ));
        }
        if self.server.identity_header.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "identity header must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn profile_from_env() -> Result<Profile, ConfigError> {
    match env::var("CHATLINE_PROFILE") {
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "dev" => Ok(Profile::Dev),
            "test" => Ok(Profile::Test),
            "prod" => Ok(Profile::Prod),
            _ => Err(ConfigError::InvalidEnv {
                name: "CHATLINE_PROFILE",
                value,
            }),
        },
        Err(_) => Ok(Profile::Dev),
    }
}
