//! Layered configuration.
//!
//! Priority (highest to lowest):
//! 1. `TWINCHAT_*` environment variables
//! 2. Explicit config path (`--config`)
//! 3. `./twinchat.toml`
//! 4. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::{BaseUrl, Client, ClientError};
use crate::dispatch::{Backend, Dispatcher, Endpoints, Mode};

/// Project-level config file name.
pub const PROJECT_FILE: &str = "twinchat.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "TWINCHAT_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error(transparent)]
    Extract(#[from] Box<figment::Error>),

    #[error(transparent)]
    Client(#[from] ClientError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Gateway in front of both backends.
    pub base_url: String,
    pub mode: Mode,
    /// Backend that receives image prompts.
    pub image_backend: Backend,
    pub connect_timeout_ms: u64,
    pub max_head_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_owned(),
            mode: Mode::Streaming,
            image_backend: Backend::Gemini,
            connect_timeout_ms: 5_000,
            max_head_bytes: 64 * 1024,
        }
    }
}

impl Config {
    /// Builds the figment for all sources without extracting it.
    pub fn figment(explicit: Option<&Path>) -> Result<Figment, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        let project = Path::new(PROJECT_FILE);
        if project.exists() {
            figment = figment.merge(Toml::file(project));
        }

        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_owned()));
            }
            figment = figment.merge(Toml::file(path));
        }

        Ok(figment.merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Loads configuration from every source.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment(explicit)?)
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        figment.extract().map_err(|e| ConfigError::Extract(Box::new(e)))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Builds a client for the configured gateway.
    pub fn client(&self) -> Result<Client, ConfigError> {
        let base: BaseUrl = self.base_url.parse()?;
        Ok(Client::new(base)
            .connect_timeout(self.connect_timeout())
            .max_head_bytes(self.max_head_bytes))
    }

    pub fn dispatcher(&self) -> Result<Dispatcher, ConfigError> {
        Ok(Dispatcher::new(
            self.client()?,
            Endpoints::new(self.image_backend),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn with_toml(toml: &str) -> Config {
        Config::from_figment(
            Figment::new()
                .merge(Serialized::defaults(Config::default()))
                .merge(Toml::string(toml)),
        )
        .unwrap()
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.mode, Mode::Streaming);
        assert_eq!(config.image_backend, Backend::Gemini);
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = with_toml(
            r#"
            base_url = "http://127.0.0.1:9090"
            mode = "single_shot"
            "#,
        );
        assert_eq!(config.base_url, "http://127.0.0.1:9090");
        assert_eq!(config.mode, Mode::SingleShot);
        assert_eq!(config.max_head_bytes, 64 * 1024);
    }

    #[test]
    fn bad_mode_is_an_error() {
        let result = Config::from_figment(
            Figment::new()
                .merge(Serialized::defaults(Config::default()))
                .merge(Toml::string(r#"mode = "sometimes""#)),
        );
        assert!(matches!(result, Err(ConfigError::Extract(_))));
    }

    #[test]
    fn explicit_file_is_read() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "connect_timeout_ms = 250").unwrap();
        writeln!(file, "image_backend = \"ollama\"").unwrap();

        let config = Config::from_figment(
            Figment::new()
                .merge(Serialized::defaults(Config::default()))
                .merge(Toml::file(file.path())),
        )
        .unwrap();
        assert_eq!(config.connect_timeout(), Duration::from_millis(250));
        assert_eq!(config.image_backend, Backend::Ollama);
    }

    #[test]
    fn missing_explicit_file() {
        let result = Config::figment(Some(Path::new("/definitely/not/here.toml")));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn invalid_base_url_surfaces_on_client() {
        let config = Config {
            base_url: "https://nope".to_owned(),
            ..Config::default()
        };
        assert!(matches!(config.client(), Err(ConfigError::Client(_))));
    }
}
