//! Server settings.
//!
//! Settings are layered with the `config` crate: built-in defaults, then an
//! optional file named by `LOCUS_CONFIG` (YAML, TOML or JSON), then
//! environment variables prefixed `LOCUS__`, with `__` separating nested
//! keys (`LOCUS__SERVER__PORT=9000`).
//!
//! ```yaml
//! server:
//!   host: 0.0.0.0
//!   port: 8080
//! source:
//!   fixture: fixtures/locations.yml
//! sync:
//!   cacheStrategy: aggressive
//!   maxConcurrentRefreshes: 5
//!   ttl:
//!     status: { staleTtl: 30s, hardTtl: 2m }
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use locus_sync::{ConfigError, SyncConfig};
use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming the settings file.
pub const CONFIG_PATH_ENV: &str = "LOCUS_CONFIG";

/// Errors raised while loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid server host '{0}'")]
    Host(String),

    #[error("invalid sync settings: {0}")]
    Sync(#[from] ConfigError),
}

/// Listening address.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Where location data comes from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Fixture file served by the static source.
    pub fixture: PathBuf,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            fixture: PathBuf::from("fixtures/locations.yml"),
        }
    }
}

/// All server settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub source: SourceSettings,
    pub sync: SyncConfig,
}

impl Settings {
    /// Loads settings from `LOCUS_CONFIG` (if set) and the environment.
    pub fn load() -> Result<Self, SettingsError> {
        let path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let env = Environment::with_prefix("LOCUS")
            .prefix_separator("__")
            .separator("__");
        Self::from_sources(path.as_deref(), env)
    }

    /// Loads settings from an optional file layered under the given
    /// environment source.
    pub fn from_sources(file: Option<&Path>, env: Environment) -> Result<Self, SettingsError> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings: Settings = builder.add_source(env).build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        self.server
            .host
            .parse::<IpAddr>()
            .map_err(|_| SettingsError::Host(self.server.host.clone()))?;
        self.sync.validate()?;
        Ok(())
    }

    /// The socket address to bind.
    pub fn socket_addr(&self) -> Result<SocketAddr, SettingsError> {
        let ip = self
            .server
            .host
            .parse::<IpAddr>()
            .map_err(|_| SettingsError::Host(self.server.host.clone()))?;
        Ok(SocketAddr::new(ip, self.server.port))
    }
}
