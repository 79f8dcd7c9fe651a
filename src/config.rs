//! Application configuration: backend selection and document store connection settings.

use std::{
    env, fmt, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

/// Default location on disk where the console looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
pub const CONFIG_PATH_ENV: &str = "GAMES_CONSOLE_CONFIG_PATH";

const BACKEND_ENV: &str = "GAMES_BACKEND";
const ENDPOINT_ENV: &str = "GAMES_ENDPOINT_URL";
const AUTH_KEY_ENV: &str = "GAMES_AUTH_KEY";
const USERNAME_ENV: &str = "GAMES_USERNAME";
const DATABASE_ENV: &str = "GAMES_DATABASE";
const COLLECTION_ENV: &str = "GAMES_COLLECTION";

const DEFAULT_DATABASE: &str = "GamesDB";
const DEFAULT_COLLECTION: &str = "Games";
const DEFAULT_CONNECT_ATTEMPTS: u32 = 5;

/// Failures while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config file `{path}`")]
    Read {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid JSON for [`AppConfig`].
    #[error("failed to parse config file `{path}`")]
    Parse {
        /// File that failed to parse.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// A remote backend was selected without a required setting.
    #[error("`{field}` must be set for the {backend} backend")]
    Missing {
        /// Name of the blank setting.
        field: &'static str,
        /// Backend that needs it.
        backend: Backend,
    },
    /// Backend name not recognised.
    #[error("unknown backend `{0}`; expected memory, mongo or couch")]
    UnknownBackend(String),
    /// The backend's cargo feature was not enabled.
    #[error("the {0} backend is not compiled into this build")]
    BackendDisabled(Backend),
}

/// Document store implementation backing the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Process-local collection, lost on exit.
    #[default]
    Memory,
    /// MongoDB collection.
    Mongo,
    /// CouchDB database, one id prefix per collection.
    Couch,
}

impl Backend {
    fn is_remote(self) -> bool {
        !matches!(self, Backend::Memory)
    }

    fn is_compiled(self) -> bool {
        match self {
            Backend::Memory => true,
            Backend::Mongo => cfg!(feature = "mongo-store"),
            Backend::Couch => cfg!(feature = "couch-store"),
        }
    }
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Backend::Memory),
            "mongo" | "mongodb" => Ok(Backend::Mongo),
            "couch" | "couchdb" => Ok(Backend::Couch),
            other => Err(ConfigError::UnknownBackend(other.to_owned())),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Memory => "memory",
            Backend::Mongo => "mongo",
            Backend::Couch => "couch",
        })
    }
}

/// Where the document collection lives and how to authenticate against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// MongoDB connection string or CouchDB base URL.
    pub endpoint_url: String,
    /// Password or key presented when authenticating.
    pub auth_key: String,
    /// User to authenticate as; anonymous when absent.
    pub username: Option<String>,
    /// Database name.
    pub database: String,
    /// Collection holding the `Games` documents.
    pub collection: String,
    /// Initial ping attempts before giving up on a connection.
    pub connect_attempts: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            endpoint_url: String::new(),
            auth_key: String::new(),
            username: None,
            database: DEFAULT_DATABASE.to_owned(),
            collection: DEFAULT_COLLECTION.to_owned(),
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
        }
    }
}

/// Immutable runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppConfig {
    /// Selected document store.
    pub backend: Backend,
    /// Connection settings, ignored by the memory backend.
    pub connection: ConnectionSettings,
}

impl AppConfig {
    /// Load configuration from disk and the process environment, then validate it.
    ///
    /// `path` takes precedence over [`CONFIG_PATH_ENV`]. A missing file falls
    /// back to built-in defaults; an unreadable or malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(resolve_config_path);
        Self::load_from(&path, |name| env::var(name).ok())
    }

    /// Load from `path`, reading overrides through `lookup` instead of the environment.
    pub fn load_from(
        path: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(contents) => {
                let raw = serde_json::from_str::<RawConfig>(&contents).map_err(|source| {
                    ConfigError::Parse {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
                info!(path = %path.display(), "loaded config file");
                raw
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                RawConfig::default()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let mut config: Self = raw.into();
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the configured backend, e.g. from a command line flag.
    pub fn with_backend(mut self, backend: Backend) -> Result<Self, ConfigError> {
        self.backend = backend;
        self.validate()?;
        Ok(self)
    }

    /// Fail fast on settings a remote backend cannot work without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.backend.is_compiled() {
            return Err(ConfigError::BackendDisabled(self.backend));
        }
        if !self.backend.is_remote() {
            return Ok(());
        }
        let settings = &self.connection;
        let required = [
            ("endpoint_url", &settings.endpoint_url),
            ("auth_key", &settings.auth_key),
            ("database", &settings.database),
            ("collection", &settings.collection),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing {
                    field,
                    backend: self.backend,
                });
            }
        }
        Ok(())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(backend) = lookup(BACKEND_ENV) {
            self.backend = backend.parse()?;
        }
        let settings = &mut self.connection;
        if let Some(endpoint) = lookup(ENDPOINT_ENV) {
            settings.endpoint_url = endpoint;
        }
        if let Some(key) = lookup(AUTH_KEY_ENV) {
            settings.auth_key = key;
        }
        if let Some(username) = lookup(USERNAME_ENV) {
            settings.username = Some(username).filter(|name| !name.trim().is_empty());
        }
        if let Some(database) = lookup(DATABASE_ENV) {
            settings.database = database;
        }
        if let Some(collection) = lookup(COLLECTION_ENV) {
            settings.collection = collection;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    backend: Backend,
    endpoint_url: Option<String>,
    auth_key: Option<String>,
    username: Option<String>,
    database: Option<String>,
    collection: Option<String>,
    connect_attempts: Option<u32>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = ConnectionSettings::default();
        Self {
            backend: value.backend,
            connection: ConnectionSettings {
                endpoint_url: value.endpoint_url.unwrap_or_default(),
                auth_key: value.auth_key.unwrap_or_default(),
                username: value.username,
                database: value.database.unwrap_or(defaults.database),
                collection: value.collection.unwrap_or(defaults.collection),
                connect_attempts: value
                    .connect_attempts
                    .unwrap_or(defaults.connect_attempts)
                    .max(1),
            },
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
