//! Server configuration

use std::path::{Path, PathBuf};

use auth::ServiceConfig;
use geocoding::{DEFAULT_NOMINATIM_URL, DEFAULT_USER_AGENT};
use serde::{Deserialize, Serialize};

/// Environment variables that may hold the hosted service URL, in priority order
const SERVICE_URL_VARS: &[&str] = &["SUPABASE_URL", "NEXT_PUBLIC_SUPABASE_URL"];

/// Environment variables that may hold the public API key, in priority order
const SERVICE_KEY_VARS: &[&str] = &[
    "SUPABASE_ANON_KEY",
    "NEXT_PUBLIC_SUPABASE_PUBLISHABLE_OR_ANON_KEY",
    "NEXT_PUBLIC_SUPABASE_ANON_KEY",
];

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "127.0.0.1:3000")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// JSON file holding contacts in local mode
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,

    /// File holding the persisted session in remote mode
    #[serde(default = "default_session_path")]
    pub session_path: PathBuf,

    /// Base URL of the geocoding service
    #[serde(default = "default_geocoder_url")]
    pub geocoder_url: String,

    /// User-Agent sent to the geocoding service
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Hosted backend project URL (remote mode)
    #[serde(default)]
    pub service_url: Option<String>,

    /// Hosted backend public API key (remote mode)
    #[serde(default)]
    pub service_api_key: Option<String>,

    /// Whether to enable CORS
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,

    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Where contacts are persisted, decided once at startup
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// Single-user mode: a JSON file on this machine, no accounts.
    Local { storage_path: PathBuf },
    /// Multi-user mode: the hosted backend, gated by sign-in.
    Remote {
        service: ServiceConfig,
        session_path: PathBuf,
    },
}

impl BackendConfig {
    /// Whether adding contacts requires a signed-in user
    pub fn requires_auth(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    /// Short label for logs and the API
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Local { .. } => "local",
            Self::Remote { .. } => "remote",
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1:3000".to_string()
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("network-map")
}

fn default_storage_path() -> PathBuf {
    data_dir().join(contact_store::CONTACTS_FILE_NAME)
}

fn default_session_path() -> PathBuf {
    data_dir().join("session.json")
}

fn default_geocoder_url() -> String {
    DEFAULT_NOMINATIM_URL.to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_enable_cors() -> bool {
    false
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            storage_path: default_storage_path(),
            session_path: default_session_path(),
            geocoder_url: default_geocoder_url(),
            user_agent: default_user_agent(),
            service_url: None,
            service_api_key: None,
            enable_cors: default_enable_cors(),
            cors_origins: Vec::new(),
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let file_config = match Self::find_config_file() {
            Some(path) => Some(Self::read_config_file(&path)?),
            None => None,
        };

        Self::from_sources(|key| std::env::var(key).ok(), file_config)
    }

    /// Build the configuration from a variable lookup and an optional file.
    ///
    /// The file replaces the defaults; the environment overrides the file.
    pub fn from_sources(
        lookup: impl Fn(&str) -> Option<String>,
        file_config: Option<ServerConfig>,
    ) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let first_var = |keys: &[&str]| keys.iter().find_map(|key| var(*key));

        let mut config = file_config.unwrap_or_default();

        if let Some(addr) = var("NETWORK_MAP_BIND_ADDRESS") {
            config.bind_address = addr;
        }

        if let Some(path) = var("NETWORK_MAP_STORAGE_PATH") {
            config.storage_path = PathBuf::from(path);
        }

        if let Some(path) = var("NETWORK_MAP_SESSION_PATH") {
            config.session_path = PathBuf::from(path);
        }

        if let Some(url) = var("NETWORK_MAP_GEOCODER_URL") {
            config.geocoder_url = url;
        }

        if let Some(agent) = var("NETWORK_MAP_USER_AGENT") {
            config.user_agent = agent;
        }

        if let Some(url) = first_var(SERVICE_URL_VARS) {
            config.service_url = Some(url);
        }

        if let Some(key) = first_var(SERVICE_KEY_VARS) {
            config.service_api_key = Some(key);
        }

        if let Some(val) = var("NETWORK_MAP_ENABLE_CORS") {
            config.enable_cors = val.parse().unwrap_or(false);
        }

        if let Some(origins) = var("NETWORK_MAP_CORS_ORIGINS") {
            config.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(level) = var("NETWORK_MAP_LOG_LEVEL") {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Select the persistence backend.
    ///
    /// Remote mode needs both the service URL and the API key; with either
    /// one missing the application runs locally.
    pub fn backend(&self) -> BackendConfig {
        let url = self.service_url.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let key = self.service_api_key.as_deref().map(str::trim).filter(|s| !s.is_empty());

        match (url, key) {
            (Some(url), Some(key)) => BackendConfig::Remote {
                service: ServiceConfig::new(url, key),
                session_path: self.session_path.clone(),
            },
            _ => BackendConfig::Local {
                storage_path: self.storage_path.clone(),
            },
        }
    }

    /// Whether exactly one of the backend URL and API key is set
    pub fn has_partial_backend(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        set(&self.service_url) != set(&self.service_api_key)
    }

    /// Find the config file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let locations = [
            PathBuf::from("network-map.toml"),
            dirs::config_dir()
                .map(|p| p.join("network-map").join("network-map.toml"))
                .unwrap_or_default(),
        ];

        locations.into_iter().find(|p| p.is_file())
    }

    fn read_config_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str::<ServerConfig>(&contents)?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidBindAddress(self.bind_address.clone()));
        }

        url::Url::parse(&self.geocoder_url)
            .map_err(|e| ConfigError::InvalidUrl(self.geocoder_url.clone(), e))?;

        if let BackendConfig::Remote { service, .. } = self.backend() {
            url::Url::parse(&service.url)
                .map_err(|e| ConfigError::InvalidUrl(service.url.clone(), e))?;
        }

        // The server holds a single session, so origins must be named explicitly
        if self.enable_cors && self.cors_origins.is_empty() {
            return Err(ConfigError::CorsOriginsRequired);
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid URL {0}: {1}")]
    InvalidUrl(String, url::ParseError),

    #[error("CORS is enabled but no allowed origins are configured")]
    CorsOriginsRequired,

    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}
