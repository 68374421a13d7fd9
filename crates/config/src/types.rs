use serde::Deserialize;
use std::{collections::HashMap, env, fmt};

pub const DEFAULT_AUTHENTICATION_SCHEME: &str = "CogniStreamer";
pub const DEFAULT_CALLBACK_PATH: &str = "/signin-cognistreamer";
pub const DEFAULT_BACKCHANNEL_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub portal: PortalConfig,
}

impl ApiConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            portal: PortalConfig::from_env()?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| "SERVER_PORT must be a valid port number")?,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Logging Configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

impl LoggingConfig {
    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        let mut modules = HashMap::new();

        // Load module-specific log levels
        if let Ok(level) = env::var("LOG_MODULE_API") {
            modules.insert("api".to_string(), level);
        }
        if let Ok(level) = env::var("LOG_MODULE_SERVICES") {
            modules.insert("services".to_string(), level);
        }

        Ok(Self {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            modules,
        })
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut modules = HashMap::new();
        modules.insert("api".to_string(), "debug".to_string());
        modules.insert("services".to_string(), "debug".to_string());

        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            modules,
        }
    }
}

/// Whether the middleware challenges every 401 or only explicit challenges
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticationMode {
    Active,
    #[default]
    Passive,
}

impl std::str::FromStr for AuthenticationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "passive" => Ok(Self::Passive),
            other => Err(format!("Unknown authentication mode: {other}")),
        }
    }
}

/// Portal (OAuth2 identity provider) configuration
#[derive(Clone, Deserialize)]
pub struct PortalConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_callback_path")]
    pub callback_path: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_backchannel_timeout_secs")]
    pub backchannel_timeout_secs: u64,
    #[serde(default)]
    pub authentication_mode: AuthenticationMode,
    #[serde(default = "default_authentication_scheme")]
    pub authentication_scheme: String,
    /// Scheme of the local session mechanism that persists the identity.
    /// Falls back to the session signer's own scheme when unset.
    #[serde(default)]
    pub sign_in_as: Option<String>,
    /// Hex-encoded 256-bit key protecting the callback state.
    /// A random per-process key is used when unset.
    #[serde(default)]
    pub state_key: Option<String>,
    /// PEM files pinned as the only trusted roots for backchannel calls
    #[serde(default)]
    pub pinned_certificates: Vec<String>,
}

fn default_callback_path() -> String {
    DEFAULT_CALLBACK_PATH.to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["login".to_string(), "profile".to_string()]
}

fn default_backchannel_timeout_secs() -> u64 {
    DEFAULT_BACKCHANNEL_TIMEOUT_SECS
}

fn default_authentication_scheme() -> String {
    DEFAULT_AUTHENTICATION_SCHEME.to_string()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl PortalConfig {
    /// Minimal configuration; everything else takes its default.
    pub fn new(base_url: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            callback_path: default_callback_path(),
            scopes: default_scopes(),
            backchannel_timeout_secs: default_backchannel_timeout_secs(),
            authentication_mode: AuthenticationMode::default(),
            authentication_scheme: default_authentication_scheme(),
            sign_in_as: None,
            state_key: None,
            pinned_certificates: Vec::new(),
        }
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self::new(
            &env::var("PORTAL_BASE_URL").map_err(|_| "PORTAL_BASE_URL not set")?,
            &env::var("PORTAL_CLIENT_ID").map_err(|_| "PORTAL_CLIENT_ID not set")?,
            &env::var("PORTAL_CLIENT_SECRET").map_err(|_| "PORTAL_CLIENT_SECRET not set")?,
        );

        if let Ok(path) = env::var("PORTAL_CALLBACK_PATH") {
            config.callback_path = path;
        }
        if let Ok(scopes) = env::var("PORTAL_SCOPES") {
            config.scopes = split_list(&scopes);
        }
        if let Ok(timeout) = env::var("PORTAL_BACKCHANNEL_TIMEOUT_SECS") {
            config.backchannel_timeout_secs = timeout
                .parse()
                .map_err(|_| "PORTAL_BACKCHANNEL_TIMEOUT_SECS must be a valid number")?;
        }
        if let Ok(mode) = env::var("PORTAL_AUTHENTICATION_MODE") {
            config.authentication_mode = mode.parse()?;
        }
        config.sign_in_as = env::var("PORTAL_SIGN_IN_AS").ok();
        config.state_key = env::var("PORTAL_STATE_KEY").ok();
        config.pinned_certificates = env::var("PORTAL_PINNED_CERTIFICATES")
            .map(|paths| split_list(&paths))
            .unwrap_or_default();

        Ok(config)
    }
}

impl fmt::Debug for PortalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalConfig")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("callback_path", &self.callback_path)
            .field("scopes", &self.scopes)
            .field("backchannel_timeout_secs", &self.backchannel_timeout_secs)
            .field("authentication_mode", &self.authentication_mode)
            .field("authentication_scheme", &self.authentication_scheme)
            .field("sign_in_as", &self.sign_in_as)
            .field("state_key", &self.state_key.as_ref().map(|_| "[redacted]"))
            .field("pinned_certificates", &self.pinned_certificates)
            .finish()
    }
}
