use config::{AuthenticationMode, PortalConfig, DEFAULT_AUTHENTICATION_SCHEME, DEFAULT_CALLBACK_PATH};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::ports::{AuthError, StateDataFormat};
use super::provider::{AuthenticationProvider, DefaultAuthenticationProvider};
use super::state::EncryptedStateFormat;

/// OAuth2 client secret; never printed
#[derive(Clone)]
pub struct ClientSecret(String);

impl ClientSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ClientSecret([redacted])")
    }
}

/// How backchannel requests reach the portal.
///
/// Either a caller-supplied client (custom transport) or pinned root
/// certificates for the built-in client, not both.
#[derive(Clone, Default)]
pub struct Backchannel {
    pub http_client: Option<reqwest::Client>,
    pub pinned_certificates: Vec<reqwest::Certificate>,
}

/// Middleware configuration, immutable once built
#[derive(Clone)]
pub struct AuthOptions {
    portal_base_url: Url,
    client_id: String,
    client_secret: ClientSecret,
    callback_path: String,
    scope: Vec<String>,
    backchannel_timeout: Duration,
    authentication_mode: AuthenticationMode,
    authentication_scheme: String,
    caption: String,
    sign_in_as_scheme: Option<String>,
    provider: Arc<dyn AuthenticationProvider>,
    state_data_format: Arc<dyn StateDataFormat>,
    backchannel: Backchannel,
}

impl AuthOptions {
    pub fn new(
        portal_base_url: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Self, AuthError> {
        Self::builder(portal_base_url, client_id, client_secret).build()
    }

    pub fn builder(
        portal_base_url: &str,
        client_id: &str,
        client_secret: &str,
    ) -> AuthOptionsBuilder {
        AuthOptionsBuilder {
            portal_base_url: portal_base_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            callback_path: DEFAULT_CALLBACK_PATH.to_string(),
            scope: vec!["login".to_string(), "profile".to_string()],
            backchannel_timeout: Duration::from_secs(config::DEFAULT_BACKCHANNEL_TIMEOUT_SECS),
            authentication_mode: AuthenticationMode::Passive,
            authentication_scheme: DEFAULT_AUTHENTICATION_SCHEME.to_string(),
            caption: None,
            sign_in_as_scheme: None,
            provider: None,
            state_data_format: None,
            backchannel: Backchannel::default(),
        }
    }

    /// Validated options from file/environment configuration
    pub fn from_config(config: &PortalConfig) -> Result<Self, AuthError> {
        let mut builder = Self::builder(&config.base_url, &config.client_id, &config.client_secret)
            .with_callback_path(&config.callback_path)
            .with_scope(config.scopes.clone())
            .with_backchannel_timeout(Duration::from_secs(config.backchannel_timeout_secs))
            .with_authentication_mode(config.authentication_mode)
            .with_authentication_scheme(&config.authentication_scheme);

        if let Some(sign_in_as) = &config.sign_in_as {
            builder = builder.with_sign_in_as_scheme(sign_in_as);
        }

        if let Some(key) = &config.state_key {
            builder = builder.with_state_data_format(Arc::new(EncryptedStateFormat::from_hex(key)?));
        }

        for path in &config.pinned_certificates {
            let pem = std::fs::read(path).map_err(|e| {
                AuthError::Configuration(format!("Failed to read pinned certificate {path}: {e}"))
            })?;
            let certificate = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                AuthError::Configuration(format!("Invalid pinned certificate {path}: {e}"))
            })?;
            builder = builder.with_pinned_certificate(certificate);
        }

        builder.build()
    }

    pub fn portal_base_url(&self) -> &Url {
        &self.portal_base_url
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &ClientSecret {
        &self.client_secret
    }

    pub fn callback_path(&self) -> &str {
        &self.callback_path
    }

    pub fn scope(&self) -> &[String] {
        &self.scope
    }

    pub fn backchannel_timeout(&self) -> Duration {
        self.backchannel_timeout
    }

    pub fn authentication_mode(&self) -> AuthenticationMode {
        self.authentication_mode
    }

    pub fn authentication_scheme(&self) -> &str {
        &self.authentication_scheme
    }

    pub fn caption(&self) -> &str {
        &self.caption
    }

    pub fn sign_in_as_scheme(&self) -> Option<&str> {
        self.sign_in_as_scheme.as_deref()
    }

    pub fn provider(&self) -> &Arc<dyn AuthenticationProvider> {
        &self.provider
    }

    pub fn state_data_format(&self) -> &Arc<dyn StateDataFormat> {
        &self.state_data_format
    }

    pub fn backchannel(&self) -> &Backchannel {
        &self.backchannel
    }

    /// Name of the cookie carrying the CSRF correlation value
    pub fn correlation_cookie_name(&self) -> String {
        format!(".correlation.{}", self.authentication_scheme)
    }

    /// Resolves an absolute portal path against the configured base URL
    pub fn portal_endpoint(&self, path: &str) -> Result<Url, AuthError> {
        self.portal_base_url
            .join(path)
            .map_err(|e| AuthError::Configuration(format!("Invalid portal endpoint {path}: {e}")))
    }
}

impl fmt::Debug for AuthOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthOptions")
            .field("portal_base_url", &self.portal_base_url.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret)
            .field("callback_path", &self.callback_path)
            .field("scope", &self.scope)
            .field("backchannel_timeout", &self.backchannel_timeout)
            .field("authentication_mode", &self.authentication_mode)
            .field("authentication_scheme", &self.authentication_scheme)
            .field("sign_in_as_scheme", &self.sign_in_as_scheme)
            .finish_non_exhaustive()
    }
}

pub struct AuthOptionsBuilder {
    portal_base_url: String,
    client_id: String,
    client_secret: String,
    callback_path: String,
    scope: Vec<String>,
    backchannel_timeout: Duration,
    authentication_mode: AuthenticationMode,
    authentication_scheme: String,
    caption: Option<String>,
    sign_in_as_scheme: Option<String>,
    provider: Option<Arc<dyn AuthenticationProvider>>,
    state_data_format: Option<Arc<dyn StateDataFormat>>,
    backchannel: Backchannel,
}

impl AuthOptionsBuilder {
    pub fn with_callback_path(mut self, callback_path: &str) -> Self {
        self.callback_path = callback_path.to_string();
        self
    }

    pub fn with_scope<I, S>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope = scope.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_backchannel_timeout(mut self, timeout: Duration) -> Self {
        self.backchannel_timeout = timeout;
        self
    }

    pub fn with_authentication_mode(mut self, mode: AuthenticationMode) -> Self {
        self.authentication_mode = mode;
        self
    }

    pub fn with_authentication_scheme(mut self, scheme: &str) -> Self {
        self.authentication_scheme = scheme.to_string();
        self
    }

    pub fn with_caption(mut self, caption: &str) -> Self {
        self.caption = Some(caption.to_string());
        self
    }

    pub fn with_sign_in_as_scheme(mut self, scheme: &str) -> Self {
        self.sign_in_as_scheme = Some(scheme.to_string());
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn AuthenticationProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_state_data_format(mut self, format: Arc<dyn StateDataFormat>) -> Self {
        self.state_data_format = Some(format);
        self
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.backchannel.http_client = Some(client);
        self
    }

    pub fn with_pinned_certificate(mut self, certificate: reqwest::Certificate) -> Self {
        self.backchannel.pinned_certificates.push(certificate);
        self
    }

    pub fn build(self) -> Result<AuthOptions, AuthError> {
        if self.portal_base_url.trim().is_empty() {
            return Err(AuthError::Configuration(
                "Portal base URL option must be provided".to_string(),
            ));
        }
        if self.client_id.trim().is_empty() {
            return Err(AuthError::Configuration(
                "ClientId option must be provided".to_string(),
            ));
        }
        if self.client_secret.trim().is_empty() {
            return Err(AuthError::Configuration(
                "ClientSecret option must be provided".to_string(),
            ));
        }

        let portal_base_url = Url::parse(self.portal_base_url.trim())
            .map_err(|e| AuthError::Configuration(format!("Invalid portal base URL: {e}")))?;
        if portal_base_url.cannot_be_a_base() {
            return Err(AuthError::Configuration(
                "Portal base URL must be an absolute http(s) URL".to_string(),
            ));
        }

        if !self.callback_path.starts_with('/') {
            return Err(AuthError::Configuration(format!(
                "Callback path must start with '/': {}",
                self.callback_path
            )));
        }

        if self.backchannel.http_client.is_some() && !self.backchannel.pinned_certificates.is_empty()
        {
            return Err(AuthError::Configuration(
                "A custom backchannel HTTP client cannot be combined with pinned certificates"
                    .to_string(),
            ));
        }

        Ok(AuthOptions {
            portal_base_url,
            client_id: self.client_id,
            client_secret: ClientSecret::new(self.client_secret),
            callback_path: self.callback_path,
            scope: self.scope,
            backchannel_timeout: self.backchannel_timeout,
            authentication_mode: self.authentication_mode,
            caption: self
                .caption
                .unwrap_or_else(|| self.authentication_scheme.clone()),
            authentication_scheme: self.authentication_scheme,
            sign_in_as_scheme: self.sign_in_as_scheme,
            provider: self
                .provider
                .unwrap_or_else(|| Arc::new(DefaultAuthenticationProvider)),
            state_data_format: self
                .state_data_format
                .unwrap_or_else(|| Arc::new(EncryptedStateFormat::generate())),
            backchannel: self.backchannel,
        })
    }
}
