use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

#[cfg(any(test, feature = "test-mocks"))]
use mockall::automock;

use super::profile::UserProfile;

/// Property key holding the URI the user returns to after sign-in
pub const REDIRECT_URI_KEY: &str = ".redirect";

/// Property key holding the CSRF correlation value
pub const CORRELATION_KEY: &str = ".xsrf";

/// Well-known claim types produced from the portal profile
pub mod claim_types {
    pub const NAME_IDENTIFIER: &str = "nameidentifier";
    pub const NAME: &str = "name";
    pub const GIVEN_NAME: &str = "givenname";
    pub const SURNAME: &str = "surname";
    pub const EMAIL: &str = "emailaddress";
}

// Request facts handed to the flow by the host
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub scheme: String,
    pub host: String,
    /// Prefix under which the middleware is mounted, empty at the root
    pub path_base: String,
    pub path: String,
    /// Raw query string without the leading `?`
    pub query_string: String,
    pub cookies: HashMap<String, String>,
}

impl RequestContext {
    pub fn new(scheme: &str, host: &str, path: &str) -> Self {
        Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    pub fn with_path_base(mut self, path_base: &str) -> Self {
        self.path_base = path_base.to_string();
        self
    }

    pub fn with_query(mut self, query_string: &str) -> Self {
        self.query_string = query_string.trim_start_matches('?').to_string();
        self
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.insert(name.to_string(), value.to_string());
        self
    }

    /// `scheme://host` followed by the path base
    pub fn base_uri(&self) -> String {
        format!("{}://{}{}", self.scheme, self.host, self.path_base)
    }

    /// The full URI of the current request, query string included
    pub fn current_uri(&self) -> String {
        let mut uri = format!("{}{}", self.base_uri(), self.path);
        if !self.query_string.is_empty() {
            uri.push('?');
            uri.push_str(&self.query_string);
        }
        uri
    }

    pub fn query_values(&self, name: &str) -> Vec<String> {
        url::form_urlencoded::parse(self.query_string.as_bytes())
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
            .collect()
    }

    /// The parameter value when it occurs exactly once
    pub fn single_query_value(&self, name: &str) -> Option<String> {
        let mut values = self.query_values(name);
        if values.len() == 1 {
            values.pop()
        } else {
            None
        }
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}

/// Return properties carried through the portal round trip inside `state`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthProperties {
    items: BTreeMap<String, String>,
}

impl AuthProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.set_redirect_uri(redirect_uri);
        self
    }

    pub fn redirect_uri(&self) -> Option<&str> {
        self.get(REDIRECT_URI_KEY).filter(|uri| !uri.is_empty())
    }

    pub fn set_redirect_uri(&mut self, redirect_uri: impl Into<String>) {
        self.insert(REDIRECT_URI_KEY, redirect_uri);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.items.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.items.remove(key)
    }

    pub fn items(&self) -> &BTreeMap<String, String> {
        &self.items
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub claim_type: String,
    pub value: String,
    pub issuer: String,
}

/// Identity assembled from the portal profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedIdentity {
    pub authentication_scheme: String,
    claims: Vec<Claim>,
}

impl AuthenticatedIdentity {
    pub fn new(authentication_scheme: impl Into<String>) -> Self {
        Self {
            authentication_scheme: authentication_scheme.into(),
            claims: Vec::new(),
        }
    }

    /// Adds a claim issued by this identity's scheme
    pub fn add_claim(&mut self, claim_type: impl Into<String>, value: impl Into<String>) {
        let issuer = self.authentication_scheme.clone();
        self.claims.push(Claim {
            claim_type: claim_type.into(),
            value: value.into(),
            issuer,
        });
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    pub fn find_first(&self, claim_type: &str) -> Option<&Claim> {
        self.claims.iter().find(|c| c.claim_type == claim_type)
    }

    pub fn name(&self) -> Option<&str> {
        self.find_first(claim_types::NAME).map(|c| c.value.as_str())
    }

    /// Re-issues the claims under another scheme; issuers are kept
    pub fn with_scheme(self, authentication_scheme: impl Into<String>) -> Self {
        Self {
            authentication_scheme: authentication_scheme.into(),
            claims: self.claims,
        }
    }
}

/// Token endpoint response
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Seconds, string-encoded by the portal (plain numbers are accepted too)
    #[serde(default, deserialize_with = "string_or_number")]
    pub expires_in: Option<String>,
}

impl TokenResponse {
    /// Lifetime of the access token; absent when `expires_in` is not an integer
    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_in
            .as_deref()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Outcome of processing a callback request
#[derive(Debug)]
pub enum AuthenticationResult {
    Success {
        identity: AuthenticatedIdentity,
        properties: AuthProperties,
    },
    /// `properties` is `None` only when the state could not be decoded
    Failure {
        properties: Option<AuthProperties>,
        error: AuthError,
    },
}

impl AuthenticationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn identity(&self) -> Option<&AuthenticatedIdentity> {
        match self {
            Self::Success { identity, .. } => Some(identity),
            Self::Failure { .. } => None,
        }
    }

    pub fn properties(&self) -> Option<&AuthProperties> {
        match self {
            Self::Success { properties, .. } => Some(properties),
            Self::Failure { properties, .. } => properties.as_ref(),
        }
    }

    pub fn error(&self) -> Option<&AuthError> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error, .. } => Some(error),
        }
    }

    pub fn into_parts(self) -> (Option<AuthenticatedIdentity>, Option<AuthProperties>) {
        match self {
            Self::Success {
                identity,
                properties,
            } => (Some(identity), Some(properties)),
            Self::Failure { properties, .. } => (None, properties),
        }
    }
}

// Error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid state parameter")]
    StateDecodeFailure,

    #[error("Failed to protect state: {0}")]
    StateEncodeFailure(String),

    #[error("Correlation failed")]
    CsrfMismatch,

    #[error("Authorization code missing from callback")]
    MissingAuthorizationCode,

    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("Profile fetch failed: {0}")]
    ProfileFetchFailed(String),

    #[error("Provider hook failed: {0}")]
    ProviderHookFailed(String),

    #[error("Identity rejected by provider")]
    IdentityRejected,
}

/// Opaque, tamper-evident encoding of [`AuthProperties`]
pub trait StateDataFormat: Send + Sync {
    fn protect(&self, properties: &AuthProperties) -> Result<String, AuthError>;

    /// `None` for anything that was not produced by `protect` with the same key
    fn unprotect(&self, protected: &str) -> Option<AuthProperties>;
}

/// Backchannel calls against the portal
#[cfg_attr(any(test, feature = "test-mocks"), automock)]
#[async_trait]
pub trait PortalClientTrait: Send + Sync {
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AuthError>;

    async fn fetch_user_profile(&self, access_token: &str) -> Result<UserProfile, AuthError>;
}
