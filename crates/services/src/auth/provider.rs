//! Extension points invoked by the authentication flow.
//!
//! Embedding applications implement [`AuthenticationProvider`] to audit,
//! enrich or veto sign-ins without touching the flow itself. Every hook has a
//! default, so an empty `impl` behaves like [`DefaultAuthenticationProvider`].

use async_trait::async_trait;
use std::time::Duration;

use super::ports::{AuthProperties, AuthenticatedIdentity};
use super::profile::UserProfile;

/// Handed to [`AuthenticationProvider::authenticated`] once the portal profile is known
pub struct AuthenticatedContext {
    pub profile: UserProfile,
    pub access_token: String,
    pub expires_in: Option<Duration>,
    /// Clearing this rejects the sign-in
    pub identity: Option<AuthenticatedIdentity>,
    pub properties: AuthProperties,
}

/// Handed to [`AuthenticationProvider::return_endpoint`] before the local sign-in
#[derive(Debug)]
pub struct ReturnEndpointContext {
    /// `None` when authentication failed or was rejected
    pub identity: Option<AuthenticatedIdentity>,
    pub properties: AuthProperties,
    pub redirect_uri: Option<String>,
    pub sign_in_as_scheme: Option<String>,
    request_completed: bool,
}

impl ReturnEndpointContext {
    pub fn new(
        identity: Option<AuthenticatedIdentity>,
        properties: AuthProperties,
        sign_in_as_scheme: Option<String>,
    ) -> Self {
        let redirect_uri = properties.redirect_uri().map(str::to_string);
        Self {
            identity,
            properties,
            redirect_uri,
            sign_in_as_scheme,
            request_completed: false,
        }
    }

    /// Stops the middleware from redirecting after sign-in
    pub fn request_completed(&mut self) {
        self.request_completed = true;
    }

    pub fn is_request_completed(&self) -> bool {
        self.request_completed
    }
}

/// Handed to [`AuthenticationProvider::apply_redirect`] when a challenge is issued
#[derive(Debug)]
pub struct ApplyRedirectContext {
    redirect_uri: String,
    properties: AuthProperties,
    location: Option<String>,
}

impl ApplyRedirectContext {
    pub fn new(redirect_uri: String, properties: AuthProperties) -> Self {
        Self {
            redirect_uri,
            properties,
            location: None,
        }
    }

    /// The portal authorize URL computed for this challenge
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn properties(&self) -> &AuthProperties {
        &self.properties
    }

    /// Sends the user agent to `location`
    pub fn redirect(&mut self, location: impl Into<String>) {
        self.location = Some(location.into());
    }

    /// Leaves the challenged response untouched
    pub fn suppress(&mut self) {
        self.location = None;
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn into_parts(self) -> (Option<String>, AuthProperties) {
        (self.location, self.properties)
    }
}

#[async_trait]
pub trait AuthenticationProvider: Send + Sync {
    /// Invoked whenever the portal successfully authenticates a user
    async fn authenticated(&self, _context: &mut AuthenticatedContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Invoked before the identity is handed to the local session and the
    /// browser is sent back to the originally requested URL
    async fn return_endpoint(&self, _context: &mut ReturnEndpointContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Invoked when a challenge causes a redirect to the authorize endpoint
    fn apply_redirect(&self, context: &mut ApplyRedirectContext) {
        let location = context.redirect_uri().to_string();
        context.redirect(location);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAuthenticationProvider;

impl AuthenticationProvider for DefaultAuthenticationProvider {}
