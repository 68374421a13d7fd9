use std::sync::Arc;
use tracing::{debug, error, warn};

use super::options::AuthOptions;
use super::portal::{PortalClient, AUTHORIZE_ENDPOINT, SIGN_OUT_ENDPOINT};
use super::ports::{
    AuthError, AuthProperties, AuthenticatedIdentity, AuthenticationResult, PortalClientTrait,
    RequestContext, TokenResponse, CORRELATION_KEY,
};
use super::profile::{map_identity, UserProfile};
use super::provider::{ApplyRedirectContext, AuthenticatedContext, ReturnEndpointContext};
use super::state::generate_correlation_id;

/// Cookie the host must set alongside a challenge redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationCookie {
    pub name: String,
    pub value: String,
}

/// Everything the host needs to answer a challenged response
#[derive(Debug, Clone)]
pub struct Challenge {
    /// Authorize URL computed by the flow
    pub authorize_url: String,
    /// Where to redirect, as decided by the apply-redirect hook; `None` suppresses the redirect
    pub location: Option<String>,
    pub correlation_cookie: CorrelationCookie,
    pub properties: AuthProperties,
}

/// The authorization code state machine.
///
/// Stateless across requests: every operation works on the request facts it
/// is given, so one instance is shared by all concurrent requests.
pub struct AuthFlow {
    options: Arc<AuthOptions>,
    portal: Arc<dyn PortalClientTrait>,
}

impl AuthFlow {
    /// Builds the flow with the reqwest-backed portal client
    pub fn new(options: AuthOptions) -> Result<Self, AuthError> {
        let portal = Arc::new(PortalClient::new(&options)?);
        Ok(Self::with_portal_client(options, portal))
    }

    pub fn with_portal_client(options: AuthOptions, portal: Arc<dyn PortalClientTrait>) -> Self {
        Self {
            options: Arc::new(options),
            portal,
        }
    }

    pub fn options(&self) -> &AuthOptions {
        &self.options
    }

    pub fn is_callback(&self, request: &RequestContext) -> bool {
        request.path == self.options.callback_path()
    }

    /// Redirect URI registered with the portal; must match exactly between
    /// the authorize request and the token exchange
    pub fn callback_uri(&self, request: &RequestContext) -> String {
        format!("{}{}", request.base_uri(), self.options.callback_path())
    }

    /// Issues a challenge that sends the user agent to the portal's authorize endpoint.
    ///
    /// The return URI is taken from `properties` when set, otherwise the
    /// current request URI is used.
    pub fn build_challenge(
        &self,
        request: &RequestContext,
        mut properties: AuthProperties,
    ) -> Result<Challenge, AuthError> {
        if properties.redirect_uri().is_none() {
            properties.set_redirect_uri(request.current_uri());
        }

        // OAuth2 10.12 CSRF
        let correlation_id = generate_correlation_id();
        properties.insert(CORRELATION_KEY, correlation_id.clone());

        let state = self.options.state_data_format().protect(&properties)?;
        let redirect_uri = self.callback_uri(request);
        let scope = self.options.scope().join(" ");

        let authorize_url = format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
            self.options.portal_endpoint(AUTHORIZE_ENDPOINT)?,
            urlencoding::encode(self.options.client_id()),
            urlencoding::encode(&redirect_uri),
            urlencoding::encode(&scope),
            urlencoding::encode(&state),
        );

        let mut context = ApplyRedirectContext::new(authorize_url.clone(), properties);
        self.options.provider().apply_redirect(&mut context);
        let (location, properties) = context.into_parts();

        Ok(Challenge {
            authorize_url,
            location,
            correlation_cookie: CorrelationCookie {
                name: self.options.correlation_cookie_name(),
                value: correlation_id,
            },
            properties,
        })
    }

    /// Processes the portal's redirect back to the callback path.
    ///
    /// Never fails: every problem is logged and reported as
    /// [`AuthenticationResult::Failure`].
    pub async fn handle_callback(&self, request: &RequestContext) -> AuthenticationResult {
        if !request.query_values("error").is_empty() {
            debug!("Remote server returned an error: {}", request.query_string);
        }

        let code = request.single_query_value("code");
        let state = request.single_query_value("state");

        let properties = state.and_then(|s| self.options.state_data_format().unprotect(&s));
        let Some(mut properties) = properties else {
            debug!("Remote server sent corrupt state");
            return AuthenticationResult::Failure {
                properties: None,
                error: AuthError::StateDecodeFailure,
            };
        };

        if let Err(error) = self.validate_correlation(request, &mut properties) {
            return AuthenticationResult::Failure {
                properties: Some(properties),
                error,
            };
        }

        let Some(code) = code else {
            debug!("Callback carried no authorization code");
            return AuthenticationResult::Failure {
                properties: Some(properties),
                error: AuthError::MissingAuthorizationCode,
            };
        };

        let redirect_uri = self.callback_uri(request);
        let (token, profile) = match self.redeem_code(&code, &redirect_uri).await {
            Ok(redeemed) => redeemed,
            Err(error) => {
                error!(error = %error, "Authentication failed");
                return AuthenticationResult::Failure {
                    properties: Some(properties),
                    error,
                };
            }
        };

        let identity = map_identity(&profile, self.options.authentication_scheme());
        let mut context = AuthenticatedContext {
            profile,
            expires_in: token.expires_in(),
            access_token: token.access_token,
            identity: Some(identity),
            properties,
        };

        if let Err(e) = self.options.provider().authenticated(&mut context).await {
            let error = AuthError::ProviderHookFailed(e.to_string());
            error!(error = %error, "Authentication failed");
            return AuthenticationResult::Failure {
                properties: Some(context.properties),
                error,
            };
        }

        match context.identity {
            Some(identity) => AuthenticationResult::Success {
                identity,
                properties: context.properties,
            },
            None => {
                debug!("Identity rejected by authenticated hook");
                AuthenticationResult::Failure {
                    properties: Some(context.properties),
                    error: AuthError::IdentityRejected,
                }
            }
        }
    }

    /// Runs the return-endpoint hook for a decoded callback outcome
    pub async fn return_endpoint(
        &self,
        identity: Option<AuthenticatedIdentity>,
        properties: AuthProperties,
        sign_in_as_scheme: Option<String>,
    ) -> Result<ReturnEndpointContext, AuthError> {
        let mut context = ReturnEndpointContext::new(identity, properties, sign_in_as_scheme);
        self.options
            .provider()
            .return_endpoint(&mut context)
            .await
            .map_err(|e| AuthError::ProviderHookFailed(e.to_string()))?;
        Ok(context)
    }

    /// Portal logout URL that returns the user agent to this application
    pub fn build_sign_out_redirect(&self, request: &RequestContext) -> Result<String, AuthError> {
        Ok(format!(
            "{}?returnurl={}",
            self.options.portal_endpoint(SIGN_OUT_ENDPOINT)?,
            urlencoding::encode(&request.base_uri()),
        ))
    }

    fn validate_correlation(
        &self,
        request: &RequestContext,
        properties: &mut AuthProperties,
    ) -> Result<(), AuthError> {
        // Never handed on, whatever the outcome
        let expected = properties.remove(CORRELATION_KEY);

        let cookie_name = self.options.correlation_cookie_name();
        let Some(cookie) = request.cookie(&cookie_name) else {
            warn!(cookie = %cookie_name, "Correlation cookie not found");
            return Err(AuthError::CsrfMismatch);
        };

        let Some(expected) = expected else {
            warn!("Correlation value missing from state");
            return Err(AuthError::CsrfMismatch);
        };

        if cookie != expected {
            warn!(cookie = %cookie_name, "Correlation cookie does not match state");
            return Err(AuthError::CsrfMismatch);
        }

        Ok(())
    }

    // Both backchannel calls, strictly in order
    async fn redeem_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<(TokenResponse, UserProfile), AuthError> {
        let token = self.portal.exchange_code(code, redirect_uri).await?;
        let profile = self.portal.fetch_user_profile(&token.access_token).await?;
        Ok((token, profile))
    }
}

/// Adds the hint that sign-in failed to a return URI
pub fn access_denied_uri(redirect_uri: &str) -> String {
    let separator = if redirect_uri.contains('?') { '&' } else { '?' };
    format!("{redirect_uri}{separator}error=access_denied")
}
