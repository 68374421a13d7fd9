use axum::{
    extract::{OriginalUri, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, IntoResponseParts, Response, ResponseParts},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use config::AuthenticationMode;
use services::auth::{
    access_denied_uri, AuthFlow, AuthProperties, CorrelationCookie, RequestContext,
};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::session::SessionSigner;

/// Asks the portal middleware to challenge a 401 response.
///
/// Handlers return it directly; in passive mode only challenges that name
/// the middleware's scheme are honoured.
#[derive(Debug, Clone, Default)]
pub struct ChallengeRequest {
    pub schemes: Vec<String>,
    pub properties: AuthProperties,
}

impl ChallengeRequest {
    pub fn new(scheme: &str) -> Self {
        Self {
            schemes: vec![scheme.to_string()],
            properties: AuthProperties::new(),
        }
    }

    pub fn with_redirect_uri(mut self, redirect_uri: &str) -> Self {
        self.properties.set_redirect_uri(redirect_uri);
        self
    }
}

impl IntoResponse for ChallengeRequest {
    fn into_response(self) -> Response {
        let mut response = StatusCode::UNAUTHORIZED.into_response();
        response.extensions_mut().insert(self);
        response
    }
}

/// Asks the named schemes to end their sessions
#[derive(Debug, Clone)]
pub struct SignOutRequest {
    pub schemes: Vec<String>,
}

impl SignOutRequest {
    pub fn new<I, S>(schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            schemes: schemes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn names(&self, scheme: &str) -> bool {
        self.schemes.iter().any(|s| s == scheme)
    }
}

impl IntoResponseParts for SignOutRequest {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        res.extensions_mut().insert(self);
        Ok(res)
    }
}

#[derive(Clone)]
pub struct PortalAuthState {
    pub flow: Arc<AuthFlow>,
    pub session_signer: Option<Arc<dyn SessionSigner>>,
}

impl PortalAuthState {
    pub fn new(flow: Arc<AuthFlow>) -> Self {
        Self {
            flow,
            session_signer: None,
        }
    }

    pub fn with_session_signer(mut self, signer: Arc<dyn SessionSigner>) -> Self {
        self.session_signer = Some(signer);
        self
    }

    // Configured scheme first, then the signer's own
    fn sign_in_as_scheme(&self) -> Option<String> {
        self.flow
            .options()
            .sign_in_as_scheme()
            .or_else(|| self.session_signer.as_ref().map(|s| s.scheme()))
            .map(str::to_string)
    }
}

/// Collects the request facts the flow works on.
///
/// Host comes from the URI authority, then the `Host` header. The path base
/// is whatever prefix a parent router stripped before this middleware ran.
pub fn request_context(request: &Request) -> RequestContext {
    let uri = request.uri();
    let original = request
        .extensions()
        .get::<OriginalUri>()
        .map(|OriginalUri(original)| original)
        .unwrap_or(uri);

    let scheme = uri
        .scheme_str()
        .or_else(|| original.scheme_str())
        .unwrap_or("http");

    let host = uri
        .authority()
        .or_else(|| original.authority())
        .map(|authority| authority.as_str())
        .or_else(|| {
            request
                .headers()
                .get(header::HOST)
                .and_then(|h| h.to_str().ok())
        })
        .unwrap_or("localhost");

    let path = uri.path();
    let path_base = original
        .path()
        .strip_suffix(path)
        .or_else(|| (path == "/").then(|| original.path().trim_end_matches('/')))
        .unwrap_or_default();

    let mut context = RequestContext::new(scheme, host, path)
        .with_path_base(path_base)
        .with_query(uri.query().unwrap_or_default());

    let jar = CookieJar::from_headers(request.headers());
    for cookie in jar.iter() {
        context
            .cookies
            .insert(cookie.name().to_string(), cookie.value().to_string());
    }

    context
}

/// Portal sign-in middleware.
///
/// Answers the callback path itself; every other request is passed on and
/// its response checked for a sign-out request or a challenge.
pub async fn portal_auth_middleware(
    State(state): State<PortalAuthState>,
    request: Request,
    next: Next,
) -> Response {
    let context = request_context(&request);

    if state.flow.is_callback(&context) {
        debug!("Handling portal callback");
        return invoke_return_path(&state, &context).await;
    }

    let response = next.run(request).await;
    let response = apply_sign_out(&state, &context, response).await;
    apply_challenge(&state, &context, response)
}

async fn invoke_return_path(state: &PortalAuthState, context: &RequestContext) -> Response {
    let result = state.flow.handle_callback(context).await;

    let mut headers = HeaderMap::new();
    expire_correlation_cookie(state, context, &mut headers);

    let (identity, properties) = result.into_parts();
    let Some(properties) = properties else {
        warn!("Invalid return state, unable to redirect.");
        return (StatusCode::INTERNAL_SERVER_ERROR, headers).into_response();
    };

    let return_context = match state
        .flow
        .return_endpoint(identity, properties, state.sign_in_as_scheme())
        .await
    {
        Ok(return_context) => return_context,
        Err(e) => {
            error!(error = %e, "Return endpoint hook failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, headers).into_response();
        }
    };

    if let (Some(scheme), Some(identity)) = (
        return_context.sign_in_as_scheme.as_deref(),
        return_context.identity.as_ref(),
    ) {
        let mut grant = identity.clone();
        if grant.authentication_scheme != scheme {
            grant = grant.with_scheme(scheme);
        }

        match &state.session_signer {
            Some(signer) => {
                if let Err(e) = signer
                    .sign_in(context, &grant, &return_context.properties, &mut headers)
                    .await
                {
                    error!(error = %e, scheme = %scheme, "Failed to sign in identity");
                    return (StatusCode::INTERNAL_SERVER_ERROR, headers).into_response();
                }
            }
            None => warn!(scheme = %scheme, "No session signer configured, identity not signed in"),
        }
    }

    if return_context.is_request_completed() {
        return (StatusCode::OK, headers).into_response();
    }

    match return_context.redirect_uri.as_deref() {
        Some(redirect_uri) => {
            let location = if return_context.identity.is_some() {
                redirect_uri.to_string()
            } else {
                // Hint that sign-in failed in some way
                access_denied_uri(redirect_uri)
            };
            found(&location, headers)
        }
        None => {
            warn!("No return URI in state, unable to redirect.");
            (StatusCode::INTERNAL_SERVER_ERROR, headers).into_response()
        }
    }
}

async fn apply_sign_out(
    state: &PortalAuthState,
    context: &RequestContext,
    mut response: Response,
) -> Response {
    let scheme = state.flow.options().authentication_scheme();
    let requested = response
        .extensions()
        .get::<SignOutRequest>()
        .is_some_and(|r| r.names(scheme));
    if !requested {
        return response;
    }

    let location = match state.flow.build_sign_out_redirect(context) {
        Ok(location) => location,
        Err(e) => {
            error!(error = %e, "Failed to build sign-out redirect");
            return response;
        }
    };

    if let Some(signer) = &state.session_signer {
        if let Err(e) = signer.sign_out(context, response.headers_mut()).await {
            error!(error = %e, "Failed to sign out local session");
        }
    }

    redirect_in_place(&mut response, &location);
    response
}

fn apply_challenge(
    state: &PortalAuthState,
    context: &RequestContext,
    mut response: Response,
) -> Response {
    if response.status() != StatusCode::UNAUTHORIZED {
        return response;
    }

    let options = state.flow.options();
    let scheme = options.authentication_scheme();
    let requested = response.extensions().get::<ChallengeRequest>();

    // A challenge without schemes counts as no challenge
    let properties = match requested.filter(|c| !c.schemes.is_empty()) {
        Some(challenge) if challenge.schemes.iter().any(|s| s == scheme) => {
            challenge.properties.clone()
        }
        Some(_) => return response,
        None => match options.authentication_mode() {
            AuthenticationMode::Active => requested
                .map(|c| c.properties.clone())
                .unwrap_or_default(),
            AuthenticationMode::Passive => return response,
        },
    };

    let challenge = match state.flow.build_challenge(context, properties) {
        Ok(challenge) => challenge,
        Err(e) => {
            error!(error = %e, "Failed to issue portal challenge");
            return response;
        }
    };

    set_correlation_cookie(&challenge.correlation_cookie, context, response.headers_mut());

    match challenge.location {
        Some(location) => redirect_in_place(&mut response, &location),
        None => debug!("Challenge redirect suppressed by provider"),
    }
    response
}

fn cookie_path(context: &RequestContext) -> String {
    if context.path_base.is_empty() {
        "/".to_string()
    } else {
        context.path_base.clone()
    }
}

fn append_set_cookie(headers: &mut HeaderMap, cookie: &Cookie<'_>) {
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            headers.append(header::SET_COOKIE, value);
        }
        Err(e) => error!(error = %e, cookie = %cookie.name(), "Invalid cookie value"),
    }
}

fn set_correlation_cookie(
    correlation: &CorrelationCookie,
    context: &RequestContext,
    headers: &mut HeaderMap,
) {
    let cookie = Cookie::build((correlation.name.clone(), correlation.value.clone()))
        .http_only(true)
        .secure(context.scheme == "https")
        .same_site(SameSite::Lax)
        .path(cookie_path(context))
        .build();
    append_set_cookie(headers, &cookie);
}

fn expire_correlation_cookie(
    state: &PortalAuthState,
    context: &RequestContext,
    headers: &mut HeaderMap,
) {
    let mut cookie = Cookie::build((state.flow.options().correlation_cookie_name(), ""))
        .path(cookie_path(context))
        .build();
    cookie.make_removal();
    append_set_cookie(headers, &cookie);
}

fn found(location: &str, mut headers: HeaderMap) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            headers.insert(header::LOCATION, value);
            (StatusCode::FOUND, headers).into_response()
        }
        Err(e) => {
            error!(error = %e, "Redirect location is not a valid header value");
            (StatusCode::INTERNAL_SERVER_ERROR, headers).into_response()
        }
    }
}

fn redirect_in_place(response: &mut Response, location: &str) {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            *response.status_mut() = StatusCode::FOUND;
            response.headers_mut().insert(header::LOCATION, value);
        }
        Err(e) => error!(error = %e, "Redirect location is not a valid header value"),
    }
}
