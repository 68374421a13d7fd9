use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use moka::future::Cache;
use services::auth::{
    generate_correlation_id, AuthProperties, AuthenticatedIdentity, RequestContext,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Scheme of the sample host's local cookie session
pub const COOKIE_AUTHENTICATION_SCHEME: &str = "Cookies";

const SESSION_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Local sign-in that the portal middleware hands authenticated identities to.
///
/// Implementations add whatever response headers establish or end their
/// session (typically `Set-Cookie`).
#[async_trait]
pub trait SessionSigner: Send + Sync {
    /// Scheme identities are signed in under when none is configured
    fn scheme(&self) -> &str;

    async fn sign_in(
        &self,
        request: &RequestContext,
        identity: &AuthenticatedIdentity,
        properties: &AuthProperties,
        headers: &mut HeaderMap,
    ) -> anyhow::Result<()>;

    async fn sign_out(&self, request: &RequestContext, headers: &mut HeaderMap)
        -> anyhow::Result<()>;
}

/// Cookie-backed sessions kept in memory; sessions expire after a day
#[derive(Clone)]
pub struct CookieSessionStore {
    scheme: String,
    cookie_name: String,
    sessions: Cache<String, Arc<AuthenticatedIdentity>>,
}

impl CookieSessionStore {
    pub fn new() -> Self {
        Self::with_scheme(COOKIE_AUTHENTICATION_SCHEME)
    }

    pub fn with_scheme(scheme: &str) -> Self {
        Self {
            scheme: scheme.to_string(),
            cookie_name: format!(".session.{scheme}"),
            sessions: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(SESSION_LIFETIME)
                .build(),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub async fn identity(&self, session_id: &str) -> Option<Arc<AuthenticatedIdentity>> {
        self.sessions.get(session_id).await
    }
}

impl Default for CookieSessionStore {
    fn default() -> Self {
        Self::new()
    }
}

fn cookie_path(request: &RequestContext) -> String {
    if request.path_base.is_empty() {
        "/".to_string()
    } else {
        request.path_base.clone()
    }
}

fn append_cookie(headers: &mut HeaderMap, cookie: &Cookie<'_>) -> anyhow::Result<()> {
    headers.append(header::SET_COOKIE, HeaderValue::from_str(&cookie.to_string())?);
    Ok(())
}

#[async_trait]
impl SessionSigner for CookieSessionStore {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    async fn sign_in(
        &self,
        request: &RequestContext,
        identity: &AuthenticatedIdentity,
        _properties: &AuthProperties,
        headers: &mut HeaderMap,
    ) -> anyhow::Result<()> {
        let session_id = generate_correlation_id();
        self.sessions
            .insert(session_id.clone(), Arc::new(identity.clone()))
            .await;

        let cookie = Cookie::build((self.cookie_name.clone(), session_id))
            .http_only(true)
            .secure(request.scheme == "https")
            .same_site(SameSite::Lax)
            .path(cookie_path(request))
            .build();
        append_cookie(headers, &cookie)?;

        debug!(
            scheme = %self.scheme,
            name = identity.name().unwrap_or_default(),
            "Signed in session"
        );
        Ok(())
    }

    async fn sign_out(
        &self,
        request: &RequestContext,
        headers: &mut HeaderMap,
    ) -> anyhow::Result<()> {
        if let Some(session_id) = request.cookie(&self.cookie_name) {
            self.sessions.invalidate(session_id).await;
        }

        let mut cookie = Cookie::build((self.cookie_name.clone(), ""))
            .path(cookie_path(request))
            .build();
        cookie.make_removal();
        append_cookie(headers, &cookie)
    }
}

/// Resolves the session cookie and attaches the signed-in identity to the request
pub async fn session_middleware(
    State(store): State<Arc<CookieSessionStore>>,
    mut request: Request,
    next: Next,
) -> Response {
    let jar = CookieJar::from_headers(request.headers());
    let session_id = jar.get(store.cookie_name()).map(|c| c.value().to_string());

    if let Some(session_id) = session_id {
        match store.identity(&session_id).await {
            Some(identity) => {
                request.extensions_mut().insert(identity.as_ref().clone());
            }
            None => debug!("Unknown or expired session cookie"),
        }
    }

    next.run(request).await
}

/// Identity of the signed-in user; rejects with 401 when there is none
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub AuthenticatedIdentity);

impl<S> FromRequestParts<S> for CurrentIdentity
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedIdentity>()
            .cloned()
            .map(CurrentIdentity)
            .ok_or_else(|| StatusCode::UNAUTHORIZED.into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use services::auth::claim_types;

    fn identity() -> AuthenticatedIdentity {
        let mut identity = AuthenticatedIdentity::new(COOKIE_AUTHENTICATION_SCHEME);
        identity.add_claim(claim_types::GIVEN_NAME, "Johnny");
        identity
    }

    fn set_cookie(headers: &HeaderMap) -> String {
        headers
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_sign_in_issues_session_cookie() {
        let store = CookieSessionStore::new();
        let request = RequestContext::new("https", "localhost", "/signin-cognistreamer");
        let mut headers = HeaderMap::new();

        store
            .sign_in(&request, &identity(), &AuthProperties::new(), &mut headers)
            .await
            .unwrap();

        let cookie = Cookie::parse(set_cookie(&headers)).unwrap();
        assert_eq!(cookie.name(), ".session.Cookies");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.path(), Some("/"));

        let stored = store.identity(cookie.value()).await.unwrap();
        assert_eq!(*stored, identity());
    }

    #[tokio::test]
    async fn test_sign_out_forgets_session() {
        let store = CookieSessionStore::new();
        let request = RequestContext::new("http", "localhost", "/").with_path_base("/app");
        let mut headers = HeaderMap::new();
        store
            .sign_in(&request, &identity(), &AuthProperties::new(), &mut headers)
            .await
            .unwrap();
        let session_id = Cookie::parse(set_cookie(&headers)).unwrap().value().to_string();
        assert_eq!(
            Cookie::parse(set_cookie(&headers)).unwrap().path(),
            Some("/app")
        );

        let request = request.with_cookie(store.cookie_name(), &session_id);
        let mut headers = HeaderMap::new();
        store.sign_out(&request, &mut headers).await.unwrap();

        assert!(store.identity(&session_id).await.is_none());
        let removal = Cookie::parse(set_cookie(&headers)).unwrap();
        assert_eq!(removal.value(), "");
        assert!(removal.max_age().is_some_and(|age| age.is_zero()));
    }
}
