pub mod middleware;
pub mod telemetry;

use crate::middleware::{
    portal_auth_middleware, session_middleware, CookieSessionStore, CurrentIdentity,
    PortalAuthState, SessionSigner, SignOutRequest,
};
use axum::{
    http::StatusCode, middleware::from_fn_with_state, response::IntoResponse, routing::get,
    Router,
};
use config::{AuthenticationMode, PortalConfig};
use services::auth::{claim_types, AuthError, AuthFlow, AuthOptions, AuthenticatedIdentity};
use std::sync::Arc;

/// Protected landing page of the sample host
pub async fn index(CurrentIdentity(identity): CurrentIdentity) -> String {
    greeting(&identity)
}

fn greeting(identity: &AuthenticatedIdentity) -> String {
    let claim = |claim_type: &str| {
        identity
            .find_first(claim_type)
            .map(|c| c.value.as_str())
            .unwrap_or_default()
    };
    format!(
        "Authenticated as {} {}!",
        claim(claim_types::GIVEN_NAME),
        claim(claim_types::SURNAME)
    )
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Options for the sample host.
///
/// The index route only ever answers with a bare 401, so the host always
/// challenges in active mode regardless of the configured mode.
pub fn sample_auth_options(config: &PortalConfig) -> Result<AuthOptions, AuthError> {
    let mut config = config.clone();
    config.authentication_mode = AuthenticationMode::Active;
    AuthOptions::from_config(&config)
}

/// Sample host: `GET /` behind portal sign-in and `GET /signout`.
///
/// The portal middleware runs inside the session middleware so that a
/// signed-in identity is resolved before the portal decides to challenge.
pub fn build_app(flow: Arc<AuthFlow>, sessions: Arc<CookieSessionStore>) -> Router {
    let sign_out_schemes = vec![
        sessions.scheme().to_string(),
        flow.options().authentication_scheme().to_string(),
    ];
    let portal_state = PortalAuthState::new(flow).with_session_signer(sessions.clone());

    Router::new()
        .route("/", get(index))
        .route(
            "/signout",
            get(move || {
                let schemes = sign_out_schemes.clone();
                async move { (SignOutRequest::new(schemes), StatusCode::OK).into_response() }
            }),
        )
        .fallback(not_found)
        .layer(from_fn_with_state(portal_state, portal_auth_middleware))
        .layer(from_fn_with_state(sessions, session_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_uses_given_name_and_surname() {
        let mut identity = AuthenticatedIdentity::new("Cookies");
        identity.add_claim(claim_types::GIVEN_NAME, "Johnny");
        identity.add_claim(claim_types::SURNAME, "Cash");

        assert_eq!(greeting(&identity), "Authenticated as Johnny Cash!");
    }

    #[test]
    fn test_sample_host_always_challenges_actively() {
        let config = PortalConfig::new("https://portalbase.com/", "id", "secret");
        assert_eq!(config.authentication_mode, AuthenticationMode::Passive);

        let options = sample_auth_options(&config).unwrap();
        assert_eq!(options.authentication_mode(), AuthenticationMode::Active);
        assert_eq!(options.client_id(), "id");
        assert_eq!(options.caption(), "CogniStreamer");
    }
}
