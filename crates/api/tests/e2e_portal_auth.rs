// E2E tests for portal sign-in through the sample host

mod common;

use axum::http::header;
use common::*;
use config::AuthenticationMode;

#[tokio::test]
async fn test_unauthenticated_request_is_redirected_to_portal() {
    let host = setup_test_host(AuthenticationMode::Active).await;

    let issued = challenge(&host).await;

    assert!(issued
        .authorize_url
        .starts_with(&format!("{}?", host.portal.url("/oauth2/authorize"))));
    let query = query_of(&issued.authorize_url);
    assert_eq!(query["response_type"], "code");
    assert_eq!(query["client_id"], CLIENT_ID);
    assert_eq!(query["scope"], "login profile");
    assert!(issued.redirect_uri.ends_with("/signin-cognistreamer"));
    assert!(issued.state.len() >= 32);
    assert!(issued.correlation.len() >= 32);
    assert!(!issued.authorize_url.contains(CLIENT_SECRET));
}

#[tokio::test]
async fn test_successful_responses_pass_through() {
    let host = setup_test_host(AuthenticationMode::Active).await;

    let response = host.server.get("/does-not-exist").await;

    assert_eq!(response.status_code(), 404);
    assert!(response.headers().get(header::LOCATION).is_none());
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn test_passive_mode_leaves_unrequested_401_alone() {
    let host = setup_test_host(AuthenticationMode::Passive).await;

    let response = host.server.get("/").await;

    assert_eq!(response.status_code(), 401);
    assert!(response.headers().get(header::LOCATION).is_none());
}

#[tokio::test]
async fn test_complete_sign_in_flow() {
    let host = setup_test_host(AuthenticationMode::Active).await;
    let issued = challenge(&host).await;
    let (token, profile) = mock_portal_sign_in(&host.portal, &issued.redirect_uri).await;

    let response = host
        .server
        .get(&format!(
            "/signin-cognistreamer?code=my_code&state={}",
            issued.state
        ))
        .add_header(
            header::COOKIE,
            cookie_header(&[(CORRELATION_COOKIE, &issued.correlation)]),
        )
        .await;

    assert_eq!(response.status_code(), 302);
    token.assert_hits_async(1).await;
    profile.assert_hits_async(1).await;

    // Back to where the challenge started
    let return_uri = location(response.headers());
    assert!(return_uri.ends_with('/'), "{return_uri}");
    assert!(!return_uri.contains("error="));

    let cookies = set_cookies(response.headers());
    assert_eq!(cookies.get(CORRELATION_COOKIE).map(String::as_str), Some(""));
    let session_id = cookies.get(SESSION_COOKIE).expect("session cookie").clone();

    let identity = host.sessions.identity(&session_id).await.unwrap();
    assert_eq!(identity.authentication_scheme, "Cookies");
    assert_eq!(identity.claims().len(), 5);
    assert_eq!(identity.name(), Some("cashj"));
    assert!(identity.claims().iter().all(|c| c.issuer == "CogniStreamer"));

    let response = host
        .server
        .get("/")
        .add_header(header::COOKIE, cookie_header(&[(SESSION_COOKIE, &session_id)]))
        .await;

    assert_eq!(response.status_code(), 200);
    assert_eq!(response.text(), "Authenticated as Johnny Cash!");
}

#[tokio::test]
async fn test_callback_without_correlation_cookie_is_denied() {
    let host = setup_test_host(AuthenticationMode::Active).await;
    let issued = challenge(&host).await;
    let (token, _profile) = mock_portal_sign_in(&host.portal, &issued.redirect_uri).await;

    let response = host
        .server
        .get(&format!(
            "/signin-cognistreamer?code=my_code&state={}",
            issued.state
        ))
        .add_header(
            header::COOKIE,
            cookie_header(&[(CORRELATION_COOKIE, "forged-correlation-value")]),
        )
        .await;

    assert_eq!(response.status_code(), 302);
    assert!(location(response.headers()).ends_with("/?error=access_denied"));
    assert!(set_cookies(response.headers()).get(SESSION_COOKIE).is_none());
    token.assert_hits_async(0).await;
}

#[tokio::test]
async fn test_callback_with_corrupt_state_fails() {
    let host = setup_test_host(AuthenticationMode::Active).await;
    let (token, _profile) =
        mock_portal_sign_in(&host.portal, "http://localhost/signin-cognistreamer").await;

    let response = host
        .server
        .get("/signin-cognistreamer?code=my_code&state=corrupt")
        .await;

    assert_eq!(response.status_code(), 500);
    assert!(response.headers().get(header::LOCATION).is_none());
    token.assert_hits_async(0).await;
}

#[tokio::test]
async fn test_portal_failure_redirects_with_access_denied() {
    let host = setup_test_host(AuthenticationMode::Active).await;
    let issued = challenge(&host).await;
    let token = host
        .portal
        .mock_async(|when, then| {
            when.method(httpmock::Method::POST).path("/oauth2/token");
            then.status(500);
        })
        .await;

    let response = host
        .server
        .get(&format!(
            "/signin-cognistreamer?code=my_code&state={}",
            issued.state
        ))
        .add_header(
            header::COOKIE,
            cookie_header(&[(CORRELATION_COOKIE, &issued.correlation)]),
        )
        .await;

    assert_eq!(response.status_code(), 302);
    assert!(location(response.headers()).ends_with("?error=access_denied"));
    token.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_sign_out_redirects_to_portal_logout() {
    let host = setup_test_host(AuthenticationMode::Active).await;
    let issued = challenge(&host).await;
    mock_portal_sign_in(&host.portal, &issued.redirect_uri).await;

    let response = host
        .server
        .get(&format!(
            "/signin-cognistreamer?code=my_code&state={}",
            issued.state
        ))
        .add_header(
            header::COOKIE,
            cookie_header(&[(CORRELATION_COOKIE, &issued.correlation)]),
        )
        .await;
    let session_id = set_cookies(response.headers())
        .remove(SESSION_COOKIE)
        .expect("session cookie");

    let response = host
        .server
        .get("/signout")
        .add_header(header::COOKIE, cookie_header(&[(SESSION_COOKIE, &session_id)]))
        .await;

    assert_eq!(response.status_code(), 302);
    let logout = location(response.headers());
    assert!(
        logout.starts_with(&format!(
            "{}?returnurl=http%3A%2F%2F",
            host.portal.url("/account/logout")
        )),
        "{logout}"
    );
    assert_eq!(
        set_cookies(response.headers()).get(SESSION_COOKIE).map(String::as_str),
        Some("")
    );
    assert!(host.sessions.identity(&session_id).await.is_none());

    // The old session no longer authenticates
    let response = host
        .server
        .get("/")
        .add_header(header::COOKIE, cookie_header(&[(SESSION_COOKIE, &session_id)]))
        .await;
    assert_eq!(response.status_code(), 302);
}
