#![allow(dead_code)]

use api::{build_app, middleware::CookieSessionStore};
use axum::http::{header, HeaderMap, HeaderValue};
use config::AuthenticationMode;
use httpmock::prelude::*;
use serde_json::json;
use services::auth::{AuthFlow, AuthOptions, AuthOptionsBuilder};
use std::collections::HashMap;
use std::sync::Arc;

pub const CLIENT_ID: &str = "LoginProviderTest";
pub const CLIENT_SECRET: &str = "S3cr3t";
pub const CORRELATION_COOKIE: &str = ".correlation.CogniStreamer";
pub const SESSION_COOKIE: &str = ".session.Cookies";

/// Sample host wired to a fake portal
pub struct TestHost {
    pub server: axum_test::TestServer,
    pub portal: MockServer,
    pub sessions: Arc<CookieSessionStore>,
}

pub async fn setup_test_host(mode: AuthenticationMode) -> TestHost {
    setup_custom_host(|options| options.with_authentication_mode(mode)).await
}

/// Sample host in active mode with further options applied
pub async fn setup_custom_host(
    configure: impl FnOnce(AuthOptionsBuilder) -> AuthOptionsBuilder,
) -> TestHost {
    let portal = MockServer::start_async().await;

    let options = AuthOptions::builder(&portal.base_url(), CLIENT_ID, CLIENT_SECRET)
        .with_authentication_mode(AuthenticationMode::Active);
    let options = configure(options).build().unwrap();
    let flow = Arc::new(AuthFlow::new(options).unwrap());
    let sessions = Arc::new(CookieSessionStore::new());

    let app = build_app(flow, sessions.clone());
    TestHost {
        server: axum_test::TestServer::new(app).unwrap(),
        portal,
        sessions,
    }
}

/// Portal answering the token and profile endpoints for Johnny Cash
pub async fn mock_portal_sign_in<'a>(
    portal: &'a MockServer,
    redirect_uri: &str,
) -> (httpmock::Mock<'a>, httpmock::Mock<'a>) {
    let token = portal
        .mock_async(|when, then| {
            when.method(POST)
                .path("/oauth2/token")
                .x_www_form_urlencoded_tuple("grant_type", "authorization_code")
                .x_www_form_urlencoded_tuple("code", "my_code")
                .x_www_form_urlencoded_tuple("redirect_uri", redirect_uri)
                .x_www_form_urlencoded_tuple("client_id", CLIENT_ID)
                .x_www_form_urlencoded_tuple("client_secret", CLIENT_SECRET);
            then.status(200).json_body(json!({
                "access_token": "at789",
                "refresh_token": "rt456",
                "expires_in": "1400",
                "token_type": "bearer"
            }));
        })
        .await;

    let profile = portal
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1.1/m/profile")
                .header("authorization", "Bearer at789");
            then.status(200).json_body(json!({
                "id": "dcec99ad-28e1-4194-a4e0-f22148963cc5",
                "username": "cashj",
                "firstName": "Johnny",
                "lastName": "Cash",
                "email": "cashj@walktheline.com"
            }));
        })
        .await;

    (token, profile)
}

pub fn location(headers: &HeaderMap) -> String {
    headers
        .get(header::LOCATION)
        .expect("Location header")
        .to_str()
        .unwrap()
        .to_string()
}

pub fn query_of(url: &str) -> HashMap<String, String> {
    url::Url::parse(url)
        .unwrap()
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// `name=value` pairs of every Set-Cookie header
pub fn set_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect()
}

pub fn cookie_header(cookies: &[(&str, &str)]) -> HeaderValue {
    let value = cookies
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ");
    HeaderValue::from_str(&value).unwrap()
}

/// Runs the portal callback for an issued challenge with its correlation cookie
pub async fn complete_callback(
    host: &TestHost,
    issued: &IssuedChallenge,
) -> axum_test::TestResponse {
    host.server
        .get(&format!(
            "/signin-cognistreamer?code=my_code&state={}",
            issued.state
        ))
        .add_header(
            header::COOKIE,
            cookie_header(&[(CORRELATION_COOKIE, &issued.correlation)]),
        )
        .await
}

/// Result of challenging `GET /`
pub struct IssuedChallenge {
    pub authorize_url: String,
    pub redirect_uri: String,
    pub state: String,
    pub correlation: String,
}

pub async fn challenge(host: &TestHost) -> IssuedChallenge {
    let response = host.server.get("/").await;
    assert_eq!(response.status_code(), 302);

    let authorize_url = location(response.headers());
    let query = query_of(&authorize_url);
    let correlation = set_cookies(response.headers())
        .remove(CORRELATION_COOKIE)
        .expect("correlation cookie");

    IssuedChallenge {
        redirect_uri: query["redirect_uri"].clone(),
        state: query["state"].clone(),
        authorize_url,
        correlation,
    }
}
