use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::options::{AuthOptions, ClientSecret};
use super::ports::{AuthError, PortalClientTrait, TokenResponse};
use super::profile::UserProfile;

pub const AUTHORIZE_ENDPOINT: &str = "/oauth2/authorize";
pub const TOKEN_ENDPOINT: &str = "/oauth2/token";
pub const SIGN_OUT_ENDPOINT: &str = "/account/logout";
pub const USER_INFO_ENDPOINT: &str = "/api/v1.1/m/profile";

const MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024; // 10 MB

/// reqwest-backed client for the portal's token and profile endpoints
pub struct PortalClient {
    http_client: Client,
    token_endpoint: Url,
    user_info_endpoint: Url,
    client_id: String,
    client_secret: ClientSecret,
    timeout: Duration,
}

impl PortalClient {
    pub fn new(options: &AuthOptions) -> Result<Self, AuthError> {
        let backchannel = options.backchannel();
        let http_client = match &backchannel.http_client {
            Some(client) => client.clone(),
            None => {
                let mut builder = Client::builder().timeout(options.backchannel_timeout());
                if !backchannel.pinned_certificates.is_empty() {
                    builder = builder.tls_built_in_root_certs(false);
                    for certificate in &backchannel.pinned_certificates {
                        builder = builder.add_root_certificate(certificate.clone());
                    }
                }
                builder.build().map_err(|e| {
                    AuthError::Configuration(format!("Failed to build backchannel client: {e}"))
                })?
            }
        };

        Ok(Self {
            http_client,
            token_endpoint: options.portal_endpoint(TOKEN_ENDPOINT)?,
            user_info_endpoint: options.portal_endpoint(USER_INFO_ENDPOINT)?,
            client_id: options.client_id().to_string(),
            client_secret: options.client_secret().clone(),
            timeout: options.backchannel_timeout(),
        })
    }
}

// Reads the body and enforces the size cap
async fn read_json(response: Response) -> Result<Map<String, Value>, String> {
    let status = response.status();
    if !status.is_success() {
        return Err(format!("portal returned status: {status}"));
    }

    if response
        .content_length()
        .is_some_and(|len| usize::try_from(len).map_or(true, |len| len > MAX_RESPONSE_BYTES))
    {
        return Err("response body exceeds size limit".to_string());
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| format!("failed to read response body: {}", e.without_url()))?;
    if body.len() > MAX_RESPONSE_BYTES {
        return Err("response body exceeds size limit".to_string());
    }

    serde_json::from_slice(&body).map_err(|e| format!("response is not a JSON object: {e}"))
}

#[async_trait]
impl PortalClientTrait for PortalClient {
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AuthError> {
        debug!("Exchanging authorization code for token");

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.secret()),
        ];

        let response = self
            .http_client
            .post(self.token_endpoint.clone())
            .header(header::ACCEPT, "application/json")
            .form(&form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                AuthError::TokenExchangeFailed(format!("request failed: {}", e.without_url()))
            })?;

        let document = read_json(response)
            .await
            .map_err(AuthError::TokenExchangeFailed)?;

        serde_json::from_value(Value::Object(document))
            .map_err(|e| AuthError::TokenExchangeFailed(format!("malformed token response: {e}")))
    }

    async fn fetch_user_profile(&self, access_token: &str) -> Result<UserProfile, AuthError> {
        debug!("Fetching portal user profile");

        let response = self
            .http_client
            .get(self.user_info_endpoint.clone())
            .header(header::ACCEPT, "application/json")
            .bearer_auth(access_token)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                AuthError::ProfileFetchFailed(format!("request failed: {}", e.without_url()))
            })?;

        let document = read_json(response)
            .await
            .map_err(AuthError::ProfileFetchFailed)?;

        UserProfile::from_document(document)
    }
}
