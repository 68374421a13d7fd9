use api::{
    build_app, middleware::CookieSessionStore, sample_auth_options, telemetry::init_tracing,
};
use config::{ApiConfig, ConfigError};
use services::auth::AuthFlow;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Load configuration first to get logging settings
    let config = match ApiConfig::load() {
        Ok(config) => config,
        Err(ConfigError::FileNotFound { paths }) => {
            ApiConfig::from_env().unwrap_or_else(|e| {
                eprintln!("No configuration file found (tried {paths}) and environment is incomplete: {e}");
                std::process::exit(1);
            })
        }
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            eprintln!("Application cannot start without a valid configuration file.");
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging);

    let options = sample_auth_options(&config.portal).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid portal configuration");
        std::process::exit(1);
    });
    if config.portal.state_key.is_none() {
        tracing::warn!("No state key configured, sign-ins in flight will not survive a restart");
    }

    let flow = Arc::new(AuthFlow::new(options).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to create portal client");
        std::process::exit(1);
    }));
    let sessions = Arc::new(CookieSessionStore::new());

    let options = flow.options();
    tracing::info!(
        caption = %options.caption(),
        portal = %options.portal_base_url(),
        client_id = %options.client_id(),
        mode = ?options.authentication_mode(),
        callback = %options.callback_path(),
        "Portal authentication configured"
    );

    let app = build_app(flow.clone(), sessions);

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    let listener = match tokio::net::TcpListener::bind(&bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %bind_address, error = %e, "Failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!(address = %bind_address, "Server started successfully");
    tracing::info!("Endpoints:");
    tracing::info!("  - GET /        (protected, signs in through the portal)");
    tracing::info!("  - GET /signout (ends the local and portal sessions)");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
