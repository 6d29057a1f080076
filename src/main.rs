//! Local server entrypoint.
//!
//! `LOG_FORMAT=json` switches tracing output to JSON lines; otherwise the
//! pretty formatter is used.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt};

use oidc_session_handler::config::Config;
use oidc_session_handler::session::spawn_eviction_task;
use oidc_session_handler::{AppState, create_app};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env for local dev
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt().with_env_filter(filter).init();
    }

    let state = match Config::from_env().and_then(AppState::from_config) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let _eviction = spawn_eviction_task(
        state.store.clone(),
        state.config.eviction_interval,
        state.config.invalidated_retention,
    );

    let addr = format!("0.0.0.0:{}", state.config.port);
    let app = create_app(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, addr = %addr, "Failed to bind");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Starting server on {}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "Server error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
