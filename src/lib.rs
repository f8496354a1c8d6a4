//! QR issuance and claim-tracking service.
//!
//! Administrators mint batches of QR codes; users claim an unclaimed code
//! with a stated purpose and optional location, and can keep appending
//! location pings to build a movement path for it. Records live in MongoDB;
//! the auth service owns accounts and is consulted only to resolve a user id
//! to display fields.
//!
//! # Endpoints
//!
//! All routes are mounted under `/api/qr`:
//! - `POST /save` mints a batch, `GET /unclaimed` lists claimable codes
//! - `POST /claim` claims by id with a purpose, `GET /details/{value}` looks
//!   up a scanned value
//! - `GET /user/{userId}` and `GET /all` list claimed/all codes,
//!   `DELETE /{id}` removes one
//! - `POST /validate` checks ownership of a scanned value
//! - `POST /assign/{userId}/{value}`, `POST /{value}` and
//!   `POST /{value}/path` drive direct assignment and path tracking
//!
//! Responses use the `{"success": …}` envelope throughout; see
//! [`error::AppError`] for the failure statuses.
use std::time::Duration;

use axum::{
    Router,
    http::{HeaderValue, Method, header::CONTENT_TYPE},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod claims;
pub mod config;
pub mod database;
pub mod error;
pub mod qr;
pub mod routes;
pub mod state;
pub mod store;
pub mod user;

use routes::qr_routes;
use state::AppState;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await;

    info!("Starting server...");

    let origin = state
        .config
        .frontend_origin
        .parse::<HeaderValue>()
        .expect("Environment misconfigured!");
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(60 * 60));

    let app = Router::new()
        .nest("/api/qr", qr_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
