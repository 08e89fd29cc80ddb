use std::net::SocketAddr;

use axum::{middleware::from_fn_with_state, routing::get, routing::post, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use cohort_api::config;
use cohort_api::handlers;
use cohort_api::middleware::session_middleware;
use cohort_api::stores::{memory, AppState};

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up APP_ENV and friends
    let _ = dotenvy::dotenv();

    // Initialize configuration (this loads the config singleton)
    let config = config::config();

    tracing_subscriber::fmt::init();
    tracing::info!("Starting Cohort API in {:?} mode", config.environment);

    // Local serving runs against the in-memory collaborators; a deployment
    // wires the real identity/account/cache services here instead
    let state = memory::demo_state();
    let app = app(state);

    // Allow tests or deployments to override port via env
    let port = std::env::var("COHORT_API_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("Cohort API server listening on http://{}", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("server");
}

fn app(state: AppState) -> Router {
    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        // Gateway-fronted API
        .merge(auth_routes())
        .merge(participant_routes())
        // Global middleware
        .layer(from_fn_with_state(state.clone(), session_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn auth_routes() -> Router<AppState> {
    use handlers::auth;

    Router::new()
        .route("/v1/auth/signIn", post(auth::sign_in))
        .route("/v1/auth/reauth", post(auth::reauthenticate))
        .route("/v1/auth/signOut", post(auth::sign_out))
        .route("/v1/auth/session", get(auth::get_session))
}

fn participant_routes() -> Router<AppState> {
    use handlers::participants;

    Router::new()
        .route("/v1/participants/self", get(participants::get_self))
        .route(
            "/v1/participants/self/dataSharing",
            post(participants::update_sharing_scope),
        )
        .route(
            "/v1/participants/self/timeZone",
            post(participants::update_time_zone),
        )
        .route(
            "/v1/participants/self/externalId",
            post(participants::update_external_id),
        )
        .route("/v1/participants/:user_id", get(participants::get_participant))
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "Cohort API",
            "version": version,
            "description": "Research-study platform backend (session gateway)",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "auth": "/v1/auth/signIn, /v1/auth/reauth, /v1/auth/signOut, /v1/auth/session",
                "participants": "/v1/participants/self[...], /v1/participants/:user_id (elevated)",
            }
        }
    }))
}

async fn health() -> axum::response::Json<Value> {
    let now = chrono::Utc::now();

    axum::response::Json(json!({
        "success": true,
        "data": {
            "status": "ok",
            "timestamp": now,
            "environment": format!("{:?}", config::config().environment),
        }
    }))
}
