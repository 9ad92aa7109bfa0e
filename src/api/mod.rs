//! HTTP surface: router wiring, request tracing and the server loop.

use crate::api::handlers::{auth, error, health, root};
use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::{get, post},
    Extension, Json, Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

pub mod handlers;
mod openapi;
pub mod state;
pub mod views;

pub use openapi::openapi;
pub use state::{AuthConfig, AuthState};

/// Build the application router.
///
/// `pool` is only used by `/health`; `None` means the in-memory stores are in
/// use and there is no database to probe.
pub fn router(auth_state: Arc<AuthState>, pool: Option<PgPool>) -> Router {
    Router::new()
        .route("/", get(root::root))
        .route("/hello", get(root::hello))
        .route("/health", get(health::health).options(health::health))
        .route("/api-docs/openapi.json", get(|| async { Json(openapi()) }))
        .route("/auth/login/:project_id", get(auth::login_bind))
        .route("/auth/login", get(auth::login_form).post(auth::login))
        .route("/auth/signup", get(auth::signup_form).post(auth::signup))
        .route(
            "/auth/email-confirmation",
            get(auth::pending_confirmation),
        )
        .route("/auth/confirm/resend", post(auth::resend_confirmation))
        .route("/auth/confirm/:user_id/:code", get(auth::confirm))
        .route("/error/failure", get(error::failure))
        .route("/error/go-back", get(error::go_back))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(auth_state))
                .layer(Extension(pool)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, auth_state: Arc<AuthState>, pool: Option<PgPool>) -> Result<()> {
    let app = router(auth_state, pool);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
