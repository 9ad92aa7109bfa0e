//! The single externally visible failure outcome.

use super::{failure_redirect, load_session};
use crate::api::{state::AuthState, views};
use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;

#[utoipa::path(
    get,
    path = "/error/failure",
    responses(
        (status = 200, description = "Generic failure view", body = String, content_type = "text/html")
    ),
    tag = "error"
)]
pub async fn failure() -> impl IntoResponse {
    views::failure()
}

#[utoipa::path(
    get,
    path = "/error/go-back",
    responses(
        (status = 303, description = "Redirect to the bound tenant's client URL, or to the failure page")
    ),
    tag = "error"
)]
pub async fn go_back(headers: HeaderMap, state: Extension<Arc<AuthState>>) -> Response {
    let session = load_session(&state, &headers).await;
    match session.context.binding() {
        Some(binding) => Redirect::to(&binding.client_url).into_response(),
        None => failure_redirect(),
    }
}
