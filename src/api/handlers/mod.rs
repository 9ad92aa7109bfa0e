//! HTTP handlers and the helpers they share.
//!
//! Every state-changing handler loads the caller's [`SessionContext`] from the
//! session cookie, hands it to the flow, and persists what the flow returns.
//! Terminal errors never reach the browser: they are logged here and the
//! response is a redirect to the single failure page.

pub mod auth;
pub mod error;
pub mod health;
pub mod root;

use crate::api::state::AuthState;
use crate::flow::FlowError;
use crate::session::{extract_session_token, session_cookie, SessionContext};
use axum::{
    http::{header::SET_COOKIE, HeaderMap},
    response::{IntoResponse, Redirect, Response},
};
use tracing::{error, warn};

pub const FAILURE_PATH: &str = "/error/failure";

/// Cookie token (if any) and the context stored for it.
pub(crate) struct LoadedSession {
    pub(crate) token: Option<String>,
    pub(crate) context: SessionContext,
}

pub(crate) async fn load_session(state: &AuthState, headers: &HeaderMap) -> LoadedSession {
    let token = extract_session_token(headers);
    let context = match &token {
        Some(token) => state.sessions().load(token).await,
        None => SessionContext::unbound(),
    };
    LoadedSession { token, context }
}

/// Re-issue the cookie of a bound session so its `Max-Age` restarts along with
/// the server-side idle timeout.
pub(crate) fn refresh_cookie(
    state: &AuthState,
    session: &LoadedSession,
    mut response: Response,
) -> Response {
    let Some(token) = session.token.as_deref() else {
        return response;
    };
    if !session.context.is_bound() {
        return response;
    }
    match session_cookie(
        token,
        state.config().session_ttl(),
        state.config().secure_cookies(),
    ) {
        Ok(cookie) => {
            response.headers_mut().insert(SET_COOKIE, cookie);
        }
        Err(err) => warn!("Failed to refresh session cookie: {err}"),
    }
    response
}

pub(crate) fn failure_redirect() -> Response {
    Redirect::to(FAILURE_PATH).into_response()
}

/// Log a terminal flow error with its tenant context and redirect to failure.
pub(crate) fn fail(step: &str, context: &SessionContext, err: &FlowError) -> Response {
    let project_id = context
        .binding()
        .map_or("none", |binding| binding.project_id.as_str());
    match err {
        FlowError::Binding => {
            warn!(step, project_id, "Rejected request without a bound project");
        }
        _ => error!(step, project_id, "Flow failed: {err:?}"),
    }
    failure_redirect()
}
