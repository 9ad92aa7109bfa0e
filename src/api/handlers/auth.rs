//! Browser-facing login, signup and confirmation endpoints.

use super::{fail, failure_redirect, load_session, refresh_cookie};
use crate::api::{state::AuthState, views};
use crate::confirmation::ConfirmationError;
use crate::flow::{FieldErrors, FlowError, SignupForm, INVALID_CREDENTIALS};
use crate::session::{generate_session_token, session_cookie, SessionContext};
use axum::{
    extract::{Extension, Form, Path},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use secrecy::SecretString;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;
use uuid::Uuid;

pub const PENDING_CONFIRMATION_PATH: &str = "/auth/email-confirmation";

#[derive(ToSchema, Deserialize, Debug, Default)]
#[serde(default)]
pub struct LoginRequest {
    email: String,
    #[schema(format = Password)]
    password: String,
}

#[derive(ToSchema, Deserialize, Debug, Default)]
#[serde(default)]
pub struct SignupRequest {
    first_name: String,
    last_name: String,
    email: String,
    #[schema(format = Password)]
    password: String,
    #[schema(format = Password)]
    confirm_password: String,
}

#[derive(ToSchema, Deserialize, Debug, Default)]
#[serde(default)]
pub struct ResendRequest {
    email: String,
}

#[utoipa::path(
    get,
    path = "/auth/login/{project_id}",
    params(("project_id" = String, Path, description = "Tenant project id")),
    responses(
        (status = 200, description = "Session bound, login form rendered", body = String, content_type = "text/html"),
        (status = 303, description = "Unknown project, redirect to the failure page")
    ),
    tag = "auth"
)]
pub async fn login_bind(
    headers: HeaderMap,
    Path(project_id): Path<String>,
    state: Extension<Arc<AuthState>>,
) -> Response {
    let session = load_session(&state, &headers).await;

    let context = match state.flow().bind(session.context.clone(), &project_id).await {
        Ok(context) => context,
        Err(err) => {
            // A failed rebind must not leave the previous tenant attached.
            if let Some(token) = &session.token {
                state.sessions().save(token, SessionContext::unbound()).await;
            }
            return fail("bind", &session.context, &err);
        }
    };

    let token = match session.token {
        Some(token) => token,
        None => match generate_session_token() {
            Ok(token) => token,
            Err(err) => {
                error!("Failed to generate session token: {err:#}");
                return failure_redirect();
            }
        },
    };
    state.sessions().save(&token, context).await;

    let cookie = match session_cookie(
        &token,
        state.config().session_ttl(),
        state.config().secure_cookies(),
    ) {
        Ok(cookie) => cookie,
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return failure_redirect();
        }
    };

    info!(project_id = %project_id, "Session bound");
    let mut response = views::login("", None).into_response();
    response.headers_mut().insert(SET_COOKIE, cookie);
    response
}

#[utoipa::path(
    get,
    path = "/auth/login",
    responses(
        (status = 200, description = "Login form for a bound session", body = String, content_type = "text/html"),
        (status = 303, description = "Session not bound, redirect to the failure page")
    ),
    tag = "auth"
)]
pub async fn login_form(headers: HeaderMap, state: Extension<Arc<AuthState>>) -> Response {
    let session = load_session(&state, &headers).await;
    if !session.context.is_bound() {
        return fail("login_form", &session.context, &FlowError::Binding);
    }
    refresh_cookie(&state, &session, views::login("", None).into_response())
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body(content = LoginRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Redirect to {api_url}/login/{token}, or to the failure page"),
        (status = 401, description = "Invalid email or password, form re-rendered", body = String, content_type = "text/html")
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    Form(request): Form<LoginRequest>,
) -> Response {
    let session = load_session(&state, &headers).await;
    let password = SecretString::from(request.password);

    match state
        .flow()
        .login(&session.context, &request.email, &password)
        .await
    {
        Ok(redirect) => refresh_cookie(&state, &session, Redirect::to(&redirect).into_response()),
        Err(FlowError::Credential) => {
            let response = (
                StatusCode::UNAUTHORIZED,
                views::login(&request.email, Some(INVALID_CREDENTIALS)),
            )
                .into_response();
            refresh_cookie(&state, &session, response)
        }
        Err(err) => fail("login", &session.context, &err),
    }
}

#[utoipa::path(
    get,
    path = "/auth/signup",
    responses(
        (status = 200, description = "Signup form for a bound session", body = String, content_type = "text/html"),
        (status = 303, description = "Session not bound, redirect to the failure page")
    ),
    tag = "auth"
)]
pub async fn signup_form(headers: HeaderMap, state: Extension<Arc<AuthState>>) -> Response {
    let session = load_session(&state, &headers).await;
    if !session.context.is_bound() {
        return fail("signup_form", &session.context, &FlowError::Binding);
    }
    let response =
        views::signup(&views::SignupValues::default(), &FieldErrors::default()).into_response();
    refresh_cookie(&state, &session, response)
}

#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body(content = SignupRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Account created, redirect to the pending confirmation view"),
        (status = 422, description = "Validation failed, form re-rendered with field errors", body = String, content_type = "text/html")
    ),
    tag = "auth"
)]
pub async fn signup(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    Form(request): Form<SignupRequest>,
) -> Response {
    let session = load_session(&state, &headers).await;
    let form = SignupForm {
        first_name: request.first_name.clone(),
        last_name: request.last_name.clone(),
        email: request.email.clone(),
        password: SecretString::from(request.password),
        confirm_password: SecretString::from(request.confirm_password),
    };

    match state.flow().signup(&session.context, form).await {
        Ok(_) => refresh_cookie(
            &state,
            &session,
            Redirect::to(PENDING_CONFIRMATION_PATH).into_response(),
        ),
        Err(FlowError::Validation(errors)) => {
            let values = views::SignupValues {
                first_name: &request.first_name,
                last_name: &request.last_name,
                email: &request.email,
            };
            let response = (
                StatusCode::UNPROCESSABLE_ENTITY,
                views::signup(&values, &errors),
            )
                .into_response();
            refresh_cookie(&state, &session, response)
        }
        Err(err) => fail("signup", &session.context, &err),
    }
}

#[utoipa::path(
    get,
    path = "/auth/email-confirmation",
    responses(
        (status = 200, description = "Pending confirmation view", body = String, content_type = "text/html"),
        (status = 303, description = "Session not bound, redirect to the failure page")
    ),
    tag = "auth"
)]
pub async fn pending_confirmation(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
) -> Response {
    let session = load_session(&state, &headers).await;
    if !session.context.is_bound() {
        return fail("pending_confirmation", &session.context, &FlowError::Binding);
    }
    refresh_cookie(&state, &session, views::pending_confirmation().into_response())
}

/// Unknown and already confirmed emails get the same redirect as pending ones.
#[utoipa::path(
    post,
    path = "/auth/confirm/resend",
    request_body(content = ResendRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 303, description = "Redirect to the pending confirmation view, or to the failure page")
    ),
    tag = "auth"
)]
pub async fn resend_confirmation(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    Form(request): Form<ResendRequest>,
) -> Response {
    let session = load_session(&state, &headers).await;
    match state.flow().resend(&session.context, &request.email).await {
        Ok(()) => refresh_cookie(
            &state,
            &session,
            Redirect::to(PENDING_CONFIRMATION_PATH).into_response(),
        ),
        Err(err) => fail("resend", &session.context, &err),
    }
}

#[utoipa::path(
    get,
    path = "/auth/confirm/{user_id}/{code}",
    params(
        ("user_id" = String, Path, description = "Id of the account being confirmed"),
        ("code" = String, Path, description = "Confirmation code from the mailed link")
    ),
    responses(
        (status = 200, description = "Account confirmed and pushed to the tenant", body = String, content_type = "text/html"),
        (status = 303, description = "Confirmation failed, redirect to the failure page")
    ),
    tag = "auth"
)]
pub async fn confirm(
    headers: HeaderMap,
    Path((user_id, code)): Path<(String, String)>,
    state: Extension<Arc<AuthState>>,
) -> Response {
    let session = load_session(&state, &headers).await;
    let Ok(user_id) = Uuid::parse_str(&user_id) else {
        return fail(
            "confirm",
            &session.context,
            &FlowError::Confirmation(ConfirmationError::UnknownUser),
        );
    };

    match state.flow().confirm(&session.context, user_id, &code).await {
        Ok(_) => refresh_cookie(&state, &session, views::confirmed().into_response()),
        Err(err) => fail("confirm", &session.context, &err),
    }
}
