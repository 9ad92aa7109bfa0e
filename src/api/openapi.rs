use super::handlers::{auth, error, health};
use utoipa::OpenApi;

/// Documented routes. `/` and `/hello` are plain liveness text and stay out.
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::login_bind,
        auth::login_form,
        auth::login,
        auth::signup_form,
        auth::signup,
        auth::pending_confirmation,
        auth::resend_confirmation,
        auth::confirm,
        error::failure,
        error::go_back,
    ),
    components(schemas(
        health::Health,
        auth::LoginRequest,
        auth::SignupRequest,
        auth::ResendRequest
    )),
    tags(
        (name = "auth", description = "Tenant-scoped login, signup and email confirmation"),
        (name = "error", description = "Failure and return-to-tenant views"),
        (name = "health", description = "Service health")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    // Use Cargo.toml metadata instead of the utoipa crate info defaults.
    doc.info.title = env!("CARGO_PKG_NAME").to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc.info.description = Some(env!("CARGO_PKG_DESCRIPTION").to_string());
    doc
}
