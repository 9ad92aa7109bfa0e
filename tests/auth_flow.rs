//! End-to-end browser flow against the real router with in-memory stores.
//!
//! The tenant backend is a local axum server so the user push goes over HTTP.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{
        header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
        Request, Response, StatusCode,
    },
    routing::post,
    Json, Router,
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::Mutex};
use tower::ServiceExt;
use waguri::{
    api::{self, AuthConfig, AuthState},
    confirmation::ConfirmationService,
    directory::{Project, StaticProjectDirectory},
    flow::AuthFlow,
    identity::MemoryIdentityStore,
    mail::{MailError, MailMessage, Mailer},
    notifier::HttpTenantNotifier,
    session::MemorySessionStore,
    token::{Claims, SigningSecret, TokenIssuer},
};

const SECRET: &str = "integration-secret";
const PUBLIC_BASE_URL: &str = "http://gateway.test";
const PASSWORD: &str = "correct-horse-42";

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<MailMessage>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _message: &MailMessage) -> Result<(), MailError> {
        Err(MailError::Rejected(502))
    }
}

type Received = Arc<Mutex<Vec<serde_json::Value>>>;

/// Tenant backend answering `POST /api/user/create` with `status`.
async fn spawn_tenant(status: StatusCode) -> Result<(String, Received)> {
    let received: Received = Arc::default();
    let sink = received.clone();
    let app = Router::new().route(
        "/api/user/create",
        post(move |Json(body): Json<serde_json::Value>| {
            let sink = sink.clone();
            async move {
                sink.lock().await.push(body);
                status
            }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/api"), received))
}

struct Gateway {
    router: Router,
    mailer: Arc<RecordingMailer>,
    api_url: String,
    received: Received,
}

async fn gateway_with(tenant_status: StatusCode, mailer: Arc<dyn Mailer>) -> Result<Gateway> {
    let (api_url, received) = spawn_tenant(tenant_status).await?;
    let directory = StaticProjectDirectory::new(vec![
        Project {
            project_id: "proj-42".to_string(),
            client_url: "https://tenant.example/app".to_string(),
            api_url: api_url.clone(),
        },
        Project {
            project_id: "other".to_string(),
            client_url: "https://other.example/app".to_string(),
            api_url: "http://127.0.0.1:9/api".to_string(),
        },
    ])?;

    let identity = Arc::new(MemoryIdentityStore::new(Duration::from_secs(600)));
    let confirmation = ConfirmationService::new(identity.clone(), mailer, PUBLIC_BASE_URL);
    let notifier = HttpTenantNotifier::new(Duration::from_secs(5))?;
    let tokens = TokenIssuer::new(SigningSecret::Fixed(SECRET.to_string().into()), 60);
    let flow = AuthFlow::new(
        Arc::new(directory),
        identity,
        tokens,
        confirmation,
        Arc::new(notifier),
    );

    let config = AuthConfig::new(PUBLIC_BASE_URL).with_session_ttl_seconds(300);
    let sessions = Arc::new(MemorySessionStore::new(config.session_ttl()));
    let state = Arc::new(AuthState::new(flow, sessions, config));

    Ok(Gateway {
        router: api::router(state, None),
        mailer: Arc::new(RecordingMailer::default()),
        api_url,
        received,
    })
}

async fn gateway(tenant_status: StatusCode) -> Result<Gateway> {
    let mailer = Arc::new(RecordingMailer::default());
    let mut gateway = gateway_with(tenant_status, mailer.clone()).await?;
    gateway.mailer = mailer;
    Ok(gateway)
}

impl Gateway {
    async fn send(&self, request: Request<Body>) -> Result<Response<Body>> {
        Ok(self.router.clone().oneshot(request).await?)
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> Result<Response<Body>> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        self.send(builder.body(Body::empty())?).await
    }

    async fn post_form(
        &self,
        uri: &str,
        cookie: Option<&str>,
        form: &str,
    ) -> Result<Response<Body>> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        self.send(builder.body(Body::from(form.to_string()))?).await
    }

    /// Bind a fresh session to `project_id` and return its cookie pair.
    async fn bind(&self, project_id: &str) -> Result<String> {
        let response = self.get(&format!("/auth/login/{project_id}"), None).await?;
        assert_eq!(response.status(), StatusCode::OK);
        session_cookie(&response)
    }

    /// Path of the most recently mailed confirmation link.
    async fn last_confirm_path(&self) -> Result<String> {
        let sent = self.mailer.sent.lock().await;
        let body = &sent.last().context("no mail sent")?.html_body;
        let start = body
            .find("href=\"")
            .context("no link in mail")?
            + "href=\"".len();
        let url: String = body[start..].chars().take_while(|c| *c != '"').collect();
        url.strip_prefix(PUBLIC_BASE_URL)
            .map(ToString::to_string)
            .ok_or_else(|| anyhow!("unexpected confirmation url: {url}"))
    }
}

fn session_cookie(response: &Response<Body>) -> Result<String> {
    let header = response
        .headers()
        .get(SET_COOKIE)
        .context("missing Set-Cookie")?
        .to_str()?;
    header
        .split(';')
        .next()
        .map(ToString::to_string)
        .context("empty Set-Cookie")
}

fn location(response: &Response<Body>) -> Option<&str> {
    response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
}

async fn body_text(response: Response<Body>) -> Result<String> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(String::from_utf8(bytes.to_vec())?)
}

fn signup_form(email: &str) -> String {
    format!(
        "first_name=Ada&last_name=Lovelace&email={}&password={PASSWORD}&confirm_password={PASSWORD}",
        email.replace('@', "%40")
    )
}

fn login_form(email: &str, password: &str) -> String {
    format!("email={}&password={password}", email.replace('@', "%40"))
}

async fn signup_and_confirm(gateway: &Gateway, cookie: &str, email: &str) -> Result<()> {
    let response = gateway
        .post_form("/auth/signup", Some(cookie), &signup_form(email))
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let confirm = gateway.last_confirm_path().await?;
    let response = gateway.get(&confirm, Some(cookie)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn signup_confirm_pushes_user_to_tenant_once() -> Result<()> {
    let gateway = gateway(StatusCode::CREATED).await?;
    let cookie = gateway.bind("proj-42").await?;

    let response = gateway
        .post_form("/auth/signup", Some(&cookie), &signup_form("Ada@Example.com"))
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/auth/email-confirmation"));

    let response = gateway.get("/auth/email-confirmation", Some(&cookie)).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let confirm = gateway.last_confirm_path().await?;
    let response = gateway.get(&confirm, Some(&cookie)).await?;
    assert_eq!(response.status(), StatusCode::OK);

    {
        let received = gateway.received.lock().await;
        assert_eq!(received.len(), 1);
        assert_eq!(
            received[0],
            serde_json::json!({
                "email": "ada@example.com",
                "firstName": "Ada",
                "lastName": "Lovelace"
            })
        );
    }

    // The link is single use.
    let response = gateway.get(&confirm, Some(&cookie)).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/error/failure"));
    assert_eq!(gateway.received.lock().await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn login_redirects_with_tenant_scoped_token() -> Result<()> {
    let gateway = gateway(StatusCode::OK).await?;
    let cookie = gateway.bind("proj-42").await?;
    signup_and_confirm(&gateway, &cookie, "grace@example.com").await?;

    let response = gateway
        .post_form(
            "/auth/login",
            Some(&cookie),
            &login_form("grace@example.com", PASSWORD),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let target = location(&response).context("missing Location")?;
    let prefix = format!("{}/login/", gateway.api_url);
    let token = target
        .strip_prefix(&prefix)
        .ok_or_else(|| anyhow!("unexpected redirect: {target}"))?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[gateway.api_url.as_str()]);
    validation.set_issuer(&[gateway.api_url.as_str()]);
    let data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(SECRET.as_bytes()),
        &validation,
    )?;
    assert_eq!(data.claims.email, "grace@example.com");
    assert!(data.claims.email_confirmed);

    // A token for one tenant fails audience checks at another.
    let mut foreign = Validation::new(Algorithm::HS256);
    foreign.set_audience(&["http://127.0.0.1:9/api"]);
    assert!(jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(SECRET.as_bytes()),
        &foreign,
    )
    .is_err());
    Ok(())
}

#[tokio::test]
async fn wrong_password_and_unconfirmed_account_rerender_login() -> Result<()> {
    let gateway = gateway(StatusCode::OK).await?;
    let cookie = gateway.bind("proj-42").await?;

    let response = gateway
        .post_form("/auth/signup", Some(&cookie), &signup_form("pending@example.com"))
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = gateway
        .post_form(
            "/auth/login",
            Some(&cookie),
            &login_form("pending@example.com", PASSWORD),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(body_text(response)
        .await?
        .contains("invalid email or password!"));

    let response = gateway
        .post_form(
            "/auth/login",
            Some(&cookie),
            &login_form("nobody@example.com", PASSWORD),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn unknown_project_redirects_to_failure() -> Result<()> {
    let gateway = gateway(StatusCode::OK).await?;
    let response = gateway.get("/auth/login/does-not-exist", None).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/error/failure"));
    assert!(response.headers().get(SET_COOKIE).is_none());

    let response = gateway.get("/error/failure", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn failed_rebind_clears_previous_project() -> Result<()> {
    let gateway = gateway(StatusCode::OK).await?;
    let cookie = gateway.bind("proj-42").await?;

    let response = gateway.get("/auth/login/does-not-exist", Some(&cookie)).await?;
    assert_eq!(location(&response), Some("/error/failure"));

    let response = gateway.get("/auth/signup", Some(&cookie)).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/error/failure"));
    Ok(())
}

#[tokio::test]
async fn unbound_session_cannot_change_state() -> Result<()> {
    let gateway = gateway(StatusCode::OK).await?;

    let response = gateway
        .post_form("/auth/login", None, &login_form("a@example.com", PASSWORD))
        .await?;
    assert_eq!(location(&response), Some("/error/failure"));

    let response = gateway
        .post_form("/auth/signup", None, &signup_form("a@example.com"))
        .await?;
    assert_eq!(location(&response), Some("/error/failure"));
    assert!(gateway.mailer.sent.lock().await.is_empty());

    let response = gateway
        .post_form("/auth/confirm/resend", Some("waguri_session=forged"), "email=a%40example.com")
        .await?;
    assert_eq!(location(&response), Some("/error/failure"));

    // A valid link still needs a bound session in the visiting browser.
    let cookie = gateway.bind("proj-42").await?;
    let response = gateway
        .post_form("/auth/signup", Some(&cookie), &signup_form("b@example.com"))
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let confirm = gateway.last_confirm_path().await?;
    let response = gateway.get(&confirm, None).await?;
    assert_eq!(location(&response), Some("/error/failure"));
    assert!(gateway.received.lock().await.is_empty());

    // The token was not consumed by the rejected visit.
    let response = gateway.get(&confirm, Some(&cookie)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

fn cookie_header(response: &Response<Body>) -> Option<&str> {
    response
        .headers()
        .get(SET_COOKIE)
        .and_then(|value| value.to_str().ok())
}

#[tokio::test]
async fn bound_session_cookie_is_refreshed_on_each_step() -> Result<()> {
    let gateway = gateway(StatusCode::OK).await?;
    let cookie = gateway.bind("proj-42").await?;

    let response = gateway.get("/auth/signup", Some(&cookie)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let refreshed = cookie_header(&response).context("missing Set-Cookie")?;
    assert!(refreshed.starts_with(&format!("{cookie};")));
    assert!(refreshed.contains("Max-Age=300"));
    assert!(refreshed.contains("HttpOnly"));

    let response = gateway
        .post_form("/auth/signup", Some(&cookie), &signup_form("a@example.com"))
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(session_cookie(&response)?, cookie);

    let response = gateway
        .post_form("/auth/login", Some(&cookie), &login_form("a@example.com", "wrong-horse-42"))
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(session_cookie(&response)?, cookie);

    // Unbound requests never get a cookie.
    let response = gateway.get("/auth/signup", None).await?;
    assert!(cookie_header(&response).is_none());
    let response = gateway
        .get("/auth/signup", Some("waguri_session=forged"))
        .await?;
    assert!(cookie_header(&response).is_none());
    Ok(())
}

#[tokio::test]
async fn confirmation_from_another_project_is_rejected() -> Result<()> {
    let gateway = gateway(StatusCode::OK).await?;
    let cookie = gateway.bind("proj-42").await?;
    let response = gateway
        .post_form("/auth/signup", Some(&cookie), &signup_form("c@example.com"))
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let confirm = gateway.last_confirm_path().await?;

    let foreign = gateway.bind("other").await?;
    let response = gateway.get(&confirm, Some(&foreign)).await?;
    assert_eq!(location(&response), Some("/error/failure"));
    assert!(gateway.received.lock().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn tenant_failure_is_terminal() -> Result<()> {
    let gateway = gateway(StatusCode::INTERNAL_SERVER_ERROR).await?;
    let cookie = gateway.bind("proj-42").await?;
    let response = gateway
        .post_form("/auth/signup", Some(&cookie), &signup_form("d@example.com"))
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let confirm = gateway.last_confirm_path().await?;
    let response = gateway.get(&confirm, Some(&cookie)).await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/error/failure"));
    assert_eq!(gateway.received.lock().await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn signup_validation_rerenders_form() -> Result<()> {
    let gateway = gateway(StatusCode::OK).await?;
    let cookie = gateway.bind("proj-42").await?;

    let response = gateway
        .post_form(
            "/auth/signup",
            Some(&cookie),
            "first_name=Ada&last_name=Lovelace&email=not-an-email&password=abc&confirm_password=xyz",
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_text(response).await?;
    assert!(body.contains("email is not valid!"));
    assert!(body.contains("password mismatch!"));
    assert!(gateway.mailer.sent.lock().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn mail_failure_redirects_to_failure() -> Result<()> {
    let gateway = gateway_with(StatusCode::OK, Arc::new(FailingMailer)).await?;
    let cookie = gateway.bind("proj-42").await?;
    let response = gateway
        .post_form("/auth/signup", Some(&cookie), &signup_form("e@example.com"))
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), Some("/error/failure"));
    Ok(())
}

#[tokio::test]
async fn resend_mails_a_fresh_link() -> Result<()> {
    let gateway = gateway(StatusCode::OK).await?;
    let cookie = gateway.bind("proj-42").await?;
    let response = gateway
        .post_form("/auth/signup", Some(&cookie), &signup_form("f@example.com"))
        .await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = gateway
        .post_form("/auth/confirm/resend", Some(&cookie), "email=f%40example.com")
        .await?;
    assert_eq!(location(&response), Some("/auth/email-confirmation"));
    assert_eq!(gateway.mailer.sent.lock().await.len(), 2);

    // Unknown addresses look the same from outside.
    let response = gateway
        .post_form("/auth/confirm/resend", Some(&cookie), "email=ghost%40example.com")
        .await?;
    assert_eq!(location(&response), Some("/auth/email-confirmation"));
    assert_eq!(gateway.mailer.sent.lock().await.len(), 2);
    Ok(())
}

#[tokio::test]
async fn go_back_returns_to_tenant_client() -> Result<()> {
    let gateway = gateway(StatusCode::OK).await?;
    let cookie = gateway.bind("proj-42").await?;
    let response = gateway.get("/error/go-back", Some(&cookie)).await?;
    assert_eq!(location(&response), Some("https://tenant.example/app"));

    let response = gateway.get("/error/go-back", None).await?;
    assert_eq!(location(&response), Some("/error/failure"));
    Ok(())
}

#[tokio::test]
async fn health_and_root() -> Result<()> {
    let gateway = gateway(StatusCode::OK).await?;

    let response = gateway.get("/", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await?, "waguri says hello!");

    let response = gateway.get("/health", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-request-id").is_some());
    assert!(response.headers().get("X-App").is_some());
    let health: serde_json::Value = serde_json::from_str(&body_text(response).await?)?;
    assert_eq!(health["database"], "disabled");
    assert_eq!(health["name"], "waguri");

    let response = gateway.get("/api-docs/openapi.json", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}
