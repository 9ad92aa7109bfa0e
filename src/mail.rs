//! Outgoing mail.
//!
//! The gateway only ever sends one kind of message (the confirmation link),
//! so the abstraction is a single `send`. Delivery is fire-once: a failure is
//! reported to the caller and never retried.
//!
//! The default mailer for local dev is [`LogMailer`], which logs the message
//! and returns `Ok(())`. [`HttpMailer`] posts the message as JSON to a relay
//! endpoint (any HTTP mail API that accepts a bearer token).

use crate::APP_USER_AGENT;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MailMessage {
    pub to_email: String,
    pub to_name: String,
    pub subject: String,
    pub html_body: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail relay request failed")]
    Transport(#[from] reqwest::Error),
    #[error("mail relay rejected message with status {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver a message or return an error.
    async fn send(&self, message: &MailMessage) -> Result<(), MailError>;
}

/// Local dev mailer that logs the message instead of sending it.
#[derive(Clone, Debug)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        info!(
            to_email = %message.to_email,
            subject = %message.subject,
            body = %message.html_body,
            "mail send stub"
        );
        Ok(())
    }
}

/// Sender identity used by [`HttpMailer`].
#[derive(Clone, Debug)]
pub struct MailSender {
    pub email: String,
    pub name: String,
}

#[derive(Serialize)]
struct Address<'a> {
    email: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    from: Address<'a>,
    to: [Address<'a>; 1],
    subject: &'a str,
    html: &'a str,
}

/// Mailer that posts JSON to an HTTP relay.
#[derive(Clone, Debug)]
pub struct HttpMailer {
    client: reqwest::Client,
    relay_url: String,
    token: Option<SecretString>,
    sender: MailSender,
}

impl HttpMailer {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        relay_url: impl Into<String>,
        token: Option<SecretString>,
        sender: MailSender,
        timeout: Duration,
    ) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            relay_url: relay_url.into(),
            token,
            sender,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        let payload = RelayPayload {
            from: Address {
                email: &self.sender.email,
                name: &self.sender.name,
            },
            to: [Address {
                email: &message.to_email,
                name: &message.to_name,
            }],
            subject: &message.subject,
            html: &message.html_body,
        };

        let mut request = self.client.post(&self.relay_url).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MailError::Rejected(status.as_u16()));
        }
        debug!(to_email = %message.to_email, "mail accepted by relay");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use std::sync::Arc;
    use tokio::{net::TcpListener, sync::Mutex};

    fn message() -> MailMessage {
        MailMessage {
            to_email: "a@b.com".to_string(),
            to_name: "Ada Lovelace".to_string(),
            subject: "hello".to_string(),
            html_body: "<p>hi</p>".to_string(),
        }
    }

    fn sender() -> MailSender {
        MailSender {
            email: "noreply@waguri.dev".to_string(),
            name: "Waguri".to_string(),
        }
    }

    async fn spawn_relay(status: StatusCode) -> (String, Arc<Mutex<Vec<serde_json::Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();
        let app = Router::new().route(
            "/send",
            post(move |Json(body): Json<serde_json::Value>| {
                let recorded = recorded.clone();
                async move {
                    recorded.lock().await.push(body);
                    status
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind relay");
        let addr = listener.local_addr().expect("relay addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{addr}/send"), seen)
    }

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        assert!(LogMailer.send(&message()).await.is_ok());
    }

    #[tokio::test]
    async fn http_mailer_posts_payload() {
        let (url, seen) = spawn_relay(StatusCode::ACCEPTED).await;
        let mailer = HttpMailer::new(url, None, sender(), Duration::from_secs(5))
            .expect("build mailer");
        mailer.send(&message()).await.expect("send");

        let seen = seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["to"][0]["email"], "a@b.com");
        assert_eq!(seen[0]["from"]["email"], "noreply@waguri.dev");
        assert_eq!(seen[0]["subject"], "hello");
    }

    #[tokio::test]
    async fn http_mailer_reports_rejection() {
        let (url, _) = spawn_relay(StatusCode::BAD_GATEWAY).await;
        let mailer = HttpMailer::new(url, None, sender(), Duration::from_secs(5))
            .expect("build mailer");
        let result = mailer.send(&message()).await;
        assert!(matches!(result, Err(MailError::Rejected(502))));
    }
}
