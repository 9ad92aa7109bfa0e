//! Email ownership challenge.
//!
//! A challenge asks the identity store for a one-time token, wraps it into a
//! link under the public base URL and mails it to the account owner. The raw
//! token travels base64url-encoded (unpadded) so it survives as a path segment.

use crate::identity::{IdentityStore, User};
use crate::mail::{MailError, MailMessage, Mailer};
use base64ct::{Base64UrlUnpadded, Encoding};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

pub const CONFIRMATION_SUBJECT: &str = "Waguri account confirmation";

#[derive(Debug, Error)]
pub enum ConfirmationError {
    #[error("confirmation code is malformed")]
    MalformedCode,
    #[error("unknown user")]
    UnknownUser,
    #[error("user belongs to another project")]
    ProjectMismatch,
    #[error("confirmation token is invalid, expired or already used")]
    InvalidToken,
    #[error("failed to deliver confirmation mail")]
    Delivery(#[from] MailError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Clone)]
pub struct ConfirmationService {
    identity: Arc<dyn IdentityStore>,
    mailer: Arc<dyn Mailer>,
    public_base_url: String,
}

impl ConfirmationService {
    #[must_use]
    pub fn new(
        identity: Arc<dyn IdentityStore>,
        mailer: Arc<dyn Mailer>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            identity,
            mailer,
            public_base_url: public_base_url.into(),
        }
    }

    /// Mint a fresh token for `user` and mail the confirmation link.
    ///
    /// # Errors
    /// Returns [`ConfirmationError::Delivery`] if the mail is not accepted and
    /// [`ConfirmationError::Store`] if the token cannot be generated.
    pub async fn challenge(&self, user: &User) -> Result<(), ConfirmationError> {
        let token = self.identity.generate_email_token(user).await?;
        let code = Base64UrlUnpadded::encode_string(token.as_bytes());
        let url = build_confirm_url(&self.public_base_url, user.id, &code);

        let message = MailMessage {
            to_email: user.email.clone(),
            to_name: format!("{} {}", user.first_name, user.last_name),
            subject: CONFIRMATION_SUBJECT.to_string(),
            html_body: confirmation_body(&url),
        };
        self.mailer.send(&message).await?;

        info!(user_id = %user.id, project_id = %user.project_id, "Confirmation mail sent");
        Ok(())
    }
}

/// `{base}/auth/confirm/{user_id}/{code}`; a trailing slash on `base` is ignored.
#[must_use]
pub fn build_confirm_url(base: &str, user_id: Uuid, code: &str) -> String {
    format!(
        "{}/auth/confirm/{user_id}/{code}",
        base.trim_end_matches('/')
    )
}

/// Reverse the link encoding back to the raw store token.
///
/// # Errors
/// Returns [`ConfirmationError::MalformedCode`] if `code` is not unpadded
/// base64url or does not decode to UTF-8.
pub fn decode_code(code: &str) -> Result<String, ConfirmationError> {
    let bytes =
        Base64UrlUnpadded::decode_vec(code).map_err(|_| ConfirmationError::MalformedCode)?;
    String::from_utf8(bytes).map_err(|_| ConfirmationError::MalformedCode)
}

fn confirmation_body(url: &str) -> String {
    format!(
        "<h1>Confirm your account</h1>\
         <p><a href=\"{url}\">{url}</a></p>\
         <p>This link only lasts for a day.</p>"
    )
}
