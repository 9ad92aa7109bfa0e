//! The tenant-scoped authentication state machine.
//!
//! ```text
//! Unbound -> Bound -> Authenticating -> TokenIssued
//! Bound -> SigningUp -> PendingConfirmation -> Confirmed -> Notified
//! any step -> Failed
//! ```
//!
//! Every operation receives the caller's [`SessionContext`] explicitly. Only
//! `bind` returns a new context; every other step requires a bound one and
//! fails with [`FlowError::Binding`] otherwise.

use crate::confirmation::{decode_code, ConfirmationError, ConfirmationService};
use crate::directory::ProjectDirectory;
use crate::identity::{
    normalize_email, valid_email, verify_unknown_user, CreateUserError, IdentityStore, NewUser,
    User,
};
use crate::notifier::{NotificationError, TenantNotifier};
use crate::session::{SessionBinding, SessionContext};
use crate::token::{TokenError, TokenIssuer};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Generic message for every credential failure; never says which part was wrong.
pub const INVALID_CREDENTIALS: &str = "invalid email or password!";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowState {
    Unbound,
    Bound,
    Authenticating,
    TokenIssued,
    SigningUp,
    PendingConfirmation,
    Confirmed,
    Notified,
    Failed,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unbound => "unbound",
            Self::Bound => "bound",
            Self::Authenticating => "authenticating",
            Self::TokenIssued => "token_issued",
            Self::SigningUp => "signing_up",
            Self::PendingConfirmation => "pending_confirmation",
            Self::Confirmed => "confirmed",
            Self::Notified => "notified",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Field-scoped validation messages, in the order they were found.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldErrors(Vec<(String, String)>);

impl FieldErrors {
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push((field.into(), message.into()));
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Messages for one field.
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(name, _)| name == field)
            .map(|(_, message)| message.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(f, m)| (f.as_str(), m.as_str()))
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|(field, message)| format!("{field}: {message}"))
            .collect::<Vec<_>>()
            .join("; ");
        f.write_str(&joined)
    }
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("session is not bound to a known project")]
    Binding,
    #[error("invalid email or password!")]
    Credential,
    #[error("validation failed: {0}")]
    Validation(FieldErrors),
    #[error(transparent)]
    Confirmation(#[from] ConfirmationError),
    #[error(transparent)]
    Notification(#[from] NotificationError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("identity store failure")]
    Identity(#[source] anyhow::Error),
}

impl FlowError {
    /// Whether the caller stays in its current state (re-render) instead of failing.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Credential | Self::Validation(_))
    }
}

/// Signup form as submitted by the browser.
#[derive(Clone, Debug)]
pub struct SignupForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: SecretString,
    pub confirm_password: SecretString,
}

#[derive(Clone)]
pub struct AuthFlow {
    directory: Arc<dyn ProjectDirectory>,
    identity: Arc<dyn IdentityStore>,
    tokens: TokenIssuer,
    confirmation: ConfirmationService,
    notifier: Arc<dyn TenantNotifier>,
}

impl AuthFlow {
    #[must_use]
    pub fn new(
        directory: Arc<dyn ProjectDirectory>,
        identity: Arc<dyn IdentityStore>,
        tokens: TokenIssuer,
        confirmation: ConfirmationService,
        notifier: Arc<dyn TenantNotifier>,
    ) -> Self {
        Self {
            directory,
            identity,
            tokens,
            confirmation,
            notifier,
        }
    }

    /// Resolve `project_id` and bind the session to it.
    ///
    /// # Errors
    /// [`FlowError::Binding`] for unknown projects, [`FlowError::Identity`] if
    /// the directory itself fails.
    pub async fn bind(
        &self,
        context: SessionContext,
        project_id: &str,
    ) -> Result<SessionContext, FlowError> {
        let project = self
            .directory
            .resolve(project_id)
            .await
            .map_err(FlowError::Identity)?;
        let Some(project) = project else {
            warn!(project_id, "Unknown project");
            transition(project_id, FlowState::Unbound, FlowState::Failed);
            return Err(FlowError::Binding);
        };
        transition(&project.project_id, FlowState::Unbound, FlowState::Bound);
        Ok(context.bind(project.project_id, project.client_url, project.api_url))
    }

    /// Check credentials and return the tenant redirect carrying a fresh token.
    ///
    /// # Errors
    /// [`FlowError::Credential`] for unknown emails, wrong passwords and
    /// unconfirmed accounts. Other variants are terminal.
    pub async fn login(
        &self,
        context: &SessionContext,
        email: &str,
        password: &SecretString,
    ) -> Result<String, FlowError> {
        let binding = require_binding(context)?;
        transition(&binding.project_id, FlowState::Bound, FlowState::Authenticating);

        let user = self
            .identity
            .find_by_email(&normalize_email(email))
            .await
            .map_err(FlowError::Identity)?;
        let Some(user) = user else {
            // Same Argon2 cost as a wrong password.
            verify_unknown_user(password)
                .await
                .map_err(FlowError::Identity)?;
            debug!(project_id = %binding.project_id, "Login for unknown email");
            return Err(FlowError::Credential);
        };

        let verified = self
            .identity
            .verify_password(user.id, password)
            .await
            .map_err(FlowError::Identity)?;
        if !verified || !user.email_confirmed {
            debug!(
                project_id = %binding.project_id,
                user_id = %user.id,
                confirmed = user.email_confirmed,
                "Login rejected"
            );
            return Err(FlowError::Credential);
        }

        let token = self
            .tokens
            .issue(&user, &binding.api_url, &binding.api_url)?;
        transition(
            &binding.project_id,
            FlowState::Authenticating,
            FlowState::TokenIssued,
        );
        info!(project_id = %binding.project_id, user_id = %user.id, "Token issued");
        Ok(tenant_login_url(&binding.api_url, &token))
    }

    /// Create a pending account owned by the bound project and mail the challenge.
    ///
    /// # Errors
    /// [`FlowError::Validation`] for form and identity-store rejections,
    /// [`FlowError::Confirmation`] if the mail cannot be delivered.
    pub async fn signup(
        &self,
        context: &SessionContext,
        form: SignupForm,
    ) -> Result<User, FlowError> {
        let binding = require_binding(context)?;
        transition(&binding.project_id, FlowState::Bound, FlowState::SigningUp);

        let email = normalize_email(&form.email);
        let errors = validate_signup(&form, &email);
        if !errors.is_empty() {
            return Err(FlowError::Validation(errors));
        }

        let new_user = NewUser {
            email,
            first_name: form.first_name.trim().to_string(),
            last_name: form.last_name.trim().to_string(),
            project_id: binding.project_id.clone(),
        };
        let user = match self.identity.create_user(new_user, &form.password).await {
            Ok(user) => user,
            Err(CreateUserError::DuplicateEmail) => {
                let mut errors = FieldErrors::default();
                errors.push("email", "email is already registered!");
                return Err(FlowError::Validation(errors));
            }
            Err(CreateUserError::Rejected(problems)) => {
                let mut errors = FieldErrors::default();
                for problem in problems {
                    errors.push("password", problem);
                }
                return Err(FlowError::Validation(errors));
            }
            Err(CreateUserError::Store(err)) => return Err(FlowError::Identity(err)),
        };

        if let Err(err) = self.confirmation.challenge(&user).await {
            transition(&binding.project_id, FlowState::SigningUp, FlowState::Failed);
            return Err(err.into());
        }
        transition(
            &binding.project_id,
            FlowState::SigningUp,
            FlowState::PendingConfirmation,
        );
        Ok(user)
    }

    /// Consume a confirmation code and push the confirmed user to the tenant.
    ///
    /// # Errors
    /// [`FlowError::Confirmation`] for bad codes and foreign accounts,
    /// [`FlowError::Notification`] if the tenant push fails.
    pub async fn confirm(
        &self,
        context: &SessionContext,
        user_id: Uuid,
        code: &str,
    ) -> Result<User, FlowError> {
        let binding = require_binding(context)?;
        let token = decode_code(code)?;

        let user = self
            .identity
            .find_by_id(user_id)
            .await
            .map_err(FlowError::Identity)?
            .ok_or(ConfirmationError::UnknownUser)?;
        if user.project_id != binding.project_id {
            warn!(
                project_id = %binding.project_id,
                user_id = %user.id,
                owner = %user.project_id,
                "Confirmation for a user of another project"
            );
            return Err(ConfirmationError::ProjectMismatch.into());
        }

        let confirmed = self
            .identity
            .confirm_email(user.id, &token)
            .await
            .map_err(FlowError::Identity)?;
        if !confirmed {
            transition(
                &binding.project_id,
                FlowState::PendingConfirmation,
                FlowState::Failed,
            );
            return Err(ConfirmationError::InvalidToken.into());
        }
        transition(
            &binding.project_id,
            FlowState::PendingConfirmation,
            FlowState::Confirmed,
        );

        let user = User {
            email_confirmed: true,
            ..user
        };
        if let Err(err) = self.notifier.push(&binding.api_url, &user).await {
            transition(&binding.project_id, FlowState::Confirmed, FlowState::Failed);
            return Err(err.into());
        }
        transition(&binding.project_id, FlowState::Confirmed, FlowState::Notified);
        Ok(user)
    }

    /// Mail a fresh challenge to a pending account.
    ///
    /// Unknown and already confirmed emails succeed silently so the endpoint
    /// cannot be used to probe for accounts.
    ///
    /// # Errors
    /// [`FlowError::Confirmation`] if the mail cannot be delivered.
    pub async fn resend(&self, context: &SessionContext, email: &str) -> Result<(), FlowError> {
        let binding = require_binding(context)?;
        let user = self
            .identity
            .find_by_email(&normalize_email(email))
            .await
            .map_err(FlowError::Identity)?;
        match user {
            Some(user) if !user.email_confirmed && user.project_id == binding.project_id => {
                self.confirmation.challenge(&user).await?;
            }
            _ => debug!(project_id = %binding.project_id, "Resend ignored"),
        }
        Ok(())
    }
}

fn require_binding(context: &SessionContext) -> Result<&SessionBinding, FlowError> {
    context.binding().ok_or(FlowError::Binding)
}

fn transition(project_id: &str, from: FlowState, to: FlowState) {
    debug!(project_id, %from, %to, "flow transition");
}

/// `{api_url}/login/{token}`; a trailing slash on `api_url` is ignored.
#[must_use]
pub fn tenant_login_url(api_url: &str, token: &str) -> String {
    format!("{}/login/{token}", api_url.trim_end_matches('/'))
}

fn validate_signup(form: &SignupForm, email: &str) -> FieldErrors {
    let mut errors = FieldErrors::default();
    if form.first_name.trim().is_empty() {
        errors.push("first_name", "first name is required!");
    }
    if form.last_name.trim().is_empty() {
        errors.push("last_name", "last name is required!");
    }
    if email.is_empty() {
        errors.push("email", "email is required!");
    } else if !valid_email(email) {
        errors.push("email", "email is not valid!");
    }
    if form.password.expose_secret().is_empty() {
        errors.push("password", "password is required!");
    }
    if form.password.expose_secret() != form.confirm_password.expose_secret() {
        errors.push("confirm_password", "password mismatch!");
    }
    errors
}
