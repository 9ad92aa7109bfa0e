//! Push confirmed users to the tenant backend.

use crate::identity::User;
use crate::APP_USER_AGENT;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("failed to reach tenant at {url}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("tenant at {url} answered {status}")]
    Rejected { url: String, status: u16 },
}

#[async_trait]
pub trait TenantNotifier: Send + Sync {
    /// Deliver `user` to the tenant's user store. Fire-once; no retries.
    async fn push(&self, tenant_api_url: &str, user: &User) -> Result<(), NotificationError>;
}

/// Body expected by tenant backends at `/user/create`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantUser<'a> {
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
}

#[derive(Clone, Debug)]
pub struct HttpTenantNotifier {
    client: reqwest::Client,
}

impl HttpTenantNotifier {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[must_use]
pub fn user_create_url(tenant_api_url: &str) -> String {
    format!("{}/user/create", tenant_api_url.trim_end_matches('/'))
}

#[async_trait]
impl TenantNotifier for HttpTenantNotifier {
    async fn push(&self, tenant_api_url: &str, user: &User) -> Result<(), NotificationError> {
        let url = user_create_url(tenant_api_url);
        let body = TenantUser {
            email: &user.email,
            first_name: &user.first_name,
            last_name: &user.last_name,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|source| NotificationError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Rejected {
                url,
                status: status.as_u16(),
            });
        }

        info!(user_id = %user.id, tenant = %tenant_api_url, "User pushed to tenant");
        Ok(())
    }
}
