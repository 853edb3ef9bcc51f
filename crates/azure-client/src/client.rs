//! Azure Resource Manager client
//!
//! Talks to the ARM REST API directly. Tokens are obtained with the OAuth2
//! client-credentials flow against the tenant's v2 endpoint and cached until
//! shortly before they expire.

use crate::azure_trait::ResourceGroupClientTrait;
use crate::error::AzureError;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

const LOGIN_URL: &str = "https://login.microsoftonline.com";
const MANAGEMENT_URL: &str = "https://management.azure.com";
const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";
const RESOURCE_GROUPS_API_VERSION: &str = "2021-04-01";

/// Refresh tokens this long before they expire
const TOKEN_EXPIRY_SLACK: Duration = Duration::from_secs(60);

/// Service principal credentials for one subscription
#[derive(Clone)]
pub struct AzureCredentials {
    pub subscription_id: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for AzureCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureCredentials")
            .field("subscription_id", &self.subscription_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl AzureCredentials {
    /// Ensure no field is empty.
    pub fn validate(&self) -> Result<(), AzureError> {
        for (field, value) in [
            ("subscription_id", &self.subscription_id),
            ("tenant_id", &self.tenant_id),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ] {
            if value.is_empty() {
                return Err(AzureError::InvalidCredentials(format!("{field} is empty")));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Resource group client backed by ARM
#[derive(Debug)]
pub struct ResourceGroupClient {
    client: Client,
    credentials: AzureCredentials,
    login_url: String,
    management_url: String,
    poll_interval: Duration,
    poll_timeout: Duration,
    token: Mutex<Option<CachedToken>>,
}

impl ResourceGroupClient {
    /// Create a new client
    pub fn new(credentials: AzureCredentials) -> Result<Self, AzureError> {
        credentials.validate()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(AzureError::Http)?;
        Ok(Self {
            client,
            credentials,
            login_url: LOGIN_URL.to_string(),
            management_url: MANAGEMENT_URL.to_string(),
            poll_interval: Duration::from_secs(10),
            poll_timeout: Duration::from_secs(600),
            token: Mutex::new(None),
        })
    }

    /// Override the login and management endpoints (sovereign clouds, test servers)
    pub fn with_endpoints(mut self, login_url: &str, management_url: &str) -> Self {
        self.login_url = login_url.trim_end_matches('/').to_string();
        self.management_url = management_url.trim_end_matches('/').to_string();
        self
    }

    /// Override how deletion completion is polled
    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_timeout = timeout;
        self
    }

    fn resource_group_url(&self, name: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourcegroups/{}?api-version={}",
            self.management_url, self.credentials.subscription_id, name, RESOURCE_GROUPS_API_VERSION
        )
    }

    async fn access_token(&self) -> Result<String, AzureError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let url = format!("{}/{}/oauth2/v2.0/token", self.login_url, self.credentials.tenant_id);
        debug!("Requesting Azure management token");
        let response = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("scope", MANAGEMENT_SCOPE),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AzureError::Authentication(format!("{status} - {body}")));
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_SLACK);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }
}

#[async_trait::async_trait]
impl ResourceGroupClientTrait for ResourceGroupClient {
    fn subscription_id(&self) -> &str {
        &self.credentials.subscription_id
    }

    async fn resource_group_exists(&self, name: &str) -> Result<bool, AzureError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .head(self.resource_group_url(name))
            .bearer_auth(token)
            .send()
            .await?;
        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(AzureError::Api {
                status: status.as_u16(),
                message: format!("HEAD resource group {name} failed"),
            }),
        }
    }

    async fn delete_resource_group(&self, name: &str) -> Result<(), AzureError> {
        let token = self.access_token().await?;
        info!(resource_group = %name, "Deleting Azure resource group");
        let response = self
            .client
            .delete(self.resource_group_url(name))
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(AzureError::NotFound(format!("resource group {name}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AzureError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        // 202 Accepted: deletion continues asynchronously
        let deadline = Instant::now() + self.poll_timeout;
        while self.resource_group_exists(name).await? {
            if Instant::now() >= deadline {
                return Err(AzureError::Timeout(format!("deletion of resource group {name}")));
            }
            debug!(resource_group = %name, "Resource group deletion in progress");
            tokio::time::sleep(self.poll_interval).await;
        }
        info!(resource_group = %name, "Azure resource group deleted");
        Ok(())
    }
}
