//! Cloud API clients built from a Machine's auth secret
//!
//! Credentials differ per Machine, so clients are created on demand rather
//! than once at startup.

use crate::error::ControllerError;
use crate::secrets::{string_value, SecretData};
use azure_client::{AzureCredentials, ResourceGroupClient, ResourceGroupClientTrait};
use ec2_client::{Ec2NetworkClient, Ec2NetworkClientTrait};
use std::sync::Arc;

pub const AWS_ACCESS_KEY_FIELD: &str = "amazonec2-access-key";
pub const AWS_SECRET_KEY_FIELD: &str = "amazonec2-secret-key";
pub const AWS_REGION_PARAMETER: &str = "amazonec2-region";

pub const AZURE_SUBSCRIPTION_ID_FIELD: &str = "azure-subscription-id";
pub const AZURE_TENANT_ID_FIELD: &str = "azure-tenant-id";
pub const AZURE_CLIENT_ID_FIELD: &str = "azure-client-id";
pub const AZURE_CLIENT_SECRET_FIELD: &str = "azure-client-secret";

/// Static AWS credentials for one region
#[derive(Clone)]
pub struct AwsCredentials {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

impl AwsCredentials {
    /// Read the key pair from auth secret data.
    pub fn from_secret(region: &str, data: &SecretData) -> Result<Self, ControllerError> {
        let field = |key: &str| {
            string_value(data, key)
                .ok_or_else(|| ControllerError::InvalidConfig(format!("auth secret lacks {key}")))
        };
        Ok(Self {
            region: region.to_string(),
            access_key_id: field(AWS_ACCESS_KEY_FIELD)?,
            secret_access_key: field(AWS_SECRET_KEY_FIELD)?,
        })
    }
}

/// Service principal fields read from auth secret data.
pub fn azure_credentials_from_secret(data: &SecretData) -> Result<AzureCredentials, ControllerError> {
    let field = |key: &str| {
        string_value(data, key)
            .ok_or_else(|| ControllerError::InvalidConfig(format!("auth secret lacks {key}")))
    };
    Ok(AzureCredentials {
        subscription_id: field(AZURE_SUBSCRIPTION_ID_FIELD)?,
        tenant_id: field(AZURE_TENANT_ID_FIELD)?,
        client_id: field(AZURE_CLIENT_ID_FIELD)?,
        client_secret: field(AZURE_CLIENT_SECRET_FIELD)?,
    })
}

/// Factory for cloud clients.
#[async_trait::async_trait]
pub trait CloudClients: Send + Sync {
    async fn ec2(&self, credentials: &AwsCredentials) -> Arc<dyn Ec2NetworkClientTrait>;

    fn resource_groups(
        &self,
        credentials: AzureCredentials,
    ) -> Result<Arc<dyn ResourceGroupClientTrait>, ControllerError>;
}

/// Clients talking to the real cloud APIs
#[derive(Debug, Clone, Copy, Default)]
pub struct SdkCloudClients;

#[async_trait::async_trait]
impl CloudClients for SdkCloudClients {
    async fn ec2(&self, credentials: &AwsCredentials) -> Arc<dyn Ec2NetworkClientTrait> {
        Arc::new(
            Ec2NetworkClient::new(
                &credentials.region,
                &credentials.access_key_id,
                &credentials.secret_access_key,
            )
            .await,
        )
    }

    fn resource_groups(
        &self,
        credentials: AzureCredentials,
    ) -> Result<Arc<dyn ResourceGroupClientTrait>, ControllerError> {
        Ok(Arc::new(ResourceGroupClient::new(credentials)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(entries: &[(&str, &str)]) -> SecretData {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
            .collect()
    }

    #[test]
    fn test_aws_credentials_require_both_keys() {
        let creds = AwsCredentials::from_secret(
            "eu-west-1",
            &data(&[("amazonec2-access-key", "AKIA"), ("amazonec2-secret-key", "s3cr3t")]),
        )
        .unwrap();
        assert_eq!(creds.access_key_id, "AKIA");
        assert!(!format!("{creds:?}").contains("s3cr3t"));

        let err = AwsCredentials::from_secret("eu-west-1", &data(&[("amazonec2-access-key", "AKIA")]))
            .unwrap_err();
        assert!(err.to_string().contains("amazonec2-secret-key"), "{err}");
    }

    #[test]
    fn test_azure_credentials_from_secret() {
        let creds = azure_credentials_from_secret(&data(&[
            ("azure-subscription-id", "sub"),
            ("azure-tenant-id", "tenant"),
            ("azure-client-id", "client"),
            ("azure-client-secret", "secret"),
        ]))
        .unwrap();
        assert_eq!(creds.subscription_id, "sub");

        let err = azure_credentials_from_secret(&data(&[("azure-subscription-id", "sub")])).unwrap_err();
        assert!(matches!(err, ControllerError::InvalidConfig(_)));
    }
}
