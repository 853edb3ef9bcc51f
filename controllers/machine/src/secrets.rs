//! Secret access
//!
//! Secrets are opaque key/value maps. The reconciler decides what a usable
//! script or credential set looks like.

use crate::error::ControllerError;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use std::collections::BTreeMap;

/// Secret data keyed by field name
pub type SecretData = BTreeMap<String, Vec<u8>>;

#[async_trait::async_trait]
pub trait SecretStore: Send + Sync {
    /// Data of the named secret, `None` if it does not exist.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<SecretData>, ControllerError>;
}

/// [`SecretStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
}

impl std::fmt::Debug for KubeSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretStore").finish_non_exhaustive()
    }
}

impl KubeSecretStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl SecretStore for KubeSecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<SecretData>, ControllerError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let Some(secret) = api.get_opt(name).await? else {
            return Ok(None);
        };
        Ok(Some(
            secret
                .data
                .unwrap_or_default()
                .into_iter()
                .map(|(key, value)| (key, value.0))
                .collect(),
        ))
    }
}

/// First entry whose key and value are both non-empty.
pub fn first_entry(data: &SecretData) -> Option<(&str, &[u8])> {
    data.iter()
        .find(|(key, value)| !key.is_empty() && !value.is_empty())
        .map(|(key, value)| (key.as_str(), value.as_slice()))
}

/// UTF-8 value of `key`, `None` when absent or empty.
pub fn string_value(data: &SecretData, key: &str) -> Option<String> {
    data.get(key)
        .filter(|v| !v.is_empty())
        .map(|v| String::from_utf8_lossy(v).trim().to_string())
        .filter(|v| !v.is_empty())
}
