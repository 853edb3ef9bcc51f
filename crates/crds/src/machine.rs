//! Machine CRD
//!
//! Declares one docker-machine provisioned host: which driver creates it, the
//! secrets holding its startup script and credentials, and the flags passed
//! through to the driver.

use crate::conditions::Conditions;
use crate::phase::{derive_phase, MachinePhase};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// API group of the Machine CRD. Also used as the deletion-guard finalizer.
pub const API_GROUP: &str = "docker-machine.klusters.dev";

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "docker-machine.klusters.dev",
    version = "v1alpha1",
    kind = "Machine",
    namespaced,
    status = "MachineStatus",
    printcolumn = r#"{"name":"Driver","type":"string","jsonPath":".spec.driver.name"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    /// docker-machine driver used to create the host
    pub driver: DriverRef,

    /// Secret holding the startup script (first key is the script flag name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_ref: Option<SecretRef>,

    /// Secret holding driver credentials (each key becomes a flag)
    pub auth_secret: SecretRef,

    /// Extra driver flags, passed as `--<key> <value>`
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DriverRef {
    /// Driver name as understood by docker-machine (e.g. "amazonec2")
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    /// Name of the Secret
    pub name: String,

    /// Namespace (defaults to same namespace as the Machine)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl SecretRef {
    /// Namespace of the referenced Secret, falling back to `default_namespace`.
    pub fn namespace_or<'a>(&'a self, default_namespace: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(default_namespace)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    /// Condition ledger
    #[serde(default)]
    pub conditions: Conditions,

    /// Coarse lifecycle label, always recomputed from `conditions`
    #[serde(default)]
    pub phase: MachinePhase,

    /// Generation the status was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Machine {
    /// `namespace/name` key used for logging and backoff bookkeeping.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace_or_default(), self.name_any())
    }

    /// Namespace of the Machine, `default` when unset.
    pub fn namespace_or_default(&self) -> String {
        self.namespace().unwrap_or_else(|| "default".to_string())
    }

    /// Whether deletion has been requested.
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Parameter value from the spec, ignoring empty strings.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.spec
            .parameters
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Read-only view of the condition ledger.
    pub fn conditions(&self) -> Conditions {
        self.status
            .as_ref()
            .map(|s| s.conditions.clone())
            .unwrap_or_default()
    }

    /// Mutable ledger, creating an empty status on first use.
    pub fn conditions_mut(&mut self) -> &mut Conditions {
        &mut self.status.get_or_insert_with(MachineStatus::default).conditions
    }

    /// Derived phase for the current ledger and deletion intent.
    pub fn phase(&self) -> MachinePhase {
        let empty = Conditions::default();
        let conditions = self.status.as_ref().map_or(&empty, |s| &s.conditions);
        derive_phase(conditions, self.is_deleting())
    }

    /// Status to persist: ledger with a fresh `Ready` summary and derived phase.
    pub fn computed_status(&self) -> MachineStatus {
        let mut conditions = self.conditions();
        conditions.set_summary();
        let phase = derive_phase(&conditions, self.is_deleting());
        MachineStatus {
            conditions,
            phase,
            observed_generation: self.metadata.generation,
        }
    }
}
