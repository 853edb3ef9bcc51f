//! Persisted provisioning progress
//!
//! External identifiers created on behalf of a Machine live in its
//! annotations so that a crashed or retried reconcile picks up where the
//! previous one stopped. The deletion guard lives in its finalizer list.

use crate::machine::{Machine, API_GROUP};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Finalizer placed on every Machine that is not being deleted.
pub const FINALIZER: &str = API_GROUP;

/// VPC created for the Machine.
pub const ANNOTATION_AWS_VPC: &str = "docker-machine.klusters.dev/aws-vpc";
/// Subnet inside the recorded VPC.
pub const ANNOTATION_AWS_SUBNET: &str = "docker-machine.klusters.dev/aws-subnet";
/// Internet gateway created for the VPC. Recorded before it is wired.
pub const ANNOTATION_AWS_GATEWAY: &str = "docker-machine.klusters.dev/aws-gateway";
/// Route table holding the default route through the gateway. Set only once
/// the gateway is attached and routed.
pub const ANNOTATION_AWS_ROUTE_TABLE: &str = "docker-machine.klusters.dev/aws-route-table";

/// AWS network identifiers recorded for a Machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisioningProgress {
    /// Value of [`ANNOTATION_AWS_VPC`].
    pub vpc_id: Option<String>,
    /// Value of [`ANNOTATION_AWS_SUBNET`].
    pub subnet_id: Option<String>,
    /// Value of [`ANNOTATION_AWS_GATEWAY`].
    pub gateway_id: Option<String>,
    /// Value of [`ANNOTATION_AWS_ROUTE_TABLE`]; present means the gateway is wired.
    pub route_table_id: Option<String>,
}

impl ProvisioningProgress {
    /// Read the record from annotations. Empty values count as unset.
    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Self {
        let read = |key: &str| {
            annotations
                .get(key)
                .filter(|v| !v.is_empty())
                .cloned()
        };
        Self {
            vpc_id: read(ANNOTATION_AWS_VPC),
            subnet_id: read(ANNOTATION_AWS_SUBNET),
            gateway_id: read(ANNOTATION_AWS_GATEWAY),
            route_table_id: read(ANNOTATION_AWS_ROUTE_TABLE),
        }
    }

    pub fn from_machine(machine: &Machine) -> Self {
        machine
            .metadata
            .annotations
            .as_ref()
            .map(Self::from_annotations)
            .unwrap_or_default()
    }

    /// Every node of the network graph is recorded and the gateway is wired.
    pub fn is_complete(&self) -> bool {
        self.vpc_id.is_some()
            && self.subnet_id.is_some()
            && self.gateway_id.is_some()
            && self.route_table_id.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.vpc_id.is_none()
            && self.subnet_id.is_none()
            && self.gateway_id.is_none()
            && self.route_table_id.is_none()
    }

    fn entries(&self) -> [(&'static str, &Option<String>); 4] {
        [
            (ANNOTATION_AWS_VPC, &self.vpc_id),
            (ANNOTATION_AWS_SUBNET, &self.subnet_id),
            (ANNOTATION_AWS_GATEWAY, &self.gateway_id),
            (ANNOTATION_AWS_ROUTE_TABLE, &self.route_table_id),
        ]
    }

    /// Merge patch body setting recorded IDs and removing cleared ones.
    pub fn annotations_patch(&self) -> Value {
        let mut annotations = Map::new();
        for (key, value) in self.entries() {
            let v = match value {
                Some(id) => Value::String(id.clone()),
                None => Value::Null,
            };
            annotations.insert(key.to_string(), v);
        }
        json!({ "metadata": { "annotations": annotations } })
    }

    /// Apply the record to an in-memory annotation map.
    pub fn apply_to(&self, annotations: &mut BTreeMap<String, String>) {
        for (key, value) in self.entries() {
            match value {
                Some(id) => {
                    annotations.insert(key.to_string(), id.clone());
                }
                None => {
                    annotations.remove(key);
                }
            }
        }
    }
}

/// Finalizer list of a Machine viewed as an owned set of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionGuard {
    finalizers: Vec<String>,
}

impl DeletionGuard {
    pub fn from_machine(machine: &Machine) -> Self {
        Self {
            finalizers: machine.metadata.finalizers.clone().unwrap_or_default(),
        }
    }

    pub fn contains(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Returns `false` when the finalizer was already present.
    pub fn add(&mut self, finalizer: &str) -> bool {
        if self.contains(finalizer) {
            return false;
        }
        self.finalizers.push(finalizer.to_string());
        true
    }

    /// Returns `false` when the finalizer was not present.
    pub fn remove(&mut self, finalizer: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != finalizer);
        before != self.finalizers.len()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.finalizers
    }

    pub fn as_slice(&self) -> &[String] {
        &self.finalizers
    }
}
