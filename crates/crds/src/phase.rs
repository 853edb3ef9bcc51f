//! Phase derivation
//!
//! The phase is a pure projection of the condition ledger and deletion intent.
//! It is never stored independently of the conditions it is derived from.

use crate::conditions::{reasons, ConditionStatus, Conditions};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum MachinePhase {
    /// Conditions exist but none feeds the `Ready` aggregate yet
    Pending,
    #[default]
    InProgress,
    WaitingForScriptCompletion,
    ClusterOperationFailed,
    Success,
    Terminating,
    Failed,
}

impl fmt::Display for MachinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MachinePhase::Pending => "Pending",
            MachinePhase::InProgress => "InProgress",
            MachinePhase::WaitingForScriptCompletion => "WaitingForScriptCompletion",
            MachinePhase::ClusterOperationFailed => "ClusterOperationFailed",
            MachinePhase::Success => "Success",
            MachinePhase::Terminating => "Terminating",
            MachinePhase::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Map the ledger and deletion intent to a phase.
pub fn derive_phase(conditions: &Conditions, deletion_requested: bool) -> MachinePhase {
    if deletion_requested {
        return MachinePhase::Terminating;
    }
    if conditions.is_empty() {
        return MachinePhase::InProgress;
    }

    let Some(ready) = conditions.summary() else {
        return MachinePhase::Pending;
    };
    if ready.status == ConditionStatus::True {
        return MachinePhase::Success;
    }

    match ready.reason.as_deref() {
        Some(reasons::WAITING_FOR_SCRIPT_COMPLETION) => MachinePhase::WaitingForScriptCompletion,
        Some(reasons::CLUSTER_OPERATION_FAILED) => MachinePhase::ClusterOperationFailed,
        Some(reasons::MACHINE_CREATION_FAILED) => MachinePhase::Failed,
        _ => MachinePhase::InProgress,
    }
}
