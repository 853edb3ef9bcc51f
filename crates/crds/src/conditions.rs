//! Condition ledger
//!
//! Typed, reasoned boolean status entries attached to a Machine. The ledger
//! holds at most one entry per type and never more than [`MAX_CONDITIONS`]
//! entries. Updates are upserts by type: the transition time only moves when
//! the status actually changes.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Upper bound on ledger size.
pub const MAX_CONDITIONS: usize = 8;

/// Condition reasons shared by the controller and the phase deriver.
pub mod reasons {
    /// `docker-machine create` is running
    pub const MACHINE_CREATING: &str = "MachineCreating";
    /// `docker-machine create` exited unsuccessfully
    pub const MACHINE_CREATION_FAILED: &str = "MachineCreationFailed";
    /// Script secret missing or empty
    pub const SCRIPT_DATA_NOT_FOUND: &str = "ScriptDataNotFound";
    /// Auth secret missing or holding an empty entry
    pub const AUTH_DATA_NOT_FOUND: &str = "AuthDataNotFound";
    /// Waiting for the script's result file on the host
    pub const WAITING_FOR_SCRIPT_COMPLETION: &str = "WaitingForScriptCompletion";
    /// Waiting for the script Job to finish
    pub const WAITING_FOR_SCRIPT_RUN: &str = "WaitingForScriptRun";
    /// Startup script reported failure
    pub const CLUSTER_OPERATION_FAILED: &str = "ClusterOperationFailed";
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum ConditionType {
    /// Synthesized aggregate of [`SUMMARY_ORDER`]
    Ready,
    /// Host exists
    MachineReady,
    /// Startup script resolved and staged
    ScriptReady,
    /// Auth secret resolved
    AuthDataReady,
    /// Startup script finished
    ClusterOperationComplete,
    /// `docker-machine create` in flight
    MachineCreating,
    /// Any type written by another actor. Dropped when the ledger is read.
    #[serde(other)]
    Other,
}

impl ConditionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionType::Ready => "Ready",
            ConditionType::MachineReady => "MachineReady",
            ConditionType::ScriptReady => "ScriptReady",
            ConditionType::AuthDataReady => "AuthDataReady",
            ConditionType::ClusterOperationComplete => "ClusterOperationComplete",
            ConditionType::MachineCreating => "MachineCreating",
            ConditionType::Other => "Other",
        }
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition types folded into `Ready`, in reporting order.
pub const SUMMARY_ORDER: [ConditionType; 4] = [
    ConditionType::MachineReady,
    ConditionType::ClusterOperationComplete,
    ConditionType::AuthDataReady,
    ConditionType::ScriptReady,
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConditionSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    #[schemars(with = "String")]
    pub type_: ConditionType,

    pub status: ConditionStatus,

    /// Short machine-readable cause
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<ConditionSeverity>,

    /// Human readable detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the status flipped
    pub last_transition_time: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }

    pub fn is_false(&self) -> bool {
        self.status == ConditionStatus::False
    }

    pub fn has_reason(&self, reason: &str) -> bool {
        self.reason.as_deref() == Some(reason)
    }
}

/// The ledger itself. Serialized as a plain list.
///
/// Reading a list goes through [`Conditions::set`], so duplicates collapse
/// and entries of foreign types are dropped.
#[derive(Debug, Clone, Default, Serialize, JsonSchema, PartialEq)]
#[serde(transparent)]
pub struct Conditions(Vec<Condition>);

impl<'de> Deserialize<'de> for Conditions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<Condition>::deserialize(deserializer).map(Conditions::from)
    }
}

impl Conditions {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    pub fn get(&self, type_: ConditionType) -> Option<&Condition> {
        self.0.iter().find(|c| c.type_ == type_)
    }

    pub fn is_true(&self, type_: ConditionType) -> bool {
        self.get(type_).is_some_and(Condition::is_true)
    }

    /// Whether `type_` is False with the given reason.
    pub fn is_false_with(&self, type_: ConditionType, reason: &str) -> bool {
        self.get(type_)
            .is_some_and(|c| c.is_false() && c.has_reason(reason))
    }

    pub fn mark_true(&mut self, type_: ConditionType) {
        self.set(Condition {
            type_,
            status: ConditionStatus::True,
            reason: None,
            severity: None,
            message: None,
            last_transition_time: Utc::now(),
            observed_generation: None,
        });
    }

    pub fn mark_false(
        &mut self,
        type_: ConditionType,
        reason: &str,
        severity: ConditionSeverity,
        message: impl Into<String>,
    ) {
        self.set(Condition {
            type_,
            status: ConditionStatus::False,
            reason: Some(reason.to_string()),
            severity: Some(severity),
            message: Some(message.into()),
            last_transition_time: Utc::now(),
            observed_generation: None,
        });
    }

    pub fn mark_unknown(&mut self, type_: ConditionType, reason: &str, message: impl Into<String>) {
        self.set(Condition {
            type_,
            status: ConditionStatus::Unknown,
            reason: Some(reason.to_string()),
            severity: None,
            message: Some(message.into()),
            last_transition_time: Utc::now(),
            observed_generation: None,
        });
    }

    /// Upsert by type.
    ///
    /// Keeps the existing transition time when the status is unchanged and
    /// drops any duplicate entries of the same type left by external edits.
    pub fn set(&mut self, mut condition: Condition) {
        match self.0.iter().position(|c| c.type_ == condition.type_) {
            Some(idx) => {
                if self.0[idx].status == condition.status {
                    condition.last_transition_time = self.0[idx].last_transition_time;
                }
                self.0[idx] = condition;
                let mut seen = false;
                let type_ = self.0[idx].type_;
                self.0.retain(|c| {
                    if c.type_ != type_ {
                        return true;
                    }
                    let keep = !seen;
                    seen = true;
                    keep
                });
            }
            None => self.0.push(condition),
        }
        // Ready first, the rest alphabetical
        self.0
            .sort_by_key(|c| (c.type_ != ConditionType::Ready, c.type_.as_str()));
        debug_assert!(self.0.len() <= MAX_CONDITIONS);
    }

    pub fn remove(&mut self, type_: ConditionType) {
        self.0.retain(|c| c.type_ != type_);
    }

    /// Compute the `Ready` aggregate without storing it.
    ///
    /// Only members of [`SUMMARY_ORDER`] that are present participate. The
    /// result is True when all of them are True, False when any is False and
    /// Unknown otherwise. Reason and message are taken from the most severe
    /// False member, ties broken by [`SUMMARY_ORDER`]. Returns `None` when no
    /// member is present.
    pub fn summary(&self) -> Option<Condition> {
        let members: Vec<&Condition> = SUMMARY_ORDER
            .iter()
            .filter_map(|t| self.get(*t))
            .collect();
        if members.is_empty() {
            return None;
        }

        let previous = self.get(ConditionType::Ready);
        let build = |status: ConditionStatus, source: Option<&Condition>| Condition {
            type_: ConditionType::Ready,
            status,
            reason: source.and_then(|c| c.reason.clone()),
            severity: source.and_then(|c| c.severity),
            message: source.and_then(|c| c.message.clone()),
            last_transition_time: previous
                .filter(|p| p.status == status)
                .map_or_else(Utc::now, |p| p.last_transition_time),
            observed_generation: None,
        };

        if members.iter().all(|c| c.is_true()) {
            return Some(build(ConditionStatus::True, None));
        }

        let worst_false = members
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_false())
            .min_by_key(|(idx, c)| (c.severity.unwrap_or(ConditionSeverity::Info), *idx))
            .map(|(_, c)| *c);
        if let Some(source) = worst_false {
            return Some(build(ConditionStatus::False, Some(source)));
        }

        let first_unknown = members
            .iter()
            .find(|c| c.status == ConditionStatus::Unknown)
            .copied();
        Some(build(ConditionStatus::Unknown, first_unknown))
    }

    /// Store the `Ready` aggregate, or drop it when no member is present.
    pub fn set_summary(&mut self) {
        match self.summary() {
            Some(ready) => self.set(ready),
            None => self.remove(ConditionType::Ready),
        }
    }
}

impl From<Vec<Condition>> for Conditions {
    fn from(conditions: Vec<Condition>) -> Self {
        let mut ledger = Conditions::default();
        for condition in conditions.into_iter().filter(|c| c.type_ != ConditionType::Other) {
            ledger.set(condition);
        }
        ledger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[test]
    fn test_upsert_keeps_one_entry_per_type() {
        let mut ledger = Conditions::default();
        ledger.mark_true(ConditionType::ScriptReady);
        ledger.mark_false(
            ConditionType::ScriptReady,
            reasons::SCRIPT_DATA_NOT_FOUND,
            ConditionSeverity::Error,
            "script data not found",
        );
        ledger.mark_true(ConditionType::ScriptReady);

        assert_eq!(ledger.len(), 1);
        assert!(ledger.is_true(ConditionType::ScriptReady));
    }

    #[test]
    fn test_transition_time_preserved_when_status_unchanged() {
        let mut ledger = Conditions::default();
        ledger.set(Condition {
            type_: ConditionType::AuthDataReady,
            status: ConditionStatus::False,
            reason: Some(reasons::AUTH_DATA_NOT_FOUND.to_string()),
            severity: Some(ConditionSeverity::Error),
            message: Some("first".to_string()),
            last_transition_time: at(1_000),
            observed_generation: None,
        });

        ledger.mark_false(
            ConditionType::AuthDataReady,
            reasons::AUTH_DATA_NOT_FOUND,
            ConditionSeverity::Error,
            "second",
        );
        let cond = ledger.get(ConditionType::AuthDataReady).unwrap();
        assert_eq!(cond.last_transition_time, at(1_000));
        assert_eq!(cond.message.as_deref(), Some("second"));

        ledger.mark_true(ConditionType::AuthDataReady);
        let cond = ledger.get(ConditionType::AuthDataReady).unwrap();
        assert!(cond.last_transition_time > at(1_000));
        assert!(cond.reason.is_none());
    }

    #[test]
    fn test_ledger_is_bounded() {
        let mut ledger = Conditions::default();
        for _ in 0..5 {
            for t in SUMMARY_ORDER {
                ledger.mark_true(t);
            }
            ledger.mark_true(ConditionType::MachineCreating);
            ledger.set_summary();
        }
        assert_eq!(ledger.len(), 6);
        assert!(ledger.len() <= MAX_CONDITIONS);
    }

    #[test]
    fn test_duplicates_from_external_edits_are_collapsed() {
        let dup = |status| Condition {
            type_: ConditionType::MachineReady,
            status,
            reason: None,
            severity: None,
            message: None,
            last_transition_time: at(5),
            observed_generation: Some(2),
        };
        let ledger = Conditions::from(vec![dup(ConditionStatus::False), dup(ConditionStatus::True)]);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.is_true(ConditionType::MachineReady));
    }

    #[test]
    fn test_summary_absent_without_members() {
        let mut ledger = Conditions::default();
        ledger.mark_true(ConditionType::MachineCreating);
        assert!(ledger.summary().is_none());
    }

    #[test]
    fn test_summary_true_when_all_present_members_true() {
        let mut ledger = Conditions::default();
        ledger.mark_true(ConditionType::AuthDataReady);
        ledger.mark_true(ConditionType::MachineReady);
        let ready = ledger.summary().unwrap();
        assert!(ready.is_true());
    }

    #[test]
    fn test_summary_prefers_error_severity_then_order() {
        let mut ledger = Conditions::default();
        ledger.mark_false(
            ConditionType::ClusterOperationComplete,
            reasons::WAITING_FOR_SCRIPT_COMPLETION,
            ConditionSeverity::Info,
            "waiting",
        );
        ledger.mark_false(
            ConditionType::ScriptReady,
            reasons::SCRIPT_DATA_NOT_FOUND,
            ConditionSeverity::Error,
            "script data not found",
        );
        let ready = ledger.summary().unwrap();
        assert!(ready.is_false());
        assert!(ready.has_reason(reasons::SCRIPT_DATA_NOT_FOUND));

        ledger.mark_false(
            ConditionType::MachineReady,
            reasons::MACHINE_CREATION_FAILED,
            ConditionSeverity::Error,
            "exit status 1",
        );
        let ready = ledger.summary().unwrap();
        assert!(ready.has_reason(reasons::MACHINE_CREATION_FAILED));
    }

    #[test]
    fn test_ready_sorted_first() {
        let mut ledger = Conditions::default();
        ledger.mark_true(ConditionType::ScriptReady);
        ledger.mark_true(ConditionType::AuthDataReady);
        ledger.set_summary();
        let order: Vec<ConditionType> = ledger.iter().map(|c| c.type_).collect();
        assert_eq!(
            order,
            vec![
                ConditionType::Ready,
                ConditionType::AuthDataReady,
                ConditionType::ScriptReady
            ]
        );
    }

    #[test]
    fn test_foreign_condition_types_are_dropped_on_read() {
        let json = serde_json::json!([
            {"type": "NodeHealthy", "status": "False", "reason": "Unreachable", "severity": "Error",
             "lastTransitionTime": "2026-01-01T00:00:00Z"},
            {"type": "MachineReady", "status": "True", "lastTransitionTime": "2026-01-01T00:00:00Z"},
        ]);

        let ledger: Conditions = serde_json::from_value(json).unwrap();

        assert_eq!(ledger.len(), 1);
        assert!(ledger.get(ConditionType::Other).is_none());
        assert!(ledger.summary().unwrap().is_true());
    }

    #[test]
    fn test_status_with_foreign_condition_decodes() {
        let status: crate::MachineStatus = serde_json::from_value(serde_json::json!({
            "conditions": [
                {"type": "NodeHealthy", "status": "True", "lastTransitionTime": "2026-01-01T00:00:00Z"},
            ],
        }))
        .unwrap();

        assert!(status.conditions.is_empty());
    }

    #[test]
    fn test_serialized_shape() {
        let mut ledger = Conditions::default();
        ledger.mark_false(
            ConditionType::MachineReady,
            reasons::MACHINE_CREATION_FAILED,
            ConditionSeverity::Error,
            "boom",
        );
        let json = serde_json::to_value(&ledger).unwrap();
        let first = &json[0];
        assert_eq!(first["type"], "MachineReady");
        assert_eq!(first["status"], "False");
        assert_eq!(first["reason"], "MachineCreationFailed");
        assert_eq!(first["severity"], "Error");
        assert!(first.get("lastTransitionTime").is_some());
    }
}
