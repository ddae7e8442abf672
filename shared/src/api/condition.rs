use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single status condition, following the orchestrator's standard shape
/// (`type`/`status`/`reason`/`message`/`lastTransitionTime`).
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_transition_time: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl Condition {
    pub fn ready(status: ConditionStatus, reason: &str, message: Option<String>, now: DateTime<Utc>) -> Self {
        Condition {
            type_: "Ready".to_string(),
            status,
            reason: reason.to_string(),
            message,
            last_transition_time: now,
        }
    }
}
