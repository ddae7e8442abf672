use super::{Condition, PodTemplate, ProviderSpec};
use crate::system::{API_GROUP, API_VERSION, DEFAULT_HOST_PATH_PREFIX};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_host_path_prefix() -> String {
    DEFAULT_HOST_PATH_PREFIX.to_string()
}

/// The controller-owned child realizing one running or stopped context (§3).
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "stoppablecontainer.dev",
    version = "v1alpha1",
    kind = "Instance",
    plural = "instances",
    namespaced,
    status = "InstanceStatus",
    printcolumn = r#"{"name":"Workload", "type":"string", "jsonPath":".spec.workloadName"}"#,
    printcolumn = r#"{"name":"Running", "type":"boolean", "jsonPath":".spec.running"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Node", "type":"string", "jsonPath":".status.nodeName"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    pub workload_name: String,
    #[serde(default = "default_true")]
    pub running: bool,
    pub template: PodTemplate,
    #[serde(default)]
    pub provider: ProviderSpec,
    #[serde(default = "default_host_path_prefix")]
    pub host_path_prefix: String,
}

impl Default for InstanceSpec {
    fn default() -> Self {
        InstanceSpec {
            workload_name: String::new(),
            running: true,
            template: Default::default(),
            provider: Default::default(),
            host_path_prefix: default_host_path_prefix(),
        }
    }
}

/// Observed state of an [`Instance`], mirroring §3's phase set exactly.
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    #[serde(default)]
    pub phase: InstancePhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_pod_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_pod_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_pod_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_pod_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rootfs_pid: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Instance phase set from §3/§4.2, modeled as a sum type rather than a
/// bare string (Design Note 3).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
pub enum InstancePhase {
    #[default]
    Pending,
    ProviderStarting,
    ProviderReady,
    ConsumerStarting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl InstancePhase {
    /// Derived consumer pod name: `<instance>` (§4.1).
    pub fn consumer_pod_name(instance_name: &str) -> String {
        instance_name.to_string()
    }

    /// Derived provider pod name: `<instance>-provider` (§4.1).
    pub fn provider_pod_name(instance_name: &str) -> String {
        format!("{instance_name}-provider")
    }

    /// Metric label value (§23's `instances_by_phase` gauge).
    pub fn label(self) -> &'static str {
        match self {
            InstancePhase::Pending => "Pending",
            InstancePhase::ProviderStarting => "ProviderStarting",
            InstancePhase::ProviderReady => "ProviderReady",
            InstancePhase::ConsumerStarting => "ConsumerStarting",
            InstancePhase::Running => "Running",
            InstancePhase::Stopping => "Stopping",
            InstancePhase::Stopped => "Stopped",
            InstancePhase::Failed => "Failed",
        }
    }
}

/// Maps an [`InstancePhase`] to the Ready condition's `(status, reason)`
/// pair from §4.2's phase -> condition table.
impl From<InstancePhase> for (super::ConditionStatus, &'static str) {
    fn from(phase: InstancePhase) -> Self {
        use super::ConditionStatus::*;
        match phase {
            InstancePhase::Running => (True, "Running"),
            InstancePhase::Failed => (False, "Failed"),
            InstancePhase::Pending => (False, "Pending"),
            InstancePhase::ProviderStarting => (False, "ProviderStarting"),
            InstancePhase::ProviderReady => (False, "ProviderReady"),
            InstancePhase::ConsumerStarting => (False, "ConsumerStarting"),
            InstancePhase::Stopping => (False, "Stopping"),
            InstancePhase::Stopped => (False, "Stopped"),
        }
    }
}

pub fn full_api_group_version() -> String {
    format!("{API_GROUP}/{API_VERSION}")
}
