use super::{Condition, PodTemplate, ProviderSpec};
use crate::system::DEFAULT_HOST_PATH_PREFIX;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

fn default_host_path_prefix() -> String {
    DEFAULT_HOST_PATH_PREFIX.to_string()
}

/// User-facing object declaring "I want a stoppable container with this
/// image and this running flag" (§3).
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "stoppablecontainer.dev",
    version = "v1alpha1",
    kind = "Workload",
    plural = "workloads",
    namespaced,
    status = "WorkloadStatus",
    printcolumn = r#"{"name":"Running", "type":"boolean", "jsonPath":".spec.running"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSpec {
    #[serde(default)]
    pub running: bool,
    pub template: PodTemplate,
    #[serde(default)]
    pub provider: ProviderSpec,
    #[serde(default = "default_host_path_prefix")]
    pub host_path_prefix: String,
}

impl Default for WorkloadSpec {
    fn default() -> Self {
        WorkloadSpec {
            running: false,
            template: Default::default(),
            provider: Default::default(),
            host_path_prefix: default_host_path_prefix(),
        }
    }
}

/// Observed state of a [`Workload`], mirroring §3's phase set.
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadStatus {
    #[serde(default)]
    pub phase: WorkloadPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_pod_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_pod_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Workload phase set from §3.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
pub enum WorkloadPhase {
    #[default]
    Pending,
    ProviderReady,
    Running,
    Stopped,
    Failed,
}

impl From<super::InstancePhase> for WorkloadPhase {
    /// §4.3's status projection table.
    fn from(phase: super::InstancePhase) -> Self {
        use super::InstancePhase::*;
        match phase {
            Pending | ProviderStarting => WorkloadPhase::Pending,
            ProviderReady | ConsumerStarting => WorkloadPhase::ProviderReady,
            Running => WorkloadPhase::Running,
            Stopping | Stopped => WorkloadPhase::Stopped,
            Failed => WorkloadPhase::Failed,
        }
    }
}
