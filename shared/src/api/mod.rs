//! Custom resource types: `Workload` and `Instance` (§3, §6.1).

mod condition;
mod instance;
mod workload;

pub use condition::{Condition, ConditionStatus};
pub use instance::{Instance, InstancePhase, InstanceSpec, InstanceStatus};
pub use workload::{Workload, WorkloadPhase, WorkloadSpec, WorkloadStatus};

use k8s_openapi::api::core::v1::{PodTemplateSpec, ResourceRequirements, Toleration};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Scheduling hints forwarded to the Provider pod (§6.1 `provider`).
#[derive(Serialize, Deserialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<std::collections::BTreeMap<String, String>>,
    #[serde(default)]
    pub tolerations: Vec<Toleration>,
}

/// Shared by both CRDs: the user-provided pod template (§3, first container
/// is the workload).
pub type PodTemplate = PodTemplateSpec;
