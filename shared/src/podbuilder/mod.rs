//! Deterministically renders the Provider and Consumer pod specs for one
//! Instance (§4.1), grounded on `k8s/pod.rs`'s `create_new_pod_from_spec`/
//! `modify_pod_spec` pair: clone the user's template, patch specific
//! fields, never hand-assemble a `PodSpec` from scratch.

mod capabilities;
mod consumer;
mod provider;

pub use capabilities::merge_capabilities;
pub use consumer::consumer_pod;
pub use provider::provider_pod;

use crate::api::{Instance, InstancePhase};
use crate::system::{label_instance, label_managed_by, label_role, MANAGED_BY_VALUE};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use std::collections::BTreeMap;

/// Pod role, used both to stamp the `role` label and to pick the rendering path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Provider,
    Consumer,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Role::Provider => "provider",
            Role::Consumer => "consumer",
        }
    }
}

/// System labels only (§4.1 "Labels"); these override any identical
/// user-supplied keys in the template.
pub fn labels_for(instance_name: &str, role: Role) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(label_managed_by(), MANAGED_BY_VALUE.to_string());
    labels.insert(label_instance(), instance_name.to_string());
    labels.insert(label_role(), role.as_str().to_string());
    labels
}

fn owner_reference(instance: &Instance) -> anyhow::Result<OwnerReference> {
    let name = instance
        .metadata
        .name
        .clone()
        .ok_or_else(|| anyhow::anyhow!("Instance missing metadata.name"))?;
    let uid = instance
        .metadata
        .uid
        .clone()
        .ok_or_else(|| anyhow::anyhow!("Instance missing metadata.uid"))?;
    Ok(OwnerReference {
        api_version: "stoppablecontainer.dev/v1alpha1".to_string(),
        kind: "Instance".to_string(),
        name,
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

pub(crate) fn instance_namespace(instance: &Instance) -> anyhow::Result<String> {
    instance
        .metadata
        .namespace
        .clone()
        .ok_or_else(|| anyhow::anyhow!("Instance missing metadata.namespace"))
}

pub(crate) fn instance_name(instance: &Instance) -> anyhow::Result<String> {
    instance
        .metadata
        .name
        .clone()
        .ok_or_else(|| anyhow::anyhow!("Instance missing metadata.name"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_for_stamps_system_labels_only() {
        let labels = labels_for("demo", Role::Provider);
        assert_eq!(labels.get(&label_role()), Some(&"provider".to_string()));
        assert_eq!(labels.get(&label_instance()), Some(&"demo".to_string()));
        assert_eq!(labels.len(), 3);
    }
}
