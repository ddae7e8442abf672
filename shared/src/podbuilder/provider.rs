use super::{instance_name, instance_namespace, labels_for, owner_reference, Role};
use crate::api::Instance;
use crate::config::OperatorConfig;
use crate::system::podlayout::{
    DRIVER_PROPAGATED_MOUNT, HOST_DIR_VOLUME_NAME, PAUSE_BINARY_PATH, PAUSE_VOLUME_NAME,
    PROVIDER_INTERIOR_MOUNT,
};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, EnvVarSource, ExecAction, HostPathVolumeSource, ObjectFieldSelector,
    Pod, PodSpec, Probe, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Renders the Provider pod: a *pause-init* init container, a *rootfs*
/// container running the user's image with `pause` as its entrypoint, and a
/// *driver* container that drives the rendezvous protocol (§4.1).
pub fn provider_pod(instance: &Instance, cfg: &OperatorConfig) -> anyhow::Result<Pod> {
    let name = super::InstancePhase::provider_pod_name(&instance_name(instance)?);
    let namespace = instance_namespace(instance)?;
    let host_dir = host_work_dir(instance, cfg)?;

    let template_spec = instance
        .spec
        .template
        .spec
        .clone()
        .ok_or_else(|| anyhow::anyhow!("Instance template has no pod spec"))?;
    let mut rootfs_container = template_spec
        .containers
        .first()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Instance template has no containers"))?;

    rootfs_container.name = "rootfs".to_string();
    rootfs_container.command = Some(vec![PAUSE_BINARY_PATH.to_string()]);
    rootfs_container.args = None;
    let mut env = rootfs_container.env.take().unwrap_or_default();
    env.push(EnvVar {
        name: crate::system::ROOTFS_MARKER_VAR.to_string(),
        value: Some("true".to_string()),
        value_from: None,
    });
    rootfs_container.env = Some(env);

    let mut volume_mounts = rootfs_container.volume_mounts.take().unwrap_or_default();
    volume_mounts.push(VolumeMount {
        name: PAUSE_VOLUME_NAME.to_string(),
        mount_path: "/pause-vol".to_string(),
        ..Default::default()
    });
    volume_mounts.push(VolumeMount {
        name: HOST_DIR_VOLUME_NAME.to_string(),
        mount_path: PROVIDER_INTERIOR_MOUNT.to_string(),
        mount_propagation: Some("HostToContainer".to_string()),
        ..Default::default()
    });
    rootfs_container.volume_mounts = Some(volume_mounts);
    rootfs_container.security_context = None;

    let driver_container = Container {
        name: "driver".to_string(),
        image: Some(cfg.driver_image.clone()),
        env: Some(vec![
            downward_env_var("POD_UID", "metadata.uid"),
            downward_env_var("POD_NAMESPACE", "metadata.namespace"),
            downward_env_var("POD_NAME", "metadata.name"),
        ]),
        volume_mounts: Some(vec![VolumeMount {
            name: HOST_DIR_VOLUME_NAME.to_string(),
            mount_path: DRIVER_PROPAGATED_MOUNT.to_string(),
            mount_propagation: Some("HostToContainer".to_string()),
            ..Default::default()
        }]),
        readiness_probe: Some(Probe {
            exec: Some(ExecAction {
                command: Some(vec![
                    "test".to_string(),
                    "-e".to_string(),
                    format!("{DRIVER_PROPAGATED_MOUNT}/ready"),
                ]),
            }),
            period_seconds: Some(2),
            ..Default::default()
        }),
        liveness_probe: Some(Probe {
            exec: Some(ExecAction {
                command: Some(vec![
                    "test".to_string(),
                    "-d".to_string(),
                    format!("{DRIVER_PROPAGATED_MOUNT}/rootfs"),
                ]),
            }),
            initial_delay_seconds: Some(30),
            period_seconds: Some(30),
            ..Default::default()
        }),
        ..Default::default()
    };

    let mut init_containers = template_spec.init_containers.clone().unwrap_or_default();
    init_containers.push(Container {
        name: "pause-init".to_string(),
        image: Some(cfg.pause_image_digest_ref.clone()),
        volume_mounts: Some(vec![VolumeMount {
            name: PAUSE_VOLUME_NAME.to_string(),
            mount_path: "/pause-vol".to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    });

    let mut volumes = template_spec.volumes.clone().unwrap_or_default();
    volumes.push(Volume {
        name: PAUSE_VOLUME_NAME.to_string(),
        empty_dir: Some(Default::default()),
        ..Default::default()
    });
    volumes.push(Volume {
        name: HOST_DIR_VOLUME_NAME.to_string(),
        host_path: Some(HostPathVolumeSource {
            path: host_dir,
            type_: Some("DirectoryOrCreate".to_string()),
        }),
        ..Default::default()
    });

    let pod_spec = PodSpec {
        share_process_namespace: Some(true),
        containers: vec![rootfs_container, driver_container],
        init_containers: Some(init_containers),
        volumes: Some(volumes),
        node_selector: template_spec.node_selector.clone(),
        tolerations: Some(instance.spec.provider.tolerations.clone()),
        restart_policy: Some("Always".to_string()),
        ..Default::default()
    };

    Ok(Pod {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(namespace),
            labels: Some(merge_template_labels(instance, Role::Provider)),
            owner_references: Some(vec![owner_reference(instance)?]),
            ..Default::default()
        },
        spec: Some(pod_spec),
        ..Default::default()
    })
}

fn merge_template_labels(instance: &Instance, role: Role) -> std::collections::BTreeMap<String, String> {
    let mut labels = instance
        .spec
        .template
        .metadata
        .as_ref()
        .and_then(|m| m.labels.clone())
        .unwrap_or_default();
    labels.extend(labels_for(instance.metadata.name.as_deref().unwrap_or_default(), role));
    labels
}

fn downward_env_var(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: None,
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: field_path.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
    }
}

fn host_work_dir(instance: &Instance, _cfg: &OperatorConfig) -> anyhow::Result<String> {
    Ok(format!(
        "{}/{}/{}",
        instance.spec.host_path_prefix,
        instance_namespace(instance)?,
        instance_name(instance)?
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::InstanceSpec;
    use k8s_openapi::api::core::v1::{Container, PodSpec as K8sPodSpec, PodTemplateSpec};
    use kube::api::ObjectMeta as KubeObjectMeta;

    fn sample_instance() -> Instance {
        let mut instance = Instance::new(
            "demo",
            InstanceSpec {
                workload_name: "demo".to_string(),
                template: PodTemplateSpec {
                    spec: Some(K8sPodSpec {
                        containers: vec![Container {
                            name: "app".to_string(),
                            image: Some("busybox:stable".to_string()),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        instance.metadata = KubeObjectMeta {
            name: Some("demo".to_string()),
            namespace: Some("default".to_string()),
            uid: Some("abc-123".to_string()),
            ..Default::default()
        };
        instance
    }

    #[test]
    fn renders_twice_identically() {
        let instance = sample_instance();
        let cfg = OperatorConfig::from_env();
        let a = provider_pod(&instance, &cfg).unwrap();
        let b = provider_pod(&instance, &cfg).unwrap();
        assert_eq!(
            serde_json::to_value(&a).unwrap(),
            serde_json::to_value(&b).unwrap()
        );
    }

    #[test]
    fn provider_pod_name_is_derived() {
        let instance = sample_instance();
        let cfg = OperatorConfig::from_env();
        let pod = provider_pod(&instance, &cfg).unwrap();
        assert_eq!(pod.metadata.name.as_deref(), Some("demo-provider"));
    }
}
