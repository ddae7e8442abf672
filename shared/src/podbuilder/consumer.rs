use super::{instance_name, instance_namespace, labels_for, merge_capabilities, owner_reference, Role};
use crate::api::Instance;
use crate::config::OperatorConfig;
use crate::system::podlayout::{
    BIN_OVERLAY_PATH, BIN_OVERLAY_VOLUME_NAME, CHROOT_CAPABILITY, CONSUMER_ROOTFS_MOUNT,
    HOST_DIR_VOLUME_NAME, WRAPPER_BIN_PATH, WRAPPER_BIN_VOLUME_NAME,
};
use k8s_openapi::api::core::v1::{
    Container, ExecAction, HostPathVolumeSource, Pod, PodSpec, Probe, SecurityContext, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Renders the Consumer pod: an *exec-wrapper-init* init container and a
/// single *workload* container whose entrypoint is the trusted wrapper
/// binary, pinned to the node the Provider already landed on (§4.1, I3).
pub fn consumer_pod(instance: &Instance, node_name: &str, cfg: &OperatorConfig) -> anyhow::Result<Pod> {
    let name = super::InstancePhase::consumer_pod_name(&instance_name(instance)?);
    let namespace = instance_namespace(instance)?;
    let host_dir = format!(
        "{}/{}/{}",
        instance.spec.host_path_prefix,
        namespace,
        instance_name(instance)?
    );

    let template_spec = instance
        .spec
        .template
        .spec
        .clone()
        .ok_or_else(|| anyhow::anyhow!("Instance template has no pod spec"))?;
    let user_container = template_spec
        .containers
        .first()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("Instance template has no containers"))?;

    let working_dir = user_container.working_dir.clone().unwrap_or_else(|| "/".to_string());
    let mut user_command: Vec<String> = user_container.command.clone().unwrap_or_default();
    user_command.extend(user_container.args.clone().unwrap_or_default());

    let mut command = vec![
        WRAPPER_BIN_PATH.to_string(),
        "--entrypoint".to_string(),
        working_dir,
        "--".to_string(),
    ];
    command.extend(user_command);

    let user_security_context = user_container.security_context.clone().unwrap_or_default();
    let merged_caps = merge_capabilities(
        &user_security_context.capabilities.clone().unwrap_or_default(),
        &[CHROOT_CAPABILITY],
    );

    let mut volume_mounts = vec![
        VolumeMount {
            name: HOST_DIR_VOLUME_NAME.to_string(),
            mount_path: CONSUMER_ROOTFS_MOUNT.to_string(),
            mount_propagation: Some("HostToContainer".to_string()),
            ..Default::default()
        },
        VolumeMount {
            name: WRAPPER_BIN_VOLUME_NAME.to_string(),
            mount_path: "/wrapper-bin".to_string(),
            ..Default::default()
        },
        VolumeMount {
            name: BIN_OVERLAY_VOLUME_NAME.to_string(),
            mount_path: BIN_OVERLAY_PATH.to_string(),
            ..Default::default()
        },
    ];
    // Every user volume is mounted twice: at its original path, and again
    // underneath the rootfs mount so it is visible at the user's requested
    // path after chroot (§4.1, §9's resolved open question).
    for mount in user_container.volume_mounts.clone().unwrap_or_default() {
        let rehosted_path = format!("{CONSUMER_ROOTFS_MOUNT}{}", mount.mount_path);
        volume_mounts.push(mount.clone());
        volume_mounts.push(VolumeMount {
            mount_path: rehosted_path,
            ..mount
        });
    }

    let workload_container = Container {
        name: "workload".to_string(),
        image: Some(cfg.wrapper_image.clone()),
        image_pull_policy: Some(cfg.wrapper_image_pull_policy.clone()),
        command: Some(command),
        env: user_container.env.clone(),
        volume_mounts: Some(volume_mounts),
        readiness_probe: Some(Probe {
            exec: Some(ExecAction {
                command: Some(vec![WRAPPER_BIN_PATH.to_string(), "--ready".to_string()]),
            }),
            period_seconds: Some(2),
            ..Default::default()
        }),
        security_context: Some(SecurityContext {
            privileged: Some(false),
            capabilities: Some(merged_caps),
            ..user_security_context
        }),
        ..Default::default()
    };

    let init_container = Container {
        name: "exec-wrapper-init".to_string(),
        image: Some(cfg.wrapper_image.clone()),
        command: Some(vec![
            WRAPPER_BIN_PATH.to_string(),
            "--init".to_string(),
            "/wrapper-bin".to_string(),
        ]),
        volume_mounts: Some(vec![
            VolumeMount {
                name: WRAPPER_BIN_VOLUME_NAME.to_string(),
                mount_path: "/wrapper-bin".to_string(),
                ..Default::default()
            },
            VolumeMount {
                name: BIN_OVERLAY_VOLUME_NAME.to_string(),
                mount_path: BIN_OVERLAY_PATH.to_string(),
                ..Default::default()
            },
        ]),
        ..Default::default()
    };

    let mut volumes = template_spec.volumes.clone().unwrap_or_default();
    volumes.push(Volume {
        name: HOST_DIR_VOLUME_NAME.to_string(),
        host_path: Some(HostPathVolumeSource {
            path: host_dir,
            type_: Some("DirectoryOrCreate".to_string()),
        }),
        ..Default::default()
    });
    volumes.push(Volume {
        name: WRAPPER_BIN_VOLUME_NAME.to_string(),
        empty_dir: Some(Default::default()),
        ..Default::default()
    });
    volumes.push(Volume {
        name: BIN_OVERLAY_VOLUME_NAME.to_string(),
        empty_dir: Some(Default::default()),
        ..Default::default()
    });

    let pod_spec = PodSpec {
        containers: vec![workload_container],
        init_containers: Some(vec![init_container]),
        volumes: Some(volumes),
        node_name: Some(node_name.to_string()),
        restart_policy: Some("Always".to_string()),
        ..Default::default()
    };

    Ok(Pod {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(namespace),
            labels: Some(merge_template_labels(instance, Role::Consumer)),
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
                            command: Some(vec!["/bin/sh".to_string()]),
                            args: Some(vec!["-c".to_string(), "echo hi".to_string()]),
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
    fn pins_node_name_to_provider_node() {
        let instance = sample_instance();
        let cfg = OperatorConfig::from_env();
        let pod = consumer_pod(&instance, "node-a", &cfg).unwrap();
        assert_eq!(pod.spec.unwrap().node_name.as_deref(), Some("node-a"));
    }

    #[test]
    fn consumer_pod_name_matches_instance_name() {
        let instance = sample_instance();
        let cfg = OperatorConfig::from_env();
        let pod = consumer_pod(&instance, "node-a", &cfg).unwrap();
        assert_eq!(pod.metadata.name.as_deref(), Some("demo"));
    }

    #[test]
    fn only_chroot_capability_is_added() {
        let instance = sample_instance();
        let cfg = OperatorConfig::from_env();
        let pod = consumer_pod(&instance, "node-a", &cfg).unwrap();
        let spec = pod.spec.unwrap();
        let caps = spec.containers[0]
            .security_context
            .as_ref()
            .unwrap()
            .capabilities
            .as_ref()
            .unwrap();
        assert_eq!(caps.add.as_deref(), Some(&["SYS_CHROOT".to_string()][..]));
        assert_eq!(caps.drop, None);
    }
}
