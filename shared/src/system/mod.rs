//! System-wide constants: API group/version, CRD names, labels, env vars,
//! and host path layout (§6.1, §6.4).

/// API group for the Workload/Instance CRDs.
pub const API_GROUP: &str = "stoppablecontainer.dev";
/// API version served for both CRDs.
pub const API_VERSION: &str = "v1alpha1";
/// Workload CRD plural name.
pub const API_WORKLOADS: &str = "workloads";
/// Instance CRD plural name.
pub const API_INSTANCES: &str = "instances";

/// Label namespace prefix for well-known labels (§6.4).
pub const LABEL_PREFIX: &str = "stoppablecontainer.dev";
/// `managed-by` label value stamped on every pod this system creates.
pub const MANAGED_BY_VALUE: &str = "stoppablecontainer";

/// Well-known label key: identifies the component that owns a pod.
pub fn label_managed_by() -> String {
    format!("{LABEL_PREFIX}/managed-by")
}
/// Well-known label key: the owning Instance's name.
pub fn label_instance() -> String {
    format!("{LABEL_PREFIX}/instance")
}
/// Well-known label key: `provider` or `consumer`.
pub fn label_role() -> String {
    format!("{LABEL_PREFIX}/role")
}

/// Environment variable planted on the rootfs container so MountAgent can
/// find it by scanning `/proc/<pid>/environ` (§4.4 Phase A, §6.4).
pub const ROOTFS_MARKER_VAR: &str = "STOPPABLECONTAINER_ROOTFS";

/// Finalizer added to Workload objects (§3, §4.3).
pub const WORKLOAD_FINALIZER: &str = "workloads.stoppablecontainer.dev/cleanup";
/// Finalizer added to Instance objects (§3, §4.2).
pub const INSTANCE_FINALIZER: &str = "instances.stoppablecontainer.dev/cleanup";

/// Default value of `Workload.spec.hostPathPrefix` (§3).
pub const DEFAULT_HOST_PATH_PREFIX: &str = "/var/lib/stoppablecontainer";

/// Container-runtime path prefix rewritten by MountAgent's Phase C rehost
/// step (§4.4).
pub const CONTAINERD_ROOT: &str = "/var/lib/containerd";

/// Well-known rendezvous file/dir names under `<prefix>/<ns>/<name>/` (§3, §6.2).
pub mod layout {
    pub const REQUEST_FILE: &str = "request.json";
    pub const READY_FILE: &str = "ready.json";
    pub const READY_SENTINEL: &str = "ready";
    pub const ROOTFS_DIR: &str = "rootfs";
    pub const RECIPE_MARKER: &str = ".recipe";
}

/// Fixed pod-internal paths and volume names PodBuilder wires up (§4.1).
pub mod podlayout {
    /// Where the rootfs container and driver see the per-instance host directory.
    pub const PROVIDER_INTERIOR_MOUNT: &str = "/var/run/stoppablecontainer";
    /// Where the driver container mounts the same host directory.
    pub const DRIVER_PROPAGATED_MOUNT: &str = "/propagated";
    /// Where the consumer container sees the overlay MountAgent created.
    pub const CONSUMER_ROOTFS_MOUNT: &str = "/var/run/stoppablecontainer/rootfs";

    pub const PAUSE_VOLUME_NAME: &str = "pause-vol";
    pub const PAUSE_BINARY_PATH: &str = "/pause-vol/pause";

    pub const WRAPPER_BIN_VOLUME_NAME: &str = "wrapper-bin";
    pub const WRAPPER_BIN_PATH: &str = "/wrapper-bin/consumer-wrapper";
    pub const BIN_OVERLAY_VOLUME_NAME: &str = "bin-overlay";
    pub const BIN_OVERLAY_PATH: &str = "/bin-overlay";

    pub const HOST_DIR_VOLUME_NAME: &str = "host-workdir";

    /// The only capability the consumer's workload container is granted.
    pub const CHROOT_CAPABILITY: &str = "SYS_CHROOT";
}

pub mod retry {
    use rand::random;
    use std::time::Duration;
    use tokio::time;

    /// Maximum amount of tries to update or delete an Instance/Pod before giving up.
    pub const MAX_UPDATE_TRIES: i8 = 5;

    /// Wait a random amount of time, up to 200ms, to stagger concurrent
    /// retries hitting the API server at the same moment.
    pub async fn random_delay() {
        let random_decimal: f32 = random::<f32>();
        let random_delay_0_to_200: u64 = (200_f32 * random_decimal) as u64;
        time::sleep(Duration::from_millis(random_delay_0_to_200)).await;
    }
}

pub mod metrics;
