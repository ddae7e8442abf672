//! Explicit configuration structs built once at process startup from the
//! environment (Design Note 1): no process-global mutable state anywhere
//! downstream. `PodBuilder` and the agent's phase functions take these as
//! plain arguments instead of reading `std::env` themselves.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::system;

/// Threaded explicitly into `PodBuilder` and the controllers.
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    pub wrapper_image: String,
    pub wrapper_image_pull_policy: String,
    pub driver_image: String,
    pub pause_image_digest_ref: String,
    pub default_host_path_prefix: String,
    pub reconcile_requeue_interval: Duration,
}

impl OperatorConfig {
    /// Reads environment variables once; callers hold the result for the
    /// lifetime of the process.
    pub fn from_env() -> Self {
        OperatorConfig {
            wrapper_image: env::var("WRAPPER_IMAGE")
                .unwrap_or_else(|_| "ghcr.io/stoppablecontainer/consumer-wrapper:latest".to_string()),
            wrapper_image_pull_policy: env::var("WRAPPER_IMAGE_PULL_POLICY")
                .unwrap_or_else(|_| "IfNotPresent".to_string()),
            driver_image: env::var("DRIVER_IMAGE")
                .unwrap_or_else(|_| "ghcr.io/stoppablecontainer/provider-driver:latest".to_string()),
            pause_image_digest_ref: env::var("PAUSE_IMAGE_REF")
                .unwrap_or_else(|_| "ghcr.io/stoppablecontainer/pause:latest".to_string()),
            default_host_path_prefix: env::var("DEFAULT_HOST_PATH_PREFIX")
                .unwrap_or_else(|_| system::DEFAULT_HOST_PATH_PREFIX.to_string()),
            reconcile_requeue_interval: Duration::from_secs(
                env::var("RECONCILE_REQUEUE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            ),
        }
    }
}

/// Threaded explicitly into the MountAgent's main loop and phase functions.
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Where the host root is bind-mounted inside the agent container, e.g. `/host`.
    pub host_prefix: PathBuf,
    /// Container-runtime path prefix rehosted by Phase C, e.g. `/var/lib/containerd`.
    pub containerd_root: PathBuf,
    /// Where per-instance work directories live, e.g. `/var/lib/stoppablecontainer`.
    pub work_root: PathBuf,
    pub poll_interval: Duration,
    pub rootfs_marker_var: String,
}

impl AgentConfig {
    pub fn from_env() -> Self {
        AgentConfig {
            host_prefix: env::var("HOST_PREFIX").unwrap_or_else(|_| "/host".to_string()).into(),
            containerd_root: env::var("CONTAINERD_ROOT")
                .unwrap_or_else(|_| system::CONTAINERD_ROOT.to_string())
                .into(),
            work_root: env::var("WORK_ROOT")
                .unwrap_or_else(|_| system::DEFAULT_HOST_PATH_PREFIX.to_string())
                .into(),
            poll_interval: Duration::from_secs(
                env::var("POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            ),
            rootfs_marker_var: system::ROOTFS_MARKER_VAR.to_string(),
        }
    }
}
