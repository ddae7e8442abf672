pub(crate) mod controller_ctx;
pub mod instance_controller;
pub mod workload_controller;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    KubeError(#[from] kube::Error),

    #[error("Finalizer Error: {0}")]
    // awkward type because finalizer::Error embeds the reconciler error (which is this),
    // so boxing this error to break the cycle
    FinalizerError(#[source] Box<kube::runtime::finalizer::Error<ControllerError>>),

    #[error("Watcher Error: {0}")]
    WatcherError(#[from] kube::runtime::watcher::Error),

    #[error(transparent)]
    Store(#[from] stoppable_shared::k8s::StoreError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T, E = ControllerError> = std::result::Result<T, E>;
