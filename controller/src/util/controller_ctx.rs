//! Per-process context threaded into both reconcilers (Design Note 1): one
//! real `kube::Client` plus the operator's [`OperatorConfig`], built once
//! at startup. Reconcilers never read the environment themselves.
//!
//! Watching is cluster-wide (`Api::all`, as the orchestrator's own watch
//! cache has no namespace restriction here); individual object reads/writes
//! are namespace-scoped, since namespaced resources require a namespace for
//! get/patch/delete. `ControllerContext` builds a [`stoppable_shared::k8s::
//! KubeStore`] on demand for the namespace a given event names, keeping
//! reconcile functions themselves dependent only on the `ResourceStore`
//! trait (Design Note 2) so unit tests pass a mock instead.

use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use stoppable_shared::config::OperatorConfig;
use stoppable_shared::k8s::KubeStore;

pub struct ControllerContext {
    pub client: Client,
    pub config: OperatorConfig,
}

impl ControllerContext {
    pub fn new(client: Client, config: OperatorConfig) -> Self {
        ControllerContext { client, config }
    }

    pub fn store_in<T>(&self, namespace: &str) -> KubeStore<T>
    where
        T: Clone + Debug + DeserializeOwned + Serialize + Resource<DynamicType = ()> + Send + Sync + 'static,
    {
        KubeStore::new(Api::namespaced(self.client.clone(), namespace))
    }

    pub fn pods_in(&self, namespace: &str) -> KubeStore<Pod> {
        KubeStore::new(Api::namespaced(self.client.clone(), namespace))
    }
}
