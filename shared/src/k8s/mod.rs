//! A narrow, mockable facade over the parts of the Kubernetes API this
//! system touches: get/list/apply/delete plus finalizer add/remove.
//!
//! Controllers depend on the [`ResourceStore`] trait rather than
//! `kube::Api<T>` directly so reconcile logic can be exercised against an
//! in-memory fake in tests instead of a real API server.

use async_trait::async_trait;
use kube::api::{Patch, PatchParams};
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

pub mod pod;

/// Errors surfaced by a [`ResourceStore`] implementation.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("kube api error: {0}")]
    Kube(#[from] kube::Error),
    #[error("object {0} missing required field: {1}")]
    MissingField(String, &'static str),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Operations performed against a single Kubernetes resource kind.
///
/// Mirrors `kube::Api<T>` closely enough that the production implementation
/// is a thin pass-through, while staying narrow enough to fake in tests.
#[async_trait]
#[mockall::automock]
pub trait ResourceStore<T>: Send + Sync
where
    T: Clone + Debug + Send + Sync + 'static,
{
    async fn get(&self, name: &str) -> Result<T>;
    async fn list_all(&self) -> Result<Vec<T>>;
    async fn apply(&self, name: &str, manager: &str, object: &T) -> Result<T>;
    /// Writes `object`'s `status` field through the status subresource.
    /// Required for any CRD declaring `#[kube(status = "...")]`: the API
    /// server silently drops `.status` from a main-resource patch, so
    /// status updates must go through this instead of [`Self::apply`].
    async fn apply_status(&self, name: &str, manager: &str, object: &T) -> Result<T>;
    async fn delete(&self, name: &str) -> Result<()>;
    async fn add_finalizer(&self, name: &str, finalizer: &str) -> Result<()>;
    async fn remove_finalizer(&self, name: &str, finalizer: &str) -> Result<()>;
}

/// Production [`ResourceStore`] backed by a real `kube::Api<T>`.
pub struct KubeStore<T> {
    api: Api<T>,
}

impl<T> KubeStore<T> {
    pub fn new(api: Api<T>) -> Self {
        KubeStore { api }
    }
}

#[async_trait]
impl<T> ResourceStore<T> for KubeStore<T>
where
    T: Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Resource<DynamicType = ()>
        + ResourceExt
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, name: &str) -> Result<T> {
        Ok(self.api.get(name).await?)
    }

    async fn list_all(&self) -> Result<Vec<T>> {
        let list = self.api.list(&Default::default()).await?;
        Ok(list.items)
    }

    async fn apply(&self, name: &str, manager: &str, object: &T) -> Result<T> {
        let patch = Patch::Apply(object);
        let params = PatchParams::apply(manager).force();
        Ok(self.api.patch(name, &params, &patch).await?)
    }

    async fn apply_status(&self, name: &str, manager: &str, object: &T) -> Result<T> {
        let patch = Patch::Apply(object);
        let params = PatchParams::apply(manager).force();
        Ok(self.api.patch_status(name, &params, &patch).await?)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        match self.api.delete(name, &Default::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn add_finalizer(&self, name: &str, finalizer: &str) -> Result<()> {
        self.retry_finalizer_patch(name, |finalizers| {
            if finalizers.iter().any(|f| f == finalizer) {
                false
            } else {
                finalizers.push(finalizer.to_string());
                true
            }
        })
        .await
    }

    async fn remove_finalizer(&self, name: &str, finalizer: &str) -> Result<()> {
        self.retry_finalizer_patch(name, |finalizers| {
            let before = finalizers.len();
            finalizers.retain(|f| f != finalizer);
            finalizers.len() != before
        })
        .await
    }
}

impl<T> KubeStore<T>
where
    T: Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Resource<DynamicType = ()>
        + ResourceExt
        + Send
        + Sync
        + 'static,
{
    /// Read-modify-write on `metadata.finalizers`, retried on a conflicting
    /// `resourceVersion` (another reconcile racing the same object) up to
    /// [`crate::system::retry::MAX_UPDATE_TRIES`] times, with a randomized
    /// backoff between attempts so competing retries don't collide again.
    async fn retry_finalizer_patch(&self, name: &str, mutate: impl Fn(&mut Vec<String>) -> bool) -> Result<()> {
        for attempt in 1..=crate::system::retry::MAX_UPDATE_TRIES {
            let mut obj = self.api.get(name).await?;
            let finalizers = obj.finalizers_mut();
            if !mutate(finalizers) {
                return Ok(());
            }
            let patch = serde_json::json!({
                "metadata": { "finalizers": finalizers, "resourceVersion": obj.resource_version() }
            });
            match self
                .api
                .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
                .await
            {
                Ok(_) => return Ok(()),
                Err(kube::Error::Api(e)) if e.code == 409 && attempt < crate::system::retry::MAX_UPDATE_TRIES => {
                    crate::system::retry::random_delay().await;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
