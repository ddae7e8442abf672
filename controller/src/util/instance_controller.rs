//! Drives a single Instance to its desired running/stopped state (§4.2),
//! using `kube::runtime::controller::Controller` plus
//! `kube::runtime::finalizer::finalizer` — the modern idiom, not the
//! teacher's older hand-rolled watch+mutex loop.

use crate::util::controller_ctx::ControllerContext;
use crate::util::{ControllerError, Result};
use chrono::Utc;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::{
    controller::{Action, Controller},
    finalizer::{finalizer, Event},
    watcher::Config,
};
use kube::{Api, ResourceExt};
use log::{error, info, trace, warn};
use std::sync::Arc;
use std::time::Duration;
use stoppable_shared::api::{Condition, ConditionStatus, Instance, InstancePhase, InstanceStatus};
use stoppable_shared::k8s::pod as pod_status;
use stoppable_shared::k8s::ResourceStore;
use stoppable_shared::podbuilder;
use stoppable_shared::system::metrics::{INSTANCE_PHASE, RECONCILE_TOTAL};
use stoppable_shared::system::{label_instance, label_managed_by, MANAGED_BY_VALUE, INSTANCE_FINALIZER};

pub async fn run(ctx: Arc<ControllerContext>) {
    let instances: Api<Instance> = Api::all(ctx.client.clone());
    let pods: Api<Pod> = Api::all(ctx.client.clone());

    if let Err(e) = instances.list(&Default::default()).await {
        error!("instance_controller::run - Instances are not queryable: {e:?}");
        std::process::exit(1);
    }

    let pod_watch_config = Config::default().labels(&format!("{}={}", label_managed_by(), MANAGED_BY_VALUE));
    Controller::new(instances, Config::default())
        .watches(pods, pod_watch_config, |pod| instance_ref_for_pod(pod.as_ref()))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;
}

fn error_policy(_instance: Arc<Instance>, error: &ControllerError, _ctx: Arc<ControllerContext>) -> Action {
    warn!("instance_controller::error_policy - reconcile failed: {error:?}");
    RECONCILE_TOTAL.with_label_values(&["instance", "error"]).inc();
    Action::requeue(Duration::from_secs(30))
}

async fn reconcile(instance: Arc<Instance>, ctx: Arc<ControllerContext>) -> Result<Action> {
    let namespace = instance.namespace().unwrap_or_default();
    trace!("instance_controller::reconcile - {}/{}", namespace, instance.name_any());
    let api: Api<Instance> = Api::namespaced(ctx.client.clone(), &namespace);
    let result = finalizer(&api, INSTANCE_FINALIZER, instance, |event| reconcile_inner(event, ctx.clone()))
        .await
        .map_err(|e| ControllerError::FinalizerError(Box::new(e)));
    if result.is_ok() {
        RECONCILE_TOTAL.with_label_values(&["instance", "ok"]).inc();
    }
    result
}

async fn reconcile_inner(event: Event<Instance>, ctx: Arc<ControllerContext>) -> Result<Action> {
    match event {
        Event::Apply(instance) => reconcile_apply(&instance, ctx).await,
        Event::Cleanup(instance) => reconcile_cleanup(&instance, ctx).await,
    }
}

async fn reconcile_cleanup(instance: &Instance, ctx: Arc<ControllerContext>) -> Result<Action> {
    let namespace = instance.namespace().unwrap_or_default();
    let name = instance.name_any();
    let pods = ctx.pods_in(&namespace);

    let consumer_name = InstancePhase::consumer_pod_name(&name);
    if pods.get(&consumer_name).await.is_ok() {
        info!("instance_controller::reconcile_cleanup - deleting consumer pod {consumer_name}");
        pods.delete(&consumer_name).await?;
        return Ok(Action::requeue(Duration::from_secs(2)));
    }

    let provider_name = InstancePhase::provider_pod_name(&name);
    if pods.get(&provider_name).await.is_ok() {
        info!("instance_controller::reconcile_cleanup - deleting provider pod {provider_name}");
        pods.delete(&provider_name).await?;
        return Ok(Action::requeue(Duration::from_secs(2)));
    }

    Ok(Action::await_change())
}

async fn reconcile_apply(instance: &Instance, ctx: Arc<ControllerContext>) -> Result<Action> {
    let namespace = instance.namespace().unwrap_or_default();
    let name = instance.name_any();
    let pods = ctx.pods_in(&namespace);
    let instances = ctx.store_in::<Instance>(&namespace);

    let provider_name = InstancePhase::provider_pod_name(&name);
    let consumer_name = InstancePhase::consumer_pod_name(&name);

    let provider_pod = pods.get(&provider_name).await.ok();
    let provider_pod = match provider_pod {
        None => {
            info!("instance_controller::reconcile_apply - creating provider pod {provider_name}");
            let pod = podbuilder::provider_pod(instance, &ctx.config)?;
            pods.apply(&provider_name, "stoppable-controller", &pod).await?;
            return requeue_with_phase(instance, &instances, InstancePhase::ProviderStarting, None).await;
        }
        Some(pod) => pod,
    };

    if !pod_status::is_ready(&provider_pod) {
        return requeue_with_phase(instance, &instances, InstancePhase::ProviderStarting, None).await;
    }

    let node_name = provider_pod.spec.as_ref().and_then(|s| s.node_name.clone());
    let host_path = format!(
        "{}/{}/{}/rootfs",
        instance.spec.host_path_prefix, namespace, name
    );

    if !instance.spec.running {
        if pods.get(&consumer_name).await.is_ok() {
            info!("instance_controller::reconcile_apply - stopping: deleting consumer pod {consumer_name}");
            pods.delete(&consumer_name).await?;
            return requeue_with_phase(instance, &instances, InstancePhase::Stopping, None).await;
        }
        return set_phase(instance, &instances, InstancePhase::Stopped, None, host_path, node_name, &provider_pod)
            .await
            .map(|_| Action::await_change());
    }

    let consumer_pod = pods.get(&consumer_name).await.ok();
    let consumer_pod = match consumer_pod {
        None => {
            let node_name = match &node_name {
                Some(n) if !n.is_empty() => n.clone(),
                _ => {
                    return requeue_with_phase(instance, &instances, InstancePhase::ProviderReady, None).await;
                }
            };
            info!("instance_controller::reconcile_apply - creating consumer pod {consumer_name} on {node_name}");
            let pod = podbuilder::consumer_pod(instance, &node_name, &ctx.config)?;
            pods.apply(&consumer_name, "stoppable-controller", &pod).await?;
            return requeue_with_phase(instance, &instances, InstancePhase::ConsumerStarting, None).await;
        }
        Some(pod) => pod,
    };

    if pod_status::is_failed(&consumer_pod) {
        let message = pod_status::failure_message(&consumer_pod);
        return set_phase(instance, &instances, InstancePhase::Failed, message, host_path, node_name, &provider_pod)
            .await
            .map(|_| Action::await_change());
    }

    if !pod_status::is_ready(&consumer_pod) {
        return requeue_with_phase(instance, &instances, InstancePhase::ConsumerStarting, None).await;
    }

    set_phase(instance, &instances, InstancePhase::Running, None, host_path, node_name, &provider_pod)
        .await
        .map(|_| Action::await_change())
}

async fn requeue_with_phase(
    instance: &Instance,
    store: &stoppable_shared::k8s::KubeStore<Instance>,
    phase: InstancePhase,
    message: Option<String>,
) -> Result<Action> {
    let host_path = None;
    set_phase_simple(instance, store, phase, message, host_path).await?;
    Ok(Action::requeue(Duration::from_secs(2)))
}

#[allow(clippy::too_many_arguments)]
async fn set_phase(
    instance: &Instance,
    store: &stoppable_shared::k8s::KubeStore<Instance>,
    phase: InstancePhase,
    message: Option<String>,
    host_path: String,
    node_name: Option<String>,
    provider_pod: &Pod,
) -> Result<()> {
    record_phase_transition(instance.status.as_ref().map(|s| s.phase), phase);
    let mut status = instance.status.clone().unwrap_or_default();
    status.phase = phase;
    status.message = message.clone();
    status.host_path = Some(host_path);
    status.node_name = node_name;
    status.provider_pod_name = provider_pod.metadata.name.clone();
    status.provider_pod_uid = provider_pod.metadata.uid.clone();
    let (cond_status, reason): (ConditionStatus, &str) = phase.into();
    status.conditions = vec![Condition::ready(cond_status, reason, message, Utc::now())];

    let mut patched = instance.clone();
    patched.status = Some(status);
    let name = instance.name_any();
    store.apply_status(&name, "stoppable-controller", &patched).await?;
    Ok(())
}

/// Keeps `instances_by_phase` (§23) in step with each status write: the
/// previous phase's count drops by one, the new phase's count rises by one.
fn record_phase_transition(old: Option<InstancePhase>, new: InstancePhase) {
    if old == Some(new) {
        return;
    }
    if let Some(old) = old {
        INSTANCE_PHASE.with_label_values(&[old.label()]).dec();
    }
    INSTANCE_PHASE.with_label_values(&[new.label()]).inc();
}

async fn set_phase_simple(
    instance: &Instance,
    store: &stoppable_shared::k8s::KubeStore<Instance>,
    phase: InstancePhase,
    message: Option<String>,
    host_path: Option<String>,
) -> Result<()> {
    record_phase_transition(instance.status.as_ref().map(|s| s.phase), phase);
    let mut status: InstanceStatus = instance.status.clone().unwrap_or_default();
    status.phase = phase;
    status.message = message.clone();
    if host_path.is_some() {
        status.host_path = host_path;
    }
    let (cond_status, reason): (ConditionStatus, &str) = phase.into();
    status.conditions = vec![Condition::ready(cond_status, reason, message, Utc::now())];

    let mut patched = instance.clone();
    patched.status = Some(status);
    let name = instance.name_any();
    store.apply_status(&name, "stoppable-controller", &patched).await?;
    Ok(())
}

/// Maps a pod event to the Instance it belongs to via the `instance` label
/// (§4.2's watch set).
pub fn instance_ref_for_pod(pod: &Pod) -> Option<ObjectRef<Instance>> {
    let namespace = pod.namespace()?;
    let instance_name = pod.labels().get(&label_instance())?.clone();
    Some(ObjectRef::new(&instance_name).within(&namespace))
}
