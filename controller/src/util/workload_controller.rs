//! Projects the user-facing Workload onto exactly one child Instance (§4.3).

use crate::util::controller_ctx::ControllerContext;
use crate::util::{ControllerError, Result};
use chrono::Utc;
use futures::StreamExt;
use kube::runtime::{
    controller::{Action, Controller},
    finalizer::{finalizer, Event},
    watcher::Config,
};
use kube::{Api, ResourceExt};
use log::{error, info, trace, warn};
use std::sync::Arc;
use std::time::Duration;
use stoppable_shared::api::{Condition, ConditionStatus, Instance, InstanceSpec, Workload, WorkloadPhase};
use stoppable_shared::k8s::ResourceStore;
use stoppable_shared::system::metrics::RECONCILE_TOTAL;
use stoppable_shared::system::WORKLOAD_FINALIZER;

pub async fn run(ctx: Arc<ControllerContext>) {
    let workloads: Api<Workload> = Api::all(ctx.client.clone());

    if let Err(e) = workloads.list(&Default::default()).await {
        error!("workload_controller::run - Workloads are not queryable: {e:?}");
        std::process::exit(1);
    }

    Controller::new(workloads, Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;
}

fn error_policy(_workload: Arc<Workload>, error: &ControllerError, _ctx: Arc<ControllerContext>) -> Action {
    warn!("workload_controller::error_policy - reconcile failed: {error:?}");
    RECONCILE_TOTAL.with_label_values(&["workload", "error"]).inc();
    Action::requeue(Duration::from_secs(30))
}

async fn reconcile(workload: Arc<Workload>, ctx: Arc<ControllerContext>) -> Result<Action> {
    let namespace = workload.namespace().unwrap_or_default();
    trace!("workload_controller::reconcile - {}/{}", namespace, workload.name_any());
    let api: Api<Workload> = Api::namespaced(ctx.client.clone(), &namespace);
    let result = finalizer(&api, WORKLOAD_FINALIZER, workload, |event| reconcile_inner(event, ctx.clone()))
        .await
        .map_err(|e| ControllerError::FinalizerError(Box::new(e)));
    if result.is_ok() {
        RECONCILE_TOTAL.with_label_values(&["workload", "ok"]).inc();
    }
    result
}

async fn reconcile_inner(event: Event<Workload>, ctx: Arc<ControllerContext>) -> Result<Action> {
    match event {
        Event::Apply(workload) => reconcile_apply(&workload, ctx).await,
        Event::Cleanup(workload) => reconcile_cleanup(&workload, ctx).await,
    }
}

async fn reconcile_cleanup(workload: &Workload, ctx: Arc<ControllerContext>) -> Result<Action> {
    let namespace = workload.namespace().unwrap_or_default();
    let name = workload.name_any();
    let instances = ctx.store_in::<Instance>(&namespace);

    if instances.get(&name).await.is_ok() {
        info!("workload_controller::reconcile_cleanup - deleting instance {name}");
        instances.delete(&name).await?;
        return Ok(Action::requeue(Duration::from_secs(2)));
    }
    Ok(Action::await_change())
}

async fn reconcile_apply(workload: &Workload, ctx: Arc<ControllerContext>) -> Result<Action> {
    let namespace = workload.namespace().unwrap_or_default();
    let name = workload.name_any();
    let instances = ctx.store_in::<Instance>(&namespace);
    let workloads = ctx.store_in::<Workload>(&namespace);

    let instance = instances.get(&name).await.ok();

    if workload.spec.running {
        let instance = match instance {
            None => {
                info!("workload_controller::reconcile_apply - creating instance {name}");
                let new_instance = ensure_instance(workload, &name);
                instances.apply(&name, "stoppable-controller", &new_instance).await?;
                return project_and_requeue(workload, &workloads, None).await;
            }
            Some(instance) if !instance.spec.running => {
                info!("workload_controller::reconcile_apply - flipping instance {name} to running");
                let mut updated = instance.clone();
                updated.spec.running = true;
                instances.apply(&name, "stoppable-controller", &updated).await?;
                return project_and_requeue(workload, &workloads, Some(&updated)).await;
            }
            Some(instance) => instance,
        };
        project_status(workload, &workloads, Some(&instance))
            .await
            .map(|_| Action::await_change())
    } else {
        match instance {
            Some(instance) if instance.spec.running => {
                info!("workload_controller::reconcile_apply - flipping instance {name} to stopped");
                let mut updated = instance.clone();
                updated.spec.running = false;
                instances.apply(&name, "stoppable-controller", &updated).await?;
                project_status(workload, &workloads, Some(&updated))
                    .await
                    .map(|_| Action::await_change())
            }
            Some(instance) => project_status(workload, &workloads, Some(&instance))
                .await
                .map(|_| Action::await_change()),
            None => {
                set_workload_phase(workload, &workloads, WorkloadPhase::Stopped, None, None, None)
                    .await?;
                Ok(Action::await_change())
            }
        }
    }
}

fn ensure_instance(workload: &Workload, name: &str) -> Instance {
    Instance::new(
        name,
        InstanceSpec {
            workload_name: name.to_string(),
            running: true,
            template: workload.spec.template.clone(),
            provider: workload.spec.provider.clone(),
            host_path_prefix: workload.spec.host_path_prefix.clone(),
        },
    )
}

async fn project_and_requeue(
    workload: &Workload,
    store: &stoppable_shared::k8s::KubeStore<Workload>,
    instance: Option<&Instance>,
) -> Result<Action> {
    project_status(workload, store, instance).await?;
    Ok(Action::requeue(Duration::from_secs(2)))
}

/// §4.3's status projection table.
async fn project_status(
    workload: &Workload,
    store: &stoppable_shared::k8s::KubeStore<Workload>,
    instance: Option<&Instance>,
) -> Result<()> {
    let (phase, cond_status, reason, message) = match instance.and_then(|i| i.status.as_ref()) {
        None => (WorkloadPhase::Pending, ConditionStatus::Unknown, "Unknown", None),
        Some(status) => {
            use stoppable_shared::api::InstancePhase::*;
            let phase = WorkloadPhase::from(status.phase);
            let (cond_status, reason) = match status.phase {
                Pending | ProviderStarting => (ConditionStatus::False, "Pending"),
                ProviderReady | ConsumerStarting => (ConditionStatus::False, "ProviderReady"),
                Running => (ConditionStatus::True, "Running"),
                Stopping | Stopped => (ConditionStatus::False, "Stopped"),
                Failed => (ConditionStatus::False, "Failed"),
            };
            (phase, cond_status, reason, status.message.clone())
        }
    };
    set_workload_phase(
        workload,
        store,
        phase,
        instance.and_then(|i| i.metadata.name.clone()),
        instance.and_then(|i| i.status.as_ref()).and_then(|s| s.node_name.clone()),
        Some((cond_status, reason, message)),
    )
    .await
}

async fn set_workload_phase(
    workload: &Workload,
    store: &stoppable_shared::k8s::KubeStore<Workload>,
    phase: WorkloadPhase,
    instance_name: Option<String>,
    node_name: Option<String>,
    condition: Option<(ConditionStatus, &'static str, Option<String>)>,
) -> Result<()> {
    let mut status = workload.status.clone().unwrap_or_default();
    status.phase = phase;
    status.instance_name = instance_name;
    status.node_name = node_name;
    if let Some((cond_status, reason, message)) = condition {
        status.conditions = vec![Condition::ready(cond_status, reason, message, Utc::now())];
    }

    let mut patched = workload.clone();
    patched.status = Some(status);
    let name = workload.name_any();
    store.apply_status(&name, "stoppable-controller", &patched).await?;
    Ok(())
}
