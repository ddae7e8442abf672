mod util;

use std::sync::Arc;
use stoppable_shared::config::OperatorConfig;
use stoppable_shared::system::metrics::run_metrics_server;
use stoppable_shared::system::API_GROUP;
use util::controller_ctx::ControllerContext;
use util::{instance_controller, workload_controller};

/// Entry point for the controller process: two reconcilers (Workload,
/// Instance) plus a Prometheus metrics server, run to completion together.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    env_logger::try_init()?;
    log::info!("{API_GROUP} controller starting");

    let client = kube::Client::try_default().await?;
    let config = OperatorConfig::from_env();
    let ctx = Arc::new(ControllerContext::new(client, config));

    let mut tasks = Vec::new();

    tasks.push(tokio::spawn(async move {
        run_metrics_server().await;
        Ok::<(), Box<dyn std::error::Error + Send + Sync + 'static>>(())
    }));

    tasks.push(tokio::spawn({
        let ctx = ctx.clone();
        async move {
            workload_controller::run(ctx).await;
            Ok(())
        }
    }));

    tasks.push(tokio::spawn({
        let ctx = ctx.clone();
        async move {
            instance_controller::run(ctx).await;
            Ok(())
        }
    }));

    futures::future::try_join_all(tasks).await?;

    log::info!("{API_GROUP} controller stopped");
    Ok(())
}
