//! Prometheus `/metrics` endpoint shared by the controller and MountAgent
//! processes.

use lazy_static::lazy_static;
use log::trace;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use std::convert::Infallible;
use warp::Filter;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    /// Count of reconcile attempts, labeled by controller and outcome.
    pub static ref RECONCILE_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("reconcile_total", "Number of reconcile attempts"),
        &["controller", "result"]
    )
    .expect("metric can be created");

    /// Instances currently in each phase, labeled by phase name.
    pub static ref INSTANCE_PHASE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("instances_by_phase", "Instances currently in a given phase"),
        &["phase"]
    )
    .expect("metric can be created");
}

fn register_custom_metrics() {
    REGISTRY
        .register(Box::new(RECONCILE_TOTAL.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(INSTANCE_PHASE.clone()))
        .expect("collector can be registered");
}

/// Serves `/metrics` on `METRICS_PORT` (default 8080) until the process exits.
pub async fn run_metrics_server() {
    register_custom_metrics();

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);
    let port: u16 = std::env::var("METRICS_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    trace!("run_metrics_server - serving on port {}", port);
    warp::serve(metrics_route).run(([0, 0, 0, 0], port)).await;
}

async fn metrics_handler() -> Result<impl warp::Reply, Infallible> {
    let encoder = TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        log::error!("metrics_handler - could not encode custom metrics: {}", e);
    };
    let mut res = match String::from_utf8(buffer.clone()) {
        Ok(v) => v,
        Err(e) => {
            log::error!("metrics_handler - custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    };
    buffer.clear();

    let mut buffer = Vec::new();
    let default_metric_families = prometheus::gather();
    if let Err(e) = encoder.encode(&default_metric_families, &mut buffer) {
        log::error!("metrics_handler - could not encode prometheus metrics: {}", e);
    };
    let res_custom = match String::from_utf8(buffer.clone()) {
        Ok(v) => v,
        Err(e) => {
            log::error!("metrics_handler - prometheus metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    };
    buffer.clear();

    res.push_str(&res_custom);
    Ok(res)
}
