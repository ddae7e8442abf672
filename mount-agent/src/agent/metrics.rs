//! Same `/metrics` endpoint shape as the controller
//! (`stoppable_shared::system::metrics`), with gauges specific to the
//! agent's own poll loop (§23).

use lazy_static::lazy_static;
use log::trace;
use prometheus::{Encoder, Gauge, IntCounterVec, Opts, Registry, TextEncoder};
use std::convert::Infallible;
use warp::Filter;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref REQUESTS_PROCESSED: IntCounterVec = IntCounterVec::new(
        Opts::new("mount_agent_requests_processed_total", "Mount requests processed, by outcome"),
        &["outcome"]
    )
    .expect("metric can be created");

    pub static ref LAST_POLL_DURATION: Gauge = Gauge::new(
        "mount_agent_last_poll_duration_seconds",
        "Wall-clock duration of the most recent poll iteration"
    )
    .expect("metric can be created");
}

fn register_custom_metrics() {
    REGISTRY.register(Box::new(REQUESTS_PROCESSED.clone())).expect("collector can be registered");
    REGISTRY.register(Box::new(LAST_POLL_DURATION.clone())).expect("collector can be registered");
}

pub async fn run_metrics_server() {
    register_custom_metrics();

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);
    let port: u16 = std::env::var("METRICS_PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(8080);

    trace!("run_metrics_server - serving on port {}", port);
    warp::serve(metrics_route).run(([0, 0, 0, 0], port)).await;
}

async fn metrics_handler() -> Result<impl warp::Reply, Infallible> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        log::error!("metrics_handler - could not encode custom metrics: {}", e);
    }
    Ok(String::from_utf8(buffer).unwrap_or_default())
}
