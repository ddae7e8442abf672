//! The node-local daemon from §4.4: a polling loop grounded on
//! `slot_reconciliation`'s `loop { ...; sleep(...) }` shape, adapted to scan
//! a work-directory tree instead of querying the Kubernetes API.

pub mod error;
pub mod metrics;
pub mod phases;
pub mod scan;

use error::AgentError;
use log::{error, trace, warn};
use std::path::Path;
use std::time::Instant;
use stoppable_shared::config::AgentConfig;
use stoppable_shared::rendezvous::{FileRendezvous, MountOutcome, MountRequest, Rendezvous};

pub async fn run(cfg: AgentConfig) {
    let rendezvous = FileRendezvous;

    loop {
        trace!("run - poll iteration start");
        let start = Instant::now();

        for dir in scan::scan_requests(&cfg).await {
            match rendezvous.read_request(&dir).await {
                Ok(Some(req)) => process(&dir, &req, &cfg, &rendezvous).await,
                Ok(None) => {}
                Err(e) => warn!("run - failed to read request.json in {dir:?}: {e:?}"),
            }
        }

        metrics::LAST_POLL_DURATION.set(start.elapsed().as_secs_f64());
        trace!("run - poll iteration end");
        tokio::time::sleep(cfg.poll_interval).await;
    }
}

/// `process(D, req)` is transactional from the outside (§4.4): it either
/// completes and emits `ready.json` with `status=ready`, or it emits
/// `status=error` and leaves `request.json` in place for a future retry.
async fn process(dir: &Path, req: &MountRequest, cfg: &AgentConfig, rendezvous: &impl Rendezvous) {
    match process_inner(dir, req, cfg).await {
        Ok(()) => {
            if let Err(e) = rendezvous.clear_request(dir).await {
                error!("process - failed to remove request.json in {dir:?}: {e:?}");
            }
            if let Err(e) = rendezvous.write_outcome(dir, &MountOutcome::Ready).await {
                error!("process - failed to write ready.json in {dir:?}: {e:?}");
            }
            metrics::REQUESTS_PROCESSED.with_label_values(&["ready"]).inc();
        }
        Err(e) => {
            warn!("process - {dir:?} failed: {e}");
            let outcome = MountOutcome::Error { message: e.to_string() };
            if let Err(e) = rendezvous.write_outcome(dir, &outcome).await {
                error!("process - failed to write error outcome in {dir:?}: {e:?}");
            }
            metrics::REQUESTS_PROCESSED.with_label_values(&["error"]).inc();
        }
    }
}

async fn process_inner(dir: &Path, req: &MountRequest, cfg: &AgentConfig) -> Result<(), AgentError> {
    let pid = phases::find_rootfs_pid(req, cfg)?;
    let recipe = phases::extract_overlay_recipe(pid)?;
    let recipe = phases::rehost_paths(recipe, cfg);
    phases::do_mount(dir, &recipe)?;

    let pseudo_fs_errors = phases::install_pseudo_filesystems(dir);
    if let Some(message) = phases::commit(&pseudo_fs_errors) {
        warn!("process_inner - {dir:?}: pseudo-filesystem setup incomplete: {message}");
    }

    Ok(())
}
