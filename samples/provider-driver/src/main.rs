//! The Provider pod's *driver* container (§3, §4.1, §5): submits a mount
//! request to the node's MountAgent over the file rendezvous protocol, waits
//! for the result, and exposes readiness only through the `ready` sentinel
//! file its own pod's `readinessProbe` checks.

use std::env;
use std::path::Path;
use std::time::Duration;
use stoppable_shared::rendezvous::{FileRendezvous, MountOutcome, MountRequest, Rendezvous};
use stoppable_shared::system::podlayout::DRIVER_PROPAGATED_MOUNT;

const MAX_RETRIES: u32 = 3;
const POLL_INTERVAL: Duration = Duration::from_secs(1);
const POLLS_PER_ATTEMPT: u32 = 30;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::try_init().ok();

    let req = match request_from_env() {
        Ok(req) => req,
        Err(e) => {
            log::error!("provider-driver - missing downward API env var: {e}");
            std::process::exit(1);
        }
    };

    let dir = Path::new(DRIVER_PROPAGATED_MOUNT);
    let rendezvous = FileRendezvous;

    for attempt in 1..=MAX_RETRIES {
        log::info!("provider-driver - attempt {attempt}/{MAX_RETRIES}: submitting mount request");
        if let Err(e) = rendezvous.submit(dir, &req).await {
            log::error!("provider-driver - failed to write request.json: {e}");
            std::process::exit(1);
        }

        match wait_for_outcome(&rendezvous, dir).await {
            Some(MountOutcome::Ready) => {
                if let Err(e) = rendezvous.write_ready_sentinel(dir).await {
                    log::error!("provider-driver - failed to write ready sentinel: {e}");
                    std::process::exit(1);
                }
                log::info!("provider-driver - mount ready");
                return;
            }
            Some(MountOutcome::Error { message }) => {
                log::warn!("provider-driver - agent reported error: {message}");
                if let Err(e) = rendezvous.clear_error(dir).await {
                    log::error!("provider-driver - failed to clear ready.json before retry: {e}");
                }
            }
            None => {
                log::warn!("provider-driver - timed out waiting for ready.json");
            }
        }
    }

    log::error!("provider-driver - exhausted {MAX_RETRIES} retries, giving up");
    std::process::exit(1);
}

async fn wait_for_outcome(rendezvous: &FileRendezvous, dir: &Path) -> Option<MountOutcome> {
    for _ in 0..POLLS_PER_ATTEMPT {
        if let Ok(Some(outcome)) = rendezvous.poll_outcome(dir).await {
            return Some(outcome);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    None
}

fn request_from_env() -> Result<MountRequest, env::VarError> {
    Ok(MountRequest {
        pod_uid: env::var("POD_UID")?,
        namespace: env::var("POD_NAMESPACE")?,
        name: env::var("POD_NAME")?,
    })
}
