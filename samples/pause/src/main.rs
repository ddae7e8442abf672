//! The rootfs container's entrypoint (§4.1): the entire program is "block
//! until a termination signal arrives." MountAgent finds this process by
//! its cgroup and the `STOPPABLECONTAINER_ROOTFS=true` marker env var.

use tokio::signal::unix::{signal, SignalKind};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let mut term = signal(SignalKind::terminate()).expect("SIGTERM handler installs");
    let mut int = signal(SignalKind::interrupt()).expect("SIGINT handler installs");

    tokio::select! {
        _ = term.recv() => {}
        _ = int.recv() => {}
    }
}
