//! The Consumer pod's entrypoint (§3, §21, Design Note 6): one binary,
//! four explicit verbs instead of a shell script stitched together from
//! `sh -c` fragments.

mod wrapper;

use std::path::{Path, PathBuf};
use std::time::Duration;
use stoppable_shared::system::podlayout::CONSUMER_ROOTFS_MOUNT;

/// Readiness marker this binary writes after its own setup finishes,
/// checked by `--ready` from outside the chroot (I4: ready means *this*
/// container's setup completed, not the provider's).
const READY_MARKER: &str = "/wrapper-bin/.ready";

const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const WAIT_MAX_ITERATIONS: u32 = 120;

fn main() {
    env_logger::try_init().ok();
    let args: Vec<String> = std::env::args().skip(1).collect();

    let result = match args.first().map(String::as_str) {
        Some("--wait") => cmd_wait(),
        Some("--ready") => cmd_ready(),
        Some("--init") => cmd_init(args.get(1)),
        Some("--entrypoint") => cmd_entrypoint(&args[1..]),
        _ => {
            eprintln!("usage: consumer-wrapper --wait | --ready | --init <dest> | --entrypoint <workdir> -- <command...>");
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        log::error!("consumer-wrapper - {e}");
        std::process::exit(1);
    }
}

/// `--wait`: block until the provider's `ready` sentinel appears. The host
/// work directory is mounted whole at `CONSUMER_ROOTFS_MOUNT`, so the
/// sentinel sits directly underneath it, as a sibling of the `rootfs/`
/// overlay MountAgent created.
fn cmd_wait() -> anyhow::Result<()> {
    wait_for_provider_ready()
}

/// Shared by `--wait` and `--entrypoint` (§3 step (a), §5's 120-iteration
/// poll): the consumer must not touch the overlay until the provider side
/// has finished mounting it, or the chroot target is still empty.
fn wait_for_provider_ready() -> anyhow::Result<()> {
    let sentinel = Path::new(CONSUMER_ROOTFS_MOUNT).join(stoppable_shared::system::layout::READY_SENTINEL);

    for _ in 0..WAIT_MAX_ITERATIONS {
        if sentinel.exists() {
            return Ok(());
        }
        std::thread::sleep(WAIT_POLL_INTERVAL);
    }
    anyhow::bail!("timed out after {WAIT_MAX_ITERATIONS}s waiting for {sentinel:?}")
}

/// `--ready`: the pod's own readinessProbe command.
fn cmd_ready() -> anyhow::Result<()> {
    if Path::new(READY_MARKER).exists() {
        Ok(())
    } else {
        anyhow::bail!("not ready: {READY_MARKER} absent")
    }
}

/// `--init <dest>`: the exec-wrapper-init container's copy step.
fn cmd_init(dest: Option<&String>) -> anyhow::Result<()> {
    let dest = dest.ok_or_else(|| anyhow::anyhow!("--init requires a destination directory"))?;
    let current_exe = std::env::current_exe()?;
    let target = PathBuf::from(dest).join("consumer-wrapper");
    std::fs::copy(&current_exe, &target)?;

    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(&target)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&target, perms)?;
    Ok(())
}

/// `--entrypoint <workdir> -- <command...>`: wait for the provider's mount,
/// install network config, project the service-account token, write a
/// readiness marker, then chroot+chdir+exec.
fn cmd_entrypoint(rest: &[String]) -> anyhow::Result<()> {
    let workdir = rest.first().ok_or_else(|| anyhow::anyhow!("--entrypoint requires a working directory"))?;
    let separator = rest.iter().position(|a| a == "--").ok_or_else(|| anyhow::anyhow!("--entrypoint requires a `--` before the command"))?;
    let command = &rest[separator + 1..];
    if command.is_empty() {
        anyhow::bail!("--entrypoint requires a non-empty command");
    }

    wait_for_provider_ready()?;

    let rootfs = Path::new(CONSUMER_ROOTFS_MOUNT).join(stoppable_shared::system::layout::ROOTFS_DIR);
    wrapper::install_network_config(&rootfs)?;
    wrapper::bind_service_account_token(&rootfs)?;

    std::fs::write(READY_MARKER, b"ready\n")?;

    wrapper::enter_rootfs(&rootfs, workdir)?;
    wrapper::exec_command(command)?;
    unreachable!("execvp only returns on error, which is propagated above");
}
