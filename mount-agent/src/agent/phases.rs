//! The A-F phases of §4.4, each its own free function so each is independently
//! unit-testable against fixtures — the teacher's habit of decomposing a
//! reconcile step into small free functions (`determine_action_for_pod`,
//! `handle_addition_work`, ...) applied to a node-local daemon instead.

use super::error::AgentError;
use log::trace;
use nix::mount::{mount, MsFlags};
use std::collections::BTreeSet;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use stoppable_shared::config::AgentConfig;
use stoppable_shared::rendezvous::MountRequest;
use stoppable_shared::system::layout::{RECIPE_MARKER, ROOTFS_DIR};

/// The `lowerdir`/`upperdir`/`workdir` triple extracted from the rootfs
/// container's overlay mount (Phase B).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayRecipe {
    pub lowerdir: Vec<PathBuf>,
    pub upperdir: PathBuf,
    pub workdir: PathBuf,
}

impl OverlayRecipe {
    /// Renders the overlay mount's comma-separated option string.
    pub fn as_mount_data(&self) -> String {
        let lower = self
            .lowerdir
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":");
        format!("lowerdir={lower},upperdir={},workdir={}", self.upperdir.display(), self.workdir.display())
    }

    /// Stable fingerprint of this recipe, written to `D/rootfs/.recipe` and
    /// compared on a restart to tell a stale mount from a foreign one.
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.as_mount_data().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Phase A: the pid whose cgroup names this request's pod and whose
/// environment carries the rootfs marker. Lowest matching pid wins when more
/// than one matches (the pause binary, by construction — §4.1).
pub fn find_rootfs_pid(req: &MountRequest, cfg: &AgentConfig) -> Result<i32, AgentError> {
    let cgroup_needle = req.pod_uid.replace('-', "_");
    let marker_needle = format!("{}=true", cfg.rootfs_marker_var);

    let mut matches: BTreeSet<i32> = BTreeSet::new();
    for entry in fs::read_dir("/proc")?.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<i32>().ok()) else {
            continue;
        };

        let Ok(cgroup) = fs::read_to_string(entry.path().join("cgroup")) else {
            continue;
        };
        if !cgroup.contains(&cgroup_needle) {
            continue;
        }

        let Ok(environ) = fs::read(entry.path().join("environ")) else {
            continue;
        };
        if String::from_utf8_lossy(&environ).split('\0').any(|kv| kv == marker_needle) {
            matches.insert(pid);
        }
    }

    matches.into_iter().next().ok_or_else(|| AgentError::Protocol {
        message: "rootfs container not found".to_string(),
    })
}

/// Phase B: the overlay mount backing `/` inside the target process's mount
/// namespace, parsed from `/proc/<pid>/mounts`.
pub fn extract_overlay_recipe(pid: i32) -> Result<OverlayRecipe, AgentError> {
    let contents = fs::read_to_string(format!("/proc/{pid}/mounts"))?;

    for line in contents.lines() {
        let mut fields = line.split_whitespace();
        let source = fields.next().unwrap_or("");
        let target = fields.next().unwrap_or("");
        let fstype = fields.next().unwrap_or("");
        let opts = fields.next().unwrap_or("");
        if source == "overlay" && target == "/" && fstype == "overlay" {
            return parse_overlay_options(opts);
        }
    }

    Err(AgentError::Protocol {
        message: "no overlay mount found at / in target container".to_string(),
    })
}

fn parse_overlay_options(opts: &str) -> Result<OverlayRecipe, AgentError> {
    let mut lowerdir = None;
    let mut upperdir = None;
    let mut workdir = None;

    for opt in opts.split(',') {
        if let Some(v) = opt.strip_prefix("lowerdir=") {
            lowerdir = Some(v.split(':').map(PathBuf::from).collect());
        } else if let Some(v) = opt.strip_prefix("upperdir=") {
            upperdir = Some(PathBuf::from(v));
        } else if let Some(v) = opt.strip_prefix("workdir=") {
            workdir = Some(PathBuf::from(v));
        }
    }

    match (lowerdir, upperdir, workdir) {
        (Some(lowerdir), Some(upperdir), Some(workdir)) => Ok(OverlayRecipe { lowerdir, upperdir, workdir }),
        _ => Err(AgentError::Protocol {
            message: "overlay options missing lowerdir/upperdir/workdir".to_string(),
        }),
    }
}

/// Phase C: rewrite every container-runtime path so it resolves through the
/// agent's host-root bind mount. Paths outside the container-runtime prefix
/// are left untouched.
pub fn rehost_paths(recipe: OverlayRecipe, cfg: &AgentConfig) -> OverlayRecipe {
    let rehosted_root = cfg.host_prefix.join(cfg.containerd_root.strip_prefix("/").unwrap_or(&cfg.containerd_root));
    let rehost = |p: &Path| -> PathBuf {
        match p.strip_prefix(&cfg.containerd_root) {
            Ok(rest) => rehosted_root.join(rest),
            Err(_) => p.to_path_buf(),
        }
    };

    OverlayRecipe {
        lowerdir: recipe.lowerdir.iter().map(|p| rehost(p)).collect(),
        upperdir: rehost(&recipe.upperdir),
        workdir: rehost(&recipe.workdir),
    }
}

/// Phase D: create `D/rootfs` and mount the overlay there. An `EBUSY` is
/// tolerated only when `D/rootfs/.recipe` already names this exact recipe —
/// the idempotent-restart case resolved in DESIGN.md.
pub fn do_mount(dir: &Path, recipe: &OverlayRecipe) -> Result<(), AgentError> {
    let rootfs_dir = dir.join(ROOTFS_DIR);
    if !rootfs_dir.exists() {
        fs::create_dir(&rootfs_dir)?;
        set_mode(&rootfs_dir, 0o755)?;
    }

    let mount_data = recipe.as_mount_data();
    let result = mount(Some("overlay"), &rootfs_dir, Some("overlay"), MsFlags::empty(), Some(mount_data.as_str()));

    match result {
        Ok(()) => {
            fs::write(rootfs_dir.join(RECIPE_MARKER), recipe.fingerprint())?;
            Ok(())
        }
        Err(nix::errno::Errno::EBUSY) => {
            let marker = rootfs_dir.join(RECIPE_MARKER);
            if fs::read_to_string(&marker).ok().as_deref() == Some(recipe.fingerprint().as_str()) {
                trace!("do_mount - {rootfs_dir:?} already mounted with a matching recipe, treating as idempotent restart");
                Ok(())
            } else {
                Err(AgentError::Mount(nix::errno::Errno::EBUSY))
            }
        }
        Err(e) => Err(AgentError::Mount(e)),
    }
}

/// Phase E: kernel pseudo-filesystems inside the rootfs. Errors here are
/// collected, never fatal — the overall mount already succeeded.
pub fn install_pseudo_filesystems(dir: &Path) -> Vec<String> {
    let rootfs = dir.join(ROOTFS_DIR);
    let mut errors = Vec::new();

    if let Err(e) = mount_proc(&rootfs) {
        errors.push(format!("proc: {e}"));
    }
    if let Err(e) = bind_mount_slave(&rootfs, "dev") {
        errors.push(format!("dev: {e}"));
    }
    if let Err(e) = bind_mount_slave(&rootfs, "sys") {
        errors.push(format!("sys: {e}"));
    }
    if Path::new("/dev/pts").exists() {
        if let Err(e) = bind_mount(Path::new("/dev/pts"), &rootfs.join("dev/pts"), false) {
            errors.push(format!("dev/pts: {e}"));
        }
    }
    if Path::new("/dev/shm").exists() {
        if let Err(e) = bind_mount(Path::new("/dev/shm"), &rootfs.join("dev/shm"), false) {
            errors.push(format!("dev/shm: {e}"));
        }
    }
    if let Err(e) = make_tmp(&rootfs) {
        errors.push(format!("tmp: {e}"));
    }

    errors
}

fn mount_proc(rootfs: &Path) -> std::io::Result<()> {
    let proc_dir = rootfs.join("proc");
    fs::create_dir_all(&proc_dir)?;
    mount(Some("proc"), &proc_dir, Some("proc"), MsFlags::empty(), None::<&str>).map_err(errno_to_io)
}

fn bind_mount_slave(rootfs: &Path, name: &str) -> std::io::Result<()> {
    let target = rootfs.join(name);
    bind_mount(Path::new(&format!("/{name}")), &target, true)?;
    mount(None::<&str>, &target, None::<&str>, MsFlags::MS_REC | MsFlags::MS_SLAVE, None::<&str>).map_err(errno_to_io)
}

fn bind_mount(source: &Path, target: &Path, recursive: bool) -> std::io::Result<()> {
    fs::create_dir_all(target)?;
    let mut flags = MsFlags::MS_BIND;
    if recursive {
        flags |= MsFlags::MS_REC;
    }
    mount(Some(source), target, None::<&str>, flags, None::<&str>).map_err(errno_to_io)
}

fn make_tmp(rootfs: &Path) -> std::io::Result<()> {
    let tmp_dir = rootfs.join("tmp");
    fs::create_dir_all(&tmp_dir)?;
    set_mode(&tmp_dir, 0o1777)
}

fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(mode);
    fs::set_permissions(path, perms)
}

fn errno_to_io(e: nix::errno::Errno) -> std::io::Error {
    std::io::Error::from_raw_os_error(e as i32)
}

/// Phase F's decision: Phase E failures are reported but never flip the
/// overall outcome to `error`.
pub fn commit(pseudo_fs_errors: &[String]) -> Option<String> {
    if pseudo_fs_errors.is_empty() {
        None
    } else {
        Some(pseudo_fs_errors.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cfg() -> AgentConfig {
        AgentConfig {
            host_prefix: "/host".into(),
            containerd_root: "/var/lib/containerd".into(),
            work_root: "/var/lib/stoppablecontainer".into(),
            poll_interval: Duration::from_secs(2),
            rootfs_marker_var: "STOPPABLECONTAINER_ROOTFS".to_string(),
        }
    }

    #[test]
    fn parses_overlay_options_with_colon_separated_lowerdir() {
        let opts = "lowerdir=/a:/b,upperdir=/c,workdir=/d,index=off";
        let recipe = parse_overlay_options(opts).unwrap();
        assert_eq!(recipe.lowerdir, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(recipe.upperdir, PathBuf::from("/c"));
        assert_eq!(recipe.workdir, PathBuf::from("/d"));
    }

    #[test]
    fn fails_when_a_required_key_is_missing() {
        let opts = "lowerdir=/a,upperdir=/c";
        assert!(parse_overlay_options(opts).is_err());
    }

    #[test]
    fn rehost_rewrites_only_the_containerd_prefix() {
        let recipe = OverlayRecipe {
            lowerdir: vec![PathBuf::from("/var/lib/containerd/io.containerd/lower/1")],
            upperdir: PathBuf::from("/var/lib/containerd/io.containerd/upper/1"),
            workdir: PathBuf::from("/tmp/unrelated/work"),
        };
        let rehosted = rehost_paths(recipe, &cfg());
        assert_eq!(rehosted.lowerdir[0], PathBuf::from("/host/var/lib/containerd/io.containerd/lower/1"));
        assert_eq!(rehosted.upperdir, PathBuf::from("/host/var/lib/containerd/io.containerd/upper/1"));
        assert_eq!(rehosted.workdir, PathBuf::from("/tmp/unrelated/work"));
    }

    #[test]
    fn fingerprint_is_stable_for_the_same_recipe() {
        let recipe = OverlayRecipe {
            lowerdir: vec![PathBuf::from("/a")],
            upperdir: PathBuf::from("/b"),
            workdir: PathBuf::from("/c"),
        };
        assert_eq!(recipe.fingerprint(), recipe.clone().fingerprint());
    }

    #[test]
    fn commit_reports_but_does_not_fail_on_pseudo_fs_errors() {
        assert_eq!(commit(&[]), None);
        assert_eq!(commit(&["dev: boom".to_string()]), Some("dev: boom".to_string()));
    }
}
