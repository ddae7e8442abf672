//! §4.4's main-loop enumeration step, widened to two levels deep
//! (`<prefix>/<namespace>/<name>`) per §18, rejecting any component that
//! fails the shared path-safety invariant.

use std::path::PathBuf;
use stoppable_shared::config::AgentConfig;
use stoppable_shared::os::file::validate_path_component;
use tokio::fs::{self, DirEntry};

pub async fn scan_requests(cfg: &AgentConfig) -> Vec<PathBuf> {
    let mut work_dirs = Vec::new();

    let Ok(mut namespaces) = fs::read_dir(&cfg.work_root).await else {
        return work_dirs;
    };
    while let Ok(Some(ns_entry)) = namespaces.next_entry().await {
        if !is_safe_dir(&ns_entry).await {
            continue;
        }
        let Ok(mut names) = fs::read_dir(ns_entry.path()).await else {
            continue;
        };
        while let Ok(Some(name_entry)) = names.next_entry().await {
            if !is_safe_dir(&name_entry).await {
                continue;
            }
            work_dirs.push(name_entry.path());
        }
    }

    work_dirs
}

async fn is_safe_dir(entry: &DirEntry) -> bool {
    let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
    if !is_dir {
        return false;
    }
    entry
        .file_name()
        .to_str()
        .map(|name| validate_path_component(name).is_ok())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cfg_for(root: &std::path::Path) -> AgentConfig {
        AgentConfig {
            host_prefix: "/host".into(),
            containerd_root: "/var/lib/containerd".into(),
            work_root: root.to_path_buf(),
            poll_interval: Duration::from_secs(2),
            rootfs_marker_var: "STOPPABLECONTAINER_ROOTFS".to_string(),
        }
    }

    #[tokio::test]
    async fn finds_namespace_name_directories_two_levels_deep() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("default").join("demo")).unwrap();
        std::fs::create_dir_all(root.path().join("kube-system").join("other")).unwrap();
        std::fs::write(root.path().join("stray-file"), b"").unwrap();

        let mut found = scan_requests(&cfg_for(root.path())).await;
        found.sort();

        assert_eq!(
            found,
            vec![
                root.path().join("default").join("demo"),
                root.path().join("kube-system").join("other"),
            ]
        );
    }

    #[tokio::test]
    async fn ignores_plain_files_at_either_level() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("default")).unwrap();
        std::fs::write(root.path().join("default").join("stray-file"), b"").unwrap();

        let found = scan_requests(&cfg_for(root.path())).await;
        assert!(found.is_empty());
    }
}
