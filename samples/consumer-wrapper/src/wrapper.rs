//! The Consumer pod's entrypoint steps (Design Note 6, §21), each a small
//! function so it is unit-testable against a scratch directory tree instead
//! of a real chroot.

use std::fs;
use std::io;
use std::path::Path;

/// Copies the wrapper image's own `/etc/resolv.conf`/`/etc/hosts` into the
/// rootfs, overwriting whatever the user image shipped, so DNS and host
/// resolution inside the chroot match the pod's actual network namespace.
pub fn install_network_config(rootfs: &Path) -> io::Result<()> {
    for file in ["resolv.conf", "hosts"] {
        let source = Path::new("/etc").join(file);
        if !source.exists() {
            continue;
        }
        let dest = rootfs.join("etc").join(file);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&source, &dest)?;
    }
    Ok(())
}

/// Projects the pod's service-account token directory into the rootfs at
/// the same path (a recursive copy: the wrapper is granted only
/// `SYS_CHROOT`, not `SYS_ADMIN`, so it cannot issue a real bind mount).
pub fn bind_service_account_token(rootfs: &Path) -> io::Result<()> {
    let source = Path::new("/var/run/secrets/kubernetes.io/serviceaccount");
    if !source.exists() {
        return Ok(());
    }
    let dest = rootfs.join("var/run/secrets/kubernetes.io/serviceaccount");
    copy_dir_recursive(source, &dest)
}

fn copy_dir_recursive(source: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let dest_path = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &dest_path)?;
        } else {
            fs::copy(entry.path(), dest_path)?;
        }
    }
    Ok(())
}

/// `chroot` into the overlay MountAgent created, then `chdir` to the user's
/// working directory (resolved inside the new root).
pub fn enter_rootfs(rootfs: &Path, workdir: &str) -> nix::Result<()> {
    nix::unistd::chroot(rootfs)?;
    nix::unistd::chdir(workdir)
}

/// Replaces the current process image with the user's command.
pub fn exec_command(command: &[String]) -> nix::Result<std::convert::Infallible> {
    let program = std::ffi::CString::new(command[0].as_bytes()).expect("no interior NUL");
    let args = command
        .iter()
        .map(|a| std::ffi::CString::new(a.as_bytes()).expect("no interior NUL"))
        .collect::<Vec<_>>();
    nix::unistd::execvp(&program, &args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_network_config_copies_resolv_conf_and_hosts() {
        let rootfs = tempfile::tempdir().unwrap();
        install_network_config(rootfs.path()).unwrap();

        if Path::new("/etc/resolv.conf").exists() {
            assert!(rootfs.path().join("etc/resolv.conf").exists());
        }
        if Path::new("/etc/hosts").exists() {
            assert!(rootfs.path().join("etc/hosts").exists());
        }
    }

    #[test]
    fn bind_service_account_token_is_a_noop_without_a_source() {
        let rootfs = tempfile::tempdir().unwrap();
        bind_service_account_token(rootfs.path()).unwrap();
        assert!(!rootfs.path().join("var/run/secrets/kubernetes.io/serviceaccount").exists());
    }

    #[test]
    fn copy_dir_recursive_preserves_nested_structure() {
        let source = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(source.path().join("nested")).unwrap();
        std::fs::write(source.path().join("token"), b"secret").unwrap();
        std::fs::write(source.path().join("nested/ca.crt"), b"cert").unwrap();

        let dest = tempfile::tempdir().unwrap();
        let dest_path = dest.path().join("out");
        copy_dir_recursive(source.path(), &dest_path).unwrap();

        assert_eq!(std::fs::read(dest_path.join("token")).unwrap(), b"secret");
        assert_eq!(std::fs::read(dest_path.join("nested/ca.crt")).unwrap(), b"cert");
    }
}
