/// File helpers shared by the rendezvous protocol and test fixtures.
pub mod file {
    use std::fs;
    use std::io;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    /// Writes `contents` to `path` and sets its mode, per §6.2 ("0644 mode").
    pub fn write_with_mode(path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
        fs::write(path, contents)?;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(mode);
        fs::set_permissions(path, perms)
    }

    /// Rejects path components containing `/` or `..`, the MountAgent safety
    /// invariant from §4.4 ("path validation must reject work-directory names
    /// containing `/` or `..`").
    pub fn validate_path_component(component: &str) -> anyhow::Result<()> {
        if component.is_empty() || component.contains('/') || component == ".." {
            anyhow::bail!("invalid path component: {:?}", component);
        }
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn accepts_ordinary_names() {
            assert!(validate_path_component("default").is_ok());
            assert!(validate_path_component("my-workload-1").is_ok());
        }

        #[test]
        fn rejects_traversal_and_separators() {
            assert!(validate_path_component("..").is_err());
            assert!(validate_path_component("a/b").is_err());
            assert!(validate_path_component("").is_err());
        }
    }
}
