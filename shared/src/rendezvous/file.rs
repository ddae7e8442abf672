use super::{MountOutcome, MountRequest, Rendezvous};
use crate::os::file::write_with_mode;
use crate::system::layout::{READY_FILE, READY_SENTINEL, REQUEST_FILE};
use async_trait::async_trait;
use log::trace;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Production [`Rendezvous`] implementation: plain reads/writes against the
/// host work directory tree, no locking (§5 "Shared resources" relies on
/// the single-writer-per-file invariant instead).
#[derive(Default)]
pub struct FileRendezvous;

fn join(dir: &Path, file: &str) -> PathBuf {
    dir.join(file)
}

#[async_trait]
impl Rendezvous for FileRendezvous {
    async fn submit(&self, dir: &Path, req: &MountRequest) -> anyhow::Result<()> {
        trace!("submit - writing {}", REQUEST_FILE);
        fs::create_dir_all(dir).await?;
        let body = serde_json::to_vec(req)?;
        write_with_mode(&join(dir, REQUEST_FILE), &body, 0o644)?;
        Ok(())
    }

    async fn poll_outcome(&self, dir: &Path) -> anyhow::Result<Option<MountOutcome>> {
        let path = join(dir, READY_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let body = fs::read(&path).await?;
        Ok(Some(serde_json::from_slice(&body)?))
    }

    async fn write_outcome(&self, dir: &Path, outcome: &MountOutcome) -> anyhow::Result<()> {
        let body = serde_json::to_vec(outcome)?;
        write_with_mode(&join(dir, READY_FILE), &body, 0o644)?;
        Ok(())
    }

    async fn write_ready_sentinel(&self, dir: &Path) -> anyhow::Result<()> {
        write_with_mode(&join(dir, READY_SENTINEL), b"ready\n", 0o644)?;
        Ok(())
    }

    async fn has_ready_sentinel(&self, dir: &Path) -> anyhow::Result<bool> {
        Ok(join(dir, READY_SENTINEL).exists())
    }

    async fn clear_error(&self, dir: &Path) -> anyhow::Result<()> {
        let path = join(dir, READY_FILE);
        if path.exists() {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }

    async fn read_request(&self, dir: &Path) -> anyhow::Result<Option<MountRequest>> {
        let path = join(dir, REQUEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let body = fs::read(&path).await?;
        Ok(Some(serde_json::from_slice(&body)?))
    }

    async fn clear_request(&self, dir: &Path) -> anyhow::Result<()> {
        let path = join(dir, REQUEST_FILE);
        if path.exists() {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submit_then_read_request_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let rendezvous = FileRendezvous;
        let req = MountRequest {
            pod_uid: "abc-123".to_string(),
            namespace: "default".to_string(),
            name: "demo".to_string(),
        };
        rendezvous.submit(dir.path(), &req).await.unwrap();
        let read_back = rendezvous.read_request(dir.path()).await.unwrap();
        assert_eq!(read_back, Some(req));
    }

    #[tokio::test]
    async fn poll_outcome_is_none_until_written() {
        let dir = tempfile::tempdir().unwrap();
        let rendezvous = FileRendezvous;
        assert_eq!(rendezvous.poll_outcome(dir.path()).await.unwrap(), None);
        rendezvous
            .write_outcome(dir.path(), &MountOutcome::Ready)
            .await
            .unwrap();
        assert_eq!(
            rendezvous.poll_outcome(dir.path()).await.unwrap(),
            Some(MountOutcome::Ready)
        );
    }

    #[tokio::test]
    async fn request_json_bytes_match_protocol_shape() {
        let dir = tempfile::tempdir().unwrap();
        let rendezvous = FileRendezvous;
        let req = MountRequest {
            pod_uid: "abc-123".to_string(),
            namespace: "default".to_string(),
            name: "demo".to_string(),
        };
        rendezvous.submit(dir.path(), &req).await.unwrap();
        let raw = std::fs::read_to_string(dir.path().join(REQUEST_FILE)).unwrap();
        assert_eq!(raw, r#"{"pod_uid":"abc-123","namespace":"default","name":"demo"}"#);
    }
}
