use super::{MountOutcome, MountRequest, Rendezvous};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Default)]
struct Slot {
    request: Option<MountRequest>,
    outcome: Option<MountOutcome>,
    ready_sentinel: bool,
}

/// In-memory [`Rendezvous`] fake keyed by work directory, backing unit
/// tests of the driver's retry logic and the wrapper's wait logic without
/// touching a filesystem (Design Note 4).
#[derive(Default)]
pub struct InMemoryRendezvous {
    slots: Mutex<HashMap<PathBuf, Slot>>,
}

#[async_trait]
impl Rendezvous for InMemoryRendezvous {
    async fn submit(&self, dir: &Path, req: &MountRequest) -> anyhow::Result<()> {
        let mut slots = self.slots.lock().unwrap();
        slots.entry(dir.to_path_buf()).or_default().request = Some(req.clone());
        Ok(())
    }

    async fn poll_outcome(&self, dir: &Path) -> anyhow::Result<Option<MountOutcome>> {
        let slots = self.slots.lock().unwrap();
        Ok(slots.get(dir).and_then(|s| s.outcome.clone()))
    }

    async fn write_outcome(&self, dir: &Path, outcome: &MountOutcome) -> anyhow::Result<()> {
        let mut slots = self.slots.lock().unwrap();
        slots.entry(dir.to_path_buf()).or_default().outcome = Some(outcome.clone());
        Ok(())
    }

    async fn write_ready_sentinel(&self, dir: &Path) -> anyhow::Result<()> {
        let mut slots = self.slots.lock().unwrap();
        slots.entry(dir.to_path_buf()).or_default().ready_sentinel = true;
        Ok(())
    }

    async fn has_ready_sentinel(&self, dir: &Path) -> anyhow::Result<bool> {
        let slots = self.slots.lock().unwrap();
        Ok(slots.get(dir).map(|s| s.ready_sentinel).unwrap_or(false))
    }

    async fn clear_error(&self, dir: &Path) -> anyhow::Result<()> {
        let mut slots = self.slots.lock().unwrap();
        if let Some(slot) = slots.get_mut(dir) {
            slot.outcome = None;
        }
        Ok(())
    }

    async fn read_request(&self, dir: &Path) -> anyhow::Result<Option<MountRequest>> {
        let slots = self.slots.lock().unwrap();
        Ok(slots.get(dir).and_then(|s| s.request.clone()))
    }

    async fn clear_request(&self, dir: &Path) -> anyhow::Result<()> {
        let mut slots = self.slots.lock().unwrap();
        if let Some(slot) = slots.get_mut(dir) {
            slot.request = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn distinct_directories_are_independent() {
        let rendezvous = InMemoryRendezvous::default();
        let a = PathBuf::from("/work/a");
        let b = PathBuf::from("/work/b");
        rendezvous.write_ready_sentinel(&a).await.unwrap();
        assert!(rendezvous.has_ready_sentinel(&a).await.unwrap());
        assert!(!rendezvous.has_ready_sentinel(&b).await.unwrap());
    }
}
