//! Typed message-passing interface over the file rendezvous protocol
//! (Design Note 4): `submit`/`poll_outcome`/`write_ready_sentinel`/
//! `clear_error`, backed by real files in production and an in-memory map
//! in tests.

mod file;
mod memory;

pub use file::FileRendezvous;
pub use memory::InMemoryRendezvous;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Contents of `request.json` (§6.2).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct MountRequest {
    pub pod_uid: String,
    pub namespace: String,
    pub name: String,
}

/// Contents of `ready.json` (§6.2), modeled as a sum type rather than a
/// bare status string (Design Note 3's principle applied here too).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MountOutcome {
    Ready,
    Error { message: String },
}

#[async_trait]
pub trait Rendezvous: Send + Sync {
    /// Driver side: writes `request.json`.
    async fn submit(&self, dir: &Path, req: &MountRequest) -> anyhow::Result<()>;
    /// Either side: reads `ready.json` if present.
    async fn poll_outcome(&self, dir: &Path) -> anyhow::Result<Option<MountOutcome>>;
    /// Driver side: writes `ready.json` with the given outcome. Single
    /// writer of `ready.json` is the agent in production; tests exercise
    /// both sides through the same trait.
    async fn write_outcome(&self, dir: &Path, outcome: &MountOutcome) -> anyhow::Result<()>;
    /// Driver side: writes the `ready` sentinel after verifying the mount.
    async fn write_ready_sentinel(&self, dir: &Path) -> anyhow::Result<()>;
    /// Driver side: checks for the `ready` sentinel (used by its readiness probe).
    async fn has_ready_sentinel(&self, dir: &Path) -> anyhow::Result<bool>;
    /// Driver side: removes `ready.json` before retrying, per §9's resolved
    /// open question on `ready.json` ownership.
    async fn clear_error(&self, dir: &Path) -> anyhow::Result<()>;
    /// Agent side: reads `request.json` if present.
    async fn read_request(&self, dir: &Path) -> anyhow::Result<Option<MountRequest>>;
    /// Agent side: removes `request.json` on success (Phase F).
    async fn clear_request(&self, dir: &Path) -> anyhow::Result<()>;
}
