use thiserror::Error;

/// Errors surfaced by a single `process()` pass; the caller turns these into
/// `ready.json`'s `status=error` message (§4.4's "transactional from the
/// outside" contract).
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("mount error: {0}")]
    Mount(nix::errno::Errno),
    #[error("{message}")]
    Protocol { message: String },
}
