use thiserror::Error;

use crate::phase::Phase;

/// Unified result type for the vigil crate.
pub type Result<T> = std::result::Result<T, ProctorError>;

/// Errors surfaced by the proctoring runtime.
#[derive(Debug, Error)]
pub enum ProctorError {
    #[error("invalid phase transition: {from} -> {to}")]
    InvalidTransition { from: Phase, to: Phase },
    #[error("transition guard failed: {0}")]
    GuardFailed(String),
    #[error("terms must be accepted before entering setup")]
    AgreementNotAccepted,
    #[error("session `{0}` is not the active session")]
    SessionNotActive(String),
    #[error("another session (`{0}`) already owns the proctoring surface")]
    SessionBusy(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("{0} lock poisoned")]
    Poisoned(&'static str),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
