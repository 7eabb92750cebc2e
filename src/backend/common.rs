use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend not supported")]
    NotSupported,
    #[error("holographic presenter is required for stereo output")]
    PresenterRequired,
    #[error("Shutdown")]
    Shutdown,
    #[error("Fatal: {0:?}")]
    Fatal(#[from] anyhow::Error),
}

/// Shared hand/eye selector. Left is index 0 everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum LeftRight {
    Left,
    Right,
}

impl LeftRight {
    pub const fn index(self) -> usize {
        match self {
            LeftRight::Left => 0,
            LeftRight::Right => 1,
        }
    }
}
