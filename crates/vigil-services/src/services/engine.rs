//! Scan engine abstraction. Detection internals are the engine's business; the pipeline
//! only distinguishes clean, infected, unrecognised and unavailable.

use async_trait::async_trait;
use thiserror::Error;
use vigil_core::constants::CLAMAV_UNAVAILABLE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineVerdict {
    Clean,
    /// Signature names in the order the engine reported them
    Infected(Vec<String>),
    /// A response the client could not classify, kept verbatim
    Unrecognized(String),
}

impl EngineVerdict {
    /// The first reported match. Additional matches are not modelled.
    pub fn primary_match(&self) -> Option<&str> {
        match self {
            EngineVerdict::Infected(names) => names.first().map(String::as_str),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{prefix}: {0}", prefix = CLAMAV_UNAVAILABLE)]
    Unavailable(String),
}

#[async_trait]
pub trait ScanEngine: Send + Sync {
    async fn scan(&self, data: Vec<u8>) -> Result<EngineVerdict, EngineError>;
}
