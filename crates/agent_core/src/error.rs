use thiserror::Error;

use crate::state::Phase;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("stage catalog must contain at least one stage")]
    Empty,
    #[error("stage at position {order} has a blank name")]
    BlankName { order: usize },
    #[error("stage name '{name}' appears more than once")]
    DuplicateName { name: String },
    #[error("invalid catalog file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("invalid data source url '{url}': {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        source: reqwest::Error,
    },
    #[error("{endpoint} responded with status {status}")]
    Status {
        endpoint: String,
        status: reqwest::StatusCode,
    },
    #[error("could not decode response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
    #[error("data source unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("cannot {operation} while {phase:?}")]
    InvalidTransition {
        operation: &'static str,
        phase: Phase,
    },
    #[error("discarded {event} for a run that is no longer current")]
    StaleEvent { event: &'static str },
    #[error("orchestrator has been shut down")]
    ShutDown,
    #[error("no tokio runtime available to drive the orchestrator")]
    NoRuntime,
}

impl OrchestratorError {
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }
}
