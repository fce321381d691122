use analytics_core::{BuildError, ClientError};
use thiserror::Error;

/// Everything that can make a run fail. The message of the first one is what gets reported.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Missing required --input argument")]
    MissingInput,
    #[error("failed to parse input: {0}")]
    InputParseError(#[from] serde_json::Error),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("{0}")]
    DeliveryFailure(String),
}
