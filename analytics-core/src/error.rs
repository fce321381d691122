use thiserror::Error;

use crate::message::MessageKind;

/// Enumeration of errors raised while turning an event description into a message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("unknown event type: {}", .0.as_deref().unwrap_or("<missing>"))]
    InvalidEventKind(Option<String>),
    #[error("{kind} event is missing required field '{field}'")]
    MissingField {
        kind: MessageKind,
        field: &'static str,
    },
    #[error("field '{field}' must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
    #[error("could not parse timestamp '{0}'")]
    TimestampParseError(String),
    #[error("integration '{name}' must be a boolean or an object, got {found}")]
    InvalidIntegrationValue { name: String, found: &'static str },
}

/// Enumeration of errors reported to a `Callback` when a message could not be delivered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("failed to send batch: {0}")]
    RequestError(String),
    #[error("batch rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("giving up on batch after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },
    #[error("failed to serialize batch: {0}")]
    SerializationError(String),
    #[error("client has been shut down")]
    ShutDown,
}

/// Enumeration of errors related to constructing a delivery client.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid api host '{host}': {error}")]
    InvalidEndpoint {
        host: String,
        error: url::ParseError,
    },
    #[error("write key cannot be empty")]
    EmptyWriteKey,
    #[error("the client must be built from within a tokio runtime")]
    NoRuntime,
    #[error("failed to construct http client: {0}")]
    HttpClientError(#[from] reqwest::Error),
}
