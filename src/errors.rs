use crate::actions::Operation;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("{query} matched no elements")]
    NoMatch { query: String },

    #[error("{query} matched {count} elements, expected exactly one")]
    AmbiguousMatch { query: String, count: usize },

    #[error("Invalid selector {query}: {reason}")]
    InvalidSelector { query: String, reason: String },

    #[error("{operation} is not implemented for element {element}")]
    Unsupported {
        operation: Operation,
        element: String,
    },

    #[error("Field {name:?} not found in form")]
    FieldNotFound { name: String },

    #[error("Value {value:?} not present in {field}")]
    ValueNotFound { field: String, value: String },

    #[error("Invalid value for {element}: {reason}")]
    InvalidValue { element: String, reason: String },

    #[error("URI links to another server: {url}")]
    CrossOrigin { url: String },

    #[error("Invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{method} {url} returned HTTP {status}")]
    HttpStatus {
        status: u16,
        method: String,
        url: String,
    },

    #[error("Can't follow non-redirect response (got {status} for {method} {url})")]
    NotRedirect {
        status: u16,
        method: String,
        url: String,
    },

    #[error("Redirect limit of {limit} exceeded at {url}")]
    TooManyRedirects { limit: usize, url: String },

    #[error("Element handle is stale: node {node} is not in the current document")]
    StaleHandle { node: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;

// Transports are free to use anyhow internally
impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Transport(err.to_string())
    }
}

impl AgentError {
    pub fn invalid_url(url: &str, source: url::ParseError) -> Self {
        AgentError::InvalidUrl {
            url: url.to_string(),
            source,
        }
    }

    /// True for the "nothing registered for this element" outcome, which form
    /// serialisation treats as "contributes nothing".
    pub fn is_unsupported(&self) -> bool {
        matches!(self, AgentError::Unsupported { .. })
    }
}
