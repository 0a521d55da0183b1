//! Errors for this crate.
//! About anyhow: see https://github.com/TrueLayer/reqwest-middleware/issues/119

use reqwest::StatusCode;
use serde::Deserialize;

#[derive(thiserror::Error, Debug)]
pub enum InvalidServiceRoot {
    #[error("Given URL does not end with \"/service\": {0}")]
    Suffix(String),

    #[error("Given URL does not start with \"http://\" or \"https://\": {0}")]
    Protocol(String),
}

aliri_braid::from_infallible!(InvalidServiceRoot);

/// Errors representing failed HTTP interactions with a mine.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// Non-success response, with the explanation the server gave (if any).
    #[error("{summary} ({status} {reason}): {message}")]
    Status {
        summary: &'static str,
        status: StatusCode,
        reason: &'static str,
        message: String,
    },

    /// Error without a response from the server.
    #[error(transparent)]
    Raw(#[from] reqwest::Error),

    /// Error from reqwest middleware function.
    #[error(transparent)]
    Middleware(anyhow::Error),
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

impl TransportError {
    /// Describe a non-success HTTP response. If `body` is a JSON object with an
    /// `error` member, that message is used, otherwise the body itself.
    pub fn from_status(status: StatusCode, body: &str, authenticated: bool) -> Self {
        let summary = match status.as_u16() {
            400 => "There was a problem with our request",
            401 | 403 if authenticated => "Insufficient permissions",
            401 | 403 => "No permissions - not logged in",
            404 => "Missing resource",
            500 => "Internal server error",
            _ => "Request failed",
        };
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.error)
            .unwrap_or_else(|| body.to_string());
        TransportError::Status {
            summary,
            status,
            reason: status.canonical_reason().unwrap_or("unknown reason"),
            message,
        }
    }

    /// HTTP status of the failed response, if there was one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Raw(e) => e.status(),
            TransportError::Middleware(_) => None,
        }
    }
}

impl From<reqwest_middleware::Error> for TransportError {
    fn from(error: reqwest_middleware::Error) -> Self {
        match error {
            reqwest_middleware::Error::Middleware(e) => TransportError::Middleware(e),
            reqwest_middleware::Error::Reqwest(e) => TransportError::Raw(e),
        }
    }
}

/// Errors in the data a mine streams back: malformed envelopes, bad rows,
/// and failures the server reports in-band.
#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("The connection returned a bad header: {0}")]
    BadHeader(String),

    #[error("Error parsing line from results: '{line}' - {source}")]
    BadRow {
        line: String,
        source: serde_json::Error,
    },

    #[error("Error parsing JSON container: {container}")]
    BadContainer {
        container: String,
        source: serde_json::Error,
    },

    #[error("Error parsing response: {text}")]
    BadEnvelope {
        text: String,
        source: serde_json::Error,
    },

    /// The footer of a result set said it was not transferred successfully.
    #[error("Results were not transferred successfully (status {}): {message}",
        .status_code.map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    Unsuccessful {
        status_code: Option<u16>,
        message: String,
    },

    /// A `[ERROR]` line inside a flat-file result set.
    #[error("{0}")]
    Inline(String),

    #[error("Expected {expected}, got: {actual}")]
    UnexpectedValue {
        expected: &'static str,
        actual: String,
    },

    #[error("Row has {actual} cells but the view has {expected} columns")]
    RowLength { expected: usize, actual: usize },

    #[error("Connection interrupted")]
    Interrupted,

    #[error("Connection interrupted: {0}")]
    Read(#[source] std::io::Error),
}

/// Errors a mine reports about an operation, or problems with what was asked of it.
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    /// The `error` member of a JSON response.
    #[error("{0}")]
    Message(String),

    #[error("\"{key}\" not returned from {path}")]
    MissingKey { key: &'static str, path: String },

    #[error("Could not parse a valid webservice version: {0:?}")]
    BadVersion(String),

    #[error("{feature} requires API version {required}+, this service is version {actual}")]
    Unsupported {
        feature: &'static str,
        required: u32,
        actual: u32,
    },

    #[error("{0}")]
    InvalidArgument(String),

    #[error("Unknown job status {0:?}")]
    UnknownStatus(String),

    /// Failure reported by one of the list endpoints.
    #[error("List service error: {0}")]
    ListService(String),
}

/// Any error produced by this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    InvalidServiceRoot(#[from] InvalidServiceRoot),

    #[error("'{name}' is not one of the valid row formats ({valid})")]
    InvalidRowFormat { name: String, valid: String },

    #[error("Cannot create list from {0}")]
    UnsupportedContent(String),

    #[error("{class} has no field called \"{field}\"")]
    NoSuchField { class: String, field: String },

    #[error("The data model has no class called \"{0}\"")]
    UnknownClass(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        TransportError::from(error).into()
    }
}

impl From<reqwest_middleware::Error> for Error {
    fn from(error: reqwest_middleware::Error) -> Self {
        TransportError::from(error).into()
    }
}
