//! Unified client error model.
//! Every failure surfaced by the transport, the query state machine and the
//! value decoder maps onto one `Error` enum so callers can branch on the kind
//! (retryable transport fault, engine-reported failure, decode mismatch, misuse).

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Failure reported by the engine in the `error` field of a statement response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryFailure {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error_code: i64,
    #[serde(default)]
    pub error_name: String,
    #[serde(default)]
    pub error_type: String,
    #[serde(default)]
    pub error_location: Option<ErrorLocation>,
    #[serde(skip)]
    pub query_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorLocation {
    pub line_number: u32,
    pub column_number: u32,
}

impl Display for QueryFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_name, self.message)?;
        if let Some(loc) = &self.error_location {
            write!(f, " (line {}:{})", loc.line_number, loc.column_number)?;
        }
        if let Some(id) = &self.query_id {
            write!(f, " [query {}]", id)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("error 503: service unavailable")]
    ServiceUnavailable,
    #[error("error {status}: {body}")]
    Http { status: u16, body: String },
    #[error("external error: {0}")]
    External(QueryFailure),
    #[error("user error: {0}")]
    User(QueryFailure),
    #[error("query error: {0}")]
    Query(QueryFailure),
    #[error("cannot decode {value} as {data_type}: {reason}")]
    Decode { value: String, data_type: String, reason: String },
    #[error("invalid use of query: {0}")]
    Misuse(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("credential refresh failed: {0}")]
    Credential(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self { Error::Config(msg.into()) }
    pub fn misuse<S: Into<String>>(msg: S) -> Self { Error::Misuse(msg.into()) }
    pub fn protocol<S: Into<String>>(msg: S) -> Self { Error::Protocol(msg.into()) }

    pub fn decode(value: &serde_json::Value, data_type: impl Display, reason: impl Display) -> Self {
        Error::Decode { value: value.to_string(), data_type: data_type.to_string(), reason: reason.to_string() }
    }

    /// Classify an engine failure by its `errorType`.
    pub fn from_failure(failure: QueryFailure) -> Self {
        match failure.error_type.as_str() {
            "EXTERNAL" => Error::External(failure),
            "USER_ERROR" => Error::User(failure),
            _ => Error::Query(failure),
        }
    }

    /// Connection failures, timeouts and 503 responses are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transport(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Error::ServiceUnavailable => true,
            _ => false,
        }
    }

    /// Engine failure payload, when the error came from the engine.
    pub fn failure(&self) -> Option<&QueryFailure> {
        match self {
            Error::External(f) | Error::User(f) | Error::Query(f) => Some(f),
            _ => None,
        }
    }

    /// HTTP status carried by the error, when there is one.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Error::ServiceUnavailable => Some(503),
            Error::Http { status, .. } => Some(*status),
            Error::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
