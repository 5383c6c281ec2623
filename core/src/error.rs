//! Error types for the FHIR query client.
//!
//! # Design
//! Errors fall into three groups. Caller errors (`ConflictingQuery`,
//! `MissingCredentials`) are raised before any request leaves the process.
//! Configuration faults (`Config`) are raised while a client is being set up.
//! Transport faults (`Http`, `Transport`) abort the running query; nothing is
//! retried. Every non-2xx response lands in `Http` with the raw status code
//! and body so callers can inspect OperationOutcome payloads themselves.

use thiserror::Error;

/// Errors returned by `FhirQueryClient` and its building blocks.
#[derive(Debug, Error)]
pub enum QueryError {
    /// More than one of params, search string and full URL was supplied.
    #[error("only one of params, search_string or full_url may be provided")]
    ConflictingQuery,

    /// Login-exchange auth was selected without a username or password.
    #[error("username and password are required for login authentication")]
    MissingCredentials,

    /// The client configuration is unusable.
    #[error("configuration error: {0}")]
    Config(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request could not be executed at all.
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl QueryError {
    /// Status code of the failed response, if this error came from one.
    pub fn status(&self) -> Option<u16> {
        match self {
            QueryError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
