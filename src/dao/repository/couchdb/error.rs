//! Error types shared by the CouchDB repository implementation.

use reqwest::StatusCode;
use thiserror::Error;

/// Convenient result alias returning [`CouchDaoError`] failures.
pub type CouchResult<T> = Result<T, CouchDaoError>;

/// Failures that can occur while interacting with CouchDB.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build CouchDB client")]
    ClientBuilder {
        /// Client builder error.
        #[source]
        source: reqwest::Error,
    },
    /// The configured endpoint is not a usable base URL.
    #[error("invalid CouchDB endpoint `{url}`: {reason}")]
    InvalidBaseUrl {
        /// Endpoint as configured.
        url: String,
        /// Why it was refused.
        reason: String,
    },
    /// CouchDB rejected a GET against the target database.
    #[error("failed to query CouchDB database `{database}`")]
    DatabaseQuery {
        /// Database name.
        database: String,
        /// Transport error.
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB rejected a database creation request.
    #[error("failed to create CouchDB database `{database}`")]
    DatabaseCreate {
        /// Database name.
        database: String,
        /// Transport error.
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB returned an unexpected status code for a database operation.
    #[error("unexpected CouchDB database response status {status} for `{database}`")]
    DatabaseStatus {
        /// Database name.
        database: String,
        /// Status returned.
        status: StatusCode,
    },
    /// A request to a document endpoint could not be sent.
    #[error("failed to send CouchDB request to `{path}`")]
    RequestSend {
        /// Request path below the database.
        path: String,
        /// Transport error.
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB returned an unexpected status code for a document endpoint.
    #[error("unexpected CouchDB response status {status} for `{path}`")]
    RequestStatus {
        /// Request path below the database.
        path: String,
        /// Status returned.
        status: StatusCode,
    },
    /// Response payload could not be parsed into the expected model.
    #[error("failed to decode CouchDB response for `{path}`")]
    DecodeResponse {
        /// Request path below the database.
        path: String,
        /// Decode error.
        #[source]
        source: reqwest::Error,
    },
}
