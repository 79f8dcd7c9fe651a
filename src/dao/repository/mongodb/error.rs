use mongodb::error::Error as MongoError;
use thiserror::Error;

/// Result alias for MongoDB operations.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures that can occur while talking to MongoDB.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// The endpoint is not a MongoDB connection string.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// Connection string as configured.
        uri: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The driver refused the client options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// No ping succeeded within the retry budget.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Pings attempted.
        attempts: u32,
        /// Error from the last ping.
        #[source]
        source: MongoError,
    },
    /// Health check ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// An index could not be created at connect time.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Collection being indexed.
        collection: String,
        /// Index name.
        index: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A find cursor failed.
    #[error("failed to query collection `{collection}`")]
    Query {
        /// Collection queried.
        collection: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A single-document lookup failed.
    #[error("failed to load document `{id}`")]
    Load {
        /// Document id.
        id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// An insert failed for a reason other than a duplicate id.
    #[error("failed to insert document `{id}`")]
    Insert {
        /// Document id.
        id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A replace failed.
    #[error("failed to replace document `{id}`")]
    Replace {
        /// Document id.
        id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A delete failed.
    #[error("failed to delete document `{id}`")]
    Delete {
        /// Document id.
        id: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
}
