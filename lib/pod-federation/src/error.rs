use crate::registry::PodId;
use std::io;
use std::path::PathBuf;

/// An error that aborts a federated run.
///
/// Failures of individual queries or endpoints are never reported through this type. They are
/// recorded as [`ExecutionOutcome`](crate::ExecutionOutcome)s instead.
#[derive(Debug, thiserror::Error)]
pub enum FederationError {
    /// The queries file does not exist or cannot be read.
    #[error("The query source '{}' is unavailable: {source}", path.display())]
    SourceUnavailable {
        /// The path of the queries file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The configuration is not usable (e.g., no endpoint is configured).
    #[error("Invalid configuration: {0}")]
    Config(String),
    /// The HTTP client could not be constructed.
    #[error("Cannot create the HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// An error raised while appending a report to its destination.
///
/// The in-memory report stays valid when this error occurs, so callers can still print it.
#[derive(Debug, thiserror::Error)]
#[error("Cannot append the report to '{}': {source}", path.display())]
pub struct WriteError {
    /// The destination of the report.
    pub path: PathBuf,
    /// The underlying I/O error.
    #[source]
    pub source: io::Error,
}

/// A query names a pod that is not part of the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("The pod '{0}' is not configured")]
pub struct UnknownPod(pub PodId);
