use serde::{Serialize, Serializer};
use std::path::PathBuf;
use thiserror::Error;

/// Possible errors when setting up or orchestrating a fetch run.
///
/// These are run-level failures. Failures of individual targets are
/// recorded as [`FetchError`](crate::FetchError) inside their
/// [`RawResult`](crate::RawResult) and never surface here.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The caller supplied an empty list of targets
    #[error("The provided target list is empty")]
    EmptyInput,

    /// None of the supplied targets could be used
    #[error("No valid targets found in the provided list")]
    NoValidTargets,

    /// `run` was called without any loaded targets
    #[error("No targets loaded, call `load_targets` before running")]
    NoTargets,

    /// A configuration value is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to read or parse a configuration file
    #[error("Cannot load configuration from `{}`: {}", .0.display(), .1)]
    ConfigFile(PathBuf, #[source] toml::de::Error),

    /// The request client cannot be created
    #[error("Error creating request client: {0}")]
    BuildRequestClient(#[source] reqwest::Error),

    /// The given header name could not be parsed
    #[error("Header name could not be parsed: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// The given header value could not be parsed
    #[error("Header value could not be parsed: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// The configured trust store could not be loaded
    #[error("Cannot load trust store `{}`: {}", .0.display(), .1)]
    TrustStore(PathBuf, String),

    /// A worker could not be provisioned; the run was rolled back
    #[error("Failed to provision worker {worker}: {source}")]
    Provision {
        /// Index of the worker that failed
        worker: usize,
        /// The underlying setup failure
        #[source]
        source: Box<ErrorKind>,
    },

    /// A worker task panicked or was aborted
    #[error("Worker task failed: {0}")]
    WorkerJoin(#[from] tokio::task::JoinError),

    /// A result slot was never written; this indicates a bug in the engine
    #[error("Result slot {0} was never written")]
    UnfilledSlot(usize),

    /// The results are still referenced by a worker after all workers were joined
    #[error("Results are still in use by a worker")]
    SinkInUse,

    /// Any form of I/O error occurred while reading from or writing to a path
    #[error("Failed to access path: `{}`, reason: {}", match .0 {
        Some(p) => p.to_str().unwrap_or("<MALFORMED PATH>"),
        None => "<MALFORMED PATH>",
    }, .1)]
    IoError(Option<PathBuf>, std::io::Error),

    /// A JSON document could not be serialized or deserialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ErrorKind {
    /// Wraps a provisioning failure of the given worker.
    pub(crate) fn provision(worker: usize, source: ErrorKind) -> Self {
        Self::Provision {
            worker,
            source: Box::new(source),
        }
    }
}

impl Serialize for ErrorKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl From<(PathBuf, std::io::Error)> for ErrorKind {
    fn from(value: (PathBuf, std::io::Error)) -> Self {
        Self::IoError(Some(value.0), value.1)
    }
}

impl From<std::io::Error> for ErrorKind {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(None, e)
    }
}
