use std::path::PathBuf;
use thiserror::Error;

/// Why a single event record was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedReason {
    /// `event_type` is not one of `view`, `cart`, `purchase`.
    #[error("unrecognized event kind {0:?}")]
    UnknownEventKind(String),

    /// A `purchase` record arrived without a price.
    #[error("purchase record has no price")]
    MissingPrice,

    /// A price was present but below zero.
    #[error("negative price {0}")]
    NegativePrice(f64),
}

/// All errors produced by the funnel metrics crates.
#[derive(Error, Debug)]
pub enum FunnelError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A timestamp string did not match any recognised format.
    #[error("Invalid timestamp format: {0}")]
    TimestampParse(String),

    /// An event record violates the record contract. Aborts the run.
    #[error("Malformed record #{index} (actor {actor_key}): {reason}")]
    MalformedRecord {
        /// Position of the record in the input batch.
        index: usize,
        actor_key: String,
        reason: MalformedReason,
    },

    /// Metrics were requested for a batch containing no actors.
    #[error("Cannot compute metrics over an empty actor population")]
    EmptyPopulation,

    /// The expected data path does not exist.
    #[error("Data path not found: {0}")]
    DataPathNotFound(PathBuf),

    /// No event files were found under the given directory.
    #[error("No event files found in {0}")]
    NoDataFiles(PathBuf),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FunnelError {
    /// Shorthand for building a [`FunnelError::MalformedRecord`].
    pub fn malformed(index: usize, actor_key: impl Into<String>, reason: MalformedReason) -> Self {
        Self::MalformedRecord {
            index,
            actor_key: actor_key.into(),
            reason,
        }
    }
}

/// Convenience alias used throughout the funnel crates.
pub type Result<T> = std::result::Result<T, FunnelError>;
