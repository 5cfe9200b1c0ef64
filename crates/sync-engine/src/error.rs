use thiserror::Error;

/// Source-side failures. Always fatal for the run; the only recovery is a
/// small bounded reconnect at pool acquisition, handled inside the extractor.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Failed to connect to source database: {source}")]
    Connect {
        #[source]
        source: sqlx::Error,
    },

    #[error("Query failed at cursor {cursor}: {source}")]
    Query {
        cursor: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Failed to decode column '{column}': {source}")]
    Decode {
        column: String,
        #[source]
        source: sqlx::Error,
    },
}

/// A single record that cannot be mapped to the destination schema. Scoped to
/// that record: it is logged and skipped, the run continues.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MapError {
    #[error("Record {record}: required field '{field}' is missing or null")]
    MissingField { record: String, field: String },

    #[error("Record {record}: field '{field}' is not a valid {expected}")]
    InvalidType {
        record: String,
        field: String,
        expected: &'static str,
    },
}

/// Transport-level failure while posting a batch to the webhook.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("HTTP transport error: {0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Failed to open state store: {0}")]
    Open(String),

    #[error("Failed to load sync state: {0}")]
    Load(String),

    #[error("Failed to commit watermark: {0}")]
    Commit(String),

    #[error("Another run already holds the sync lock (holder: {holder})")]
    LockHeld { holder: String },

    #[error("Sync lock was lost or taken over by another run")]
    LockLost,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {var}: {reason}")]
    InvalidVar { var: &'static str, reason: String },
}

/// Fatal run-level error. Every variant names the stage and, where one
/// exists, the batch / record range that failed.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Extraction aborted: {0}")]
    Extract(#[from] ExtractError),

    #[error(
        "Dispatch aborted at batch {seq} (records {first}..={last}): non-retryable response: {detail}"
    )]
    DispatchFatal {
        seq: u64,
        first: u64,
        last: u64,
        detail: String,
    },

    #[error(
        "Batch {seq} (records {first}..={last}) failed after {attempts} attempts: {detail}"
    )]
    BatchFailed {
        seq: u64,
        first: u64,
        last: u64,
        attempts: usize,
        detail: String,
    },

    #[error("State commit failed after batch {seq}: {source}")]
    StateCommit {
        seq: u64,
        #[source]
        source: StateError,
    },

    #[error("State store error: {0}")]
    State(#[from] StateError),

    #[error("Pipeline task failed: {0}")]
    Internal(String),
}
