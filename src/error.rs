//! Error types for the recorder

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures that abort a whole capture attempt.
///
/// None of these are fatal: the recorder sleeps and dials again.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("Handshake timed out after {0}s")]
    Timeout(u64),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Gateway rejected upgrade with HTTP {0}")]
    Rejected(u16),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Control message failed: {0}")]
    Control(String),
}

/// Reasons a single demux frame is dropped
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    #[error("Frame too short: {0} bytes")]
    TooShort(usize),

    #[error("Unknown frame kind: {0:#04x}")]
    UnknownKind(u8),

    #[error("Payload offset {offset} out of range for {len} byte frame")]
    PayloadOffsetOutOfRange { offset: usize, len: usize },

    #[error("No codec start code in video payload")]
    MissingStartCode,

    #[error("Empty payload")]
    EmptyPayload,
}

/// Filesystem errors while sealing a segment
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to append to {}: {source}", path.display())]
    Append {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Container merge errors
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Missing source file: {}", .0.display())]
    MissingSource(PathBuf),

    #[error("Transcoder not found: {0} is not on PATH and no bundled copy is available")]
    ToolNotFound(String),

    #[error("Failed to materialize bundled transcoder at {}: {source}", path.display())]
    Materialize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start transcoder: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Transcoder exited with {status}; output: {output}")]
    Failed { status: String, output: String },
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
