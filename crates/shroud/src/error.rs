//! error types for shroud

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    // === local participation ===
    #[error("verification refused the reencryption request")]
    VerificationRefused,

    #[error("share unavailable: {0}")]
    ShareUnavailable(String),

    #[error("share {share} does not belong to node {node}")]
    ShareIndexMismatch { share: u32, node: usize },

    #[error("encoding failed: {0}")]
    Encoding(String),

    // === codec / curve ===
    #[error("could not embed data into a group element")]
    EmbeddingFailed,

    #[error("data too long to embed: {len} bytes, max {max}")]
    DataTooLong { len: usize, max: usize },

    #[error("invalid group element")]
    InvalidPoint,

    // === aggregation ===
    #[error("too many failed sends: {failed} failed, {tolerated} tolerated")]
    BroadcastFailure { failed: usize, tolerated: usize },

    #[error("not enough replies: {failures} failures, {tolerated} tolerated")]
    InsufficientReplies { failures: usize, tolerated: usize },

    #[error("protocol timed out before reaching the threshold")]
    Timeout,

    #[error("operation only valid at the root of the tree")]
    NotRoot,

    #[error("protocol instance already started")]
    AlreadyStarted,

    #[error("no async runtime: {0}")]
    Runtime(String),

    // === transport / wire ===
    #[error("transport error: {0}")]
    Transport(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unsupported wire version {0}")]
    UnsupportedVersion(u8),

    // === share storage ===
    #[error("share commitment does not match")]
    CommitmentMismatch,
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
