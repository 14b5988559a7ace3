//! Error types for the counter store.

use crate::network::rpc::DirectStatus;
use std::io;
use thiserror::Error;

/// Result type alias for counter store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the counter store.
#[derive(Error, Debug)]
pub enum Error {
    /// Network communication errors.
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// Storage errors.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Cluster membership errors.
    #[error("membership error: {0}")]
    Membership(#[from] MembershipError),

    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),

    /// A remote master answered with a non-zero errno.
    #[error("remote error: {status:?}")]
    Remote { status: DirectStatus },

    /// The peer answered with a message of the wrong kind.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(&'static str),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Network communication errors.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Connection failed.
    #[error("connection failed to {addr}: {reason}")]
    ConnectionFailed { addr: String, reason: String },

    /// Connection was closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// A connect or request deadline passed.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Failed to receive message.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The envelope carried a name missing from the message registry.
    #[error("unknown message type: {0}")]
    UnknownMessage(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Storage layer errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The transaction could not be committed.
    #[error("commit failed: {0}")]
    CommitFailed(String),

    /// The bucket name is not usable by the backend.
    #[error("invalid bucket: {0}")]
    InvalidBucket(String),

    /// RocksDB backend error.
    #[error("rocksdb error: {0}")]
    RocksDb(String),

    /// I/O error.
    #[error("storage io error: {0}")]
    Io(String),
}

/// Cluster membership errors.
#[derive(Error, Debug)]
pub enum MembershipError {
    /// A peer descriptor failed to decode or belongs to another cluster.
    #[error("invalid node")]
    InvalidNode,

    /// Gossip layer failure.
    #[error("gossip error: {0}")]
    Gossip(String),
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Network(NetworkError::Serialization(e.to_string()))
    }
}

impl From<bincode::Error> for NetworkError {
    fn from(e: bincode::Error) -> Self {
        NetworkError::Serialization(e.to_string())
    }
}
