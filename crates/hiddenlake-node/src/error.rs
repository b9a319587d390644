//! Application error types.

use hiddenlake_core::{HashLogError, NodeError, ProfileError};
use hiddenlake_crypto::CryptoError;
use thiserror::Error;

/// Errors that can stop the node binary.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration file problems: unreadable, unparsable, or inconsistent.
    ///
    /// Fatal at startup; fix the file and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Network profile problems.
    #[error(transparent)]
    Profile(#[from] ProfileError),

    /// Key material problems (unreadable or malformed key file).
    #[error("key error: {0}")]
    Key(#[from] CryptoError),

    /// The anonymity node failed.
    #[error(transparent)]
    Node(#[from] NodeError),

    /// The durable hash log failed.
    #[error(transparent)]
    Storage(#[from] HashLogError),

    /// Filesystem or socket I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
