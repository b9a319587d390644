//! Node error types.
//!
//! One taxonomy for the whole core, following the rule that errors are
//! surfaced more strictly the further they are from the wire: malformed
//! inbound frames never become errors at all (the ingest path drops them),
//! while caller-facing operations report saturation, timeouts and state
//! violations precisely.

use std::time::Duration;

use hiddenlake_crypto::CryptoError;
use hiddenlake_proto::ProtocolError;
use thiserror::Error;

use crate::{adapter::AdapterError, hashlog::HashLogError};

/// Errors surfaced by the anonymity node and its queue processor.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The main pool is saturated and the caller disallowed waiting.
    #[error("main pool is full")]
    PoolFull,

    /// A fetch round-trip exceeded the network's fetch timeout.
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    /// The operation was cancelled by the caller's token.
    #[error("operation cancelled")]
    Cancelled,

    /// The proof-of-work search was aborted by shutdown.
    #[error("proof-of-work search aborted")]
    WorkFailed,

    /// A correlation nonce is already pending.
    #[error("correlation nonce already in use")]
    CorrelationInUse,

    /// `run` was called while the node is already running.
    #[error("node is already running")]
    AlreadyRunning,

    /// A send or fetch was attempted outside the running state.
    #[error("node is not running")]
    NotRunning,

    /// Payload or codec failure on the caller's own data.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Sealing failure on the caller's own data (weak recipient key).
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The durable hash log failed; the node cannot uphold at-most-once.
    #[error("hash log failure: {0}")]
    HashLog(#[from] HashLogError),

    /// A transport failed fatally.
    #[error("adapter failure: {0}")]
    Adapter(#[from] AdapterError),

    /// A background task died unexpectedly.
    #[error("internal: {0}")]
    Internal(String),
}

impl NodeError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::PoolFull | Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturation_and_timeouts_are_transient() {
        assert!(NodeError::PoolFull.is_transient());
        assert!(NodeError::Timeout(Duration::from_secs(1)).is_transient());
    }

    #[test]
    fn state_violations_are_not_transient() {
        assert!(!NodeError::AlreadyRunning.is_transient());
        assert!(!NodeError::NotRunning.is_transient());
        assert!(!NodeError::Cancelled.is_transient());
    }
}
