//! The uniform transport contract.
//!
//! A node speaks to the mesh only through [`Adapter`] implementations. The
//! node fans every outbound frame to every attached adapter; each adapter
//! fans it to every configured peer of its transport. Inbound, each adapter
//! feeds a consume stream that the node multiplexes into one ingest
//! pipeline.
//!
//! # Dedup contract
//!
//! Adapters are constructed with the node's shared [`crate::DedupCache`]
//! and must admit every inbound frame through it before making the frame
//! available to [`Adapter::consume`]. This keeps the at-most-once gate in
//! one place no matter how many transports a frame arrives on, and lets
//! transports report duplicates natively (the HTTP ingress answers 208).

use async_trait::async_trait;
use hiddenlake_proto::Frame;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Transport failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// The adapter cannot continue (bind failure, listener died).
    /// Propagates to the node and triggers shutdown.
    #[error("adapter failed: {0}")]
    Fatal(String),

    /// A broadcast reached only part of the peer set. Per-peer I/O
    /// failures are transient; the node logs and carries on.
    #[error("broadcast reached {delivered} of {total} peers")]
    Broadcast {
        /// Peers that accepted the frame.
        delivered: usize,
        /// Peers attempted.
        total: usize,
    },

    /// The operation observed cancellation and unwound.
    #[error("adapter operation cancelled")]
    Cancelled,
}

impl AdapterError {
    /// Whether this failure should take the node down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

/// A pluggable transport with produce/consume/run semantics.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Drive the transport: listeners, connection keepers, ingress servers.
    /// Returns when the token is cancelled (with `Ok`) or on fatal error.
    async fn run(&self, cancel: CancellationToken) -> Result<(), AdapterError>;

    /// Best-effort broadcast to every configured peer of this transport.
    ///
    /// Partial delivery reports [`AdapterError::Broadcast`]; only a failure
    /// of the transport itself is [`AdapterError::Fatal`].
    async fn produce(&self, cancel: &CancellationToken, frame: &Frame) -> Result<(), AdapterError>;

    /// Block until one inbound, cache-admitted frame is available.
    async fn consume(&self, cancel: &CancellationToken) -> Result<Frame, AdapterError>;

    /// Peers that accepted the most recent produce.
    fn onlines(&self) -> Vec<String>;

    /// Drop a live peer, if the transport tracks connections.
    async fn disconnect(&self, _addr: &str) {}
}
