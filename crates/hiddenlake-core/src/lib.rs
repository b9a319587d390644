//! Core of the Hidden Lake anonymity node.
//!
//! The defining property of the overlay is traffic uniformity: a running
//! node emits exactly one fixed-size frame per queue tick whether or not
//! any application had something to say. This crate implements the pieces
//! that enforce it:
//!
//! - [`FrameQueue`]: the queue-paced proof-of-work processor with its main
//!   (real payload) and rand (pre-mined cover) pools
//! - [`AnonymityNode`]: the dispatch/ingest glue binding the queue, the
//!   adapters, the handler registry and the persistence layers
//! - [`Adapter`]: the uniform transport contract (`run`/`produce`/`consume`)
//! - [`DedupCache`] and [`HashLog`]: the two at-most-once gates, one fast
//!   and bounded, one durable
//! - [`KeyDirectory`]: who may be addressed and received from
//! - [`NetworkRegistry`]: the shared per-mesh parameters every participant
//!   must agree on
//!
//! Transports and persistence backends live elsewhere; everything here is
//! runtime logic over the [`hiddenlake_proto`] and [`hiddenlake_crypto`]
//! building blocks.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod cache;
mod client;
mod error;
mod hashlog;
mod keydir;
mod node;
mod profile;
mod queue;

pub use adapter::{Adapter, AdapterError};
pub use cache::DedupCache;
pub use client::MessageClient;
pub use error::NodeError;
pub use hashlog::{HashLog, HashLogError, MemoryHashLog};
pub use keydir::KeyDirectory;
pub use node::{AnonymityNode, Handler, HandlerFuture, NodeSettings};
pub use profile::{NetworkProfile, NetworkRegistry, ProfileError};
pub use queue::{FrameQueue, QueueSettings};
