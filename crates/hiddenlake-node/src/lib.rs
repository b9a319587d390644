//! Hidden Lake production node.
//!
//! Production glue around [`hiddenlake_core`]: real transports (TCP with a
//! connection keeper, HTTP with an ingress endpoint), a redb-backed hash
//! log, the local service bridge and the operator control API, assembled
//! from two YAML files — the shared network profile and this node's own
//! service config.
//!
//! # Components
//!
//! - [`NodeApp`]: wiring and lifetime of one node process
//! - [`TcpAdapter`] / [`HttpAdapter`]: the two built-in transports
//! - [`RedbHashLog`]: durable replay protection
//! - [`ServiceBridge`]: decrypted requests → local HTTP services
//! - [`control`]: the operator API

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod bridge;
mod config;
pub mod control;
mod error;
mod hashlog;
mod http;
mod tcp;

use std::{
    num::NonZeroUsize,
    path::Path,
    sync::Arc,
};

pub use bridge::{BridgeError, HEADER_PUBLIC_KEY, HEADER_RESPONSE_MODE, ServiceBridge};
pub use config::{Addresses, AppConfig, ConnectionList};
pub use control::ControlState;
pub use error::AppError;
pub use hashlog::RedbHashLog;
use hiddenlake_core::{
    Adapter, AnonymityNode, DedupCache, FrameQueue, KeyDirectory, MessageClient, NetworkRegistry,
    NodeError, NodeSettings, QueueSettings,
};
use hiddenlake_crypto::{Fingerprint, PrivateKey, PublicKey};
use hiddenlake_proto::tags;
pub use http::{ADAPTER_PATH, HttpAdapter, HttpSettings};
pub use tcp::{TcpAdapter, TcpSettings};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Dedup cache capacity; at one frame per tick this covers days of mesh
/// traffic before eviction hands over to the durable log.
const DEDUP_CAPACITY: usize = 8192;

/// Durable hash log watermark.
const HASH_LOG_CAPACITY: u64 = 1 << 20;

/// One assembled node process.
pub struct NodeApp {
    node: Arc<AnonymityNode>,
    control: Option<(String, Arc<ControlState>)>,
}

impl NodeApp {
    /// Wire a node from its configuration.
    pub fn init(
        config: &AppConfig,
        registry: &NetworkRegistry,
        key: PrivateKey,
        data_dir: &Path,
        parallel: usize,
    ) -> Result<Self, AppError> {
        let profile = registry.get(&config.network)?.clone();
        let frame = profile.frame_settings(&config.network);

        let client = Arc::new(MessageClient::new(key, frame.clone())?);
        info!(key = %client.public(), network = %config.network, "node identity");

        let mut queue_settings = QueueSettings::with_period(profile.queue_period());
        queue_settings.parallel = parallel.max(1);
        let queue = Arc::new(FrameQueue::new(Arc::clone(&client), queue_settings));

        let dedup_capacity = NonZeroUsize::new(DEDUP_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        let cache = Arc::new(DedupCache::new(dedup_capacity));

        let connections = ConnectionList::new(
            profile.connections.iter().cloned().chain(config.connections.iter().cloned()),
        );

        let tcp = TcpAdapter::new(
            TcpSettings { bind: config.address.tcp.clone(), ..TcpSettings::default() },
            frame.clone(),
            Arc::clone(&cache),
            connections.clone(),
        )
        .map_err(NodeError::from)?;
        let http = HttpAdapter::new(
            HttpSettings { bind: config.address.external.clone(), ..HttpSettings::default() },
            frame,
            Arc::clone(&cache),
            connections.clone(),
        )
        .map_err(NodeError::from)?;
        let adapters: Vec<Arc<dyn Adapter>> = vec![Arc::new(tcp), Arc::new(http)];

        let hashlog = Arc::new(RedbHashLog::open(
            data_dir.join("hashes.redb"),
            HASH_LOG_CAPACITY,
        )?);

        let keydir = Arc::new(KeyDirectory::new());
        for (alias, hex_key) in &config.friends {
            let public = PublicKey::from_hex(hex_key)
                .map_err(|_| AppError::Config(format!("friend {alias}: malformed public key")))?;
            info!(friend = %alias, fingerprint = %public.fingerprint(), "friend authorized");
            keydir.insert(public);
        }

        let node = AnonymityNode::new(
            NodeSettings {
                service_name: config.network.clone(),
                fetch_timeout: profile.fetch_timeout(),
                dedup_capacity,
            },
            client,
            queue,
            cache,
            keydir,
            hashlog,
            adapters.clone(),
        );

        let bridge = Arc::new(
            ServiceBridge::new(config.services.clone())
                .map_err(|e| AppError::Config(e.to_string()))?,
        );
        node.handle_func(tags::SERVICE, bridge.into_handler());

        let control = config.address.internal.clone().map(|bind| {
            let state = Arc::new(ControlState {
                connections,
                adapters,
                profile,
                network_fingerprint: Fingerprint::of(config.network.as_bytes()).to_hex(),
            });
            (bind, state)
        });

        Ok(Self { node, control })
    }

    /// The wired anonymity node, for embedding and tests.
    #[must_use]
    pub fn node(&self) -> &Arc<AnonymityNode> {
        &self.node
    }

    /// Run the node and (if configured) the control API until the token is
    /// cancelled or the first fatal error.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), AppError> {
        let mut tasks: JoinSet<Result<(), AppError>> = JoinSet::new();

        let node = Arc::clone(&self.node);
        let token = cancel.clone();
        tasks.spawn(async move { node.run(token).await.map_err(AppError::from) });

        if let Some((bind, state)) = self.control {
            let token = cancel.clone();
            tasks.spawn(control::serve(state, bind, token));
        }

        let mut result = Ok(());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if result.is_ok() {
                        result = Err(e);
                    }
                    cancel.cancel();
                }
                Err(e) => {
                    if result.is_ok() {
                        result = Err(AppError::Config(format!("task died: {e}")));
                    }
                    cancel.cancel();
                }
            }
        }
        result
    }
}

/// Load the node identity from `priv.key` in the data directory, creating
/// a fresh one on first start.
pub fn load_identity(data_dir: &Path) -> Result<PrivateKey, AppError> {
    let path = data_dir.join("priv.key");
    if path.exists() {
        let raw = std::fs::read_to_string(&path)?;
        return Ok(PrivateKey::from_hex(&raw)?);
    }

    let key = PrivateKey::generate();
    std::fs::write(&path, key.to_hex())?;
    info!(path = %path.display(), "generated new node identity");
    Ok(key)
}
