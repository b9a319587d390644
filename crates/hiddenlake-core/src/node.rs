//! The anonymity node: glue between queue, adapters, handlers and storage.
//!
//! Outbound, the dispatch loop wakes once per queue period, takes exactly
//! one frame from the [`FrameQueue`] and fans it to every adapter. Inbound,
//! one ingest task per adapter feeds the decrypt/dispatch pipeline:
//!
//! 1. the adapter has already admitted the frame through the shared dedup
//!    cache;
//! 2. the hash is recorded in the durable log — a replay that outlives the
//!    cache dies here;
//! 3. a decrypt attempt with the node's own key — covers and frames for
//!    other nodes fail opaquely and are dropped without a word;
//! 4. the sender's fingerprint must be in the key directory, otherwise the
//!    frame is dropped exactly like a cover;
//! 5. the payload tag routes to a registered handler (service requests) or
//!    to the correlation table (fetch responses).
//!
//! Fetch round-trips pair a request with its response through a 64-bit
//! correlation nonce drawn from the OS RNG; nonce zero is reserved for
//! one-way sends, which expect nothing back.

use std::{
    collections::HashMap,
    future::Future,
    num::NonZeroUsize,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError, RwLock},
    time::Duration,
};

use bytes::Bytes;
use hiddenlake_crypto::PublicKey;
use hiddenlake_proto::{Payload, tags};
use rand::{RngCore, rngs::OsRng};
use tokio::{sync::oneshot, task::JoinSet, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    adapter::Adapter,
    cache::DedupCache,
    client::MessageClient,
    error::NodeError,
    hashlog::HashLog,
    keydir::KeyDirectory,
    queue::FrameQueue,
};

/// Future returned by a payload handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Option<Bytes>, NodeError>> + Send>>;

/// A handler for decrypted payloads of one tag.
///
/// Receives the authenticated sender key and the request bytes; returns
/// the response bytes to carry back, or `None` for fire-and-forget.
pub type Handler = Arc<dyn Fn(PublicKey, Bytes) -> HandlerFuture + Send + Sync>;

/// Correlation nonce width prefixed to every real payload body.
const NONCE_SIZE: usize = 8;

/// Node-level tunables beyond the network profile.
#[derive(Debug, Clone)]
pub struct NodeSettings {
    /// Short name used in log lines.
    pub service_name: String,
    /// Budget for one fetch round-trip, from the network profile.
    pub fetch_timeout: Duration,
    /// Dedup cache capacity.
    pub dedup_capacity: NonZeroUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
    Stopped,
}

/// The anonymity node.
///
/// Owns the queue processor, the correlation table and the handler
/// registry; shares the dedup cache with its adapters and the key
/// directory with its editors. One `run` per node instance.
pub struct AnonymityNode {
    settings: NodeSettings,
    client: Arc<MessageClient>,
    queue: Arc<FrameQueue>,
    cache: Arc<DedupCache>,
    keydir: Arc<KeyDirectory>,
    hashlog: Arc<dyn HashLog>,
    adapters: Vec<Arc<dyn Adapter>>,
    handlers: RwLock<HashMap<u32, Handler>>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Bytes>>>,
    state: Mutex<RunState>,
}

impl AnonymityNode {
    /// Assemble a node from its collaborators.
    ///
    /// The cache handed in here must be the same one the adapters admit
    /// inbound frames through; see the [`Adapter`] dedup contract.
    #[must_use]
    pub fn new(
        settings: NodeSettings,
        client: Arc<MessageClient>,
        queue: Arc<FrameQueue>,
        cache: Arc<DedupCache>,
        keydir: Arc<KeyDirectory>,
        hashlog: Arc<dyn HashLog>,
        adapters: Vec<Arc<dyn Adapter>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            settings,
            client,
            queue,
            cache,
            keydir,
            hashlog,
            adapters,
            handlers: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            state: Mutex::new(RunState::Idle),
        })
    }

    /// This node's public identity.
    #[must_use]
    pub fn public(&self) -> PublicKey {
        self.client.public()
    }

    /// The shared key directory (friends list).
    #[must_use]
    pub fn key_directory(&self) -> &Arc<KeyDirectory> {
        &self.keydir
    }

    /// The shared dedup cache, for adapter construction.
    #[must_use]
    pub fn dedup_cache(&self) -> &Arc<DedupCache> {
        &self.cache
    }

    /// Attached adapters.
    #[must_use]
    pub fn adapters(&self) -> &[Arc<dyn Adapter>] {
        &self.adapters
    }

    /// Largest body a payload may carry on this network.
    #[must_use]
    pub fn payload_limit(&self) -> usize {
        // The correlation nonce rides inside the body.
        self.client.payload_limit().saturating_sub(NONCE_SIZE)
    }

    /// Register a handler for one payload tag. Replaces any previous one.
    pub fn handle_func(&self, tag: u32, handler: Handler) {
        self.write_handlers().insert(tag, handler);
    }

    /// Enqueue a one-way payload, waiting for a main pool slot.
    ///
    /// Success means the payload was admitted, not emitted or delivered.
    pub async fn send_payload(
        &self,
        cancel: &CancellationToken,
        recipient: PublicKey,
        payload: Payload,
    ) -> Result<(), NodeError> {
        self.ensure_running()?;
        let framed = self.with_nonce(0, &payload);
        self.queue.enqueue(cancel, recipient, framed).await
    }

    /// Enqueue a one-way payload without waiting; `PoolFull` on saturation.
    pub fn try_send_payload(
        &self,
        recipient: PublicKey,
        payload: Payload,
    ) -> Result<(), NodeError> {
        self.ensure_running()?;
        let framed = self.with_nonce(0, &payload);
        self.queue.try_enqueue(recipient, framed)
    }

    /// Round-trip: enqueue a request and wait for the correlated response.
    ///
    /// Fails with `Timeout` after the configured fetch timeout and with
    /// `Cancelled` if the token fires first; either way the correlation
    /// entry is gone before this returns.
    pub async fn fetch_payload(
        &self,
        cancel: &CancellationToken,
        recipient: PublicKey,
        payload: Payload,
    ) -> Result<Bytes, NodeError> {
        self.ensure_running()?;

        let nonce = self.fresh_nonce();
        let (done_tx, done_rx) = oneshot::channel();
        {
            let mut pending = self.lock_pending();
            if pending.contains_key(&nonce) {
                return Err(NodeError::CorrelationInUse);
            }
            pending.insert(nonce, done_tx);
        }

        let framed = self.with_nonce(nonce, &payload);
        if let Err(e) = self.queue.enqueue(cancel, recipient, framed).await {
            self.lock_pending().remove(&nonce);
            return Err(e);
        }

        let timeout = self.settings.fetch_timeout;
        let outcome = tokio::select! {
            () = cancel.cancelled() => Err(NodeError::Cancelled),
            waited = tokio::time::timeout(timeout, done_rx) => match waited {
                Err(_) => Err(NodeError::Timeout(timeout)),
                Ok(Err(_)) => Err(NodeError::Cancelled),
                Ok(Ok(bytes)) => Ok(bytes),
            },
        };
        if outcome.is_err() {
            self.lock_pending().remove(&nonce);
        }
        outcome
    }

    /// Run the node: adapters, ingest loops, cover producers, dispatch.
    ///
    /// Returns when the token is cancelled (with `Ok`) or on the first
    /// fatal error from any component. A second call fails with
    /// `AlreadyRunning`; a node never runs twice.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<(), NodeError> {
        {
            let mut state = self.lock_state();
            if *state != RunState::Idle {
                return Err(NodeError::AlreadyRunning);
            }
            *state = RunState::Running;
        }
        info!(service = %self.settings.service_name, "anonymity node starting");

        let result = Self::run_inner(&self, &cancel).await;

        *self.lock_state() = RunState::Stopped;
        self.lock_pending().clear();
        info!(service = %self.settings.service_name, "anonymity node stopped");
        result
    }

    async fn run_inner(node: &Arc<Self>, cancel: &CancellationToken) -> Result<(), NodeError> {
        let child = cancel.child_token();
        let mut tasks: JoinSet<Result<(), NodeError>> = JoinSet::new();

        for adapter in &node.adapters {
            let transport = Arc::clone(adapter);
            let token = child.clone();
            tasks.spawn(async move { transport.run(token).await.map_err(NodeError::from) });

            let this = Arc::clone(node);
            let transport = Arc::clone(adapter);
            let token = child.clone();
            tasks.spawn(async move { this.ingest_loop(transport, token).await });
        }

        let queue = Arc::clone(&node.queue);
        let token = child.clone();
        tasks.spawn(queue.run(token));

        let this = Arc::clone(node);
        let token = child.clone();
        tasks.spawn(async move { this.dispatch_loop(token).await });

        let mut result = Ok(());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if result.is_ok() {
                        warn!(error = %e, "node component failed, shutting down");
                        result = Err(e);
                    }
                    child.cancel();
                }
                Err(e) => {
                    if result.is_ok() {
                        result = Err(NodeError::Internal(format!("node task died: {e}")));
                    }
                    child.cancel();
                }
            }
        }
        result
    }

    /// Emit exactly one frame per tick to every adapter.
    async fn dispatch_loop(self: Arc<Self>, cancel: CancellationToken) -> Result<(), NodeError> {
        let mut ticker = tokio::time::interval(self.queue.queue_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }

            let frame = match self.queue.dequeue(&cancel).await {
                Ok(frame) => frame,
                Err(NodeError::Cancelled | NodeError::WorkFailed) => return Ok(()),
                Err(e) => return Err(e),
            };

            // Egress dedup: never re-emit a frame this node already saw.
            if !self.cache.insert(frame.hash()) {
                debug!("egress frame already known, skipping tick");
                continue;
            }

            for adapter in &self.adapters {
                match adapter.produce(&cancel, &frame).await {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => debug!(error = %e, "partial broadcast"),
                }
            }
            trace!(proof = frame.proof(), "frame dispatched");
        }
    }

    /// Feed one adapter's inbound frames through the ingest pipeline.
    async fn ingest_loop(
        self: Arc<Self>,
        adapter: Arc<dyn Adapter>,
        cancel: CancellationToken,
    ) -> Result<(), NodeError> {
        loop {
            let frame = match adapter.consume(&cancel).await {
                Ok(frame) => frame,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(_) => {
                    if cancel.is_cancelled() {
                        return Ok(());
                    }
                    continue;
                }
            };
            self.ingest_frame(frame.hash(), frame.ciphertext().clone()).await?;
        }
    }

    async fn ingest_frame(&self, hash: &[u8; 32], ciphertext: Bytes) -> Result<(), NodeError> {
        // The adapter admitted the frame through the dedup cache; the
        // durable log is the gate that survives restarts.
        match self.hashlog.insert(hash) {
            Ok(true) => {}
            Ok(false) => {
                debug!("frame hash already logged, dropping replay");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        // Covers and frames for other nodes fail here, silently and alike.
        let Ok((sender, payload)) = self.client.decrypt(&ciphertext) else {
            trace!("frame does not open with our key");
            return Ok(());
        };

        if !self.keydir.contains(&sender.fingerprint()) {
            debug!("payload from unlisted sender dropped");
            return Ok(());
        }

        self.dispatch_payload(sender, payload).await;
        Ok(())
    }

    async fn dispatch_payload(&self, sender: PublicKey, payload: Payload) {
        let body = payload.body;
        if body.len() < NONCE_SIZE {
            debug!(tag = payload.tag, "payload body shorter than its nonce, dropped");
            return;
        }
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes.copy_from_slice(&body[..NONCE_SIZE]);
        let nonce = u64::from_be_bytes(nonce_bytes);
        let inner = body.slice(NONCE_SIZE..);

        if payload.tag == tags::RESPONSE {
            match self.lock_pending().remove(&nonce) {
                Some(done) => {
                    let _ = done.send(inner);
                }
                None => debug!("fetch response without a pending correlation, dropped"),
            }
            return;
        }

        let handler = self.read_handlers().get(&payload.tag).map(Arc::clone);
        let Some(handler) = handler else {
            debug!(tag = payload.tag, "no handler for tag, payload dropped");
            return;
        };

        let response = match handler(sender, inner).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "handler failed");
                return;
            }
        };

        // A response goes back only for fetches; nonce zero is one-way.
        let (Some(bytes), true) = (response, nonce != 0) else {
            return;
        };
        let salt = self.fresh_salt();
        let mut reply = Vec::with_capacity(NONCE_SIZE + bytes.len());
        reply.extend_from_slice(&nonce.to_be_bytes());
        reply.extend_from_slice(&bytes);

        if let Err(e) =
            self.queue.try_enqueue(sender, Payload::new(tags::RESPONSE, salt, reply))
        {
            warn!(error = %e, "could not enqueue fetch response");
        }
    }

    fn with_nonce(&self, nonce: u64, payload: &Payload) -> Payload {
        let mut body = Vec::with_capacity(NONCE_SIZE + payload.body.len());
        body.extend_from_slice(&nonce.to_be_bytes());
        body.extend_from_slice(&payload.body);
        Payload::new(payload.tag, self.fresh_salt(), body)
    }

    fn fresh_nonce(&self) -> u64 {
        loop {
            let nonce = OsRng.next_u64();
            if nonce != 0 {
                return nonce;
            }
        }
    }

    fn fresh_salt(&self) -> u64 {
        OsRng.next_u64()
    }

    fn ensure_running(&self) -> Result<(), NodeError> {
        match *self.lock_state() {
            RunState::Running => Ok(()),
            RunState::Idle | RunState::Stopped => Err(NodeError::NotRunning),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<Bytes>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_handlers(&self) -> std::sync::RwLockReadGuard<'_, HashMap<u32, Handler>> {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_handlers(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<u32, Handler>> {
        self.handlers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of fetches awaiting their response, for observability.
    #[must_use]
    pub fn pending_fetches(&self) -> usize {
        self.lock_pending().len()
    }
}
