//! Queue-paced proof-of-work processor.
//!
//! Two pools feed the node's tick loop:
//!
//! - the **main pool** holds real payloads enqueued by callers, bounded so
//!   `send_payload` exerts backpressure;
//! - the **rand pool** holds pre-mined cover frames, kept saturated by
//!   background producer tasks.
//!
//! Once per tick the node takes exactly one frame: the oldest real payload
//! if any is queued (sealed and mined on the spot), else a cover from the
//! rand pool. Pre-mining covers ahead of demand means the CPU works at a
//! steady rate whether or not applications are talking — the timing side
//! channel the whole design exists to close.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use bytes::Bytes;
use hiddenlake_crypto::PublicKey;
use hiddenlake_proto::{Frame, Payload, leading_zero_bits, tags, work_digest};
use rand::{Rng, RngCore, rngs::OsRng};
use tokio::{
    sync::{Mutex, mpsc},
    task::{self, JoinSet},
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{client::MessageClient, error::NodeError};

/// Capacities and parallelism of the queue processor.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Main pool slots: real payloads awaiting their tick.
    pub main_cap: usize,
    /// Rand pool slots: pre-mined cover frames.
    pub rand_cap: usize,
    /// Background cover producer tasks.
    pub consumers: usize,
    /// Proof-of-work workers racing per frame.
    pub parallel: usize,
    /// Tick interval; exactly one frame is emitted per period.
    pub queue_period: Duration,
}

impl QueueSettings {
    /// Defaults sized for a desktop node; the period must still be set
    /// from the network profile.
    #[must_use]
    pub fn with_period(queue_period: Duration) -> Self {
        Self { main_cap: 256, rand_cap: 32, consumers: 1, parallel: 1, queue_period }
    }
}

struct QueuedPayload {
    recipient: PublicKey,
    payload: Payload,
}

/// The two-pool frame source driven by the node's tick loop.
pub struct FrameQueue {
    client: Arc<MessageClient>,
    settings: QueueSettings,
    main_tx: mpsc::Sender<QueuedPayload>,
    main_rx: Mutex<mpsc::Receiver<QueuedPayload>>,
    rand_tx: mpsc::Sender<Frame>,
    rand_rx: Mutex<mpsc::Receiver<Frame>>,
}

impl FrameQueue {
    /// Create a queue bound to one client identity and network.
    #[must_use]
    pub fn new(client: Arc<MessageClient>, settings: QueueSettings) -> Self {
        let (main_tx, main_rx) = mpsc::channel(settings.main_cap.max(1));
        let (rand_tx, rand_rx) = mpsc::channel(settings.rand_cap.max(1));
        Self {
            client,
            settings,
            main_tx,
            main_rx: Mutex::new(main_rx),
            rand_tx,
            rand_rx: Mutex::new(rand_rx),
        }
    }

    /// The tick interval this queue was configured with.
    #[must_use]
    pub fn queue_period(&self) -> Duration {
        self.settings.queue_period
    }

    /// Enqueue a real payload, waiting for a main pool slot.
    ///
    /// Success means *admitted*, not emitted: the payload leaves on some
    /// future tick.
    pub async fn enqueue(
        &self,
        cancel: &CancellationToken,
        recipient: PublicKey,
        payload: Payload,
    ) -> Result<(), NodeError> {
        let entry = QueuedPayload { recipient, payload };
        tokio::select! {
            () = cancel.cancelled() => Err(NodeError::Cancelled),
            sent = self.main_tx.send(entry) => sent.map_err(|_| NodeError::Cancelled),
        }
    }

    /// Enqueue without waiting; `PoolFull` when saturated.
    pub fn try_enqueue(&self, recipient: PublicKey, payload: Payload) -> Result<(), NodeError> {
        self.main_tx
            .try_send(QueuedPayload { recipient, payload })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => NodeError::PoolFull,
                mpsc::error::TrySendError::Closed(_) => NodeError::Cancelled,
            })
    }

    /// Take the one frame for this tick: a real frame if the main pool has
    /// an entry, else the next pre-mined cover.
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Result<Frame, NodeError> {
        let queued = {
            let mut main = self.main_rx.lock().await;
            main.try_recv().ok()
        };

        if let Some(entry) = queued {
            let ciphertext = self.client.encrypt(&entry.recipient, &entry.payload)?;
            return self.mine(cancel, ciphertext).await;
        }

        let mut rand_pool = self.rand_rx.lock().await;
        tokio::select! {
            () = cancel.cancelled() => Err(NodeError::Cancelled),
            frame = rand_pool.recv() => frame.ok_or(NodeError::Cancelled),
        }
    }

    /// Run the cover producers until cancellation.
    ///
    /// Each producer seals a payload to a throwaway recipient, mines it,
    /// and parks the frame in the rand pool, blocking while the pool is
    /// full. Saturation is the steady state.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<(), NodeError> {
        let mut producers = JoinSet::new();
        for worker in 0..self.settings.consumers.max(1) {
            let queue = Arc::clone(&self);
            let token = cancel.clone();
            producers.spawn(async move { queue.produce_covers(worker, token).await });
        }

        let mut result = Ok(());
        while let Some(joined) = producers.join_next().await {
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
                        result = Err(NodeError::Internal(format!("cover producer died: {e}")));
                    }
                    cancel.cancel();
                }
            }
        }
        result
    }

    async fn produce_covers(&self, worker: usize, cancel: CancellationToken) -> Result<(), NodeError> {
        trace!(worker, "cover producer started");
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let frame = match self.cover_frame(&cancel).await {
                Ok(frame) => frame,
                Err(NodeError::WorkFailed | NodeError::Cancelled) => return Ok(()),
                Err(e) => return Err(e),
            };

            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                sent = self.rand_tx.send(frame) => {
                    if sent.is_err() {
                        return Ok(());
                    }
                    trace!(worker, "cover frame parked");
                }
            }
        }
    }

    /// Seal and mine one cover frame for an unreachable recipient.
    async fn cover_frame(&self, cancel: &CancellationToken) -> Result<Frame, NodeError> {
        let limit = self.client.payload_limit();
        let body_len = OsRng.gen_range(0..=limit);
        let mut body = vec![0u8; body_len];
        OsRng.fill(body.as_mut_slice());

        let payload = Payload::new(tags::COVER, OsRng.next_u64(), body);
        let ciphertext = self.client.encrypt_cover(&payload)?;
        self.mine(cancel, ciphertext).await
    }

    /// Find a nonce meeting the network difficulty.
    ///
    /// `parallel` blocking workers race on strided nonce ranges; the first
    /// proof wins and stops the rest. Cancellation aborts the search with
    /// `WorkFailed`.
    async fn mine(&self, cancel: &CancellationToken, ciphertext: Bytes) -> Result<Frame, NodeError> {
        let workers = self.settings.parallel.max(1) as u64;
        let settings = self.client.frame_settings().clone();
        let stop = Arc::new(AtomicBool::new(false));
        let (found_tx, mut found_rx) = mpsc::channel::<u64>(1);

        for offset in 0..workers {
            let settings = settings.clone();
            let ciphertext = ciphertext.clone();
            let stop = Arc::clone(&stop);
            let found_tx = found_tx.clone();
            task::spawn_blocking(move || {
                let mut nonce = offset;
                while !stop.load(Ordering::Relaxed) {
                    let digest = work_digest(&settings, nonce, &ciphertext);
                    if leading_zero_bits(&digest) >= settings.work_bits {
                        stop.store(true, Ordering::Relaxed);
                        let _ = found_tx.blocking_send(nonce);
                        return;
                    }
                    nonce = nonce.wrapping_add(workers);
                }
            });
        }
        drop(found_tx);

        let nonce = tokio::select! {
            () = cancel.cancelled() => {
                stop.store(true, Ordering::Relaxed);
                debug!("proof-of-work search cancelled");
                return Err(NodeError::WorkFailed);
            }
            found = found_rx.recv() => found.ok_or(NodeError::WorkFailed)?,
        };
        stop.store(true, Ordering::Relaxed);

        Ok(Frame::construct(&settings, ciphertext, nonce)?)
    }
}

#[cfg(test)]
mod tests {
    use hiddenlake_crypto::PrivateKey;
    use hiddenlake_proto::FrameSettings;

    use super::*;

    fn make_queue(parallel: usize) -> (Arc<FrameQueue>, Arc<MessageClient>, Arc<MessageClient>) {
        let settings = FrameSettings {
            network_key: "queue-test".to_string(),
            work_bits: 4,
            message_size: 512,
        };
        let client =
            Arc::new(MessageClient::new(PrivateKey::generate(), settings.clone()).unwrap());
        let peer = Arc::new(MessageClient::new(PrivateKey::generate(), settings).unwrap());

        let mut queue_settings = QueueSettings::with_period(Duration::from_millis(50));
        queue_settings.rand_cap = 4;
        queue_settings.parallel = parallel;
        let queue = Arc::new(FrameQueue::new(Arc::clone(&client), queue_settings));
        (queue, client, peer)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn covers_flow_when_idle() {
        let (queue, _, peer) = make_queue(1);
        let cancel = CancellationToken::new();
        let producer = tokio::spawn(Arc::clone(&queue).run(cancel.clone()));

        for _ in 0..3 {
            let frame = queue.dequeue(&cancel).await.unwrap();
            assert!(frame.meets_work(4));
            // Covers are sealed to a discarded key; no real node opens them.
            assert!(peer.decrypt(frame.ciphertext()).is_err());
        }

        cancel.cancel();
        producer.await.unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn real_payload_takes_priority() {
        let (queue, client, peer) = make_queue(2);
        let cancel = CancellationToken::new();
        let producer = tokio::spawn(Arc::clone(&queue).run(cancel.clone()));

        // Let the rand pool fill, then enqueue a real payload.
        let warmup = queue.dequeue(&cancel).await.unwrap();
        assert!(warmup.meets_work(4));

        let payload = Payload::new(tags::SERVICE, 1, &b"real"[..]);
        queue.enqueue(&cancel, peer.public(), payload.clone()).await.unwrap();

        let frame = queue.dequeue(&cancel).await.unwrap();
        assert!(frame.meets_work(4));
        let (sender, opened) = peer.decrypt(frame.ciphertext()).unwrap();
        assert_eq!(sender, client.public());
        assert_eq!(opened, payload);

        cancel.cancel();
        producer.await.unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn try_enqueue_reports_saturation() {
        let settings = FrameSettings {
            network_key: "queue-test".to_string(),
            work_bits: 1,
            message_size: 512,
        };
        let client =
            Arc::new(MessageClient::new(PrivateKey::generate(), settings.clone()).unwrap());
        let peer = MessageClient::new(PrivateKey::generate(), settings).unwrap();

        let mut queue_settings = QueueSettings::with_period(Duration::from_millis(50));
        queue_settings.main_cap = 1;
        let queue = FrameQueue::new(client, queue_settings);

        let payload = Payload::new(tags::SERVICE, 1, &b"x"[..]);
        queue.try_enqueue(peer.public(), payload.clone()).unwrap();
        assert!(matches!(
            queue.try_enqueue(peer.public(), payload),
            Err(NodeError::PoolFull)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cancelled_mining_reports_work_failed() {
        let settings = FrameSettings {
            network_key: "queue-test".to_string(),
            // High enough that the search cannot finish before cancellation.
            work_bits: 240,
            message_size: 512,
        };
        let client =
            Arc::new(MessageClient::new(PrivateKey::generate(), settings.clone()).unwrap());
        let peer = MessageClient::new(PrivateKey::generate(), settings).unwrap();

        let queue = Arc::new(FrameQueue::new(
            Arc::clone(&client),
            QueueSettings::with_period(Duration::from_millis(50)),
        ));

        let cancel = CancellationToken::new();
        queue
            .enqueue(&cancel, peer.public(), Payload::new(tags::SERVICE, 1, &b"x"[..]))
            .await
            .unwrap();

        let dequeue = {
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.dequeue(&cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        assert!(matches!(dequeue.await.unwrap(), Err(NodeError::WorkFailed)));
    }
}
