//! TCP adapter: connection keeper plus raw fixed-size frame streams.
//!
//! Frames travel as exactly `mac + nonce + message_size` raw bytes with no
//! length prefix — both ends know the size from the network profile, so a
//! reader that loses sync has no way back and the connection is dropped.
//!
//! A keeper task redials missing `tcp://` peers every `keeper_period`; a
//! listener accepts inbound connections up to `max_connects`, closing the
//! overage immediately so the limit holds no matter how dials race. Every
//! live connection gets a depth-one send channel: one frame in flight per
//! peer, which preserves per-peer order and pushes backpressure up to the
//! dispatch loop instead of buffering unboundedly.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex as StdMutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use hiddenlake_core::{Adapter, AdapterError, DedupCache};
use hiddenlake_proto::{Frame, FrameSettings};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream, tcp::OwnedWriteHalf},
    sync::{Mutex, mpsc},
    task::JoinSet,
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::{ConnectionList, is_tcp_address, tcp_target};

/// TCP adapter tunables.
#[derive(Debug, Clone)]
pub struct TcpSettings {
    /// Listener bind address; `None` disables inbound connections.
    pub bind: Option<String>,
    /// Inbound connection cap; the overage is accepted and closed.
    pub max_connects: usize,
    /// How often the keeper redials missing peers.
    pub keeper_period: Duration,
    /// Dial budget per peer.
    pub dial_timeout: Duration,
    /// Write budget per frame; a stalled peer fails its send.
    pub write_timeout: Duration,
}

impl Default for TcpSettings {
    fn default() -> Self {
        Self {
            bind: None,
            max_connects: 128,
            keeper_period: Duration::from_secs(10),
            dial_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
        }
    }
}

struct PeerHandle {
    tx: mpsc::Sender<Frame>,
    writer_abort: tokio::task::AbortHandle,
    reader_abort: tokio::task::AbortHandle,
}

type PeerMap = HashMap<String, PeerHandle>;

/// Connection-keeping TCP transport.
pub struct TcpAdapter {
    settings: TcpSettings,
    frame: FrameSettings,
    cache: Arc<DedupCache>,
    connections: ConnectionList,
    listener: StdMutex<Option<std::net::TcpListener>>,
    local_addr: Option<SocketAddr>,
    peers: Arc<StdMutex<PeerMap>>,
    inbound_tx: mpsc::Sender<Frame>,
    inbound_rx: Mutex<mpsc::Receiver<Frame>>,
    onlines: StdMutex<Vec<String>>,
}

const INBOUND_CHAN_SIZE: usize = 32;

impl TcpAdapter {
    /// Create the adapter, binding the listener eagerly so bind failures
    /// surface at init and the bound port is known to callers.
    pub fn new(
        settings: TcpSettings,
        frame: FrameSettings,
        cache: Arc<DedupCache>,
        connections: ConnectionList,
    ) -> Result<Self, AdapterError> {
        let listener = match &settings.bind {
            Some(bind) => {
                let listener = std::net::TcpListener::bind(bind)
                    .map_err(|e| AdapterError::Fatal(format!("tcp bind {bind}: {e}")))?;
                listener
                    .set_nonblocking(true)
                    .map_err(|e| AdapterError::Fatal(format!("tcp bind {bind}: {e}")))?;
                Some(listener)
            }
            None => None,
        };
        let local_addr = listener.as_ref().and_then(|l| l.local_addr().ok());

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHAN_SIZE);
        Ok(Self {
            settings,
            frame,
            cache,
            connections,
            listener: StdMutex::new(listener),
            local_addr,
            peers: Arc::new(StdMutex::new(HashMap::new())),
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            onlines: StdMutex::new(Vec::new()),
        })
    }

    /// The bound listener address, if a listener was configured.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn lock_peers(&self) -> std::sync::MutexGuard<'_, PeerMap> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a live connection and spawn its reader/writer tasks.
    fn attach(
        &self,
        name: String,
        stream: TcpStream,
        tasks: &mut JoinSet<()>,
        cancel: &CancellationToken,
    ) {
        let (read_half, write_half) = stream.into_split();
        let (send_tx, send_rx) = mpsc::channel::<Frame>(1);

        let writer_abort = tasks.spawn(writer_loop(
            write_half,
            send_rx,
            self.settings.write_timeout,
            cancel.clone(),
        ));

        let reader_cancel = cancel.clone();
        let reader_peers = Arc::clone(&self.peers);
        let reader_name = name.clone();
        let frame = self.frame.clone();
        let cache = Arc::clone(&self.cache);
        let inbound = self.inbound_tx.clone();
        let reader_abort = tasks.spawn(async move {
            reader_loop(read_half, &frame, &cache, &inbound, &reader_cancel).await;
            // Reader gone means the connection is dead either way.
            reader_peers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&reader_name);
            trace!(peer = %reader_name, "tcp connection closed");
        });

        self.lock_peers().insert(name, PeerHandle { tx: send_tx, writer_abort, reader_abort });
    }

    /// Dial every configured `tcp://` peer we are not already holding.
    async fn keeper_pass(&self, tasks: &mut JoinSet<()>, cancel: &CancellationToken) {
        for address in self.connections.get() {
            if !is_tcp_address(&address) {
                continue;
            }
            if self.lock_peers().contains_key(&address) {
                continue;
            }
            match timeout(self.settings.dial_timeout, TcpStream::connect(tcp_target(&address)))
                .await
            {
                Ok(Ok(stream)) => {
                    debug!(peer = %address, "tcp peer dialed");
                    self.attach(address, stream, tasks, cancel);
                }
                Ok(Err(e)) => debug!(peer = %address, error = %e, "tcp dial failed"),
                Err(_) => debug!(peer = %address, "tcp dial timed out"),
            }
        }
    }
}

#[async_trait]
impl Adapter for TcpAdapter {
    async fn run(&self, cancel: CancellationToken) -> Result<(), AdapterError> {
        let mut tasks: JoinSet<()> = JoinSet::new();

        let listener = self.listener.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(listener) = listener {
            let listener = TcpListener::from_std(listener)
                .map_err(|e| AdapterError::Fatal(format!("tcp listener: {e}")))?;
            info!(addr = ?self.local_addr, "tcp adapter listening");

            loop {
                self.keeper_pass(&mut tasks, &cancel).await;

                // Accept until the next keeper tick.
                let keeper_tick = tokio::time::sleep(self.settings.keeper_period);
                tokio::pin!(keeper_tick);
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => {
                            tasks.abort_all();
                            return Ok(());
                        }
                        () = &mut keeper_tick => break,
                        accepted = listener.accept() => match accepted {
                            Ok((stream, remote)) => {
                                if self.lock_peers().len() >= self.settings.max_connects {
                                    debug!(%remote, "tcp connection over limit, refused");
                                    drop(stream);
                                    continue;
                                }
                                debug!(%remote, "tcp connection accepted");
                                self.attach(remote.to_string(), stream, &mut tasks, &cancel);
                            }
                            Err(e) => {
                                warn!(error = %e, "tcp accept failed");
                            }
                        }
                    }
                }
            }
        } else {
            // Outbound-only mode: keeper without a listener.
            loop {
                self.keeper_pass(&mut tasks, &cancel).await;
                tokio::select! {
                    () = cancel.cancelled() => {
                        tasks.abort_all();
                        return Ok(());
                    }
                    () = tokio::time::sleep(self.settings.keeper_period) => {}
                }
            }
        }
    }

    async fn produce(&self, cancel: &CancellationToken, frame: &Frame) -> Result<(), AdapterError> {
        let targets: Vec<(String, mpsc::Sender<Frame>)> = self
            .lock_peers()
            .iter()
            .map(|(name, handle)| (name.clone(), handle.tx.clone()))
            .collect();

        let total = targets.len();
        let mut delivered = Vec::with_capacity(total);
        for (name, tx) in targets {
            if cancel.is_cancelled() {
                return Err(AdapterError::Cancelled);
            }
            // Depth-one channel: waiting here is the per-peer backpressure.
            match timeout(self.settings.write_timeout, tx.send(frame.clone())).await {
                Ok(Ok(())) => delivered.push(name),
                Ok(Err(_)) => debug!(peer = %name, "tcp peer gone before send"),
                Err(_) => debug!(peer = %name, "tcp peer send buffer stalled"),
            }
        }

        let accepted = delivered.len();
        *self.onlines.lock().unwrap_or_else(PoisonError::into_inner) = delivered;

        if accepted < total {
            return Err(AdapterError::Broadcast { delivered: accepted, total });
        }
        Ok(())
    }

    async fn consume(&self, cancel: &CancellationToken) -> Result<Frame, AdapterError> {
        let mut inbound = self.inbound_rx.lock().await;
        tokio::select! {
            () = cancel.cancelled() => Err(AdapterError::Cancelled),
            frame = inbound.recv() => frame.ok_or(AdapterError::Cancelled),
        }
    }

    fn onlines(&self) -> Vec<String> {
        self.onlines.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    async fn disconnect(&self, addr: &str) {
        if let Some(handle) = self.lock_peers().remove(addr) {
            handle.writer_abort.abort();
            handle.reader_abort.abort();
            info!(peer = %addr, "tcp peer disconnected by operator");
        }
    }
}

/// Drain the per-peer send channel onto the socket.
async fn writer_loop(
    mut write_half: OwnedWriteHalf,
    mut send_rx: mpsc::Receiver<Frame>,
    write_timeout: Duration,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => return,
            frame = send_rx.recv() => match frame {
                Some(frame) => frame,
                None => return,
            },
        };
        let wire = frame.to_vec();
        match timeout(write_timeout, write_half.write_all(&wire)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(error = %e, "tcp write failed");
                return;
            }
            Err(_) => {
                debug!("tcp write timed out");
                return;
            }
        }
    }
}

/// Read fixed-size frames until the peer closes or sends garbage.
async fn reader_loop(
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    settings: &FrameSettings,
    cache: &Arc<DedupCache>,
    inbound: &mpsc::Sender<Frame>,
    cancel: &CancellationToken,
) {
    let wire_len = settings.wire_len();
    let mut buf = vec![0u8; wire_len];

    loop {
        let read = tokio::select! {
            () = cancel.cancelled() => return,
            read = read_half.read_exact(&mut buf) => read,
        };
        if let Err(e) = read {
            trace!(error = %e, "tcp read ended");
            return;
        }

        // Malformed wire input means a desynced or foreign peer; there is
        // no way to resynchronize an unframed stream, so hang up.
        let Ok(frame) = Frame::decode(settings, &buf) else {
            debug!("invalid tcp frame, dropping connection");
            return;
        };

        if !cache.insert(frame.hash()) {
            trace!("duplicate tcp frame dropped");
            continue;
        }

        if inbound.send(frame).await.is_err() {
            return;
        }
    }
}
