//! HTTP adapter: hex-frame ingress endpoint plus POST fan-out.
//!
//! Ingress serves `POST /api/network/adapter` taking one hex-encoded frame
//! per request. Status codes are part of the peer protocol:
//!
//! - `200` frame accepted
//! - `208` duplicate (dedup cache hit)
//! - `400` wrong length, bad hex, or invalid frame
//! - `405` any method but POST
//!
//! Produce posts the frame to every non-`tcp://` connection in parallel
//! with a five-second budget each; peers that answered 2xx form the online
//! set for the control plane.

use std::{
    sync::{Arc, Mutex as StdMutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::post,
};
use hiddenlake_core::{Adapter, AdapterError, DedupCache};
use hiddenlake_proto::{Frame, FrameSettings};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::config::{ConnectionList, is_tcp_address};

/// Ingress route peers POST frames to.
pub const ADAPTER_PATH: &str = "/api/network/adapter";

/// HTTP adapter tunables.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Ingress bind address; `None` makes the adapter produce-only.
    pub bind: Option<String>,
    /// Budget per peer POST.
    pub produce_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self { bind: None, produce_timeout: Duration::from_secs(5) }
    }
}

/// State shared with the axum ingress handler.
struct Ingress {
    frame: FrameSettings,
    cache: Arc<DedupCache>,
    inbound_tx: mpsc::Sender<Frame>,
}

/// HTTP transport for frames.
pub struct HttpAdapter {
    settings: HttpSettings,
    connections: ConnectionList,
    ingress: Arc<Ingress>,
    inbound_rx: Mutex<mpsc::Receiver<Frame>>,
    onlines: StdMutex<Vec<String>>,
    client: reqwest::Client,
}

const INBOUND_CHAN_SIZE: usize = 32;

impl HttpAdapter {
    /// Create the adapter.
    ///
    /// The reqwest client is built once with the produce timeout; building
    /// it cannot reasonably fail with these options, but the error is
    /// propagated rather than assumed away.
    pub fn new(
        settings: HttpSettings,
        frame: FrameSettings,
        cache: Arc<DedupCache>,
        connections: ConnectionList,
    ) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(settings.produce_timeout)
            .build()
            .map_err(|e| AdapterError::Fatal(format!("http client: {e}")))?;

        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHAN_SIZE);
        Ok(Self {
            settings,
            connections,
            ingress: Arc::new(Ingress { frame, cache, inbound_tx }),
            inbound_rx: Mutex::new(inbound_rx),
            onlines: StdMutex::new(Vec::new()),
            client,
        })
    }

    fn peer_urls(&self) -> Vec<String> {
        self.connections
            .get()
            .into_iter()
            .filter(|address| !is_tcp_address(address))
            .map(|address| {
                if address.starts_with("http://") || address.starts_with("https://") {
                    address
                } else {
                    format!("http://{address}")
                }
            })
            .collect()
    }
}

#[async_trait]
impl Adapter for HttpAdapter {
    async fn run(&self, cancel: CancellationToken) -> Result<(), AdapterError> {
        let Some(bind) = self.settings.bind.clone() else {
            cancel.cancelled().await;
            return Ok(());
        };

        let router = Router::new()
            .route(ADAPTER_PATH, post(ingress_handler))
            .with_state(Arc::clone(&self.ingress));

        let listener = tokio::net::TcpListener::bind(&bind)
            .await
            .map_err(|e| AdapterError::Fatal(format!("http bind {bind}: {e}")))?;
        info!(%bind, "http adapter listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
            .map_err(|e| AdapterError::Fatal(format!("http server: {e}")))
    }

    async fn produce(&self, cancel: &CancellationToken, frame: &Frame) -> Result<(), AdapterError> {
        let urls = self.peer_urls();
        let total = urls.len();
        if total == 0 {
            *self.onlines.lock().unwrap_or_else(PoisonError::into_inner) = Vec::new();
            return Ok(());
        }

        let body = hex::encode(frame.to_vec());
        let mut posts: JoinSet<Option<String>> = JoinSet::new();
        for url in urls {
            let client = self.client.clone();
            let body = body.clone();
            let token = cancel.clone();
            posts.spawn(async move {
                let target = format!("{url}{ADAPTER_PATH}");
                let send = client.post(&target).body(body).send();
                let response = tokio::select! {
                    () = token.cancelled() => return None,
                    response = send => response,
                };
                match response {
                    Ok(response) if response.status().is_success() => Some(url),
                    Ok(response) => {
                        debug!(peer = %url, status = %response.status(), "http produce refused");
                        None
                    }
                    Err(e) => {
                        debug!(peer = %url, error = %e, "http produce failed");
                        None
                    }
                }
            });
        }

        let mut delivered = Vec::with_capacity(total);
        while let Some(joined) = posts.join_next().await {
            if let Ok(Some(url)) = joined {
                delivered.push(url);
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
        // Stateless transport: forgetting the peer is all there is to do.
        self.onlines.lock().unwrap_or_else(PoisonError::into_inner).retain(|a| a != addr);
    }
}

/// The ingress endpoint: one hex frame per POST.
async fn ingress_handler(State(state): State<Arc<Ingress>>, body: String) -> StatusCode {
    let expected = 2 * state.frame.wire_len();
    if body.len() != expected {
        debug!(got = body.len(), expected, "http ingress length mismatch");
        return StatusCode::BAD_REQUEST;
    }

    let Ok(raw) = hex::decode(&body) else {
        debug!("http ingress body is not hex");
        return StatusCode::BAD_REQUEST;
    };

    let Ok(frame) = Frame::decode(&state.frame, &raw) else {
        debug!("http ingress frame invalid");
        return StatusCode::BAD_REQUEST;
    };

    if !state.cache.insert(frame.hash()) {
        trace!("http ingress duplicate frame");
        return StatusCode::ALREADY_REPORTED;
    }

    if state.inbound_tx.send(frame).await.is_err() {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    const MESSAGE_SIZE: usize = 128;

    fn settings() -> FrameSettings {
        FrameSettings {
            network_key: "http-test".to_string(),
            work_bits: 0,
            message_size: MESSAGE_SIZE,
        }
    }

    fn ingress() -> (Arc<Ingress>, mpsc::Receiver<Frame>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(4);
        let state = Arc::new(Ingress {
            frame: settings(),
            cache: Arc::new(DedupCache::new(std::num::NonZeroUsize::new(16).unwrap())),
            inbound_tx,
        });
        (state, inbound_rx)
    }

    fn valid_frame() -> Frame {
        Frame::construct(&settings(), Bytes::from(vec![0x11; MESSAGE_SIZE]), 3).unwrap()
    }

    #[tokio::test]
    async fn accepts_valid_frame_once() {
        let (state, mut inbound) = ingress();
        let body = hex::encode(valid_frame().to_vec());

        let first = ingress_handler(State(Arc::clone(&state)), body.clone()).await;
        assert_eq!(first, StatusCode::OK);
        assert_eq!(inbound.recv().await.unwrap().hash(), valid_frame().hash());

        let second = ingress_handler(State(state), body).await;
        assert_eq!(second, StatusCode::ALREADY_REPORTED);
    }

    #[tokio::test]
    async fn rejects_wrong_length() {
        let (state, _inbound) = ingress();
        let status = ingress_handler(State(state), "abcd".to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejects_non_hex_body() {
        let (state, _inbound) = ingress();
        let body = "z".repeat(2 * (Frame::HEAD_SIZE + MESSAGE_SIZE));
        let status = ingress_handler(State(state), body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejects_foreign_network_frame() {
        let (state, _inbound) = ingress();
        let foreign = FrameSettings { network_key: "other".to_string(), ..settings() };
        let frame = Frame::construct(&foreign, Bytes::from(vec![0x22; MESSAGE_SIZE]), 1).unwrap();

        let status = ingress_handler(State(state), hex::encode(frame.to_vec())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
