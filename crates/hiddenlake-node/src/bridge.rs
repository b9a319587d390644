//! Local service bridge: decrypted requests → locally hosted HTTP services.
//!
//! When a service-request payload arrives, its `host` field is resolved
//! against the configured `services` map and the request is replayed as a
//! plain HTTP call on the loopback side. The sender's public key travels
//! in the `Hl-Public-Key` header so the application knows who is asking
//! without ever seeing a transport address.
//!
//! The application steers the return path with `Hl-Response-Mode`:
//! `on` (or absent) carries the response back over the overlay, `off`
//! suppresses it, anything else is a configuration error answered with a
//! 502 so the remote caller is not left waiting out its fetch timeout.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use bytes::Bytes;
use hiddenlake_core::{Handler, HandlerFuture, NodeError};
use hiddenlake_crypto::PublicKey;
use hiddenlake_proto::{Request, Response};
use thiserror::Error;
use tracing::{debug, warn};

/// Header carrying the sender's hex public key to the local service.
pub const HEADER_PUBLIC_KEY: &str = "Hl-Public-Key";

/// Header the local service sets to steer the response path.
pub const HEADER_RESPONSE_MODE: &str = "Hl-Response-Mode";

/// Hop-specific response headers never carried back over the overlay.
const SKIP_HEADERS: [&str; 3] = ["date", "content-length", "hl-response-mode"];

/// Bridge failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The request names a service this node does not host.
    #[error("undefined service: {0}")]
    UndefinedService(String),

    /// The local service answered with an unknown response mode.
    #[error("invalid response mode: {0}")]
    InvalidResponseMode(String),

    /// The HTTP call to the local service failed.
    #[error("service request failed: {0}")]
    Request(String),
}

/// Maps overlay requests onto local HTTP endpoints.
pub struct ServiceBridge {
    services: BTreeMap<String, String>,
    client: reqwest::Client,
}

impl ServiceBridge {
    /// Create a bridge over the configured service map.
    pub fn new(services: BTreeMap<String, String>) -> Result<Self, BridgeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| BridgeError::Request(format!("http client: {e}")))?;
        Ok(Self { services, client })
    }

    /// Forward one request and collect the (optional) response.
    pub async fn handle(
        &self,
        sender: PublicKey,
        request: Request,
    ) -> Result<Option<Response>, BridgeError> {
        let Some(service) = self.services.get(&request.host) else {
            return Err(BridgeError::UndefinedService(request.host.clone()));
        };

        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| BridgeError::Request(format!("bad method {:?}: {e}", request.method)))?;
        let url = format!("http://{service}{}", request.path);

        let mut call = self.client.request(method, &url);
        for (key, value) in &request.head {
            call = call.header(key.as_str(), value.as_str());
        }
        call = call.header(HEADER_PUBLIC_KEY, sender.to_hex());

        let reply = call
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| BridgeError::Request(e.to_string()))?;

        let mode = reply
            .headers()
            .get(HEADER_RESPONSE_MODE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("on")
            .to_string();

        match mode.as_str() {
            "" | "on" => {
                let code = reply.status().as_u16();
                let mut head = BTreeMap::new();
                for (name, value) in reply.headers() {
                    if SKIP_HEADERS.contains(&name.as_str()) {
                        continue;
                    }
                    if let Ok(value) = value.to_str() {
                        head.insert(name.as_str().to_string(), value.to_string());
                    }
                }
                let body =
                    reply.bytes().await.map_err(|e| BridgeError::Request(e.to_string()))?;

                let mut response = Response::new(code).with_body(body);
                response.head = head;
                Ok(Some(response))
            }
            "off" => {
                debug!(service = %request.host, "response suppressed by service");
                Ok(None)
            }
            other => Err(BridgeError::InvalidResponseMode(other.to_string())),
        }
    }

    /// Adapt the bridge into the node's handler shape.
    ///
    /// Bridge failures become a 502 carried back to the caller (when a
    /// response is expected at all) so remote fetches fail fast instead of
    /// timing out.
    pub fn into_handler(self: Arc<Self>) -> Handler {
        Arc::new(move |sender, body: Bytes| -> HandlerFuture {
            let bridge = Arc::clone(&self);
            Box::pin(async move {
                let request = match Request::from_bytes(&body) {
                    Ok(request) => request,
                    Err(e) => {
                        debug!(error = %e, "undecodable service request dropped");
                        return Ok(None);
                    }
                };

                match bridge.handle(sender, request).await {
                    Ok(Some(response)) => {
                        let bytes = response.to_bytes().map_err(NodeError::Protocol)?;
                        Ok(Some(Bytes::from(bytes)))
                    }
                    Ok(None) => Ok(None),
                    Err(e) => {
                        warn!(error = %e, "service bridge failed");
                        let bytes = Response::new(502).to_bytes().map_err(NodeError::Protocol)?;
                        Ok(Some(Bytes::from(bytes)))
                    }
                }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::{Router, http::HeaderMap, routing::post};
    use hiddenlake_crypto::PrivateKey;

    use super::*;

    /// Local stub standing in for an application endpoint.
    async fn spawn_stub() -> String {
        async fn echo(headers: HeaderMap, body: Bytes) -> ([(&'static str, &'static str); 1], Bytes) {
            // The bridge must have identified the sender.
            assert!(headers.contains_key(HEADER_PUBLIC_KEY));
            ([(HEADER_RESPONSE_MODE, "on")], body)
        }
        async fn quiet() -> ([(&'static str, &'static str); 1], &'static str) {
            ([(HEADER_RESPONSE_MODE, "off")], "ignored")
        }
        async fn broken() -> ([(&'static str, &'static str); 1], &'static str) {
            ([(HEADER_RESPONSE_MODE, "sideways")], "bad mode")
        }

        let router = Router::new()
            .route("/echo", post(echo))
            .route("/quiet", post(quiet))
            .route("/broken", post(broken));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr.to_string()
    }

    fn bridge_for(addr: &str) -> ServiceBridge {
        let mut services = BTreeMap::new();
        services.insert("hidden-echo".to_string(), addr.to_string());
        ServiceBridge::new(services).unwrap()
    }

    #[tokio::test]
    async fn forwards_and_returns_response() {
        let addr = spawn_stub().await;
        let bridge = bridge_for(&addr);
        let sender = PrivateKey::generate().public();

        let request =
            Request::new("POST", "hidden-echo", "/echo").with_body(&b"round trip"[..]);
        let response = bridge.handle(sender, request).await.unwrap().unwrap();

        assert_eq!(response.code, 200);
        assert_eq!(response.body, Bytes::from_static(b"round trip"));
        // The steering header stays on this side of the overlay.
        assert!(!response.head.contains_key("hl-response-mode"));
    }

    #[tokio::test]
    async fn response_mode_off_suppresses_response() {
        let addr = spawn_stub().await;
        let bridge = bridge_for(&addr);
        let sender = PrivateKey::generate().public();

        let request = Request::new("POST", "hidden-echo", "/quiet");
        assert_eq!(bridge.handle(sender, request).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unknown_response_mode_is_an_error() {
        let addr = spawn_stub().await;
        let bridge = bridge_for(&addr);
        let sender = PrivateKey::generate().public();

        let request = Request::new("POST", "hidden-echo", "/broken");
        assert_eq!(
            bridge.handle(sender, request).await,
            Err(BridgeError::InvalidResponseMode("sideways".to_string()))
        );
    }

    #[tokio::test]
    async fn unknown_service_is_refused() {
        let addr = spawn_stub().await;
        let bridge = bridge_for(&addr);
        let sender = PrivateKey::generate().public();

        let request = Request::new("POST", "nowhere", "/echo");
        assert_eq!(
            bridge.handle(sender, request).await,
            Err(BridgeError::UndefinedService("nowhere".to_string()))
        );
    }

    #[tokio::test]
    async fn handler_wraps_bridge_errors_as_gateway_responses() {
        let addr = spawn_stub().await;
        let bridge = Arc::new(bridge_for(&addr));
        let handler = bridge.into_handler();
        let sender = PrivateKey::generate().public();

        let request = Request::new("POST", "nowhere", "/echo").to_bytes().unwrap();
        let reply = handler(sender, Bytes::from(request)).await.unwrap().unwrap();

        let response = Response::from_bytes(&reply).unwrap();
        assert_eq!(response.code, 502);
    }
}
