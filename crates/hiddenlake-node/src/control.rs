//! Operator control API.
//!
//! A small path → handler table over the node's runtime state:
//!
//! - `GET|POST|DELETE /api/config/connections` — list / add / remove peers
//! - `GET|DELETE /api/network/online` — list / disconnect live peers
//! - `GET /api/config/settings` — read the network parameters
//!
//! Read-only where it can be; the only mutations are the connection list
//! (picked up on the adapters' next pass) and explicit disconnects. The
//! network key itself is never exposed, only its fingerprint.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::get,
};
use hiddenlake_core::{Adapter, NetworkProfile};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{config::ConnectionList, error::AppError};

/// Everything the control surface can see or touch.
pub struct ControlState {
    /// Peer list shared with the adapters.
    pub connections: ConnectionList,
    /// Attached adapters, for online sets and disconnects.
    pub adapters: Vec<Arc<dyn Adapter>>,
    /// Profile of the joined network.
    pub profile: NetworkProfile,
    /// Hex fingerprint of the network key.
    pub network_fingerprint: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct AddressBody {
    address: String,
}

#[derive(Debug, Serialize)]
struct SettingsView {
    message_size_bytes: u64,
    work_size_bits: u64,
    network_key: String,
}

/// Build the control router.
pub fn router(state: Arc<ControlState>) -> Router {
    Router::new()
        .route(
            "/api/config/connections",
            get(list_connections).post(add_connection).delete(remove_connection),
        )
        .route("/api/network/online", get(list_online).delete(disconnect_online))
        .route("/api/config/settings", get(read_settings))
        .with_state(state)
}

/// Serve the control API until cancellation.
pub async fn serve(
    state: Arc<ControlState>,
    bind: String,
    cancel: CancellationToken,
) -> Result<(), AppError> {
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(%bind, "control api listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    Ok(())
}

async fn list_connections(State(state): State<Arc<ControlState>>) -> Json<Vec<String>> {
    Json(state.connections.get())
}

async fn add_connection(
    State(state): State<Arc<ControlState>>,
    Json(body): Json<AddressBody>,
) -> StatusCode {
    if state.connections.add(body.address) {
        StatusCode::CREATED
    } else {
        StatusCode::CONFLICT
    }
}

async fn remove_connection(
    State(state): State<Arc<ControlState>>,
    Json(body): Json<AddressBody>,
) -> StatusCode {
    if state.connections.remove(&body.address) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn list_online(State(state): State<Arc<ControlState>>) -> Json<Vec<String>> {
    let mut online = Vec::new();
    for adapter in &state.adapters {
        online.extend(adapter.onlines());
    }
    online.sort();
    online.dedup();
    Json(online)
}

async fn disconnect_online(
    State(state): State<Arc<ControlState>>,
    Json(body): Json<AddressBody>,
) -> StatusCode {
    for adapter in &state.adapters {
        adapter.disconnect(&body.address).await;
    }
    StatusCode::OK
}

async fn read_settings(State(state): State<Arc<ControlState>>) -> Json<SettingsView> {
    Json(SettingsView {
        message_size_bytes: state.profile.message_size_bytes,
        work_size_bits: state.profile.work_size_bits,
        network_key: state.network_fingerprint.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> Arc<ControlState> {
        Arc::new(ControlState {
            connections: ConnectionList::new(["tcp://1.2.3.4:9571".to_string()]),
            adapters: Vec::new(),
            profile: NetworkProfile {
                message_size_bytes: 8192,
                fetch_timeout_ms: 60000,
                queue_period_ms: 5000,
                work_size_bits: 10,
                connections: Vec::new(),
            },
            network_fingerprint: "feed".to_string(),
        })
    }

    #[tokio::test]
    async fn connection_edits_round_trip() {
        let state = state();

        let added = add_connection(
            State(Arc::clone(&state)),
            Json(AddressBody { address: "tcp://5.6.7.8:9571".to_string() }),
        )
        .await;
        assert_eq!(added, StatusCode::CREATED);

        let duplicate = add_connection(
            State(Arc::clone(&state)),
            Json(AddressBody { address: "tcp://5.6.7.8:9571".to_string() }),
        )
        .await;
        assert_eq!(duplicate, StatusCode::CONFLICT);

        let listed = list_connections(State(Arc::clone(&state))).await;
        assert_eq!(listed.0.len(), 2);

        let removed = remove_connection(
            State(Arc::clone(&state)),
            Json(AddressBody { address: "tcp://1.2.3.4:9571".to_string() }),
        )
        .await;
        assert_eq!(removed, StatusCode::OK);

        let missing = remove_connection(
            State(state),
            Json(AddressBody { address: "tcp://1.2.3.4:9571".to_string() }),
        )
        .await;
        assert_eq!(missing, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn settings_expose_fingerprint_not_key() {
        let view = read_settings(State(state())).await;
        assert_eq!(view.0.message_size_bytes, 8192);
        assert_eq!(view.0.work_size_bits, 10);
        assert_eq!(view.0.network_key, "feed");
    }
}
