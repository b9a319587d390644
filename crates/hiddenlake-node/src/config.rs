//! Node configuration file and the runtime connection list.
//!
//! The service config is the node's own YAML (addresses, local services,
//! friends); the network profile YAML is separate and shared by every
//! participant — see [`hiddenlake_core::NetworkRegistry`].
//!
//! ```yaml
//! network: lake-test
//! address:
//!   external: 127.0.0.1:9581   # HTTP adapter ingress
//!   internal: 127.0.0.1:9572   # control API
//!   tcp: 127.0.0.1:9571        # TCP adapter listener
//! services:
//!   hidden-echo: 127.0.0.1:8080
//! connections:
//!   - tcp://192.168.1.5:9571
//!   - http://192.168.1.6:9581
//! friends:
//!   alice: 1f9a...be02
//! ```

use std::{
    collections::BTreeMap,
    path::Path,
    sync::{Arc, PoisonError, RwLock},
};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Bind addresses; every one is optional, an absent address disables the
/// corresponding surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addresses {
    /// HTTP adapter ingress bind.
    #[serde(default)]
    pub external: Option<String>,
    /// Control API bind.
    #[serde(default)]
    pub internal: Option<String>,
    /// TCP adapter listener bind.
    #[serde(default)]
    pub tcp: Option<String>,
}

/// The node's service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Which network profile this node joins.
    pub network: String,
    /// Bind addresses.
    #[serde(default)]
    pub address: Addresses,
    /// Local service map: request host → HTTP address behind this node.
    #[serde(default)]
    pub services: BTreeMap<String, String>,
    /// Peer addresses. `tcp://` entries belong to the TCP adapter,
    /// everything else to the HTTP adapter.
    #[serde(default)]
    pub connections: Vec<String>,
    /// Authorized peers: alias → hex public key. Seeds the key directory.
    #[serde(default)]
    pub friends: BTreeMap<String, String>,
}

impl AppConfig {
    /// Load and parse the config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_yaml::from_str(&raw)
            .map_err(|e| AppError::Config(format!("cannot parse {}: {e}", path.display())))
    }
}

/// Shared, mutable peer address list.
///
/// The adapters read it on every produce and keeper pass; the control API
/// mutates it at runtime. Additions and removals affect the next pass, no
/// restart involved.
#[derive(Clone, Default)]
pub struct ConnectionList {
    inner: Arc<RwLock<Vec<String>>>,
}

impl ConnectionList {
    /// Create a list with initial entries, deduplicated.
    #[must_use]
    pub fn new(initial: impl IntoIterator<Item = String>) -> Self {
        let list = Self::default();
        for address in initial {
            list.add(address);
        }
        list
    }

    /// Snapshot of all addresses.
    pub fn get(&self) -> Vec<String> {
        self.read().clone()
    }

    /// Add an address. Returns `false` if it was already present.
    pub fn add(&self, address: String) -> bool {
        let mut inner = self.write();
        if inner.contains(&address) {
            return false;
        }
        inner.push(address);
        true
    }

    /// Remove an address. Returns `false` if it was absent.
    pub fn remove(&self, address: &str) -> bool {
        let mut inner = self.write();
        let before = inner.len();
        inner.retain(|a| a != address);
        inner.len() != before
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<String>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<String>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scheme marker for TCP adapter peers.
pub const TCP_SCHEME: &str = "tcp://";

/// Whether a connection entry belongs to the TCP adapter.
#[must_use]
pub fn is_tcp_address(address: &str) -> bool {
    address.starts_with(TCP_SCHEME)
}

/// Strip the `tcp://` scheme for dialing.
#[must_use]
pub fn tcp_target(address: &str) -> &str {
    address.strip_prefix(TCP_SCHEME).unwrap_or(address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let raw = "\
network: lake-test
address:
  external: 127.0.0.1:9581
  internal: 127.0.0.1:9572
  tcp: 127.0.0.1:9571
services:
  hidden-echo: 127.0.0.1:8080
connections:
  - tcp://192.168.1.5:9571
  - http://192.168.1.6:9581
friends:
  alice: \"1f9a\"
";
        let config: AppConfig = serde_yaml::from_str(raw).unwrap();
        assert_eq!(config.network, "lake-test");
        assert_eq!(config.address.tcp.as_deref(), Some("127.0.0.1:9571"));
        assert_eq!(config.services.get("hidden-echo").map(String::as_str), Some("127.0.0.1:8080"));
        assert_eq!(config.connections.len(), 2);
        assert!(config.friends.contains_key("alice"));
    }

    #[test]
    fn minimal_config_needs_only_network() {
        let config: AppConfig = serde_yaml::from_str("network: lake-test\n").unwrap();
        assert!(config.address.external.is_none());
        assert!(config.connections.is_empty());
    }

    #[test]
    fn connection_list_add_remove() {
        let list = ConnectionList::new(["a".to_string(), "a".to_string(), "b".to_string()]);
        assert_eq!(list.get(), vec!["a".to_string(), "b".to_string()]);

        assert!(!list.add("a".to_string()));
        assert!(list.add("c".to_string()));
        assert!(list.remove("a"));
        assert!(!list.remove("a"));
        assert_eq!(list.get(), vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn tcp_scheme_split() {
        assert!(is_tcp_address("tcp://1.2.3.4:9571"));
        assert!(!is_tcp_address("http://1.2.3.4:9581"));
        assert_eq!(tcp_target("tcp://1.2.3.4:9571"), "1.2.3.4:9571");
        assert_eq!(tcp_target("1.2.3.4:9571"), "1.2.3.4:9571");
    }
}
