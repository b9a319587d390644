//! Network profiles: the per-mesh parameters all participants agree on.
//!
//! Loaded once from YAML at startup and passed by reference — there is no
//! process-wide global. The profile name doubles as the network key, so
//! "same name" and "same MAC secret" cannot drift apart.
//!
//! ```yaml
//! networks:
//!   lake-1:
//!     message_size_bytes: 8192
//!     fetch_timeout_ms: 60000
//!     queue_period_ms: 5000
//!     work_size_bits: 10
//!     connections:
//!       - tcp://94.103.91.81:9581
//! ```

use std::{collections::BTreeMap, time::Duration};

use hiddenlake_crypto::ENVELOPE_OVERHEAD;
use hiddenlake_proto::{FrameSettings, Payload};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Profile loading and validation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProfileError {
    /// The YAML document failed to parse.
    #[error("profile parse error: {0}")]
    Parse(String),

    /// A named network is absent from the registry.
    #[error("unknown network: {0}")]
    Unknown(String),

    /// A profile carries values the node cannot run with.
    #[error("network {name}: {reason}")]
    Invalid {
        /// Network name.
        name: String,
        /// Human-readable validation failure.
        reason: String,
    },
}

/// Parameters of one mesh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkProfile {
    /// Fixed ciphertext size; every frame on the wire carries exactly this
    /// many payload bytes.
    pub message_size_bytes: u64,
    /// Fetch round-trip budget.
    pub fetch_timeout_ms: u64,
    /// Tick interval: exactly one frame is emitted per period.
    pub queue_period_ms: u64,
    /// Proof-of-work difficulty in leading zero bits.
    pub work_size_bits: u64,
    /// Bootstrap peer addresses.
    #[serde(default)]
    pub connections: Vec<String>,
}

impl NetworkProfile {
    /// Fetch timeout as a [`Duration`].
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Queue period as a [`Duration`].
    #[must_use]
    pub fn queue_period(&self) -> Duration {
        Duration::from_millis(self.queue_period_ms)
    }

    /// Frame validation settings, keyed by the network name.
    #[must_use]
    pub fn frame_settings(&self, network_key: &str) -> FrameSettings {
        FrameSettings {
            network_key: network_key.to_string(),
            work_bits: u32::try_from(self.work_size_bits).unwrap_or(u32::MAX),
            message_size: self.message_size_bytes as usize,
        }
    }

    /// Check the profile is runnable.
    pub fn validate(&self, name: &str) -> Result<(), ProfileError> {
        let invalid = |reason: String| ProfileError::Invalid { name: name.to_string(), reason };

        let floor = (ENVELOPE_OVERHEAD + Payload::OVERHEAD) as u64;
        if self.message_size_bytes <= floor {
            return Err(invalid(format!(
                "message_size_bytes {} leaves no room for a payload (envelope floor {})",
                self.message_size_bytes, floor,
            )));
        }
        if self.queue_period_ms == 0 {
            return Err(invalid("queue_period_ms must be non-zero".to_string()));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(invalid("fetch_timeout_ms must be non-zero".to_string()));
        }
        if self.work_size_bits > 256 {
            return Err(invalid(format!(
                "work_size_bits {} exceeds the 256-bit hash",
                self.work_size_bits,
            )));
        }
        Ok(())
    }
}

/// All networks this binary knows about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRegistry {
    /// Name → profile. The name is also the network-key MAC secret.
    pub networks: BTreeMap<String, NetworkProfile>,
}

impl NetworkRegistry {
    /// Parse a registry from YAML and validate every profile.
    pub fn from_yaml(document: &str) -> Result<Self, ProfileError> {
        let registry: Self =
            serde_yaml::from_str(document).map_err(|e| ProfileError::Parse(e.to_string()))?;
        for (name, profile) in &registry.networks {
            profile.validate(name)?;
        }
        Ok(registry)
    }

    /// Look up a profile by network name.
    pub fn get(&self, name: &str) -> Result<&NetworkProfile, ProfileError> {
        self.networks.get(name).ok_or_else(|| ProfileError::Unknown(name.to_string()))
    }
}
