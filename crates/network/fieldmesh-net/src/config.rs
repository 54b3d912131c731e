//! Configuration for delivery tracking and UDP transport.

use fieldmesh_core::{FieldMeshError, FieldMeshResult, Validatable, VehicleId};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, net::SocketAddr, time::Duration};

/// Delivery tracker tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Maximum number of tracked messages before eviction kicks in
    pub capacity: usize,

    /// Multiplier applied to the retry interval after each transmission
    pub backoff_factor: f64,

    /// Upper bound for the retry interval
    pub max_retry_interval_ms: u64,

    /// Number of recently seen message ids kept for duplicate suppression
    pub dedup_window: usize,

    /// Transmissions allowed per tick, highest priority first
    pub max_sends_per_tick: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            backoff_factor: 2.0,
            max_retry_interval_ms: 5000,
            dedup_window: 4096,
            max_sends_per_tick: 64,
        }
    }
}

impl DeliveryConfig {
    /// Retry interval cap as a [`Duration`].
    pub fn max_retry_interval(&self) -> Duration {
        Duration::from_millis(self.max_retry_interval_ms)
    }
}

impl Validatable for DeliveryConfig {
    fn validate(&self) -> FieldMeshResult<()> {
        if self.capacity == 0 {
            return Err(FieldMeshError::config("delivery.capacity must be at least 1"));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(FieldMeshError::config(format!(
                "delivery.backoff_factor must be >= 1.0, got {}",
                self.backoff_factor
            )));
        }
        if self.max_retry_interval_ms == 0 {
            return Err(FieldMeshError::config("delivery.max_retry_interval_ms must be positive"));
        }
        if self.max_sends_per_tick == 0 {
            return Err(FieldMeshError::config("delivery.max_sends_per_tick must be at least 1"));
        }
        Ok(())
    }
}

/// UDP transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpConfig {
    /// Local address to bind
    pub bind_addr: SocketAddr,

    /// Subnet broadcast address; broadcasts fan out to every peer when unset
    #[serde(default)]
    pub broadcast_addr: Option<SocketAddr>,

    /// Static address book
    #[serde(default)]
    pub peers: BTreeMap<VehicleId, SocketAddr>,
}

impl Validatable for UdpConfig {
    fn validate(&self) -> FieldMeshResult<()> {
        if self.broadcast_addr.is_none() && self.peers.is_empty() {
            return Err(FieldMeshError::config(
                "udp needs a broadcast_addr or at least one peer",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_defaults_are_valid() {
        let config = DeliveryConfig::default();
        assert!(config.is_valid());
        assert_eq!(config.capacity, 1000);
        assert_eq!(config.max_retry_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_delivery_validation() {
        let config = DeliveryConfig {
            backoff_factor: 0.5,
            ..Default::default()
        };
        assert!(!config.is_valid());

        let config = DeliveryConfig {
            capacity: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(FieldMeshError::Configuration(_))));
    }

    #[test]
    fn test_partial_delivery_config() {
        let config: DeliveryConfig = serde_json::from_str(r#"{"capacity": 10}"#).unwrap();
        assert_eq!(config.capacity, 10);
        assert_eq!(config.dedup_window, 4096);
    }

    #[test]
    fn test_udp_config_parse() {
        let config: UdpConfig = serde_json::from_str(
            r#"{"bind_addr": "0.0.0.0:7400", "peers": {"tractor-b": "10.0.0.2:7400"}}"#,
        )
        .unwrap();
        assert!(config.is_valid());
        assert_eq!(config.peers.len(), 1);
        assert!(config.broadcast_addr.is_none());
    }
}
